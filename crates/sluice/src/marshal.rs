//! One-shot release coordination for [`crate::floodgate::Floodgate`] workers.
//!
//! A `Marshal` wraps a single-release latch (`count = 1`): workers block in
//! `wait()` until the triggering party calls `release()` exactly once. An
//! `Internal` marshal is released by its own Floodgate inside `flood()`; an
//! `External` marshal's latch is shared with (and only released by) an
//! owning [`crate::torrent::Torrent`], letting many floodgates start off the
//! same release edge.

use std::sync::{Arc, Condvar, Mutex};

/// A single-shot latch: `release()` flips it open exactly once; `wait()`
/// blocks until it is open, returning immediately if already open.
#[derive(Clone)]
pub struct Latch {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl Latch {
    pub fn new() -> Latch {
        Latch { inner: Arc::new((Mutex::new(false), Condvar::new())) }
    }

    /// Opens the latch. Idempotent: a second call is a no-op.
    pub fn release(&self) {
        let (lock, cvar) = &*self.inner;
        let mut opened = lock.lock().expect("latch poisoned");
        if !*opened {
            *opened = true;
            cvar.notify_all();
        }
    }

    /// Blocks the calling thread until the latch is open.
    pub fn wait(&self) {
        let (lock, cvar) = &*self.inner;
        let mut opened = lock.lock().expect("latch poisoned");
        while !*opened {
            opened = cvar.wait(opened).expect("latch poisoned");
        }
    }

    /// Blocks up to `timeout` for the latch to open. Returns `true` if it
    /// opened within the bound, `false` if `timeout` elapsed first.
    pub fn wait_timeout(&self, timeout: std::time::Duration) -> bool {
        let (lock, cvar) = &*self.inner;
        let opened = lock.lock().expect("latch poisoned");
        let (opened, timed_out) = cvar
            .wait_timeout_while(opened, timeout, |opened| !*opened)
            .expect("latch poisoned");
        let _ = timed_out;
        *opened
    }

    pub fn is_open(&self) -> bool {
        *self.inner.0.lock().expect("latch poisoned")
    }
}

impl Default for Latch {
    fn default() -> Self {
        Latch::new()
    }
}

/// Which party owns the release edge for a Floodgate's workers.
#[derive(Clone)]
pub enum Marshal {
    /// The Floodgate itself releases the latch inside its own `flood()`.
    Internal(Latch),
    /// An owning Torrent releases a latch shared across all its floodgates.
    External(Latch),
}

impl Marshal {
    pub fn internal() -> Marshal {
        Marshal::Internal(Latch::new())
    }

    pub fn external(latch: Latch) -> Marshal {
        Marshal::External(latch)
    }

    pub fn latch(&self) -> &Latch {
        match self {
            Marshal::Internal(latch) => latch,
            Marshal::External(latch) => latch,
        }
    }

    /// `true` only for [`Marshal::Internal`] — an External marshal's release
    /// is deferred to the owning Torrent, never triggered by the Floodgate.
    pub fn is_internal(&self) -> bool {
        matches!(self, Marshal::Internal(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_wait_returns_immediately_if_already_released() {
        let latch = Latch::new();
        latch.release();
        latch.wait();
    }

    #[test]
    fn test_wait_timeout_returns_false_when_not_released() {
        let latch = Latch::new();
        assert!(!latch.wait_timeout(Duration::from_millis(50)));
    }

    #[test]
    fn test_wait_timeout_returns_true_once_released() {
        let latch = Latch::new();
        latch.release();
        assert!(latch.wait_timeout(Duration::from_millis(50)));
    }

    #[test]
    fn test_release_wakes_blocked_waiters() {
        let latch = Latch::new();
        let woken = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let latch = latch.clone();
                let woken = Arc::clone(&woken);
                std::thread::spawn(move || {
                    latch.wait();
                    woken.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(woken.load(Ordering::SeqCst), 0);
        latch.release();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(woken.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_release_is_idempotent() {
        let latch = Latch::new();
        latch.release();
        latch.release();
        assert!(latch.is_open());
    }

    #[test]
    fn test_internal_marshal_is_internal() {
        let marshal = Marshal::internal();
        assert!(marshal.is_internal());
    }

    #[test]
    fn test_external_marshal_is_not_internal() {
        let marshal = Marshal::external(Latch::new());
        assert!(!marshal.is_internal());
    }
}
