//! `Floodgate<R>` — spins up N workers that each invoke a resource M times
//! under a release barrier, collecting one result per worker.
//!
//! The internal pool is a [`crate::pool_executor::PoolExecutor`] sized to the
//! worker count, reusing the same executor machinery the promise runtime
//! binds to rather than a bespoke thread group — "the outer `flood()`
//! shuts down the internal pool (graceful, then forced after a grace
//! period)" maps directly onto `PoolExecutor::stop(grace_period, retry=false)`.
//!
//! Workers block on the [`crate::marshal::Marshal`]'s latch, not a spin loop,
//! so the release edge really is a single wakeup rather than a polled flag.
//! "Interruption" (Rust has no preemptible OS thread interruption) is
//! modeled cooperatively via a shared `stop_requested` flag each worker
//! checks once per iteration.

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{panic_message, CoreError};
use crate::marshal::{Latch, Marshal};
use crate::pool_executor::PoolExecutor;
use crate::target::{Stability, Target};

/// Default grace period `flood()` allows the internal pool before forcing
/// shutdown, matching the spec's stated default.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// `CLOSED -> OPENED -> FLOODED`, monotonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloodState {
    Closed,
    Opened,
    Flooded,
}

impl FloodState {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            FloodState::Closed => 0,
            FloodState::Opened => 1,
            FloodState::Flooded => 2,
        }
    }

    pub(crate) fn from_u8(raw: u8) -> FloodState {
        match raw {
            0 => FloodState::Closed,
            1 => FloodState::Opened,
            _ => FloodState::Flooded,
        }
    }
}

/// A countdown latch sized to the worker count. Decrements are lock-free
/// atomic; the thread that brings the count to zero releases the latch that
/// `wait_timeout` blocks on.
struct CompletionBarrier {
    remaining: AtomicUsize,
    done: Latch,
}

impl CompletionBarrier {
    fn new(count: usize) -> CompletionBarrier {
        CompletionBarrier { remaining: AtomicUsize::new(count), done: Latch::new() }
    }

    fn decrement(&self) {
        let previous = self.remaining.fetch_sub(1, Ordering::AcqRel);
        if previous == 1 {
            self.done.release();
        }
    }

    fn wait_timeout(&self, timeout: Duration) -> bool {
        if self.remaining.load(Ordering::Acquire) == 0 {
            return true;
        }
        self.done.wait_timeout(timeout)
    }
}

struct Shared<R> {
    target: Target,
    threads: usize,
    iterations: usize,
    resource: Arc<dyn Fn() -> R + Send + Sync>,
    marshal: Marshal,
    state: AtomicU8,
    pool: Mutex<Option<Arc<PoolExecutor>>>,
    completion: CompletionBarrier,
    results: Mutex<Vec<Option<R>>>,
    stop_requested: Arc<AtomicBool>,
}

fn worker_body<R>(shared: Arc<Shared<R>>, worker_index: usize)
where
    R: Send + 'static,
{
    shared.marshal.latch().wait();

    let mut last: Option<R> = None;
    for _ in 0..shared.iterations {
        if shared.stop_requested.load(Ordering::Acquire) {
            log::warn!("flood worker {worker_index} interrupted, exiting gracefully");
            break;
        }
        if shared.target.stability() == Stability::Unstable {
            log::warn!("skipping iteration against unstable target {}", shared.target.name());
            continue;
        }
        let resource = Arc::clone(&shared.resource);
        match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| resource())) {
            Ok(value) => last = Some(value),
            Err(payload) => {
                shared.target.mark_unstable();
                log::error!(
                    "flood worker {worker_index} resource call failed for target {}: {}",
                    shared.target.name(),
                    panic_message(payload.as_ref())
                );
            }
        }
    }

    shared.results.lock().expect("flood results poisoned")[worker_index] = last;
    shared.completion.decrement();
}

/// A single resource test driver: N workers, each iterating M times.
pub struct Floodgate<R> {
    shared: Arc<Shared<R>>,
}

impl<R> Clone for Floodgate<R> {
    fn clone(&self) -> Self {
        Floodgate { shared: Arc::clone(&self.shared) }
    }
}

impl<R> Floodgate<R>
where
    R: Send + 'static,
{
    /// Constructs a `CLOSED` floodgate. `threads` and `iterations` must each
    /// be at least 1.
    pub fn new(
        target_type_name: &str,
        threads: usize,
        iterations: usize,
        resource: impl Fn() -> R + Send + Sync + 'static,
        marshal: Marshal,
    ) -> Result<Floodgate<R>, CoreError> {
        if threads == 0 {
            return Err(CoreError::invalid_argument("floodgate requires at least 1 worker thread"));
        }
        if iterations == 0 {
            return Err(CoreError::invalid_argument("floodgate requires at least 1 iteration"));
        }

        let shared = Arc::new(Shared {
            target: Target::new(target_type_name),
            threads,
            iterations,
            resource: Arc::new(resource),
            marshal,
            state: AtomicU8::new(FloodState::Closed.as_u8()),
            pool: Mutex::new(None),
            completion: CompletionBarrier::new(threads),
            results: Mutex::new((0..threads).map(|_| None).collect()),
            stop_requested: Arc::new(AtomicBool::new(false)),
        });

        Ok(Floodgate { shared })
    }

    pub fn get_state(&self) -> FloodState {
        FloodState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    pub fn get_target(&self) -> Target {
        self.shared.target.clone()
    }

    pub fn get_threads(&self) -> usize {
        self.shared.threads
    }

    pub fn get_iterations(&self) -> usize {
        self.shared.iterations
    }

    /// Allocates the internal pool, creates the completion barrier (already
    /// sized at construction), and submits N worker tasks that each block on
    /// the marshal before looping. Double-open raises [`CoreError::InvalidState`].
    pub fn open(&self) -> Result<(), CoreError> {
        let transitioned = self
            .shared
            .state
            .compare_exchange(
                FloodState::Closed.as_u8(),
                FloodState::Opened.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if !transitioned {
            return Err(CoreError::invalid_state("floodgate is not CLOSED"));
        }

        let pool = PoolExecutor::new(self.shared.threads, false);
        *self.shared.pool.lock().expect("flood pool poisoned") = Some(Arc::clone(&pool));

        for worker_index in 0..self.shared.threads {
            let shared = Arc::clone(&self.shared);
            pool.execute(Box::new(move || worker_body(shared, worker_index)))
                .expect("freshly opened pool must accept work");
        }

        Ok(())
    }

    /// Triggers the marshal's release (unless the marshal is external, in
    /// which case release is deferred to the owning Torrent), blocks on the
    /// completion barrier up to `timeout`, then shuts down the internal pool
    /// (graceful, then forced after [`DEFAULT_GRACE_PERIOD`]). Returns one
    /// entry per worker (`None` for a worker whose last call raised, or that
    /// never produced a value).
    pub fn flood(&self, timeout: Duration) -> Result<Vec<Option<R>>, CoreError>
    where
        R: Clone,
    {
        if self.get_state() != FloodState::Opened {
            return Err(CoreError::invalid_state("flood() requires an OPENED floodgate"));
        }

        if self.shared.marshal.is_internal() {
            self.shared.marshal.latch().release();
        }

        let satisfied = self.shared.completion.wait_timeout(timeout);
        if !satisfied {
            log::error!("not all flood workers have completed their work");
            self.shared.stop_requested.store(true, Ordering::Release);
        }

        if let Some(pool) = self.shared.pool.lock().expect("flood pool poisoned").take() {
            let _ = pool.stop(DEFAULT_GRACE_PERIOD, false);
        }

        self.shared.state.store(FloodState::Flooded.as_u8(), Ordering::Release);

        Ok(self.shared.results.lock().expect("flood results poisoned").clone())
    }

    /// Shuts down the internal pool without waiting on the completion
    /// barrier first.
    pub fn close(&self, force: bool) {
        if let Some(pool) = self.shared.pool.lock().expect("flood pool poisoned").take() {
            let timeout = if force { crate::executor::MIN_STOP_TIMEOUT_MS } else { DEFAULT_GRACE_PERIOD.as_millis() as u64 };
            let _ = pool.stop(Duration::from_millis(timeout), !force);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize as StdAtomicUsize;

    // S5 — Floodgate roundtrip.
    #[test]
    fn test_floodgate_roundtrip_counter() {
        let counter = Arc::new(StdAtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);
        let gate = Floodgate::new(
            "CounterResource",
            5,
            5,
            move || {
                counter_clone.fetch_add(1, Ordering::SeqCst);
            },
            Marshal::internal(),
        )
        .unwrap();

        gate.open().unwrap();
        let results = gate.flood(Duration::from_secs(60)).unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 25);
        assert_eq!(results.len(), 5);
        assert_eq!(gate.get_state(), FloodState::Flooded);
        assert_eq!(gate.get_target().stability(), Stability::Stable);
    }

    #[test]
    fn test_new_rejects_zero_threads() {
        let err = Floodgate::new("Zero", 0, 1, || (), Marshal::internal()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidArgument(_)));
    }

    #[test]
    fn test_new_rejects_zero_iterations() {
        let err = Floodgate::new("Zero", 1, 0, || (), Marshal::internal()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidArgument(_)));
    }

    #[test]
    fn test_double_open_raises_invalid_state() {
        let gate = Floodgate::new("DoubleOpen", 1, 1, || (), Marshal::internal()).unwrap();
        gate.open().unwrap();
        let err = gate.open().unwrap_err();
        assert!(matches!(err, CoreError::InvalidState(_)));
    }

    #[test]
    fn test_flood_before_open_raises_invalid_state() {
        let gate = Floodgate::new("NotOpened", 1, 1, || (), Marshal::internal()).unwrap();
        let err = gate.flood(Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, CoreError::InvalidState(_)));
    }

    #[test]
    fn test_unstable_target_skips_iterations() {
        let calls = Arc::new(StdAtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        let gate = Floodgate::new(
            "AlwaysFails",
            1,
            5,
            move || -> () {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                panic!("resource always fails")
            },
            Marshal::internal(),
        )
        .unwrap();
        gate.open().unwrap();
        gate.flood(Duration::from_secs(30)).unwrap();
        // First call marks the target unstable; remaining iterations are skipped.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(gate.get_target().stability(), Stability::Unstable);
    }

    #[test]
    fn test_external_marshal_does_not_self_release() {
        let latch = Latch::new();
        let gate =
            Floodgate::new("External", 1, 1, || 1, Marshal::external(latch.clone())).unwrap();
        gate.open().unwrap();
        let satisfied = gate.shared.completion.wait_timeout(Duration::from_millis(100));
        assert!(!satisfied, "external marshal must not be released by the floodgate itself");
        latch.release();
        let results = gate.flood(Duration::from_secs(5)).unwrap();
        assert_eq!(results, vec![Some(1)]);
    }
}
