//! `PerTaskExecutor` — each submitted task gets its own worker thread;
//! `capacity` caps the number of tasks outstanding at once.
//!
//! Where [`crate::pool_executor::PoolExecutor`] generalizes the teacher's
//! fixed slot pool, this variant generalizes the teacher's per-call
//! "spawn, run, return" path (seen in `timeout.rs`'s `run_with_timeout`,
//! which spawns one thread per call rather than reusing a pool slot) into a
//! capacity-bounded thread-per-task model: a submission blocks until a permit
//! is available, then gets a freshly spawned thread of its own.
//!
//! "Interrupting" a pending task on shutdown has no portable Rust
//! equivalent (no preemptible thread-interrupt primitive), so draining here
//! always joins; a task that outlives a non-retrying `stop()`'s timeout is
//! abandoned rather than interrupted, same as `PoolExecutor`.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::error::CoreError;
use crate::executor::{
    format_state, register_shutdown_hook, submit, validate_stop_timeout, ExecutorState,
    LifecycleState, ManagedExecutor,
};

type Task = Box<dyn FnOnce() + Send + 'static>;

const SIGNAL_TERM_TIMEOUT: Duration = Duration::from_secs(5);

struct Shared {
    lifecycle: LifecycleState,
    outstanding: Mutex<usize>,
    cvar: Condvar,
    capacity: usize,
    handles: Mutex<Option<Vec<JoinHandle<()>>>>,
    next_id: AtomicUsize,
}

/// A worker-per-task executor with at most `capacity` tasks running at once.
pub struct PerTaskExecutor {
    shared: Arc<Shared>,
    shutdown_hook_registered: bool,
    shutdown_hook_active: std::sync::OnceLock<Arc<AtomicBool>>,
}

impl PerTaskExecutor {
    pub fn new(capacity: usize, auto_shutdown: bool) -> Arc<PerTaskExecutor> {
        let capacity = capacity.max(1);
        let shared = Arc::new(Shared {
            lifecycle: LifecycleState::new(),
            outstanding: Mutex::new(0),
            cvar: Condvar::new(),
            capacity,
            handles: Mutex::new(Some(Vec::new())),
            next_id: AtomicUsize::new(0),
        });

        let executor = Arc::new(PerTaskExecutor {
            shared,
            shutdown_hook_registered: auto_shutdown,
            shutdown_hook_active: std::sync::OnceLock::new(),
        });

        if auto_shutdown {
            let hook_target = Arc::clone(&executor);
            let hook_active = register_shutdown_hook(move || hook_target.signal_term());
            let _ = executor.shutdown_hook_active.set(hook_active);
        }

        executor
    }

    pub fn submit<T, F>(
        &self,
        task: F,
    ) -> Result<std::sync::mpsc::Receiver<std::thread::Result<T>>, CoreError>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        submit(self, task)
    }

    fn release_permit(&self) {
        let mut outstanding = self.shared.outstanding.lock().expect("outstanding count poisoned");
        *outstanding -= 1;
        self.shared.cvar.notify_one();
    }
}

impl ManagedExecutor for PerTaskExecutor {
    fn execute(&self, task: Task) -> Result<(), CoreError> {
        if !self.shared.lifecycle.is_active() {
            return Err(CoreError::invalid_state("per-task executor is not ACTIVE"));
        }

        {
            let mut outstanding = self.shared.outstanding.lock().expect("outstanding count poisoned");
            while *outstanding >= self.shared.capacity {
                outstanding = self.shared.cvar.wait(outstanding).expect("outstanding count poisoned");
            }
            *outstanding += 1;
        }

        let mut handles_guard = self.shared.handles.lock().expect("handles poisoned");
        let handles = match handles_guard.as_mut() {
            Some(handles) => handles,
            None => {
                drop(handles_guard);
                self.release_permit();
                return Err(CoreError::invalid_state("per-task executor is not ACTIVE"));
            }
        };

        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst);
        let shared = Arc::clone(&self.shared);
        let handle = std::thread::Builder::new()
            .name(format!("per-task-executor-{id}"))
            .spawn(move || {
                if let Err(payload) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(task)) {
                    log::error!(
                        "per-task executor task panicked: {}",
                        crate::error::panic_message(payload.as_ref())
                    );
                }
                let mut outstanding = shared.outstanding.lock().expect("outstanding count poisoned");
                *outstanding -= 1;
                shared.cvar.notify_one();
            })
            .expect("failed to spawn per-task executor worker thread");
        handles.push(handle);
        Ok(())
    }

    fn active_count(&self) -> usize {
        *self.shared.outstanding.lock().expect("outstanding count poisoned")
    }

    fn stop(&self, timeout: Duration, retry: bool) -> Result<(), CoreError> {
        validate_stop_timeout(timeout)?;

        if let Some(hook_active) = self.shutdown_hook_active.get() {
            hook_active.store(false, Ordering::Release);
        }

        if self.shared.lifecycle.begin_closing() {
            self.shared.cvar.notify_all();
        }

        let handles = self.shared.handles.lock().expect("handles poisoned").take();
        let Some(handles) = handles else {
            return Ok(());
        };

        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::Builder::new()
            .name("per-task-executor-join-collector".to_string())
            .spawn(move || {
                for handle in handles {
                    let _ = handle.join();
                }
                let _ = tx.send(());
            })
            .expect("failed to spawn join collector thread");

        match rx.recv_timeout(timeout) {
            Ok(()) => {}
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {
                if retry {
                    log::warn!("Awaiting termination of some promises");
                    let _ = rx.recv();
                } else {
                    log::error!("Not all promises kept following shutdown -- forced shutdown");
                }
            }
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                // The join-collector thread died (panicked) before reporting
                // completion -- the closest Rust analog to the wait itself
                // being interrupted, since there is no portable API to
                // interrupt a blocking `recv` from the outside.
                log::warn!("Termination of threads (promises) interrupted -- promises not kept");
            }
        }

        self.shared.lifecycle.finish_closing();
        Ok(())
    }

    fn signal_term(&self) {
        if self.shared.lifecycle.mark_term_signaled() {
            let _ = self.stop(SIGNAL_TERM_TIMEOUT, false);
        }
    }

    fn state(&self) -> ExecutorState {
        self.shared.lifecycle.load()
    }

    fn capacity(&self) -> usize {
        self.shared.capacity
    }

    fn service_name(&self) -> &'static str {
        "PerTaskExecutor"
    }
}

impl std::fmt::Display for PerTaskExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            format_state(
                self.state(),
                self.shutdown_hook_registered,
                self.capacity(),
                self.service_name()
            )
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI32;

    #[test]
    fn test_execute_runs_submitted_task() {
        let executor = PerTaskExecutor::new(2, false);
        let observed = Arc::new(AtomicI32::new(0));
        let observed_clone = Arc::clone(&observed);
        executor
            .execute(Box::new(move || {
                observed_clone.store(42, Ordering::SeqCst);
            }))
            .unwrap();
        for _ in 0..200 {
            if observed.load(Ordering::SeqCst) == 42 {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(observed.load(Ordering::SeqCst), 42);
    }

    #[test]
    fn test_submit_returns_typed_result() {
        let executor = PerTaskExecutor::new(1, false);
        let rx = executor.submit(|| 127).unwrap();
        let result = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(result.unwrap(), 127);
    }

    #[test]
    fn test_capacity_caps_outstanding_tasks() {
        let executor = PerTaskExecutor::new(1, false);
        let barrier = Arc::new(std::sync::Barrier::new(2));
        let barrier_clone = Arc::clone(&barrier);
        executor
            .execute(Box::new(move || {
                barrier_clone.wait();
            }))
            .unwrap();
        assert_eq!(executor.active_count(), 1);
        barrier.wait();
        executor.stop(Duration::from_secs(5), true).unwrap();
    }

    #[test]
    fn test_execute_rejected_after_stop() {
        let executor = PerTaskExecutor::new(1, false);
        executor.stop(Duration::from_millis(200), true).unwrap();
        let err = executor.execute(Box::new(|| {})).unwrap_err();
        assert!(matches!(err, CoreError::InvalidState(_)));
    }

    #[test]
    fn test_stop_rejects_timeout_below_minimum() {
        let executor = PerTaskExecutor::new(1, false);
        let err = executor.stop(Duration::from_millis(10), false).unwrap_err();
        assert!(matches!(err, CoreError::InvalidArgument(_)));
    }

    #[test]
    fn test_stop_transitions_to_inactive() {
        let executor = PerTaskExecutor::new(2, false);
        executor.stop(Duration::from_millis(200), true).unwrap();
        assert_eq!(executor.state(), ExecutorState::Inactive);
    }

    #[test]
    fn test_signal_term_is_idempotent() {
        let executor = PerTaskExecutor::new(1, false);
        executor.signal_term();
        executor.signal_term();
        assert_eq!(executor.state(), ExecutorState::Inactive);
    }

    #[test]
    fn test_display_contains_contractual_tokens() {
        let executor = PerTaskExecutor::new(2, false);
        let rendered = executor.to_string();
        for token in ["state=", "shutdownHook=", "capacity=", "service="] {
            assert!(rendered.contains(token));
        }
    }

    #[test]
    fn test_stop_deactivates_shutdown_hook_flag() {
        let executor = PerTaskExecutor::new(1, true);
        let hook_active = Arc::clone(executor.shutdown_hook_active.get().unwrap());
        assert!(hook_active.load(Ordering::Acquire));
        executor.stop(Duration::from_millis(200), true).unwrap();
        assert!(!hook_active.load(Ordering::Acquire));
    }
}
