//! `PoolExecutor` — a fixed-size worker group sharing one unbounded FIFO
//! task queue.
//!
//! Grounded on this workspace's `InterpreterPool`: threads are named with a
//! stable template and spawned eagerly at construction, but here they share
//! one `Mutex<VecDeque<_>> + Condvar` queue directly (no per-slot dedicated
//! state to protect, unlike the teacher's non-`Send` interpreter) rather than
//! each owning a private channel.
//!
//! Bounded `stop()` reuses the teacher's `timeout.rs` idiom: a collector
//! thread joins every worker handle and reports completion over an `mpsc`
//! channel, so the caller's wait can be bounded by `recv_timeout` even though
//! `JoinHandle::join()` itself has no timeout parameter. Workers that are
//! still running when a non-retrying `stop()`'s timeout elapses are simply
//! abandoned (never killed) — per the teacher's own documented rationale,
//! thread abandonment is the only portable, safe mechanism in Rust.

use std::collections::VecDeque;
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

/// Default bound for the join-collector's wait when `signal_term` drives the
/// shutdown itself, matching the flood-test grace period's own default.
const SIGNAL_TERM_TIMEOUT: Duration = Duration::from_secs(5);

struct Shared {
    queue: Mutex<VecDeque<Task>>,
    cvar: Condvar,
    lifecycle: LifecycleState,
    active: AtomicUsize,
    capacity: usize,
}

fn worker_loop(shared: Arc<Shared>) {
    loop {
        let task = {
            let mut queue = shared.queue.lock().expect("pool queue poisoned");
            loop {
                if let Some(task) = queue.pop_front() {
                    break Some(task);
                }
                if !shared.lifecycle.is_active() {
                    break None;
                }
                queue = shared.cvar.wait(queue).expect("pool queue poisoned");
            }
        };
        let task = match task {
            Some(task) => task,
            None => break,
        };
        shared.active.fetch_add(1, Ordering::SeqCst);
        if let Err(payload) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(task)) {
            log::error!(
                "pool executor task panicked: {}",
                crate::error::panic_message(payload.as_ref())
            );
        }
        shared.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A fixed-size worker group of `capacity` workers.
pub struct PoolExecutor {
    shared: Arc<Shared>,
    workers: Mutex<Option<Vec<JoinHandle<()>>>>,
    shutdown_hook_registered: bool,
    shutdown_hook_active: std::sync::OnceLock<Arc<AtomicBool>>,
}

impl PoolExecutor {
    /// Spawns `capacity` (minimum 1) worker threads named
    /// `pool-executor-worker-{id}`, 0-based. When `auto_shutdown` is `true`,
    /// registers a process-termination hook that invokes `signal_term`.
    pub fn new(capacity: usize, auto_shutdown: bool) -> Arc<PoolExecutor> {
        let capacity = capacity.max(1);
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            cvar: Condvar::new(),
            lifecycle: LifecycleState::new(),
            active: AtomicUsize::new(0),
            capacity,
        });

        let workers: Vec<JoinHandle<()>> = (0..capacity)
            .map(|id| {
                let shared = Arc::clone(&shared);
                std::thread::Builder::new()
                    .name(format!("pool-executor-worker-{id}"))
                    .spawn(move || worker_loop(shared))
                    .expect("failed to spawn pool executor worker thread")
            })
            .collect();

        let executor = Arc::new(PoolExecutor {
            shared,
            workers: Mutex::new(Some(workers)),
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

    /// Typed convenience over [`ManagedExecutor::execute`], matching the
    /// spec's `submit(callable) -> future-handle` operation.
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
}

impl ManagedExecutor for PoolExecutor {
    fn execute(&self, task: Task) -> Result<(), CoreError> {
        if !self.shared.lifecycle.is_active() {
            return Err(CoreError::invalid_state("pool executor is not ACTIVE"));
        }
        self.shared.queue.lock().expect("pool queue poisoned").push_back(task);
        self.shared.cvar.notify_one();
        Ok(())
    }

    fn active_count(&self) -> usize {
        self.shared.active.load(Ordering::SeqCst)
    }

    fn stop(&self, timeout: Duration, retry: bool) -> Result<(), CoreError> {
        validate_stop_timeout(timeout)?;

        if let Some(hook_active) = self.shutdown_hook_active.get() {
            hook_active.store(false, Ordering::Release);
        }

        if self.shared.lifecycle.begin_closing() {
            self.shared.cvar.notify_all();
        }

        let workers = self.workers.lock().expect("pool workers poisoned").take();
        let Some(workers) = workers else {
            // A concurrent stop() already took the handles; this call just
            // observes the in-flight shutdown rather than double-joining.
            return Ok(());
        };

        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::Builder::new()
            .name("pool-executor-join-collector".to_string())
            .spawn(move || {
                for worker in workers {
                    let _ = worker.join();
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
        "PoolExecutor"
    }
}

impl std::fmt::Display for PoolExecutor {
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
