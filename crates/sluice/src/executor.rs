//! The `ManagedExecutor` capability set and its shared lifecycle state
//! machine, backing both [`crate::pool_executor::PoolExecutor`] and
//! [`crate::per_task_executor::PerTaskExecutor`].
//!
//! Grounded on this workspace's pool module: a pure capability trait (no
//! polymorphism beyond it), a CAS-guarded state word, and a process-exit hook
//! registered once and deregistered on explicit `stop()` — generalizing the
//! `Mutex<VecDeque<_>> + Condvar` slot-dispatch idiom to a plain task queue of
//! type-erased closures.

use std::sync::atomic::{AtomicU8, AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::CoreError;

/// Minimum `stop()` timeout; lower values raise [`CoreError::InvalidArgument`].
pub const MIN_STOP_TIMEOUT_MS: u64 = 64;

/// `ACTIVE -> CLOSING -> INACTIVE`, monotonic, CAS-transitioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorState {
    Active,
    Closing,
    Inactive,
}

impl ExecutorState {
    fn as_u8(self) -> u8 {
        match self {
            ExecutorState::Active => 0,
            ExecutorState::Closing => 1,
            ExecutorState::Inactive => 2,
        }
    }

    fn from_u8(raw: u8) -> ExecutorState {
        match raw {
            0 => ExecutorState::Active,
            1 => ExecutorState::Closing,
            _ => ExecutorState::Inactive,
        }
    }
}

impl std::fmt::Display for ExecutorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ExecutorState::Active => "ACTIVE",
            ExecutorState::Closing => "CLOSING",
            ExecutorState::Inactive => "INACTIVE",
        };
        write!(f, "{label}")
    }
}

/// The capability set every `ManagedExecutor` variant exposes. Object-safe:
/// `execute` takes a type-erased, `'static` closure so the trait can be held
/// as `Arc<dyn ManagedExecutor>` behind the promise runtime; callers that
/// need a typed result wrap their work in a oneshot channel themselves (see
/// [`submit`]).
pub trait ManagedExecutor: Send + Sync {
    /// Accepts a unit of work. Rejected with [`CoreError::InvalidState`] once
    /// the executor has left `ACTIVE`.
    fn execute(&self, task: Box<dyn FnOnce() + Send + 'static>) -> Result<(), CoreError>;

    /// Best-effort count of workers currently executing.
    fn active_count(&self) -> usize;

    /// Transitions `ACTIVE -> CLOSING`, waits up to `timeout` for workers to
    /// drain, then transitions to `INACTIVE`. `timeout < 64ms` raises
    /// [`CoreError::InvalidArgument`] before any state change.
    fn stop(&self, timeout: Duration, retry: bool) -> Result<(), CoreError>;

    /// Idempotent termination trigger: the first caller drives the actual
    /// shutdown; subsequent callers are no-ops.
    fn signal_term(&self);

    fn state(&self) -> ExecutorState;

    fn capacity(&self) -> usize;

    fn service_name(&self) -> &'static str;
}

/// Submits a typed unit of work to `executor` and returns a channel receiver
/// for its result, fulfilling the role of `submit(callable) -> future-handle`
/// against the type-erased [`ManagedExecutor::execute`].
pub fn submit<T, F>(
    executor: &dyn ManagedExecutor,
    task: F,
) -> Result<std::sync::mpsc::Receiver<std::thread::Result<T>>, CoreError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = std::sync::mpsc::channel();
    executor.execute(Box::new(move || {
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(task));
        let _ = tx.send(result);
    }))?;
    Ok(rx)
}

/// Shared CAS state word plus the boilerplate both executor variants need:
/// lifecycle transitions, `signal_term` idempotency, and process-exit hook
/// bookkeeping.
pub(crate) struct LifecycleState {
    state: AtomicU8,
    term_signaled: AtomicBool,
}

impl LifecycleState {
    pub(crate) fn new() -> LifecycleState {
        LifecycleState {
            state: AtomicU8::new(ExecutorState::Active.as_u8()),
            term_signaled: AtomicBool::new(false),
        }
    }

    pub(crate) fn load(&self) -> ExecutorState {
        ExecutorState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn is_active(&self) -> bool {
        self.load() == ExecutorState::Active
    }

    /// Attempts `ACTIVE -> CLOSING`. Returns `true` only for the caller that
    /// performed the transition.
    pub(crate) fn begin_closing(&self) -> bool {
        self.state
            .compare_exchange(
                ExecutorState::Active.as_u8(),
                ExecutorState::Closing.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub(crate) fn finish_closing(&self) {
        self.state.store(ExecutorState::Inactive.as_u8(), Ordering::Release);
    }

    /// Returns `true` for exactly the first call; every later call is a no-op
    /// observer.
    pub(crate) fn mark_term_signaled(&self) -> bool {
        self.term_signaled
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Validates the `stop(timeout, ...)` precondition shared by both variants.
pub(crate) fn validate_stop_timeout(timeout: Duration) -> Result<(), CoreError> {
    if timeout.as_millis() < MIN_STOP_TIMEOUT_MS as u128 {
        return Err(CoreError::invalid_argument(format!(
            "stop timeout must be at least {MIN_STOP_TIMEOUT_MS}ms, got {}ms",
            timeout.as_millis()
        )));
    }
    Ok(())
}

/// Registers a process-termination hook (SIGTERM/SIGINT) that invokes
/// `on_signal`. Grounded on the pack's `ctrlc` convention for process-exit
/// integration (the teacher crate has no such hook; this is a
/// `autoShutdown=true` feature the spec names that the original repo never
/// needed). Best-effort: `ctrlc::set_handler` can only succeed once per
/// process, so a failure here (a second executor also requesting
/// `autoShutdown`) is logged and otherwise ignored.
///
/// Returns the flag that guards the handler's call to `on_signal`. The
/// caller must clear it (`store(false, ...)`) from its explicit `stop()`
/// path so a signal arriving after an already-completed shutdown doesn't
/// re-enter `signal_term` and race the now-torn-down executor.
pub(crate) fn register_shutdown_hook(on_signal: impl Fn() + Send + 'static) -> Arc<AtomicBool> {
    let hook_active = Arc::new(AtomicBool::new(true));
    let hook_for_handler = Arc::clone(&hook_active);
    let result = ctrlc::set_handler(move || {
        if hook_for_handler.load(Ordering::Acquire) {
            on_signal();
        }
    });
    if let Err(err) = result {
        log::warn!("failed to register process-termination hook: {err}");
    }
    hook_active
}

/// Formats the `toString()` contract tokens spec section 9 calls out as
/// contractual: `state=`, `shutdownHook=`, `capacity=`, `service=`.
pub(crate) fn format_state(
    state: ExecutorState,
    shutdown_hook: bool,
    capacity: usize,
    service: &str,
) -> String {
    format!(
        "state={state},shutdownHook={},capacity={capacity},service={service}",
        if shutdown_hook { "REGISTERED" } else { "NONE" }
    )
}
