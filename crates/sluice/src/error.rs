//! The crate's single error type for construction-time and lifecycle failures.
//!
//! [`CoreError`] is returned from fallible constructors and state-transition
//! methods (`ManagedExecutor::stop`, `Floodgate::open`/`flood`,
//! `TorrentBuilder::build`). It is distinct from the channels a *user task's*
//! failure travels through — those are the `Maybe`-emptiness of a result, a
//! completion handler's error argument, an event's value/cause pair, or the
//! argument to `handle`'s closure (see [`crate::promise`]).

use std::fmt;

/// The two error kinds this crate's APIs actually raise as a `Result::Err`:
/// construction-time rejection and wrong-lifecycle-state operations. The
/// error handling design's other taxonomy entries — `TaskFailure`,
/// `Interruption`, `Timeout` — are never returned as a `CoreError`; they
/// surface through the four propagation channels a user-supplied action's
/// failure actually takes (a `Maybe`-empty result, a completion handler's
/// cause argument, an event's value/cause pair, or `handle`'s closure
/// argument — all carried as [`BoxCause`]) or, for `stop()`/flood-test
/// interruption and timeout, as the contract-bearing log lines in
/// `pool_executor.rs`/`per_task_executor.rs`/`floodgate.rs`.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid state: {0}")]
    InvalidState(String),
}

impl CoreError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        CoreError::InvalidArgument(message.into())
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        CoreError::InvalidState(message.into())
    }
}

/// Extracts a human-readable message from a caught `panic!` payload.
///
/// Rust panics stand in for the "exception raised by user code" concept the
/// specification describes; this turns the opaque `Box<dyn Any>` payload
/// `catch_unwind` hands back into a displayable string.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked with a non-string payload".to_string()
    }
}

/// A boxed, shareable cause. Every rejected [`crate::promise::Promise`] carries
/// one of these; it is cheap to clone across a chain of successors.
pub type BoxCause = std::sync::Arc<dyn std::error::Error + Send + Sync + 'static>;

/// A simple string-backed error used to wrap panic messages and
/// executor-closed causes into a [`BoxCause`].
#[derive(Debug)]
pub struct Cause(String);

impl Cause {
    pub fn new(message: impl Into<String>) -> BoxCause {
        std::sync::Arc::new(Cause(message.into()))
    }
}

impl fmt::Display for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for Cause {}
