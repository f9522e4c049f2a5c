//! Immutable task descriptors bound into a [`crate::promise::Promise`].
//!
//! An [`Action`] is a tagged variant over the three shapes the spec names:
//! `Primary` (zero-argument producer), `Task` (one-argument consumer), and
//! `Transmute` (one-argument function). Each may carry an optional completion
//! handler, invoked inside the executing worker once the stage's outcome is
//! known and strictly before subscriber notification.

/// `(value_or_null, error_or_null)` callback run inside the worker at the end
/// of a stage. Mirrors the `handler` fields on `llm-pyexec`'s execution
/// settings in spirit: an optional, boxed, `Send` closure carried alongside
/// the action it completes.
pub type CompletionHandler<T> = Box<dyn FnOnce(Option<&T>, Option<&crate::error::BoxCause>) + Send>;

/// A zero-argument producer returning `T`, the body of a promise's first stage.
pub struct PrimaryAction<T> {
    pub producer: Box<dyn FnOnce() -> T + Send>,
    pub handler: Option<CompletionHandler<T>>,
}

impl<T> PrimaryAction<T> {
    pub fn new(producer: impl FnOnce() -> T + Send + 'static) -> PrimaryAction<T> {
        PrimaryAction { producer: Box::new(producer), handler: None }
    }

    pub fn with_handler(
        producer: impl FnOnce() -> T + Send + 'static,
        handler: impl FnOnce(Option<&T>, Option<&crate::error::BoxCause>) + Send + 'static,
    ) -> PrimaryAction<T> {
        PrimaryAction { producer: Box::new(producer), handler: Some(Box::new(handler)) }
    }
}

/// A one-argument consumer of `T`; the predecessor's value passes through
/// unchanged to the resulting promise.
pub struct TaskAction<T> {
    pub consumer: Box<dyn FnOnce(&T) + Send>,
    pub handler: Option<CompletionHandler<T>>,
}

impl<T> TaskAction<T> {
    pub fn new(consumer: impl FnOnce(&T) + Send + 'static) -> TaskAction<T> {
        TaskAction { consumer: Box::new(consumer), handler: None }
    }

    pub fn with_handler(
        consumer: impl FnOnce(&T) + Send + 'static,
        handler: impl FnOnce(Option<&T>, Option<&crate::error::BoxCause>) + Send + 'static,
    ) -> TaskAction<T> {
        TaskAction { consumer: Box::new(consumer), handler: Some(Box::new(handler)) }
    }
}

/// A one-argument function `T -> R`; the predecessor's value is mapped to a
/// new value carried by the resulting promise.
///
/// Takes `&T` rather than consuming `T` by value: the predecessor's value is
/// held behind an `Arc` (shared with `get_result`/event dispatch/subscriber
/// payloads), so a by-value signature would require `T: Clone`. Borrowing is
/// the idiomatic Rust shape here and does not change the mapping's observable
/// behavior.
pub struct TransmuteAction<T, R> {
    pub function: Box<dyn FnOnce(&T) -> R + Send>,
    pub handler: Option<CompletionHandler<R>>,
}

impl<T, R> TransmuteAction<T, R> {
    pub fn new(function: impl FnOnce(&T) -> R + Send + 'static) -> TransmuteAction<T, R> {
        TransmuteAction { function: Box::new(function), handler: None }
    }

    pub fn with_handler(
        function: impl FnOnce(&T) -> R + Send + 'static,
        handler: impl FnOnce(Option<&R>, Option<&crate::error::BoxCause>) + Send + 'static,
    ) -> TransmuteAction<T, R> {
        TransmuteAction { function: Box::new(function), handler: Some(Box::new(handler)) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_primary_action_producer_runs() {
        let action = PrimaryAction::new(|| 127);
        assert_eq!((action.producer)(), 127);
    }

    #[test]
    fn test_task_action_consumer_sees_value_unchanged() {
        let seen = Arc::new(AtomicBool::new(false));
        let seen_clone = Arc::clone(&seen);
        let action = TaskAction::new(move |v: &i32| {
            assert_eq!(*v, 42);
            seen_clone.store(true, Ordering::SeqCst);
        });
        (action.consumer)(&42);
        assert!(seen.load(Ordering::SeqCst));
    }

    #[test]
    fn test_transmute_action_maps_value() {
        let action = TransmuteAction::new(|v: &i32| v + 1);
        assert_eq!((action.function)(&127), 128);
    }

    #[test]
    fn test_handler_receives_value_on_success_path() {
        let observed = Arc::new(std::sync::Mutex::new(None));
        let observed_clone = Arc::clone(&observed);
        let action = PrimaryAction::with_handler(
            || 7,
            move |value, error| {
                *observed_clone.lock().unwrap() = value.copied();
                assert!(error.is_none());
            },
        );
        let value = (action.producer)();
        (action.handler.unwrap())(Some(&value), None);
        assert_eq!(*observed.lock().unwrap(), Some(7));
    }
}
