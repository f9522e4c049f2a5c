//! Lifecycle events broadcast to a promise's subscribers.
//!
//! One [`Event`] is published after each stage in a promise chain fulfills;
//! subscribers are invoked inside the executor worker, in registration order,
//! with subscriber panics/errors caught and logged rather than propagated.
//!
//! A subscriber registered on a promise's factory call observes every stage
//! in that promise's chain (`new_promise([L1,L2,L3]).then(...).then(...)`
//! delivers three events to each listener, per the subscriber-counting
//! property), and a `Transmute` stage can change the chain's value type
//! mid-flight. Rather than parameterize `Subscriber` by the original `T` (and
//! lose type-safety at exactly the seam that changes type), the event's
//! value is type-erased behind `Arc<dyn Any + Send + Sync>`; subscribers
//! that care about a particular stage's payload downcast it.

use std::any::Any;
use std::sync::Arc;

/// Which kind of [`crate::action::Action`] produced an [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Primary,
    Task,
    Transmute,
}

/// A single lifecycle notification delivered to a promise's subscribers.
pub struct Event {
    pub event_id: uuid::Uuid,
    pub action_kind: ActionKind,
    pub value: Arc<dyn Any + Send + Sync>,
}

impl Event {
    pub fn new(action_kind: ActionKind, value: Arc<dyn Any + Send + Sync>) -> Event {
        Event { event_id: uuid::Uuid::new_v4(), action_kind, value }
    }

    /// Downcasts the event's value to `T`, the type the caller expects for
    /// this particular stage.
    pub fn value_as<T: 'static>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }
}

/// A lifecycle subscriber. Invoked on the worker thread that completed the
/// stage; must not block indefinitely since it runs inline with the promise
/// chain's execution.
pub trait Subscriber: Send + Sync {
    fn on_event(&self, event: &Event);
}

impl<F> Subscriber for F
where
    F: Fn(&Event) + Send + Sync,
{
    fn on_event(&self, event: &Event) {
        self(event)
    }
}

/// Dispatches `event` to every subscriber in registration order. Each
/// subscriber is invoked inside a `catch_unwind` boundary so a panicking
/// subscriber cannot take down the worker or block later subscribers.
pub fn dispatch(subscribers: &[Arc<dyn Subscriber>], event: &Event) {
    for subscriber in subscribers {
        let subscriber = std::panic::AssertUnwindSafe(subscriber.as_ref());
        let event = std::panic::AssertUnwindSafe(event);
        let result = std::panic::catch_unwind(move || subscriber.0.on_event(event.0));
        if let Err(payload) = result {
            log::error!(
                "subscriber panicked during event dispatch: {}",
                crate::error::panic_message(payload.as_ref())
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[test]
    fn test_dispatch_invokes_in_registration_order() {
        let order: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));
        let make = |tag: u8, order: Arc<Mutex<Vec<u8>>>| -> Arc<dyn Subscriber> {
            Arc::new(move |_event: &Event| order.lock().unwrap().push(tag))
        };
        let subscribers: Vec<Arc<dyn Subscriber>> =
            vec![make(1, Arc::clone(&order)), make(2, Arc::clone(&order)), make(3, Arc::clone(&order))];
        let event = Event::new(ActionKind::Primary, Arc::new(7i32));
        dispatch(&subscribers, &event);
        assert_eq!(*order.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_dispatch_survives_panicking_subscriber() {
        let count = Arc::new(AtomicUsize::new(0));
        let panicking: Arc<dyn Subscriber> = Arc::new(|_event: &Event| {
            panic!("subscriber blew up");
        });
        let counting: Arc<dyn Subscriber> = {
            let count = Arc::clone(&count);
            Arc::new(move |_event: &Event| {
                count.fetch_add(1, Ordering::SeqCst);
            })
        };
        let subscribers = vec![panicking, counting];
        let event = Event::new(ActionKind::Task, Arc::new(1i32));
        dispatch(&subscribers, &event);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_value_as_downcasts_to_expected_type() {
        let event = Event::new(ActionKind::Transmute, Arc::new(String::from("hello")));
        assert_eq!(event.value_as::<String>().map(String::as_str), Some("hello"));
        assert_eq!(event.value_as::<i32>(), None);
    }
}
