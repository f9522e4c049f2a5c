//! `Promise<T>` — a chainable handle to one asynchronous computation.
//!
//! State is `PENDING -> FULFILLED | REJECTED`, monotonic and CAS-transitioned
//! (mirroring [`crate::executor::ExecutorState`]'s own CAS state word).
//! Continuations (`then`/`then_accept`/`then_apply`) never run on the caller
//! thread: each submits a new closure to the bound [`crate::executor::ManagedExecutor`]
//! that blocks (via a [`crate::marshal::Latch`], not a spin loop) on the
//! predecessor's terminal signal before running its own body. This keeps the
//! "parallel threads of execution" scheduling model the spec requires without
//! reinventing a reactor.
//!
//! A user task's panic is caught at the stage boundary and converted into a
//! `Rejected` outcome carrying the panic message as its cause — the same
//! `catch_unwind` technique the teacher crate uses to keep a worker thread
//! alive across a user task failure, generalized here to recover the *value*
//! from the panic (not just discard it) as a displayable cause.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use crate::action::{PrimaryAction, TaskAction, TransmuteAction};
use crate::error::{panic_message, BoxCause, Cause};
use crate::event::{self, ActionKind, Event, Subscriber};
use crate::executor::ManagedExecutor;
use crate::marshal::Latch;

/// `PENDING -> FULFILLED | REJECTED`. No other transitions permitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromiseState {
    Pending,
    Fulfilled,
    Rejected,
}

impl PromiseState {
    fn as_u8(self) -> u8 {
        match self {
            PromiseState::Pending => 0,
            PromiseState::Fulfilled => 1,
            PromiseState::Rejected => 2,
        }
    }

    fn from_u8(raw: u8) -> PromiseState {
        match raw {
            0 => PromiseState::Pending,
            1 => PromiseState::Fulfilled,
            _ => PromiseState::Rejected,
        }
    }
}

enum Outcome<T> {
    Fulfilled(Arc<T>),
    Rejected(BoxCause),
}

impl<T> Clone for Outcome<T> {
    fn clone(&self) -> Self {
        match self {
            Outcome::Fulfilled(value) => Outcome::Fulfilled(Arc::clone(value)),
            Outcome::Rejected(cause) => Outcome::Rejected(Arc::clone(cause)),
        }
    }
}

struct Shared<T> {
    id: uuid::Uuid,
    executor: Arc<dyn ManagedExecutor>,
    state: AtomicU8,
    outcome: Mutex<Option<Outcome<T>>>,
    terminal: Latch,
    subscribers: Vec<Arc<dyn Subscriber>>,
}

impl<T> Shared<T> {
    fn new(executor: Arc<dyn ManagedExecutor>, subscribers: Vec<Arc<dyn Subscriber>>) -> Shared<T> {
        Shared {
            id: uuid::Uuid::new_v4(),
            executor,
            state: AtomicU8::new(PromiseState::Pending.as_u8()),
            outcome: Mutex::new(None),
            terminal: Latch::new(),
            subscribers,
        }
    }

    fn complete_rejected(&self, cause: BoxCause) {
        *self.outcome.lock().expect("promise outcome poisoned") = Some(Outcome::Rejected(cause));
        self.state.store(PromiseState::Rejected.as_u8(), Ordering::Release);
        self.terminal.release();
    }

    fn complete_fulfilled(&self, action_kind: ActionKind, value: Arc<T>)
    where
        T: Send + Sync + 'static,
    {
        *self.outcome.lock().expect("promise outcome poisoned") =
            Some(Outcome::Fulfilled(Arc::clone(&value)));
        self.state.store(PromiseState::Fulfilled.as_u8(), Ordering::Release);
        let event = Event::new(action_kind, value);
        event::dispatch(&self.subscribers, &event);
        // Successor stages block on this latch (see `chain`'s
        // `predecessor.terminal.wait()`), so it must not open until
        // subscriber notifications have already run — handler -> subscribers
        // -> successor, strictly in order.
        self.terminal.release();
    }
}

/// A handle to one asynchronous computation. Cheap to clone: every clone
/// shares the same underlying stage and observes the same terminal outcome.
pub struct Promise<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Promise { shared: Arc::clone(&self.shared) }
    }
}

/// Runs a completion handler under `catch_unwind`. A handler that panics is
/// reported as a fresh cause rather than propagated — per spec, a throwing
/// handler downgrades its stage to rejected rather than crashing the worker.
fn run_handler<T>(
    handler: Box<dyn FnOnce(Option<&T>, Option<&BoxCause>) + Send>,
    value: Option<&T>,
    error: Option<&BoxCause>,
) -> Result<(), BoxCause> {
    std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| handler(value, error)))
        .map_err(|payload| Cause::new(panic_message(payload.as_ref())))
}

type Handler<T> = Box<dyn FnOnce(Option<&T>, Option<&BoxCause>) + Send>;

/// Finalizes a stage: runs the completion handler (if any), then transitions
/// the promise to its terminal state. A handler panic overrides a would-be
/// fulfillment into a rejection, per spec section 4.3's ordering contract.
fn finish<T>(
    shared: &Arc<Shared<T>>,
    action_kind: ActionKind,
    outcome: Result<Arc<T>, BoxCause>,
    handler: Option<Handler<T>>,
) where
    T: Send + Sync + 'static,
{
    match outcome {
        Ok(value) => {
            if let Some(handler) = handler {
                if let Err(handler_cause) = run_handler(handler, Some(value.as_ref()), None) {
                    log::error!("completion handler failed: {handler_cause}");
                    shared.complete_rejected(handler_cause);
                    return;
                }
            }
            shared.complete_fulfilled(action_kind, value);
        }
        Err(cause) => {
            if let Some(handler) = handler {
                if let Err(handler_cause) = run_handler(handler, None, Some(&cause)) {
                    log::error!("completion handler failed: {handler_cause}");
                }
            }
            shared.complete_rejected(cause);
        }
    }
}

fn run_primary<T>(producer: Box<dyn FnOnce() -> T + Send>) -> Result<Arc<T>, BoxCause> {
    std::panic::catch_unwind(std::panic::AssertUnwindSafe(producer))
        .map(Arc::new)
        .map_err(|payload| Cause::new(panic_message(payload.as_ref())))
}

fn run_task<T>(consumer: Box<dyn FnOnce(&T) + Send>, value: Arc<T>) -> Result<Arc<T>, BoxCause> {
    let value_for_consumer = Arc::clone(&value);
    std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || consumer(&value_for_consumer)))
        .map(|()| value)
        .map_err(|payload| Cause::new(panic_message(payload.as_ref())))
}

fn run_transmute<T, R>(function: Box<dyn FnOnce(&T) -> R + Send>, value: Arc<T>) -> Result<Arc<R>, BoxCause> {
    std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || function(&value)))
        .map(Arc::new)
        .map_err(|payload| Cause::new(panic_message(payload.as_ref())))
}

/// Submits a continuation stage to the predecessor's bound executor. The
/// continuation blocks (via the predecessor's terminal latch) until the
/// predecessor reaches a terminal state, then either runs `run_stage` (on
/// fulfillment) or propagates the rejection untouched (the continuation's
/// body is never invoked, per spec's rejection-propagation contract).
fn chain<T, R>(
    predecessor: &Arc<Shared<T>>,
    action_kind: ActionKind,
    run_stage: impl FnOnce(Arc<T>) -> Result<Arc<R>, BoxCause> + Send + 'static,
    handler: Option<Handler<R>>,
) -> Promise<R>
where
    T: Send + Sync + 'static,
    R: Send + Sync + 'static,
{
    let executor = Arc::clone(&predecessor.executor);
    let subscribers = predecessor.subscribers.clone();
    let shared = Arc::new(Shared::new(Arc::clone(&executor), subscribers));
    let worker_shared = Arc::clone(&shared);
    let predecessor = Arc::clone(predecessor);

    let submitted = executor.execute(Box::new(move || {
        predecessor.terminal.wait();
        let outcome = predecessor.outcome.lock().expect("promise outcome poisoned").clone();
        match outcome {
            Some(Outcome::Fulfilled(value)) => {
                let result = run_stage(value);
                finish(&worker_shared, action_kind, result, handler);
            }
            Some(Outcome::Rejected(cause)) => {
                worker_shared.complete_rejected(cause);
            }
            None => unreachable!("terminal latch released without an outcome recorded"),
        }
    }));

    if submitted.is_err() {
        shared.complete_rejected(Cause::new("promise bound to a shut-down executor"));
    }

    Promise { shared }
}

impl<T> Promise<T>
where
    T: Send + Sync + 'static,
{
    /// Instantiates a promise, submitting `action`'s producer to `executor`
    /// immediately. Returns in the `PENDING` state; if the executor is not
    /// accepting work, the promise is immediately rejected with an
    /// executor-closed cause.
    pub fn new_promise(
        executor: Arc<dyn ManagedExecutor>,
        action: PrimaryAction<T>,
        subscribers: Vec<Arc<dyn Subscriber>>,
    ) -> Promise<T> {
        let shared = Arc::new(Shared::new(Arc::clone(&executor), subscribers));
        let worker_shared = Arc::clone(&shared);
        let PrimaryAction { producer, handler } = action;

        let submitted = executor.execute(Box::new(move || {
            let result = run_primary(producer);
            finish(&worker_shared, ActionKind::Primary, result, handler);
        }));

        if submitted.is_err() {
            shared.complete_rejected(Cause::new("promise bound to a shut-down executor"));
        }

        Promise { shared }
    }

    pub fn id(&self) -> uuid::Uuid {
        self.shared.id
    }

    pub fn state(&self) -> PromiseState {
        PromiseState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    /// Schedules a consumer continuation. The returned promise's value is
    /// the predecessor's value, unchanged; if the predecessor is rejected the
    /// consumer never runs and the rejection propagates.
    pub fn then(&self, action: TaskAction<T>) -> Promise<T> {
        let TaskAction { consumer, handler } = action;
        chain(&self.shared, ActionKind::Task, move |value| run_task(consumer, value), handler)
    }

    /// Schedules a function continuation mapping `T -> R`.
    pub fn then_transmute<R>(&self, action: TransmuteAction<T, R>) -> Promise<R>
    where
        R: Send + Sync + 'static,
    {
        let TransmuteAction { function, handler } = action;
        chain(&self.shared, ActionKind::Transmute, move |value| run_transmute(function, value), handler)
    }

    /// Sugar for `then(TaskAction::new(consumer))`.
    pub fn then_accept(&self, consumer: impl FnOnce(&T) + Send + 'static) -> Promise<T> {
        self.then(TaskAction::new(consumer))
    }

    /// Sugar for `then_transmute(TransmuteAction::new(function))`.
    pub fn then_apply<R>(&self, function: impl FnOnce(&T) -> R + Send + 'static) -> Promise<R>
    where
        R: Send + Sync + 'static,
    {
        self.then_transmute(TransmuteAction::new(function))
    }

    /// Blocks until terminal; returns `None` on rejection or cancellation,
    /// `Some` with the fulfilled value otherwise. Never raises.
    pub fn get_result(&self) -> Option<Arc<T>> {
        self.shared.terminal.wait();
        match self.shared.outcome.lock().expect("promise outcome poisoned").clone() {
            Some(Outcome::Fulfilled(value)) => Some(value),
            Some(Outcome::Rejected(_)) => None,
            None => unreachable!("terminal latch released without an outcome recorded"),
        }
    }

    /// Blocks until terminal, swallowing any rejection cause, and returns a
    /// handle for fluent chaining.
    pub fn await_done(&self) -> Promise<T> {
        self.shared.terminal.wait();
        self.clone()
    }

    /// Blocks until terminal; on rejection, invokes `consumer` on the calling
    /// thread with the originating cause. A no-op on fulfillment. Returns a
    /// handle for fluent chaining.
    pub fn handle(&self, consumer: impl FnOnce(&BoxCause)) -> Promise<T> {
        self.shared.terminal.wait();
        if let Some(Outcome::Rejected(cause)) =
            self.shared.outcome.lock().expect("promise outcome poisoned").clone()
        {
            consumer(&cause);
        }
        self.clone()
    }

    /// Issues each of `producers` as an independent promise on `executor`.
    /// The composite promise fulfills once every inner promise reaches a
    /// terminal state; with `fail_fast=true`, the composite instead rejects
    /// as soon as any inner promise rejects (first-observed rejection wins —
    /// see the configuration decisions in this crate's design notes).
    pub fn all<R>(
        executor: Arc<dyn ManagedExecutor>,
        producers: Vec<Box<dyn FnOnce() -> R + Send>>,
        fail_fast: bool,
    ) -> Promise<Vec<Promise<R>>>
    where
        R: Send + Sync + 'static,
    {
        let inner_promises: Vec<Promise<R>> = producers
            .into_iter()
            .map(|producer| {
                Promise::new_promise(Arc::clone(&executor), PrimaryAction { producer, handler: None }, Vec::new())
            })
            .collect();

        let waiters = inner_promises.clone();
        Promise::new_promise(
            executor,
            PrimaryAction::new(move || {
                if fail_fast {
                    // Race every inner promise's completion through one channel: whichever
                    // rejection is observed first on `rx` wins the tie-break (first-observed,
                    // not a priority order — see this crate's design notes).
                    let (tx, rx) = std::sync::mpsc::channel();
                    let watchers: Vec<_> = waiters
                        .iter()
                        .map(|promise| {
                            let promise = promise.clone();
                            let tx = tx.clone();
                            std::thread::spawn(move || {
                                promise.await_done();
                                let _ = tx.send(promise.state());
                            })
                        })
                        .collect();
                    drop(tx);

                    let mut rejected = false;
                    for _ in 0..waiters.len() {
                        match rx.recv() {
                            Ok(PromiseState::Rejected) => {
                                rejected = true;
                                break;
                            }
                            Ok(_) => {}
                            Err(_) => break,
                        }
                    }
                    if rejected {
                        // Reject promptly -- the watchers still waiting on
                        // slower inner promises are detached, not joined, so
                        // the composite doesn't block on promises that
                        // haven't rejected.
                        drop(watchers);
                        panic!("composite promise fail-fast rejection");
                    }
                    for watcher in watchers {
                        let _ = watcher.join();
                    }
                } else {
                    for promise in &waiters {
                        promise.await_done();
                    }
                }
                waiters
            }),
            Vec::new(),
        )
    }
}

impl<T> std::fmt::Debug for Promise<T>
where
    T: Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Promise").field("id", &self.shared.id).field("state", &self.state()).finish()
    }
}
