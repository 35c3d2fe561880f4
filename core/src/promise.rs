//! The promise state machine.
//!
//! A [`Promise`] is a shared handle to a single state cell. The cell moves from
//! pending to fulfilled or rejected at most once; after that its value never
//! changes. Reactions registered with `then` and friends are queued on the
//! cell and dispatched, in registration order, by a job handed to the
//! promise's [`Scheduler`] once the cell is settled.
//!
//! # Invariants
//!
//! - A settled promise never transitions again; late resolve/reject calls are no-ops.
//! - Reaction handlers never run inside the call that registered them.
//! - Each reaction runs exactly once and is removed from the queue as it runs.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::{fmt, mem, thread};

use fidelity_types::{Fulfillment, PromiseId, PromiseState, Rejection, Settled};

use crate::diagnostics;
use crate::resolution::{Reject, Resolution, Resolve, resolve_promise, resolving_functions};
use crate::scheduler::{self, Scheduler};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

enum State<T, E> {
    Pending,
    Fulfilled(T),
    Rejected(E),
}

impl<T, E> State<T, E> {
    fn kind(&self) -> PromiseState {
        match self {
            State::Pending => PromiseState::Pending,
            State::Fulfilled(_) => PromiseState::Fulfilled,
            State::Rejected(_) => PromiseState::Rejected,
        }
    }
}

impl<T: Clone, E: Clone> State<T, E> {
    fn settled(&self) -> Option<Settled<T, E>> {
        match self {
            State::Pending => None,
            State::Fulfilled(value) => Some(Settled::Fulfilled(value.clone())),
            State::Rejected(reason) => Some(Settled::Rejected(reason.clone())),
        }
    }
}

impl<T, E> From<Settled<T, E>> for State<T, E> {
    fn from(settled: Settled<T, E>) -> Self {
        match settled {
            Settled::Fulfilled(value) => State::Fulfilled(value),
            Settled::Rejected(reason) => State::Rejected(reason),
        }
    }
}

/// A queued continuation. `derived` names the promise the continuation will
/// settle, when there is one.
struct Reaction<T, E> {
    derived: Option<PromiseId>,
    run: Box<dyn FnOnce(Settled<T, E>)>,
}

struct Inner<T, E> {
    id: PromiseId,
    state: State<T, E>,
    reactions: VecDeque<Reaction<T, E>>,
    scheduler: Rc<dyn Scheduler>,
    dispatch_scheduled: bool,
    handled: bool,
    retire: fn(VecDeque<Reaction<T, E>>),
}

impl<T, E> Drop for Inner<T, E> {
    fn drop(&mut self) {
        if matches!(self.state, State::Rejected(_)) && !self.handled {
            diagnostics::report_unhandled(self.id);
        }
        let reactions = mem::take(&mut self.reactions);
        if !reactions.is_empty() {
            (self.retire)(reactions);
        }
    }
}

// ============================================================================
// Teardown
// ============================================================================

// Pending reactions own the promises they settle, so dropping the head of a
// long chain would otherwise drop every link recursively.
thread_local! {
    static RETIRED: RefCell<Vec<Box<dyn Any>>> = const { RefCell::new(Vec::new()) };
    static RETIRING: Cell<bool> = const { Cell::new(false) };
}

/// Drop `reactions` without recursing into the promises they own.
///
/// Nested calls only queue their batch; the outermost call drains the queue.
fn retire_reactions<T: 'static, E: 'static>(reactions: VecDeque<Reaction<T, E>>) {
    let batch: Box<dyn Any> = Box::new(reactions);
    if RETIRED
        .try_with(|retired| retired.borrow_mut().push(batch))
        .is_err()
    {
        return;
    }
    if RETIRING
        .try_with(|retiring| retiring.replace(true))
        .unwrap_or(true)
    {
        return;
    }

    let _reset = RetiringReset;
    while let Some(batch) = RETIRED
        .try_with(|retired| retired.borrow_mut().pop())
        .ok()
        .flatten()
    {
        drop(batch);
    }
}

struct RetiringReset;

impl Drop for RetiringReset {
    fn drop(&mut self) {
        let _ = RETIRING.try_with(|retiring| retiring.set(false));
    }
}

/// The eventual result of an operation that may fulfill, reject, or never settle.
///
/// Cloning a `Promise` clones the handle, not the state: every clone observes
/// and drives the same state cell.
pub struct Promise<T, E> {
    inner: Rc<RefCell<Inner<T, E>>>,
}

impl<T, E> Clone for Promise<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T, E> fmt::Debug for Promise<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Promise")
            .field("id", &inner.id)
            .field("state", &inner.state.kind())
            .field("reactions", &inner.reactions.len())
            .finish()
    }
}

impl<T, E> Promise<T, E> {
    #[must_use]
    pub fn id(&self) -> PromiseId {
        self.inner.borrow().id
    }

    #[must_use]
    pub fn state(&self) -> PromiseState {
        self.inner.borrow().state.kind()
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self.inner.borrow().state, State::Pending)
    }

    /// Whether both handles refer to the same promise.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn mark_handled(&self) {
        self.inner.borrow_mut().handled = true;
    }

    fn scheduler(&self) -> Rc<dyn Scheduler> {
        Rc::clone(&self.inner.borrow().scheduler)
    }
}

impl<T: Fulfillment, E: Rejection> Promise<T, E> {
    fn with_state(scheduler: Rc<dyn Scheduler>, state: State<T, E>) -> Self {
        let id = PromiseId::new(NEXT_ID.fetch_add(1, Ordering::Relaxed));
        Self {
            inner: Rc::new(RefCell::new(Inner {
                id,
                state,
                reactions: VecDeque::new(),
                scheduler,
                dispatch_scheduled: false,
                handled: false,
                retire: retire_reactions::<T, E>,
            })),
        }
    }

    /// Run `executor` immediately with this promise's resolving functions.
    ///
    /// An `Err` returned by the executor rejects the promise, unless the
    /// executor already resolved or rejected it.
    pub fn new<F>(executor: F) -> Self
    where
        F: FnOnce(Resolve<T, E>, Reject<T, E>) -> Result<(), E>,
    {
        Self::new_in(scheduler::current(), executor)
    }

    /// Like [`Promise::new`], dispatching reactions on `scheduler`.
    pub fn new_in<F>(scheduler: Rc<dyn Scheduler>, executor: F) -> Self
    where
        F: FnOnce(Resolve<T, E>, Reject<T, E>) -> Result<(), E>,
    {
        let promise = Self::pending_in(scheduler);
        let (resolve, reject) = resolving_functions(&promise);
        if let Err(reason) = executor(resolve, reject.clone()) {
            tracing::debug!(promise = %promise.id(), "Executor failed; rejecting");
            reject.reject(reason);
        }
        promise
    }

    /// A promise with no executor. It stays pending forever unless it is
    /// adopted through other means.
    #[must_use]
    pub fn pending() -> Self {
        Self::pending_in(scheduler::current())
    }

    #[must_use]
    pub fn pending_in(scheduler: Rc<dyn Scheduler>) -> Self {
        Self::with_state(scheduler, State::Pending)
    }

    /// A promise already fulfilled with `value`.
    #[must_use]
    pub fn resolved(value: T) -> Self {
        Self::with_state(scheduler::current(), State::Fulfilled(value))
    }

    /// A promise already rejected with `reason`.
    #[must_use]
    pub fn rejected(reason: E) -> Self {
        Self::with_state(scheduler::current(), State::Rejected(reason))
    }

    /// Turn anything resolvable into a promise.
    ///
    /// A native promise is returned unchanged. A plain value yields an
    /// already-fulfilled promise, and a thenable yields a promise that
    /// assimilates it.
    pub fn resolve(value: impl Into<Resolution<T, E>>) -> Self {
        match value.into() {
            Resolution::Promise(promise) => promise,
            Resolution::Value(value) => Self::resolved(value),
            thenable @ Resolution::Thenable(_) => {
                let promise = Self::pending();
                resolve_promise(&promise, thenable);
                promise
            }
        }
    }

    /// Settled outcome, or `None` while pending.
    #[must_use]
    pub fn value(&self) -> Option<Settled<T, E>> {
        self.inner.borrow().state.settled()
    }

    /// Fulfillment handler only. A rejection passes through to the derived promise.
    pub fn then<U, F>(&self, on_fulfilled: F) -> Promise<U, E>
    where
        U: Fulfillment,
        F: FnOnce(T) -> Result<U, E> + 'static,
    {
        self.react(move |settled| match settled {
            Settled::Fulfilled(value) => on_fulfilled(value).map(Resolution::Value),
            Settled::Rejected(reason) => Err(reason),
        })
    }

    pub fn then_or_else<U, F, G>(&self, on_fulfilled: F, on_rejected: G) -> Promise<U, E>
    where
        U: Fulfillment,
        F: FnOnce(T) -> Result<U, E> + 'static,
        G: FnOnce(E) -> Result<U, E> + 'static,
    {
        self.react(move |settled| match settled {
            Settled::Fulfilled(value) => on_fulfilled(value).map(Resolution::Value),
            Settled::Rejected(reason) => on_rejected(reason).map(Resolution::Value),
        })
    }

    /// Rejection handler only. A fulfillment passes through unchanged.
    pub fn catch<G>(&self, on_rejected: G) -> Self
    where
        G: FnOnce(E) -> Result<T, E> + 'static,
    {
        self.react(move |settled| match settled {
            Settled::Fulfilled(value) => Ok(Resolution::Value(value)),
            Settled::Rejected(reason) => on_rejected(reason).map(Resolution::Value),
        })
    }

    /// A derived promise with neither handler: it mirrors this one.
    pub fn fork(&self) -> Self {
        self.react(|settled| settled.into_result().map(Resolution::Value))
    }

    /// Like [`Promise::then`], but the handler's result goes through the
    /// resolution procedure, so a returned promise or thenable is adopted.
    pub fn and_then<U, F>(&self, on_fulfilled: F) -> Promise<U, E>
    where
        U: Fulfillment,
        F: FnOnce(T) -> Result<Resolution<U, E>, E> + 'static,
    {
        self.react(move |settled| match settled {
            Settled::Fulfilled(value) => on_fulfilled(value),
            Settled::Rejected(reason) => Err(reason),
        })
    }

    /// Like [`Promise::catch`], with the handler's result adopted.
    pub fn or_else<G>(&self, on_rejected: G) -> Self
    where
        G: FnOnce(E) -> Result<Resolution<T, E>, E> + 'static,
    {
        self.react(move |settled| match settled {
            Settled::Fulfilled(value) => Ok(Resolution::Value(value)),
            Settled::Rejected(reason) => on_rejected(reason),
        })
    }

    /// See [`crate::all`].
    pub fn all<I>(inputs: I) -> Promise<Vec<T>, E>
    where
        I: IntoIterator,
        I::Item: Into<Resolution<T, E>>,
    {
        crate::combinators::all(inputs)
    }

    /// See [`crate::race`].
    pub fn race<I>(inputs: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Resolution<T, E>>,
    {
        crate::combinators::race(inputs)
    }

    /// Register `handler` and return the promise its outcome settles.
    ///
    /// `Ok` resolves the derived promise through the resolution procedure;
    /// `Err` rejects it.
    fn react<U, H>(&self, handler: H) -> Promise<U, E>
    where
        U: Fulfillment,
        H: FnOnce(Settled<T, E>) -> Result<Resolution<U, E>, E> + 'static,
    {
        let derived = Promise::pending_in(self.scheduler());
        let target = derived.clone();
        self.enqueue(
            Some(derived.id()),
            Box::new(move |settled| match handler(settled) {
                Ok(resolution) => resolve_promise(&target, resolution),
                Err(reason) => target.settle(Settled::Rejected(reason)),
            }),
        );
        derived
    }

    /// Register an observer with no derived promise.
    pub(crate) fn subscribe(&self, observer: impl FnOnce(Settled<T, E>) + 'static) {
        self.enqueue(None, Box::new(observer));
    }

    fn enqueue(&self, derived: Option<PromiseId>, run: Box<dyn FnOnce(Settled<T, E>)>) {
        {
            let mut inner = self.inner.borrow_mut();
            inner.handled = true;
            inner.reactions.push_back(Reaction { derived, run });
        }
        self.schedule_dispatch();
    }

    /// Transition out of pending. No-op once settled.
    pub(crate) fn settle(&self, outcome: Settled<T, E>) {
        {
            let mut inner = self.inner.borrow_mut();
            if !matches!(inner.state, State::Pending) {
                return;
            }
            tracing::trace!(promise = %inner.id, state = %outcome.state(), "Promise settled");
            inner.state = outcome.into();
        }
        self.schedule_dispatch();
    }

    fn schedule_dispatch(&self) {
        let scheduler = {
            let mut inner = self.inner.borrow_mut();
            if matches!(inner.state, State::Pending)
                || inner.dispatch_scheduled
                || inner.reactions.is_empty()
            {
                return;
            }
            inner.dispatch_scheduled = true;
            Rc::clone(&inner.scheduler)
        };
        let promise = self.clone();
        scheduler.defer(Box::new(move || promise.drain_reactions()));
    }

    /// Run queued reactions in order until the queue is empty. Reactions
    /// registered while draining join the same pass.
    fn drain_reactions(&self) {
        let _unwind = DrainGuard { promise: self };
        loop {
            let next = {
                let mut inner = self.inner.borrow_mut();
                let next = inner
                    .reactions
                    .pop_front()
                    .and_then(|reaction| inner.state.settled().map(|s| (reaction, s)));
                if next.is_none() {
                    inner.dispatch_scheduled = false;
                }
                next
            };
            let Some((reaction, settled)) = next else {
                return;
            };

            tracing::trace!(
                promise = %self.id(),
                derived = reaction.derived.map(PromiseId::value),
                "Running reaction"
            );
            (reaction.run)(settled);
        }
    }
}

/// Hands the rest of the queue back to the scheduler if a reaction panics.
struct DrainGuard<'a, T: Fulfillment, E: Rejection> {
    promise: &'a Promise<T, E>,
}

impl<T: Fulfillment, E: Rejection> Drop for DrainGuard<'_, T, E> {
    fn drop(&mut self) {
        if !thread::panicking() {
            return;
        }
        let Ok(mut inner) = self.promise.inner.try_borrow_mut() else {
            return;
        };
        inner.dispatch_scheduled = false;
        tracing::debug!(
            promise = %inner.id,
            remaining = inner.reactions.len(),
            "Reaction panicked; rescheduling dispatch"
        );
        drop(inner);
        self.promise.schedule_dispatch();
    }
}
