//! The promise resolution procedure.
//!
//! Resolving a promise is not the same as fulfilling it. A resolution can be a
//! plain value, another native [`Promise`] whose state is adopted, or a foreign
//! [`Thenable`] that is assimilated by handing it a fresh pair of resolving
//! functions.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use fidelity_types::{CyclicResolution, Fulfillment, Rejection, Settled};

use crate::promise::Promise;

/// What a promise can be resolved with.
pub enum Resolution<T, E> {
    /// A plain value. The promise is fulfilled with it as-is.
    Value(T),
    /// A native promise. Its state is adopted.
    Promise(Promise<T, E>),
    /// A foreign future. It is asked to report its outcome through callbacks.
    Thenable(Box<dyn Thenable<T, E>>),
}

impl<T, E> Resolution<T, E> {
    pub fn thenable(thenable: impl Thenable<T, E> + 'static) -> Self {
        Resolution::Thenable(Box::new(thenable))
    }
}

impl<T, E> From<Promise<T, E>> for Resolution<T, E> {
    fn from(promise: Promise<T, E>) -> Self {
        Resolution::Promise(promise)
    }
}

impl<T, E> From<Box<dyn Thenable<T, E>>> for Resolution<T, E> {
    fn from(thenable: Box<dyn Thenable<T, E>>) -> Self {
        Resolution::Thenable(thenable)
    }
}

impl<T: fmt::Debug, E> fmt::Debug for Resolution<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Resolution::Promise(promise) => f.debug_tuple("Promise").field(&promise.id()).finish(),
            Resolution::Thenable(_) => f.write_str("Thenable(..)"),
        }
    }
}

/// A foreign source of an eventual value.
///
/// `then` is called at most once, synchronously, during resolution. The
/// implementation reports its outcome by calling `resolve` or `reject`, now or
/// later; only the first of those calls counts.
///
/// Returning `Err` stands for `then` itself failing. The promise is rejected
/// with that reason unless one of the callbacks already ran, in which case the
/// error is discarded.
pub trait Thenable<T, E> {
    fn then(self: Box<Self>, resolve: Resolve<T, E>, reject: Reject<T, E>) -> Result<(), E>;
}

impl<T, E, F> Thenable<T, E> for F
where
    F: FnOnce(Resolve<T, E>, Reject<T, E>) -> Result<(), E>,
{
    fn then(self: Box<Self>, resolve: Resolve<T, E>, reject: Reject<T, E>) -> Result<(), E> {
        (*self)(resolve, reject)
    }
}

// ============================================================================
// Resolving functions
// ============================================================================

/// Resolves its promise. Shares a once-guard with the matching [`Reject`].
pub struct Resolve<T, E> {
    promise: Promise<T, E>,
    called: Rc<Cell<bool>>,
}

/// Rejects its promise. Shares a once-guard with the matching [`Resolve`].
pub struct Reject<T, E> {
    promise: Promise<T, E>,
    called: Rc<Cell<bool>>,
}

/// A fresh resolve/reject pair for `promise`. Across the pair and all of its
/// clones, only the first call has any effect.
pub(crate) fn resolving_functions<T, E>(promise: &Promise<T, E>) -> (Resolve<T, E>, Reject<T, E>) {
    let called = Rc::new(Cell::new(false));
    (
        Resolve {
            promise: promise.clone(),
            called: Rc::clone(&called),
        },
        Reject {
            promise: promise.clone(),
            called,
        },
    )
}

impl<T: Fulfillment, E: Rejection> Resolve<T, E> {
    pub fn resolve(&self, value: impl Into<Resolution<T, E>>) {
        if !self.called.replace(true) {
            resolve_promise(&self.promise, value.into());
        }
    }

    pub fn fulfill(&self, value: T) {
        self.resolve(Resolution::Value(value));
    }
}

impl<T: Fulfillment, E: Rejection> Reject<T, E> {
    pub fn reject(&self, reason: E) {
        if !self.called.replace(true) {
            self.promise.settle(Settled::Rejected(reason));
        }
    }
}

impl<T, E> Resolve<T, E> {
    /// Whether this pair has already been used.
    #[must_use]
    pub fn is_spent(&self) -> bool {
        self.called.get()
    }
}

impl<T, E> Reject<T, E> {
    #[must_use]
    pub fn is_spent(&self) -> bool {
        self.called.get()
    }
}

impl<T, E> Clone for Resolve<T, E> {
    fn clone(&self) -> Self {
        Self {
            promise: self.promise.clone(),
            called: Rc::clone(&self.called),
        }
    }
}

impl<T, E> Clone for Reject<T, E> {
    fn clone(&self) -> Self {
        Self {
            promise: self.promise.clone(),
            called: Rc::clone(&self.called),
        }
    }
}

impl<T, E> fmt::Debug for Resolve<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolve")
            .field("promise", &self.promise.id())
            .field("spent", &self.called.get())
            .finish()
    }
}

impl<T, E> fmt::Debug for Reject<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reject")
            .field("promise", &self.promise.id())
            .field("spent", &self.called.get())
            .finish()
    }
}

// ============================================================================
// Procedure
// ============================================================================

pub(crate) fn resolve_promise<T: Fulfillment, E: Rejection>(
    promise: &Promise<T, E>,
    resolution: Resolution<T, E>,
) {
    match resolution {
        Resolution::Value(value) => promise.settle(Settled::Fulfilled(value)),
        Resolution::Promise(other) => adopt(promise, &other),
        Resolution::Thenable(thenable) => assimilate(promise, thenable),
    }
}

fn adopt<T: Fulfillment, E: Rejection>(promise: &Promise<T, E>, other: &Promise<T, E>) {
    if promise.ptr_eq(other) {
        tracing::debug!(promise = %promise.id(), "Promise resolved with itself");
        promise.settle(Settled::Rejected(E::from(CyclicResolution)));
        return;
    }

    if let Some(settled) = other.value() {
        other.mark_handled();
        promise.settle(settled);
        return;
    }

    let target = promise.clone();
    other.subscribe(move |settled| target.settle(settled));
}

fn assimilate<T: Fulfillment, E: Rejection>(
    promise: &Promise<T, E>,
    thenable: Box<dyn Thenable<T, E>>,
) {
    let (resolve, reject) = resolving_functions(promise);
    let fallback = reject.clone();
    if let Err(reason) = thenable.then(resolve, reject) {
        // No-op when a callback already ran.
        fallback.reject(reason);
    }
}
