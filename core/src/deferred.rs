//! Deferred pairs: a promise exposed alongside its resolving functions.

use std::fmt;
use std::rc::Rc;

use fidelity_types::{Fulfillment, Rejection};

use crate::promise::Promise;
use crate::resolution::{Reject, Resolve, resolving_functions};
use crate::scheduler::{self, Scheduler};

/// A pending promise together with the functions that settle it.
///
/// Producer code keeps `resolve`/`reject`, consumer code gets `promise`.
/// Only the first call across `resolve` and `reject` has any effect.
pub struct Deferred<T, E> {
    pub promise: Promise<T, E>,
    pub resolve: Resolve<T, E>,
    pub reject: Reject<T, E>,
}

impl<T: Fulfillment, E: Rejection> Deferred<T, E> {
    #[must_use]
    pub fn new() -> Self {
        Self::new_in(scheduler::current())
    }

    #[must_use]
    pub fn new_in(scheduler: Rc<dyn Scheduler>) -> Self {
        let promise = Promise::pending_in(scheduler);
        let (resolve, reject) = resolving_functions(&promise);
        Self {
            promise,
            resolve,
            reject,
        }
    }
}

impl<T: Fulfillment, E: Rejection> Default for Deferred<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> fmt::Debug for Deferred<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("promise", &self.promise)
            .field("spent", &self.resolve.is_spent())
            .finish()
    }
}

/// Shorthand for [`Deferred::new`].
#[must_use]
pub fn deferred<T: Fulfillment, E: Rejection>() -> Deferred<T, E> {
    Deferred::new()
}
