//! Aggregate combinators built on the public promise contract.
//!
//! Inputs are anything convertible to a [`Resolution`]: native promises, plain
//! values (`Resolution::Value`), or thenables. Plain values count as already
//! fulfilled. Wiring happens synchronously; results arrive through ordinary
//! reactions, so even all-plain inputs settle the aggregate asynchronously.
//! The one exception is an empty `all`, which fulfills immediately.

use std::cell::RefCell;
use std::rc::Rc;

use fidelity_types::{Fulfillment, Rejection, Settled};

use crate::deferred::Deferred;
use crate::promise::Promise;
use crate::resolution::Resolution;

/// Fulfill with every input's value, in input order, or reject with the
/// first rejection to occur.
///
/// Inputs that settle after the aggregate rejected are ignored; nothing is
/// cancelled.
pub fn all<T, E, I>(inputs: I) -> Promise<Vec<T>, E>
where
    T: Fulfillment,
    E: Rejection,
    I: IntoIterator,
    I::Item: Into<Resolution<T, E>>,
{
    let inputs: Vec<Promise<T, E>> = inputs.into_iter().map(Promise::resolve).collect();
    let Deferred {
        promise,
        resolve,
        reject,
    } = Deferred::new();

    if inputs.is_empty() {
        resolve.fulfill(Vec::new());
        return promise;
    }

    let tally = Rc::new(RefCell::new(Tally::new(inputs.len())));
    for (index, input) in inputs.into_iter().enumerate() {
        let tally = Rc::clone(&tally);
        let resolve = resolve.clone();
        let reject = reject.clone();
        input.subscribe(move |settled| match settled {
            Settled::Fulfilled(value) => {
                let complete = tally.borrow_mut().record(index, value);
                if let Some(values) = complete {
                    resolve.fulfill(values);
                }
            }
            Settled::Rejected(reason) => reject.reject(reason),
        });
    }
    promise
}

/// Settle like whichever input settles first.
///
/// With no inputs the result stays pending forever.
pub fn race<T, E, I>(inputs: I) -> Promise<T, E>
where
    T: Fulfillment,
    E: Rejection,
    I: IntoIterator,
    I::Item: Into<Resolution<T, E>>,
{
    let Deferred {
        promise,
        resolve,
        reject,
    } = Deferred::new();

    for input in inputs {
        let resolve = resolve.clone();
        let reject = reject.clone();
        Promise::resolve(input).subscribe(move |settled| match settled {
            Settled::Fulfilled(value) => resolve.fulfill(value),
            Settled::Rejected(reason) => reject.reject(reason),
        });
    }
    promise
}

/// Positional results collected by `all`.
struct Tally<T> {
    values: Vec<Option<T>>,
    remaining: usize,
}

impl<T> Tally<T> {
    fn new(len: usize) -> Self {
        Self {
            values: (0..len).map(|_| None).collect(),
            remaining: len,
        }
    }

    /// Store `value` at `index`; returns every value once the last one lands.
    fn record(&mut self, index: usize, value: T) -> Option<Vec<T>> {
        self.values[index] = Some(value);
        self.remaining -= 1;
        if self.remaining > 0 {
            return None;
        }
        Some(self.values.drain(..).flatten().collect())
    }
}
