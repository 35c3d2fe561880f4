//! `async` interop: awaiting a promise.
//!
//! The outcome is delivered through an ordinary reaction, so whatever drives
//! the promise's scheduler must keep running while the future is awaited.
//! Under [`crate::TokioLocalScheduler`] the runtime does that by itself.

use std::cell::RefCell;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use fidelity_types::{Fulfillment, Rejection, Settled};

use crate::promise::Promise;

struct Slot<T, E> {
    outcome: Option<Settled<T, E>>,
    waker: Option<Waker>,
}

/// Future returned by awaiting a [`Promise`].
pub struct Settle<T, E> {
    slot: Rc<RefCell<Slot<T, E>>>,
}

impl<T: Fulfillment, E: Rejection> Settle<T, E> {
    fn new(promise: &Promise<T, E>) -> Self {
        let slot = Rc::new(RefCell::new(Slot {
            outcome: None,
            waker: None,
        }));
        let sink = Rc::clone(&slot);
        promise.subscribe(move |settled| {
            let waker = {
                let mut slot = sink.borrow_mut();
                slot.outcome = Some(settled);
                slot.waker.take()
            };
            if let Some(waker) = waker {
                waker.wake();
            }
        });
        Self { slot }
    }
}

impl<T, E> Future for Settle<T, E> {
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut slot = self.slot.borrow_mut();
        if let Some(settled) = slot.outcome.take() {
            return Poll::Ready(settled.into_result());
        }
        if !slot.waker.as_ref().is_some_and(|w| w.will_wake(cx.waker())) {
            slot.waker = Some(cx.waker().clone());
        }
        Poll::Pending
    }
}

impl<T: Fulfillment, E: Rejection> IntoFuture for Promise<T, E> {
    type Output = Result<T, E>;
    type IntoFuture = Settle<T, E>;

    fn into_future(self) -> Self::IntoFuture {
        Settle::new(&self)
    }
}
