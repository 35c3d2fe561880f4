//! Promise lifecycle states and settled outcomes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Observable lifecycle state of a promise.
///
/// `Pending` is the only non-terminal state. A promise moves out of it at most
/// once, into either `Fulfilled` or `Rejected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromiseState {
    #[default]
    Pending,
    Fulfilled,
    Rejected,
}

impl PromiseState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            PromiseState::Pending => "pending",
            PromiseState::Fulfilled => "fulfilled",
            PromiseState::Rejected => "rejected",
        }
    }

    #[must_use]
    pub fn is_settled(self) -> bool {
        !matches!(self, PromiseState::Pending)
    }
}

impl fmt::Display for PromiseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal outcome of a promise: the fulfillment value or the rejection reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settled<T, E> {
    Fulfilled(T),
    Rejected(E),
}

impl<T, E> Settled<T, E> {
    #[must_use]
    pub fn state(&self) -> PromiseState {
        match self {
            Settled::Fulfilled(_) => PromiseState::Fulfilled,
            Settled::Rejected(_) => PromiseState::Rejected,
        }
    }

    pub fn into_result(self) -> Result<T, E> {
        match self {
            Settled::Fulfilled(value) => Ok(value),
            Settled::Rejected(reason) => Err(reason),
        }
    }

    #[must_use]
    pub fn fulfilled(self) -> Option<T> {
        match self {
            Settled::Fulfilled(value) => Some(value),
            Settled::Rejected(_) => None,
        }
    }

    #[must_use]
    pub fn rejected(self) -> Option<E> {
        match self {
            Settled::Fulfilled(_) => None,
            Settled::Rejected(reason) => Some(reason),
        }
    }
}

impl<T, E> From<Result<T, E>> for Settled<T, E> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Settled::Fulfilled(value),
            Err(reason) => Settled::Rejected(reason),
        }
    }
}

impl<T, E> From<Settled<T, E>> for Result<T, E> {
    fn from(settled: Settled<T, E>) -> Self {
        settled.into_result()
    }
}
