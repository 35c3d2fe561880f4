//! Core domain types for Fidelity promises.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Both the configuration layer and the promise state machine build on it.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory

mod ids;
mod state;

pub use ids::PromiseId;
pub use state::{PromiseState, Settled};

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Value bounds
// ============================================================================

/// Types a promise can be fulfilled with.
///
/// Every registered reaction receives its own copy of the settled value, so
/// values must be `Clone`. Wrap expensive payloads in `Rc` or `Arc`.
pub trait Fulfillment: Clone + 'static {}

impl<T: Clone + 'static> Fulfillment for T {}

/// Types a promise can be rejected with.
///
/// Beyond `Clone`, a rejection type must be able to carry the cyclic
/// resolution error, which the resolution procedure raises on its own.
pub trait Rejection: Clone + From<CyclicResolution> + 'static {}

impl<E: Clone + From<CyclicResolution> + 'static> Rejection for E {}

// ============================================================================
// Errors
// ============================================================================

/// A promise was resolved with itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("the promise and its value are the same")]
pub struct CyclicResolution;

impl From<CyclicResolution> for String {
    fn from(err: CyclicResolution) -> Self {
        format!("TypeError: {err}")
    }
}

// ============================================================================
// Diagnostics policy
// ============================================================================

/// What to do when a rejected promise is dropped without any handler attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnhandledRejections {
    /// Drop silently.
    #[default]
    Ignore,
    /// Emit a `warn`-level log event.
    Warn,
}
