//! Promises/A+ for Rust.
//!
//! This crate contains the promise state machine, the resolution procedure,
//! deferred reaction dispatch, the deferred-pair factory, and the `all`/`race`
//! combinators. Everything is single-threaded: promises are `Rc`-backed
//! handles that stay on the thread that created them.
//!
//! ```
//! use fidelity_core::{Promise, Settled, scheduler};
//!
//! let chained = Promise::<String, String>::resolved("a".into())
//!     .then(|v| Ok(v + "b"))
//!     .then(|v| Err::<String, _>(v))
//!     .catch(Ok);
//!
//! scheduler::run_until_idle();
//! assert_eq!(chained.value(), Some(Settled::Fulfilled("ab".to_string())));
//! ```

mod combinators;
mod deferred;
pub mod diagnostics;
mod future;
mod promise;
mod resolution;
pub mod scheduler;

pub use combinators::{all, race};
pub use deferred::{Deferred, deferred};
pub use future::Settle;
pub use promise::Promise;
pub use resolution::{Reject, Resolution, Resolve, Thenable};
pub use scheduler::{DrainReport, Job, MicrotaskQueue, Scheduler, TokioLocalScheduler};

pub use fidelity_config::FidelityConfig;
pub use fidelity_types::{
    CyclicResolution, Fulfillment, PromiseId, PromiseState, Rejection, Settled,
    UnhandledRejections,
};

/// Apply `config` to the calling thread: the default microtask queue's drain
/// budget and the unhandled-rejection policy.
pub fn configure(config: &FidelityConfig) {
    let budget = config.drain_budget();
    let policy = config.unhandled_rejections();
    scheduler::microtasks().set_budget(budget);
    diagnostics::set_unhandled_rejections(policy);
    tracing::debug!(?budget, ?policy, "Applied promise configuration");
}
