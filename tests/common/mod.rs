//! Shared test utilities and fixtures
//!
//! Helpers for running promises on a tokio `LocalSet` with timers.

#![allow(dead_code)]

use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

use fidelity_core::{Deferred, Promise, TokioLocalScheduler, scheduler};
use tokio::task::{LocalSet, spawn_local};
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

/// Route `tracing` output through the test harness. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Run `body` inside a `LocalSet` with tokio-driven dispatch installed.
pub async fn on_local_scheduler<F, Fut>(body: F) -> Fut::Output
where
    F: FnOnce() -> Fut,
    Fut: Future,
{
    init_tracing();
    let local = LocalSet::new();
    local
        .run_until(async move {
            let _guard = scheduler::install(Rc::new(TokioLocalScheduler::new()));
            body().await
        })
        .await
}

/// A promise fulfilled with `value` after `ms` milliseconds.
pub fn resolve_after<T>(ms: u64, value: T) -> Promise<T, String>
where
    T: Clone + 'static,
{
    let Deferred {
        promise, resolve, ..
    } = Deferred::new();
    spawn_local(async move {
        sleep(Duration::from_millis(ms)).await;
        resolve.fulfill(value);
    });
    promise
}

/// A promise rejected with `reason` after `ms` milliseconds.
pub fn reject_after<T>(ms: u64, reason: &str) -> Promise<T, String>
where
    T: Clone + 'static,
{
    let Deferred {
        promise, reject, ..
    } = Deferred::new();
    let reason = reason.to_string();
    spawn_local(async move {
        sleep(Duration::from_millis(ms)).await;
        reject.reject(reason);
    });
    promise
}
