//! Unhandled-rejection reporting.
//!
//! A promise is unhandled when it is dropped in the rejected state without any
//! reaction ever having been attached to it. Reporting is per thread and off by
//! default.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use fidelity_types::{PromiseId, UnhandledRejections};

type Hook = Rc<dyn Fn(PromiseId)>;

thread_local! {
    static POLICY: Cell<UnhandledRejections> = const { Cell::new(UnhandledRejections::Ignore) };
    static HOOK: RefCell<Option<Hook>> = const { RefCell::new(None) };
}

pub fn set_unhandled_rejections(policy: UnhandledRejections) {
    POLICY.with(|p| p.set(policy));
}

#[must_use]
pub fn unhandled_rejections() -> UnhandledRejections {
    POLICY.with(Cell::get)
}

/// Invoke `hook` for every unhandled rejection on this thread, regardless of
/// the logging policy. Replaces any previous hook.
pub fn on_unhandled_rejection(hook: impl Fn(PromiseId) + 'static) {
    HOOK.with(|slot| *slot.borrow_mut() = Some(Rc::new(hook)));
}

pub fn clear_unhandled_rejection_hook() {
    HOOK.with(|slot| *slot.borrow_mut() = None);
}

pub(crate) fn report_unhandled(id: PromiseId) {
    // Promises can be dropped during thread teardown, after the locals are gone.
    let policy = POLICY.try_with(Cell::get).unwrap_or_default();
    if policy == UnhandledRejections::Warn {
        tracing::warn!(promise = %id, "Promise rejected with no rejection handler attached");
    }

    let hook = HOOK.try_with(|slot| slot.borrow().clone()).ok().flatten();
    if let Some(hook) = hook {
        hook(id);
    }
}
