//! Promises/A+ behavior through the public API

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use fidelity_core::{
    Promise, PromiseState, Reject, Resolution, Resolve, Settled, deferred, scheduler,
};

use crate::common::{on_local_scheduler, resolve_after};

type P = Promise<String, String>;

#[test]
fn first_settlement_wins() {
    let d = deferred::<i32, String>();
    d.resolve.fulfill(1);
    d.reject.reject("ignored".to_string());
    d.resolve.fulfill(2);
    assert_eq!(d.promise.state(), PromiseState::Fulfilled);
    assert_eq!(d.promise.value(), Some(Settled::Fulfilled(1)));
}

#[test]
fn resolving_with_itself_rejects_with_type_error() {
    let d = deferred::<i32, String>();
    d.resolve.resolve(d.promise.clone());
    assert_eq!(
        d.promise.value(),
        Some(Settled::Rejected(
            "TypeError: the promise and its value are the same".to_string()
        ))
    );
}

#[test]
fn thenable_first_callback_wins() {
    let promise = Promise::<i32, String>::resolve(Resolution::<i32, String>::thenable(
        |resolve: Resolve<i32, String>, reject: Reject<i32, String>| {
            resolve.fulfill(1);
            resolve.fulfill(2);
            reject.reject("no".to_string());
            Err("thrown after resolving".to_string())
        },
    ));
    assert_eq!(promise.value(), Some(Settled::Fulfilled(1)));
}

#[test]
fn thenable_error_before_callbacks_rejects() {
    let promise = Promise::<i32, String>::resolve(Resolution::<i32, String>::thenable(
        |_: Resolve<i32, String>, _: Reject<i32, String>| Err("then failed".to_string()),
    ));
    assert_eq!(
        promise.value(),
        Some(Settled::Rejected("then failed".to_string()))
    );
}

#[test]
fn nested_thenables_are_flattened() {
    let inner = Resolution::<i32, String>::thenable(|resolve: Resolve<i32, String>, _: Reject<i32, String>| {
        resolve.fulfill(42);
        Ok(())
    });
    let outer = Promise::<i32, String>::resolve(Resolution::<i32, String>::thenable(
        move |resolve: Resolve<i32, String>, _: Reject<i32, String>| {
            resolve.resolve(inner);
            Ok(())
        },
    ));
    assert_eq!(outer.value(), Some(Settled::Fulfilled(42)));
}

#[test]
fn handlers_never_run_synchronously() {
    let ran = Rc::new(Cell::new(false));
    let flag = Rc::clone(&ran);
    let _derived = Promise::<i32, String>::resolved(1).then(move |v| {
        flag.set(true);
        Ok(v)
    });
    assert!(!ran.get());

    scheduler::run_until_idle();
    assert!(ran.get());
}

#[test]
fn handlers_run_in_registration_order() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let d = deferred::<i32, String>();
    let first = Rc::clone(&log);
    let second = Rc::clone(&log);
    let _a = d.promise.then(move |v| {
        first.borrow_mut().push("A");
        Ok(v)
    });
    let _b = d.promise.then(move |v| {
        second.borrow_mut().push("B");
        Ok(v)
    });

    d.resolve.fulfill(0);
    scheduler::run_until_idle();
    assert_eq!(*log.borrow(), vec!["A", "B"]);
}

#[test]
fn chain_recovers_from_handler_error() {
    let result = P::resolved("a".to_string())
        .then(|v| Ok(v + "b"))
        .then(|v| Err::<String, _>(v))
        .catch(Ok);
    scheduler::run_until_idle();
    assert_eq!(result.value(), Some(Settled::Fulfilled("ab".to_string())));
}

#[test]
fn rejection_skips_fulfillment_handlers() {
    let touched = Rc::new(Cell::new(false));
    let flag = Rc::clone(&touched);
    let result = P::rejected("bad".to_string())
        .then(move |v| {
            flag.set(true);
            Ok(v)
        })
        .fork();
    scheduler::run_until_idle();
    assert!(!touched.get());
    assert_eq!(result.value(), Some(Settled::Rejected("bad".to_string())));
}

#[test]
fn executor_error_rejects_unless_already_settled() {
    let failed = P::new(|_, _| Err("executor".to_string()));
    let settled_first = P::new(|resolve, _| {
        resolve.fulfill("ok".to_string());
        Err("ignored".to_string())
    });
    assert_eq!(failed.value(), Some(Settled::Rejected("executor".to_string())));
    assert_eq!(settled_first.value(), Some(Settled::Fulfilled("ok".to_string())));
}

#[tokio::test(start_paused = true)]
async fn awaiting_yields_the_outcome() {
    on_local_scheduler(|| async {
        let value = resolve_after(20, 7).then(|v| Ok(v * 6)).await;
        assert_eq!(value, Ok(42));

        let rejected = Promise::<i32, String>::rejected("nope".to_string()).await;
        assert_eq!(rejected, Err("nope".to_string()));
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn adoption_waits_for_pending_promise() {
    on_local_scheduler(|| async {
        let source = resolve_after(30, "late".to_string());
        let adopted = P::resolved(String::new()).and_then(move |_| Ok(Resolution::Promise(source)));
        assert!(adopted.is_pending());
        assert_eq!(adopted.await, Ok("late".to_string()));
    })
    .await;
}
