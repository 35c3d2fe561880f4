//! `all` and `race` driven by tokio timers

use fidelity_core::{Promise, Resolution, Settled, race};

use crate::common::{on_local_scheduler, reject_after, resolve_after};

type P = Promise<i32, String>;

#[tokio::test(start_paused = true)]
async fn all_mixes_promises_and_values() {
    on_local_scheduler(|| async {
        let combined = P::all([
            Resolution::Promise(P::resolved(1)),
            Resolution::Value(2),
            Resolution::Promise(resolve_after(10, 3)),
        ]);
        assert_eq!(combined.await, Ok(vec![1, 2, 3]));
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn all_keeps_input_order_not_settlement_order() {
    on_local_scheduler(|| async {
        let combined = P::all([resolve_after(50, 1), resolve_after(10, 2), resolve_after(30, 3)]);
        assert_eq!(combined.await, Ok(vec![1, 2, 3]));
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn all_rejects_with_earliest_rejection() {
    on_local_scheduler(|| async {
        let combined = P::all([
            resolve_after(5, 1),
            reject_after(50, "first"),
            reject_after(10, "second"),
        ]);
        assert_eq!(combined.await, Err("second".to_string()));
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn all_of_nothing_is_already_fulfilled() {
    on_local_scheduler(|| async {
        let combined = P::all(Vec::<P>::new());
        assert_eq!(combined.value(), Some(Settled::Fulfilled(Vec::new())));
        assert_eq!(combined.await, Ok(Vec::new()));
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn race_settles_with_fastest() {
    on_local_scheduler(|| async {
        let winner = race::<String, String, _>([
            resolve_after(100, "foo".to_string()),
            resolve_after(10, "bar".to_string()),
        ]);
        assert_eq!(winner.await, Ok("bar".to_string()));
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn race_forwards_fastest_rejection() {
    on_local_scheduler(|| async {
        let winner = P::race([resolve_after(40, 1), reject_after(15, "timeout")]);
        assert_eq!(winner.await, Err("timeout".to_string()));
    })
    .await;
}
