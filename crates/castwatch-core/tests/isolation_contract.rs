//! Contract test: per-session failure isolation
//!
//! One malformed session or one failing delivery must never block the
//! other sessions in the same batch, and must be retried (delivery) or
//! re-reported (invalid input) on later cycles without advancing state.

mod common;

use common::*;

use castwatch_core::engine::EngineEvent;
use castwatch_core::{DedupStore, MemoryDedupStore, NotificationStatus, WatchEngine};
use std::sync::Arc;

#[tokio::test(start_paused = true)]
async fn malformed_session_does_not_block_batch() {
    let mut sessions = vec![malformed_session("bad", "99")];
    for i in 1..=9 {
        sessions.push(live_session(&format!("s{i}"), &format!("{i}"), "show"));
    }
    let source = ScriptedSessionSource::new(vec![batch_of(sessions)]);
    let sink = CountingSink::new();
    let store = MemoryDedupStore::new();

    let (engine, mut event_rx) = WatchEngine::new(
        Box::new(source.clone()),
        Arc::new(sink.clone()),
        Arc::new(store.clone()),
        minimal_config(),
    )
    .expect("engine construction succeeds");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let handle = tokio::spawn(async move { engine.run_with_shutdown(Some(shutdown_rx)).await });

    wait_until(|| sink.delivered().len() >= 9).await;
    shutdown_tx.send(()).unwrap();
    handle.await.unwrap().unwrap();

    assert_eq!(sink.delivered().len(), 9, "all valid sessions notified");
    for i in 1..=9 {
        assert_eq!(
            store.status(&format!("s{i}")).await.unwrap(),
            NotificationStatus::Start
        );
    }
    assert_eq!(
        store.status("bad").await.unwrap(),
        NotificationStatus::None,
        "malformed session must not be committed"
    );

    let mut bad_failures = 0;
    while let Ok(event) = event_rx.try_recv() {
        if let EngineEvent::SessionFailed { session_id, .. } = event
            && session_id == "bad"
        {
            bad_failures += 1;
        }
    }
    assert!(bad_failures >= 1, "the malformed session is reported");
}

#[tokio::test(start_paused = true)]
async fn failing_delivery_does_not_block_siblings() {
    let sessions = vec![
        live_session("good", "1", "good show"),
        live_session("flaky", "2", "flaky show"),
    ];
    let source = ScriptedSessionSource::new(vec![batch_of(sessions)]);
    // Every delivery mentioning the flaky title fails.
    let sink = CountingSink::failing_matching("flaky show");
    let store = MemoryDedupStore::new();

    let (engine, _event_rx) = WatchEngine::new(
        Box::new(source.clone()),
        Arc::new(sink.clone()),
        Arc::new(store.clone()),
        minimal_config(),
    )
    .expect("engine construction succeeds");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let handle = tokio::spawn(async move { engine.run_with_shutdown(Some(shutdown_rx)).await });

    wait_until(|| source.fetch_count() >= 3).await;
    shutdown_tx.send(()).unwrap();
    handle.await.unwrap().unwrap();

    let delivered = sink.delivered();
    assert_eq!(delivered.len(), 1, "only the good session goes out");
    assert!(delivered[0].contains("good show"));

    assert_eq!(
        store.status("good").await.unwrap(),
        NotificationStatus::Start
    );
    assert_eq!(
        store.status("flaky").await.unwrap(),
        NotificationStatus::None,
        "failed delivery must not advance status"
    );

    // The failing session is retried on every cycle, not abandoned.
    assert!(
        sink.attempts() >= 3,
        "expected retries for the failing session, saw {} attempts",
        sink.attempts()
    );
}
