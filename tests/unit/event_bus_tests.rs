//! Unit tests for the last-event-per-name cache.
//!
//! Waiters name the generation they have already seen. These tests pin the
//! consequences: an event that arrived before the wait still satisfies it,
//! only the latest instance per name is kept, and closing the bus releases
//! every waiter.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use agent_debug_bridge::dap::events::{EventBus, WaitOutcome};
use agent_debug_bridge::dap::message::Event;

fn event(name: &str, thread_id: i64) -> Event {
    Event {
        seq: 0,
        event: name.into(),
        body: Some(json!({ "threadId": thread_id })),
    }
}

// ── Cache semantics ───────────────────────────────────────────────────────────

#[tokio::test]
async fn event_published_before_wait_is_observed() {
    let bus = EventBus::new();
    bus.publish(event("stopped", 1));

    let outcome = bus.wait_for("stopped", 0, Duration::from_millis(10)).await;

    assert!(
        matches!(outcome, WaitOutcome::Received(ref observed) if observed.event.event == "stopped"),
        "a cached event newer than the cursor must satisfy the wait, got {outcome:?}"
    );
}

#[tokio::test]
async fn consumed_generation_is_not_observed_again() {
    let bus = EventBus::new();
    let generation = bus.publish(event("stopped", 1));

    let outcome = bus
        .wait_for("stopped", generation, Duration::from_millis(20))
        .await;

    assert!(
        matches!(outcome, WaitOutcome::TimedOut),
        "a wait past the latest generation must time out, got {outcome:?}"
    );
}

#[test]
fn latest_keeps_only_newest_instance() {
    let bus = EventBus::new();
    bus.publish(event("stopped", 1));
    let second = bus.publish(event("stopped", 2));

    let latest = bus.latest("stopped").expect("cached event");
    assert_eq!(latest.generation, second);
    assert_eq!(latest.event.body_i64("threadId"), Some(2));
}

#[test]
fn generations_increase_across_names() {
    let bus = EventBus::new();
    let a = bus.publish(event("initialized", 0));
    let b = bus.publish(event("output", 0));

    assert!(b > a, "generations must be monotonic across event names");
    assert_eq!(bus.generation(), b);
}

// ── Waiting ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn waiter_is_woken_by_later_publish() {
    let bus = Arc::new(EventBus::new());
    let waiter = {
        let bus = Arc::clone(&bus);
        tokio::spawn(async move { bus.wait_for("stopped", 0, Duration::from_secs(2)).await })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    bus.publish(event("output", 0));
    bus.publish(event("stopped", 7));

    let outcome = waiter.await.expect("waiter task");
    match outcome {
        WaitOutcome::Received(observed) => assert_eq!(observed.event.body_i64("threadId"), Some(7)),
        other => panic!("expected the stopped event, got {other:?}"),
    }
}

#[tokio::test]
async fn timeout_is_an_outcome_not_an_error() {
    let bus = EventBus::new();
    let outcome = bus.wait_for("terminated", 0, Duration::from_millis(15)).await;
    assert!(matches!(outcome, WaitOutcome::TimedOut));
}

#[tokio::test]
async fn close_releases_waiters_with_reason() {
    let bus = Arc::new(EventBus::new());
    let waiter = {
        let bus = Arc::clone(&bus);
        tokio::spawn(async move { bus.wait_for("stopped", 0, Duration::from_secs(5)).await })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    bus.close("adapter closed its output stream");

    match waiter.await.expect("waiter task") {
        WaitOutcome::Disconnected(reason) => assert_eq!(reason, "adapter closed its output stream"),
        other => panic!("expected a disconnect, got {other:?}"),
    }
}

#[test]
fn close_keeps_first_reason_and_drops_later_events() {
    let bus = EventBus::new();
    bus.close("first");
    bus.close("second");
    bus.publish(event("stopped", 1));

    assert_eq!(bus.closed_reason().as_deref(), Some("first"));
    assert!(
        bus.latest("stopped").is_none(),
        "events published after close must be dropped"
    );
}

#[tokio::test]
async fn cached_event_wins_over_closed_bus() {
    let bus = EventBus::new();
    bus.publish(event("initialized", 0));
    bus.close("gone");

    let outcome = bus.wait_for("initialized", 0, Duration::from_millis(10)).await;
    assert!(
        matches!(outcome, WaitOutcome::Received(_)),
        "an already cached event must still be reported after close, got {outcome:?}"
    );
}
