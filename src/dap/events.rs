//! Broadcast cache of the most recent adapter event per name.
//!
//! Events are never queued per subscriber. The bus remembers only the latest
//! instance of each event name, stamped with a monotonically increasing
//! generation. Waiters state the generation they have already seen and are
//! satisfied by anything newer, which lets a wait issued after the event
//! arrived still observe it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::dap::message::Event;

/// An event together with the point at which the bus observed it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservedEvent {
    /// Bus generation assigned when the event was published.
    pub generation: u64,
    /// Wall-clock receipt time.
    pub observed_at: DateTime<Utc>,
    /// The event as received from the adapter.
    pub event: Event,
}

/// Result of [`EventBus::wait_for`].
#[derive(Debug, Clone)]
pub enum WaitOutcome {
    /// A matching event newer than the caller's cursor.
    Received(ObservedEvent),
    /// The timeout elapsed first.
    TimedOut,
    /// The transport closed; carries the reason.
    Disconnected(String),
}

#[derive(Debug, Default)]
struct BusState {
    generation: u64,
    latest: HashMap<String, ObservedEvent>,
    closed: Option<String>,
}

/// Publish/subscribe cache keyed by event name.
#[derive(Debug)]
pub struct EventBus {
    state: watch::Sender<BusState>,
    issued: AtomicU64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Create an empty, open bus.
    #[must_use]
    pub fn new() -> Self {
        let (state, _rx) = watch::channel(BusState::default());
        Self {
            state,
            issued: AtomicU64::new(0),
        }
    }

    /// Record `event` as the latest of its name and wake every waiter.
    ///
    /// Returns the generation assigned to the event.
    pub fn publish(&self, event: Event) -> u64 {
        self.publish_observed(self.stamp(event))
    }

    /// Assign the next generation to `event` without publishing it.
    ///
    /// Lets the single inbound reader update session state for an event
    /// before waiters can observe it. Stamped events must be published in
    /// stamping order.
    #[must_use]
    pub fn stamp(&self, event: Event) -> ObservedEvent {
        ObservedEvent {
            generation: self.issued.fetch_add(1, Ordering::Relaxed) + 1,
            observed_at: Utc::now(),
            event,
        }
    }

    /// Publish a previously stamped event and wake every waiter.
    ///
    /// Events published after [`close`](Self::close) are dropped. Returns the
    /// event's generation.
    pub fn publish_observed(&self, observed: ObservedEvent) -> u64 {
        let generation = observed.generation;
        self.state.send_if_modified(|state| {
            if state.closed.is_some() {
                return false;
            }
            state.generation = state.generation.max(generation);
            state.latest.insert(observed.event.event.clone(), observed);
            true
        });
        generation
    }

    /// Latest event of `name`, if any was ever published.
    #[must_use]
    pub fn latest(&self, name: &str) -> Option<ObservedEvent> {
        self.state.borrow().latest.get(name).cloned()
    }

    /// Generation of the most recently published event.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.state.borrow().generation
    }

    /// Reason the bus was closed, if it was.
    #[must_use]
    pub fn closed_reason(&self) -> Option<String> {
        self.state.borrow().closed.clone()
    }

    /// Mark the bus closed and wake every waiter with `Disconnected`.
    ///
    /// Only the first reason is kept.
    pub fn close(&self, reason: impl Into<String>) {
        let reason = reason.into();
        self.state.send_if_modified(|state| {
            if state.closed.is_some() {
                return false;
            }
            state.closed = Some(reason);
            true
        });
    }

    /// Wait for an event called `name` with a generation above `after`.
    ///
    /// A matching event already in the cache satisfies the wait immediately.
    /// Elapsed timeouts are reported as [`WaitOutcome::TimedOut`], never as an
    /// error.
    pub async fn wait_for(&self, name: &str, after: u64, timeout: Duration) -> WaitOutcome {
        let mut rx = self.state.subscribe();
        let deadline = Instant::now() + timeout;

        loop {
            {
                let state = rx.borrow_and_update();
                if let Some(observed) = state.latest.get(name) {
                    if observed.generation > after {
                        return WaitOutcome::Received(observed.clone());
                    }
                }
                if let Some(reason) = &state.closed {
                    return WaitOutcome::Disconnected(reason.clone());
                }
            }

            match tokio::time::timeout_at(deadline, rx.changed()).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) => return WaitOutcome::Disconnected("event bus dropped".into()),
                Err(_elapsed) => return WaitOutcome::TimedOut,
            }
        }
    }
}
