//! Cache of the most recent `stopped` event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dap::events::ObservedEvent;
use crate::dap::message::Event;
use crate::models::breakpoint::BreakpointSet;

/// Typed view of a `stopped` event body.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StoppedBody {
    /// Why execution paused (`breakpoint`, `step`, `entry`, `exception`, ...).
    #[serde(default)]
    pub reason: String,
    /// Thread that stopped.
    #[serde(default)]
    pub thread_id: Option<i64>,
    /// Whether every thread stopped.
    #[serde(default)]
    pub all_threads_stopped: bool,
    /// Adapter breakpoint ids that were hit.
    #[serde(default)]
    pub hit_breakpoint_ids: Vec<i64>,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Additional text, e.g. an exception message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl StoppedBody {
    /// Parse the body of a `stopped` event. Missing or odd bodies yield the
    /// default.
    #[must_use]
    pub fn from_event(event: &Event) -> Self {
        event
            .body
            .clone()
            .and_then(|body| serde_json::from_value(body).ok())
            .unwrap_or_default()
    }
}

/// Most recent stop with a snapshot of the breakpoints requested at the time.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoppedEventCache {
    /// 1-based count of stops observed in this session.
    pub stop_number: u64,
    /// Event bus generation of the stop.
    pub generation: u64,
    /// When the stop was cached.
    pub captured_at: DateTime<Utc>,
    /// Parsed stop details.
    #[serde(flatten)]
    pub body: StoppedBody,
    /// Raw event as received.
    pub event: Event,
    /// Breakpoints requested when the stop arrived.
    pub breakpoints: BreakpointSet,
}

impl StoppedEventCache {
    /// Build a cache entry from an observed stop.
    #[must_use]
    pub fn capture(stop_number: u64, observed: &ObservedEvent, breakpoints: BreakpointSet) -> Self {
        Self {
            stop_number,
            generation: observed.generation,
            captured_at: observed.observed_at,
            body: StoppedBody::from_event(&observed.event),
            event: observed.event.clone(),
            breakpoints,
        }
    }

    /// Thread that stopped, if reported.
    #[must_use]
    pub fn thread_id(&self) -> Option<i64> {
        self.body.thread_id
    }
}
