//! Breakpoint requests and their per-source registration audit trail.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{AppError, Result};

/// Whether a source is the launched program or a module it loads.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SourceRole {
    /// Entry file of the debuggee; loaded before any stop can occur.
    Program,
    /// Additional source that may only be loaded after execution starts.
    Module,
}

/// Lines requested for one source.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SourceBreakpoints {
    /// Program or module.
    pub role: SourceRole,
    /// Requested lines, ascending and de-duplicated.
    pub lines: BTreeSet<u32>,
}

/// Requested breakpoints keyed by canonical source path.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BreakpointSet {
    program: Option<PathBuf>,
    sources: BTreeMap<PathBuf, SourceBreakpoints>,
}

impl BreakpointSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the requested lines of `source`.
    ///
    /// Marking a source as [`SourceRole::Program`] also records it as the
    /// program entry.
    pub fn set(&mut self, source: &Path, role: SourceRole, lines: impl IntoIterator<Item = u32>) {
        if role == SourceRole::Program {
            self.program = Some(source.to_path_buf());
        }
        self.sources.insert(
            source.to_path_buf(),
            SourceBreakpoints {
                role,
                lines: lines.into_iter().collect(),
            },
        );
    }

    /// Requested lines of `source`, ascending.
    #[must_use]
    pub fn lines(&self, source: &Path) -> Vec<u32> {
        self.sources
            .get(source)
            .map(|entry| entry.lines.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Role of `source`, if it is tracked.
    #[must_use]
    pub fn role(&self, source: &Path) -> Option<SourceRole> {
        self.sources.get(source).map(|entry| entry.role)
    }

    /// Program entry source, if one was registered.
    #[must_use]
    pub fn program(&self) -> Option<&Path> {
        self.program.as_deref()
    }

    /// Every tracked source with its request, in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&Path, &SourceBreakpoints)> {
        self.sources.iter().map(|(path, entry)| (path.as_path(), entry))
    }

    /// Whether no source is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Total number of requested lines across all sources.
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.sources.values().map(|entry| entry.lines.len()).sum()
    }
}

/// De-duplicate and sort requested line numbers.
///
/// # Errors
///
/// Returns `AppError::InvalidInput` for line `0`; lines are 1-based.
pub fn normalize_lines(lines: &[u32]) -> Result<BTreeSet<u32>> {
    if lines.contains(&0) {
        return Err(AppError::InvalidInput("line numbers start at 1".into()));
    }
    Ok(lines.iter().copied().collect())
}

/// Point in the launch sequence at which a registration was attempted.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationPhase {
    /// Before `configurationDone`.
    PreConfiguration,
    /// After the adapter's `initialized` event.
    PostInitialized,
    /// After the session's first stop.
    PostFirstStop,
}

/// Registration progress of one source.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    /// No attempt yet.
    Unregistered,
    /// Attempted before `configurationDone`.
    AttemptedPreInit,
    /// Attempted after `initialized`.
    AttemptedPostInit,
    /// Attempted after the first stop.
    AttemptedPostStop,
    /// No further automatic attempts will be made.
    Settled,
}

impl RegistrationPhase {
    /// Status a record reaches after an attempt in this phase.
    #[must_use]
    pub fn attempted_status(self) -> RegistrationStatus {
        match self {
            Self::PreConfiguration => RegistrationStatus::AttemptedPreInit,
            Self::PostInitialized => RegistrationStatus::AttemptedPostInit,
            Self::PostFirstStop => RegistrationStatus::AttemptedPostStop,
        }
    }
}

/// One `setBreakpoints` exchange for a source.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PhaseAttempt {
    /// Phase the attempt belongs to.
    pub phase: RegistrationPhase,
    /// When the attempt completed.
    pub at: DateTime<Utc>,
    /// Whether the adapter accepted the request at all.
    pub accepted: bool,
    /// Requested lines the adapter verified.
    pub verified: Vec<u32>,
    /// Requested lines left unverified.
    pub unverified: Vec<u32>,
    /// Adapter or transport message explaining a rejection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Per-source audit of registration attempts.
///
/// `verified` only ever contains requested lines. Records are never removed
/// within a session.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRecord {
    /// Canonical source path.
    pub source: PathBuf,
    /// Program or module.
    pub role: SourceRole,
    /// Requested lines.
    pub requested: BTreeSet<u32>,
    /// Lines verified by the most recent accepted attempt.
    pub verified: BTreeSet<u32>,
    /// Registration progress.
    pub status: RegistrationStatus,
    /// Every attempt, oldest first.
    pub attempts: Vec<PhaseAttempt>,
}

impl RegistrationRecord {
    /// Fresh record with no attempts.
    #[must_use]
    pub fn new(source: &Path, role: SourceRole, requested: BTreeSet<u32>) -> Self {
        Self {
            source: source.to_path_buf(),
            role,
            requested,
            verified: BTreeSet::new(),
            status: RegistrationStatus::Unregistered,
            attempts: Vec::new(),
        }
    }

    /// Whether every requested line is verified.
    #[must_use]
    pub fn is_fully_verified(&self) -> bool {
        self.requested.iter().all(|line| self.verified.contains(line))
    }

    /// Requested lines not verified.
    #[must_use]
    pub fn unverified(&self) -> Vec<u32> {
        self.requested.difference(&self.verified).copied().collect()
    }

    /// Whether `phase` should retry this record.
    ///
    /// Settled records never retry. The post-first-stop phase only applies
    /// to modules.
    #[must_use]
    pub fn needs_retry(&self, phase: RegistrationPhase) -> bool {
        if self.status == RegistrationStatus::Settled || self.is_fully_verified() {
            return false;
        }
        match phase {
            RegistrationPhase::PreConfiguration => self.status == RegistrationStatus::Unregistered,
            RegistrationPhase::PostInitialized => self.status < RegistrationStatus::AttemptedPostInit,
            RegistrationPhase::PostFirstStop => {
                self.role == SourceRole::Module
                    && self.status < RegistrationStatus::AttemptedPostStop
            }
        }
    }

    /// Apply the outcome of an attempt and advance the status.
    ///
    /// `verified` is intersected with the requested lines. A rejected attempt
    /// keeps the previously verified lines.
    pub fn record_attempt(
        &mut self,
        phase: RegistrationPhase,
        accepted: bool,
        verified: &BTreeSet<u32>,
        message: Option<String>,
    ) {
        if accepted {
            self.verified = self.requested.intersection(verified).copied().collect();
        }
        self.attempts.push(PhaseAttempt {
            phase,
            at: Utc::now(),
            accepted,
            verified: self.verified.iter().copied().collect(),
            unverified: self.unverified(),
            message,
        });

        let attempted = phase.attempted_status();
        if attempted > self.status {
            self.status = attempted;
        }

        let exhausted = match self.role {
            SourceRole::Program => self.status >= RegistrationStatus::AttemptedPostInit,
            SourceRole::Module => self.status >= RegistrationStatus::AttemptedPostStop,
        };
        if self.is_fully_verified() || exhausted {
            self.status = RegistrationStatus::Settled;
        }
    }
}

/// Outcome of `setExceptionBreakpoints` during launch.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionRegistration {
    /// Filters sent.
    pub filters: Vec<String>,
    /// Whether the latest attempt was accepted.
    pub accepted: bool,
    /// Number of attempts made.
    pub attempts: u32,
    /// Rejection message of the latest attempt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
