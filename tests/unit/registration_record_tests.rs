//! Unit tests for the per-source breakpoint registration audit.
//!
//! A record moves through at most three attempts. Program sources settle
//! after the post-initialized attempt; module sources get one more chance
//! after the first stop. Fully verified records settle immediately.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use agent_debug_bridge::models::breakpoint::{
    normalize_lines, BreakpointSet, RegistrationPhase, RegistrationRecord, RegistrationStatus,
    SourceRole,
};
use agent_debug_bridge::AppError;

fn lines(values: &[u32]) -> BTreeSet<u32> {
    values.iter().copied().collect()
}

fn record(role: SourceRole, requested: &[u32]) -> RegistrationRecord {
    RegistrationRecord::new(Path::new("/proj/app.py"), role, lines(requested))
}

// ── Status progression ────────────────────────────────────────────────────────

#[test]
fn fresh_record_is_unregistered_and_needs_first_phase() {
    let record = record(SourceRole::Program, &[3, 8]);

    assert_eq!(record.status, RegistrationStatus::Unregistered);
    assert!(record.needs_retry(RegistrationPhase::PreConfiguration));
    assert_eq!(record.unverified(), vec![3, 8]);
}

#[test]
fn full_verification_settles_immediately() {
    let mut record = record(SourceRole::Module, &[3, 8]);

    record.record_attempt(RegistrationPhase::PreConfiguration, true, &lines(&[3, 8]), None);

    assert_eq!(record.status, RegistrationStatus::Settled);
    assert!(record.is_fully_verified());
    assert!(
        !record.needs_retry(RegistrationPhase::PostInitialized),
        "a settled record must never be retried"
    );
}

#[test]
fn partial_verification_advances_to_next_phase() {
    let mut record = record(SourceRole::Program, &[3, 8]);

    record.record_attempt(RegistrationPhase::PreConfiguration, true, &lines(&[3]), None);

    assert_eq!(record.status, RegistrationStatus::AttemptedPreInit);
    assert_eq!(record.unverified(), vec![8]);
    assert!(!record.needs_retry(RegistrationPhase::PreConfiguration));
    assert!(record.needs_retry(RegistrationPhase::PostInitialized));
}

#[test]
fn program_source_settles_after_post_initialized_attempt() {
    let mut record = record(SourceRole::Program, &[5]);
    record.record_attempt(RegistrationPhase::PreConfiguration, true, &BTreeSet::new(), None);
    record.record_attempt(RegistrationPhase::PostInitialized, true, &BTreeSet::new(), None);

    assert_eq!(record.status, RegistrationStatus::Settled);
    assert!(
        !record.needs_retry(RegistrationPhase::PostFirstStop),
        "program sources are not retried after the first stop"
    );
    assert_eq!(record.unverified(), vec![5], "unverified lines stay visible");
}

#[test]
fn module_source_gets_post_stop_attempt() {
    let mut record = record(SourceRole::Module, &[5]);
    record.record_attempt(RegistrationPhase::PreConfiguration, true, &BTreeSet::new(), None);
    record.record_attempt(RegistrationPhase::PostInitialized, true, &BTreeSet::new(), None);

    assert_eq!(record.status, RegistrationStatus::AttemptedPostInit);
    assert!(record.needs_retry(RegistrationPhase::PostFirstStop));

    record.record_attempt(RegistrationPhase::PostFirstStop, true, &lines(&[5]), None);
    assert_eq!(record.status, RegistrationStatus::Settled);
    assert!(record.is_fully_verified());
    assert_eq!(record.attempts.len(), 3);
}

#[test]
fn module_settles_unverified_after_third_attempt() {
    let mut record = record(SourceRole::Module, &[5]);
    for phase in [
        RegistrationPhase::PreConfiguration,
        RegistrationPhase::PostInitialized,
        RegistrationPhase::PostFirstStop,
    ] {
        record.record_attempt(phase, true, &BTreeSet::new(), None);
    }

    assert_eq!(record.status, RegistrationStatus::Settled);
    assert!(!record.is_fully_verified());
}

#[test]
fn rejected_attempt_keeps_previous_verification() {
    let mut record = record(SourceRole::Module, &[3, 8]);
    record.record_attempt(RegistrationPhase::PreConfiguration, true, &lines(&[3]), None);

    record.record_attempt(
        RegistrationPhase::PostInitialized,
        false,
        &BTreeSet::new(),
        Some("not ready".into()),
    );

    assert_eq!(record.verified, lines(&[3]), "a rejection must not erase verified lines");
    let last = record.attempts.last().expect("attempt recorded");
    assert!(!last.accepted);
    assert_eq!(last.message.as_deref(), Some("not ready"));
}

#[test]
fn verified_lines_outside_request_are_ignored() {
    let mut record = record(SourceRole::Program, &[3]);
    record.record_attempt(RegistrationPhase::PreConfiguration, true, &lines(&[3, 99]), None);
    assert_eq!(record.verified, lines(&[3]));
}

#[test]
fn empty_request_is_trivially_settled() {
    let mut record = record(SourceRole::Module, &[]);
    assert!(!record.needs_retry(RegistrationPhase::PreConfiguration));

    record.record_attempt(RegistrationPhase::PostFirstStop, true, &BTreeSet::new(), None);
    assert_eq!(record.status, RegistrationStatus::Settled);
}

// ── Requested set ─────────────────────────────────────────────────────────────

#[test]
fn line_zero_is_invalid_input() {
    let err = normalize_lines(&[4, 0]).expect_err("must fail");
    assert!(matches!(err, AppError::InvalidInput(_)));
}

#[test]
fn duplicate_lines_collapse() {
    let normalized = normalize_lines(&[8, 3, 8]).expect("valid");
    assert_eq!(normalized.into_iter().collect::<Vec<_>>(), vec![3, 8]);
}

#[test]
fn breakpoint_set_replaces_per_source() {
    let program = PathBuf::from("/proj/app.py");
    let module = PathBuf::from("/proj/pkg/helper.py");
    let mut set = BreakpointSet::new();

    set.set(&program, SourceRole::Program, [3, 8]);
    set.set(&module, SourceRole::Module, [2]);
    set.set(&program, SourceRole::Program, [10]);

    assert_eq!(set.lines(&program), vec![10]);
    assert_eq!(set.lines(&module), vec![2]);
    assert_eq!(set.program(), Some(program.as_path()));
    assert_eq!(set.role(&module), Some(SourceRole::Module));
    assert_eq!(set.line_count(), 2);
}
