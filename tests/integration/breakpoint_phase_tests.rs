//! Integration tests for breakpoint registration across launch phases and
//! for manual registration on a running session.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use agent_debug_bridge::models::breakpoint::{
    RegistrationPhase, RegistrationRecord, RegistrationStatus, SourceRole,
};
use agent_debug_bridge::models::launch::{LaunchReport, LaunchRequest, StopOutcome};
use agent_debug_bridge::AppError;

use super::test_helpers::{same_file, Behavior, FakeConnector, Project, VerifyWhen};

fn program_and_module() -> LaunchRequest {
    let mut request = LaunchRequest::new("app.py");
    request.breakpoints = vec![6];
    request
        .breakpoints_by_source
        .insert("pkg/helper.py".into(), vec![2]);
    request
}

fn record_for<'a>(report: &'a LaunchReport, source: &Path) -> &'a RegistrationRecord {
    report
        .registrations
        .iter()
        .find(|record| same_file(&record.source, source))
        .unwrap_or_else(|| panic!("no record for {}", source.display()))
}

fn phases(record: &RegistrationRecord) -> Vec<RegistrationPhase> {
    record.attempts.iter().map(|attempt| attempt.phase).collect()
}

fn module_verified_after_stop() -> Behavior {
    Behavior {
        verify_by_name: HashMap::from([("helper.py".to_owned(), VerifyWhen::AfterStop)]),
        ..Behavior::default()
    }
}

// ── Launch phases ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn module_source_settles_after_first_stop() {
    let project = Project::new();
    let connector = FakeConnector::debugpy(module_verified_after_stop());
    let manager = project.manager(&connector);

    let report = manager
        .launch(program_and_module())
        .await
        .expect("launch succeeds");
    assert!(matches!(report.stop, StopOutcome::Stopped { .. }), "got {:?}", report.stop);

    let program = record_for(&report, &project.file("app.py"));
    assert_eq!(program.role, SourceRole::Program);
    assert_eq!(program.status, RegistrationStatus::Settled);
    assert_eq!(program.attempts.len(), 2, "a verified program is not retried after the stop");

    let module = record_for(&report, &project.file("pkg/helper.py"));
    assert_eq!(module.role, SourceRole::Module);
    assert_eq!(
        phases(module),
        vec![
            RegistrationPhase::PreConfiguration,
            RegistrationPhase::PostInitialized,
            RegistrationPhase::PostFirstStop,
        ]
    );
    assert_eq!(module.status, RegistrationStatus::Settled);
    assert!(module.is_fully_verified(), "the module loads once the debuggee runs");
}

#[tokio::test]
async fn module_retry_runs_after_late_stop_without_launch_wait() {
    let project = Project::new();
    let connector = FakeConnector::debugpy(module_verified_after_stop());
    let manager = project.manager(&connector);
    let mut request = program_and_module();
    request.wait_for_breakpoint = false;

    let report = manager.launch(request).await.expect("launch succeeds");
    assert!(matches!(report.stop, StopOutcome::Skipped { .. }), "got {:?}", report.stop);
    let module = record_for(&report, &project.file("pkg/helper.py"));
    assert_eq!(
        phases(module),
        vec![RegistrationPhase::PreConfiguration, RegistrationPhase::PostInitialized]
    );
    assert_eq!(module.status, RegistrationStatus::AttemptedPostInit);

    let stop = manager
        .wait_for_event("stopped", Duration::from_secs(2))
        .await
        .expect("session active");
    assert!(stop.event.is_some(), "the debuggee stops after launch: {stop:?}");

    let helper = project.file("pkg/helper.py");
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    let settled = loop {
        let listing = manager.list_breakpoints().await.expect("listing");
        let record = listing
            .registrations
            .into_iter()
            .find(|record| same_file(&record.source, &helper))
            .expect("module record");
        if record.status == RegistrationStatus::Settled {
            break record;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "module never retried after the stop: {record:?}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    };

    assert_eq!(
        phases(&settled),
        vec![
            RegistrationPhase::PreConfiguration,
            RegistrationPhase::PostInitialized,
            RegistrationPhase::PostFirstStop,
        ]
    );
    assert_eq!(settled.verified.iter().copied().collect::<Vec<_>>(), vec![2]);
}

#[tokio::test]
async fn unverifiable_sources_stop_retrying_per_role() {
    let project = Project::new();
    let connector = FakeConnector::debugpy(Behavior {
        verify: VerifyWhen::Never,
        ..Behavior::default()
    });
    let manager = project.manager(&connector);

    let report = manager
        .launch(program_and_module())
        .await
        .expect("launch succeeds");

    let program = record_for(&report, &project.file("app.py"));
    assert_eq!(phases(program).len(), 2, "programs settle after the initialized retry");
    assert_eq!(program.status, RegistrationStatus::Settled);
    assert_eq!(program.unverified(), vec![6]);

    let module = record_for(&report, &project.file("pkg/helper.py"));
    assert_eq!(phases(module).len(), 3, "modules get one extra retry after the stop");
    assert_eq!(module.status, RegistrationStatus::Settled);
    assert!(module.verified.is_empty());

    // Program: two attempts, module: three.
    assert_eq!(connector.log().count("setBreakpoints"), 5);
}

// ── Manual registration ───────────────────────────────────────────────────────

#[tokio::test]
async fn manual_breakpoints_after_stop_use_post_stop_phase() {
    let project = Project::new();
    let connector = FakeConnector::debugpy(Behavior::default());
    let manager = project.manager(&connector);
    let mut request = LaunchRequest::new("app.py");
    request.breakpoints = vec![6];
    manager.launch(request).await.expect("launch succeeds");

    let record = manager
        .set_breakpoints("pkg/helper.py", &[2, 2])
        .await
        .expect("registration");

    assert_eq!(record.role, SourceRole::Module);
    assert_eq!(phases(&record), vec![RegistrationPhase::PostFirstStop]);
    assert_eq!(record.requested.iter().copied().collect::<Vec<_>>(), vec![2]);
    assert!(record.is_fully_verified());

    let listing = manager.list_breakpoints().await.expect("listing");
    assert_eq!(listing.breakpoints.lines(&project.file("pkg/helper.py")), vec![2]);
    assert_eq!(listing.breakpoints.lines(&project.file("app.py")), vec![6]);
    assert_eq!(listing.registrations.len(), 2);
}

#[tokio::test]
async fn manual_breakpoints_on_program_keep_program_role() {
    let project = Project::new();
    let connector = FakeConnector::debugpy(Behavior::default());
    let manager = project.manager(&connector);
    manager
        .launch(LaunchRequest::new("app.py"))
        .await
        .expect("launch succeeds");

    let record = manager
        .set_breakpoints("app.py", &[7])
        .await
        .expect("registration");

    assert_eq!(record.role, SourceRole::Program);
    assert_eq!(record.status, RegistrationStatus::Settled);
}

#[tokio::test]
async fn empty_line_list_clears_source() {
    let project = Project::new();
    let connector = FakeConnector::debugpy(Behavior::default());
    let manager = project.manager(&connector);
    manager
        .launch(program_and_module())
        .await
        .expect("launch succeeds");

    let record = manager
        .set_breakpoints("pkg/helper.py", &[])
        .await
        .expect("clearing succeeds");

    assert!(record.requested.is_empty());
    let listing = manager.list_breakpoints().await.expect("listing");
    assert!(listing.breakpoints.lines(&project.file("pkg/helper.py")).is_empty());

    let last = connector
        .log()
        .requests()
        .into_iter()
        .rev()
        .find(|r| r.command == "setBreakpoints")
        .and_then(|r| r.arguments)
        .expect("clearing request");
    assert_eq!(last["breakpoints"], serde_json::json!([]));
}

// ── Input validation ──────────────────────────────────────────────────────────

#[tokio::test]
async fn line_zero_is_invalid_input() {
    let project = Project::new();
    let connector = FakeConnector::debugpy(Behavior::default());
    let manager = project.manager(&connector);
    manager
        .launch(LaunchRequest::new("app.py"))
        .await
        .expect("launch succeeds");
    let before = connector.log().count("setBreakpoints");

    let err = manager
        .set_breakpoints("app.py", &[0, 3])
        .await
        .expect_err("line 0 is rejected");

    assert!(matches!(err, AppError::InvalidInput(_)), "got {err:?}");
    assert_eq!(connector.log().count("setBreakpoints"), before, "nothing may be sent");
}

#[tokio::test]
async fn unknown_source_is_target_not_found() {
    let project = Project::new();
    let connector = FakeConnector::debugpy(Behavior::default());
    let manager = project.manager(&connector);
    manager
        .launch(LaunchRequest::new("app.py"))
        .await
        .expect("launch succeeds");

    let err = manager
        .set_breakpoints("helper.py", &[2])
        .await
        .expect_err("missing source");

    match err {
        AppError::TargetNotFound { suggestions, .. } => {
            assert!(
                suggestions.iter().any(|s| s.ends_with("pkg/helper.py")),
                "close matches are suggested: {suggestions:?}"
            );
        }
        other => panic!("expected TargetNotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn breakpoints_need_a_session() {
    let project = Project::new();
    let connector = FakeConnector::debugpy(Behavior::default());
    let manager = project.manager(&connector);

    assert!(matches!(manager.list_breakpoints().await, Err(AppError::NoSession)));
    assert!(matches!(
        manager.set_breakpoints("app.py", &[6]).await,
        Err(AppError::NoSession)
    ));
}
