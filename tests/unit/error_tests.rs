//! Unit tests for error attribution and classification.

use std::path::PathBuf;

use agent_debug_bridge::errors::ErrorOrigin;
use agent_debug_bridge::mcp::tools::util::error_payload;
use agent_debug_bridge::AppError;

#[test]
fn only_adapter_rejections_are_attributed_to_adapter() {
    let rejection = AppError::Adapter {
        command: "next".into(),
        message: "thread is running".into(),
    };
    assert_eq!(rejection.origin(), ErrorOrigin::Adapter);

    for err in [
        AppError::Transport("eof".into()),
        AppError::Timeout("slow".into()),
        AppError::NoSession,
        AppError::NoStoppableThread,
    ] {
        assert_eq!(err.origin(), ErrorOrigin::Orchestrator, "{err} must be orchestrator-side");
    }
}

#[test]
fn transport_and_closure_are_terminal() {
    assert!(AppError::Transport("eof".into()).is_terminal());
    assert!(AppError::SessionClosed("shut down".into()).is_terminal());
    assert!(!AppError::Timeout("slow".into()).is_terminal());
    assert!(!AppError::Protocol("bad json".into()).is_terminal());
}

#[test]
fn display_names_rejected_command() {
    let err = AppError::Adapter {
        command: "stepOut".into(),
        message: "no caller".into(),
    };
    assert_eq!(err.to_string(), "adapter rejected 'stepOut': no caller");
}

#[test]
fn kinds_are_stable_identifiers() {
    assert_eq!(AppError::NoSession.kind(), "noSession");
    assert_eq!(AppError::Transport(String::new()).kind(), "transportFault");
    assert_eq!(AppError::Protocol(String::new()).kind(), "protocolFault");
    assert_eq!(AppError::InvalidInput(String::new()).kind(), "invalidInput");
}

#[test]
fn payload_without_suggestions_hints_at_absolute_paths() {
    let err = AppError::TargetNotFound {
        requested: "app.py".into(),
        candidates: vec![PathBuf::from("/a/app.py"), PathBuf::from("/b/app.py")],
        suggestions: Vec::new(),
    };

    let payload = error_payload(&err);

    assert_eq!(payload["error"]["candidates"].as_array().map(Vec::len), Some(2));
    assert!(
        payload["error"]["hint"]
            .as_str()
            .is_some_and(|hint| hint.contains("absolute path")),
        "hint must steer the agent toward an absolute path: {payload}"
    );
    assert_eq!(payload["error"]["retryable"], false);
}

#[test]
fn plain_errors_have_no_candidates() {
    let payload = error_payload(&AppError::NoStoppableThread);
    assert_eq!(payload["error"]["kind"], "noStoppableThread");
    assert_eq!(payload["error"]["retryable"], true);
    assert!(payload["error"].get("candidates").is_none());
}

#[test]
fn io_errors_convert() {
    let err: AppError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
    assert!(matches!(err, AppError::Io(ref msg) if msg == "gone"));
}
