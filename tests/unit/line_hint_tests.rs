//! Unit tests for the breakpoint line heuristics.

use agent_debug_bridge::orchestrator::line_hints::{check_line, validate_breakpoint_line};
use agent_debug_bridge::AppError;

const MODULE: &str = "\
import json
from pathlib import Path


class Loader:
    def __init__(self, path):
        self.path = Path(path)

    async def load(self):
        # read the whole file
        text = self.path.read_text()
        return json.loads(text)
";

#[test]
fn import_lines_warn() {
    for line in [1, 2] {
        let hint = check_line(MODULE, line).expect("in range");
        assert!(!hint.is_valid, "line {line} is an import");
        assert_eq!(hint.warnings, vec!["This is an import statement".to_owned()]);
        assert_eq!(hint.suggestions.len(), 2);
    }
}

#[test]
fn class_line_suggests_methods() {
    let hint = check_line(MODULE, 5).expect("in range");
    assert_eq!(hint.content, "class Loader:");
    assert_eq!(hint.warnings, vec!["This is a class definition line".to_owned()]);
}

#[test]
fn async_def_counts_as_definition() {
    let hint = check_line(MODULE, 9).expect("in range");
    assert_eq!(hint.warnings, vec!["This is a function definition line".to_owned()]);
    assert_eq!(hint.suggestions[0], "Consider line 10 (first line inside the function)");
}

#[test]
fn blank_line_points_to_next_code() {
    let hint = check_line(MODULE, 3).expect("in range");
    assert!(!hint.is_valid);
    assert_eq!(hint.suggestions, vec!["Consider line 5: class Loader:".to_owned()]);
}

#[test]
fn comment_points_past_itself() {
    let hint = check_line(MODULE, 10).expect("in range");
    assert_eq!(hint.warnings, vec!["This is a comment or blank line".to_owned()]);
    assert_eq!(
        hint.suggestions,
        vec!["Consider line 11: text = self.path.read_text()".to_owned()]
    );
}

#[test]
fn executable_statement_is_valid() {
    let hint = check_line(MODULE, 7).expect("in range");
    assert!(hint.is_valid);
    assert!(hint.warnings.is_empty());
    assert!(hint.suggestions.is_empty());
}

#[test]
fn long_suggestion_preview_is_cut() {
    let long = format!("# note\nvalue = {}\n", "1 + ".repeat(30));
    let hint = check_line(&long, 1).expect("in range");
    let suggestion = &hint.suggestions[0];
    assert!(suggestion.ends_with("..."), "preview must be truncated: {suggestion}");
}

#[test]
fn comment_run_longer_than_lookahead_has_no_suggestion() {
    let text = "#\n#\n#\n#\n#\n#\n#\nx = 1\n";
    let hint = check_line(text, 1).expect("in range");
    assert!(!hint.is_valid);
    assert!(hint.suggestions.is_empty());
}

#[test]
fn line_past_end_is_invalid_input() {
    let err = check_line(MODULE, 500).expect_err("out of range");
    assert!(matches!(err, AppError::InvalidInput(ref msg) if msg.contains("500")));
}

#[tokio::test]
async fn missing_file_is_target_not_found() {
    let temp = tempfile::tempdir().expect("tempdir");
    let err = validate_breakpoint_line(&temp.path().join("nope.py"), 1)
        .await
        .expect_err("missing file");
    assert!(matches!(err, AppError::TargetNotFound { .. }), "got {err:?}");
}

#[tokio::test]
async fn file_on_disk_is_checked() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("loader.py");
    std::fs::write(&path, MODULE).expect("write");

    let hint = validate_breakpoint_line(&path, 11).await.expect("checked");
    assert!(hint.is_valid);
    assert_eq!(hint.line, 11);
}
