//! Opaque pass-through to the project's test runner.
//!
//! The runner is invoked with a JSON report flag pointing at a temporary
//! file; the parsed report is returned unchanged together with a small
//! debug block describing the invocation.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tokio::process::Command;
use tracing::{info, warn};

use crate::config::GlobalConfig;
use crate::paths::discover_python;
use crate::{AppError, Result};

/// Number of trailing output lines kept in the debug block.
const OUTPUT_TAIL_LINES: usize = 20;

/// Characters that must not appear in runner arguments.
const FORBIDDEN_ARG_CHARS: &str = r#"[;&|`"'$()]"#;

fn forbidden_chars() -> Result<&'static Regex> {
    static PATTERN: OnceLock<std::result::Result<Regex, regex::Error>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(FORBIDDEN_ARG_CHARS))
        .as_ref()
        .map_err(|err| AppError::TestRunner(format!("argument filter invalid: {err}")))
}

/// How the runner was invoked.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRunDebug {
    /// Executable.
    pub command: String,
    /// Full argument list.
    pub args: Vec<String>,
    /// Working directory.
    pub cwd: PathBuf,
    /// Exit code, `None` when killed by a signal.
    pub exit_code: Option<i32>,
    /// Last lines of standard output.
    pub stdout_tail: Vec<String>,
    /// Last lines of standard error.
    pub stderr_tail: Vec<String>,
}

/// Parsed report plus invocation details.
#[derive(Debug, Clone, Serialize)]
pub struct TestRunOutcome {
    /// Report as written by the runner.
    pub report: Value,
    /// Invocation details.
    pub debug: TestRunDebug,
}

/// Reject arguments containing shell metacharacters.
///
/// # Errors
///
/// Returns `AppError::InvalidInput` naming the first offending argument.
pub fn validate_args(args: &[String]) -> Result<()> {
    let pattern = forbidden_chars()?;
    match args.iter().find(|arg| pattern.is_match(arg)) {
        Some(arg) => Err(AppError::InvalidInput(format!(
            "invalid characters in test argument '{arg}'"
        ))),
        None => Ok(()),
    }
}

/// Run the configured test runner with `extra_args`.
///
/// # Errors
///
/// - `AppError::InvalidInput` for arguments with shell metacharacters.
/// - `AppError::TestRunner` if the runner cannot start, exceeds its
///   timeout, or writes no parseable report.
pub async fn run_tests(config: &GlobalConfig, extra_args: &[String]) -> Result<TestRunOutcome> {
    validate_args(extra_args)?;

    let report_file = tempfile::Builder::new()
        .prefix("test-report-")
        .suffix(".json")
        .tempfile()
        .map_err(|err| AppError::TestRunner(format!("cannot create report file: {err}")))?;

    let settings = &config.tests;
    let command = settings.command.clone().unwrap_or_else(|| {
        discover_python(config.project_root())
            .to_string_lossy()
            .into_owned()
    });
    let mut args = settings.args.clone();
    args.push(format!(
        "{}={}",
        settings.report_flag,
        report_file.path().display()
    ));
    args.extend(extra_args.iter().cloned());
    let cwd = config.project_root().to_path_buf();

    info!(command, ?args, cwd = %cwd.display(), "running tests");

    let child = Command::new(&command)
        .args(&args)
        .current_dir(&cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|err| AppError::TestRunner(format!("failed to start '{command}': {err}")))?;

    let timeout = Duration::from_secs(settings.timeout_seconds);
    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| {
            AppError::TestRunner(format!(
                "test run exceeded {} seconds",
                settings.timeout_seconds
            ))
        })?
        .map_err(|err| AppError::TestRunner(format!("test run failed: {err}")))?;

    let run_debug = TestRunDebug {
        command,
        args,
        cwd,
        exit_code: output.status.code(),
        stdout_tail: tail_lines(&output.stdout),
        stderr_tail: tail_lines(&output.stderr),
    };

    let raw = match tokio::fs::read_to_string(report_file.path()).await {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(err) => {
            warn!(exit_code = ?run_debug.exit_code, error = %err, "cannot read test report");
            return Err(AppError::TestRunner(format!(
                "cannot read report {}: {err}",
                report_file.path().display()
            )));
        }
    };
    if raw.trim().is_empty() {
        warn!(exit_code = ?run_debug.exit_code, "test runner wrote no report");
        return Err(AppError::TestRunner(format!(
            "report not found (exit code {:?}); is the JSON report plugin installed? {}",
            run_debug.exit_code,
            run_debug.stderr_tail.join(" | ")
        )));
    }
    let report: Value = serde_json::from_str(&raw)
        .map_err(|err| AppError::TestRunner(format!("report is not valid JSON: {err}")))?;

    info!(exit_code = ?run_debug.exit_code, "tests finished");
    Ok(TestRunOutcome {
        report,
        debug: run_debug,
    })
}

/// Run only tests matching `keyword`.
///
/// # Errors
///
/// As [`run_tests`].
pub async fn run_tests_focus(config: &GlobalConfig, keyword: &str) -> Result<TestRunOutcome> {
    run_tests(config, &["-k".to_owned(), keyword.to_owned()]).await
}

fn tail_lines(bytes: &[u8]) -> Vec<String> {
    let text = String::from_utf8_lossy(bytes);
    let lines: Vec<&str> = text.lines().collect();
    let skip = lines.len().saturating_sub(OUTPUT_TAIL_LINES);
    lines[skip..].iter().map(|line| (*line).to_owned()).collect()
}
