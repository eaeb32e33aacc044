//! Heuristic check of whether a source line is a useful breakpoint location.
//!
//! Only the line text is inspected. Definition headers, comments, blank
//! lines and imports rarely stop where an agent expects, so they produce
//! warnings with nearby alternatives.

use std::path::Path;

use serde::Serialize;

use crate::{AppError, Result};

/// How far ahead to look for the next executable line.
const LOOKAHEAD: usize = 5;

/// Longest preview of a suggested line.
const PREVIEW_CHARS: usize = 50;

/// Verdict for one line.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LineHint {
    /// 1-based line number checked.
    pub line: u32,
    /// Trimmed line text.
    pub content: String,
    /// Whether no warning applies.
    pub is_valid: bool,
    /// Problems found.
    pub warnings: Vec<String>,
    /// Better locations or approaches.
    pub suggestions: Vec<String>,
}

/// Inspect `line` of the file at `path`.
///
/// # Errors
///
/// - `AppError::TargetNotFound` if the file does not exist.
/// - `AppError::Io` if it cannot be read as UTF-8.
/// - `AppError::InvalidInput` if `line` is outside the file.
pub async fn validate_breakpoint_line(path: &Path, line: u32) -> Result<LineHint> {
    if !path.is_file() {
        return Err(AppError::TargetNotFound {
            requested: path.display().to_string(),
            candidates: vec![path.to_path_buf()],
            suggestions: Vec::new(),
        });
    }
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|err| AppError::Io(format!("cannot read {}: {err}", path.display())))?;
    check_line(&text, line)
}

/// Inspect `line` of `text`.
///
/// # Errors
///
/// Returns `AppError::InvalidInput` if `line` is outside `text`.
pub fn check_line(text: &str, line: u32) -> Result<LineHint> {
    let lines: Vec<&str> = text.lines().collect();
    let index = usize::try_from(line)
        .ok()
        .and_then(|line| line.checked_sub(1))
        .filter(|index| *index < lines.len())
        .ok_or_else(|| {
            AppError::InvalidInput(format!(
                "line {line} is out of range; the file has {} lines",
                lines.len()
            ))
        })?;

    let content = lines[index].trim();
    let mut warnings = Vec::new();
    let mut suggestions = Vec::new();

    if content.starts_with("def ") || content.starts_with("async def ") {
        warnings.push("This is a function definition line".to_owned());
        if index + 1 < lines.len() {
            suggestions.push(format!(
                "Consider line {} (first line inside the function)",
                index + 2
            ));
        }
        suggestions.push("Or set a breakpoint where the function is called, then step in".to_owned());
    }

    if content.starts_with("class ") {
        warnings.push("This is a class definition line".to_owned());
        suggestions.push("Set a breakpoint in __init__ or a method instead".to_owned());
    }

    if is_blank_or_comment(content) {
        warnings.push("This is a comment or blank line".to_owned());
        let next = lines
            .iter()
            .enumerate()
            .skip(index + 1)
            .take(LOOKAHEAD)
            .map(|(i, text)| (i, text.trim()))
            .find(|(_, text)| !is_blank_or_comment(text));
        if let Some((i, text)) = next {
            suggestions.push(format!("Consider line {}: {}", i + 1, preview(text)));
        }
    }

    if content.starts_with("import ") || content.starts_with("from ") {
        warnings.push("This is an import statement".to_owned());
        suggestions.push("Breakpoints on imports may not be useful".to_owned());
        suggestions.push("Set a breakpoint in a function or after the imports".to_owned());
    }

    Ok(LineHint {
        line,
        content: content.to_owned(),
        is_valid: warnings.is_empty(),
        warnings,
        suggestions,
    })
}

fn is_blank_or_comment(text: &str) -> bool {
    text.is_empty() || text.starts_with('#')
}

fn preview(text: &str) -> String {
    if text.chars().count() > PREVIEW_CHARS {
        let cut: String = text.chars().take(PREVIEW_CHARS).collect();
        format!("{cut}...")
    } else {
        text.to_owned()
    }
}
