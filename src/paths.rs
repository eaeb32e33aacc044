//! Path resolution for launch targets and project-confined file access.
//!
//! Relative paths supplied by an agent are ambiguous: they may be relative to
//! the bridge's own working directory, the project root, or the debuggee's
//! working directory. Resolution tries each in turn and, when nothing exists,
//! reports every candidate so the caller can correct itself.

use std::env;
use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::{AppError, Result};

/// Maximum number of same-name suggestions attached to a miss.
pub const MAX_SUGGESTIONS: usize = 5;

/// Candidate absolute paths for `requested`, in resolution order.
///
/// An absolute path is its only candidate. A relative path is tried as given
/// (against the process working directory), then against `project_root`,
/// then against `cwd`. Duplicates are dropped, keeping the first position.
#[must_use]
pub fn candidate_paths(requested: &Path, project_root: &Path, cwd: Option<&Path>) -> Vec<PathBuf> {
    if requested.is_absolute() {
        return vec![normalize(requested)];
    }

    let mut bases: Vec<PathBuf> = Vec::with_capacity(3);
    if let Ok(current) = env::current_dir() {
        bases.push(current);
    }
    bases.push(project_root.to_path_buf());
    if let Some(cwd) = cwd {
        bases.push(cwd.to_path_buf());
    }

    let mut candidates: Vec<PathBuf> = Vec::with_capacity(bases.len());
    for base in bases {
        let candidate = normalize(&base.join(requested));
        if !candidates.contains(&candidate) {
            candidates.push(candidate);
        }
    }
    candidates
}

/// Resolve `requested` to an existing, canonical file path.
///
/// # Errors
///
/// Returns [`AppError::TargetNotFound`] listing every candidate tried plus up
/// to [`MAX_SUGGESTIONS`] files of the same name under `project_root`.
pub fn resolve_target(requested: &str, project_root: &Path, cwd: Option<&Path>) -> Result<PathBuf> {
    let raw = Path::new(requested);
    let candidates = candidate_paths(raw, project_root, cwd);

    for candidate in &candidates {
        if candidate.is_file() {
            let canonical = candidate.canonicalize().map_err(|err| {
                AppError::Io(format!("cannot canonicalize {}: {err}", candidate.display()))
            })?;
            debug!(requested, resolved = %canonical.display(), "target resolved");
            return Ok(canonical);
        }
    }

    let suggestions = raw
        .file_name()
        .map(|name| suggest_matches(project_root, &name.to_string_lossy()))
        .unwrap_or_default();

    Err(AppError::TargetNotFound {
        requested: requested.to_owned(),
        candidates,
        suggestions,
    })
}

/// Resolve the debuggee working directory, creating it when missing.
///
/// Relative paths resolve against `project_root`.
///
/// # Errors
///
/// Returns [`AppError::TargetNotFound`] when the directory cannot be created
/// or exists as a non-directory.
pub fn resolve_working_dir(requested: &str, project_root: &Path) -> Result<PathBuf> {
    let raw = Path::new(requested);
    let path = if raw.is_absolute() {
        normalize(raw)
    } else {
        normalize(&project_root.join(raw))
    };

    let not_found = |path: &Path| AppError::TargetNotFound {
        requested: requested.to_owned(),
        candidates: vec![path.to_path_buf()],
        suggestions: Vec::new(),
    };

    if !path.exists() {
        std::fs::create_dir_all(&path).map_err(|err| {
            debug!(requested, %err, "working directory could not be created");
            not_found(&path)
        })?;
    }
    if !path.is_dir() {
        return Err(not_found(&path));
    }
    path.canonicalize().map_err(|_| not_found(&path))
}

/// Files named `file_name` anywhere under `project_root`, at most
/// [`MAX_SUGGESTIONS`].
#[must_use]
pub fn suggest_matches(project_root: &Path, file_name: &str) -> Vec<PathBuf> {
    if file_name.is_empty() {
        return Vec::new();
    }
    let pattern = format!(
        "{}/**/{}",
        glob::Pattern::escape(&project_root.to_string_lossy()),
        glob::Pattern::escape(file_name)
    );
    match glob::glob(&pattern) {
        Ok(paths) => paths.filter_map(std::result::Result::ok).take(MAX_SUGGESTIONS).collect(),
        Err(err) => {
            debug!(%err, "suggestion pattern rejected");
            Vec::new()
        }
    }
}

/// Validate that `candidate` resides within `project_root`.
///
/// Relative candidates resolve against the root. `..` traversal above the
/// root and symlinks whose target escapes it are rejected. Returns the
/// resolved absolute path on success.
///
/// # Errors
///
/// Returns `AppError::PathViolation` if:
/// - The project root cannot be canonicalized.
/// - The candidate escapes the root lexically or through a symlink.
pub fn validate_path(project_root: &Path, candidate: impl AsRef<Path>) -> Result<PathBuf> {
    let root = project_root
        .canonicalize()
        .map_err(|err| AppError::PathViolation(format!("project root invalid: {err}")))?;

    let candidate = candidate.as_ref();
    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        root.join(candidate)
    };

    let absolute = normalize(&joined);
    if !absolute.starts_with(&root) {
        return Err(AppError::PathViolation(format!(
            "{} is outside the project root",
            candidate.display()
        )));
    }

    if absolute.exists() {
        let canonical = absolute
            .canonicalize()
            .map_err(|err| AppError::PathViolation(format!("cannot resolve path: {err}")))?;
        if !canonical.starts_with(&root) {
            return Err(AppError::PathViolation(
                "symlink target escapes the project root".into(),
            ));
        }
        Ok(canonical)
    } else {
        Ok(absolute)
    }
}

/// Python interpreter for the project.
///
/// Checks `$VIRTUAL_ENV`, then `.venv`, `venv` and `env` in the project root
/// and each of its ancestors, and finally falls back to `python3` on `PATH`.
#[must_use]
pub fn discover_python(project_root: &Path) -> PathBuf {
    if let Some(venv) = env::var_os("VIRTUAL_ENV") {
        let candidate = venv_python(Path::new(&venv));
        if candidate.is_file() {
            return candidate;
        }
    }

    for dir in project_root.ancestors() {
        for name in [".venv", "venv", "env"] {
            let candidate = venv_python(&dir.join(name));
            if candidate.is_file() {
                return candidate;
            }
        }
    }

    PathBuf::from(if cfg!(windows) { "python" } else { "python3" })
}

/// Prepend `entry` to a path-list variable value.
///
/// # Errors
///
/// Returns `AppError::InvalidInput` if `entry` contains the platform's
/// path-list separator.
pub fn prepend_path_list(existing: Option<OsString>, entry: &Path) -> Result<OsString> {
    let mut parts = vec![entry.to_path_buf()];
    if let Some(existing) = existing.filter(|value| !value.is_empty()) {
        parts.extend(env::split_paths(&existing));
    }
    env::join_paths(parts)
        .map_err(|err| AppError::InvalidInput(format!("cannot extend path list: {err}")))
}

// ── Private helpers ───────────────────────────────────────────────────────────

fn venv_python(venv: &Path) -> PathBuf {
    if cfg!(windows) {
        venv.join("Scripts").join("python.exe")
    } else {
        venv.join("bin").join("python")
    }
}

/// Lexically remove `.` and `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                normalized.pop();
            }
            Component::CurDir => {}
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}
