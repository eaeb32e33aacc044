//! Three-phase breakpoint registration.
//!
//! Adapters differ in when they accept breakpoints. Some verify them before
//! `configurationDone`, some only after `initialized`, and module sources may
//! only resolve once the debuggee has actually loaded them. Each source is
//! therefore attempted up to three times:
//!
//! 1. before `configurationDone`, every source;
//! 2. after `initialized`, sources not yet fully verified;
//! 3. after the first stop, module sources still unverified.
//!
//! A settled record is never retried automatically. Manual registrations
//! start a fresh record and are attempted in the phase the session has
//! reached.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::dap::events::WaitOutcome;
use crate::models::breakpoint::{
    ExceptionRegistration, RegistrationPhase, RegistrationRecord, SourceRole,
};
use crate::orchestrator::session::{PostStopRetry, SessionShared};
use crate::{AppError, Result};

/// Lines the adapter reported as verified.
///
/// Verification is positional: entry `i` of `body.breakpoints` answers
/// requested line `i`. Missing entries count as unverified.
#[must_use]
pub fn verified_lines(requested: &[u32], body: Option<&Value>) -> BTreeSet<u32> {
    let Some(entries) = body
        .and_then(|body| body.get("breakpoints"))
        .and_then(Value::as_array)
    else {
        return BTreeSet::new();
    };

    requested
        .iter()
        .zip(entries)
        .filter(|(_, entry)| entry.get("verified").and_then(Value::as_bool) == Some(true))
        .map(|(line, _)| *line)
        .collect()
}

/// Arguments of a `setBreakpoints` request.
#[must_use]
pub fn set_breakpoints_arguments(source: &Path, lines: &[u32]) -> Value {
    let name = source
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let breakpoints: Vec<Value> = lines.iter().map(|line| json!({ "line": line })).collect();
    json!({
        "source": { "path": source, "name": name },
        "breakpoints": breakpoints,
        "lines": lines,
        "sourceModified": false,
    })
}

/// Drives registration attempts for one session.
#[derive(Debug, Clone, Copy)]
pub struct Registrar<'a> {
    shared: &'a SessionShared,
}

impl<'a> Registrar<'a> {
    /// Registrar over `shared`.
    #[must_use]
    pub fn new(shared: &'a SessionShared) -> Self {
        Self { shared }
    }

    /// Track `lines` for `source` with a fresh record, replacing any earlier
    /// request for it.
    pub async fn track(&self, source: &Path, role: SourceRole, lines: BTreeSet<u32>) {
        let mut state = self.shared.state.write().await;
        state.breakpoints.set(source, role, lines.iter().copied());
        state
            .registrations
            .insert(source.to_path_buf(), RegistrationRecord::new(source, role, lines));
    }

    /// Attempt every tracked source that `phase` applies to.
    ///
    /// Adapter rejections and timeouts are recorded on the affected record
    /// and do not stop the pass.
    ///
    /// # Errors
    ///
    /// Returns the first terminal transport error.
    pub async fn register_all(&self, phase: RegistrationPhase) -> Result<()> {
        let sources: Vec<PathBuf> = {
            let state = self.shared.state.read().await;
            state
                .registrations
                .values()
                .filter(|record| record.needs_retry(phase))
                .map(|record| record.source.clone())
                .collect()
        };

        if sources.is_empty() {
            debug!(session_id = self.shared.session_id(), ?phase, "no sources to register");
            return Ok(());
        }

        for source in sources {
            self.attempt(&source, phase).await?;
        }
        Ok(())
    }

    /// Send one `setBreakpoints` for `source` and record the outcome.
    ///
    /// Returns the updated record, or `None` when `source` is not tracked.
    ///
    /// # Errors
    ///
    /// Returns terminal transport errors only.
    pub async fn attempt(
        &self,
        source: &Path,
        phase: RegistrationPhase,
    ) -> Result<Option<RegistrationRecord>> {
        let requested = {
            let state = self.shared.state.read().await;
            match state.registrations.get(source) {
                Some(record) => record.requested.clone(),
                None => return Ok(None),
            }
        };
        let lines: Vec<u32> = requested.iter().copied().collect();

        let outcome = self
            .shared
            .client
            .send_request("setBreakpoints", Some(set_breakpoints_arguments(source, &lines)))
            .await;

        let (accepted, verified, message) = match outcome {
            Ok(response) if response.success => {
                (true, verified_lines(&lines, response.body.as_ref()), None)
            }
            Ok(response) => (false, BTreeSet::new(), Some(response.failure_message())),
            Err(err) if err.is_terminal() => return Err(err),
            Err(err) => (false, BTreeSet::new(), Some(err.to_string())),
        };

        let mut state = self.shared.state.write().await;
        let Some(record) = state.registrations.get_mut(source) else {
            return Ok(None);
        };
        if record.requested != requested {
            // Replaced by a newer request while this one was in flight.
            return Ok(Some(record.clone()));
        }
        record.record_attempt(phase, accepted, &verified, message);

        info!(
            session_id = self.shared.session_id(),
            source = %source.display(),
            ?phase,
            accepted,
            verified = ?record.verified,
            unverified = ?record.unverified(),
            status = ?record.status,
            "breakpoint registration attempted"
        );
        Ok(Some(record.clone()))
    }

    /// Send the configured exception filters.
    ///
    /// Later calls only resend after a rejection. No-op without filters.
    ///
    /// # Errors
    ///
    /// Returns terminal transport errors only.
    pub async fn register_exceptions(&self, filters: &[String]) -> Result<()> {
        if filters.is_empty() {
            return Ok(());
        }
        if let Some(previous) = &self.shared.state.read().await.exception_breakpoints {
            if previous.accepted {
                return Ok(());
            }
        }

        let outcome = self
            .shared
            .client
            .send_request("setExceptionBreakpoints", Some(json!({ "filters": filters })))
            .await;
        let (accepted, message) = match outcome {
            Ok(response) if response.success => (true, None),
            Ok(response) => (false, Some(response.failure_message())),
            Err(err) if err.is_terminal() => return Err(err),
            Err(err) => (false, Some(err.to_string())),
        };

        let mut state = self.shared.state.write().await;
        let attempts = state
            .exception_breakpoints
            .as_ref()
            .map_or(0, |previous| previous.attempts)
            + 1;
        if !accepted {
            warn!(
                session_id = self.shared.session_id(),
                ?filters,
                message = message.as_deref().unwrap_or_default(),
                "exception breakpoints rejected"
            );
        }
        state.exception_breakpoints = Some(ExceptionRegistration {
            filters: filters.to_vec(),
            accepted,
            attempts,
            message,
        });
        Ok(())
    }

    /// Phase 3: re-register unverified modules once, after the first stop.
    ///
    /// # Errors
    ///
    /// Returns terminal transport errors only.
    pub async fn retry_after_first_stop(&self) -> Result<()> {
        self.register_all(RegistrationPhase::PostFirstStop).await
    }

    /// Claim the post-stop retry for the launch sequence.
    ///
    /// Returns `false` when it already ran or is running.
    pub async fn claim_post_stop_retry(&self) -> bool {
        let mut state = self.shared.state.write().await;
        if state.post_stop_retry == PostStopRetry::Pending {
            state.post_stop_retry = PostStopRetry::ClaimedByLaunch;
            true
        } else {
            false
        }
    }

    /// Settle a claim made by [`claim_post_stop_retry`](Self::claim_post_stop_retry).
    ///
    /// Runs the retry when the session has stopped. Otherwise the claim is
    /// released so that the first stop triggers it later.
    ///
    /// # Errors
    ///
    /// Returns terminal transport errors only.
    pub async fn finish_claimed_retry(&self) -> Result<()> {
        {
            let mut state = self.shared.state.write().await;
            if state.post_stop_retry != PostStopRetry::ClaimedByLaunch {
                return Ok(());
            }
            if state.stop_count == 0 {
                state.post_stop_retry = PostStopRetry::Pending;
                return Ok(());
            }
        }

        let result = self.retry_after_first_stop().await;
        self.shared.state.write().await.post_stop_retry = PostStopRetry::Done;
        result
    }

    /// Register `lines` for `source` outside the launch sequence.
    ///
    /// The attempt uses the phase the session has reached. A rejection
    /// before `initialized` is retried once `initialized` arrives, bounded
    /// by the initialized timeout.
    ///
    /// # Errors
    ///
    /// Returns terminal transport errors, or `AppError::Protocol` if the
    /// record vanished.
    pub async fn register_manual(
        &self,
        source: &Path,
        lines: BTreeSet<u32>,
    ) -> Result<RegistrationRecord> {
        let phase = {
            let state = self.shared.state.read().await;
            let role = state
                .breakpoints
                .role(source)
                .unwrap_or_else(|| match state.program.as_deref() {
                    Some(program) if program == source => SourceRole::Program,
                    _ => SourceRole::Module,
                });
            drop(state);
            self.track(source, role, lines).await;

            let state = self.shared.state.read().await;
            if state.stop_count > 0 {
                RegistrationPhase::PostFirstStop
            } else if state.initialized {
                RegistrationPhase::PostInitialized
            } else {
                RegistrationPhase::PreConfiguration
            }
        };

        let record = self
            .attempt(source, phase)
            .await?
            .ok_or_else(|| lost_record(source))?;

        if phase != RegistrationPhase::PreConfiguration || record.is_fully_verified() {
            return Ok(record);
        }

        let timeout = self.shared.config.timeouts.initialized();
        match self
            .shared
            .client
            .events()
            .wait_for("initialized", 0, timeout)
            .await
        {
            WaitOutcome::Received(_) => self
                .attempt(source, RegistrationPhase::PostInitialized)
                .await?
                .ok_or_else(|| lost_record(source)),
            WaitOutcome::TimedOut => Ok(record),
            WaitOutcome::Disconnected(reason) => Err(AppError::Transport(reason)),
        }
    }
}

fn lost_record(source: &Path) -> AppError {
    AppError::Protocol(format!(
        "registration record for {} disappeared",
        source.display()
    ))
}
