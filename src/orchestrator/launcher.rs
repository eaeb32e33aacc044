//! Launch orchestration.
//!
//! Drives one session from spawn to first stop:
//!
//! 1. Resolve the program, working directory and module sources. Nothing
//!    is spawned when a target is missing.
//! 2. `initialize`.
//! 3. Phase 1 breakpoints and exception filters.
//! 4. `configurationDone` and `launch` in the adapter's handshake order.
//! 5. Wait for `initialized`, then phase 2.
//! 6. Optionally wait for the first stop and run phase 3.
//!
//! A rejected `initialize` or `launch`, or a lost transport, aborts the
//! session and releases the adapter.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::{info, info_span, warn, Instrument};

use crate::config::{GlobalConfig, HandshakeOrder};
use crate::dap::connector::AdapterConnector;
use crate::dap::events::WaitOutcome;
use crate::models::breakpoint::{normalize_lines, RegistrationPhase, SourceRole};
use crate::models::launch::{LaunchReport, LaunchRequest, StopOutcome};
use crate::models::session::LaunchPhase;
use crate::models::stopped::StoppedEventCache;
use crate::orchestrator::registrar::Registrar;
use crate::orchestrator::session::Session;
use crate::paths::{prepend_path_list, resolve_target, resolve_working_dir};
use crate::{AppError, Result};

/// Launch inputs after path resolution and validation.
#[derive(Debug, Clone)]
pub struct LaunchPlan {
    /// Canonical program path.
    pub program: PathBuf,
    /// Debuggee working directory.
    pub cwd: PathBuf,
    /// Breakpoints per canonical source, program included.
    pub sources: BTreeMap<PathBuf, (SourceRole, Vec<u32>)>,
    /// Original request.
    pub request: LaunchRequest,
}

impl LaunchPlan {
    /// Resolve every path named by `request`.
    ///
    /// # Errors
    ///
    /// - `AppError::TargetNotFound` for a missing program, module source or
    ///   uncreatable working directory.
    /// - `AppError::InvalidInput` for line `0` or a negative timeout.
    pub fn resolve(config: &GlobalConfig, request: LaunchRequest) -> Result<Self> {
        let root = config.project_root();
        let requested_cwd = request
            .cwd
            .as_deref()
            .map(|cwd| resolve_working_dir(cwd, root))
            .transpose()?;

        let program = resolve_target(&request.program, root, requested_cwd.as_deref())?;
        let cwd = match requested_cwd {
            Some(cwd) => cwd,
            None => program
                .parent()
                .map_or_else(|| root.to_path_buf(), Path::to_path_buf),
        };

        request.stop_timeout(config.timeouts.breakpoint())?;

        let mut sources = BTreeMap::new();
        for (source, lines) in &request.breakpoints_by_source {
            let path = resolve_target(source, root, Some(&cwd))?;
            let lines = normalize_lines(lines)?;
            if lines.is_empty() {
                continue;
            }
            let role = if path == program {
                SourceRole::Program
            } else {
                SourceRole::Module
            };
            let entry = sources.entry(path).or_insert((role, Vec::new()));
            entry.1.extend(lines);
        }
        if !request.breakpoints.is_empty() {
            let lines = normalize_lines(&request.breakpoints)?;
            let entry = sources
                .entry(program.clone())
                .or_insert((SourceRole::Program, Vec::new()));
            entry.1.extend(lines);
        }
        for (_, lines) in sources.values_mut() {
            lines.sort_unstable();
            lines.dedup();
        }

        Ok(Self {
            program,
            cwd,
            sources,
            request,
        })
    }
}

/// Arguments of the `initialize` request.
#[must_use]
pub fn initialize_arguments(config: &GlobalConfig) -> Value {
    json!({
        "clientID": config.adapter.client_id,
        "clientName": config.adapter.client_id,
        "adapterID": config.adapter.adapter_id,
        "pathFormat": "path",
        "linesStartAt1": true,
        "columnsStartAt1": true,
        "supportsVariableType": true,
        "supportsRunInTerminalRequest": true,
        "locale": "en-US",
    })
}

/// Arguments of the `launch` request.
///
/// Configured defaults are overlaid with `program`, `cwd`, `stopOnEntry`
/// and the debuggee environment. The project root is prepended to the
/// configured path-list variable.
///
/// # Errors
///
/// Returns `AppError::InvalidInput` if the project root cannot be added to
/// the path list.
pub fn launch_arguments(config: &GlobalConfig, plan: &LaunchPlan) -> Result<Value> {
    let mut args: Map<String, Value> = config.adapter.launch_defaults.clone();
    args.insert("program".into(), json!(plan.program));
    args.insert("cwd".into(), json!(plan.cwd));
    args.insert("stopOnEntry".into(), json!(plan.request.stop_on_entry));

    let mut env: Map<String, Value> = match args.remove("env") {
        Some(Value::Object(env)) => env,
        _ => Map::new(),
    };
    for (key, value) in &plan.request.env {
        env.insert(key.clone(), Value::String(value.clone()));
    }
    if let Some(var) = &config.adapter.project_root_env {
        let existing = env
            .get(var)
            .and_then(Value::as_str)
            .map(OsString::from)
            .or_else(|| std::env::var_os(var));
        let joined = prepend_path_list(existing, config.project_root())?;
        env.insert(var.clone(), Value::String(joined.to_string_lossy().into_owned()));
    }
    if !env.is_empty() {
        args.insert("env".into(), Value::Object(env));
    }

    Ok(Value::Object(args))
}

/// Start a session and run the launch sequence.
///
/// # Errors
///
/// Resolution errors before anything is spawned; afterwards adapter
/// rejections of `initialize` or `launch` and transport faults, in which
/// case the session has already been shut down.
pub async fn launch(
    config: Arc<GlobalConfig>,
    connector: &dyn AdapterConnector,
    request: LaunchRequest,
) -> Result<(Arc<Session>, LaunchReport)> {
    let plan = LaunchPlan::resolve(&config, request)?;
    let session = Session::start(Arc::clone(&config), connector).await?;

    let span = info_span!("launch", session_id = session.id(), program = %plan.program.display());
    match run_sequence(&session, &config, &plan).instrument(span).await {
        Ok(report) => Ok((session, report)),
        Err(err) => {
            warn!(session_id = session.id(), %err, "launch failed, aborting session");
            session.abort(err.to_string()).await;
            Err(err)
        }
    }
}

async fn run_sequence(session: &Session, config: &GlobalConfig, plan: &LaunchPlan) -> Result<LaunchReport> {
    let shared = session.shared().as_ref();
    let client = session.client();
    let registrar = Registrar::new(shared);
    let mut warnings = Vec::new();

    {
        let mut state = shared.state.write().await;
        state.program = Some(plan.program.clone());
        state.cwd = Some(plan.cwd.clone());
        state.advance(LaunchPhase::Initializing);
    }

    let capabilities = client
        .call("initialize", Some(initialize_arguments(config)))
        .await?;
    let initialized_early = client.events().latest("initialized").is_some();

    shared.state.write().await.advance(LaunchPhase::ConfiguringBreakpoints);
    for (source, (role, lines)) in &plan.sources {
        registrar
            .track(source, *role, lines.iter().copied().collect())
            .await;
    }
    registrar.register_all(RegistrationPhase::PreConfiguration).await?;
    registrar
        .register_exceptions(&config.adapter.exception_filters)
        .await?;

    shared
        .state
        .write()
        .await
        .advance(LaunchPhase::AwaitingConfigurationDone);
    let arguments = launch_arguments(config, plan)?;
    let launch_body = match config.adapter.handshake {
        HandshakeOrder::ConfigurationDoneFirst => {
            configuration_done(session, &mut warnings).await?;
            client.call("launch", Some(arguments)).await?
        }
        HandshakeOrder::LaunchFirst => {
            let pending = client.start_request("launch", Some(arguments)).await?;
            configuration_done(session, &mut warnings).await?;
            pending.result().await?
        }
    };
    shared.state.write().await.advance(LaunchPhase::Launched);
    info!(handshake = ?config.adapter.handshake, "debuggee launched");

    let initialized_observed = match client
        .events()
        .wait_for("initialized", 0, config.timeouts.initialized())
        .await
    {
        WaitOutcome::Received(_) => true,
        WaitOutcome::TimedOut => {
            warnings.push("adapter never sent 'initialized'; post-initialized registration skipped".into());
            false
        }
        WaitOutcome::Disconnected(reason) => return Err(AppError::Transport(reason)),
    };
    if initialized_observed {
        registrar.register_all(RegistrationPhase::PostInitialized).await?;
        registrar
            .register_exceptions(&config.adapter.exception_filters)
            .await?;
    }

    let stop = await_first_stop(session, config, plan, &registrar).await?;

    let mut state = shared.state.write().await;
    state.advance(LaunchPhase::Ready);
    Ok(LaunchReport {
        session_id: session.id().to_owned(),
        program: plan.program.clone(),
        cwd: plan.cwd.clone(),
        handshake: config.adapter.handshake,
        phase: state.phase.clone(),
        initialized_early,
        initialized_observed,
        stop_on_entry_requested: plan.request.stop_on_entry,
        capabilities,
        launch: launch_body,
        registrations: state.registrations.values().cloned().collect(),
        exception_breakpoints: state.exception_breakpoints.clone(),
        stop,
        warnings,
    })
}

/// `configurationDone`; a rejection is noted but does not abort.
async fn configuration_done(session: &Session, warnings: &mut Vec<String>) -> Result<()> {
    let response = session
        .client()
        .send_request("configurationDone", None)
        .await?;
    if !response.success {
        let message = response.failure_message();
        warn!(message, "configurationDone rejected");
        warnings.push(format!("configurationDone rejected: {message}"));
    }
    Ok(())
}

async fn await_first_stop(
    session: &Session,
    config: &GlobalConfig,
    plan: &LaunchPlan,
    registrar: &Registrar<'_>,
) -> Result<StopOutcome> {
    let request = &plan.request;
    if !request.wait_for_breakpoint {
        return Ok(StopOutcome::Skipped {
            reason: "waiting for a stop was not requested".into(),
        });
    }
    if !request.has_breakpoints() && !request.stop_on_entry {
        return Ok(StopOutcome::Skipped {
            reason: "no breakpoints requested and stop on entry disabled".into(),
        });
    }

    let shared = session.shared();
    let timeout = request.stop_timeout(config.timeouts.breakpoint())?;
    let claimed = registrar.claim_post_stop_retry().await;
    shared.state.write().await.advance(LaunchPhase::AwaitingFirstStop);

    let outcome = session
        .client()
        .events()
        .wait_for("stopped", 0, timeout)
        .await;

    if claimed {
        registrar.finish_claimed_retry().await?;
    }

    Ok(match outcome {
        WaitOutcome::Received(observed) => {
            let mut state = shared.state.write().await;
            state.consume("stopped", observed.generation);
            let stop = match &state.last_stop {
                Some(stop) => stop.clone(),
                None => StoppedEventCache::capture(1, &observed, state.breakpoints.clone()),
            };
            // Registration results from phase 3 are newer than the snapshot.
            let stop = StoppedEventCache {
                breakpoints: state.breakpoints.clone(),
                ..stop
            };
            StopOutcome::Stopped {
                stop: Box::new(stop),
            }
        }
        WaitOutcome::TimedOut => {
            info!(timeout_seconds = timeout.as_secs_f64(), "no stop before timeout");
            StopOutcome::TimedOut {
                timeout_seconds: timeout.as_secs_f64(),
            }
        }
        WaitOutcome::Disconnected(reason) => {
            shared.abort(reason.clone()).await;
            StopOutcome::Disconnected { reason }
        }
    })
}
