//! Execution control and inspection against a stopped debuggee.

use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, info};

use crate::dap::events::WaitOutcome;
use crate::models::execution::{
    EventWaitResult, ExecutionCommand, ExecutionResult, LocalsReport, SelectedThread,
    ThreadSelection,
};
use crate::orchestrator::session::SessionShared;
use crate::{AppError, Result};

/// Number of frames requested by `stackTrace`.
const STACK_DEPTH: u64 = 20;

/// Pick the thread a command applies to.
///
/// An explicit id wins, then the thread of the cached stop, then the first
/// thread the adapter lists.
///
/// # Errors
///
/// Returns `AppError::NoStoppableThread` when no thread can be found, or
/// the error of the `threads` request.
pub async fn select_thread(shared: &SessionShared, explicit: Option<i64>) -> Result<SelectedThread> {
    if let Some(thread_id) = explicit {
        return Ok(SelectedThread {
            thread_id,
            selection: ThreadSelection::Explicit,
        });
    }

    let cached = shared
        .state
        .read()
        .await
        .last_stop
        .as_ref()
        .and_then(|stop| stop.thread_id());
    if let Some(thread_id) = cached {
        return Ok(SelectedThread {
            thread_id,
            selection: ThreadSelection::LastStopped,
        });
    }

    let body = shared.client.call("threads", None).await?;
    body.get("threads")
        .and_then(Value::as_array)
        .and_then(|threads| threads.first())
        .and_then(|thread| thread.get("id"))
        .and_then(Value::as_i64)
        .map(|thread_id| SelectedThread {
            thread_id,
            selection: ThreadSelection::FirstListed,
        })
        .ok_or(AppError::NoStoppableThread)
}

/// Issue an execution-control command.
///
/// The `stopped` wait cursor is advanced first, so a following
/// `wait_for_event("stopped")` only sees stops caused by this command.
///
/// # Errors
///
/// `AppError::SessionClosed` after the session ended, thread selection
/// errors, and the adapter's rejection of the command.
pub async fn execute(
    shared: &SessionShared,
    command: ExecutionCommand,
    thread: Option<i64>,
) -> Result<ExecutionResult> {
    shared.ensure_active().await?;
    let selected = select_thread(shared, thread).await?;

    {
        let generation = shared.client.events().generation();
        let mut state = shared.state.write().await;
        state.consume("stopped", generation);
        state.last_thread = Some(selected);
    }

    let body = shared
        .client
        .call(
            command.protocol_command(),
            Some(json!({ "threadId": selected.thread_id })),
        )
        .await?;

    info!(
        session_id = shared.session_id(),
        command = command.protocol_command(),
        thread_id = selected.thread_id,
        selection = ?selected.selection,
        "execution command accepted"
    );

    Ok(ExecutionResult {
        command,
        thread: selected,
        body,
    })
}

/// Variables of the innermost frame's local scope.
///
/// The scope named `Locals` (any case) or hinted as locals is preferred,
/// then the first inexpensive scope. A frame without scopes yields an
/// empty list.
///
/// # Errors
///
/// `AppError::NoStoppableThread` when the thread has no frames, otherwise
/// the errors of the underlying requests.
pub async fn locals(shared: &SessionShared, thread: Option<i64>) -> Result<LocalsReport> {
    shared.ensure_active().await?;
    let selected = select_thread(shared, thread).await?;
    shared.state.write().await.last_thread = Some(selected);

    let trace = shared
        .client
        .call(
            "stackTrace",
            Some(json!({
                "threadId": selected.thread_id,
                "startFrame": 0,
                "levels": STACK_DEPTH,
            })),
        )
        .await?;
    let frame = trace
        .get("stackFrames")
        .and_then(Value::as_array)
        .and_then(|frames| frames.first())
        .cloned()
        .ok_or(AppError::NoStoppableThread)?;
    let frame_id = frame
        .get("id")
        .and_then(Value::as_i64)
        .ok_or_else(|| AppError::Protocol("stack frame without an id".into()))?;
    let frame_name = frame
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();

    let scopes = shared
        .client
        .call("scopes", Some(json!({ "frameId": frame_id })))
        .await?;
    let Some(scope) = pick_locals_scope(&scopes) else {
        debug!(session_id = shared.session_id(), frame_id, "frame has no usable scope");
        return Ok(LocalsReport {
            thread: selected,
            frame_id,
            frame_name,
            scope_name: None,
            variables: Vec::new(),
        });
    };

    let reference = scope
        .get("variablesReference")
        .and_then(Value::as_i64)
        .unwrap_or(0);
    let variables = if reference > 0 {
        shared
            .client
            .call("variables", Some(json!({ "variablesReference": reference })))
            .await?
            .get("variables")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
    } else {
        Vec::new()
    };

    Ok(LocalsReport {
        thread: selected,
        frame_id,
        frame_name,
        scope_name: scope.get("name").and_then(Value::as_str).map(str::to_owned),
        variables,
    })
}

/// Choose the locals scope from a `scopes` response body.
#[must_use]
pub fn pick_locals_scope(body: &Value) -> Option<&Value> {
    let scopes = body.get("scopes")?.as_array()?;
    let is_locals = |scope: &&Value| {
        scope
            .get("name")
            .and_then(Value::as_str)
            .is_some_and(|name| name.to_lowercase().starts_with("locals"))
            || scope.get("presentationHint").and_then(Value::as_str) == Some("locals")
    };
    let cheap = |scope: &&Value| {
        !scope
            .get("expensive")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    };
    scopes
        .iter()
        .find(is_locals)
        .or_else(|| scopes.iter().find(cheap))
}

/// Wait for the next event called `name` not yet consumed by a caller.
///
/// An event that arrived before the wait started still satisfies it. Timing
/// out is a normal result, not an error.
pub async fn wait_for_event(shared: &SessionShared, name: &str, timeout: Duration) -> EventWaitResult {
    let after = shared.state.read().await.cursor(name);
    let outcome = shared.client.events().wait_for(name, after, timeout).await;

    let mut result = EventWaitResult {
        name: name.to_owned(),
        timed_out: false,
        timeout_seconds: timeout.as_secs_f64(),
        event: None,
        disconnected: None,
    };
    match outcome {
        WaitOutcome::Received(observed) => {
            shared.state.write().await.consume(name, observed.generation);
            result.event = Some(observed);
        }
        WaitOutcome::TimedOut => result.timed_out = true,
        WaitOutcome::Disconnected(reason) => result.disconnected = Some(reason),
    }
    result
}
