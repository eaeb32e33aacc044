//! Stdio transport for the agent connection.
//!
//! Stdout carries nothing but MCP frames; logs go to stderr. The transport
//! ends when the agent closes stdin or when `main` cancels it on a signal.
//! Either way the caller then tears down the active debug session, so an
//! adapter never outlives the agent that launched it.

use std::sync::Arc;

use rmcp::service::ServiceExt;
use rmcp::transport::io::stdio;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::handler::{AppState, DebugBridgeServer};
use crate::{AppError, Result};

/// Serve the debug bridge tools over stdio until the agent disconnects or
/// `ct` fires.
///
/// # Errors
///
/// Returns `AppError::Mcp` if the MCP handshake with the agent fails or the
/// service ends with an error.
pub async fn serve_stdio(state: Arc<AppState>, ct: CancellationToken) -> Result<()> {
    let project_root = state.config.project_root().display().to_string();
    let server = DebugBridgeServer::new(state);

    info!(project_root, "serving debug bridge over stdio");
    let service = server
        .serve_with_ct(stdio(), ct.clone())
        .await
        .map_err(|err| AppError::Mcp(format!("agent handshake over stdio failed: {err}")))?;

    service
        .waiting()
        .await
        .map_err(|err| AppError::Mcp(format!("stdio service error: {err}")))?;

    if ct.is_cancelled() {
        info!("stdio transport cancelled");
    } else {
        info!("agent closed stdio");
    }
    Ok(())
}
