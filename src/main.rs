#![forbid(unsafe_code)]

//! `agent-debug-bridge`: MCP server driving a debug adapter for agents.
//!
//! Loads configuration, serves the MCP tools over stdio, and shuts the
//! active debug session down when the client disconnects or a termination
//! signal arrives.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use agent_debug_bridge::config::GlobalConfig;
use agent_debug_bridge::mcp::handler::AppState;
use agent_debug_bridge::mcp::transport;
use agent_debug_bridge::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "agent-debug-bridge", about = "MCP debug adapter bridge", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the project root.
    #[arg(long)]
    project_root: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("agent-debug-bridge bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = match &args.config {
        Some(path) => GlobalConfig::load_from_path(path)?,
        None => GlobalConfig::from_toml_str("")?,
    };
    if let Some(root) = &args.project_root {
        config.override_project_root(root)?;
    }
    let config = Arc::new(config);
    info!(project_root = %config.project_root().display(), "configuration loaded");

    let state = Arc::new(AppState::new(Arc::clone(&config)));

    // ── Start transport ─────────────────────────────────
    let ct = CancellationToken::new();
    let stdio_ct = ct.clone();
    let stdio_state = Arc::clone(&state);
    let mut stdio_handle = tokio::spawn(async move {
        if let Err(err) = transport::serve_stdio(stdio_state, stdio_ct).await {
            error!(%err, "stdio transport failed");
        }
    });

    info!("MCP server ready");

    // ── Wait for client disconnect or shutdown signal ───
    let signalled = tokio::select! {
        () = shutdown_signal() => true,
        _ = &mut stdio_handle => false,
    };
    if signalled {
        info!("shutdown signal received");
        ct.cancel();
        let _ = stdio_handle.await;
    } else {
        info!("client disconnected");
    }

    // ── Release the debug session ───────────────────────
    let report = state.sessions.shutdown().await;
    info!(status = ?report.status, "agent-debug-bridge shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

/// Logs always go to stderr; stdout carries the MCP protocol.
fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
