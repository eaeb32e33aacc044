//! Seam between a session and the byte streams of its adapter.
//!
//! Production sessions spawn a subprocess through [`ProcessConnector`];
//! anything that can hand over a reader/writer pair can stand in for it.

use std::future::Future;
use std::pin::Pin;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::config::GlobalConfig;
use crate::dap::spawner::{spawn_adapter, AdapterProcess, SpawnConfig};
use crate::paths::discover_python;
use crate::Result;

/// Connected adapter streams plus the process behind them, if any.
pub struct AdapterLink {
    /// Inbound protocol stream.
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
    /// Outbound protocol stream.
    pub writer: Box<dyn AsyncWrite + Send + Unpin>,
    /// Subprocess to terminate on shutdown.
    pub process: Option<AdapterProcess>,
}

impl std::fmt::Debug for AdapterLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterLink")
            .field("process", &self.process)
            .finish_non_exhaustive()
    }
}

/// Opens a fresh adapter connection for each session.
pub trait AdapterConnector: Send + Sync {
    /// Connect an adapter for `session_id`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Transport` when the adapter cannot be started.
    fn connect(&self, session_id: &str)
        -> Pin<Box<dyn Future<Output = Result<AdapterLink>> + Send + '_>>;
}

/// Spawns the configured adapter executable.
#[derive(Debug, Clone)]
pub struct ProcessConnector {
    config: SpawnConfig,
}

impl ProcessConnector {
    /// Wrap an explicit spawn configuration.
    #[must_use]
    pub fn new(config: SpawnConfig) -> Self {
        Self { config }
    }

    /// Build the spawn configuration from global settings, falling back to
    /// the project's Python interpreter when no adapter command is set.
    #[must_use]
    pub fn from_config(config: &GlobalConfig) -> Self {
        let command = config.adapter.command.clone().unwrap_or_else(|| {
            discover_python(config.project_root())
                .to_string_lossy()
                .into_owned()
        });
        Self::new(SpawnConfig {
            command,
            args: config.adapter.args.clone(),
            working_dir: config.project_root().to_path_buf(),
            env: config.adapter.env.clone(),
            startup_grace: config.timeouts.startup_grace(),
        })
    }
}

impl AdapterConnector for ProcessConnector {
    fn connect(
        &self,
        session_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<AdapterLink>> + Send + '_>> {
        let session_id = session_id.to_owned();
        Box::pin(async move {
            let spawned = spawn_adapter(&self.config, &session_id).await?;
            Ok(AdapterLink {
                reader: Box::new(spawned.stdout),
                writer: Box::new(spawned.stdin),
                process: Some(spawned.process),
            })
        })
    }
}
