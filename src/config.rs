//! Global configuration parsing and validation.
//!
//! Every section has defaults, so an empty document yields a working
//! configuration for `debugpy` rooted at the current directory.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{AppError, Result};

/// Order in which `configurationDone` and `launch` are issued.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum HandshakeOrder {
    /// Await `configurationDone`, then send and await `launch`.
    ConfigurationDoneFirst,
    /// Send `launch` without awaiting it, await `configurationDone`, then
    /// await the `launch` response. Required by `debugpy`, which only emits
    /// `initialized` after it has seen the launch request.
    LaunchFirst,
}

/// How to start the debug adapter subprocess and talk to it.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "snake_case")]
pub struct AdapterConfig {
    /// Adapter executable. `None` selects the project's Python interpreter.
    pub command: Option<String>,
    /// Arguments passed to the adapter executable.
    pub args: Vec<String>,
    /// Value of `adapterID` in the `initialize` request.
    pub adapter_id: String,
    /// Value of `clientID` in the `initialize` request.
    pub client_id: String,
    /// Handshake ordering expected by the adapter.
    pub handshake: HandshakeOrder,
    /// Filters sent with `setExceptionBreakpoints` during launch.
    pub exception_filters: Vec<String>,
    /// Environment variable of the debuggee that gets the project root
    /// prepended (`PYTHONPATH` for Python targets).
    pub project_root_env: Option<String>,
    /// Extra environment variables for the adapter process.
    pub env: BTreeMap<String, String>,
    /// Base launch arguments merged with `program`, `cwd`, `env` and
    /// `stopOnEntry` for every launch.
    pub launch_defaults: serde_json::Map<String, serde_json::Value>,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        let mut launch_defaults = serde_json::Map::new();
        launch_defaults.insert("name".into(), "agent-debug-bridge".into());
        launch_defaults.insert("type".into(), "python".into());
        launch_defaults.insert("request".into(), "launch".into());
        launch_defaults.insert("console".into(), "internalConsole".into());

        Self {
            command: None,
            args: vec!["-m".into(), "debugpy.adapter".into()],
            adapter_id: "python".into(),
            client_id: "agent-debug-bridge".into(),
            handshake: HandshakeOrder::LaunchFirst,
            exception_filters: Vec::new(),
            project_root_env: Some("PYTHONPATH".into()),
            env: BTreeMap::new(),
            launch_defaults,
        }
    }
}

/// Configurable bounds for waits and process lifecycle.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TimeoutConfig {
    /// Bound on a single correlated request.
    #[serde(default = "default_request_seconds")]
    pub request_seconds: u64,
    /// Bound on waiting for the adapter's `initialized` event.
    #[serde(default = "default_initialized_seconds")]
    pub initialized_seconds: u64,
    /// Default bound on waiting for the first stop after launch.
    #[serde(default = "default_breakpoint_seconds")]
    pub breakpoint_seconds: u64,
    /// Delay before probing a freshly spawned adapter for early exit.
    #[serde(default = "default_startup_grace_millis")]
    pub startup_grace_millis: u64,
    /// Time between the polite termination signal and a forced kill.
    #[serde(default = "default_shutdown_grace_seconds")]
    pub shutdown_grace_seconds: u64,
    /// Bound on the `disconnect` request sent during shutdown.
    #[serde(default = "default_disconnect_millis")]
    pub disconnect_millis: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_seconds: default_request_seconds(),
            initialized_seconds: default_initialized_seconds(),
            breakpoint_seconds: default_breakpoint_seconds(),
            startup_grace_millis: default_startup_grace_millis(),
            shutdown_grace_seconds: default_shutdown_grace_seconds(),
            disconnect_millis: default_disconnect_millis(),
        }
    }
}

impl TimeoutConfig {
    /// Bound on a single correlated request.
    #[must_use]
    pub fn request(&self) -> Duration {
        Duration::from_secs(self.request_seconds)
    }

    /// Bound on waiting for `initialized`.
    #[must_use]
    pub fn initialized(&self) -> Duration {
        Duration::from_secs(self.initialized_seconds)
    }

    /// Default bound on waiting for the first stop.
    #[must_use]
    pub fn breakpoint(&self) -> Duration {
        Duration::from_secs(self.breakpoint_seconds)
    }

    /// Startup probe delay.
    #[must_use]
    pub fn startup_grace(&self) -> Duration {
        Duration::from_millis(self.startup_grace_millis)
    }

    /// Termination grace period.
    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_seconds)
    }

    /// Bound on the shutdown `disconnect` request.
    #[must_use]
    pub fn disconnect(&self) -> Duration {
        Duration::from_millis(self.disconnect_millis)
    }
}

fn default_request_seconds() -> u64 {
    10
}

fn default_initialized_seconds() -> u64 {
    5
}

fn default_breakpoint_seconds() -> u64 {
    5
}

fn default_startup_grace_millis() -> u64 {
    100
}

fn default_shutdown_grace_seconds() -> u64 {
    2
}

fn default_disconnect_millis() -> u64 {
    500
}

/// External test runner invocation.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "snake_case")]
pub struct TestRunnerConfig {
    /// Runner executable. `None` selects the project's Python interpreter.
    pub command: Option<String>,
    /// Arguments placed before the caller's own arguments.
    pub args: Vec<String>,
    /// Flag that receives the report path as `<flag>=<path>`.
    pub report_flag: String,
    /// Bound on a whole test run.
    pub timeout_seconds: u64,
}

impl Default for TestRunnerConfig {
    fn default() -> Self {
        Self {
            command: None,
            args: vec![
                "-m".into(),
                "pytest".into(),
                "-q".into(),
                "--maxfail=1".into(),
                "--json-report".into(),
            ],
            report_flag: "--json-report-file".into(),
            timeout_seconds: 600,
        }
    }
}

fn default_project_root() -> PathBuf {
    PathBuf::from(".")
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Root that relative programs, sources and file reads resolve against.
    #[serde(default = "default_project_root")]
    pub project_root: PathBuf,
    /// Debug adapter settings.
    #[serde(default)]
    pub adapter: AdapterConfig,
    /// Wait and lifecycle bounds.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    /// Test runner settings.
    #[serde(default)]
    pub tests: TestRunnerConfig,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            project_root: default_project_root(),
            adapter: AdapterConfig::default(),
            timeouts: TimeoutConfig::default(),
            tests: TestRunnerConfig::default(),
        }
    }
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and normalize paths.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Replace the project root, canonicalizing the override.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the path does not exist.
    pub fn override_project_root(&mut self, root: &Path) -> Result<()> {
        self.project_root = root
            .canonicalize()
            .map_err(|err| AppError::Config(format!("invalid project root override: {err}")))?;
        Ok(())
    }

    /// Absolute project root.
    #[must_use]
    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    fn validate(&mut self) -> Result<()> {
        if self.timeouts.request_seconds == 0 {
            return Err(AppError::Config(
                "timeouts.request_seconds must be greater than zero".into(),
            ));
        }

        if self.timeouts.initialized_seconds == 0 {
            return Err(AppError::Config(
                "timeouts.initialized_seconds must be greater than zero".into(),
            ));
        }

        if self.adapter.command.is_none() && self.adapter.args.is_empty() {
            return Err(AppError::Config(
                "adapter.args must not be empty when adapter.command is unset".into(),
            ));
        }

        if self.tests.report_flag.trim().is_empty() {
            return Err(AppError::Config("tests.report_flag must not be empty".into()));
        }

        let canonical_root = self
            .project_root
            .canonicalize()
            .map_err(|err| AppError::Config(format!("project_root invalid: {err}")))?;
        self.project_root = canonical_root;

        Ok(())
    }
}
