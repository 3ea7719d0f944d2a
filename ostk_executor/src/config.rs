//! Executor configuration.
//!
//! Loaded from TOML; every field has a default so an empty or missing file is
//! valid. Durations are stored in milliseconds and exposed as [`Duration`].
//!
//! ```toml
//! [executor]
//! log_retention = 30
//! termination_grace_ms = 2000
//!
//! [remote_cancel]
//! endpoint = "https://trino.opensky-network.org/v1/query/"
//! user = "pyopensky"
//! token_env = "OSTK_TRINO_TOKEN"
//! ```

use crate::constants::*;
use anyhow::{Context, Result, bail};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutorConfig {
    pub executor: TaskSettings,
    pub remote_cancel: RemoteCancelConfig,
}

/// Per-task behaviour of the executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TaskSettings {
    /// Number of log lines returned by `poll`.
    pub log_retention: usize,
    /// Progress text longer than this is truncated.
    pub status_max_chars: usize,
    pub termination_grace_ms: u64,
    /// After the child exits, how long to wait for its pipes before declaring it dead.
    pub exit_drain_grace_ms: u64,
    /// Interval used by the CLI poll loop.
    pub poll_interval_ms: u64,
}

impl Default for TaskSettings {
    fn default() -> Self {
        Self {
            log_retention: DEFAULT_LOG_RETENTION,
            status_max_chars: DEFAULT_STATUS_MAX_CHARS,
            termination_grace_ms: DEFAULT_TERMINATION_GRACE.as_millis() as u64,
            exit_drain_grace_ms: DEFAULT_EXIT_DRAIN_GRACE.as_millis() as u64,
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
        }
    }
}

impl TaskSettings {
    pub fn termination_grace(&self) -> Duration {
        Duration::from_millis(self.termination_grace_ms)
    }

    pub fn exit_drain_grace(&self) -> Duration {
        Duration::from_millis(self.exit_drain_grace_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Settings for cancelling the remote query over HTTP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RemoteCancelConfig {
    pub enabled: bool,
    /// Base URL; the query id is appended as the last path segment.
    pub endpoint: String,
    /// Value of the `X-Trino-User` header.
    pub user: String,
    pub timeout_ms: u64,
    /// Environment variable holding the bearer token.
    pub token_env: String,
}

impl Default for RemoteCancelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: DEFAULT_REMOTE_CANCEL_ENDPOINT.to_string(),
            user: DEFAULT_REMOTE_USER.to_string(),
            timeout_ms: DEFAULT_REMOTE_CANCEL_TIMEOUT.as_millis() as u64,
            token_env: DEFAULT_TOKEN_ENV.to_string(),
        }
    }
}

impl RemoteCancelConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl ExecutorConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: ExecutorConfig =
            toml::from_str(contents).context("Failed to parse executor config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.executor.log_retention == 0 {
            bail!("executor.log_retention must be at least 1");
        }
        if self.executor.status_max_chars == 0 {
            bail!("executor.status_max_chars must be at least 1");
        }
        Url::parse(&self.remote_cancel.endpoint).with_context(|| {
            format!(
                "remote_cancel.endpoint is not a valid URL: {}",
                self.remote_cancel.endpoint
            )
        })?;
        Ok(())
    }
}

/// Location of the per-user config file, if the platform has one.
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("org", "OpenSky", "ostk_executor")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

/// Load configuration.
///
/// An explicit path must exist. Without one, the per-user config file is used
/// when present; otherwise defaults apply.
pub async fn load_config(explicit: Option<&Path>) -> Result<ExecutorConfig> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match default_config_path() {
            Some(path) if tokio::fs::try_exists(&path).await.unwrap_or(false) => path,
            _ => return Ok(ExecutorConfig::default()),
        },
    };

    let contents = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config = ExecutorConfig::from_toml_str(&contents)
        .with_context(|| format!("Invalid config file {}", path.display()))?;
    tracing::debug!("Loaded executor config from {}", path.display());
    Ok(config)
}
