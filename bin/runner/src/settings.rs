//! Runner configuration.
//!
//! Loaded via the `config` crate from an optional file, then environment
//! variables prefixed `NODEFLOW_` (nested keys use `__`, e.g.
//! `NODEFLOW_HTTP__TIMEOUT_SECS`).

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use nodeflow_executors::HttpRequestConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level runner configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RunnerConfig {
    /// Directory holding `<workflow-id>.json` definitions.
    #[serde(default = "default_workflows_dir")]
    pub workflows_dir: PathBuf,

    /// Overall deadline per run, in seconds. Unbounded when unset.
    #[serde(default)]
    pub run_timeout_secs: Option<u64>,

    #[serde(default)]
    pub http: HttpSettings,

    #[serde(default)]
    pub secrets: SecretsSettings,
}

/// Outbound HTTP defaults for the `http-request` executor.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpSettings {
    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Where tenant secrets come from.
#[derive(Debug, Clone, Deserialize)]
pub struct SecretsSettings {
    /// Environment variables with this prefix become secrets, keyed by the
    /// rest of the name.
    #[serde(default = "default_secret_prefix")]
    pub env_prefix: String,
}

fn default_workflows_dir() -> PathBuf {
    PathBuf::from("./workflows")
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    HttpRequestConfig::default().user_agent
}

fn default_secret_prefix() -> String {
    "NODEFLOW_SECRET_".to_string()
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_http_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for SecretsSettings {
    fn default() -> Self {
        Self {
            env_prefix: default_secret_prefix(),
        }
    }
}

impl HttpSettings {
    /// Converts to the executor's configuration.
    #[must_use]
    pub fn executor_config(&self) -> HttpRequestConfig {
        HttpRequestConfig::default()
            .with_timeout(Duration::from_secs(self.timeout_secs))
            .with_user_agent(&self.user_agent)
    }
}

impl RunnerConfig {
    /// Loads configuration from `file` (if given) and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or a value is invalid.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(File::from(path));
        }
        Self::from_builder(
            builder.add_source(
                Environment::with_prefix("NODEFLOW")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            ),
        )
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        builder.build()?.try_deserialize()
    }

    /// The per-run deadline.
    #[must_use]
    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_secs.map(Duration::from_secs)
    }
}
