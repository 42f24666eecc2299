//! Configuration loading and types.
//!
//! Configuration is read from a YAML file and deserialized into the
//! [`Config`] struct.  Every section is optional; missing sections and keys
//! fall back to the defaults below.

use serde::Deserialize;
use std::path::Path;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Transfer engine settings.
    #[serde(default)]
    pub transfer: TransferConfig,

    /// Resource URI settings.
    #[serde(default)]
    pub uri: UriConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Observability settings.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// How azcopy is launched.
#[derive(Debug, Clone, Deserialize)]
pub struct TransferConfig {
    /// Path to the azcopy executable (looked up on `PATH` if bare).
    #[serde(default = "default_azcopy_path")]
    pub azcopy_path: String,

    /// Value for `AZCOPY_CONCURRENCY_VALUE`; unset lets azcopy decide.
    #[serde(default)]
    pub concurrency: Option<u32>,

    /// Value for azcopy's `--log-level`.
    #[serde(default = "default_engine_log_level")]
    pub log_level: String,

    /// Value for `AZCOPY_LOG_LOCATION`.
    #[serde(default)]
    pub log_location: Option<String>,

    /// Value for `AZCOPY_JOB_PLAN_LOCATION`.
    #[serde(default)]
    pub job_plan_location: Option<String>,

    /// Seconds to wait after a cancel request before killing the engine.
    #[serde(default = "default_cancel_grace_seconds")]
    pub cancel_grace_seconds: u64,

    /// Capacity of the per-job event channel.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            azcopy_path: default_azcopy_path(),
            concurrency: None,
            log_level: default_engine_log_level(),
            log_location: None,
            job_plan_location: None,
            cancel_grace_seconds: default_cancel_grace_seconds(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl TransferConfig {
    /// Environment variables to set on the azcopy child process.
    pub fn engine_env(&self) -> Vec<(String, String)> {
        let mut env = Vec::new();
        if let Some(c) = self.concurrency {
            env.push(("AZCOPY_CONCURRENCY_VALUE".to_string(), c.to_string()));
        }
        if let Some(loc) = &self.log_location {
            env.push(("AZCOPY_LOG_LOCATION".to_string(), loc.clone()));
        }
        if let Some(loc) = &self.job_plan_location {
            env.push(("AZCOPY_JOB_PLAN_LOCATION".to_string(), loc.clone()));
        }
        env
    }
}

/// Resource URI configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct UriConfig {
    /// Scheme for resource URIs.
    #[serde(default = "default_scheme")]
    pub scheme: String,
}

impl Default for UriConfig {
    fn default() -> Self {
        Self {
            scheme: default_scheme(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: text or json.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Observability settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// Record Prometheus metrics for transfer jobs.
    #[serde(default = "default_true")]
    pub metrics: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self { metrics: true }
    }
}

// -- Defaults ----------------------------------------------------------------

fn default_true() -> bool {
    true
}

fn default_azcopy_path() -> String {
    "azcopy".to_string()
}

fn default_engine_log_level() -> String {
    "INFO".to_string()
}

fn default_cancel_grace_seconds() -> u64 {
    30
}

fn default_event_buffer() -> usize {
    64
}

fn default_scheme() -> String {
    crate::uri::DEFAULT_SCHEME.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

// -- Loader ------------------------------------------------------------------

/// Load and parse configuration from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    let config: Config = serde_yaml::from_str(&contents)?;
    Ok(config)
}
