//! Settings file

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::RuntimeError;
use crate::logs::LogLevel;

/// Runtime manager settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit logs as JSON lines
    #[serde(default)]
    pub log_json: bool,

    /// Directory for daily rolling log files; stdout only when absent
    #[serde(default)]
    pub log_dir: Option<String>,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerSettings,

    /// Environment name status records are filed under
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Root of the project store; `<base_dir>/projects` when absent
    #[serde(default)]
    pub projects_dir: Option<String>,

    /// Reconciliation interval in seconds
    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval_secs: u64,

    /// Enable the reconciler worker
    #[serde(default = "default_true")]
    pub enable_reconciler: bool,

    /// Worker threads of the main runtime
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,

    /// Worker threads of the log streaming runtime
    #[serde(default = "default_log_worker_threads")]
    pub log_worker_threads: usize,

    /// Container engine configuration
    #[serde(default)]
    pub engine: EngineSettings,

    /// Cluster configuration
    #[serde(default)]
    pub cluster: ClusterSettings,
}

fn default_true() -> bool {
    true
}

fn default_environment() -> String {
    "dev".to_string()
}

fn default_reconcile_interval() -> u64 {
    2
}

fn default_worker_threads() -> usize {
    4
}

fn default_log_worker_threads() -> usize {
    2
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_json: false,
            log_dir: None,
            server: ServerSettings::default(),
            environment: default_environment(),
            projects_dir: None,
            reconcile_interval_secs: default_reconcile_interval(),
            enable_reconciler: true,
            worker_threads: default_worker_threads(),
            log_worker_threads: default_log_worker_threads(),
            engine: EngineSettings::default(),
            cluster: ClusterSettings::default(),
        }
    }
}

impl Settings {
    /// Read settings from a JSON file. A missing file yields the defaults.
    ///
    /// Blocking: runs before any runtime exists.
    pub fn load(path: &Path) -> Result<Settings, RuntimeError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No settings file at {}, using defaults", path.display());
                Ok(Settings::default())
            }
            Err(e) => Err(RuntimeError::ConfigError(format!(
                "Unable to read {}: {}",
                path.display(),
                e
            ))),
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Container engine settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Network containers are attached to
    #[serde(default)]
    pub network: Option<String>,

    /// Seconds to wait for a container to stop before killing it
    #[serde(default)]
    pub stop_timeout_secs: Option<i32>,
}

/// Cluster settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSettings {
    /// Namespace used when the service-account namespace is unreadable
    #[serde(default = "default_namespace")]
    pub default_namespace: String,

    /// Pipeline started for project builds
    #[serde(default = "default_build_pipeline")]
    pub build_pipeline: String,
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_build_pipeline() -> String {
    "camel-main".to_string()
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self {
            default_namespace: default_namespace(),
            build_pipeline: default_build_pipeline(),
        }
    }
}
