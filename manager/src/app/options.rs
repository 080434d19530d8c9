//! Application configuration options

use std::path::PathBuf;
use std::time::Duration;

use crate::deploy::cluster::ClusterOptions;
use crate::deploy::engine::EngineOptions;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::Settings;
use crate::workers::reconciler;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    pub lifecycle: LifecycleOptions,

    /// Environment status records are filed under
    pub environment: String,

    /// Root of the file-backed project store
    pub projects_dir: PathBuf,

    pub server: ServerOptions,

    /// Enable the reconciler worker
    pub enable_reconciler: bool,

    pub reconciler: reconciler::Options,

    pub engine: EngineOptions,

    pub cluster: ClusterOptions,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            environment: "dev".to_string(),
            projects_dir: StorageLayout::default().projects_dir().path().to_path_buf(),
            server: ServerOptions::default(),
            enable_reconciler: true,
            reconciler: reconciler::Options::default(),
            engine: EngineOptions::default(),
            cluster: ClusterOptions::default(),
        }
    }
}

impl AppOptions {
    pub fn from_settings(settings: &Settings, layout: &StorageLayout) -> Self {
        let projects_dir = settings
            .projects_dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| layout.projects_dir().path().to_path_buf());

        let engine_defaults = EngineOptions::default();
        Self {
            lifecycle: LifecycleOptions::default(),
            environment: settings.environment.clone(),
            projects_dir,
            server: ServerOptions {
                host: settings.server.host.clone(),
                port: settings.server.port,
            },
            enable_reconciler: settings.enable_reconciler,
            reconciler: reconciler::Options {
                interval: Duration::from_secs(settings.reconcile_interval_secs.max(1)),
                environment: settings.environment.clone(),
                ..Default::default()
            },
            engine: EngineOptions {
                network: settings.engine.network.clone(),
                stop_timeout_secs: settings
                    .engine
                    .stop_timeout_secs
                    .unwrap_or(engine_defaults.stop_timeout_secs),
            },
            cluster: ClusterOptions {
                default_namespace: settings.cluster.default_namespace.clone(),
                build_pipeline: settings.cluster.build_pipeline.clone(),
                environment: settings.environment.clone(),
            },
        }
    }
}

/// Lifecycle options
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub host: String,
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}
