//! Error types for the runtime manager

use thiserror::Error;

/// Main error type for the runtime manager
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Engine error: {0}")]
    EngineError(#[from] bollard::errors::Error),

    #[error("Cluster error: {0}")]
    ClusterError(#[from] kube::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Error while executing command {action} on {target}: {cause}")]
    CommandError {
        action: String,
        target: String,
        cause: String,
    },

    #[error("Stream error: {0}")]
    StreamError(String),

    #[error("Not supported by the {backend} backend: {operation}")]
    Unsupported {
        backend: &'static str,
        operation: String,
    },

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl RuntimeError {
    /// Wrap a backend failure into the message reported to the caller.
    pub fn command(action: impl ToString, target: impl Into<String>, err: &RuntimeError) -> Self {
        RuntimeError::CommandError {
            action: action.to_string(),
            target: target.into(),
            cause: root_cause(err),
        }
    }
}

/// Message of the innermost error in the source chain.
pub fn root_cause(err: &(dyn std::error::Error + 'static)) -> String {
    let mut current = err;
    while let Some(source) = current.source() {
        current = source;
    }
    current.to_string()
}
