//! Server state

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::app::state::AppState;
use crate::cache::status::StatusStore;
use crate::deploy::cluster::ClusterExecutor;
use crate::deploy::dispatcher::CommandDispatcher;
use crate::deploy::engine::EngineExecutor;
use crate::errors::RuntimeError;
use crate::probe::BackendKind;
use crate::sessions::manager::LogSessionManager;
use crate::storage::projects::ProjectStore;

/// Server state shared across handlers
pub struct ServerState {
    pub environment: String,
    pub backend_kind: BackendKind,
    pub store: Arc<StatusStore>,
    pub dispatcher: Arc<CommandDispatcher>,
    pub sessions: Arc<LogSessionManager>,
    pub projects: Arc<dyn ProjectStore>,
    pub engine: Option<Arc<EngineExecutor>>,
    pub cluster: Option<Arc<ClusterExecutor>>,
    pub closing: CancellationToken,
}

impl ServerState {
    pub fn from_app(app_state: &AppState) -> Self {
        Self {
            environment: app_state.environment.clone(),
            backend_kind: app_state.backend.kind(),
            store: app_state.store.clone(),
            dispatcher: app_state.dispatcher.clone(),
            sessions: app_state.sessions.clone(),
            projects: app_state.projects.clone(),
            engine: app_state.engine.clone(),
            cluster: app_state.cluster.clone(),
            closing: app_state.closing.clone(),
        }
    }

    /// The engine executor, or `Unsupported` on a cluster
    pub fn engine(&self, operation: &str) -> Result<&EngineExecutor, RuntimeError> {
        self.engine.as_deref().ok_or_else(|| RuntimeError::Unsupported {
            backend: self.backend_kind.as_str(),
            operation: operation.to_string(),
        })
    }

    /// The cluster executor, or `Unsupported` on the engine
    pub fn cluster(&self, operation: &str) -> Result<&ClusterExecutor, RuntimeError> {
        self.cluster.as_deref().ok_or_else(|| RuntimeError::Unsupported {
            backend: self.backend_kind.as_str(),
            operation: operation.to_string(),
        })
    }
}
