//! Application state management

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::app::options::AppOptions;
use crate::cache::events::EventBus;
use crate::cache::status::StatusStore;
use crate::deploy::cluster::ClusterExecutor;
use crate::deploy::dispatcher::CommandDispatcher;
use crate::deploy::engine::EngineExecutor;
use crate::deploy::RuntimeBackend;
use crate::errors::RuntimeError;
use crate::filesys::dir::Dir;
use crate::probe::{self, BackendKind};
use crate::sessions::manager::LogSessionManager;
use crate::storage::projects::{FileProjectStore, ProjectStore};

/// Components shared by the server and the workers
pub struct AppState {
    pub environment: String,

    pub store: Arc<StatusStore>,

    /// Active backend, chosen once at startup
    pub backend: Arc<dyn RuntimeBackend>,

    /// Set when the engine is the active backend
    pub engine: Option<Arc<EngineExecutor>>,

    /// Set when the cluster is the active backend
    pub cluster: Option<Arc<ClusterExecutor>>,

    pub projects: Arc<dyn ProjectStore>,

    pub dispatcher: Arc<CommandDispatcher>,

    pub sessions: Arc<LogSessionManager>,

    /// Cancelled when long-lived responses must end
    pub closing: CancellationToken,
}

impl AppState {
    /// Connect to the backend the probe selects and build every component
    pub async fn init(options: &AppOptions, log_runtime: Handle) -> Result<Self, RuntimeError> {
        info!("Initializing application state...");

        let projects_dir = Dir::new(&options.projects_dir);
        projects_dir.create().await?;
        let project_store = FileProjectStore::new(projects_dir);
        info!(
            "Project store at {} with {} project(s)",
            options.projects_dir.display(),
            project_store.project_ids().await?.len()
        );
        let projects: Arc<dyn ProjectStore> = Arc::new(project_store);

        let state = match probe::backend_kind() {
            BackendKind::Cluster => {
                let cluster = Arc::new(ClusterExecutor::connect(options.cluster.clone()).await?);
                let mut state = Self::with_backend(
                    cluster.clone(),
                    projects,
                    &options.environment,
                    log_runtime,
                );
                state.cluster = Some(cluster);
                state
            }
            BackendKind::Engine => {
                let engine = Arc::new(EngineExecutor::connect(options.engine.clone()).await?);
                let mut state = Self::with_backend(
                    engine.clone(),
                    projects,
                    &options.environment,
                    log_runtime,
                );
                state.engine = Some(engine);
                state
            }
        };

        info!("Managing containers on the {} backend", state.backend.kind());
        Ok(state)
    }

    /// Build the state around an already connected backend
    pub fn with_backend(
        backend: Arc<dyn RuntimeBackend>,
        projects: Arc<dyn ProjectStore>,
        environment: &str,
        log_runtime: Handle,
    ) -> Self {
        let store = Arc::new(StatusStore::new(EventBus::default()));
        let dispatcher = Arc::new(CommandDispatcher::new(
            backend.clone(),
            store.clone(),
            projects.clone(),
            environment,
        ));
        let sessions = Arc::new(LogSessionManager::new(backend.clone(), log_runtime));

        Self {
            environment: environment.to_string(),
            store,
            backend,
            engine: None,
            cluster: None,
            projects,
            dispatcher,
            sessions,
            closing: CancellationToken::new(),
        }
    }

    /// End streaming responses (status watches and log sessions)
    pub fn close_streams(&self) {
        self.closing.cancel();
        self.sessions.shutdown();
    }

    /// Close every stream and drop all status records
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        info!("Shutting down application state...");
        self.close_streams();
        self.store.shutdown();
        Ok(())
    }
}
