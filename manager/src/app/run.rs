//! Main application run loop

use std::future::Future;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::app::options::{AppOptions, LifecycleOptions};
use crate::app::state::AppState;
use crate::errors::RuntimeError;
use crate::server::serve::serve;
use crate::server::state::ServerState;
use crate::workers::reconciler;

/// Run the runtime manager until the shutdown signal fires
pub async fn run(
    options: AppOptions,
    log_runtime: Handle,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), RuntimeError> {
    info!("Initializing runtime manager...");

    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);
    let mut shutdown_manager = ShutdownManager::new(shutdown_tx.clone(), options.lifecycle.clone());

    if let Err(e) = init(&options, log_runtime, shutdown_tx.clone(), &mut shutdown_manager).await {
        error!("Failed to start runtime manager: {}", e);
        shutdown_manager.shutdown().await?;
        return Err(e);
    }

    shutdown_signal.await;
    info!("Shutdown signal received, shutting down...");

    drop(shutdown_tx);
    shutdown_manager.shutdown().await
}

// =============================== INITIALIZATION ================================== //

async fn init(
    options: &AppOptions,
    log_runtime: Handle,
    shutdown_tx: broadcast::Sender<()>,
    shutdown_manager: &mut ShutdownManager,
) -> Result<(), RuntimeError> {
    let app_state = Arc::new(AppState::init(options, log_runtime).await?);
    shutdown_manager.with_app_state(app_state.clone())?;

    if options.enable_reconciler {
        init_reconciler_worker(
            options.reconciler.clone(),
            app_state.clone(),
            shutdown_manager,
            shutdown_tx.subscribe(),
        )?;
    }

    init_http_server(options, app_state, shutdown_manager, shutdown_tx.subscribe()).await
}

fn init_reconciler_worker(
    options: reconciler::Options,
    app_state: Arc<AppState>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), RuntimeError> {
    info!("Initializing reconciler worker...");

    let handle = tokio::spawn(async move {
        reconciler::run(
            &options,
            app_state.backend.as_ref(),
            app_state.store.as_ref(),
            tokio::time::sleep,
            Box::pin(async move {
                let _ = shutdown_rx.recv().await;
            }),
        )
        .await;
    });

    shutdown_manager.with_reconciler_handle(handle)
}

async fn init_http_server(
    options: &AppOptions,
    app_state: Arc<AppState>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), RuntimeError> {
    info!("Initializing HTTP server...");

    let server_state = ServerState::from_app(&app_state);
    let handle = serve(&options.server, Arc::new(server_state), async move {
        let _ = shutdown_rx.recv().await;
    })
    .await?;

    shutdown_manager.with_server_handle(handle)
}

// ================================= SHUTDOWN ===================================== //

struct ShutdownManager {
    shutdown_tx: broadcast::Sender<()>,
    lifecycle_options: LifecycleOptions,
    app_state: Option<Arc<AppState>>,
    server_handle: Option<JoinHandle<Result<(), RuntimeError>>>,
    reconciler_handle: Option<JoinHandle<()>>,
}

impl ShutdownManager {
    fn new(shutdown_tx: broadcast::Sender<()>, lifecycle_options: LifecycleOptions) -> Self {
        Self {
            shutdown_tx,
            lifecycle_options,
            app_state: None,
            server_handle: None,
            reconciler_handle: None,
        }
    }

    fn with_app_state(&mut self, state: Arc<AppState>) -> Result<(), RuntimeError> {
        if self.app_state.is_some() {
            return Err(RuntimeError::ShutdownError("app_state already set".to_string()));
        }
        self.app_state = Some(state);
        Ok(())
    }

    fn with_reconciler_handle(&mut self, handle: JoinHandle<()>) -> Result<(), RuntimeError> {
        if self.reconciler_handle.is_some() {
            return Err(RuntimeError::ShutdownError("reconciler_handle already set".to_string()));
        }
        self.reconciler_handle = Some(handle);
        Ok(())
    }

    fn with_server_handle(
        &mut self,
        handle: JoinHandle<Result<(), RuntimeError>>,
    ) -> Result<(), RuntimeError> {
        if self.server_handle.is_some() {
            return Err(RuntimeError::ShutdownError("server_handle already set".to_string()));
        }
        self.server_handle = Some(handle);
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), RuntimeError> {
        let _ = self.shutdown_tx.send(());

        match tokio::time::timeout(
            self.lifecycle_options.max_shutdown_delay,
            self.shutdown_impl(),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                error!(
                    "Shutdown timed out after {:?}, forcing shutdown...",
                    self.lifecycle_options.max_shutdown_delay
                );
                std::process::exit(1);
            }
        }
    }

    async fn shutdown_impl(&mut self) -> Result<(), RuntimeError> {
        info!("Shutting down runtime manager...");

        // 1. Streaming responses, so the server can drain
        if let Some(app_state) = &self.app_state {
            app_state.close_streams();
        }

        // 2. Reconciler
        if let Some(handle) = self.reconciler_handle.take() {
            handle
                .await
                .map_err(|e| RuntimeError::ShutdownError(e.to_string()))?;
        }

        // 3. HTTP server
        if let Some(handle) = self.server_handle.take() {
            handle
                .await
                .map_err(|e| RuntimeError::ShutdownError(e.to_string()))??;
        }

        // 4. App state
        if let Some(app_state) = self.app_state.take() {
            app_state.shutdown().await?;
        }

        info!("Shutdown complete");
        Ok(())
    }
}
