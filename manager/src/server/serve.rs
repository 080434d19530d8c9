//! HTTP server setup

use std::future::Future;
use std::sync::Arc;

use axum::{
    routing::{delete, get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::app::options::ServerOptions;
use crate::errors::RuntimeError;
use crate::server::handlers::{
    build_handler, build_log_handler, build_status_handler, build_stop_handler,
    config_maps_handler, container_command_handler, container_delete_handler,
    deployment_delete_handler, deployment_rollout_handler, deployments_handler,
    health_handler, image_delete_handler, images_handler, log_watch_handler, secrets_handler,
    status_env_handler, status_handler, status_project_handler, status_watch_handler,
    version_handler,
};
use crate::server::state::ServerState;

/// Routes of the HTTP interface
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        // Health and version
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        // Container commands
        .route(
            "/api/container/{project_id}/{container_type}/{name}",
            post(container_command_handler).delete(container_delete_handler),
        )
        // Status
        .route("/api/status", get(status_handler))
        .route("/api/status/env/{env}", get(status_env_handler))
        .route(
            "/api/status/project/{project_id}/{env}",
            get(status_project_handler),
        )
        .route("/api/status/watch", get(status_watch_handler))
        // Logs
        .route(
            "/api/logwatch/{container_type}/{name}",
            get(log_watch_handler),
        )
        // Engine images
        .route("/api/images", get(images_handler).delete(image_delete_handler))
        // Cluster resources
        .route("/api/infrastructure/deployments", get(deployments_handler))
        .route(
            "/api/infrastructure/deployments/{namespace}/{name}/rollout",
            post(deployment_rollout_handler),
        )
        .route(
            "/api/infrastructure/deployments/{namespace}/{name}",
            delete(deployment_delete_handler),
        )
        .route("/api/infrastructure/configmaps", get(config_maps_handler))
        .route("/api/infrastructure/secrets", get(secrets_handler))
        // Builds
        .route("/api/build", post(build_handler))
        .route(
            "/api/build/{name}",
            get(build_status_handler).delete(build_stop_handler),
        )
        .route("/api/build/{name}/log", get(build_log_handler))
        // State and middleware
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Start the HTTP server
pub async fn serve(
    options: &ServerOptions,
    state: Arc<ServerState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<Result<(), RuntimeError>>, RuntimeError> {
    let app = router(state);

    let addr = format!("{}:{}", options.host, options.port);
    info!("Starting HTTP server on {}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| RuntimeError::ServerError(e.to_string()))?;

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| RuntimeError::ServerError(e.to_string()))
    });

    Ok(handle)
}
