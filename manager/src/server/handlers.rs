//! HTTP request handlers

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures::{stream, Stream, StreamExt};
use openapi_server::models::{
    BuildRequest, CommandRequest, DeploymentListQuery, HealthResponse, ImageDeleteQuery,
    ImageListQuery, ResourceNamesResponse, VersionResponse,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::cache::events::StatusEvent;
use crate::deploy::dispatcher::DispatchOutcome;
use crate::errors::RuntimeError;
use crate::models::command::{CommandEnvelope, ContainerCommand, PullPolicy};
use crate::models::status::{ContainerType, StatusFilter};
use crate::server::state::ServerState;
use crate::sessions::sink::{LogSink, DEFAULT_SINK_BUFFER};
use crate::utils::version_info;

/// Header carrying the identity of the viewer
pub const VIEWER_HEADER: &str = "x-username";
pub const ANONYMOUS_VIEWER: &str = "anonymous";

/// Status code and plain-text body for an error
fn error_response(err: RuntimeError) -> Response {
    let status = match &err {
        RuntimeError::ValidationError(_) => StatusCode::BAD_REQUEST,
        RuntimeError::NotFound(_) => StatusCode::NOT_FOUND,
        RuntimeError::Unsupported { .. } => StatusCode::NOT_IMPLEMENTED,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string()).into_response()
}

pub async fn health_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "runtime-manager".to_string(),
        version: version.version,
        backend: state.backend_kind.to_string(),
    })
}

pub async fn version_handler() -> impl IntoResponse {
    let version = version_info();
    Json(VersionResponse {
        version: version.version,
        git_hash: version.git_hash,
        build_time: version.build_time,
    })
}

// ================================ CONTAINERS ===================================== //

/// Parse the path and body of a command request
pub fn command_envelope(
    project_id: &str,
    container_type: &str,
    name: &str,
    command: &str,
    pull_image: Option<&str>,
) -> Result<CommandEnvelope, String> {
    let target_type: ContainerType = container_type.parse()?;
    let action: ContainerCommand = command.parse()?;
    let pull_policy = match pull_image {
        Some(value) => value.parse::<PullPolicy>()?,
        None => PullPolicy::default(),
    };
    Ok(CommandEnvelope::new(project_id, target_type, name, action).with_pull_policy(pull_policy))
}

pub async fn container_command_handler(
    State(state): State<Arc<ServerState>>,
    Path((project_id, container_type, name)): Path<(String, String, String)>,
    Json(request): Json<CommandRequest>,
) -> Response {
    let envelope = match command_envelope(
        &project_id,
        &container_type,
        &name,
        &request.command,
        request.pull_image.as_deref(),
    ) {
        Ok(envelope) => envelope,
        Err(e) => {
            debug!("Rejected command for {}: {}", name, e);
            return StatusCode::NOT_MODIFIED.into_response();
        }
    };

    match state.dispatcher.dispatch(envelope).await {
        Ok(DispatchOutcome::Applied(status)) => Json(status).into_response(),
        Ok(DispatchOutcome::Skipped) => StatusCode::OK.into_response(),
        Ok(DispatchOutcome::NotModified) => StatusCode::NOT_MODIFIED.into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

pub async fn container_delete_handler(
    State(state): State<Arc<ServerState>>,
    Path((project_id, container_type, name)): Path<(String, String, String)>,
) -> StatusCode {
    let Ok(target_type) = container_type.parse::<ContainerType>() else {
        return StatusCode::NOT_MODIFIED;
    };
    let envelope = CommandEnvelope::new(project_id, target_type, name, ContainerCommand::Delete);

    match state.dispatcher.dispatch(envelope).await {
        Ok(DispatchOutcome::Applied(_)) | Ok(DispatchOutcome::Skipped) => StatusCode::ACCEPTED,
        Ok(DispatchOutcome::NotModified) | Err(_) => StatusCode::NOT_MODIFIED,
    }
}

// ================================== STATUS ======================================= //

pub async fn status_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    Json(state.store.list(&StatusFilter::default()))
}

pub async fn status_env_handler(
    State(state): State<Arc<ServerState>>,
    Path(env): Path<String>,
) -> impl IntoResponse {
    Json(state.store.list(&StatusFilter {
        env: Some(env),
        ..StatusFilter::default()
    }))
}

pub async fn status_project_handler(
    State(state): State<Arc<ServerState>>,
    Path((project_id, env)): Path<(String, String)>,
) -> impl IntoResponse {
    Json(state.store.list(&StatusFilter {
        project_id: Some(project_id),
        env: Some(env),
        ..StatusFilter::default()
    }))
}

fn status_event(event: &StatusEvent) -> Event {
    let name = match event {
        StatusEvent::Changed(_) => "changed",
        StatusEvent::Removed(_) => "removed",
    };
    match Event::default().event(name).json_data(event.status()) {
        Ok(event) => event,
        Err(e) => {
            warn!("Unable to encode status event: {}", e);
            Event::default().comment("encoding error")
        }
    }
}

/// Server-sent events for every status change
pub async fn status_watch_handler(
    State(state): State<Arc<ServerState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.store.subscribe();
    let events = stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => return Some((event, rx)),
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Status watcher lagged, {} events skipped", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    })
    .map(|event| Ok(status_event(&event)))
    .take_until(state.closing.clone().cancelled_owned());

    Sse::new(events).keep_alive(KeepAlive::default())
}

// =================================== LOGS ======================================== //

pub fn viewer_identity(headers: &HeaderMap) -> String {
    headers
        .get(VIEWER_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(ANONYMOUS_VIEWER)
        .to_string()
}

/// Server-sent events, one per log line of a container
pub async fn log_watch_handler(
    State(state): State<Arc<ServerState>>,
    Path((container_type, name)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    let target_type = match container_type.parse::<ContainerType>() {
        Ok(target_type) => target_type,
        Err(e) => return (StatusCode::BAD_REQUEST, e).into_response(),
    };
    let viewer = viewer_identity(&headers);

    let (sink, rx) = LogSink::channel(DEFAULT_SINK_BUFFER);
    state.sessions.stream_log(target_type, &name, &viewer, sink);

    let lines = stream::unfold(rx, |mut rx| async move {
        let line = rx.recv().await?;
        // SSE data fields cannot carry carriage returns
        let event = Event::default().data(line.replace('\r', ""));
        Some((Ok::<_, Infallible>(event), rx))
    });

    Sse::new(lines).keep_alive(KeepAlive::default()).into_response()
}

// ================================== IMAGES ======================================= //

pub async fn images_handler(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<ImageListQuery>,
) -> Response {
    let engine = match state.engine("list images") {
        Ok(engine) => engine,
        Err(e) => return error_response(e),
    };
    match engine.list_images(query.prefix.as_deref().unwrap_or("")).await {
        Ok(images) => Json(images).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn image_delete_handler(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<ImageDeleteQuery>,
) -> Response {
    let engine = match state.engine("delete image") {
        Ok(engine) => engine,
        Err(e) => return error_response(e),
    };
    match engine.delete_image(&query.name).await {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(e) => error_response(e),
    }
}

// =============================== INFRASTRUCTURE ================================== //

pub async fn deployments_handler(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<DeploymentListQuery>,
) -> Response {
    let cluster = match state.cluster("list deployments") {
        Ok(cluster) => cluster,
        Err(e) => return error_response(e),
    };
    match cluster.list_deployments(query.env.as_deref()).await {
        Ok(deployments) => Json(deployments).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn deployment_rollout_handler(
    State(state): State<Arc<ServerState>>,
    Path((namespace, name)): Path<(String, String)>,
) -> Response {
    let cluster = match state.cluster("rollout deployment") {
        Ok(cluster) => cluster,
        Err(e) => return error_response(e),
    };
    match cluster.rollout_deployment(&name, &namespace).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn deployment_delete_handler(
    State(state): State<Arc<ServerState>>,
    Path((namespace, name)): Path<(String, String)>,
) -> Response {
    let cluster = match state.cluster("delete deployment") {
        Ok(cluster) => cluster,
        Err(e) => return error_response(e),
    };
    match cluster.delete_deployment(&name, &namespace).await {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn config_maps_handler(State(state): State<Arc<ServerState>>) -> Response {
    let cluster = match state.cluster("list config maps") {
        Ok(cluster) => cluster,
        Err(e) => return error_response(e),
    };
    match cluster.list_config_maps().await {
        Ok(names) => Json(ResourceNamesResponse {
            namespace: cluster.namespace().to_string(),
            names,
        })
        .into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn secrets_handler(State(state): State<Arc<ServerState>>) -> Response {
    let cluster = match state.cluster("list secrets") {
        Ok(cluster) => cluster,
        Err(e) => return error_response(e),
    };
    match cluster.list_secrets().await {
        Ok(names) => Json(ResourceNamesResponse {
            namespace: cluster.namespace().to_string(),
            names,
        })
        .into_response(),
        Err(e) => error_response(e),
    }
}

// ================================== BUILDS ======================================= //

pub async fn build_handler(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<BuildRequest>,
) -> Response {
    let cluster = match state.cluster("build project") {
        Ok(cluster) => cluster,
        Err(e) => return error_response(e),
    };
    let project = match state.projects.project(&request.project_id).await {
        Ok(Some(project)) => project,
        Ok(None) => {
            return error_response(RuntimeError::NotFound(format!(
                "Project {}",
                request.project_id
            )))
        }
        Err(e) => return error_response(e),
    };
    match cluster.create_pipeline_run(&project).await {
        Ok(run) => Json(run).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn build_status_handler(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
) -> Response {
    let cluster = match state.cluster("get build") {
        Ok(cluster) => cluster,
        Err(e) => return error_response(e),
    };
    match cluster.get_pipeline_run(&name, cluster.namespace()).await {
        Ok(run) => Json(run).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn build_log_handler(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
) -> Response {
    let cluster = match state.cluster("get build log") {
        Ok(cluster) => cluster,
        Err(e) => return error_response(e),
    };
    match cluster.get_pipeline_log(&name, cluster.namespace()).await {
        Ok(log) => log.into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn build_stop_handler(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
) -> Response {
    let cluster = match state.cluster("stop build") {
        Ok(cluster) => cluster,
        Err(e) => return error_response(e),
    };
    match cluster.stop_pipeline_run(&name, cluster.namespace()).await {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(e) => error_response(e),
    }
}
