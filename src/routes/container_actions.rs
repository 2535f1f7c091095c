// src/routes/container_actions.rs
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::error::StackwatchError;
use crate::state::AppState;

/// Grace period before the runtime kills a container on stop/restart.
const DEFAULT_GRACE_SECS: u64 = 5;

#[derive(Debug, Deserialize, ToSchema)]
pub struct StopContainerRequest {
    pub t: Option<u64>,
    pub signal: Option<String>,
}

fn grace_and_signal(
    maybe_json: Option<Json<StopContainerRequest>>,
) -> (Option<u64>, Option<String>) {
    maybe_json
        .map(|Json(req)| (req.t, req.signal))
        .unwrap_or((Some(DEFAULT_GRACE_SECS), None))
}

fn report(
    action: &str,
    container_id: &str,
    result: Result<(), StackwatchError>,
) -> Result<StatusCode, StackwatchError> {
    match result {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        Err(e @ StackwatchError::ContainerNotFound(_)) => Err(e),
        Err(e) => {
            tracing::error!("failed to {action} container {container_id}: {e}");
            Err(e)
        }
    }
}

/// Start a stopped container. `container_id` can be the ID or name.
/// Returns 204 on success, 404 if the container isn't found.
#[utoipa::path(
    post,
    path = "/api/containers/{container_id}/start",
    params(("container_id" = String, Path, description = "Container ID or name")),
    responses(
        (status = 204, description = "Started"),
        (status = 404, description = "No such container")
    ),
    tag = "Containers"
)]
pub async fn start_container_handler(
    State(state): State<Arc<AppState>>,
    Path(container_id): Path<String>,
) -> Result<StatusCode, StackwatchError> {
    let result = state.control.start(&container_id).await;
    report("start", &container_id, result)
}

/// Stop a running container, waiting `t` seconds (default 5) before killing.
#[utoipa::path(
    post,
    path = "/api/containers/{container_id}/stop",
    params(("container_id" = String, Path, description = "Container ID or name")),
    request_body(content = StopContainerRequest, description = "Optional grace period and signal"),
    responses(
        (status = 204, description = "Stopped"),
        (status = 404, description = "No such container")
    ),
    tag = "Containers"
)]
pub async fn stop_container_handler(
    State(state): State<Arc<AppState>>,
    Path(container_id): Path<String>,
    maybe_json: Option<Json<StopContainerRequest>>,
) -> Result<StatusCode, StackwatchError> {
    let (t, signal) = grace_and_signal(maybe_json);
    let result = state.control.stop(&container_id, t, signal).await;
    report("stop", &container_id, result)
}

#[utoipa::path(
    post,
    path = "/api/containers/{container_id}/restart",
    params(("container_id" = String, Path, description = "Container ID or name")),
    request_body(content = StopContainerRequest, description = "Optional grace period and signal"),
    responses(
        (status = 204, description = "Restarted"),
        (status = 404, description = "No such container")
    ),
    tag = "Containers"
)]
pub async fn restart_container_handler(
    State(state): State<Arc<AppState>>,
    Path(container_id): Path<String>,
    maybe_json: Option<Json<StopContainerRequest>>,
) -> Result<StatusCode, StackwatchError> {
    let (t, signal) = grace_and_signal(maybe_json);
    let result = state.control.restart(&container_id, t, signal).await;
    report("restart", &container_id, result)
}
