use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::StackwatchError;
use crate::state::AppState;

const DEFAULT_LINES: usize = 100;
const MAX_LINES: usize = 5000;

#[derive(Debug, Deserialize, Default, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LogsQuery {
    /// Number of trailing lines (default 100, capped at 5000)
    #[param(required = false)]
    lines: Option<usize>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LogsResponse {
    pub logs: String,
}

/// Tail of a container's combined stdout/stderr.
#[utoipa::path(
    get,
    path = "/api/containers/{container_id}/logs",
    params(
        ("container_id" = String, Path, description = "Container ID or name"),
        LogsQuery
    ),
    responses(
        (status = 200, body = LogsResponse),
        (status = 404, description = "No such container")
    ),
    tag = "Containers"
)]
pub async fn container_logs_handler(
    State(app): State<Arc<AppState>>,
    Path(container_id): Path<String>,
    Query(q): Query<LogsQuery>,
) -> Result<Json<LogsResponse>, StackwatchError> {
    let lines = q.lines.unwrap_or(DEFAULT_LINES).min(MAX_LINES);
    tracing::debug!(container = %container_id, lines, "fetching container logs");

    let logs = app.control.logs(&container_id, lines).await?;
    Ok(Json(LogsResponse { logs }))
}
