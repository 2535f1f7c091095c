use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::error::StackwatchError;
use crate::model::{StackDetail, StackSummary};
use crate::state::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct StackListResponse {
    pub stacks: Vec<StackSummary>,
    /// RFC 3339 time of the last successful refresh.
    pub refreshed_at: Option<String>,
    pub stale: bool,
}

/// All stacks with lightweight aggregated info.
///
/// Served from the snapshot the background refresher maintains; this call
/// never waits on the container runtime.
#[utoipa::path(
    get,
    path = "/api/v2/stacks",
    responses(
        (status = 200, body = StackListResponse)
    ),
    tag = "Stacks"
)]
pub async fn list_stacks_handler(State(app): State<Arc<AppState>>) -> Json<StackListResponse> {
    let snapshot = app.snapshot.summary_snapshot();
    Json(StackListResponse {
        stacks: snapshot.stacks,
        refreshed_at: snapshot.refreshed_at.map(|t| t.to_rfc3339()),
        stale: snapshot.stale,
    })
}

/// Per-container stats for one stack, rebuilt at most once per detail TTL.
#[utoipa::path(
    get,
    path = "/api/v2/stacks/{stack_id}",
    params(
        ("stack_id" = String, Path, description = "Stack id as listed by /api/v2/stacks")
    ),
    responses(
        (status = 200, body = StackDetail),
        (status = 404, description = "No container belongs to this stack"),
        (status = 502, description = "Container runtime unreachable and nothing cached")
    ),
    tag = "Stacks"
)]
pub async fn get_stack_handler(
    State(app): State<Arc<AppState>>,
    Path(stack_id): Path<String>,
) -> Result<Json<StackDetail>, StackwatchError> {
    match app.snapshot.get_detail(&stack_id).await? {
        Some(detail) => Ok(Json(detail)),
        None => Err(StackwatchError::StackNotFound(stack_id)),
    }
}
