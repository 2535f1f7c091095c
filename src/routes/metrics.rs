use axum::{extract::State, response::IntoResponse};
use std::{sync::Arc, time::Duration};

use crate::state::AppState;

/// Plain-text exposition of refresh/detail timings over the last minute and
/// the cache counters.
#[utoipa::path(
    get,
    path = "/metrics",
    responses(
        (status = 200, description = "Plain-text metrics", content_type = "text/plain")
    ),
    tag = "Ops"
)]
pub async fn metrics_handler(State(app): State<Arc<AppState>>) -> impl IntoResponse {
    let out = app.metric_registry.render(Duration::from_secs(60));
    ([(axum::http::header::CONTENT_TYPE, "text/plain")], out)
}
