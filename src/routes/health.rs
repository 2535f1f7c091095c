use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Liveness only; does not touch the container runtime.
#[utoipa::path(
    get,
    path = "/healthz",
    responses(
        (status = 200, body = HealthResponse)
    ),
    tag = "Ops"
)]
pub async fn healthz_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}
