use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::key_extractor::SmartIpKeyExtractor;
use tower_governor::GovernorLayer;
use tracing::warn;
use utoipa::OpenApi;

use crate::config::Config;
use crate::routes::container_actions::{
    restart_container_handler, start_container_handler, stop_container_handler,
};
use crate::routes::container_logs::container_logs_handler;
use crate::routes::health::healthz_handler;
use crate::routes::metrics::metrics_handler;
use crate::routes::stacks::{get_stack_handler, list_stacks_handler};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    info(description = "Stackwatch Api"),
    paths(
        crate::routes::stacks::list_stacks_handler,
        crate::routes::stacks::get_stack_handler,
        crate::routes::container_actions::start_container_handler,
        crate::routes::container_actions::stop_container_handler,
        crate::routes::container_actions::restart_container_handler,
        crate::routes::container_logs::container_logs_handler,
        crate::routes::health::healthz_handler,
        crate::routes::metrics::metrics_handler
    )
)]
struct ApiDoc;

pub fn build_router(app: Arc<AppState>, config: &Config) -> Router {
    let mut api = Router::new()
        .route("/api/v2/stacks", get(list_stacks_handler))
        .route("/api/v2/stacks/{stack_id}", get(get_stack_handler))
        .route("/api/containers/{container_id}/start", post(start_container_handler))
        .route("/api/containers/{container_id}/stop", post(stop_container_handler))
        .route("/api/containers/{container_id}/restart", post(restart_container_handler))
        .route("/api/containers/{container_id}/logs", get(container_logs_handler))
        .route("/metrics", get(metrics_handler));

    if config.rate_limit_per_second > 0 {
        let governor_conf = GovernorConfigBuilder::default()
            .per_second(config.rate_limit_per_second)
            .burst_size(config.rate_limit_burst.max(1))
            .key_extractor(SmartIpKeyExtractor) // uses client IP
            .finish();

        match governor_conf {
            Some(conf) => {
                api = api.layer(GovernorLayer {
                    config: Arc::new(conf),
                });
            }
            None => warn!("invalid rate limit settings; rate limiting disabled"),
        }
    }

    api.route("/healthz", get(healthz_handler))
        .with_state(app)
        .merge(
            utoipa_swagger_ui::SwaggerUi::new("/swagger")
                .url("/api/openapi.json", ApiDoc::openapi()),
        )
}
