use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use stackwatch::aggregate::StackBuilder;
use stackwatch::cache::SnapshotCache;
use stackwatch::config::Config;
use stackwatch::format::Grouping;
use stackwatch::inspector::DockerRuntime;
use stackwatch::metric_registry::MetricRegistry;
use stackwatch::refresher::Refresher;
use stackwatch::router::build_router;
use stackwatch::snapshot::SnapshotService;
use stackwatch::state::AppState;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).compact().init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = Config::from_env();

    let runtime = Arc::new(DockerRuntime::connect(config.docker_socket.as_deref())?);
    match runtime.version().await {
        Ok(version) => info!("Connected to Docker {:?}", version),
        // The refresher keeps retrying; serve whatever we can meanwhile.
        Err(e) => warn!("Docker not reachable at startup: {}", e),
    }

    let metric_registry = MetricRegistry::default();
    let grouping = Grouping::new(config.group_label.clone(), config.name_separator);
    let builder = Arc::new(StackBuilder::new(
        runtime.clone(),
        grouping,
        config.stats_concurrency,
    ));
    let cache = Arc::new(SnapshotCache::new(config.summary_ttl, config.detail_ttl));

    let refresher = Refresher::new(
        builder.clone(),
        cache.clone(),
        metric_registry.clone(),
        config.refresh_interval,
        config.refresh_floor,
    );
    refresher.start();

    let snapshot = Arc::new(SnapshotService::new(builder, cache, metric_registry.clone()));
    let app_state = Arc::new(AppState::new(snapshot, runtime, metric_registry));
    let router = build_router(app_state, &config);

    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!("Listening on {}", config.bind_addr);

    let shutdown_signal = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(?e, "failed to install Ctrl+C handler");
        }
        info!("shutdown signal received - closing HTTP server");
    };

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal)
    .await?;

    refresher.shutdown().await;

    info!("Stackwatch terminated cleanly");
    Ok(())
}
