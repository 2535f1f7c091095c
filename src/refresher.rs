//! Background summary refresh.
//!
//! One long-lived task rebuilds the fleet-wide summary on a fixed cadence and
//! publishes it into the summary slot. A failed cycle is logged and leaves the
//! previous summary in place.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::aggregate::StackBuilder;
use crate::cache::SnapshotCache;
use crate::metric_registry::{MetricRegistry, SUMMARY_REFRESH, SUMMARY_REFRESH_FAILURES};

pub struct Refresher {
    builder: Arc<StackBuilder>,
    cache: Arc<SnapshotCache>,
    metrics: MetricRegistry,
    interval: Duration,
    floor: Duration,
    shutdown_tx: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Refresher {
    pub fn new(
        builder: Arc<StackBuilder>,
        cache: Arc<SnapshotCache>,
        metrics: MetricRegistry,
        interval: Duration,
        floor: Duration,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            builder,
            cache,
            metrics,
            interval,
            floor,
            shutdown_tx,
            handle: Mutex::new(None),
        }
    }

    /// Spawn the refresh task. Returns `false`, spawning nothing, when a task
    /// from an earlier call is still running.
    pub fn start(&self) -> bool {
        let mut handle = self
            .handle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if handle.as_ref().is_some_and(|h| !h.is_finished()) {
            debug!("summary refresher already running");
            return false;
        }

        // A restart after shutdown needs the flag lowered again.
        self.shutdown_tx.send_replace(false);

        let builder = self.builder.clone();
        let cache = self.cache.clone();
        let metrics = self.metrics.clone();
        let interval = self.interval;
        let floor = self.floor;
        let shutdown = self.shutdown_tx.subscribe();

        *handle = Some(tokio::spawn(run_refresh_loop(
            builder, cache, metrics, interval, floor, shutdown,
        )));
        true
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Signal the task to stop and wait for it to exit.
    pub async fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(?e, "summary refresher ended abnormally");
            }
        }
    }
}

/// Sleep between cycles: whatever is left of `interval`, never below `floor`.
pub fn next_sleep(interval: Duration, elapsed: Duration, floor: Duration) -> Duration {
    interval.saturating_sub(elapsed).max(floor)
}

/// One refresh cycle. Only a successful build touches the cache.
pub async fn refresh_once(builder: &StackBuilder, cache: &SnapshotCache, metrics: &MetricRegistry) {
    let start = Instant::now();
    match builder.summaries().await {
        Ok(summaries) => {
            let stacks = summaries.len();
            cache.summary.set(summaries);
            metrics.record_duration(SUMMARY_REFRESH, start.elapsed());
            debug!(
                stacks,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "summary refreshed"
            );
        }
        Err(e) => {
            metrics.incr(SUMMARY_REFRESH_FAILURES);
            warn!("summary refresh failed, keeping previous snapshot: {}", e);
        }
    }
}

/// Resolves once shutdown is signalled or the sender is gone.
async fn stop_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

async fn run_refresh_loop(
    builder: Arc<StackBuilder>,
    cache: Arc<SnapshotCache>,
    metrics: MetricRegistry,
    interval: Duration,
    floor: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(
        interval_ms = interval.as_millis() as u64,
        "starting summary refresher"
    );

    loop {
        if *shutdown.borrow() {
            break;
        }

        // A cycle cut short by shutdown never reaches the cache.
        let start = Instant::now();
        tokio::select! {
            biased;
            _ = stop_requested(&mut shutdown) => break,
            _ = refresh_once(&builder, &cache, &metrics) => {}
        }
        let sleep_for = next_sleep(interval, start.elapsed(), floor);

        tokio::select! {
            biased;
            _ = stop_requested(&mut shutdown) => break,
            _ = tokio::time::sleep(sleep_for) => {}
        }
    }

    info!("summary refresher stopped");
}
