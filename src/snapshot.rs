//! Read side of the snapshot engine, the two calls the HTTP layer makes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::aggregate::StackBuilder;
use crate::cache::SnapshotCache;
use crate::error::Result;
use crate::metric_registry::{
    MetricRegistry, DETAIL_BUILD, DETAIL_BUILD_FAILURES, DETAIL_CACHE_HITS, DETAIL_CACHE_MISSES,
    DETAIL_NOT_FOUND,
};
use crate::model::{StackDetail, StackSummary};

/// Latest published summary plus how old it is.
#[derive(Debug, Clone)]
pub struct SummarySnapshot {
    pub stacks: Vec<StackSummary>,
    pub refreshed_at: Option<DateTime<Utc>>,
    /// Older than the summary TTL, or never published.
    pub stale: bool,
}

pub struct SnapshotService {
    builder: Arc<StackBuilder>,
    cache: Arc<SnapshotCache>,
    metrics: MetricRegistry,
}

impl SnapshotService {
    pub fn new(builder: Arc<StackBuilder>, cache: Arc<SnapshotCache>, metrics: MetricRegistry) -> Self {
        Self {
            builder,
            cache,
            metrics,
        }
    }

    pub fn cache(&self) -> &Arc<SnapshotCache> {
        &self.cache
    }

    /// Whatever the refresher published last. Never touches the runtime;
    /// empty until the first refresh succeeds.
    pub fn get_summary(&self) -> Vec<StackSummary> {
        self.cache
            .summary
            .get()
            .map(|entry| entry.value.clone())
            .unwrap_or_default()
    }

    pub fn summary_snapshot(&self) -> SummarySnapshot {
        match self.cache.summary.get() {
            Some(entry) => SummarySnapshot {
                stale: !entry.is_fresh(self.cache.summary.ttl()),
                refreshed_at: Some(entry.refreshed_at),
                stacks: entry.value.clone(),
            },
            None => SummarySnapshot {
                stacks: Vec::new(),
                refreshed_at: None,
                stale: true,
            },
        }
    }

    /// Cached detail when fresh, else a synchronous rebuild.
    ///
    /// A stack with no containers yields `Ok(None)` and is not cached. When
    /// the rebuild fails, a stale entry for the stack is served instead; only
    /// with nothing cached does the error reach the caller.
    pub async fn get_detail(&self, stack_id: &str) -> Result<Option<StackDetail>> {
        if let Some(entry) = self.cache.detail.get_fresh(stack_id) {
            self.metrics.incr(DETAIL_CACHE_HITS);
            return Ok(Some(entry.value.clone()));
        }
        self.metrics.incr(DETAIL_CACHE_MISSES);

        let start = Instant::now();
        match self.builder.detail(stack_id).await {
            Ok(Some(detail)) => {
                self.metrics.record_duration(DETAIL_BUILD, start.elapsed());
                let entry = self.cache.detail.set(stack_id, detail);
                Ok(Some(entry.value.clone()))
            }
            Ok(None) => {
                self.metrics.incr(DETAIL_NOT_FOUND);
                debug!(stack_id, "stack not found");
                Ok(None)
            }
            Err(e) => {
                self.metrics.incr(DETAIL_BUILD_FAILURES);
                match self.cache.detail.get(stack_id) {
                    Some(stale) => {
                        warn!(
                            stack_id,
                            age_ms = stale.age().as_millis() as u64,
                            "detail rebuild failed, serving stale snapshot: {}",
                            e
                        );
                        Ok(Some(stale.value.clone()))
                    }
                    None => Err(e),
                }
            }
        }
    }
}
