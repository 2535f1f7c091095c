//! Time-to-live snapshot caches.
//!
//! Entries are only ever replaced by a successful build; nothing here evicts.
//! A stale entry stays readable so callers can prefer it over no data.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::time::Instant;

use crate::model::{StackDetail, StackSummary};

#[derive(Debug)]
pub struct CacheEntry<T> {
    pub value: T,
    computed_at: Instant,
    /// Wall-clock time of computation, for display only.
    pub refreshed_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            computed_at: Instant::now(),
            refreshed_at: Utc::now(),
        }
    }

    pub fn age(&self) -> Duration {
        self.computed_at.elapsed()
    }

    /// Fresh iff `now - computed_at < ttl`.
    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.age() < ttl
    }
}

/// A single cached value with lock-free reads.
pub struct TtlSlot<T> {
    ttl: Duration,
    slot: ArcSwapOption<CacheEntry<T>>,
}

impl<T> TtlSlot<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: ArcSwapOption::empty(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Latest value regardless of age.
    pub fn get(&self) -> Option<Arc<CacheEntry<T>>> {
        self.slot.load_full()
    }

    pub fn get_fresh(&self) -> Option<Arc<CacheEntry<T>>> {
        self.get().filter(|entry| entry.is_fresh(self.ttl))
    }

    pub fn set(&self, value: T) -> Arc<CacheEntry<T>> {
        let entry = Arc::new(CacheEntry::new(value));
        self.slot.store(Some(entry.clone()));
        entry
    }
}

/// Per-key cached values; each key ages independently.
pub struct TtlMap<T> {
    ttl: Duration,
    entries: DashMap<String, Arc<CacheEntry<T>>>,
}

impl<T> TtlMap<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: DashMap::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, key: &str) -> Option<Arc<CacheEntry<T>>> {
        self.entries.get(key).map(|e| e.value().clone())
    }

    pub fn get_fresh(&self, key: &str) -> Option<Arc<CacheEntry<T>>> {
        self.get(key).filter(|entry| entry.is_fresh(self.ttl))
    }

    /// Last writer wins.
    pub fn set(&self, key: &str, value: T) -> Arc<CacheEntry<T>> {
        let entry = Arc::new(CacheEntry::new(value));
        self.entries.insert(key.to_string(), entry.clone());
        entry
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The fleet-wide summary slot and the per-stack detail map.
pub struct SnapshotCache {
    pub summary: TtlSlot<Vec<StackSummary>>,
    pub detail: TtlMap<StackDetail>,
}

impl SnapshotCache {
    pub fn new(summary_ttl: Duration, detail_ttl: Duration) -> Self {
        Self {
            summary: TtlSlot::new(summary_ttl),
            detail: TtlMap::new(detail_ttl),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn slot_fresh_within_ttl_then_expires() {
        let slot = TtlSlot::new(Duration::from_secs(2));
        assert!(slot.get().is_none());

        slot.set(vec![1, 2, 3]);
        tokio::time::advance(Duration::from_secs(1)).await;
        let entry = slot.get_fresh().expect("fresh at T+1s");
        assert_eq!(entry.value, vec![1, 2, 3]);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(slot.get_fresh().is_none());
        // still readable once stale
        assert_eq!(slot.get().unwrap().value, vec![1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn ttl_boundary_is_exclusive() {
        let slot = TtlSlot::new(Duration::from_secs(2));
        slot.set("v");
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(slot.get_fresh().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn map_keys_age_independently() {
        let map = TtlMap::new(Duration::from_secs(2));
        map.set("cold", 1);
        tokio::time::advance(Duration::from_millis(1500)).await;
        map.set("hot", 2);
        tokio::time::advance(Duration::from_millis(1000)).await;

        assert!(map.get_fresh("cold").is_none());
        assert_eq!(map.get_fresh("hot").unwrap().value, 2);
        assert_eq!(map.get("cold").unwrap().value, 1);
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn map_overwrite_keeps_last_value() {
        let map = TtlMap::new(Duration::from_secs(2));
        map.set("web", 1);
        map.set("web", 2);
        assert_eq!(map.get("web").unwrap().value, 2);
        assert_eq!(map.len(), 1);
    }
}
