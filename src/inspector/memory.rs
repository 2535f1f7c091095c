//! In-memory inspector, for tests and for running the HTTP surface without
//! an engine.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{
    ContainerAttributes, ContainerControl, ContainerHandle, LiveStats, RuntimeInspector,
};
use crate::error::{Result, StackwatchError};

#[derive(Default)]
pub struct MemoryInspector {
    containers: Mutex<Vec<ContainerAttributes>>,
    stats: Mutex<HashMap<String, LiveStats>>,
    failing_stats: Mutex<Vec<String>>,
    unreachable: AtomicBool,
    stats_delay: Mutex<Option<Duration>>,
    list_delay: Mutex<Option<Duration>>,

    list_calls: AtomicUsize,
    stats_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    actions: Mutex<Vec<String>>,
}

impl MemoryInspector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_containers(&self, containers: Vec<ContainerAttributes>) {
        *lock(&self.containers) = containers;
    }

    pub fn set_stats(&self, id: &str, stats: LiveStats) {
        lock(&self.stats).insert(id.to_string(), stats);
    }

    /// Make every stats query for `id` fail.
    pub fn fail_stats_for(&self, id: &str) {
        lock(&self.failing_stats).push(id.to_string());
    }

    /// Simulate an engine that cannot be reached at all.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Hold each stats query for `delay` before answering.
    pub fn set_stats_delay(&self, delay: Duration) {
        *lock(&self.stats_delay) = Some(delay);
    }

    /// Hold each listing for `delay`, like an engine that stopped answering.
    pub fn set_list_delay(&self, delay: Duration) {
        *lock(&self.list_delay) = Some(delay);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn stats_calls(&self) -> usize {
        self.stats_calls.load(Ordering::SeqCst)
    }

    /// Highest number of stats queries observed in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Control actions received, as `"<verb> <id>"`.
    pub fn actions(&self) -> Vec<String> {
        lock(&self.actions).clone()
    }

    fn find(&self, id: &str) -> Option<ContainerAttributes> {
        lock(&self.containers)
            .iter()
            .find(|c| c.id == id || c.short_id == id || c.name == id)
            .cloned()
    }

    fn check_reachable(&self) -> Result<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(StackwatchError::Runtime("engine unreachable".into()));
        }
        Ok(())
    }

    fn record_action(&self, verb: &str, id: &str) -> Result<()> {
        self.check_reachable()?;
        if self.find(id).is_none() {
            return Err(StackwatchError::ContainerNotFound(id.to_string()));
        }
        lock(&self.actions).push(format!("{verb} {id}"));
        Ok(())
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl RuntimeInspector for MemoryInspector {
    async fn list_containers(&self, include_stopped: bool) -> Result<Vec<ContainerHandle>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *lock(&self.list_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check_reachable()?;
        Ok(lock(&self.containers)
            .iter()
            .filter(|c| include_stopped || c.running)
            .map(|c| ContainerHandle::new(c.id.clone()))
            .collect())
    }

    async fn get_attributes(&self, handle: &ContainerHandle) -> Result<ContainerAttributes> {
        self.check_reachable()?;
        self.find(&handle.id)
            .ok_or_else(|| StackwatchError::ContainerNotFound(handle.id.clone()))
    }

    async fn get_live_stats(&self, handle: &ContainerHandle) -> Result<LiveStats> {
        self.stats_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *lock(&self.stats_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let result = if lock(&self.failing_stats).contains(&handle.id) {
            Err(StackwatchError::Stats(format!("stats failed for {}", handle.id)))
        } else {
            Ok(lock(&self.stats).get(&handle.id).cloned().unwrap_or_default())
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[async_trait]
impl ContainerControl for MemoryInspector {
    async fn start(&self, id: &str) -> Result<()> {
        self.record_action("start", id)
    }

    async fn stop(&self, id: &str, _grace_secs: Option<u64>, _signal: Option<String>) -> Result<()> {
        self.record_action("stop", id)
    }

    async fn restart(
        &self,
        id: &str,
        _grace_secs: Option<u64>,
        _signal: Option<String>,
    ) -> Result<()> {
        self.record_action("restart", id)
    }

    async fn logs(&self, id: &str, tail: usize) -> Result<String> {
        self.record_action("logs", id)?;
        Ok(format!("last {tail} lines of {id}\n"))
    }
}
