//! Runtime inspection: the only place that talks to the container engine.
//!
//! [`RuntimeInspector`] is what the snapshot engine reads from;
//! [`ContainerControl`] carries the start/stop/restart/logs pass-through used
//! by the HTTP layer. [`DockerRuntime`] implements both on top of bollard.

mod docker;
mod memory;

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use tracing::debug;

use crate::error::Result;

pub use docker::DockerRuntime;
pub use memory::MemoryInspector;

/// Opaque reference to one container, as returned by a listing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerHandle {
    pub id: String,
}

impl ContainerHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Health-check status as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Starting,
    Healthy,
    Unhealthy,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortBinding {
    pub host_ip: String,
    pub host_port: String,
}

/// `"<port>/<proto>"` → host bindings; `None` when exposed but not published.
pub type PortMap = BTreeMap<String, Option<Vec<PortBinding>>>;

#[derive(Debug, Clone, PartialEq)]
pub struct ContainerAttributes {
    pub id: String,
    pub short_id: String,
    /// Without the leading `/` the engine API prepends.
    pub name: String,
    pub running: bool,
    pub health_status: Option<HealthStatus>,
    pub started_at: Option<String>,
    pub labels: HashMap<String, String>,
    pub port_bindings: PortMap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuCounters {
    pub total_usage: u64,
    pub system_usage: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryCounters {
    pub usage: u64,
    pub limit: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetworkCounters {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

/// One live statistics sample. Each group is `None` when the engine left
/// any of its fields out.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiveStats {
    pub cpu: Option<CpuCounters>,
    pub precpu: Option<CpuCounters>,
    pub online_cpus: Option<u32>,
    pub percpu_count: Option<usize>,
    pub memory: Option<MemoryCounters>,
    pub networks: Option<BTreeMap<String, NetworkCounters>>,
}

#[async_trait]
pub trait RuntimeInspector: Send + Sync {
    async fn list_containers(&self, include_stopped: bool) -> Result<Vec<ContainerHandle>>;

    async fn get_attributes(&self, handle: &ContainerHandle) -> Result<ContainerAttributes>;

    /// Blocking round trip to the engine; may fail transiently.
    async fn get_live_stats(&self, handle: &ContainerHandle) -> Result<LiveStats>;
}

#[async_trait]
pub trait ContainerControl: Send + Sync {
    async fn start(&self, id: &str) -> Result<()>;

    async fn stop(&self, id: &str, grace_secs: Option<u64>, signal: Option<String>) -> Result<()>;

    async fn restart(
        &self,
        id: &str,
        grace_secs: Option<u64>,
        signal: Option<String>,
    ) -> Result<()>;

    async fn logs(&self, id: &str, tail: usize) -> Result<String>;
}

/// List every container (running and stopped) and inspect each one, at most
/// `concurrency` inspections in flight.
///
/// A failed listing means the engine is unreachable and is returned as an
/// error. A failed inspection only drops that container: it most likely went
/// away between the listing and the inspect call.
pub async fn inspect_fleet(
    inspector: &dyn RuntimeInspector,
    concurrency: usize,
) -> Result<Vec<ContainerAttributes>> {
    let handles = inspector.list_containers(true).await?;

    let attributes: Vec<ContainerAttributes> = stream::iter(handles)
        .map(|handle| async move {
            match inspector.get_attributes(&handle).await {
                Ok(attrs) => Some(attrs),
                Err(e) => {
                    debug!(container = %handle.id, "skipping container: {}", e);
                    None
                }
            }
        })
        .buffered(concurrency.max(1))
        .filter_map(|attrs| async move { attrs })
        .collect()
        .await;

    Ok(attributes)
}
