//! Stack and container views served to the dashboard.
//!
//! Everything here is rebuilt wholesale on every build call and never
//! mutated afterwards; caches hold these behind an `Arc`.

use serde::Serialize;
use utoipa::ToSchema;

/// Rendered in place of any statistic that was not (or could not be) read.
pub const UNAVAILABLE: &str = "N/A";

/// Health of a single container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthClass {
    Running,
    Stopped,
    Unhealthy,
}

/// Health of a stack, reduced over its members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AggregateHealth {
    Healthy,
    Degraded,
    Stopped,
}

impl AggregateHealth {
    /// `Stopped` iff every member is stopped, else `Degraded` iff any member
    /// is unhealthy, else `Healthy`.
    pub fn reduce<I>(classes: I) -> Self
    where
        I: IntoIterator<Item = HealthClass>,
    {
        let mut all_stopped = true;
        let mut any_unhealthy = false;
        for class in classes {
            match class {
                HealthClass::Stopped => {}
                HealthClass::Unhealthy => {
                    all_stopped = false;
                    any_unhealthy = true;
                }
                HealthClass::Running => all_stopped = false,
            }
        }

        if all_stopped {
            AggregateHealth::Stopped
        } else if any_unhealthy {
            AggregateHealth::Degraded
        } else {
            AggregateHealth::Healthy
        }
    }
}

/// CPU / memory / network triple, pre-formatted for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ContainerStatsView {
    /// e.g. `"0.04%"`
    pub cpu: String,
    /// e.g. `"41.27MiB / 5.783GiB"`
    pub ram: String,
    /// e.g. `"3.83MB / 4.22MB"`
    pub net: String,
}

impl ContainerStatsView {
    pub fn unavailable() -> Self {
        Self {
            cpu: UNAVAILABLE.to_string(),
            ram: UNAVAILABLE.to_string(),
            net: UNAVAILABLE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct ContainerActions {
    pub can_logs: bool,
    pub can_shell: bool,
    pub can_restart: bool,
}

impl Default for ContainerActions {
    fn default() -> Self {
        Self {
            can_logs: true,
            can_shell: true,
            can_restart: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ContainerRecord {
    /// 12-character short id; the dashboard addresses containers by it.
    pub id: String,
    pub full_id: String,
    pub name: String,
    pub stack_id: String,
    pub state: HealthClass,
    pub uptime_seconds: i64,
    /// Compact form: `"22h"`, `"5m"` or `"N/A"`.
    pub uptime: String,
    /// Formatted bindings; `["N/A"]` when the container exposes nothing.
    pub ports: Vec<String>,
    #[serde(flatten)]
    pub stats: ContainerStatsView,
    pub actions: ContainerActions,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct StackSummary {
    pub stack_id: String,
    pub display_name: String,
    pub containers_count: usize,
    pub status: AggregateHealth,
    pub longest_uptime_seconds: i64,
    pub longest_uptime: String,
    /// Always `"N/A"`: the summary path never queries live statistics.
    pub cpu_avg: String,
    pub ram_total_used: String,
    pub ram_host_total: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct StackDetailSummary {
    pub containers_count: usize,
    pub cpu_avg: String,
    pub ram_total_used: String,
    pub ram_host_total: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct StackDetail {
    pub stack_id: String,
    pub display_name: String,
    pub status: AggregateHealth,
    pub longest_uptime_seconds: i64,
    pub longest_uptime: String,
    pub summary: StackDetailSummary,
    pub containers: Vec<ContainerRecord>,
}
