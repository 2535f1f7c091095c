//! Groups container records into stacks.
//!
//! [`build_summaries`] and [`build_detail`] are pure reductions over
//! records. [`StackBuilder`] feeds them from a [`RuntimeInspector`]: the
//! summary path only inspects attributes, the detail path additionally
//! queries live stats for the running members of one stack.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::{stream, StreamExt};
use tracing::debug;

use crate::error::Result;
use crate::format::{
    classify_state, cpu_percent, format_bytes_coarse, format_duration, format_mem_pair,
    format_net_pair, format_percent, format_ports, format_uptime_at, online_cpu_count,
    parse_mem_pair, parse_percent, Grouping,
};
use crate::inspector::{inspect_fleet, ContainerAttributes, ContainerHandle, LiveStats, RuntimeInspector};
use crate::model::{
    AggregateHealth, ContainerActions, ContainerRecord, ContainerStatsView, HealthClass,
    StackDetail, StackDetailSummary, StackSummary, UNAVAILABLE,
};

/// Build a record from inspected attributes. `stats` is only supplied on
/// the detail path.
pub fn build_record(
    attrs: &ContainerAttributes,
    grouping: &Grouping,
    now: DateTime<Utc>,
    stats: Option<ContainerStatsView>,
) -> ContainerRecord {
    let (uptime_seconds, uptime) = format_uptime_at(attrs.started_at.as_deref().unwrap_or(""), now);

    ContainerRecord {
        id: attrs.short_id.clone(),
        full_id: attrs.id.clone(),
        name: attrs.name.clone(),
        stack_id: grouping.group_id(&attrs.labels, &attrs.name),
        state: classify_state(attrs.running, attrs.health_status),
        uptime_seconds,
        uptime,
        ports: format_ports(&attrs.port_bindings),
        stats: stats.unwrap_or_else(ContainerStatsView::unavailable),
        actions: ContainerActions::default(),
    }
}

/// Format one live sample. Each field independently falls back to `"N/A"`.
pub fn stats_view(live: &LiveStats) -> ContainerStatsView {
    let cpu = match (live.cpu, live.precpu) {
        (Some(cur), Some(prev)) => {
            let cpus = online_cpu_count(live.online_cpus, live.percpu_count);
            format_percent(cpu_percent(cur, prev, cpus))
        }
        _ => UNAVAILABLE.to_string(),
    };

    let ram = match live.memory {
        Some(m) => format_mem_pair(m.usage, m.limit),
        None => UNAVAILABLE.to_string(),
    };

    let net = match &live.networks {
        Some(ifaces) => format_net_pair(ifaces.values()),
        None => UNAVAILABLE.to_string(),
    };

    ContainerStatsView { cpu, ram, net }
}

struct StackAccumulator {
    count: usize,
    longest_uptime: i64,
    classes: Vec<HealthClass>,
}

/// One summary per stack, ordered by stack id. Statistics are never
/// queried on this path and are reported as `"N/A"`.
pub fn build_summaries(records: &[ContainerRecord]) -> Vec<StackSummary> {
    let mut stacks: BTreeMap<&str, StackAccumulator> = BTreeMap::new();

    for record in records {
        let acc = stacks
            .entry(record.stack_id.as_str())
            .or_insert_with(|| StackAccumulator {
                count: 0,
                longest_uptime: 0,
                classes: Vec::new(),
            });
        acc.count += 1;
        acc.classes.push(record.state);
        acc.longest_uptime = acc.longest_uptime.max(record.uptime_seconds);
    }

    stacks
        .into_iter()
        .map(|(stack_id, acc)| StackSummary {
            stack_id: stack_id.to_string(),
            display_name: stack_id.to_string(),
            containers_count: acc.count,
            status: AggregateHealth::reduce(acc.classes),
            longest_uptime_seconds: acc.longest_uptime,
            longest_uptime: format_duration(acc.longest_uptime),
            cpu_avg: UNAVAILABLE.to_string(),
            ram_total_used: UNAVAILABLE.to_string(),
            ram_host_total: UNAVAILABLE.to_string(),
        })
        .collect()
}

/// Detail for `stack_id` from records that already carry their stats.
/// `None` when no record belongs to the stack.
pub fn build_detail(stack_id: &str, records: Vec<ContainerRecord>) -> Option<StackDetail> {
    let members: Vec<ContainerRecord> = records
        .into_iter()
        .filter(|r| r.stack_id == stack_id)
        .collect();

    if members.is_empty() {
        return None;
    }

    let mut cpu_values = Vec::new();
    let mut ram_used: u64 = 0;
    let mut ram_ceiling: u64 = 0;

    for member in &members {
        if let Some(cpu) = parse_percent(&member.stats.cpu) {
            cpu_values.push(cpu);
        }
        let (used, limit) = parse_mem_pair(&member.stats.ram);
        if let Some(used) = used {
            ram_used = ram_used.saturating_add(used);
        }
        if let Some(limit) = limit {
            ram_ceiling = ram_ceiling.max(limit);
        }
    }

    let cpu_avg = if cpu_values.is_empty() {
        0.0
    } else {
        cpu_values.iter().sum::<f64>() / cpu_values.len() as f64
    };

    let longest_uptime = members.iter().map(|m| m.uptime_seconds).max().unwrap_or(0);

    Some(StackDetail {
        stack_id: stack_id.to_string(),
        display_name: stack_id.to_string(),
        status: AggregateHealth::reduce(members.iter().map(|m| m.state)),
        longest_uptime_seconds: longest_uptime,
        longest_uptime: format_duration(longest_uptime),
        summary: StackDetailSummary {
            containers_count: members.len(),
            cpu_avg: format_percent(cpu_avg),
            ram_total_used: format_bytes_coarse(ram_used),
            ram_host_total: if ram_ceiling > 0 {
                format_bytes_coarse(ram_ceiling)
            } else {
                UNAVAILABLE.to_string()
            },
        },
        containers: members,
    })
}

/// Builds summaries and details straight from the runtime.
pub struct StackBuilder {
    inspector: Arc<dyn RuntimeInspector>,
    grouping: Grouping,
    concurrency: usize,
}

impl StackBuilder {
    pub fn new(inspector: Arc<dyn RuntimeInspector>, grouping: Grouping, concurrency: usize) -> Self {
        Self {
            inspector,
            grouping,
            concurrency: concurrency.max(1),
        }
    }

    /// Full inspection of the fleet, no stats queries.
    pub async fn summaries(&self) -> Result<Vec<StackSummary>> {
        let now = Utc::now();
        let fleet = inspect_fleet(self.inspector.as_ref(), self.concurrency).await?;
        let records: Vec<ContainerRecord> = fleet
            .iter()
            .map(|attrs| build_record(attrs, &self.grouping, now, None))
            .collect();
        Ok(build_summaries(&records))
    }

    /// Inspect the fleet, keep the members of `stack_id` and query live
    /// stats for the running ones, at most `concurrency` at a time.
    ///
    /// `Ok(None)` means the stack has no containers. An unreachable runtime
    /// is an error; a failed stats query only blanks that container's stats.
    pub async fn detail(&self, stack_id: &str) -> Result<Option<StackDetail>> {
        let now = Utc::now();
        let members: Vec<ContainerAttributes> =
            inspect_fleet(self.inspector.as_ref(), self.concurrency)
                .await?
                .into_iter()
                .filter(|attrs| self.grouping.group_id(&attrs.labels, &attrs.name) == stack_id)
                .collect();

        if members.is_empty() {
            return Ok(None);
        }

        let running: Vec<ContainerHandle> = members
            .iter()
            .filter(|attrs| classify_state(attrs.running, attrs.health_status) == HealthClass::Running)
            .map(|attrs| ContainerHandle::new(attrs.id.clone()))
            .collect();

        let mut stats = self.fetch_stats(running).await;

        let records = members
            .iter()
            .map(|attrs| {
                let view = stats.remove(&attrs.id);
                build_record(attrs, &self.grouping, now, view)
            })
            .collect();

        Ok(build_detail(stack_id, records))
    }

    async fn fetch_stats(&self, handles: Vec<ContainerHandle>) -> HashMap<String, ContainerStatsView> {
        let inspector = self.inspector.as_ref();

        stream::iter(handles)
            .map(|handle| async move {
                let view = match inspector.get_live_stats(&handle).await {
                    Ok(live) => stats_view(&live),
                    Err(e) => {
                        debug!(container = %handle.id, "stats unavailable: {}", e);
                        ContainerStatsView::unavailable()
                    }
                };
                (handle.id, view)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inspector::{
        CpuCounters, HealthStatus, MemoryCounters, MemoryInspector, NetworkCounters, PortMap,
    };
    use std::time::Duration;

    const MIB: u64 = 1024 * 1024;
    const GIB: u64 = 1024 * MIB;

    fn attrs(id: &str, name: &str, running: bool, health: Option<HealthStatus>) -> ContainerAttributes {
        ContainerAttributes {
            id: id.to_string(),
            short_id: id.chars().take(12).collect(),
            name: name.to_string(),
            running,
            health_status: health,
            started_at: Some("2024-05-01T10:00:00.000000000Z".to_string()),
            labels: HashMap::new(),
            port_bindings: PortMap::new(),
        }
    }

    fn record(stack: &str, state: HealthClass, uptime: i64, cpu: &str, ram: &str) -> ContainerRecord {
        ContainerRecord {
            id: format!("{stack}-{uptime}"),
            full_id: format!("{stack}-{uptime}"),
            name: format!("{stack}-{uptime}"),
            stack_id: stack.to_string(),
            state,
            uptime_seconds: uptime,
            uptime: format_duration(uptime),
            ports: vec![UNAVAILABLE.to_string()],
            stats: ContainerStatsView {
                cpu: cpu.to_string(),
                ram: ram.to_string(),
                net: UNAVAILABLE.to_string(),
            },
            actions: ContainerActions::default(),
        }
    }

    fn live(cpu_delta: u64, sys_delta: u64, used: u64, limit: u64) -> LiveStats {
        LiveStats {
            cpu: Some(CpuCounters {
                total_usage: 1_000 + cpu_delta,
                system_usage: 10_000 + sys_delta,
            }),
            precpu: Some(CpuCounters {
                total_usage: 1_000,
                system_usage: 10_000,
            }),
            online_cpus: Some(1),
            percpu_count: None,
            memory: Some(MemoryCounters { usage: used, limit }),
            networks: Some(
                [(
                    "eth0".to_string(),
                    NetworkCounters {
                        rx_bytes: 2048,
                        tx_bytes: 4096,
                    },
                )]
                .into_iter()
                .collect(),
            ),
        }
    }

    #[test]
    fn no_containers_no_summaries() {
        assert!(build_summaries(&[]).is_empty());
    }

    #[test]
    fn summaries_group_and_reduce() {
        let records = vec![
            record("web", HealthClass::Running, 7322, UNAVAILABLE, UNAVAILABLE),
            record("web", HealthClass::Unhealthy, 60, UNAVAILABLE, UNAVAILABLE),
            record("db", HealthClass::Stopped, 0, UNAVAILABLE, UNAVAILABLE),
        ];
        let summaries = build_summaries(&records);
        assert_eq!(summaries.len(), 2);

        let db = &summaries[0];
        assert_eq!(db.stack_id, "db");
        assert_eq!(db.status, AggregateHealth::Stopped);

        let web = &summaries[1];
        assert_eq!(web.containers_count, 2);
        assert_eq!(web.status, AggregateHealth::Degraded);
        assert_eq!(web.longest_uptime, "2h");
        assert_eq!(web.cpu_avg, "N/A");
        assert_eq!(web.ram_host_total, "N/A");
    }

    #[test]
    fn detail_for_unknown_stack_is_none() {
        let records = vec![record("web", HealthClass::Running, 10, "1.00%", UNAVAILABLE)];
        assert!(build_detail("nope", records).is_none());
    }

    #[test]
    fn detail_aggregates_parseable_stats() {
        let records = vec![
            record("web", HealthClass::Running, 100, "10.00%", "512.00MiB / 2.000GiB"),
            record("web", HealthClass::Running, 200, "30.00%", "1.000GiB / 4.000GiB"),
            record("web", HealthClass::Stopped, 0, UNAVAILABLE, UNAVAILABLE),
        ];
        let detail = build_detail("web", records).unwrap();
        assert_eq!(detail.summary.containers_count, 3);
        assert_eq!(detail.summary.cpu_avg, "20.00%");
        assert_eq!(detail.summary.ram_total_used, "1.50GiB");
        assert_eq!(detail.summary.ram_host_total, "4.00GiB");
        assert_eq!(detail.status, AggregateHealth::Healthy);
        assert_eq!(detail.longest_uptime_seconds, 200);
    }

    #[test]
    fn detail_without_stats_reports_zero_and_no_ceiling() {
        let records = vec![
            record("db", HealthClass::Stopped, 0, UNAVAILABLE, UNAVAILABLE),
            record("db", HealthClass::Stopped, 0, UNAVAILABLE, UNAVAILABLE),
        ];
        let detail = build_detail("db", records).unwrap();
        assert_eq!(detail.summary.cpu_avg, "0.00%");
        assert_eq!(detail.summary.ram_total_used, "0MiB");
        assert_eq!(detail.summary.ram_host_total, "N/A");
        assert_eq!(detail.status, AggregateHealth::Stopped);
    }

    #[test]
    fn detail_health_degraded_with_one_unhealthy() {
        let records = vec![
            record("api", HealthClass::Running, 5, UNAVAILABLE, UNAVAILABLE),
            record("api", HealthClass::Unhealthy, 5, UNAVAILABLE, UNAVAILABLE),
        ];
        assert_eq!(
            build_detail("api", records).unwrap().status,
            AggregateHealth::Degraded
        );
    }

    #[test]
    fn record_id_is_the_short_id() {
        let full = "3f4c2a1b9e8d7c6b5a4f3e2d1c0b9a8f7e6d5c4b3a2f1e0d9c8b7a6f5e4d3c2b";
        let record = build_record(
            &attrs(full, "web-1", true, None),
            &Grouping::default(),
            Utc::now(),
            None,
        );
        assert_eq!(record.id, "3f4c2a1b9e8d");
        assert_eq!(record.full_id, full);
    }

    #[test]
    fn stats_view_formats_each_field() {
        let view = stats_view(&live(500, 2_000, 256 * MIB, GIB));
        assert_eq!(view.cpu, "25.00%");
        assert_eq!(view.ram, "256.00MiB / 1.000GiB");
        assert_eq!(view.net, "2.00kB / 4.00kB");

        let empty = stats_view(&LiveStats::default());
        assert_eq!(empty, ContainerStatsView::unavailable());
    }

    #[tokio::test]
    async fn builder_groups_by_name_prefix() {
        let inspector = Arc::new(MemoryInspector::new());
        inspector.set_containers(vec![
            attrs("a1", "web-1", true, None),
            attrs("a2", "web-2", true, None),
            attrs("a3", "standalone", false, None),
        ]);
        let builder = StackBuilder::new(inspector.clone(), Grouping::default(), 4);

        let summaries = builder.summaries().await.unwrap();
        let ids: Vec<_> = summaries.iter().map(|s| s.stack_id.as_str()).collect();
        assert_eq!(ids, vec!["standalone", "web"]);
        assert_eq!(summaries[1].containers_count, 2);
        assert_eq!(summaries[0].status, AggregateHealth::Stopped);
        assert_eq!(inspector.stats_calls(), 0);
    }

    #[tokio::test]
    async fn detail_only_queries_running_members() {
        let inspector = Arc::new(MemoryInspector::new());
        inspector.set_containers(vec![
            attrs("a1", "web-1", true, None),
            attrs("a2", "web-2", false, None),
            attrs("a3", "web-3", true, Some(HealthStatus::Unhealthy)),
            attrs("b1", "db-1", true, None),
        ]);
        inspector.set_stats("a1", live(500, 2_000, 256 * MIB, GIB));
        let builder = StackBuilder::new(inspector.clone(), Grouping::default(), 4);

        let detail = builder.detail("web").await.unwrap().unwrap();
        assert_eq!(inspector.stats_calls(), 1);
        assert_eq!(detail.containers.len(), 3);
        assert_eq!(detail.status, AggregateHealth::Degraded);

        let a1 = detail.containers.iter().find(|c| c.id == "a1").unwrap();
        assert_eq!(a1.stats.cpu, "25.00%");
        let a3 = detail.containers.iter().find(|c| c.id == "a3").unwrap();
        assert_eq!(a3.stats, ContainerStatsView::unavailable());
        assert_eq!(detail.summary.ram_total_used, "256MiB");
    }

    #[tokio::test]
    async fn failed_stats_query_is_contained() {
        let inspector = Arc::new(MemoryInspector::new());
        inspector.set_containers(vec![
            attrs("a1", "web-1", true, None),
            attrs("a2", "web-2", true, None),
        ]);
        inspector.set_stats("a1", live(100, 1_000, 10 * MIB, GIB));
        inspector.fail_stats_for("a2");
        let builder = StackBuilder::new(inspector.clone(), Grouping::default(), 4);

        let detail = builder.detail("web").await.unwrap().unwrap();
        let a2 = detail.containers.iter().find(|c| c.id == "a2").unwrap();
        assert_eq!(a2.stats.cpu, "N/A");
        assert_eq!(detail.summary.cpu_avg, "10.00%");
    }

    #[tokio::test]
    async fn unreachable_runtime_is_an_error() {
        let inspector = Arc::new(MemoryInspector::new());
        inspector.set_unreachable(true);
        let builder = StackBuilder::new(inspector, Grouping::default(), 4);
        assert!(builder.summaries().await.is_err());
        assert!(builder.detail("web").await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn stats_fan_out_is_bounded_and_concurrent() {
        let inspector = Arc::new(MemoryInspector::new());
        let fleet = (0..10)
            .map(|i| attrs(&format!("c{i}"), &format!("big-{i}"), true, None))
            .collect();
        inspector.set_containers(fleet);
        inspector.set_stats_delay(Duration::from_millis(100));
        let builder = StackBuilder::new(inspector.clone(), Grouping::default(), 4);

        let detail = builder.detail("big").await.unwrap().unwrap();
        assert_eq!(detail.containers.len(), 10);
        assert_eq!(inspector.stats_calls(), 10);
        assert_eq!(inspector.max_in_flight(), 4);
    }
}
