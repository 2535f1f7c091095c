use std::collections::BTreeMap;

use async_trait::async_trait;
use bollard::models::{
    ContainerCpuStats, ContainerInspectResponse, ContainerStatsResponse, HealthStatusEnum,
};
use bollard::query_parameters::{
    InspectContainerOptions, ListContainersOptionsBuilder, LogsOptionsBuilder,
    RestartContainerOptions, StartContainerOptions, StatsOptions, StopContainerOptions,
};
use bollard::{Docker, API_DEFAULT_VERSION};
use futures_util::StreamExt;
use tracing::debug;

use super::{
    ContainerAttributes, ContainerControl, ContainerHandle, CpuCounters, HealthStatus, LiveStats,
    MemoryCounters, NetworkCounters, PortBinding, PortMap, RuntimeInspector,
};
use crate::error::{Result, StackwatchError};

/// Docker Engine backed inspector. `bollard::Docker` is internally
/// Arc-backed, so cloning this is cheap.
#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect through `socket` when given, otherwise the local defaults
    /// (`DOCKER_HOST` or the default socket), then the Docker Desktop socket.
    pub fn connect(socket: Option<&str>) -> Result<Self> {
        let docker = match socket {
            Some(path) => Docker::connect_with_unix(path, 120, API_DEFAULT_VERSION)?,
            None => match Docker::connect_with_local_defaults() {
                Ok(d) => d,
                Err(_) => {
                    let home = std::env::var("HOME").map_err(|_| {
                        StackwatchError::Config(
                            "HOME is not set; cannot locate Docker Desktop socket".into(),
                        )
                    })?;
                    let sock = format!("{home}/.docker/desktop/docker.sock");
                    Docker::connect_with_unix(&sock, 120, API_DEFAULT_VERSION)?
                }
            },
        };
        Ok(Self { docker })
    }

    /// Engine version, doubling as a reachability probe at startup.
    pub async fn version(&self) -> Result<Option<String>> {
        Ok(self.docker.version().await?.version)
    }
}

#[async_trait]
impl RuntimeInspector for DockerRuntime {
    async fn list_containers(&self, include_stopped: bool) -> Result<Vec<ContainerHandle>> {
        let opts = ListContainersOptionsBuilder::new()
            .all(include_stopped)
            .build();

        let containers = self.docker.list_containers(Some(opts)).await?;
        Ok(containers
            .into_iter()
            .filter_map(|c| c.id)
            .map(ContainerHandle::new)
            .collect())
    }

    async fn get_attributes(&self, handle: &ContainerHandle) -> Result<ContainerAttributes> {
        let resp = self
            .docker
            .inspect_container(&handle.id, None::<InspectContainerOptions>)
            .await?;
        Ok(attributes_from_inspect(resp, &handle.id))
    }

    async fn get_live_stats(&self, handle: &ContainerHandle) -> Result<LiveStats> {
        // Not one-shot: the engine waits for a second sample so that the
        // precpu counters are populated and a delta can be taken.
        let mut stream = self.docker.stats(
            &handle.id,
            Some(StatsOptions {
                stream: false,
                one_shot: false,
            }),
        );

        match stream.next().await {
            Some(Ok(s)) => Ok(live_stats_from_response(&s)),
            Some(Err(e)) => Err(StackwatchError::Stats(e.to_string())),
            None => {
                debug!(container = %handle.id, "no stats returned");
                Err(StackwatchError::Stats(format!(
                    "no stats returned for {}",
                    handle.id
                )))
            }
        }
    }
}

#[async_trait]
impl ContainerControl for DockerRuntime {
    async fn start(&self, id: &str) -> Result<()> {
        self.docker
            .start_container(id, None::<StartContainerOptions>)
            .await?;
        Ok(())
    }

    async fn stop(&self, id: &str, grace_secs: Option<u64>, signal: Option<String>) -> Result<()> {
        let t = grace_secs.map(|v| v as i32);
        self.docker
            .stop_container(id, Some(StopContainerOptions { t, signal }))
            .await?;
        Ok(())
    }

    async fn restart(
        &self,
        id: &str,
        grace_secs: Option<u64>,
        signal: Option<String>,
    ) -> Result<()> {
        let t = grace_secs.map(|v| v as i32);
        self.docker
            .restart_container(id, Some(RestartContainerOptions { t, signal }))
            .await?;
        Ok(())
    }

    async fn logs(&self, id: &str, tail: usize) -> Result<String> {
        let opts = LogsOptionsBuilder::new()
            .stdout(true)
            .stderr(true)
            .tail(&tail.to_string())
            .build();

        let mut stream = self.docker.logs(id, Some(opts));
        let mut out = String::new();
        while let Some(chunk) = stream.next().await {
            out.push_str(&chunk?.to_string());
        }
        Ok(out)
    }
}

pub(crate) fn attributes_from_inspect(
    resp: ContainerInspectResponse,
    fallback_id: &str,
) -> ContainerAttributes {
    let id = resp.id.unwrap_or_else(|| fallback_id.to_string());
    let short_id = id.chars().take(12).collect();
    let name = resp
        .name
        .unwrap_or_default()
        .trim_start_matches('/')
        .to_string();

    let state = resp.state.unwrap_or_default();
    let health_status = state
        .health
        .and_then(|h| h.status)
        .map(health_status_from);

    let labels = resp.config.and_then(|c| c.labels).unwrap_or_default();

    let port_bindings: PortMap = resp
        .network_settings
        .and_then(|n| n.ports)
        .unwrap_or_default()
        .into_iter()
        .map(|(port, bindings)| {
            let bindings = bindings.map(|list| {
                list.into_iter()
                    .map(|b| PortBinding {
                        host_ip: b.host_ip.unwrap_or_default(),
                        host_port: b.host_port.unwrap_or_default(),
                    })
                    .collect()
            });
            (port, bindings)
        })
        .collect();

    ContainerAttributes {
        id,
        short_id,
        name,
        running: state.running.unwrap_or(false),
        health_status,
        started_at: state.started_at,
        labels,
        port_bindings,
    }
}

fn health_status_from(status: HealthStatusEnum) -> HealthStatus {
    match status {
        HealthStatusEnum::STARTING => HealthStatus::Starting,
        HealthStatusEnum::HEALTHY => HealthStatus::Healthy,
        HealthStatusEnum::UNHEALTHY => HealthStatus::Unhealthy,
        HealthStatusEnum::EMPTY | HealthStatusEnum::NONE => HealthStatus::None,
    }
}

fn cpu_counters(stats: Option<&ContainerCpuStats>) -> Option<CpuCounters> {
    let stats = stats?;
    Some(CpuCounters {
        total_usage: stats.cpu_usage.as_ref()?.total_usage?,
        system_usage: stats.system_cpu_usage?,
    })
}

pub(crate) fn live_stats_from_response(s: &ContainerStatsResponse) -> LiveStats {
    let cpu_stats = s.cpu_stats.as_ref();

    let percpu_count = cpu_stats
        .and_then(|c| c.cpu_usage.as_ref())
        .and_then(|u| u.percpu_usage.as_ref())
        .map(Vec::len)
        .filter(|n| *n > 0);

    let memory = s.memory_stats.as_ref().and_then(|m| {
        Some(MemoryCounters {
            usage: m.usage?,
            limit: m.limit?,
        })
    });

    let networks = s.networks.as_ref().map(|n| {
        n.iter()
            .map(|(iface, v)| {
                (
                    iface.clone(),
                    NetworkCounters {
                        rx_bytes: v.rx_bytes.unwrap_or(0),
                        tx_bytes: v.tx_bytes.unwrap_or(0),
                    },
                )
            })
            .collect::<BTreeMap<_, _>>()
    });

    LiveStats {
        cpu: cpu_counters(cpu_stats),
        precpu: cpu_counters(s.precpu_stats.as_ref()),
        online_cpus: cpu_stats.and_then(|c| c.online_cpus),
        percpu_count,
        memory,
        networks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bollard::models::{
        ContainerConfig, ContainerCpuUsage, ContainerMemoryStats, ContainerNetworkStats,
        ContainerState, Health, NetworkSettings, PortBinding as DockerPortBinding,
    };
    use std::collections::HashMap;

    fn cpu(total: u64, system: u64) -> ContainerCpuStats {
        ContainerCpuStats {
            cpu_usage: Some(ContainerCpuUsage {
                total_usage: Some(total),
                percpu_usage: Some(vec![0, 0]),
                ..Default::default()
            }),
            system_cpu_usage: Some(system),
            online_cpus: Some(4),
            ..Default::default()
        }
    }

    #[test]
    fn inspect_response_is_flattened() {
        let mut ports = HashMap::new();
        ports.insert(
            "3000/tcp".to_string(),
            Some(vec![DockerPortBinding {
                host_ip: Some("127.0.0.1".into()),
                host_port: Some("3000".into()),
            }]),
        );
        ports.insert("443/tcp".to_string(), None);

        let mut labels = HashMap::new();
        labels.insert("com.docker.compose.project".to_string(), "shop".to_string());

        let resp = ContainerInspectResponse {
            id: Some("0123456789abcdef0123".into()),
            name: Some("/shop-web-1".into()),
            state: Some(ContainerState {
                running: Some(true),
                started_at: Some("2024-05-01T10:00:00.123456789Z".into()),
                health: Some(Health {
                    status: Some(HealthStatusEnum::UNHEALTHY),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            config: Some(ContainerConfig {
                labels: Some(labels),
                ..Default::default()
            }),
            network_settings: Some(NetworkSettings {
                ports: Some(ports),
                ..Default::default()
            }),
            ..Default::default()
        };

        let attrs = attributes_from_inspect(resp, "fallback");
        assert_eq!(attrs.short_id, "0123456789ab");
        assert_eq!(attrs.name, "shop-web-1");
        assert!(attrs.running);
        assert_eq!(attrs.health_status, Some(HealthStatus::Unhealthy));
        assert_eq!(
            attrs.labels.get("com.docker.compose.project").map(String::as_str),
            Some("shop")
        );
        let keys: Vec<_> = attrs.port_bindings.keys().cloned().collect();
        assert_eq!(keys, vec!["3000/tcp", "443/tcp"]);
        assert_eq!(attrs.port_bindings["443/tcp"], None);
    }

    #[test]
    fn missing_state_defaults_to_stopped_without_health() {
        let attrs = attributes_from_inspect(ContainerInspectResponse::default(), "abc");
        assert_eq!(attrs.id, "abc");
        assert!(!attrs.running);
        assert_eq!(attrs.health_status, None);
        assert!(attrs.port_bindings.is_empty());
    }

    #[test]
    fn stats_response_keeps_counters() {
        let mut networks = HashMap::new();
        networks.insert(
            "eth0".to_string(),
            ContainerNetworkStats {
                rx_bytes: Some(1000),
                tx_bytes: Some(2000),
                ..Default::default()
            },
        );
        let s = ContainerStatsResponse {
            cpu_stats: Some(cpu(1_500_000_000, 12_000_000_000)),
            precpu_stats: Some(cpu(1_000_000_000, 10_000_000_000)),
            memory_stats: Some(ContainerMemoryStats {
                usage: Some(256 * 1024 * 1024),
                limit: Some(1024 * 1024 * 1024),
                ..Default::default()
            }),
            networks: Some(networks),
            ..Default::default()
        };

        let live = live_stats_from_response(&s);
        assert_eq!(
            live.cpu,
            Some(CpuCounters {
                total_usage: 1_500_000_000,
                system_usage: 12_000_000_000
            })
        );
        assert_eq!(live.online_cpus, Some(4));
        assert_eq!(live.percpu_count, Some(2));
        assert_eq!(live.memory.map(|m| m.limit), Some(1024 * 1024 * 1024));
        assert_eq!(live.networks.unwrap()["eth0"].tx_bytes, 2000);
    }

    #[test]
    fn precpu_without_system_usage_is_absent() {
        let s = ContainerStatsResponse {
            cpu_stats: Some(cpu(10, 20)),
            precpu_stats: Some(ContainerCpuStats {
                cpu_usage: Some(ContainerCpuUsage {
                    total_usage: Some(5),
                    ..Default::default()
                }),
                system_cpu_usage: None,
                ..Default::default()
            }),
            ..Default::default()
        };
        let live = live_stats_from_response(&s);
        assert!(live.cpu.is_some());
        assert!(live.precpu.is_none());
        assert!(live.memory.is_none());
        assert!(live.networks.is_none());
    }
}
