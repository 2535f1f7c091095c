//! Classification and display formatting for raw runtime records.
//!
//! All functions here are pure. Anything unparseable degrades to the
//! `"N/A"` / `0` sentinels instead of returning an error.

use std::collections::HashMap;

use chrono::{DateTime, Datelike, Utc};
use lazy_static::lazy_static;
use regex::Regex;

use crate::config::DEFAULT_GROUP_LABEL;
use crate::inspector::{CpuCounters, HealthStatus, NetworkCounters, PortMap};
use crate::model::{HealthClass, UNAVAILABLE};

const KIB: f64 = 1024.0;
const MIB: f64 = 1024.0 * 1024.0;
const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

lazy_static! {
    /// More than six fractional digits before the zone designator.
    static ref EXCESS_FRACTION: Regex = Regex::new(r"(\.\d{6})\d+(Z|[+-]\d{2}:\d{2})$").unwrap();
    static ref MEM_STRING: Regex = Regex::new(r"^\s*([0-9]+(?:\.[0-9]+)?)\s*(KiB|MiB|GiB|TiB)\s*$").unwrap();
}

/// Unhealthy wins over running; anything not running is stopped.
pub fn classify_state(running: bool, health: Option<HealthStatus>) -> HealthClass {
    if health == Some(HealthStatus::Unhealthy) {
        return HealthClass::Unhealthy;
    }
    if running {
        HealthClass::Running
    } else {
        HealthClass::Stopped
    }
}

/// How containers are assigned to stacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grouping {
    pub label: String,
    pub separator: char,
}

impl Default for Grouping {
    fn default() -> Self {
        Self {
            label: DEFAULT_GROUP_LABEL.to_string(),
            separator: '-',
        }
    }
}

impl Grouping {
    pub fn new(label: impl Into<String>, separator: char) -> Self {
        Self {
            label: label.into(),
            separator,
        }
    }

    /// A non-empty group label wins; otherwise the name up to the first
    /// separator; otherwise the whole name.
    pub fn group_id(&self, labels: &HashMap<String, String>, name: &str) -> String {
        if let Some(project) = labels.get(&self.label).filter(|p| !p.is_empty()) {
            return project.clone();
        }
        match name.split_once(self.separator) {
            Some((prefix, _)) if !prefix.is_empty() => prefix.to_string(),
            _ => name.to_string(),
        }
    }
}

/// [`Grouping::group_id`] with the compose project label and `-`.
pub fn group_id(labels: &HashMap<String, String>, name: &str) -> String {
    Grouping::default().group_id(labels, name)
}

/// Parse an engine start timestamp. Fractions finer than microseconds are
/// truncated first. The engine's zero time (never started) yields `None`.
pub fn parse_started_at(raw: &str) -> Option<DateTime<Utc>> {
    let cleaned = EXCESS_FRACTION.replace(raw.trim(), "$1$2");
    let parsed = DateTime::parse_from_rfc3339(&cleaned).ok()?;
    let utc = parsed.with_timezone(&Utc);
    (utc.year() > 1).then_some(utc)
}

/// Whole seconds since `started_at`, clamped at zero; `0` if unparseable.
pub fn uptime_seconds_at(started_at: &str, now: DateTime<Utc>) -> i64 {
    match parse_started_at(started_at) {
        Some(start) => (now - start).num_seconds().max(0),
        None => 0,
    }
}

/// Compact uptime since `started_at`; `"N/A"` if unparseable.
pub fn uptime_human_at(started_at: &str, now: DateTime<Utc>) -> String {
    match parse_started_at(started_at) {
        Some(start) => format_duration((now - start).num_seconds().max(0)),
        None => UNAVAILABLE.to_string(),
    }
}

pub fn format_uptime_at(started_at: &str, now: DateTime<Utc>) -> (i64, String) {
    (
        uptime_seconds_at(started_at, now),
        uptime_human_at(started_at, now),
    )
}

pub fn format_uptime(started_at: &str) -> (i64, String) {
    format_uptime_at(started_at, Utc::now())
}

/// Whole hours once at least an hour has elapsed, else whole minutes.
/// 7322 → `"2h"`, 720 → `"12m"`.
pub fn format_duration(seconds: i64) -> String {
    let hours = seconds / 3600;
    let mins = (seconds % 3600) / 60;
    if hours > 0 {
        format!("{hours}h")
    } else {
        format!("{mins}m")
    }
}

/// `"5.783GiB"` at or above 1 GiB, else `"41.27MiB"`.
pub fn format_bytes(n: u64) -> String {
    let n = n as f64;
    if n >= GIB {
        format!("{:.3}GiB", n / GIB)
    } else {
        format!("{:.2}MiB", n / MIB)
    }
}

/// Coarser form for aggregated totals: `"1.00GiB"` / `"12MiB"`; zero is
/// `"0MiB"`.
pub fn format_bytes_coarse(n: u64) -> String {
    if n == 0 {
        return "0MiB".to_string();
    }
    let n = n as f64;
    if n >= GIB {
        format!("{:.2}GiB", n / GIB)
    } else {
        format!("{:.0}MiB", n / MIB)
    }
}

/// Inverse of [`format_bytes`] for one side of a `"used / limit"` pair.
pub fn parse_mem_string(s: &str) -> Option<u64> {
    let caps = MEM_STRING.captures(s)?;
    let value: f64 = caps[1].parse().ok()?;
    let factor = match &caps[2] {
        "KiB" => KIB,
        "MiB" => MIB,
        "GiB" => GIB,
        "TiB" => GIB * KIB,
        _ => return None,
    };
    Some((value * factor) as u64)
}

/// `"41.27MiB / 5.783GiB"` → `("41.27MiB", "5.783GiB")`.
pub fn split_mem_pair(s: &str) -> (String, String) {
    let parts: Vec<&str> = s.split('/').map(str::trim).collect();
    match parts.as_slice() {
        [used, limit] => (used.to_string(), limit.to_string()),
        [used] => (used.to_string(), UNAVAILABLE.to_string()),
        _ => (UNAVAILABLE.to_string(), UNAVAILABLE.to_string()),
    }
}

/// Used and limit bytes of a memory pair, each `None` when unparseable.
pub fn parse_mem_pair(s: &str) -> (Option<u64>, Option<u64>) {
    if s == UNAVAILABLE {
        return (None, None);
    }
    let (used, limit) = split_mem_pair(s);
    (parse_mem_string(&used), parse_mem_string(&limit))
}

pub fn format_mem_pair(usage: u64, limit: u64) -> String {
    format!("{} / {}", format_bytes(usage), format_bytes(limit))
}

pub fn format_percent(x: f64) -> String {
    format!("{x:.2}%")
}

/// `"12.50%"` → `12.5`; anything without a trailing `%` is `None`.
pub fn parse_percent(s: &str) -> Option<f64> {
    s.strip_suffix('%')?.trim().parse().ok()
}

/// Online CPU field when reported, else the per-core entry count, else 1.
pub fn online_cpu_count(online_cpus: Option<u32>, percpu_count: Option<usize>) -> u32 {
    online_cpus
        .filter(|n| *n > 0)
        .or_else(|| percpu_count.filter(|n| *n > 0).map(|n| n as u32))
        .unwrap_or(1)
}

/// `(cpu_delta / sys_delta) * online_cpus * 100`, or `0.0` unless both
/// deltas are positive.
pub fn cpu_percent(current: CpuCounters, previous: CpuCounters, online_cpus: u32) -> f64 {
    let cpu_delta = current.total_usage as f64 - previous.total_usage as f64;
    let sys_delta = current.system_usage as f64 - previous.system_usage as f64;
    if sys_delta > 0.0 && cpu_delta > 0.0 {
        (cpu_delta / sys_delta) * online_cpus as f64 * 100.0
    } else {
        0.0
    }
}

/// `"3.83MB"` at or above 1 MiB, else `"512.00kB"`.
pub fn format_net(n: u64) -> String {
    let n = n as f64;
    if n >= MIB {
        format!("{:.2}MB", n / MIB)
    } else {
        format!("{:.2}kB", n / KIB)
    }
}

/// `"<rx> / <tx>"` summed over all interfaces.
pub fn format_net_pair<'a, I>(interfaces: I) -> String
where
    I: IntoIterator<Item = &'a NetworkCounters>,
{
    let (rx, tx) = interfaces
        .into_iter()
        .fold((0u64, 0u64), |(rx, tx), n| {
            (rx.saturating_add(n.rx_bytes), tx.saturating_add(n.tx_bytes))
        });
    format!("{} / {}", format_net(rx), format_net(tx))
}

/// One entry per exposed-but-unpublished port (`"443/tcp"`) and one per
/// host binding (`"3000/tcp -> 127.0.0.1:3000"`).
///
/// With no ports at all this returns `["N/A"]`, which cannot be told apart
/// from a single port literally named `N/A`. Dashboards depend on that
/// sentinel, so it is kept.
pub fn format_ports(ports: &PortMap) -> Vec<String> {
    let mut out = Vec::new();
    for (container_port, bindings) in ports {
        match bindings {
            None => out.push(container_port.clone()),
            Some(list) => {
                for b in list {
                    out.push(format!(
                        "{} -> {}:{}",
                        container_port, b.host_ip, b.host_port
                    ));
                }
            }
        }
    }
    if out.is_empty() {
        out.push(UNAVAILABLE.to_string());
    }
    out
}
