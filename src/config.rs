//! Runtime configuration, read once from the environment at startup.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

pub const DEFAULT_GROUP_LABEL: &str = "com.docker.compose.project";

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub docker_socket: Option<String>,

    /// Cadence of the background summary refresh.
    pub refresh_interval: Duration,
    /// Lower bound on the sleep between two refresh cycles.
    pub refresh_floor: Duration,
    pub summary_ttl: Duration,
    pub detail_ttl: Duration,
    /// Maximum in-flight inspect/stats queries against the runtime.
    pub stats_concurrency: usize,

    pub group_label: String,
    pub name_separator: char,

    /// Requests per second per client IP; 0 disables rate limiting.
    pub rate_limit_per_second: u64,
    pub rate_limit_burst: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3000".to_string(),
            docker_socket: None,
            refresh_interval: Duration::from_secs(2),
            refresh_floor: Duration::from_millis(100),
            summary_ttl: Duration::from_secs(2),
            detail_ttl: Duration::from_secs(2),
            stats_concurrency: 4,
            group_label: DEFAULT_GROUP_LABEL.to_string(),
            name_separator: '-',
            rate_limit_per_second: 10,
            rate_limit_burst: 20,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            bind_addr: env::var("BIND_ADDR").unwrap_or(defaults.bind_addr),
            docker_socket: env::var("DOCKER_SOCKET").ok().filter(|s| !s.is_empty()),
            refresh_interval: env_millis("STACKWATCH_REFRESH_INTERVAL_MS")
                .unwrap_or(defaults.refresh_interval),
            refresh_floor: env_millis("STACKWATCH_REFRESH_FLOOR_MS")
                .unwrap_or(defaults.refresh_floor),
            summary_ttl: env_millis("STACKWATCH_SUMMARY_TTL_MS").unwrap_or(defaults.summary_ttl),
            detail_ttl: env_millis("STACKWATCH_DETAIL_TTL_MS").unwrap_or(defaults.detail_ttl),
            stats_concurrency: env_parse::<usize>("STACKWATCH_STATS_CONCURRENCY")
                .unwrap_or(defaults.stats_concurrency)
                .max(1),
            group_label: env::var("STACKWATCH_GROUP_LABEL")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.group_label),
            name_separator: env::var("STACKWATCH_NAME_SEPARATOR")
                .ok()
                .and_then(|s| s.chars().next())
                .unwrap_or(defaults.name_separator),
            rate_limit_per_second: env_parse("STACKWATCH_RATE_LIMIT_PER_SEC")
                .unwrap_or(defaults.rate_limit_per_second),
            rate_limit_burst: env_parse("STACKWATCH_RATE_LIMIT_BURST")
                .unwrap_or(defaults.rate_limit_burst),
        }
    }
}

/// Parse an env var, warning (not failing) when it is set but malformed.
fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    let raw = env::var(name).ok()?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(var = name, value = %raw, "ignoring malformed environment value");
            None
        }
    }
}

fn env_millis(name: &str) -> Option<Duration> {
    env_parse::<u64>(name).map(Duration::from_millis)
}
