use std::{
    collections::VecDeque,
    fmt::Write as _,
    sync::Arc,
    time::{Duration, Instant},
};

use dashmap::DashMap;

/// Keep at most this many seconds of samples in each deque.
const MAX_WINDOW: Duration = Duration::from_secs(60);

pub const SUMMARY_REFRESH: &str = "summary_refresh";
pub const SUMMARY_REFRESH_FAILURES: &str = "summary_refresh_failures";
pub const DETAIL_BUILD: &str = "detail_build";
pub const DETAIL_BUILD_FAILURES: &str = "detail_build_failures";
pub const DETAIL_CACHE_HITS: &str = "detail_cache_hits";
pub const DETAIL_CACHE_MISSES: &str = "detail_cache_misses";
pub const DETAIL_NOT_FOUND: &str = "detail_not_found";

/// Rolling-window timings plus monotonic counters for the snapshot engine.
#[derive(Clone, Default)]
pub struct MetricRegistry {
    /// operation → deque of (timestamp, duration in seconds)
    pub timings: Arc<DashMap<&'static str, VecDeque<(Instant, f64)>>>,
    pub counters: Arc<DashMap<&'static str, u64>>,
}

impl MetricRegistry {
    /* ───────────── public API ───────────── */

    pub fn record_duration(&self, op: &'static str, elapsed: Duration) {
        let mut guard = self.timings.entry(op).or_default();
        Self::insert_sample(guard.value_mut(), elapsed.as_secs_f64());
    }

    pub fn incr(&self, counter: &'static str) {
        *self.counters.entry(counter).or_default() += 1;
    }

    pub fn counter(&self, counter: &str) -> u64 {
        self.counters.get(counter).map(|v| *v).unwrap_or(0)
    }

    pub fn avg(&self, op: &str, window: Duration) -> Option<f64> {
        self.timings.get(op).and_then(|q| {
            let now = Instant::now();
            let mut sum = 0.0;
            let mut n = 0;
            for &(ts, v) in q.iter().rev() {
                if now.duration_since(ts) > window {
                    break;
                }
                sum += v;
                n += 1;
            }
            (n > 0).then(|| sum / n as f64)
        })
    }

    pub fn max(&self, op: &str, window: Duration) -> Option<f64> {
        self.timings.get(op).and_then(|q| {
            let now = Instant::now();
            q.iter()
                .rev()
                .take_while(|&&(ts, _)| now.duration_since(ts) <= window)
                .map(|&(_, v)| v)
                .filter(|v| !v.is_nan())
                .max_by(|a, b| a.total_cmp(b))
        })
    }

    /// Plain-text exposition:
    /// `stackwatch_summary_refresh_seconds_avg60 0.012`
    /// `stackwatch_detail_cache_hits_total 42`
    pub fn render(&self, window: Duration) -> String {
        let mut ops: Vec<&'static str> = self.timings.iter().map(|e| *e.key()).collect();
        ops.sort_unstable();
        let mut counters: Vec<(&'static str, u64)> =
            self.counters.iter().map(|e| (*e.key(), *e.value())).collect();
        counters.sort_unstable();

        let secs = window.as_secs();
        let mut out = String::new();
        for op in ops {
            if let Some(avg) = self.avg(op, window) {
                let _ = writeln!(out, "stackwatch_{op}_seconds_avg{secs} {avg}");
            }
            if let Some(max) = self.max(op, window) {
                let _ = writeln!(out, "stackwatch_{op}_seconds_max{secs} {max}");
            }
        }
        for (name, value) in counters {
            let _ = writeln!(out, "stackwatch_{name}_total {value}");
        }
        out
    }

    /* ──────────── internals ──────────── */

    fn insert_sample(q: &mut VecDeque<(Instant, f64)>, value: f64) {
        let now = Instant::now();
        q.push_back((now, value));
        while let Some((ts, _)) = q.front() {
            if now.duration_since(*ts) > MAX_WINDOW {
                q.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        let m = MetricRegistry::default();
        assert_eq!(m.counter(DETAIL_CACHE_HITS), 0);
        m.incr(DETAIL_CACHE_HITS);
        m.incr(DETAIL_CACHE_HITS);
        assert_eq!(m.counter(DETAIL_CACHE_HITS), 2);
    }

    #[test]
    fn timings_average_and_max() {
        let m = MetricRegistry::default();
        m.record_duration(DETAIL_BUILD, Duration::from_millis(100));
        m.record_duration(DETAIL_BUILD, Duration::from_millis(300));
        let avg = m.avg(DETAIL_BUILD, Duration::from_secs(10)).unwrap();
        assert!((avg - 0.2).abs() < 1e-9);
        let max = m.max(DETAIL_BUILD, Duration::from_secs(10)).unwrap();
        assert!((max - 0.3).abs() < 1e-9);
        assert!(m.avg(SUMMARY_REFRESH, Duration::from_secs(10)).is_none());
    }

    #[test]
    fn render_lists_timings_and_counters() {
        let m = MetricRegistry::default();
        m.record_duration(SUMMARY_REFRESH, Duration::from_millis(5));
        m.incr(SUMMARY_REFRESH_FAILURES);
        let text = m.render(Duration::from_secs(60));
        assert!(text.contains("stackwatch_summary_refresh_seconds_avg60 "));
        assert!(text.contains("stackwatch_summary_refresh_seconds_max60 "));
        assert!(text.contains("stackwatch_summary_refresh_failures_total 1"));
    }
}
