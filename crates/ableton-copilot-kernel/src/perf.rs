//! Per-key latency metrics for tool calls.

use std::collections::BTreeMap;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;

/// Calls slower than this log a warning unless configured otherwise.
pub const DEFAULT_SLOW_THRESHOLD: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy)]
struct Metric {
    count: u64,
    total_ms: f64,
    min_ms: f64,
    max_ms: f64,
}

/// Aggregated view of one metric key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSummary {
    pub count: u64,
    pub avg_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
}

pub struct PerformanceMonitor {
    metrics: Mutex<BTreeMap<String, Metric>>,
    slow_threshold: Duration,
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_SLOW_THRESHOLD)
    }
}

impl PerformanceMonitor {
    pub fn new(slow_threshold: Duration) -> Self {
        Self {
            metrics: Mutex::new(BTreeMap::new()),
            slow_threshold,
        }
    }

    pub fn slow_threshold(&self) -> Duration {
        self.slow_threshold
    }

    pub fn record(&self, key: &str, elapsed: Duration) {
        let ms = elapsed.as_secs_f64() * 1000.0;
        {
            let mut metrics = self.metrics.lock();
            metrics
                .entry(key.to_string())
                .and_modify(|m| {
                    m.count += 1;
                    m.total_ms += ms;
                    m.min_ms = m.min_ms.min(ms);
                    m.max_ms = m.max_ms.max(ms);
                })
                .or_insert(Metric {
                    count: 1,
                    total_ms: ms,
                    min_ms: ms,
                    max_ms: ms,
                });
        }
        if elapsed > self.slow_threshold {
            tracing::warn!(metric = key, elapsed_ms = ms, "slow operation detected");
        }
    }

    pub fn summary(&self) -> BTreeMap<String, MetricSummary> {
        self.metrics
            .lock()
            .iter()
            .map(|(key, m)| {
                (
                    key.clone(),
                    MetricSummary {
                        count: m.count,
                        avg_ms: m.total_ms / m.count as f64,
                        min_ms: m.min_ms,
                        max_ms: m.max_ms,
                    },
                )
            })
            .collect()
    }

    pub fn get(&self, key: &str) -> Option<MetricSummary> {
        self.summary().remove(key)
    }

    /// Write the current summary to the log.
    pub fn log_summary(&self) {
        for (key, s) in self.summary() {
            tracing::info!(
                metric = %key,
                count = s.count,
                avg_ms = s.avg_ms,
                min_ms = s.min_ms,
                max_ms = s.max_ms,
                "performance metric"
            );
        }
    }

    pub fn reset(&self) {
        self.metrics.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregates() {
        let perf = PerformanceMonitor::default();
        perf.record("tool:get_song_info", Duration::from_millis(10));
        perf.record("tool:get_song_info", Duration::from_millis(30));
        perf.record("tool:get_song_info", Duration::from_millis(20));

        let s = perf.get("tool:get_song_info").unwrap();
        assert_eq!(s.count, 3);
        assert!((s.avg_ms - 20.0).abs() < 1e-9);
        assert!((s.min_ms - 10.0).abs() < 1e-9);
        assert!((s.max_ms - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_keys_are_independent() {
        let perf = PerformanceMonitor::default();
        perf.record("tool:a", Duration::from_millis(1));
        perf.record("tool:a:error", Duration::from_millis(2));
        assert_eq!(perf.summary().len(), 2);
        assert_eq!(perf.get("tool:a").unwrap().count, 1);
    }

    #[test]
    fn test_reset_clears() {
        let perf = PerformanceMonitor::new(Duration::from_millis(1));
        perf.record("tool:slow", Duration::from_millis(5));
        perf.reset();
        assert!(perf.summary().is_empty());
    }
}
