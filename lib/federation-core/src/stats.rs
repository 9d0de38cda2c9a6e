//! The pluggable statistics sink (§2.2): "pluggable" only means something once at least one real
//! implementation exists, so this module ships a no-op and a `tracing`-backed one alongside the
//! trait, the same way the rest of this crate treats observability as ambient rather than bolted
//! on at the edges.

use crate::query::QueryStats;
use std::sync::atomic::Ordering;
use std::time::Duration;

/// A point-in-time read of one query's counters, taken once the query finishes (§3 QueryInfo).
#[derive(Debug, Clone, Copy)]
pub struct QueryStatsSnapshot {
    pub remote_requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub rows_produced: u64,
    pub elapsed: Duration,
}

impl QueryStatsSnapshot {
    pub fn capture(stats: &QueryStats, elapsed: Duration) -> Self {
        Self {
            remote_requests: stats.remote_requests.load(Ordering::Relaxed),
            cache_hits: stats.cache_hits.load(Ordering::Relaxed),
            cache_misses: stats.cache_misses.load(Ordering::Relaxed),
            rows_produced: stats.rows_produced.load(Ordering::Relaxed),
            elapsed,
        }
    }
}

/// Receives lifecycle events for every query the federation manager runs (§2.2, `enable_monitoring`
/// in the engine config). Every method has a no-op default, so an implementation only needs to
/// override the events it cares about.
pub trait StatisticsSink: Send + Sync {
    fn query_started(&self, _query_id: u64) {}
    fn query_completed(&self, _query_id: u64, _stats: &QueryStatsSnapshot) {}
    fn query_failed(&self, _query_id: u64, _error: &str) {}
}

/// The default sink: `enable_monitoring = false` wires this in so statistics collection costs
/// nothing beyond the atomic counters every query already carries.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStatisticsSink;

impl StatisticsSink for NoopStatisticsSink {}

/// Emits one `tracing` event per query lifecycle transition (§2.1 Logging). Used when
/// `enable_monitoring = true`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingStatisticsSink;

impl StatisticsSink for TracingStatisticsSink {
    fn query_started(&self, query_id: u64) {
        tracing::info!(query_id, "query started");
    }

    fn query_completed(&self, query_id: u64, stats: &QueryStatsSnapshot) {
        tracing::info!(
            query_id,
            remote_requests = stats.remote_requests,
            cache_hits = stats.cache_hits,
            cache_misses = stats.cache_misses,
            rows_produced = stats.rows_produced,
            elapsed_ms = stats.elapsed.as_millis() as u64,
            "query completed"
        );
    }

    fn query_failed(&self, query_id: u64, error: &str) {
        tracing::warn!(query_id, error, "query failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_sink_accepts_every_event_without_panicking() {
        let sink = NoopStatisticsSink;
        sink.query_started(1);
        sink.query_completed(1, &QueryStatsSnapshot::capture(&QueryStats::default(), Duration::ZERO));
        sink.query_failed(1, "boom");
    }

    #[test]
    fn snapshot_reads_every_counter() {
        let stats = QueryStats::default();
        stats.record_remote_request();
        stats.record_cache_hit();
        stats.record_cache_miss();
        stats.record_rows(5);
        let snapshot = QueryStatsSnapshot::capture(&stats, Duration::from_millis(10));
        assert_eq!(snapshot.remote_requests, 1);
        assert_eq!(snapshot.cache_hits, 1);
        assert_eq!(snapshot.cache_misses, 1);
        assert_eq!(snapshot.rows_produced, 5);
    }
}
