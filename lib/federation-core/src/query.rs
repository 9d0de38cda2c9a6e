use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Per-query context shared by every operator and scheduled task evaluating one query (§3
/// QueryInfo). Lives for exactly one evaluation: created by
/// [`crate::manager::FederationManager::prepare_query`], destroyed when the result stream is
/// dropped. Every worker task holds an [`Arc`] back-reference so it can observe abort without a
/// round-trip through the manager.
pub struct QueryInfo {
    id: u64,
    start_time: Instant,
    max_execution_time: Duration,
    aborted: AtomicBool,
    abort_reason: std::sync::Mutex<Option<AbortReason>>,
    stats: QueryStats,
}

/// Why a query stopped before its operators ran to completion (§7 Cancellation /
/// Evaluation error).
#[derive(Debug, Clone)]
pub enum AbortReason {
    Timeout,
    UserCancelled,
    TaskFailed { endpoint: Option<crate::model::EndpointId>, message: String },
}

static NEXT_QUERY_ID: AtomicU64 = AtomicU64::new(1);

impl QueryInfo {
    pub fn new(max_execution_time: Duration) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_QUERY_ID.fetch_add(1, Ordering::Relaxed),
            start_time: Instant::now(),
            max_execution_time,
            aborted: AtomicBool::new(false),
            abort_reason: std::sync::Mutex::new(None),
            stats: QueryStats::default(),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn max_execution_time(&self) -> Duration {
        self.max_execution_time
    }

    /// Time remaining in the query's budget, saturating at zero rather than going negative —
    /// every blocking wait in this crate (§5) derives its deadline from this value.
    pub fn remaining_time(&self) -> Duration {
        self.max_execution_time
            .saturating_sub(self.start_time.elapsed())
    }

    pub fn is_expired(&self) -> bool {
        self.start_time.elapsed() >= self.max_execution_time
    }

    /// Wall-clock time since the query started (§2.2 `QueryStatsSnapshot`).
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    /// Sets the abort flag. Idempotent: only the first caller's reason is retained, matching §7
    /// "the [control] records the first error" semantics.
    pub fn abort(&self, reason: AbortReason) {
        if self.aborted.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut slot = self.abort_reason.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *slot = Some(reason);
    }

    pub fn abort_reason(&self) -> Option<AbortReason> {
        self.abort_reason
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    pub fn stats(&self) -> &QueryStats {
        &self.stats
    }
}

/// Counters surfaced to the pluggable statistics sink (§2.2, out of scope for the algorithmic
/// core but cheap enough to keep inline rather than threading callbacks through every operator).
#[derive(Debug, Default)]
pub struct QueryStats {
    pub remote_requests: AtomicU64,
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,
    pub rows_produced: AtomicU64,
}

impl QueryStats {
    pub fn record_remote_request(&self) {
        self.remote_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rows(&self, count: u64) {
        self.rows_produced.fetch_add(count, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonic() {
        let a = QueryInfo::new(Duration::from_secs(1));
        let b = QueryInfo::new(Duration::from_secs(1));
        assert!(b.id() > a.id());
    }

    #[test]
    fn abort_is_sticky_to_first_reason() {
        let q = QueryInfo::new(Duration::from_secs(1));
        q.abort(AbortReason::Timeout);
        q.abort(AbortReason::UserCancelled);
        assert!(q.is_aborted());
        assert!(matches!(q.abort_reason(), Some(AbortReason::Timeout)));
    }

    #[test]
    fn remaining_time_saturates_at_zero() {
        let q = QueryInfo::new(Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(q.remaining_time(), Duration::ZERO);
        assert!(q.is_expired());
    }
}
