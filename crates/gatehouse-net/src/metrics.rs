use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Highest status code tracked by the histogram (exclusive).
const STATUS_SLOTS: usize = 600;

/// How often (in accepted connections) a summary line is logged.
const SUMMARY_EVERY: u64 = 1000;

/// Process-wide, monotonically increasing counters.
///
/// Everything here is a lock-free atomic increment; the status
/// histogram is a fixed slot array indexed by status code. Counters are
/// never reset during the process lifetime and nothing persists across
/// restarts.
pub struct ServerMetrics {
    connections: AtomicU64,
    requests: AtomicU64,
    timeouts: AtomicU64,
    errors: AtomicU64,
    dropped: AtomicU64,
    rate_limited: AtomicU64,
    bad_requests: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    cache_stores: AtomicU64,
    latency_total_us: AtomicU64,
    statuses: Box<[AtomicU64]>,
}

impl Default for ServerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerMetrics {
    pub fn new() -> Self {
        let statuses = (0..STATUS_SLOTS).map(|_| AtomicU64::new(0)).collect();
        Self {
            connections: AtomicU64::new(0),
            requests: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            rate_limited: AtomicU64::new(0),
            bad_requests: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            cache_stores: AtomicU64::new(0),
            latency_total_us: AtomicU64::new(0),
            statuses,
        }
    }

    pub fn inc_connections(&self) {
        self.connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_timeouts(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_errors(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_rate_limited(&self) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_bad_requests(&self) {
        self.bad_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cache_hits(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cache_misses(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cache_stores(&self) {
        self.cache_stores.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a completed request: status histogram and latency.
    /// Every [`SUMMARY_EVERY`] connections, log a summary line.
    pub fn observe_request(&self, status: u16, latency: Duration) {
        if (status as usize) < STATUS_SLOTS {
            self.statuses[status as usize].fetch_add(1, Ordering::Relaxed);
        }
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.latency_total_us
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);

        let conns = self.connections.load(Ordering::Relaxed);
        if conns > 0 && conns % SUMMARY_EVERY == 0 {
            let s = self.snapshot();
            tracing::info!(
                connections = s.connections,
                requests = s.requests,
                timeouts = s.timeouts,
                errors = s.errors,
                dropped = s.dropped,
                rate_limited = s.rate_limited,
                cache_hits = s.cache_hits,
                cache_misses = s.cache_misses,
                avg_latency_us = s.avg_latency_us,
                "metrics summary"
            );
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let requests = self.requests.load(Ordering::Relaxed);
        let latency_total = self.latency_total_us.load(Ordering::Relaxed);
        let statuses: BTreeMap<u16, u64> = self
            .statuses
            .iter()
            .enumerate()
            .filter(|(_, v)| v.load(Ordering::Relaxed) > 0)
            .map(|(code, v)| (code as u16, v.load(Ordering::Relaxed)))
            .collect();

        MetricsSnapshot {
            connections: self.connections.load(Ordering::Relaxed),
            requests,
            timeouts: self.timeouts.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            bad_requests: self.bad_requests.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            cache_stores: self.cache_stores.load(Ordering::Relaxed),
            avg_latency_us: if requests > 0 {
                latency_total / requests
            } else {
                0
            },
            statuses,
        }
    }
}

/// One-shot view of the counters, serializable for a stats endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub connections: u64,
    pub requests: u64,
    pub timeouts: u64,
    pub errors: u64,
    pub dropped: u64,
    pub rate_limited: u64,
    pub bad_requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_stores: u64,
    pub avg_latency_us: u64,
    pub statuses: BTreeMap<u16, u64>,
}
