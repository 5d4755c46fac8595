//! Passive counters and latency distributions fed by the other components.
//!
//! Nothing here influences scheduling decisions; the collector is read
//! through [`crate::Scheduler::stats`].

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Mutex;

/// Latency samples kept per class.
const LATENCY_RING_CAPACITY: usize = 512;

// ── Latency classes ──────────────────────────────────────────────────

/// How a request was dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LatencyClass {
    /// Deadline below the bypass threshold; dispatched unbatched.
    Critical,
    /// Grouped by the adaptive batcher.
    Batched,
}

// ── Ring buffer ──────────────────────────────────────────────────────

/// Fixed-capacity sample window; the oldest sample is evicted at capacity.
#[derive(Debug, Clone)]
struct SampleRing {
    buf: VecDeque<f64>,
    capacity: usize,
}

impl SampleRing {
    fn new(capacity: usize) -> Self {
        Self {
            buf: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, sample: f64) {
        if self.buf.len() == self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(sample);
    }

    fn summarize(&self) -> LatencySummary {
        if self.buf.is_empty() {
            return LatencySummary::default();
        }
        let mut sorted: Vec<f64> = self.buf.iter().copied().collect();
        sorted.sort_by(|a, b| a.total_cmp(b));
        LatencySummary {
            p50_ms: percentile(&sorted, 0.50),
            p95_ms: percentile(&sorted, 0.95),
            samples: sorted.len(),
        }
    }
}

/// Nearest-rank percentile over a sorted slice.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    let idx = ((sorted.len() - 1) as f64 * q).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

// ── Snapshot types ───────────────────────────────────────────────────

/// Percentile summary of one latency class.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LatencySummary {
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub samples: usize,
}

/// Point-in-time view of the scheduler's counters.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub submitted: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Submissions attached to an already in-flight identical call.
    pub coalesced: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// hits / (hits + misses); 0.0 before any lookup.
    pub cache_hit_rate: f64,
    /// Evaluator calls currently outstanding.
    pub in_flight: usize,
    /// High-water mark of outstanding evaluator calls.
    pub peak_in_flight: usize,
    pub critical_latency: LatencySummary,
    pub batched_latency: LatencySummary,
    pub uptime_secs: f64,
}

// ── Collector ────────────────────────────────────────────────────────

#[derive(Debug)]
struct Inner {
    submitted: u64,
    succeeded: u64,
    failed: u64,
    coalesced: u64,
    cache_hits: u64,
    cache_misses: u64,
    in_flight: usize,
    peak_in_flight: usize,
    critical: SampleRing,
    batched: SampleRing,
}

/// Thread-safe telemetry collector shared by the façade, cache and
/// dispatcher.
#[derive(Debug)]
pub(crate) struct Telemetry {
    inner: Mutex<Inner>,
    start: Instant,
}

impl Telemetry {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                submitted: 0,
                succeeded: 0,
                failed: 0,
                coalesced: 0,
                cache_hits: 0,
                cache_misses: 0,
                in_flight: 0,
                peak_in_flight: 0,
                critical: SampleRing::new(LATENCY_RING_CAPACITY),
                batched: SampleRing::new(LATENCY_RING_CAPACITY),
            }),
            start: Instant::now(),
        }
    }

    pub(crate) async fn record_submitted(&self) {
        self.inner.lock().await.submitted += 1;
    }

    pub(crate) async fn record_cache_hit(&self) {
        self.inner.lock().await.cache_hits += 1;
    }

    pub(crate) async fn record_cache_miss(&self) {
        self.inner.lock().await.cache_misses += 1;
    }

    pub(crate) async fn record_coalesced(&self) {
        self.inner.lock().await.coalesced += 1;
    }

    /// A successful resolution; `latency` is submission-to-result.
    pub(crate) async fn record_success(&self, class: LatencyClass, latency: Duration) {
        let mut inner = self.inner.lock().await;
        inner.succeeded += 1;
        let ms = latency.as_secs_f64() * 1000.0;
        match class {
            LatencyClass::Critical => inner.critical.push(ms),
            LatencyClass::Batched => inner.batched.push(ms),
        }
    }

    pub(crate) async fn record_failure(&self) {
        self.inner.lock().await.failed += 1;
    }

    pub(crate) async fn unit_started(&self) {
        let mut inner = self.inner.lock().await;
        inner.in_flight += 1;
        inner.peak_in_flight = inner.peak_in_flight.max(inner.in_flight);
    }

    pub(crate) async fn unit_finished(&self) {
        let mut inner = self.inner.lock().await;
        inner.in_flight = inner.in_flight.saturating_sub(1);
    }

    pub(crate) async fn snapshot(&self) -> StatsSnapshot {
        let inner = self.inner.lock().await;
        let lookups = inner.cache_hits + inner.cache_misses;
        StatsSnapshot {
            submitted: inner.submitted,
            succeeded: inner.succeeded,
            failed: inner.failed,
            coalesced: inner.coalesced,
            cache_hits: inner.cache_hits,
            cache_misses: inner.cache_misses,
            cache_hit_rate: if lookups == 0 {
                0.0
            } else {
                inner.cache_hits as f64 / lookups as f64
            },
            in_flight: inner.in_flight,
            peak_in_flight: inner.peak_in_flight,
            critical_latency: inner.critical.summarize(),
            batched_latency: inner.batched.summarize(),
            uptime_secs: self.start.elapsed().as_secs_f64(),
        }
    }
}
