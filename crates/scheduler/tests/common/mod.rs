//! Shared test support: an instrumented evaluator stub and config helpers.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Mutex;

use urteil_scheduler::{EvalInput, Evaluator, EvaluatorError, SchedulerConfig};

/// Evaluator stub with fixed latency, injectable failures and peak
/// concurrency instrumentation.
pub struct StubEvaluator {
    latency: Duration,
    fail_keys: HashSet<String>,
    fail_first: AtomicUsize,
    wrong_arity: bool,
    current: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
    items: AtomicUsize,
    seen: Mutex<Vec<String>>,
}

impl StubEvaluator {
    pub fn new(latency: Duration) -> Arc<Self> {
        Arc::new(Self::build(latency))
    }

    /// Fails any unit containing one of the given cache keys.
    pub fn failing_on(latency: Duration, keys: &[&str]) -> Arc<Self> {
        let mut stub = Self::build(latency);
        stub.fail_keys = keys.iter().map(|k| k.to_string()).collect();
        Arc::new(stub)
    }

    /// Fails the first `n` calls, then succeeds.
    pub fn failing_first(latency: Duration, n: usize) -> Arc<Self> {
        let mut stub = Self::build(latency);
        stub.fail_first = AtomicUsize::new(n);
        Arc::new(stub)
    }

    /// Returns the wrong number of bodies for every unit.
    pub fn with_wrong_arity(latency: Duration) -> Arc<Self> {
        let mut stub = Self::build(latency);
        stub.wrong_arity = true;
        Arc::new(stub)
    }

    fn build(latency: Duration) -> Self {
        Self {
            latency,
            fail_keys: HashSet::new(),
            fail_first: AtomicUsize::new(0),
            wrong_arity: false,
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            items: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// High-water mark of concurrent `evaluate` invocations.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Total `evaluate` invocations.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Total items across all units.
    pub fn item_count(&self) -> usize {
        self.items.load(Ordering::SeqCst)
    }

    /// Cache keys in the order units were dispatched.
    pub async fn seen_keys(&self) -> Vec<String> {
        self.seen.lock().await.clone()
    }
}

#[async_trait]
impl Evaluator for StubEvaluator {
    async fn evaluate(&self, unit: &[EvalInput]) -> Result<Vec<Bytes>, EvaluatorError> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.items.fetch_add(unit.len(), Ordering::SeqCst);
        {
            let mut seen = self.seen.lock().await;
            seen.extend(unit.iter().map(|i| i.cache_key.to_string()));
        }

        tokio::time::sleep(self.latency).await;
        self.current.fetch_sub(1, Ordering::SeqCst);

        let fail_injected = self
            .fail_first
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail_injected
            || unit
                .iter()
                .any(|i| self.fail_keys.contains(i.cache_key.as_str()))
        {
            return Err(EvaluatorError::Transient("injected failure".into()));
        }
        if self.wrong_arity {
            return Ok(Vec::new());
        }
        Ok(unit
            .iter()
            .map(|i| Bytes::from(format!("scored:{}", i.cache_key)))
            .collect())
    }
}

/// Config with fast housekeeping for tests; override fields as needed.
pub fn fast_config() -> SchedulerConfig {
    SchedulerConfig {
        dispatch_tick_ms: 2,
        batch_max_wait_ms: 20,
        ..Default::default()
    }
}

/// Best-effort tracing init for debugging test runs (`RUST_LOG=debug`).
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
