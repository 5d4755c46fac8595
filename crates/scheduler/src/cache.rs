//! Result cache with TTL expiry and in-flight call deduplication.
//!
//! One mutex covers both the entry map and the in-flight table so that
//! lookup, coalescing and ownership registration are atomic per key: two
//! concurrent submissions with the same key can never both become the owner
//! of an evaluator call.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use urteil_core::{CacheKey, ScoreResult};

use crate::completion::Completion;
use crate::telemetry::Telemetry;

/// Outcome of admitting a key.
#[derive(Debug)]
pub(crate) enum Admission {
    /// A live cache entry exists; no new work.
    Hit(ScoreResult),
    /// An identical call is in flight; attach to its handle.
    Joined(Completion),
    /// The caller is now the owner of this key's evaluator call.
    Admitted,
}

struct CacheEntry {
    result: ScoreResult,
    inserted_at: Instant,
}

struct Inner {
    entries: HashMap<CacheKey, CacheEntry>,
    in_flight: HashMap<CacheKey, Completion>,
}

pub(crate) struct ResultCache {
    inner: Mutex<Inner>,
    ttl: Duration,
    telemetry: Arc<Telemetry>,
}

impl ResultCache {
    pub(crate) fn new(ttl: Duration, telemetry: Arc<Telemetry>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                in_flight: HashMap::new(),
            }),
            ttl,
            telemetry,
        }
    }

    /// Atomic lookup-or-join-or-own for one key.
    ///
    /// Expired entries are pruned here (lazy TTL). On `Admitted` the given
    /// handle is registered as the in-flight call for the key and must later
    /// be released via [`store`](Self::store) or [`abandon`](Self::abandon).
    pub(crate) async fn admit(&self, key: &CacheKey, owner: &Completion) -> Admission {
        let admission = {
            let mut inner = self.inner.lock().await;
            let expired =
                matches!(inner.entries.get(key), Some(e) if e.inserted_at.elapsed() >= self.ttl);
            if expired {
                inner.entries.remove(key);
            }
            if let Some(entry) = inner.entries.get(key) {
                Admission::Hit(entry.result.clone())
            } else if let Some(existing) = inner.in_flight.get(key) {
                Admission::Joined(existing.clone())
            } else {
                inner.in_flight.insert(key.clone(), owner.clone());
                Admission::Admitted
            }
        };
        match &admission {
            Admission::Hit(_) => self.telemetry.record_cache_hit().await,
            Admission::Joined(_) => self.telemetry.record_coalesced().await,
            Admission::Admitted => self.telemetry.record_cache_miss().await,
        }
        admission
    }

    /// Store a successful result and release the in-flight slot.
    pub(crate) async fn store(&self, key: &CacheKey, result: ScoreResult) {
        let mut inner = self.inner.lock().await;
        inner.entries.insert(
            key.clone(),
            CacheEntry {
                result,
                inserted_at: Instant::now(),
            },
        );
        inner.in_flight.remove(key);
    }

    /// Release the in-flight slot without storing. Failed calls never
    /// populate the cache, so a later identical submission retries.
    pub(crate) async fn abandon(&self, key: &CacheKey) {
        self.inner.lock().await.in_flight.remove(key);
    }

    #[cfg(test)]
    async fn entry_count(&self) -> usize {
        self.inner.lock().await.entries.len()
    }
}
