//! Request and result types shared between the scheduler and its callers.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Identifiers ──────────────────────────────────────────────────────

/// Unique identifier for one submitted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Generate a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Deduplication key derived by the caller from the logical input
/// (payload + prompt + context). Two requests with equal keys are the same
/// work as far as caching and coalescing are concerned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for CacheKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for CacheKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

// ── Evaluator I/O ────────────────────────────────────────────────────

/// One member of a dispatch unit as the evaluator sees it.
///
/// The payload passes through the scheduler untouched.
#[derive(Debug, Clone)]
pub struct EvalInput {
    pub id: RequestId,
    pub cache_key: CacheKey,
    pub payload: Bytes,
}

/// A completed evaluation with its delivery metadata.
#[derive(Debug, Clone)]
pub struct ScoreResult {
    /// Opaque evaluator output.
    pub body: Bytes,
    /// Whether this result was served from the result cache.
    pub cached: bool,
    /// Wall time of the evaluator call that produced the body (zero for
    /// cache hits).
    pub response_time_ms: u64,
    /// When the body was produced.
    pub evaluated_at: DateTime<Utc>,
}

// ── Request lifecycle ────────────────────────────────────────────────

/// Lifecycle of a request inside the scheduler.
///
/// Transitions are monotonic: `Queued → AwaitingDependencies → Eligible →
/// Dispatched → Succeeded | Failed`, never backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    Queued,
    AwaitingDependencies,
    Eligible,
    Dispatched,
    Succeeded,
    Failed,
}

impl RequestState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}
