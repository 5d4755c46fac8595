//! The evaluator capability consumed by the scheduler.

use async_trait::async_trait;
use bytes::Bytes;

use crate::types::EvalInput;

/// A slow, rate-limited remote scoring function.
///
/// The scheduler treats it as opaque: latency is unbounded from its point of
/// view and failures are not retried by the scheduler itself. One call covers
/// a whole dispatch unit and must return exactly one body per input, in
/// order. A count mismatch fails the whole unit with
/// [`EvaluatorError::Protocol`].
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(&self, unit: &[EvalInput]) -> Result<Vec<Bytes>, EvaluatorError>;
}

/// Failure modes of an evaluator call.
///
/// Cloneable because a single unit failure fans out to every member's
/// completion handle.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EvaluatorError {
    /// Transient condition (rate limit, timeout, connection reset). A caller
    /// may resubmit; the scheduler will not.
    #[error("transient evaluator error: {0}")]
    Transient(String),

    /// Permanent rejection (bad payload, authorization, quota exhausted).
    #[error("permanent evaluator error: {0}")]
    Permanent(String),

    /// The evaluator violated its contract (wrong result count, garbage
    /// framing).
    #[error("evaluator protocol error: {0}")]
    Protocol(String),
}
