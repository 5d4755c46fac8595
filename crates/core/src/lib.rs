//! Shared vocabulary for the urteil scheduler.
//!
//! Defines the request/result types that flow between the scheduler and its
//! callers, and the [`Evaluator`] capability the scheduler consumes. The
//! evaluator itself (scoring semantics, transport, prompting) lives outside
//! this workspace — the scheduler treats it as an opaque, slow, rate-limited
//! dependency.

pub mod evaluator;
pub mod types;

pub use evaluator::{Evaluator, EvaluatorError};
pub use types::{CacheKey, EvalInput, RequestId, RequestState, ScoreResult};
