//! Request scheduler / batch dispatcher for a slow remote scoring service.
//!
//! Coordinates calls to a rate-limited external evaluator on behalf of many
//! concurrent callers: result caching with TTL, in-flight call coalescing,
//! dependency-graph gating with eager failure propagation, latency-budget
//! aware adaptive batching, and concurrency-bounded dispatch.
//!
//! Callers see a single façade, [`Scheduler`]: submit work, await the
//! returned [`Completion`] handle, read [`StatsSnapshot`]s, shut down with or
//! without draining. Everything else — the cache, the dependency tracker,
//! the classifier, the dispatch loop — is internal.

mod batcher;
mod cache;
mod classify;
mod deps;
mod dispatch;
mod request;

pub mod completion;
pub mod config;
pub mod error;
pub mod scheduler;
pub mod telemetry;

pub use completion::Completion;
pub use config::SchedulerConfig;
pub use error::SchedulerError;
pub use scheduler::{Scheduler, Submission};
pub use telemetry::{LatencyClass, LatencySummary, StatsSnapshot};

pub use urteil_core::{
    CacheKey, EvalInput, Evaluator, EvaluatorError, RequestId, RequestState, ScoreResult,
};
