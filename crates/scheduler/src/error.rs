use thiserror::Error;
use urteil_core::{EvaluatorError, RequestId};

/// Errors surfaced by the scheduler, either synchronously from `submit` or
/// through a request's completion handle.
///
/// Cloneable: one evaluator failure fans out to every member of the failed
/// dispatch unit and to every transitive dependent.
#[derive(Debug, Clone, Error)]
pub enum SchedulerError {
    #[error("cyclic dependency: {0}")]
    CyclicDependency(String),

    #[error("unknown dependency: {0}")]
    UnknownDependency(RequestId),

    #[error("dependency {failed} failed")]
    DependencyFailed { failed: RequestId },

    #[error("evaluator error: {0}")]
    Evaluator(#[from] EvaluatorError),

    #[error("scheduler is shutting down")]
    Shutdown,

    #[error("config error: {0}")]
    Config(String),

    #[error("config parse error: {0}")]
    ConfigParse(String),

    #[error("config I/O error: {0}")]
    ConfigIo(String),
}
