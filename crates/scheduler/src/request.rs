//! The internal unit of work.

use std::time::Instant;

use bytes::Bytes;
use urteil_core::{CacheKey, EvalInput, RequestId};

use crate::completion::Completion;

/// One admitted request flowing through the tracker and dispatcher.
///
/// Cheap to clone: the payload is reference-counted and the completion
/// handle is shared.
#[derive(Debug, Clone)]
pub(crate) struct Request {
    pub id: RequestId,
    pub cache_key: CacheKey,
    pub payload: Bytes,
    /// Caller-declared maximum acceptable latency; `None` batches freely.
    pub deadline_ms: Option<u64>,
    pub enqueued_at: Instant,
    pub completion: Completion,
}

impl Request {
    pub(crate) fn eval_input(&self) -> EvalInput {
        EvalInput {
            id: self.id,
            cache_key: self.cache_key.clone(),
            payload: self.payload.clone(),
        }
    }
}
