//! Single-resolution completion handles.

use std::sync::Arc;

use tokio::sync::watch;
use urteil_core::ScoreResult;

use crate::error::SchedulerError;

/// What a caller eventually observes for one request.
pub type EvalResult = Result<ScoreResult, SchedulerError>;

/// A single-resolution handle through which a caller observes a request's
/// outcome.
///
/// Resolved exactly once; later writes are ignored. Cloneable so coalesced
/// submissions can share one handle, and every clone observes the same value.
#[derive(Clone)]
pub struct Completion {
    tx: Arc<watch::Sender<Option<EvalResult>>>,
}

impl Completion {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Resolve the handle. Returns `false` if it was already resolved, in
    /// which case the new value is discarded.
    pub(crate) fn resolve(&self, result: EvalResult) -> bool {
        let mut result = Some(result);
        self.tx.send_if_modified(|slot| {
            if slot.is_none() {
                *slot = result.take();
                true
            } else {
                false
            }
        })
    }

    /// Wait until the handle is resolved and return the outcome.
    pub async fn wait(&self) -> EvalResult {
        let mut rx = self.tx.subscribe();
        // Bound to a local so the watch guard drops before `rx` does.
        let resolved = rx.wait_for(|slot| slot.is_some()).await;
        match resolved {
            Ok(slot) => slot.clone().unwrap_or(Err(SchedulerError::Shutdown)),
            // Unreachable while `self` holds the sender; treated as shutdown.
            Err(_) => Err(SchedulerError::Shutdown),
        }
    }

    /// Non-blocking probe.
    pub fn try_get(&self) -> Option<EvalResult> {
        self.tx.borrow().clone()
    }

    pub fn is_resolved(&self) -> bool {
        self.tx.borrow().is_some()
    }
}

impl std::fmt::Debug for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion")
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use chrono::Utc;

    fn ok_result(body: &str) -> EvalResult {
        Ok(ScoreResult {
            body: Bytes::from(body.to_string()),
            cached: false,
            response_time_ms: 1,
            evaluated_at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn resolve_then_wait() {
        let c = Completion::new();
        assert!(c.resolve(ok_result("a")));
        let out = c.wait().await.unwrap();
        assert_eq!(out.body, Bytes::from("a"));
    }

    #[tokio::test]
    async fn wait_then_resolve() {
        let c = Completion::new();
        let waiter = c.clone();
        let handle = tokio::spawn(async move { waiter.wait().await });
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(c.resolve(ok_result("b")));
        let out = handle.await.unwrap().unwrap();
        assert_eq!(out.body, Bytes::from("b"));
    }

    #[tokio::test]
    async fn second_resolve_is_ignored() {
        let c = Completion::new();
        assert!(c.resolve(ok_result("first")));
        assert!(!c.resolve(ok_result("second")));
        let out = c.wait().await.unwrap();
        assert_eq!(out.body, Bytes::from("first"));
    }

    #[tokio::test]
    async fn all_clones_observe_same_value() {
        let c = Completion::new();
        let clones: Vec<_> = (0..4).map(|_| c.clone()).collect();
        c.resolve(Err(SchedulerError::Shutdown));
        for clone in clones {
            assert!(matches!(clone.wait().await, Err(SchedulerError::Shutdown)));
        }
    }

    #[test]
    fn try_get_before_resolution() {
        let c = Completion::new();
        assert!(c.try_get().is_none());
        assert!(!c.is_resolved());
    }
}
