//! The scheduler façade — the only component callers see.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex, Notify, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use urteil_core::{CacheKey, Evaluator, RequestId};

use crate::cache::{Admission, ResultCache};
use crate::completion::Completion;
use crate::config::SchedulerConfig;
use crate::deps::{DependencyTracker, RegisterOutcome};
use crate::dispatch::{Dispatcher, ShutdownMode};
use crate::error::SchedulerError;
use crate::request::Request;
use crate::telemetry::{StatsSnapshot, Telemetry};

/// Receipt for one submission.
///
/// `submitted_at` is exposed so callers can implement their own hard
/// cancellation policy on top; the scheduler itself never aborts an
/// in-flight evaluator call.
#[derive(Debug, Clone)]
pub struct Submission {
    pub id: RequestId,
    pub submitted_at: DateTime<Utc>,
    /// True when this submission attached to an identical in-flight call
    /// instead of creating new work.
    pub coalesced: bool,
    pub handle: Completion,
}

/// Accepts requests, serves cached results, coalesces duplicates, gates on
/// dependencies and hands eligible work to the dispatch loop.
pub struct Scheduler {
    cache: Arc<ResultCache>,
    tracker: Arc<DependencyTracker>,
    telemetry: Arc<Telemetry>,
    wake: Arc<Notify>,
    shutdown_tx: watch::Sender<ShutdownMode>,
    accepting: AtomicBool,
    runner: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    /// Validate the config, wire the components and spawn the dispatch
    /// loop. Must be called from within a tokio runtime.
    pub fn new(
        evaluator: Arc<dyn Evaluator>,
        cfg: SchedulerConfig,
    ) -> Result<Self, SchedulerError> {
        cfg.validate()?;

        let telemetry = Arc::new(Telemetry::new());
        let cache = Arc::new(ResultCache::new(cfg.cache_ttl(), telemetry.clone()));
        let tracker = Arc::new(DependencyTracker::new());
        let wake = Arc::new(Notify::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(ShutdownMode::Running);

        let dispatcher = Dispatcher {
            semaphore: Arc::new(Semaphore::new(cfg.max_concurrency)),
            cfg,
            evaluator,
            cache: cache.clone(),
            tracker: tracker.clone(),
            telemetry: telemetry.clone(),
            wake: wake.clone(),
            shutdown: shutdown_rx,
        };
        let runner = tokio::spawn(dispatcher.run());

        Ok(Self {
            cache,
            tracker,
            telemetry,
            wake,
            shutdown_tx,
            accepting: AtomicBool::new(true),
            runner: Mutex::new(Some(runner)),
        })
    }

    /// Submit one unit of work.
    ///
    /// A cache hit resolves the returned handle immediately. A miss with an
    /// identical in-flight call attaches to that call's handle. Otherwise a
    /// new request is registered against its dependencies and dispatched
    /// once they have all succeeded.
    ///
    /// Rejections — unknown dependency ids, cycles, shutdown — are returned
    /// synchronously; everything later arrives through the handle.
    pub async fn submit(
        &self,
        payload: Bytes,
        cache_key: impl Into<CacheKey>,
        dependencies: &[RequestId],
        deadline_ms: Option<u64>,
    ) -> Result<Submission, SchedulerError> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(SchedulerError::Shutdown);
        }

        let key: CacheKey = cache_key.into();
        let id = RequestId::new();
        let submitted_at = Utc::now();
        self.telemetry.record_submitted().await;

        let completion = Completion::new();
        match self.cache.admit(&key, &completion).await {
            Admission::Hit(mut result) => {
                debug!(cache_key = %key, "cache hit");
                result.cached = true;
                completion.resolve(Ok(result));
                Ok(Submission {
                    id,
                    submitted_at,
                    coalesced: false,
                    handle: completion,
                })
            }
            Admission::Joined(existing) => {
                debug!(cache_key = %key, "coalesced onto in-flight call");
                Ok(Submission {
                    id,
                    submitted_at,
                    coalesced: true,
                    handle: existing,
                })
            }
            Admission::Admitted => {
                let request = Request {
                    id,
                    cache_key: key.clone(),
                    payload,
                    deadline_ms,
                    enqueued_at: Instant::now(),
                    completion: completion.clone(),
                };
                match self.tracker.register(request, dependencies).await {
                    Ok(RegisterOutcome::Eligible) | Ok(RegisterOutcome::Pending) => {
                        self.wake.notify_one();
                        Ok(Submission {
                            id,
                            submitted_at,
                            coalesced: false,
                            handle: completion,
                        })
                    }
                    Ok(RegisterOutcome::DependencyFailed { failed }) => {
                        self.cache.abandon(&key).await;
                        self.telemetry.record_failure().await;
                        completion.resolve(Err(SchedulerError::DependencyFailed { failed }));
                        Ok(Submission {
                            id,
                            submitted_at,
                            coalesced: false,
                            handle: completion,
                        })
                    }
                    Err(e) => {
                        // A duplicate may have joined this handle between
                        // admit and abandon; it must still observe an outcome.
                        completion.resolve(Err(e.clone()));
                        self.cache.abandon(&key).await;
                        Err(e)
                    }
                }
            }
        }
    }

    /// Read-only telemetry snapshot.
    pub async fn stats(&self) -> StatsSnapshot {
        self.telemetry.snapshot().await
    }

    /// Stop accepting submissions and shut the dispatch loop down.
    ///
    /// With `drain` every admitted request finishes first; without it,
    /// everything not yet dispatched fails with
    /// [`SchedulerError::Shutdown`] while in-flight evaluator calls run to
    /// completion so no handle is left unresolved.
    pub async fn shutdown(&self, drain: bool) {
        self.accepting.store(false, Ordering::SeqCst);
        let mode = if drain {
            ShutdownMode::Drain
        } else {
            ShutdownMode::Abort
        };
        info!(drain, "scheduler shutting down");
        let _ = self.shutdown_tx.send(mode);
        self.wake.notify_one();

        let handle = self.runner.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}
