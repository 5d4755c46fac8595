//! The concurrency-bounded dispatch loop.
//!
//! An explicit state machine, not a callback chain: the loop wakes on new
//! eligible work, a housekeeping tick, unit completion or a shutdown-mode
//! change, then drains the dependency tracker, splits critical from
//! batchable work, and spawns dispatch units. Each unit is one evaluator
//! call guarded by one semaphore permit, so outstanding calls never exceed
//! `max_concurrency`.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::{watch, Notify, Semaphore};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use urteil_core::{EvalInput, Evaluator, EvaluatorError, ScoreResult};

use crate::batcher::AdaptiveBatcher;
use crate::cache::ResultCache;
use crate::classify;
use crate::config::SchedulerConfig;
use crate::deps::{DependencyTracker, FailedDependent};
use crate::error::SchedulerError;
use crate::request::Request;
use crate::telemetry::{LatencyClass, Telemetry};

/// Lifecycle signal from the façade to the run loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ShutdownMode {
    Running,
    /// Finish all admitted work, then stop.
    Drain,
    /// Fail everything not yet dispatched, let in-flight units finish,
    /// then stop.
    Abort,
}

pub(crate) struct Dispatcher {
    pub(crate) cfg: SchedulerConfig,
    pub(crate) evaluator: Arc<dyn Evaluator>,
    pub(crate) cache: Arc<ResultCache>,
    pub(crate) tracker: Arc<DependencyTracker>,
    pub(crate) telemetry: Arc<Telemetry>,
    pub(crate) semaphore: Arc<Semaphore>,
    pub(crate) wake: Arc<Notify>,
    pub(crate) shutdown: watch::Receiver<ShutdownMode>,
}

impl Dispatcher {
    /// Run until shutdown. Every admitted request's handle is resolved
    /// before this returns.
    pub(crate) async fn run(mut self) {
        let mut batcher = AdaptiveBatcher::new(self.cfg.batch_max_wait());
        let mut units: JoinSet<()> = JoinSet::new();
        let mut tick = tokio::time::interval(self.cfg.dispatch_tick());
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(max_concurrency = self.cfg.max_concurrency, "dispatcher started");

        loop {
            tokio::select! {
                _ = self.wake.notified() => {}
                _ = tick.tick() => {}
                Some(_) = units.join_next(), if !units.is_empty() => {}
                changed = self.shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }

            // Copy the mode out; the watch guard must not be held across
            // the awaits below.
            let mode = *self.shutdown.borrow();
            match mode {
                ShutdownMode::Running => {
                    self.cycle(&mut batcher, &mut units, false).await;
                }
                ShutdownMode::Drain => {
                    self.cycle(&mut batcher, &mut units, true).await;
                    if batcher.is_empty() && units.is_empty() && self.tracker.is_idle().await {
                        break;
                    }
                }
                ShutdownMode::Abort => {
                    self.abort_undispatched(&mut batcher).await;
                    if units.is_empty() {
                        break;
                    }
                }
            }
        }

        // Stragglers still resolve their handles.
        while units.join_next().await.is_some() {}
        info!("dispatcher stopped");
    }

    /// One scheduling pass: drain eligible work, bypass batching for
    /// critical requests, group the rest. `force` flushes partial batches
    /// regardless of size or linger (drain shutdown).
    async fn cycle(&self, batcher: &mut AdaptiveBatcher, units: &mut JoinSet<()>, force: bool) {
        let drained = self.tracker.poll_eligible().await;
        if !drained.is_empty() {
            debug!(count = drained.len(), "drained eligible requests");
        }

        let mut batchable = Vec::new();
        for req in drained {
            if classify::is_critical(req.deadline_ms, &self.cfg) {
                self.spawn_unit(units, vec![req], LatencyClass::Critical);
            } else {
                batchable.push(req);
            }
        }
        batcher.push(batchable);

        loop {
            let size = classify::suggested_batch_size(batcher.tightest_deadline_ms(), &self.cfg);
            if !(batcher.should_flush(size) || (force && !batcher.is_empty())) {
                break;
            }
            let chunk = batcher.flush_chunk(size);
            if chunk.is_empty() {
                break;
            }
            debug!(size = chunk.len(), buffered = batcher.len(), "flushing batch");
            self.spawn_unit(units, chunk, LatencyClass::Batched);
        }
    }

    fn spawn_unit(&self, units: &mut JoinSet<()>, unit: Vec<Request>, class: LatencyClass) {
        let evaluator = self.evaluator.clone();
        let cache = self.cache.clone();
        let tracker = self.tracker.clone();
        let telemetry = self.telemetry.clone();
        let semaphore = self.semaphore.clone();
        let wake = self.wake.clone();
        units.spawn(async move {
            run_unit(unit, class, evaluator, cache, tracker, telemetry, semaphore).await;
            // A finished unit may have made dependents eligible.
            wake.notify_one();
        });
    }

    /// Fail everything that has not been handed to a unit yet
    /// (shutdown without drain).
    async fn abort_undispatched(&self, batcher: &mut AdaptiveBatcher) {
        let pending = self.tracker.fail_all_undispatched().await;
        let buffered = batcher.drain_all();
        if pending.is_empty() && buffered.is_empty() {
            return;
        }
        info!(
            pending = pending.len(),
            buffered = buffered.len(),
            "failing undispatched requests"
        );
        for req in buffered {
            // Buffered requests already counted as dispatched in the
            // tracker; record their terminal state explicitly.
            let doomed = self.tracker.on_terminal(req.id, false).await;
            resolve_doomed(doomed, &self.cache, &self.telemetry).await;
            self.cache.abandon(&req.cache_key).await;
            req.completion.resolve(Err(SchedulerError::Shutdown));
            self.telemetry.record_failure().await;
        }
        for req in pending {
            self.cache.abandon(&req.cache_key).await;
            req.completion.resolve(Err(SchedulerError::Shutdown));
            self.telemetry.record_failure().await;
        }
    }
}

/// Execute one dispatch unit: one semaphore permit, one evaluator call,
/// per-member resolution and terminal bookkeeping.
async fn run_unit(
    unit: Vec<Request>,
    class: LatencyClass,
    evaluator: Arc<dyn Evaluator>,
    cache: Arc<ResultCache>,
    tracker: Arc<DependencyTracker>,
    telemetry: Arc<Telemetry>,
    semaphore: Arc<Semaphore>,
) {
    // The permit is the concurrency bound: acquired before the call,
    // released on every exit path when it drops.
    let _permit = match semaphore.acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => {
            fail_unit(&unit, SchedulerError::Shutdown, &cache, &tracker, &telemetry).await;
            return;
        }
    };

    telemetry.unit_started().await;
    let inputs: Vec<EvalInput> = unit.iter().map(Request::eval_input).collect();
    debug!(size = unit.len(), class = ?class, "dispatching unit");
    let started = Instant::now();
    let outcome = evaluator.evaluate(&inputs).await;
    let response_time_ms = started.elapsed().as_millis() as u64;

    match outcome {
        Ok(bodies) if bodies.len() == unit.len() => {
            for (req, body) in unit.iter().zip(bodies) {
                let result = ScoreResult {
                    body,
                    cached: false,
                    response_time_ms,
                    evaluated_at: Utc::now(),
                };
                cache.store(&req.cache_key, result.clone()).await;
                req.completion.resolve(Ok(result));
                telemetry
                    .record_success(class, req.enqueued_at.elapsed())
                    .await;
                let doomed = tracker.on_terminal(req.id, true).await;
                resolve_doomed(doomed, &cache, &telemetry).await;
            }
        }
        Ok(bodies) => {
            let err = EvaluatorError::Protocol(format!(
                "expected {} results, got {}",
                unit.len(),
                bodies.len()
            ));
            warn!(error = %err, "evaluator violated unit arity");
            fail_unit(
                &unit,
                SchedulerError::Evaluator(err),
                &cache,
                &tracker,
                &telemetry,
            )
            .await;
        }
        Err(err) => {
            warn!(error = %err, size = unit.len(), "evaluator call failed");
            fail_unit(
                &unit,
                SchedulerError::Evaluator(err),
                &cache,
                &tracker,
                &telemetry,
            )
            .await;
        }
    }
    telemetry.unit_finished().await;
}

/// Fail every member of a unit with the same error and propagate through
/// the dependency graph.
async fn fail_unit(
    unit: &[Request],
    err: SchedulerError,
    cache: &ResultCache,
    tracker: &DependencyTracker,
    telemetry: &Telemetry,
) {
    for req in unit {
        cache.abandon(&req.cache_key).await;
        req.completion.resolve(Err(err.clone()));
        telemetry.record_failure().await;
        let doomed = tracker.on_terminal(req.id, false).await;
        resolve_doomed(doomed, cache, telemetry).await;
    }
}

/// Resolve requests failed by transitive dependency propagation.
async fn resolve_doomed(doomed: Vec<FailedDependent>, cache: &ResultCache, telemetry: &Telemetry) {
    for dep in doomed {
        cache.abandon(&dep.request.cache_key).await;
        dep.request
            .completion
            .resolve(Err(SchedulerError::DependencyFailed { failed: dep.failed }));
        telemetry.record_failure().await;
    }
}
