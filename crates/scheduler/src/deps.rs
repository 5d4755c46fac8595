//! Dependency tracking and eligibility.
//!
//! The graph is data, not object references: an arena of pending requests
//! keyed by id, with adjacency stored as id sets. Cycle detection and
//! transitive failure propagation walk ids, so there is no cyclic ownership
//! to manage.

use std::collections::{HashMap, HashSet, VecDeque};

use tokio::sync::Mutex;
use urteil_core::{RequestId, RequestState};

use crate::error::SchedulerError;
use crate::request::Request;

/// Result of registering a request.
#[derive(Debug)]
pub(crate) enum RegisterOutcome {
    /// No unresolved dependencies; queued for dispatch.
    Eligible,
    /// Waiting on unresolved dependencies.
    Pending,
    /// A dependency already failed; the request fails without dispatch.
    DependencyFailed { failed: RequestId },
}

/// A request failed by transitive propagation, returned to the dispatcher so
/// it can resolve the handle and release the cache slot.
#[derive(Debug)]
pub(crate) struct FailedDependent {
    pub request: Request,
    /// The ancestor whose failure doomed this request.
    pub failed: RequestId,
}

struct PendingEntry {
    request: Request,
    state: RequestState,
    unresolved: usize,
    dependencies: HashSet<RequestId>,
}

struct Inner {
    pending: HashMap<RequestId, PendingEntry>,
    /// dependency id → ids of requests waiting on it.
    dependents: HashMap<RequestId, Vec<RequestId>>,
    /// Terminal states of finished requests, kept for gating later arrivals.
    terminal: HashMap<RequestId, RequestState>,
    eligible: VecDeque<RequestId>,
}

pub(crate) struct DependencyTracker {
    inner: Mutex<Inner>,
}

impl DependencyTracker {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                pending: HashMap::new(),
                dependents: HashMap::new(),
                terminal: HashMap::new(),
                eligible: VecDeque::new(),
            }),
        }
    }

    /// Register a request with its dependency edges.
    ///
    /// Rejects unknown dependency ids and cycles before admission. A
    /// dependency that already failed dooms the request immediately — no
    /// dispatch is ever attempted for it.
    pub(crate) async fn register(
        &self,
        request: Request,
        dependencies: &[RequestId],
    ) -> Result<RegisterOutcome, SchedulerError> {
        let mut inner = self.inner.lock().await;
        let id = request.id;

        for dep in dependencies {
            if !inner.pending.contains_key(dep) && !inner.terminal.contains_key(dep) {
                return Err(SchedulerError::UnknownDependency(*dep));
            }
        }

        detect_cycle(&inner, id, dependencies)?;

        if let Some(failed) = dependencies
            .iter()
            .find(|dep| inner.terminal.get(dep) == Some(&RequestState::Failed))
        {
            inner.terminal.insert(id, RequestState::Failed);
            return Ok(RegisterOutcome::DependencyFailed { failed: *failed });
        }

        let unresolved: Vec<RequestId> = dependencies
            .iter()
            .filter(|dep| inner.pending.contains_key(dep))
            .copied()
            .collect();

        for dep in &unresolved {
            inner.dependents.entry(*dep).or_default().push(id);
        }

        let entry = PendingEntry {
            request,
            state: if unresolved.is_empty() {
                RequestState::Eligible
            } else {
                RequestState::AwaitingDependencies
            },
            unresolved: unresolved.len(),
            dependencies: dependencies.iter().copied().collect(),
        };
        let eligible = entry.state == RequestState::Eligible;
        inner.pending.insert(id, entry);
        if eligible {
            inner.eligible.push_back(id);
            Ok(RegisterOutcome::Eligible)
        } else {
            Ok(RegisterOutcome::Pending)
        }
    }

    /// Drain the eligible queue; drained requests move to `Dispatched`.
    pub(crate) async fn poll_eligible(&self) -> Vec<Request> {
        let mut inner = self.inner.lock().await;
        let ids: Vec<RequestId> = inner.eligible.drain(..).collect();
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(entry) = inner.pending.get_mut(&id) {
                entry.state = RequestState::Dispatched;
                out.push(entry.request.clone());
            }
        }
        out
    }

    /// Record a terminal state observed by the dispatcher.
    ///
    /// Success makes dependents with no remaining unresolved dependencies
    /// eligible. Failure eagerly fails every direct and transitive dependent
    /// in one pass; the doomed requests are returned for resolution.
    pub(crate) async fn on_terminal(
        &self,
        id: RequestId,
        succeeded: bool,
    ) -> Vec<FailedDependent> {
        let mut inner = self.inner.lock().await;
        inner.pending.remove(&id);
        let state = if succeeded {
            RequestState::Succeeded
        } else {
            RequestState::Failed
        };
        inner.terminal.insert(id, state);

        let mut doomed = Vec::new();
        if succeeded {
            for dep_id in inner.dependents.remove(&id).unwrap_or_default() {
                if let Some(entry) = inner.pending.get_mut(&dep_id) {
                    if entry.state == RequestState::AwaitingDependencies {
                        entry.unresolved = entry.unresolved.saturating_sub(1);
                        if entry.unresolved == 0 {
                            entry.state = RequestState::Eligible;
                            inner.eligible.push_back(dep_id);
                        }
                    }
                }
            }
        } else {
            let mut stack = inner.dependents.remove(&id).unwrap_or_default();
            while let Some(dep_id) = stack.pop() {
                if let Some(entry) = inner.pending.remove(&dep_id) {
                    inner.terminal.insert(dep_id, RequestState::Failed);
                    doomed.push(FailedDependent {
                        request: entry.request,
                        failed: id,
                    });
                    stack.extend(inner.dependents.remove(&dep_id).unwrap_or_default());
                }
            }
            // Doomed requests may have been queued as eligible already.
            let terminal = &inner.terminal;
            let retained: VecDeque<RequestId> = inner
                .eligible
                .iter()
                .filter(|e| !terminal.contains_key(e))
                .copied()
                .collect();
            inner.eligible = retained;
        }
        doomed
    }

    /// Nothing pending, eligible or dispatched.
    pub(crate) async fn is_idle(&self) -> bool {
        let inner = self.inner.lock().await;
        inner.pending.is_empty() && inner.eligible.is_empty()
    }

    /// Remove and return every request that has not been dispatched yet
    /// (shutdown without drain). Dispatched requests stay; their units will
    /// resolve them.
    pub(crate) async fn fail_all_undispatched(&self) -> Vec<Request> {
        let mut inner = self.inner.lock().await;
        inner.eligible.clear();
        let ids: Vec<RequestId> = inner
            .pending
            .iter()
            .filter(|(_, e)| e.state != RequestState::Dispatched)
            .map(|(id, _)| *id)
            .collect();
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(entry) = inner.pending.remove(&id) {
                inner.terminal.insert(id, RequestState::Failed);
                out.push(entry.request);
            }
        }
        out
    }
}

/// Walk dependency edges from each declared dependency; reaching the new
/// request's own id means the registration would close a cycle.
fn detect_cycle(
    inner: &Inner,
    new_id: RequestId,
    dependencies: &[RequestId],
) -> Result<(), SchedulerError> {
    let mut visited: HashSet<RequestId> = HashSet::new();
    let mut stack: Vec<RequestId> = dependencies.to_vec();
    while let Some(node) = stack.pop() {
        if node == new_id {
            return Err(SchedulerError::CyclicDependency(format!(
                "request {new_id} reachable from its own dependencies"
            )));
        }
        if !visited.insert(node) {
            continue;
        }
        if let Some(entry) = inner.pending.get(&node) {
            stack.extend(entry.dependencies.iter().copied());
        }
    }
    Ok(())
}
