//! Fan-out of one change event to every dependent edge.
//!
//! One task per edge runs in a [`JoinSet`]. Each task is its own error
//! boundary: a panic is caught and becomes a `Failed` outcome for that edge's
//! slot, and siblings keep running.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{error, info, warn, Instrument};
use uuid::Uuid;

use crate::actuator::{ActionReport, Actuator};
use crate::domain::{
    validate_change_event, ChangeEvent, DependencyEdge, EdgeKind, RippleError, TriageOutcome,
    TriageStage, TriageStatus, ValidationError,
};
use crate::graph::{DependencySummary, RelationshipGraph};
use crate::metrics::METRICS;
use crate::obs;
use crate::pipeline::TriagePipeline;

/// Ingress acknowledgement status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckStatus {
    Accepted,
    NoRelationships,
}

/// Returned to the ingress caller before any triage runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchAck {
    pub status: AckStatus,
    pub source_repo: String,
    pub consumers_scheduled: Vec<String>,
    pub derivatives_scheduled: Vec<String>,
    pub total_dependents: usize,
}

impl DispatchAck {
    fn new(source_repo: &str, edges: &[DependencyEdge]) -> Self {
        let targets = |kind: EdgeKind| -> Vec<String> {
            edges
                .iter()
                .filter(|e| e.kind() == kind)
                .map(|e| e.target_repo.clone())
                .collect()
        };
        Self {
            status: if edges.is_empty() {
                AckStatus::NoRelationships
            } else {
                AckStatus::Accepted
            },
            source_repo: source_repo.to_string(),
            consumers_scheduled: targets(EdgeKind::Consumer),
            derivatives_scheduled: targets(EdgeKind::Derivative),
            total_dependents: edges.len(),
        }
    }
}

/// Result of a synchronous dispatch: outcomes plus what the actuator did.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchReport {
    pub dispatch_id: String,
    pub outcomes: Vec<TriageOutcome>,
    pub actions: Vec<ActionReport>,
}

/// How background work ended at shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    pub finished: usize,
    pub abandoned: usize,
}

/// The parts of the orchestrator a background task needs.
#[derive(Clone)]
struct Engine {
    graph: Arc<RelationshipGraph>,
    pipeline: TriagePipeline,
    actuator: Actuator,
}

impl Engine {
    async fn fan_out(&self, event: Arc<ChangeEvent>, edges: Vec<DependencyEdge>) -> Vec<TriageOutcome> {
        let mut join_set = JoinSet::new();
        for (idx, edge) in edges.iter().cloned().enumerate() {
            let pipeline = self.pipeline.clone();
            let event = Arc::clone(&event);
            join_set.spawn(
                async move {
                    let result = AssertUnwindSafe(pipeline.run(&event, &edge))
                        .catch_unwind()
                        .await;
                    let outcome = result.unwrap_or_else(|payload| {
                        let reason = panic_message(payload.as_ref());
                        error!(target_repo = %edge.target_repo, reason = %reason, "triage task panicked");
                        failed_outcome(&event, &edge, format!("triage task panicked: {reason}"))
                    });
                    (idx, outcome)
                }
                .in_current_span(),
            );
        }

        // Slots left empty belong to tasks whose join failed.
        let mut slots: Vec<Option<TriageOutcome>> = vec![None; edges.len()];
        let mut join_error = None;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((idx, outcome)) => slots[idx] = Some(outcome),
                Err(e) => {
                    warn!(error = %e, "triage task join error");
                    join_error = Some(e.to_string());
                }
            }
        }

        let outcomes: Vec<TriageOutcome> = slots
            .into_iter()
            .zip(edges.iter())
            .map(|(slot, edge)| {
                slot.unwrap_or_else(|| {
                    let detail = join_error.as_deref().unwrap_or("task lost");
                    failed_outcome(&event, edge, format!("triage task join error: {detail}"))
                })
            })
            .collect();
        for outcome in &outcomes {
            METRICS.record_outcome(outcome.terminal_stage());
        }
        outcomes
    }

    async fn act(&self, event: &ChangeEvent, outcomes: &[TriageOutcome]) -> Vec<ActionReport> {
        join_all(outcomes.iter().map(|o| self.actuator.handle(event, o))).await
    }

    async fn run(
        &self,
        dispatch_id: String,
        event: Arc<ChangeEvent>,
        edges: Vec<DependencyEdge>,
    ) -> DispatchReport {
        let span = obs::dispatch_span(&dispatch_id, &event.source_repo, &event.commit_sha);
        async {
            let outcomes = self.fan_out(Arc::clone(&event), edges).await;
            let actions = self.act(&event, &outcomes).await;
            info!(
                outcomes = outcomes.len(),
                completed = outcomes.iter().filter(|o| o.is_completed()).count(),
                failed = outcomes.iter().filter(|o| o.is_failed()).count(),
                "dispatch finished"
            );
            DispatchReport {
                dispatch_id: dispatch_id.clone(),
                outcomes,
                actions,
            }
        }
        .instrument(span)
        .await
    }
}

fn failed_outcome(event: &ChangeEvent, edge: &DependencyEdge, reason: String) -> TriageOutcome {
    TriageOutcome {
        source_repo: event.source_repo.clone(),
        commit_sha: event.commit_sha.clone(),
        edge: edge.clone(),
        status: TriageStatus::Failed { reason },
        stages: vec![TriageStage::Pending, TriageStage::Failed],
        finished_at: Utc::now(),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Receives change events and drives triage for every dependent.
pub struct Orchestrator {
    engine: Engine,
    background: Mutex<JoinSet<()>>,
}

impl Orchestrator {
    pub fn new(graph: Arc<RelationshipGraph>, pipeline: TriagePipeline, actuator: Actuator) -> Self {
        Self {
            engine: Engine {
                graph,
                pipeline,
                actuator,
            },
            background: Mutex::new(JoinSet::new()),
        }
    }

    pub fn graph(&self) -> &Arc<RelationshipGraph> {
        &self.engine.graph
    }

    /// Validate and look up edges inside the dispatch span. The guard is
    /// dropped before any await.
    fn resolve(
        &self,
        dispatch_id: &str,
        event: &ChangeEvent,
    ) -> Result<Vec<DependencyEdge>, ValidationError> {
        let _span = obs::DispatchSpan::enter(dispatch_id, &event.source_repo, &event.commit_sha);
        if let Err(e) = validate_change_event(event) {
            obs::emit_dispatch_rejected(&event.source_repo, &e);
            return Err(e);
        }
        let edges = self.engine.graph.edges_for(&event.source_repo);
        METRICS.inc_dispatches();
        obs::emit_dispatch_accepted(&event.source_repo, &event.commit_sha, edges.len());
        Ok(edges)
    }

    /// Run triage for every edge of the event's source and wait for all
    /// outcomes and actions. Zero edges yields an empty report.
    pub async fn dispatch(&self, event: ChangeEvent) -> Result<DispatchReport, ValidationError> {
        let dispatch_id = Uuid::new_v4().to_string();
        let edges = self.resolve(&dispatch_id, &event)?;
        Ok(self.engine.run(dispatch_id, Arc::new(event), edges).await)
    }

    /// Validate and schedule triage in the background, returning at once.
    ///
    /// Must be called from within a tokio runtime.
    pub fn accept(&self, event: ChangeEvent) -> Result<DispatchAck, ValidationError> {
        let dispatch_id = Uuid::new_v4().to_string();
        let edges = self.resolve(&dispatch_id, &event)?;
        let ack = DispatchAck::new(&event.source_repo, &edges);
        if edges.is_empty() {
            return Ok(ack);
        }

        let engine = self.engine.clone();
        let mut background = self
            .background
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        while background.try_join_next().is_some() {}
        background.spawn(async move {
            engine.run(dispatch_id, Arc::new(event), edges).await;
        });
        Ok(ack)
    }

    /// Number of background dispatches not yet reaped.
    pub fn in_flight(&self) -> usize {
        self.background
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Wait up to `grace` for background dispatches, then detach the rest.
    ///
    /// Detached runs are not aborted, so an issue or notification already in
    /// progress is never cut off half way.
    pub async fn shutdown(&self, grace: Duration) -> ShutdownReport {
        let mut pending = std::mem::take(
            &mut *self
                .background
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );
        let mut report = ShutdownReport::default();
        let drained = tokio::time::timeout(grace, async {
            while pending.join_next().await.is_some() {
                report.finished += 1;
            }
        })
        .await;
        if drained.is_err() {
            report.abandoned = pending.len();
            warn!(
                abandoned = report.abandoned,
                grace_secs = grace.as_secs(),
                "shutdown grace elapsed, detaching in-flight dispatches"
            );
            pending.detach_all();
        }
        METRICS.flush();
        report
    }

    /// Run the pipeline for one configured edge without acting on the result.
    pub async fn analyze_edge(
        &self,
        event: ChangeEvent,
        target_repo: &str,
        kind: EdgeKind,
    ) -> Result<TriageOutcome, RippleError> {
        validate_change_event(&event)?;
        let snapshot = self.engine.graph.snapshot();
        let edge = snapshot
            .edge(&event.source_repo, target_repo, kind)
            .cloned()
            .ok_or_else(|| RippleError::RelationshipNotFound {
                source_repo: event.source_repo.clone(),
                target_repo: target_repo.to_string(),
                kind,
            })?;
        Ok(self.engine.pipeline.run(&event, &edge).await)
    }

    pub fn dependencies(&self, repo: &str, include_metadata: bool) -> DependencySummary {
        self.engine.graph.dependencies(repo, include_metadata)
    }
}

impl Drop for Orchestrator {
    /// Accepted runs outlive the orchestrator; dropping a `JoinSet` would abort them.
    fn drop(&mut self) {
        let background = self
            .background
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !background.is_empty() {
            warn!(
                in_flight = background.len(),
                "orchestrator dropped without shutdown, detaching background dispatches"
            );
        }
        background.detach_all();
    }
}
