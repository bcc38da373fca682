//! Per-edge triage pipeline.
//!
//! `Pending → Filtering → (Skipped | Fetching) → Classifying → (Completed | Failed)`
//!
//! Stages run strictly in order. Fetching never fails the pipeline, and there
//! are no retries: an oracle error is a `Failed` outcome.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{instrument, warn};

use crate::context::ContextFetcher;
use crate::domain::{
    ChangeEvent, DependencyEdge, TriageOutcome, TriageStage, TriageStatus,
};
use crate::obs;
use crate::oracle::ImpactOracle;
use crate::policy::apply_urgency_override;
use crate::relevance;

/// Records visited stages for one edge.
struct StageTrail<'a> {
    edge: &'a DependencyEdge,
    stages: Vec<TriageStage>,
}

impl<'a> StageTrail<'a> {
    fn new(edge: &'a DependencyEdge) -> Self {
        let mut trail = Self {
            edge,
            stages: Vec::with_capacity(5),
        };
        trail.enter(TriageStage::Pending);
        trail
    }

    fn enter(&mut self, stage: TriageStage) {
        obs::emit_stage(&self.edge.target_repo, self.edge.kind(), stage);
        self.stages.push(stage);
    }

    fn finish(mut self, event: &ChangeEvent, status: TriageStatus) -> TriageOutcome {
        let terminal = match &status {
            TriageStatus::Completed { .. } => TriageStage::Completed,
            TriageStatus::Failed { .. } => TriageStage::Failed,
            TriageStatus::Skipped { .. } => TriageStage::Skipped,
        };
        self.enter(terminal);
        TriageOutcome {
            source_repo: event.source_repo.clone(),
            commit_sha: event.commit_sha.clone(),
            edge: self.edge.clone(),
            status,
            stages: self.stages,
            finished_at: Utc::now(),
        }
    }
}

/// Composes relevance, context fetch and oracle for one edge.
#[derive(Clone)]
pub struct TriagePipeline {
    fetcher: ContextFetcher,
    oracle: Arc<dyn ImpactOracle>,
}

impl TriagePipeline {
    pub fn new(fetcher: ContextFetcher, oracle: Arc<dyn ImpactOracle>) -> Self {
        Self { fetcher, oracle }
    }

    /// Run the pipeline to a terminal outcome. Never returns an error.
    #[instrument(
        skip(self, event, edge),
        fields(
            source_repo = %event.source_repo,
            target_repo = %edge.target_repo,
            kind = %edge.kind(),
        )
    )]
    pub async fn run(&self, event: &ChangeEvent, edge: &DependencyEdge) -> TriageOutcome {
        let started = Instant::now();
        let mut trail = StageTrail::new(edge);

        trail.enter(TriageStage::Filtering);
        let report = relevance::assess(event, edge);
        if !report.is_relevant() {
            let outcome = trail.finish(
                event,
                TriageStatus::Skipped {
                    reason: report.reason(),
                },
            );
            finished(&outcome, started);
            return outcome;
        }

        trail.enter(TriageStage::Fetching);
        let paths = report.context_paths(edge);
        let context = self.fetcher.fetch(&edge.target_repo, &paths).await;

        trail.enter(TriageStage::Classifying);
        let status = match self.oracle.classify(event, edge, &context).await {
            Ok(mut verdict) => {
                let overridden_from = apply_urgency_override(event, edge, &mut verdict);
                TriageStatus::Completed {
                    verdict,
                    overridden_from,
                }
            }
            Err(e) => {
                warn!(error = %e, "impact classification failed");
                TriageStatus::Failed {
                    reason: e.to_string(),
                }
            }
        };
        let outcome = trail.finish(event, status);
        finished(&outcome, started);
        outcome
    }
}

fn finished(outcome: &TriageOutcome, started: Instant) {
    obs::emit_triage_finished(
        &outcome.edge.target_repo,
        outcome.edge.kind(),
        outcome.terminal_stage(),
        outcome.verdict().map(|v| v.urgency),
        started.elapsed().as_millis() as u64,
    );
}
