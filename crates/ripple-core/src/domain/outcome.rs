//! Terminal results of one triage pipeline run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::edge::DependencyEdge;
use crate::domain::verdict::{TriageVerdict, Urgency};

/// States of the per-edge pipeline, in the order they can be visited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriageStage {
    Pending,
    Filtering,
    Skipped,
    Fetching,
    Classifying,
    Completed,
    Failed,
}

impl TriageStage {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TriageStage::Skipped | TriageStage::Completed | TriageStage::Failed
        )
    }
}

/// Terminal status of a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TriageStatus {
    Completed {
        verdict: TriageVerdict,
        /// Urgency reported by the oracle before an edge override replaced it.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        overridden_from: Option<Urgency>,
    },
    Failed {
        reason: String,
    },
    Skipped {
        reason: String,
    },
}

/// What the orchestrator aggregates and the actuator consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageOutcome {
    pub source_repo: String,
    pub commit_sha: String,
    pub edge: DependencyEdge,
    #[serde(flatten)]
    pub status: TriageStatus,
    /// Stages visited, `Pending` first, terminal stage last.
    pub stages: Vec<TriageStage>,
    pub finished_at: DateTime<Utc>,
}

impl TriageOutcome {
    pub fn verdict(&self) -> Option<&TriageVerdict> {
        match &self.status {
            TriageStatus::Completed { verdict, .. } => Some(verdict),
            _ => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.status, TriageStatus::Completed { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, TriageStatus::Failed { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.status, TriageStatus::Skipped { .. })
    }

    pub fn terminal_stage(&self) -> TriageStage {
        match self.status {
            TriageStatus::Completed { .. } => TriageStage::Completed,
            TriageStatus::Failed { .. } => TriageStage::Failed,
            TriageStatus::Skipped { .. } => TriageStage::Skipped,
        }
    }

    pub fn reached(&self, stage: TriageStage) -> bool {
        self.stages.contains(&stage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::edge::ConsumerPolicy;

    #[test]
    fn test_failed_outcome_serializes_flat_status() {
        let outcome = TriageOutcome {
            source_repo: "org/provider".to_string(),
            commit_sha: "abc".to_string(),
            edge: DependencyEdge::consumer("org/app", ConsumerPolicy::default()),
            status: TriageStatus::Failed {
                reason: "oracle timed out".to_string(),
            },
            stages: vec![
                TriageStage::Pending,
                TriageStage::Filtering,
                TriageStage::Fetching,
                TriageStage::Classifying,
                TriageStage::Failed,
            ],
            finished_at: Utc::now(),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["reason"], "oracle timed out");
        assert!(outcome.verdict().is_none());
        assert_eq!(outcome.terminal_stage(), TriageStage::Failed);
        assert!(outcome.reached(TriageStage::Classifying));
    }
}
