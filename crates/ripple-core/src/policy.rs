//! Decision policy: which external effects a triage outcome warrants.
//!
//! Canonical thresholds:
//!
//! | urgency  | issue | notification |
//! |----------|-------|--------------|
//! | critical | yes   | yes          |
//! | high     | yes   | yes          |
//! | medium   | yes   | no           |
//! | low      | no    | no           |
//!
//! Urgency is only consulted when `requires_action` is true.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::{
    ChangeEvent, DependencyEdge, EdgePolicy, TriageOutcome, TriageVerdict, Urgency,
};
use crate::relevance::{self, RelevanceReport};

/// What to do for one urgency level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdAction {
    CreateIssueImmediately,
    CreateIssue,
    None,
}

impl ThresholdAction {
    pub fn creates_issue(&self) -> bool {
        !matches!(self, ThresholdAction::None)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrgencyThreshold {
    pub action: ThresholdAction,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub notify_webhook: bool,
}

/// Effects decided for one outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub create_issue: bool,
    pub notify: bool,
    pub labels: Vec<String>,
}

impl Decision {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_noop(&self) -> bool {
        !self.create_issue && !self.notify
    }
}

/// Urgency → action table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionPolicy {
    thresholds: BTreeMap<Urgency, UrgencyThreshold>,
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self::canonical()
    }
}

impl DecisionPolicy {
    pub fn canonical() -> Self {
        Self {
            thresholds: canonical_thresholds(),
        }
    }

    /// Build from deployment thresholds. Levels not listed keep the canonical
    /// entry; deviations from canonical are logged.
    pub fn from_thresholds(overrides: BTreeMap<Urgency, UrgencyThreshold>) -> Self {
        let mut thresholds = canonical_thresholds();
        for (urgency, threshold) in overrides {
            let canonical = &thresholds[&urgency];
            if canonical.action.creates_issue() != threshold.action.creates_issue()
                || canonical.notify_webhook != threshold.notify_webhook
            {
                warn!(
                    urgency = %urgency,
                    action = ?threshold.action,
                    notify = threshold.notify_webhook,
                    "deployment threshold overrides canonical decision policy"
                );
            }
            thresholds.insert(urgency, threshold);
        }
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &BTreeMap<Urgency, UrgencyThreshold> {
        &self.thresholds
    }

    /// Decide for a verdict. `requires_action=false` never acts.
    pub fn decide_verdict(&self, verdict: &TriageVerdict) -> Decision {
        if !verdict.requires_action {
            return Decision::none();
        }
        match self.thresholds.get(&verdict.urgency) {
            Some(threshold) => Decision {
                create_issue: threshold.action.creates_issue(),
                notify: threshold.notify_webhook,
                labels: threshold.labels.clone(),
            },
            None => Decision::none(),
        }
    }

    /// Decide for an outcome. Only `Completed` outcomes can act.
    pub fn decide(&self, outcome: &TriageOutcome) -> Decision {
        outcome
            .verdict()
            .map(|v| self.decide_verdict(v))
            .unwrap_or_default()
    }
}

fn canonical_thresholds() -> BTreeMap<Urgency, UrgencyThreshold> {
    let labels = |extra: &[&str]| -> Vec<String> {
        std::iter::once("dependency-update")
            .chain(extra.iter().copied())
            .map(String::from)
            .collect()
    };
    BTreeMap::from([
        (
            Urgency::Critical,
            UrgencyThreshold {
                action: ThresholdAction::CreateIssueImmediately,
                labels: labels(&["urgent"]),
                notify_webhook: true,
            },
        ),
        (
            Urgency::High,
            UrgencyThreshold {
                action: ThresholdAction::CreateIssue,
                labels: labels(&["high-priority"]),
                notify_webhook: true,
            },
        ),
        (
            Urgency::Medium,
            UrgencyThreshold {
                action: ThresholdAction::CreateIssue,
                labels: labels(&[]),
                notify_webhook: false,
            },
        ),
        (
            Urgency::Low,
            UrgencyThreshold {
                action: ThresholdAction::None,
                labels: Vec::new(),
                notify_webhook: false,
            },
        ),
    ])
}

/// Apply the consumer edge's urgency-override mapping to an actionable verdict.
///
/// The most severe override among matched trigger categories wins. Returns the
/// oracle's original urgency when it was replaced.
pub fn apply_urgency_override(
    event: &ChangeEvent,
    edge: &DependencyEdge,
    verdict: &mut TriageVerdict,
) -> Option<Urgency> {
    let EdgePolicy::Consumer(policy) = &edge.policy else {
        return None;
    };
    if !verdict.requires_action || policy.urgency_overrides.is_empty() {
        return None;
    }
    let RelevanceReport::Consumer {
        matched_triggers, ..
    } = relevance::assess(event, edge)
    else {
        return None;
    };
    let forced = matched_triggers
        .iter()
        .filter_map(|t| policy.urgency_overrides.get(t))
        .copied()
        .max()?;
    if forced == verdict.urgency {
        return None;
    }
    let original = verdict.urgency;
    verdict.urgency = forced;
    Some(original)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChangeKind, ChangedFile, ConsumerPolicy};

    fn verdict(requires_action: bool, urgency: Urgency) -> TriageVerdict {
        TriageVerdict {
            requires_action,
            urgency,
            impact_summary: "summary".to_string(),
            affected_files: vec![],
            recommended_changes: String::new(),
            confidence: 0.7,
            reasoning: "because".to_string(),
        }
    }

    #[test]
    fn test_canonical_table() {
        let policy = DecisionPolicy::canonical();
        let critical = policy.decide_verdict(&verdict(true, Urgency::Critical));
        assert!(critical.create_issue && critical.notify);
        let high = policy.decide_verdict(&verdict(true, Urgency::High));
        assert!(high.create_issue && high.notify);
        let medium = policy.decide_verdict(&verdict(true, Urgency::Medium));
        assert!(medium.create_issue && !medium.notify);
        assert!(policy.decide_verdict(&verdict(true, Urgency::Low)).is_noop());
    }

    #[test]
    fn test_no_action_regardless_of_urgency() {
        let policy = DecisionPolicy::canonical();
        for urgency in Urgency::ALL {
            assert!(policy.decide_verdict(&verdict(false, urgency)).is_noop());
        }
    }

    #[test]
    fn test_deployment_override_applies() {
        let policy = DecisionPolicy::from_thresholds(BTreeMap::from([(
            Urgency::Medium,
            UrgencyThreshold {
                action: ThresholdAction::CreateIssue,
                labels: vec!["deps".to_string()],
                notify_webhook: true,
            },
        )]));
        let medium = policy.decide_verdict(&verdict(true, Urgency::Medium));
        assert!(medium.notify);
        assert_eq!(medium.labels, vec!["deps"]);
        // untouched levels keep canonical behavior
        assert!(policy.decide_verdict(&verdict(true, Urgency::Low)).is_noop());
    }

    #[test]
    fn test_urgency_override_picks_most_severe_match() {
        let event = ChangeEvent::new("org/provider", "abc")
            .with_message("rotate auth token")
            .with_file(ChangedFile::new("api/routes.py", ChangeKind::Modified, ""));
        let edge = DependencyEdge::consumer(
            "org/app",
            ConsumerPolicy::default()
                .with_triggers(["api_contract", "authentication"])
                .with_override("api_contract", Urgency::High)
                .with_override("authentication", Urgency::Critical),
        );
        let mut v = verdict(true, Urgency::Medium);
        assert_eq!(
            apply_urgency_override(&event, &edge, &mut v),
            Some(Urgency::Medium)
        );
        assert_eq!(v.urgency, Urgency::Critical);
    }

    #[test]
    fn test_urgency_override_ignored_when_no_action() {
        let event = ChangeEvent::new("org/provider", "abc").with_message("auth change");
        let edge = DependencyEdge::consumer(
            "org/app",
            ConsumerPolicy::default()
                .with_triggers(["authentication"])
                .with_override("authentication", Urgency::Critical),
        );
        let mut v = verdict(false, Urgency::Low);
        assert_eq!(apply_urgency_override(&event, &edge, &mut v), None);
        assert_eq!(v.urgency, Urgency::Low);
    }
}
