//! Dependency edges and their per-kind policy.
//!
//! An edge is directed source → target. Consumer and derivative edges carry
//! different policy data and are dispatched by matching on [`EdgePolicy`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::verdict::Urgency;

/// Discriminant of [`EdgePolicy`], used for lookups and display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// Target calls the source as an API or service.
    #[serde(alias = "api_consumer")]
    Consumer,
    /// Target is a fork or templated copy of the source.
    #[serde(alias = "template_fork", alias = "template")]
    Derivative,
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeKind::Consumer => write!(f, "consumer"),
            EdgeKind::Derivative => write!(f, "derivative"),
        }
    }
}

/// Policy of a consumer edge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerPolicy {
    /// Files in the consumer that talk to the source. Fetched as context, in order.
    #[serde(default)]
    pub interface_files: Vec<String>,
    /// Trigger categories (e.g. `api_contract`) or literal keywords.
    #[serde(default, rename = "change_triggers")]
    pub triggers: BTreeSet<String>,
    /// Trigger category → urgency forced onto an actionable verdict.
    #[serde(default, rename = "urgency_mapping")]
    pub urgency_overrides: BTreeMap<String, Urgency>,
}

/// Policy of a derivative edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivativePolicy {
    #[serde(default)]
    pub shared_concerns: BTreeSet<String>,
    #[serde(default)]
    pub divergent_concerns: BTreeSet<String>,
    /// Free-form hint passed to the oracle (e.g. `selective`).
    #[serde(default = "default_sync_strategy")]
    pub sync_strategy: String,
}

fn default_sync_strategy() -> String {
    "selective".to_string()
}

impl Default for DerivativePolicy {
    fn default() -> Self {
        Self {
            shared_concerns: BTreeSet::new(),
            divergent_concerns: BTreeSet::new(),
            sync_strategy: default_sync_strategy(),
        }
    }
}

/// Kind-specific policy attached to an edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EdgePolicy {
    Consumer(ConsumerPolicy),
    Derivative(DerivativePolicy),
}

/// One directed relationship from a source repository to a dependent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub target_repo: String,
    pub policy: EdgePolicy,
}

impl DependencyEdge {
    pub fn consumer(target_repo: impl Into<String>, policy: ConsumerPolicy) -> Self {
        Self {
            target_repo: target_repo.into(),
            policy: EdgePolicy::Consumer(policy),
        }
    }

    pub fn derivative(target_repo: impl Into<String>, policy: DerivativePolicy) -> Self {
        Self {
            target_repo: target_repo.into(),
            policy: EdgePolicy::Derivative(policy),
        }
    }

    pub fn kind(&self) -> EdgeKind {
        match self.policy {
            EdgePolicy::Consumer(_) => EdgeKind::Consumer,
            EdgePolicy::Derivative(_) => EdgeKind::Derivative,
        }
    }

    /// Identity of the edge within one source: `(target, kind)`.
    pub fn key(&self) -> (&str, EdgeKind) {
        (self.target_repo.as_str(), self.kind())
    }

    /// True when no trigger or concern tag is configured. Such edges never match.
    pub fn has_no_tags(&self) -> bool {
        match &self.policy {
            EdgePolicy::Consumer(p) => p.triggers.is_empty(),
            EdgePolicy::Derivative(p) => {
                p.shared_concerns.is_empty() && p.divergent_concerns.is_empty()
            }
        }
    }
}

impl ConsumerPolicy {
    pub fn with_triggers<I, S>(mut self, triggers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.triggers.extend(triggers.into_iter().map(Into::into));
        self
    }

    pub fn with_interface_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.interface_files.extend(files.into_iter().map(Into::into));
        self
    }

    pub fn with_override(mut self, trigger: impl Into<String>, urgency: Urgency) -> Self {
        self.urgency_overrides.insert(trigger.into(), urgency);
        self
    }
}

impl DerivativePolicy {
    pub fn with_shared<I, S>(mut self, concerns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.shared_concerns
            .extend(concerns.into_iter().map(Into::into));
        self
    }

    pub fn with_divergent<I, S>(mut self, concerns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.divergent_concerns
            .extend(concerns.into_iter().map(Into::into));
        self
    }
}
