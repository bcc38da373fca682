//! Configuration: the relationship document and engine settings.
//!
//! The relationship document is JSON:
//!
//! ```json
//! {
//!   "relationships": {
//!     "org/provider": {
//!       "type": "service_provider",
//!       "consumers": [{"repo": "org/app", "interface_files": ["client.py"],
//!                      "change_triggers": ["api_contract"],
//!                      "urgency_mapping": {"api_contract": "high"}}],
//!       "derivatives": [{"repo": "org/fork", "shared_concerns": ["docker"],
//!                        "divergent_concerns": ["model_specific"]}]
//!     }
//!   },
//!   "notification_settings": {
//!     "default_urgency_thresholds": {
//!       "medium": {"action": "create_issue", "labels": ["deps"], "notify_webhook": false}
//!     }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::context::{ContextLimits, MAX_CONTEXT_FILES, MAX_FILE_BYTES};
use crate::domain::{
    ConfigError, ConsumerPolicy, DependencyEdge, DerivativePolicy, EdgeKind, EdgePolicy,
    RippleError, Urgency,
};
use crate::github::GitHubConfig;
use crate::graph::{GraphSnapshot, RelationshipGraph, UpsertOutcome};
use crate::oracle::AnthropicConfig;
use crate::policy::{DecisionPolicy, UrgencyThreshold};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerEntry {
    pub repo: String,
    #[serde(flatten)]
    pub policy: ConsumerPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivativeEntry {
    pub repo: String,
    #[serde(flatten)]
    pub policy: DerivativePolicy,
}

/// Dependents of one source repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceEntry {
    /// Free-form role of the source, e.g. `service_provider` or `template`.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub consumers: Vec<ConsumerEntry>,
    #[serde(default)]
    pub derivatives: Vec<DerivativeEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationSettings {
    #[serde(default)]
    pub default_urgency_thresholds: BTreeMap<Urgency, UrgencyThreshold>,
}

/// Declarative relationship graph plus notification policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipDocument {
    #[serde(default)]
    pub relationships: BTreeMap<String, SourceEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_settings: Option<NotificationSettings>,
}

impl RelationshipDocument {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let document = Self::from_json(&text)?;
        info!(
            path = %path.as_ref().display(),
            sources = document.relationships.len(),
            "relationship config loaded"
        );
        Ok(document)
    }

    /// Write pretty JSON via a sibling temp file and rename, so readers never
    /// see a partial document.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, json + "\n")?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Build the graph. Rejects empty repo names and duplicate `(target, kind)`
    /// pairs within one source.
    pub fn to_graph(&self) -> Result<GraphSnapshot, ConfigError> {
        let mut snapshot = GraphSnapshot::new();
        for (source, entry) in &self.relationships {
            if source.trim().is_empty() {
                return Err(ConfigError::EmptyRepo);
            }
            let consumers = entry
                .consumers
                .iter()
                .map(|c| DependencyEdge::consumer(c.repo.clone(), c.policy.clone()));
            let derivatives = entry
                .derivatives
                .iter()
                .map(|d| DependencyEdge::derivative(d.repo.clone(), d.policy.clone()));
            for edge in consumers.chain(derivatives) {
                snapshot.insert(source, edge)?;
            }
        }
        Ok(snapshot)
    }

    /// Add or replace the entry for `(source, edge.target, edge.kind)`.
    pub fn upsert(&mut self, source_repo: &str, edge: DependencyEdge) -> UpsertOutcome {
        let entry = self
            .relationships
            .entry(source_repo.to_string())
            .or_default();
        let DependencyEdge {
            target_repo,
            policy,
        } = edge;
        match policy {
            EdgePolicy::Consumer(policy) => {
                match entry.consumers.iter_mut().find(|c| c.repo == target_repo) {
                    Some(existing) => {
                        existing.policy = policy;
                        UpsertOutcome::Updated
                    }
                    None => {
                        entry.consumers.push(ConsumerEntry {
                            repo: target_repo,
                            policy,
                        });
                        UpsertOutcome::Added
                    }
                }
            }
            EdgePolicy::Derivative(policy) => {
                match entry.derivatives.iter_mut().find(|d| d.repo == target_repo) {
                    Some(existing) => {
                        existing.policy = policy;
                        UpsertOutcome::Updated
                    }
                    None => {
                        entry.derivatives.push(DerivativeEntry {
                            repo: target_repo,
                            policy,
                        });
                        UpsertOutcome::Added
                    }
                }
            }
        }
    }

    /// Decision policy with any deployment threshold overrides applied.
    pub fn decision_policy(&self) -> DecisionPolicy {
        match &self.notification_settings {
            Some(settings) if !settings.default_urgency_thresholds.is_empty() => {
                DecisionPolicy::from_thresholds(settings.default_urgency_thresholds.clone())
            }
            _ => DecisionPolicy::canonical(),
        }
    }
}

/// Parse an edge from the CLI/admin shape: a kind plus the policy object.
pub fn edge_from_policy_json(
    target_repo: &str,
    kind: EdgeKind,
    policy_json: &str,
) -> Result<DependencyEdge, ConfigError> {
    if target_repo.trim().is_empty() {
        return Err(ConfigError::EmptyRepo);
    }
    let edge = match kind {
        EdgeKind::Consumer => {
            DependencyEdge::consumer(target_repo, serde_json::from_str(policy_json)?)
        }
        EdgeKind::Derivative => {
            DependencyEdge::derivative(target_repo, serde_json::from_str(policy_json)?)
        }
    };
    Ok(edge)
}

/// Live graph plus the document it was loaded from.
///
/// Administrative upserts persist the document first and only then publish
/// the new edge, so a failed write leaves the running graph unchanged.
pub struct RelationshipStore {
    path: Option<PathBuf>,
    document: Mutex<RelationshipDocument>,
    graph: Arc<RelationshipGraph>,
}

impl RelationshipStore {
    /// Load `path` and build the graph.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let document = RelationshipDocument::load(&path)?;
        let store = Self::in_memory(document)?;
        Ok(Self {
            path: Some(path),
            ..store
        })
    }

    /// Store without a backing file.
    pub fn in_memory(document: RelationshipDocument) -> Result<Self, ConfigError> {
        let graph = RelationshipGraph::from_snapshot(document.to_graph()?);
        Ok(Self {
            path: None,
            document: Mutex::new(document),
            graph: Arc::new(graph),
        })
    }

    pub fn graph(&self) -> Arc<RelationshipGraph> {
        Arc::clone(&self.graph)
    }

    pub fn document(&self) -> RelationshipDocument {
        self.document
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// `add_dependency_relationship`: upsert one edge and persist it.
    pub fn add_dependency_relationship(
        &self,
        source_repo: &str,
        edge: DependencyEdge,
    ) -> Result<UpsertOutcome, RippleError> {
        if source_repo.trim().is_empty() || edge.target_repo.trim().is_empty() {
            return Err(ConfigError::EmptyRepo.into());
        }
        let mut document = self
            .document
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut next = document.clone();
        next.upsert(source_repo, edge.clone());
        if let Some(path) = &self.path {
            next.save(path)?;
        }
        *document = next;
        Ok(self.graph.add_or_update_edge(source_repo, edge)?)
    }
}

fn env_secs(name: &str, default: u64) -> Duration {
    Duration::from_secs(
        std::env::var(name)
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default),
    )
}

/// Engine settings, read from the environment with defaults.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub github: GitHubConfig,
    pub anthropic: AnthropicConfig,
    pub webhook_url: Option<String>,
    pub oracle_timeout: Duration,
    pub fetch_timeout: Duration,
    pub shutdown_grace: Duration,
    pub max_context_files: usize,
    pub max_file_bytes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            github: GitHubConfig::default(),
            anthropic: AnthropicConfig::default(),
            webhook_url: std::env::var("WEBHOOK_URL").ok().filter(|u| !u.is_empty()),
            oracle_timeout: env_secs("RIPPLE_ORACLE_TIMEOUT_SECS", 60),
            fetch_timeout: env_secs("RIPPLE_FETCH_TIMEOUT_SECS", 15),
            shutdown_grace: env_secs("RIPPLE_SHUTDOWN_GRACE_SECS", 30),
            max_context_files: MAX_CONTEXT_FILES,
            max_file_bytes: MAX_FILE_BYTES,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::default()
    }

    pub fn context_limits(&self) -> ContextLimits {
        ContextLimits {
            max_files: self.max_context_files,
            max_file_bytes: self.max_file_bytes,
            per_file_timeout: self.fetch_timeout,
        }
    }
}
