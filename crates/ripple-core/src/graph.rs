//! Relationship graph: source repo → ordered dependency edges.
//!
//! The graph is an immutable [`GraphSnapshot`] behind an [`ArcSwap`]. Readers
//! take a snapshot without locking; writers clone, modify and swap with an
//! RCU loop, so a reader sees either the old or the new edge, never half of
//! one. Triage pipelines only ever read.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain::{ConfigError, DependencyEdge, EdgeKind, EdgePolicy};

/// Whether an upsert added a new edge or replaced one with the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Added,
    Updated,
}

/// Immutable view of all edges at one point in time.
#[derive(Debug, Clone, Default)]
pub struct GraphSnapshot {
    /// `source_repo → edges`, in insertion order. `(target, kind)` is unique per source.
    edges: HashMap<String, Vec<DependencyEdge>>,
}

impl GraphSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Edges leaving `source_repo`; empty for unknown sources.
    pub fn edges_for(&self, source_repo: &str) -> &[DependencyEdge] {
        self.edges
            .get(source_repo)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Look up one edge by its `(target, kind)` key.
    pub fn edge(&self, source_repo: &str, target_repo: &str, kind: EdgeKind) -> Option<&DependencyEdge> {
        self.edges_for(source_repo)
            .iter()
            .find(|e| e.key() == (target_repo, kind))
    }

    /// Insert `edge`, rejecting a second edge with the same `(target, kind)`.
    pub fn insert(&mut self, source_repo: &str, edge: DependencyEdge) -> Result<(), ConfigError> {
        if source_repo.trim().is_empty() || edge.target_repo.trim().is_empty() {
            return Err(ConfigError::EmptyRepo);
        }
        if self.edge(source_repo, &edge.target_repo, edge.kind()).is_some() {
            return Err(ConfigError::DuplicateEdge {
                source_repo: source_repo.to_string(),
                target_repo: edge.target_repo.clone(),
                kind: edge.kind(),
            });
        }
        self.edges
            .entry(source_repo.to_string())
            .or_default()
            .push(edge);
        Ok(())
    }

    /// Insert or replace in place, keeping the edge's position on update.
    pub fn upsert(&mut self, source_repo: &str, edge: DependencyEdge) -> UpsertOutcome {
        let edges = self.edges.entry(source_repo.to_string()).or_default();
        match edges.iter_mut().find(|e| e.key() == edge.key()) {
            Some(existing) => {
                *existing = edge;
                UpsertOutcome::Updated
            }
            None => {
                edges.push(edge);
                UpsertOutcome::Added
            }
        }
    }

    /// All source repos with at least one edge, sorted.
    pub fn sources(&self) -> Vec<&str> {
        let mut sources: Vec<&str> = self
            .edges
            .iter()
            .filter(|(_, edges)| !edges.is_empty())
            .map(|(s, _)| s.as_str())
            .collect();
        sources.sort_unstable();
        sources
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(Vec::len).sum()
    }

    /// Every `(source, edge)` pair whose target is `repo`, sorted by source.
    pub fn upstream_of(&self, repo: &str) -> Vec<(&str, &DependencyEdge)> {
        let mut upstream: Vec<(&str, &DependencyEdge)> = self
            .edges
            .iter()
            .filter(|(source, _)| source.as_str() != repo)
            .flat_map(|(source, edges)| {
                edges
                    .iter()
                    .filter(|e| e.target_repo == repo)
                    .map(move |e| (source.as_str(), e))
            })
            .collect();
        upstream.sort_by(|a, b| a.0.cmp(b.0).then(a.1.kind().cmp(&b.1.kind())));
        upstream
    }
}

/// One dependent or dependency in a [`DependencySummary`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedRepo {
    pub repo: String,
    pub kind: EdgeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<EdgePolicy>,
}

/// Downstream and upstream relationships of one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencySummary {
    pub repo: String,
    pub consumers: Vec<LinkedRepo>,
    pub derivatives: Vec<LinkedRepo>,
    pub upstream_dependencies: Vec<LinkedRepo>,
}

/// Shared, concurrently readable relationship graph.
#[derive(Debug, Default)]
pub struct RelationshipGraph {
    current: ArcSwap<GraphSnapshot>,
}

impl RelationshipGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: GraphSnapshot) -> Self {
        Self {
            current: ArcSwap::from_pointee(snapshot),
        }
    }

    /// Build from `(source, edge)` pairs, failing on duplicate keys.
    pub fn from_edges<I, S>(edges: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (S, DependencyEdge)>,
        S: AsRef<str>,
    {
        let mut snapshot = GraphSnapshot::new();
        for (source, edge) in edges {
            snapshot.insert(source.as_ref(), edge)?;
        }
        Ok(Self::from_snapshot(snapshot))
    }

    /// Current snapshot. Holding it pins that version; later writes are not seen.
    pub fn snapshot(&self) -> Arc<GraphSnapshot> {
        self.current.load_full()
    }

    /// Edges leaving `source_repo`. Unknown sources yield an empty vec, not an error.
    pub fn edges_for(&self, source_repo: &str) -> Vec<DependencyEdge> {
        self.current.load().edges_for(source_repo).to_vec()
    }

    /// Add an edge or replace the one with the same `(target, kind)`.
    ///
    /// Safe to call while pipelines are reading: the update is published as a
    /// whole new snapshot. Blank source or target repos are rejected.
    pub fn add_or_update_edge(
        &self,
        source_repo: &str,
        edge: DependencyEdge,
    ) -> Result<UpsertOutcome, ConfigError> {
        if source_repo.trim().is_empty() || edge.target_repo.trim().is_empty() {
            return Err(ConfigError::EmptyRepo);
        }
        let target = edge.target_repo.clone();
        let kind = edge.kind();
        let previous = self.current.rcu(|current| {
            let mut next = GraphSnapshot::clone(current);
            next.upsert(source_repo, edge.clone());
            next
        });
        let outcome = if previous.edge(source_repo, &target, kind).is_some() {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Added
        };
        info!(
            source_repo = %source_repo,
            target_repo = %target,
            kind = %kind,
            outcome = ?outcome,
            "relationship upserted"
        );
        Ok(outcome)
    }

    /// Swap in a freshly loaded snapshot (e.g. after re-reading the config).
    pub fn replace(&self, snapshot: GraphSnapshot) {
        debug!(edges = snapshot.edge_count(), "relationship graph replaced");
        self.current.store(Arc::new(snapshot));
    }

    /// Downstream consumers/derivatives of `repo` and the repos it depends on.
    pub fn dependencies(&self, repo: &str, include_metadata: bool) -> DependencySummary {
        let snapshot = self.snapshot();
        let link = |repo: &str, edge: &DependencyEdge| LinkedRepo {
            repo: repo.to_string(),
            kind: edge.kind(),
            metadata: include_metadata.then(|| edge.policy.clone()),
        };

        let (consumers, derivatives): (Vec<_>, Vec<_>) = snapshot
            .edges_for(repo)
            .iter()
            .map(|e| link(&e.target_repo, e))
            .partition(|l| l.kind == EdgeKind::Consumer);

        let upstream_dependencies = snapshot
            .upstream_of(repo)
            .into_iter()
            .map(|(source, e)| link(source, e))
            .collect();

        DependencySummary {
            repo: repo.to_string(),
            consumers,
            derivatives,
            upstream_dependencies,
        }
    }
}
