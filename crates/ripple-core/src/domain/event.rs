//! Inbound change notifications.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a file changed in the source commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    #[serde(alias = "renamed", alias = "changed")]
    Modified,
    #[serde(alias = "removed")]
    Deleted,
}

/// One file touched by the source commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedFile {
    pub path: String,
    #[serde(rename = "change_type", default = "default_change_kind")]
    pub kind: ChangeKind,
    /// Unified diff, possibly truncated upstream.
    #[serde(default)]
    pub diff: String,
}

fn default_change_kind() -> ChangeKind {
    ChangeKind::Modified
}

impl ChangedFile {
    pub fn new(path: impl Into<String>, kind: ChangeKind, diff: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind,
            diff: diff.into(),
        }
    }
}

/// Keywords and patterns extracted by the source repo's CI before notifying.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternSummary {
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub patterns: Vec<String>,
}

impl PatternSummary {
    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty() && self.patterns.is_empty()
    }

    /// Keywords followed by patterns, lowercased.
    pub fn terms(&self) -> impl Iterator<Item = String> + '_ {
        self.keywords
            .iter()
            .chain(self.patterns.iter())
            .map(|t| t.to_lowercase())
    }
}

/// A single commit in a source repository, as delivered to the ingress.
///
/// Immutable once constructed; one orchestration run owns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub source_repo: String,
    pub commit_sha: String,
    #[serde(default)]
    pub commit_message: String,
    #[serde(default)]
    pub branch: String,
    #[serde(default)]
    pub changed_files: Vec<ChangedFile>,
    #[serde(default)]
    pub pattern_summary: PatternSummary,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn new(source_repo: impl Into<String>, commit_sha: impl Into<String>) -> Self {
        Self {
            source_repo: source_repo.into(),
            commit_sha: commit_sha.into(),
            commit_message: String::new(),
            branch: "main".to_string(),
            changed_files: Vec::new(),
            pattern_summary: PatternSummary::default(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.commit_message = message.into();
        self
    }

    pub fn with_file(mut self, file: ChangedFile) -> Self {
        self.changed_files.push(file);
        self
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pattern_summary
            .keywords
            .extend(keywords.into_iter().map(Into::into));
        self
    }

    /// First seven characters of the commit sha.
    pub fn short_sha(&self) -> &str {
        let end = self
            .commit_sha
            .char_indices()
            .nth(7)
            .map(|(i, _)| i)
            .unwrap_or(self.commit_sha.len());
        &self.commit_sha[..end]
    }
}
