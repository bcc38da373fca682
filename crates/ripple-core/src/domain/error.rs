//! Error taxonomy for Ripple.
//!
//! Errors are contained at the smallest boundary that can absorb them:
//! [`FetchError`] never leaves the context fetcher, [`OracleError`] becomes a
//! `Failed` outcome for one edge, and [`ActuatorError`] is logged without
//! touching the verdict. Only [`ValidationError`] reaches the ingress caller.

use crate::domain::edge::EdgeKind;

/// Malformed change event, rejected before any graph lookup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("change event source_repo must not be empty")]
    EmptySourceRepo,

    #[error("change event commit_sha must not be empty")]
    EmptyCommitSha,

    #[error("changed file at index {index} has an empty path")]
    EmptyChangedFilePath { index: usize },
}

/// Relationship document problems.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read or write relationship config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid relationship config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("duplicate {kind} edge {source_repo} -> {target_repo}")]
    DuplicateEdge {
        source_repo: String,
        target_repo: String,
        kind: EdgeKind,
    },

    #[error("relationship entry has an empty repo name")]
    EmptyRepo,

    #[error("unknown urgency level: {0}")]
    UnknownUrgency(String),
}

/// Per-file failure while fetching dependent context. Never fails a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("{path} not found in {repo}")]
    NotFound { repo: String, path: String },

    #[error("fetch timed out after {after_secs}s")]
    Timeout { after_secs: u64 },

    #[error("source control API returned HTTP {status}")]
    Http { status: u16 },

    #[error("transport error: {0}")]
    Transport(String),
}

/// Failure to obtain a usable verdict from the impact oracle.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OracleError {
    #[error("oracle call timed out after {after_secs}s")]
    Timeout { after_secs: u64 },

    #[error("malformed oracle response: {detail}")]
    MalformedResponse { detail: String },

    #[error("oracle rate limited (retry after {retry_after_secs:?}s)")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("oracle rejected request with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("oracle transport error: {0}")]
    Transport(String),

    #[error("ANTHROPIC_API_KEY is not set")]
    MissingApiKey,
}

impl OracleError {
    pub fn malformed(detail: impl Into<String>) -> Self {
        Self::MalformedResponse {
            detail: detail.into(),
        }
    }
}

/// Failure to carry out an action for a decided outcome. Not retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActuatorError {
    #[error("issue creation failed for {repo}: {detail}")]
    IssueCreation { repo: String, detail: String },

    #[error("notification failed: {detail}")]
    Notification { detail: String },

    #[error("{what} is not configured")]
    NotConfigured { what: String },
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Transport(err.to_string())
    }
}

impl From<reqwest::Error> for OracleError {
    fn from(err: reqwest::Error) -> Self {
        OracleError::Transport(err.to_string())
    }
}

/// Crate-level error for administrative and analysis operations.
#[derive(Debug, thiserror::Error)]
pub enum RippleError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("no {kind} relationship {source_repo} -> {target_repo}")]
    RelationshipNotFound {
        source_repo: String,
        target_repo: String,
        kind: EdgeKind,
    },

    #[error("oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("actuator error: {0}")]
    Actuator(#[from] ActuatorError),
}

/// Result type for Ripple operations.
pub type Result<T> = std::result::Result<T, RippleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        assert!(ValidationError::EmptySourceRepo
            .to_string()
            .contains("source_repo"));
        assert!(ValidationError::EmptyChangedFilePath { index: 3 }
            .to_string()
            .contains('3'));
    }

    #[test]
    fn test_duplicate_edge_error_names_both_repos() {
        let err = ConfigError::DuplicateEdge {
            source_repo: "org/provider".to_string(),
            target_repo: "org/app".to_string(),
            kind: EdgeKind::Consumer,
        };
        let msg = err.to_string();
        assert!(msg.contains("org/provider"));
        assert!(msg.contains("org/app"));
        assert!(msg.contains("consumer"));
    }

    #[test]
    fn test_oracle_error_converts_into_ripple_error() {
        let err: RippleError = OracleError::malformed("missing urgency").into();
        assert!(err.to_string().contains("missing urgency"));
    }
}
