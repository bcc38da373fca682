//! Bounded retrieval of a dependent repository's current files.
//!
//! Failures stay per file: a missing, oversized, slow or failing file comes
//! back as absent with a reason and the batch still succeeds.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::FetchError;

/// At most this many files are fetched per edge.
pub const MAX_CONTEXT_FILES: usize = 5;
/// Files larger than this are returned absent.
pub const MAX_FILE_BYTES: usize = 100_000;

/// Source-control boundary: one file at its default-branch revision.
#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn fetch_file(&self, repo: &str, path: &str) -> Result<String, FetchError>;
}

/// One requested path and what came back for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileContext {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub absent_reason: Option<String>,
}

impl FileContext {
    pub fn present(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: Some(content.into()),
            absent_reason: None,
        }
    }

    pub fn absent(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: None,
            absent_reason: Some(reason.into()),
        }
    }

    pub fn is_present(&self) -> bool {
        self.content.is_some()
    }
}

/// Caps applied by [`ContextFetcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextLimits {
    pub max_files: usize,
    pub max_file_bytes: usize,
    pub per_file_timeout: Duration,
}

impl Default for ContextLimits {
    fn default() -> Self {
        Self {
            max_files: MAX_CONTEXT_FILES,
            max_file_bytes: MAX_FILE_BYTES,
            per_file_timeout: Duration::from_secs(15),
        }
    }
}

/// Fetches a bounded file set from a [`ContentSource`].
#[derive(Clone)]
pub struct ContextFetcher {
    source: Arc<dyn ContentSource>,
    limits: ContextLimits,
}

impl ContextFetcher {
    pub fn new(source: Arc<dyn ContentSource>) -> Self {
        Self {
            source,
            limits: ContextLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: ContextLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn limits(&self) -> ContextLimits {
        self.limits
    }

    /// Fetch `paths` from `target_repo`. Returns one entry per requested path,
    /// in request order. Never fails.
    pub async fn fetch(&self, target_repo: &str, paths: &[String]) -> Vec<FileContext> {
        let (within_cap, over_cap) = paths.split_at(paths.len().min(self.limits.max_files));

        let fetches = within_cap
            .iter()
            .map(|path| self.fetch_one(target_repo, path));
        let mut files = join_all(fetches).await;

        files.extend(over_cap.iter().map(|path| {
            FileContext::absent(
                path.as_str(),
                format!("file cap exceeded (max {} files)", self.limits.max_files),
            )
        }));
        files
    }

    async fn fetch_one(&self, repo: &str, path: &str) -> FileContext {
        let timeout = self.limits.per_file_timeout;
        let result = match tokio::time::timeout(timeout, self.source.fetch_file(repo, path)).await
        {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout {
                after_secs: timeout.as_secs(),
            }),
        };

        match result {
            Ok(content) if content.len() > self.limits.max_file_bytes => {
                debug!(repo, path, bytes = content.len(), "context file over size cap");
                FileContext::absent(
                    path,
                    format!(
                        "size cap exceeded ({} bytes > {} bytes)",
                        content.len(),
                        self.limits.max_file_bytes
                    ),
                )
            }
            Ok(content) => FileContext::present(path, content),
            Err(e) => {
                debug!(repo, path, error = %e, "context file unavailable");
                FileContext::absent(path, e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::StaticContentSource;

    fn paths(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_missing_file_is_absent_not_error() {
        let source = StaticContentSource::new().with_file("org/app", "client.py", "BASE = '/health'");
        let fetcher = ContextFetcher::new(Arc::new(source));
        let files = fetcher
            .fetch("org/app", &paths(&["client.py", "missing.py"]))
            .await;
        assert_eq!(files.len(), 2);
        assert!(files[0].is_present());
        assert!(!files[1].is_present());
        assert!(files[1]
            .absent_reason
            .as_deref()
            .unwrap()
            .contains("not found"));
    }

    #[tokio::test]
    async fn test_file_cap_reports_overflow_as_absent() {
        let mut source = StaticContentSource::new();
        let names: Vec<String> = (0..7).map(|i| format!("f{i}.rs")).collect();
        for name in &names {
            source = source.with_file("org/app", name, "x");
        }
        let fetcher = ContextFetcher::new(Arc::new(source));
        let files = fetcher.fetch("org/app", &names).await;

        assert_eq!(files.len(), 7);
        assert_eq!(files.iter().filter(|f| f.is_present()).count(), MAX_CONTEXT_FILES);
        assert_eq!(files[5].path, "f5.rs");
        assert!(files[5]
            .absent_reason
            .as_deref()
            .unwrap()
            .contains("file cap"));
    }

    #[tokio::test]
    async fn test_oversized_file_is_absent() {
        let big = "a".repeat(MAX_FILE_BYTES + 1);
        let source = StaticContentSource::new().with_file("org/app", "big.json", big);
        let fetcher = ContextFetcher::new(Arc::new(source));
        let files = fetcher.fetch("org/app", &paths(&["big.json"])).await;
        assert!(!files[0].is_present());
        assert!(files[0]
            .absent_reason
            .as_deref()
            .unwrap()
            .contains("size cap"));
    }

    #[tokio::test]
    async fn test_transport_failure_degrades_only_that_file() {
        let source = StaticContentSource::new()
            .with_file("org/app", "ok.py", "ok")
            .with_failure("org/app", "flaky.py", FetchError::Http { status: 502 });
        let fetcher = ContextFetcher::new(Arc::new(source));
        let files = fetcher.fetch("org/app", &paths(&["ok.py", "flaky.py"])).await;
        assert_eq!(files[0].content.as_deref(), Some("ok"));
        assert!(files[1].absent_reason.as_deref().unwrap().contains("502"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_file_times_out() {
        let source = StaticContentSource::new()
            .with_file("org/app", "slow.py", "late")
            .with_delay(Duration::from_secs(60));
        let fetcher = ContextFetcher::new(Arc::new(source)).with_limits(ContextLimits {
            per_file_timeout: Duration::from_secs(1),
            ..ContextLimits::default()
        });
        let files = fetcher.fetch("org/app", &paths(&["slow.py"])).await;
        assert!(files[0]
            .absent_reason
            .as_deref()
            .unwrap()
            .contains("timed out"));
    }
}
