//! In-memory fakes for the external boundaries (testing only)
//!
//! Provides content sources, oracles, text generators, issue trackers and
//! notifiers that satisfy the trait contracts without any network access.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::actuator::{IssueRef, IssueTracker, Notification, Notifier};
use crate::context::{ContentSource, FileContext};
use crate::domain::{
    ActuatorError, ChangeEvent, DependencyEdge, FetchError, OracleError, TriageVerdict, Urgency,
};
use crate::oracle::{ImpactOracle, TextGenerator};

/// A plain verdict for tests.
pub fn verdict(requires_action: bool, urgency: Urgency) -> TriageVerdict {
    TriageVerdict {
        requires_action,
        urgency,
        impact_summary: format!("{urgency} impact"),
        affected_files: vec!["client.py".to_string()],
        recommended_changes: "1. Update the client".to_string(),
        confidence: 0.8,
        reasoning: "fixture".to_string(),
    }
}

// ---------------------------------------------------------------------------
// StaticContentSource
// ---------------------------------------------------------------------------

/// Content source backed by a `HashMap<(repo, path), result>`.
#[derive(Debug, Default)]
pub struct StaticContentSource {
    files: HashMap<(String, String), Result<String, FetchError>>,
    delay: Option<Duration>,
}

impl StaticContentSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(
        mut self,
        repo: impl Into<String>,
        path: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        self.files
            .insert((repo.into(), path.into()), Ok(content.into()));
        self
    }

    pub fn with_failure(
        mut self,
        repo: impl Into<String>,
        path: impl Into<String>,
        error: FetchError,
    ) -> Self {
        self.files.insert((repo.into(), path.into()), Err(error));
        self
    }

    /// Sleep before every fetch.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl ContentSource for StaticContentSource {
    async fn fetch_file(&self, repo: &str, path: &str) -> Result<String, FetchError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.files
            .get(&(repo.to_string(), path.to_string()))
            .cloned()
            .unwrap_or_else(|| {
                Err(FetchError::NotFound {
                    repo: repo.to_string(),
                    path: path.to_string(),
                })
            })
    }
}

// ---------------------------------------------------------------------------
// FixedOracle
// ---------------------------------------------------------------------------

/// What a [`FixedOracle`] does for one call.
#[derive(Debug, Clone)]
pub enum OracleBehavior {
    Answer(TriageVerdict),
    Fail(OracleError),
    Panic(String),
}

/// Oracle with a default behavior and optional per-target overrides.
///
/// Clones share call counters.
#[derive(Debug, Clone)]
pub struct FixedOracle {
    default: OracleBehavior,
    per_target: HashMap<String, OracleBehavior>,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    last_context: Arc<Mutex<Vec<FileContext>>>,
}

impl FixedOracle {
    fn with_default(default: OracleBehavior) -> Self {
        Self {
            default,
            per_target: HashMap::new(),
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
            last_context: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn answering(verdict: TriageVerdict) -> Self {
        Self::with_default(OracleBehavior::Answer(verdict))
    }

    pub fn failing(error: OracleError) -> Self {
        Self::with_default(OracleBehavior::Fail(error))
    }

    pub fn for_target(mut self, target_repo: impl Into<String>, behavior: OracleBehavior) -> Self {
        self.per_target.insert(target_repo.into(), behavior);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn last_context(&self) -> Vec<FileContext> {
        self.last_context.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImpactOracle for FixedOracle {
    async fn classify(
        &self,
        _event: &ChangeEvent,
        edge: &DependencyEdge,
        context: &[FileContext],
    ) -> Result<TriageVerdict, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_context.lock().unwrap() = context.to_vec();

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let behavior = self
            .per_target
            .get(&edge.target_repo)
            .unwrap_or(&self.default);
        match behavior {
            OracleBehavior::Answer(v) => Ok(v.clone()),
            OracleBehavior::Fail(e) => Err(e.clone()),
            OracleBehavior::Panic(msg) => panic!("{msg}"),
        }
    }
}

// ---------------------------------------------------------------------------
// ScriptedGenerator
// ---------------------------------------------------------------------------

/// Text generator returning a fixed reply or error.
#[derive(Debug, Clone)]
pub struct ScriptedGenerator {
    reply: Result<String, OracleError>,
    delay: Option<Duration>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl ScriptedGenerator {
    pub fn replying(reply: impl Into<String>) -> Self {
        Self {
            reply: Ok(reply.into()),
            delay: None,
            prompts: Arc::default(),
        }
    }

    pub fn failing(error: OracleError) -> Self {
        Self {
            reply: Err(error),
            delay: None,
            prompts: Arc::default(),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, OracleError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.reply.clone()
    }
}

// ---------------------------------------------------------------------------
// Issue trackers and notifiers
// ---------------------------------------------------------------------------

/// An issue captured by [`RecordingIssueTracker`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedIssue {
    pub repo: String,
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
}

/// Issue tracker that records every created issue.
#[derive(Debug, Default)]
pub struct RecordingIssueTracker {
    issues: Mutex<Vec<RecordedIssue>>,
}

impl RecordingIssueTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created(&self) -> Vec<RecordedIssue> {
        self.issues.lock().unwrap().clone()
    }
}

#[async_trait]
impl IssueTracker for RecordingIssueTracker {
    async fn create_issue(
        &self,
        repo: &str,
        title: &str,
        body: &str,
        labels: &[String],
    ) -> Result<IssueRef, ActuatorError> {
        let mut issues = self.issues.lock().unwrap();
        issues.push(RecordedIssue {
            repo: repo.to_string(),
            title: title.to_string(),
            body: body.to_string(),
            labels: labels.to_vec(),
        });
        Ok(IssueRef {
            number: issues.len() as u64,
            url: format!("https://github.com/{repo}/issues/{}", issues.len()),
        })
    }
}

/// Issue tracker whose every call fails.
#[derive(Debug, Default)]
pub struct FailingIssueTracker;

#[async_trait]
impl IssueTracker for FailingIssueTracker {
    async fn create_issue(
        &self,
        repo: &str,
        _title: &str,
        _body: &str,
        _labels: &[String],
    ) -> Result<IssueRef, ActuatorError> {
        Err(ActuatorError::IssueCreation {
            repo: repo.to_string(),
            detail: "HTTP 403: rate limit exceeded".to_string(),
        })
    }
}

/// Notifier that records every notification.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), ActuatorError> {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}
