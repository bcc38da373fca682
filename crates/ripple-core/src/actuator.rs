//! Turns triage outcomes into external effects.
//!
//! Effects are best effort: an [`ActuatorError`] is logged and counted but
//! never changes the outcome it was acting on, and nothing is retried.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::domain::{
    ActuatorError, ChangeEvent, DependencyEdge, EdgeKind, TriageOutcome, TriageVerdict, Urgency,
};
use crate::metrics::METRICS;
use crate::obs;
use crate::policy::{Decision, DecisionPolicy};

/// Issue created in a dependent repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueRef {
    pub number: u64,
    #[serde(default)]
    pub url: String,
}

/// Issue-tracking boundary.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    async fn create_issue(
        &self,
        repo: &str,
        title: &str,
        body: &str,
        labels: &[String],
    ) -> Result<IssueRef, ActuatorError>;
}

/// Message for the external notification sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub source_repo: String,
    pub target_repo: String,
    pub urgency: Urgency,
    pub message: String,
    pub confidence: f64,
}

/// Notification boundary (chat webhook or similar).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), ActuatorError>;
}

/// Stable dedupe key for one triage of one edge.
pub fn triage_fingerprint(
    source_repo: &str,
    commit_sha: &str,
    target_repo: &str,
    kind: EdgeKind,
) -> String {
    let kind = kind.to_string();
    let mut hasher = Sha256::new();
    for part in [source_repo, commit_sha, target_repo, kind.as_str()] {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}

pub fn render_issue_title(kind: EdgeKind, source_repo: &str) -> String {
    match kind {
        EdgeKind::Consumer => format!("Dependency Update Required: {source_repo}"),
        EdgeKind::Derivative => format!("Template Update Available: {source_repo}"),
    }
}

pub fn render_issue_body(
    event: &ChangeEvent,
    edge: &DependencyEdge,
    verdict: &TriageVerdict,
) -> String {
    let affected = if verdict.affected_files.is_empty() {
        "No specific files identified".to_string()
    } else {
        verdict
            .affected_files
            .iter()
            .map(|f| format!("- `{f}`"))
            .collect::<Vec<_>>()
            .join("\n")
    };
    let recommended = if verdict.recommended_changes.trim().is_empty() {
        "None provided"
    } else {
        verdict.recommended_changes.as_str()
    };
    let fingerprint = triage_fingerprint(
        &event.source_repo,
        &event.commit_sha,
        &edge.target_repo,
        edge.kind(),
    );

    format!(
        "## Dependency Change Notification\n\n\
         **Source Repository**: {source}\n\
         **Commit**: {short_sha}\n\
         **Branch**: {branch}\n\
         **Urgency**: {urgency}\n\
         **Confidence**: {confidence:.0}%\n\n\
         ### Impact Summary\n{summary}\n\n\
         ### Commit Message\n```\n{message}\n```\n\n\
         ### Recommended Changes\n{recommended}\n\n\
         ### Affected Files in This Repository\n{affected}\n\n\
         ### Reasoning\n{reasoning}\n\n\
         ---\n\
         *Commit: [{short_sha}](https://github.com/{source}/commit/{sha})*\n\
         <!-- ripple-fingerprint: {fingerprint} -->\n",
        source = event.source_repo,
        short_sha = event.short_sha(),
        branch = event.branch,
        urgency = verdict.urgency.as_str().to_uppercase(),
        confidence = verdict.confidence * 100.0,
        summary = verdict.impact_summary,
        message = event.commit_message,
        reasoning = verdict.reasoning,
        sha = event.commit_sha,
    )
}

/// Discord-compatible webhook payload.
pub fn render_webhook_payload(notification: &Notification) -> Value {
    let color = match notification.urgency {
        Urgency::Critical => 15_158_332,
        _ => 16_776_960,
    };
    json!({
        "content": format!("**Dependency Alert** ({})", notification.urgency),
        "embeds": [{
            "title": format!("Action Required: {}", notification.target_repo),
            "description": notification.message,
            "color": color,
            "fields": [
                {"name": "Source Repository", "value": notification.source_repo, "inline": true},
                {"name": "Urgency", "value": notification.urgency.as_str().to_uppercase(), "inline": true},
                {"name": "Confidence", "value": format!("{:.0}%", notification.confidence * 100.0), "inline": true},
            ],
            "timestamp": Utc::now().to_rfc3339(),
        }]
    })
}

// ---------------------------------------------------------------------------
// WebhookNotifier
// ---------------------------------------------------------------------------

/// Posts [`render_webhook_payload`] to a webhook URL.
pub struct WebhookNotifier {
    url: String,
    http_client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("ripple/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            url: url.into(),
            http_client,
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), ActuatorError> {
        let response = self
            .http_client
            .post(&self.url)
            .json(&render_webhook_payload(notification))
            .send()
            .await
            .map_err(|e| ActuatorError::Notification {
                detail: e.to_string(),
            })?;
        if !response.status().is_success() {
            return Err(ActuatorError::Notification {
                detail: format!("webhook returned HTTP {}", response.status().as_u16()),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Dry-run sinks
// ---------------------------------------------------------------------------

/// Logs issues instead of creating them.
#[derive(Debug, Default)]
pub struct LogIssueTracker;

#[async_trait]
impl IssueTracker for LogIssueTracker {
    async fn create_issue(
        &self,
        repo: &str,
        title: &str,
        body: &str,
        labels: &[String],
    ) -> Result<IssueRef, ActuatorError> {
        info!(repo, title, labels = ?labels, body_chars = body.len(), "dry run: would create issue");
        Ok(IssueRef {
            number: 0,
            url: String::new(),
        })
    }
}

/// Logs notifications instead of sending them.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), ActuatorError> {
        info!(
            target_repo = %notification.target_repo,
            urgency = %notification.urgency,
            "dry run: would notify"
        );
        Ok(())
    }
}

/// Notifier used when no webhook is configured.
#[derive(Debug, Default)]
pub struct DisabledNotifier;

#[async_trait]
impl Notifier for DisabledNotifier {
    async fn notify(&self, _notification: &Notification) -> Result<(), ActuatorError> {
        Err(ActuatorError::NotConfigured {
            what: "WEBHOOK_URL".to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Actuator
// ---------------------------------------------------------------------------

/// What the actuator did for one outcome.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ActionReport {
    pub target_repo: String,
    pub decision: Decision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue: Option<IssueRef>,
    pub notified: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

/// Applies the [`DecisionPolicy`] to outcomes and carries out the effects.
#[derive(Clone)]
pub struct Actuator {
    issues: Arc<dyn IssueTracker>,
    notifier: Arc<dyn Notifier>,
    policy: DecisionPolicy,
}

impl Actuator {
    pub fn new(issues: Arc<dyn IssueTracker>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            issues,
            notifier,
            policy: DecisionPolicy::canonical(),
        }
    }

    pub fn with_policy(mut self, policy: DecisionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Logging-only actuator for dry runs.
    pub fn dry_run() -> Self {
        Self::new(Arc::new(LogIssueTracker), Arc::new(LogNotifier))
    }

    pub fn policy(&self) -> &DecisionPolicy {
        &self.policy
    }

    /// Act on one outcome. Failed and Skipped outcomes are only logged.
    pub async fn handle(&self, event: &ChangeEvent, outcome: &TriageOutcome) -> ActionReport {
        let target = outcome.edge.target_repo.as_str();
        let decision = self.policy.decide(outcome);
        let mut report = ActionReport {
            target_repo: target.to_string(),
            decision: decision.clone(),
            ..ActionReport::default()
        };
        let Some(verdict) = outcome.verdict() else {
            return report;
        };
        if decision.is_noop() {
            return report;
        }

        if decision.create_issue {
            let title = render_issue_title(outcome.edge.kind(), &event.source_repo);
            let body = render_issue_body(event, &outcome.edge, verdict);
            match self
                .issues
                .create_issue(target, &title, &body, &decision.labels)
                .await
            {
                Ok(issue) => {
                    METRICS.inc_issues_created();
                    obs::emit_action_taken(target, "create_issue", &format!("#{}", issue.number));
                    report.issue = Some(issue);
                }
                Err(e) => {
                    METRICS.inc_actuator_failures();
                    obs::emit_action_failed(target, "create_issue", &e);
                    report.errors.push(e.to_string());
                }
            }
        }

        if decision.notify {
            let notification = Notification {
                source_repo: event.source_repo.clone(),
                target_repo: target.to_string(),
                urgency: verdict.urgency,
                message: verdict.impact_summary.clone(),
                confidence: verdict.confidence,
            };
            match self.notifier.notify(&notification).await {
                Ok(()) => {
                    METRICS.inc_notifications_sent();
                    obs::emit_action_taken(target, "notify", verdict.urgency.as_str());
                    report.notified = true;
                }
                Err(e) => {
                    METRICS.inc_actuator_failures();
                    obs::emit_action_failed(target, "notify", &e);
                    report.errors.push(e.to_string());
                }
            }
        }

        if !report.errors.is_empty() {
            warn!(target_repo = %target, errors = report.errors.len(), "actuator finished with errors");
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ConsumerPolicy, DerivativePolicy, TriageStage, TriageStatus};
    use crate::fakes::{FailingIssueTracker, RecordingIssueTracker, RecordingNotifier};

    fn verdict(requires_action: bool, urgency: Urgency) -> TriageVerdict {
        TriageVerdict {
            requires_action,
            urgency,
            impact_summary: "Health endpoint moved".to_string(),
            affected_files: vec!["client.py".to_string()],
            recommended_changes: "1. Update the URL".to_string(),
            confidence: 0.82,
            reasoning: "client.py calls /health".to_string(),
        }
    }

    fn completed(v: TriageVerdict) -> TriageOutcome {
        TriageOutcome {
            source_repo: "org/provider".to_string(),
            commit_sha: "0123456789".to_string(),
            edge: DependencyEdge::consumer("org/app", ConsumerPolicy::default()),
            status: TriageStatus::Completed {
                verdict: v,
                overridden_from: None,
            },
            stages: vec![TriageStage::Pending, TriageStage::Completed],
            finished_at: Utc::now(),
        }
    }

    fn event() -> ChangeEvent {
        ChangeEvent::new("org/provider", "0123456789").with_message("Move /health")
    }

    #[test]
    fn test_fingerprint_is_stable_and_distinct() {
        let a = triage_fingerprint("org/p", "abc", "org/app", EdgeKind::Consumer);
        let b = triage_fingerprint("org/p", "abc", "org/app", EdgeKind::Consumer);
        let c = triage_fingerprint("org/p", "abc", "org/app", EdgeKind::Derivative);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_issue_body_sections() {
        let edge = DependencyEdge::derivative("org/fork", DerivativePolicy::default());
        let body = render_issue_body(&event(), &edge, &verdict(true, Urgency::High));
        assert!(body.contains("**Commit**: 0123456"));
        assert!(body.contains("**Urgency**: HIGH"));
        assert!(body.contains("**Confidence**: 82%"));
        assert!(body.contains("- `client.py`"));
        assert!(body.contains("ripple-fingerprint: "));
        assert_eq!(
            render_issue_title(EdgeKind::Derivative, "org/provider"),
            "Template Update Available: org/provider"
        );
    }

    #[test]
    fn test_webhook_payload_shape() {
        let payload = render_webhook_payload(&Notification {
            source_repo: "org/provider".to_string(),
            target_repo: "org/app".to_string(),
            urgency: Urgency::Critical,
            message: "breaking".to_string(),
            confidence: 0.9,
        });
        assert_eq!(payload["embeds"][0]["color"], 15_158_332);
        assert_eq!(payload["embeds"][0]["fields"][1]["value"], "CRITICAL");
        assert_eq!(payload["embeds"][0]["fields"][2]["value"], "90%");
    }

    #[tokio::test]
    async fn test_high_creates_issue_and_notifies() {
        let issues = Arc::new(RecordingIssueTracker::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let actuator = Actuator::new(issues.clone(), notifier.clone());
        let report = actuator
            .handle(&event(), &completed(verdict(true, Urgency::High)))
            .await;
        assert!(report.issue.is_some());
        assert!(report.notified);
        assert_eq!(issues.created().len(), 1);
        assert_eq!(notifier.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_no_action_verdict_makes_no_calls() {
        let issues = Arc::new(RecordingIssueTracker::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let actuator = Actuator::new(issues.clone(), notifier.clone());
        for urgency in Urgency::ALL {
            actuator
                .handle(&event(), &completed(verdict(false, urgency)))
                .await;
        }
        assert!(issues.created().is_empty());
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_issue_failure_does_not_block_notification() {
        let notifier = Arc::new(RecordingNotifier::new());
        let actuator = Actuator::new(Arc::new(FailingIssueTracker), notifier.clone());
        let outcome = completed(verdict(true, Urgency::Critical));
        let report = actuator.handle(&event(), &outcome).await;
        assert!(report.issue.is_none());
        assert!(report.notified);
        assert_eq!(report.errors.len(), 1);
        assert!(outcome.is_completed());
    }

    fn notification() -> Notification {
        Notification {
            source_repo: "org/provider".to_string(),
            target_repo: "org/app".to_string(),
            urgency: Urgency::High,
            message: "Health endpoint moved".to_string(),
            confidence: 0.82,
        }
    }

    #[tokio::test]
    async fn test_webhook_posts_embed() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        WebhookNotifier::new(format!("{}/hook", server.uri()))
            .notify(&notification())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_webhook_rejection_is_notification_error() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = WebhookNotifier::new(server.uri())
            .notify(&notification())
            .await
            .unwrap_err();
        match err {
            ActuatorError::Notification { detail } => assert!(detail.contains("HTTP 500")),
            other => panic!("unexpected error {other:?}"),
        }
    }
}
