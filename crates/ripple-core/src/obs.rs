//! Structured lifecycle events for dispatch runs.
//!
//! Every event is an `info!` (or `warn!` for failures) with an `event` field,
//! so log pipelines can filter on `event = "triage.finished"` and friends.

use tracing::{info, warn};

use crate::domain::{EdgeKind, TriageStage, Urgency};

/// RAII guard that enters a dispatch-scoped span.
///
/// Only hold this across synchronous code; async work is instrumented with
/// [`dispatch_span`] instead.
pub struct DispatchSpan {
    _span: tracing::span::EnteredSpan,
}

impl DispatchSpan {
    pub fn enter(dispatch_id: &str, source_repo: &str, commit_sha: &str) -> Self {
        Self {
            _span: dispatch_span(dispatch_id, source_repo, commit_sha).entered(),
        }
    }
}

/// Span tagged with the dispatch id, source repo and commit.
pub fn dispatch_span(dispatch_id: &str, source_repo: &str, commit_sha: &str) -> tracing::Span {
    tracing::info_span!(
        "ripple.dispatch",
        dispatch_id = %dispatch_id,
        source_repo = %source_repo,
        commit = %commit_sha,
    )
}

pub fn emit_dispatch_accepted(source_repo: &str, commit_sha: &str, edge_count: usize) {
    info!(
        event = "dispatch.accepted",
        source_repo = %source_repo,
        commit = %commit_sha,
        edge_count = edge_count,
    );
}

pub fn emit_dispatch_rejected(source_repo: &str, error: &dyn std::fmt::Display) {
    warn!(event = "dispatch.rejected", source_repo = %source_repo, error = %error);
}

pub fn emit_stage(target_repo: &str, kind: EdgeKind, stage: TriageStage) {
    tracing::debug!(
        event = "triage.stage",
        target_repo = %target_repo,
        kind = %kind,
        stage = ?stage,
    );
}

pub fn emit_triage_finished(
    target_repo: &str,
    kind: EdgeKind,
    terminal: TriageStage,
    urgency: Option<Urgency>,
    duration_ms: u64,
) {
    info!(
        event = "triage.finished",
        target_repo = %target_repo,
        kind = %kind,
        status = ?terminal,
        urgency = urgency.map(|u| u.as_str()),
        duration_ms = duration_ms,
    );
}

pub fn emit_action_taken(target_repo: &str, action: &str, detail: &str) {
    info!(event = "action.taken", target_repo = %target_repo, action = %action, detail = %detail);
}

pub fn emit_action_failed(target_repo: &str, action: &str, error: &dyn std::fmt::Display) {
    warn!(event = "action.failed", target_repo = %target_repo, action = %action, error = %error);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_span_enter() {
        let _span = DispatchSpan::enter("d-1", "org/provider", "abc1234");
        emit_stage("org/app", EdgeKind::Consumer, TriageStage::Filtering);
    }
}
