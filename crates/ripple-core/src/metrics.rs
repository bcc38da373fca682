//! Global atomic counters for dispatch runs.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as one `info!` event.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::domain::TriageStage;

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    dispatches: AtomicU64,
    outcomes_completed: AtomicU64,
    outcomes_failed: AtomicU64,
    outcomes_skipped: AtomicU64,
    issues_created: AtomicU64,
    notifications_sent: AtomicU64,
    actuator_failures: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of all counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    pub dispatches: u64,
    pub outcomes_completed: u64,
    pub outcomes_failed: u64,
    pub outcomes_skipped: u64,
    pub issues_created: u64,
    pub notifications_sent: u64,
    pub actuator_failures: u64,
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            dispatches: AtomicU64::new(0),
            outcomes_completed: AtomicU64::new(0),
            outcomes_failed: AtomicU64::new(0),
            outcomes_skipped: AtomicU64::new(0),
            issues_created: AtomicU64::new(0),
            notifications_sent: AtomicU64::new(0),
            actuator_failures: AtomicU64::new(0),
        }
    }

    pub fn inc_dispatches(&self) {
        self.dispatches.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "dispatches", "counter incremented");
    }

    /// Count one outcome by its terminal stage. Non-terminal stages are ignored.
    pub fn record_outcome(&self, terminal: TriageStage) {
        let counter = match terminal {
            TriageStage::Completed => &self.outcomes_completed,
            TriageStage::Failed => &self.outcomes_failed,
            TriageStage::Skipped => &self.outcomes_skipped,
            _ => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "outcomes", stage = ?terminal, "counter incremented");
    }

    pub fn inc_issues_created(&self) {
        self.issues_created.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "issues_created", "counter incremented");
    }

    pub fn inc_notifications_sent(&self) {
        self.notifications_sent.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "notifications_sent", "counter incremented");
    }

    pub fn inc_actuator_failures(&self) {
        self.actuator_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "actuator_failures", "counter incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            dispatches: self.dispatches.load(Ordering::Relaxed),
            outcomes_completed: self.outcomes_completed.load(Ordering::Relaxed),
            outcomes_failed: self.outcomes_failed.load(Ordering::Relaxed),
            outcomes_skipped: self.outcomes_skipped.load(Ordering::Relaxed),
            issues_created: self.issues_created.load(Ordering::Relaxed),
            notifications_sent: self.notifications_sent.load(Ordering::Relaxed),
            actuator_failures: self.actuator_failures.load(Ordering::Relaxed),
        }
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        let s = self.snapshot();
        tracing::info!(
            metric = "flush",
            dispatches = s.dispatches,
            outcomes_completed = s.outcomes_completed,
            outcomes_failed = s.outcomes_failed,
            outcomes_skipped = s.outcomes_skipped,
            issues_created = s.issues_created,
            notifications_sent = s.notifications_sent,
            actuator_failures = s.actuator_failures,
        );
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        for counter in [
            &self.dispatches,
            &self.outcomes_completed,
            &self.outcomes_failed,
            &self.outcomes_skipped,
            &self.issues_created,
            &self.notifications_sent,
            &self.actuator_failures,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcomes_counted_by_terminal_stage() {
        let m = Metrics::new();
        m.record_outcome(TriageStage::Completed);
        m.record_outcome(TriageStage::Completed);
        m.record_outcome(TriageStage::Failed);
        m.record_outcome(TriageStage::Classifying);
        let s = m.snapshot();
        assert_eq!(s.outcomes_completed, 2);
        assert_eq!(s.outcomes_failed, 1);
        assert_eq!(s.outcomes_skipped, 0);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        m.inc_dispatches();
        m.inc_issues_created();
        m.inc_notifications_sent();
        m.inc_actuator_failures();
        m.reset();
        assert_eq!(m.snapshot(), MetricsSnapshot::default());
    }
}
