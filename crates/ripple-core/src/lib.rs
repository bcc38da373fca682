//! Ripple Core Library
//!
//! Propagates a change in one repository to every repository that depends on
//! it, either as an API consumer or as a template derivative, and decides per
//! dependent whether a human needs to act.
//!
//! ## Flow
//!
//! `ChangeEvent` → [`Orchestrator`] → graph lookup → one [`TriagePipeline`]
//! per edge (concurrent) → [`Actuator`] (issues, notifications).
//!
//! ## Key Components
//!
//! - [`RelationshipGraph`]: copy-on-write source → edges map
//! - [`relevance`]: pure per-edge relevance filter
//! - [`ContextFetcher`]: bounded reads of the dependent's files
//! - [`oracle`]: impact classification against an LLM, parsed with one repair pass
//! - [`policy`]: urgency → action thresholds

pub mod actuator;
pub mod config;
pub mod context;
pub mod domain;
pub mod fakes;
pub mod github;
pub mod graph;
pub mod metrics;
pub mod obs;
pub mod oracle;
pub mod orchestrator;
pub mod pipeline;
pub mod policy;
pub mod relevance;
pub mod telemetry;

pub use actuator::{
    Actuator, ActionReport, DisabledNotifier, IssueRef, IssueTracker, LogIssueTracker,
    LogNotifier, Notification, Notifier, WebhookNotifier,
};
pub use config::{EngineConfig, RelationshipDocument, RelationshipStore};
pub use context::{ContentSource, ContextFetcher, ContextLimits, FileContext};
pub use domain::{
    validate_change_event, ActuatorError, ChangeEvent, ChangeKind, ChangedFile, ConfigError,
    ConsumerPolicy, DependencyEdge, DerivativePolicy, EdgeKind, EdgePolicy, FetchError,
    OracleError, PatternSummary, Result, RippleError, TriageOutcome, TriageStage, TriageStatus,
    TriageVerdict, Urgency, ValidationError,
};
pub use github::{GitHubClient, GitHubConfig};
pub use graph::{DependencySummary, GraphSnapshot, LinkedRepo, RelationshipGraph, UpsertOutcome};
pub use oracle::{AnthropicConfig, AnthropicGenerator, ImpactOracle, LlmOracle, TextGenerator};
pub use orchestrator::{AckStatus, DispatchAck, DispatchReport, Orchestrator, ShutdownReport};
pub use pipeline::TriagePipeline;
pub use policy::{Decision, DecisionPolicy};
pub use relevance::{is_relevant, RelevanceReport};
pub use telemetry::init_tracing;

/// Crate version, for user agents and `--version` output.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
