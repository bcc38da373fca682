//! Relevance filter: does a change event matter to a given edge?
//!
//! Pure and synchronous. Consumer edges match on trigger categories extracted
//! from keywords, file paths and the commit message, or on interface file
//! paths. Derivative edges weigh shared concerns against divergent ones and
//! only sync on a strict win; ties (including 0 = 0) are not relevant.
//!
//! Tags without a vocabulary entry are matched literally.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::domain::{ChangeEvent, ConsumerPolicy, DependencyEdge, DerivativePolicy, EdgePolicy};

/// Consumer trigger categories and the words that indicate them.
pub const TRIGGER_VOCABULARY: &[(&str, &[&str])] = &[
    (
        "api_contract",
        &["api", "endpoint", "route", "contract", "schema", "interface"],
    ),
    (
        "authentication",
        &["auth", "token", "credential", "security", "login"],
    ),
    (
        "deployment",
        &["docker", "deploy", "port", "host", "url", "environment"],
    ),
    ("configuration", &["config", "setting", "env", "parameter"]),
    ("endpoints", &["endpoint", "route", "path", "url", "api"]),
];

/// Path fragments marking a file as part of an API surface.
pub const API_SURFACE_PATHS: &[&str] = &[
    "api", "route", "endpoint", "controller", "server", "app.py", "main.py",
];

/// Categories implied by touching an API surface file.
const API_SURFACE_CATEGORIES: &[&str] = &["api_contract", "endpoints"];

/// Derivative concern tags (shared or divergent) and their path/keyword fragments.
pub const CONCERN_VOCABULARY: &[(&str, &[&str])] = &[
    (
        "infrastructure",
        &["docker", "compose", "deploy", "infra", "terraform"],
    ),
    (
        "docker",
        &["dockerfile", "docker-compose", ".dockerignore", "docker"],
    ),
    (
        "deployment",
        &["deploy", "k8s", "kubernetes", "helm", "compose"],
    ),
    (
        "gpu_configuration",
        &["gpu", "cuda", "nvidia", "vram", "device"],
    ),
    ("health_checks", &["health", "readiness", "liveness", "probe"]),
    ("logging", &["log", "logger", "logging", "monitor"]),
    ("monitoring", &["monitor", "metric", "prometheus", "grafana"]),
    (
        "application_logic",
        &["app.py", "main.py", "service", "business"],
    ),
    ("model_specific", &["model", "inference", "generation", "prompt"]),
    ("api_endpoints", &["endpoint", "route", "api/", "handler"]),
    ("business_logic", &["business", "logic", "service", "domain"]),
];

fn vocabulary<'a>(table: &'a [(&'a str, &'a [&'a str])], tag: &str) -> Option<&'a [&'a str]> {
    table.iter().find(|(t, _)| *t == tag).map(|(_, words)| *words)
}

/// Lowercase alphanumeric words of `text`.
fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_ascii_lowercase())
}

/// Why an edge was (or was not) judged relevant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RelevanceReport {
    Consumer {
        matched_triggers: BTreeSet<String>,
        /// Changed paths that hit a configured interface file.
        interface_matches: Vec<String>,
    },
    Derivative {
        shared_score: usize,
        divergent_score: usize,
        matched_shared: BTreeSet<String>,
        matched_divergent: BTreeSet<String>,
        /// Changed paths in shared and not divergent areas.
        relevant_files: Vec<String>,
    },
    /// Edge has no trigger or concern tags; never relevant.
    Unconfigured,
}

impl RelevanceReport {
    pub fn is_relevant(&self) -> bool {
        match self {
            RelevanceReport::Consumer {
                matched_triggers,
                interface_matches,
            } => !matched_triggers.is_empty() || !interface_matches.is_empty(),
            RelevanceReport::Derivative {
                shared_score,
                divergent_score,
                ..
            } => *shared_score > 0 && shared_score > divergent_score,
            RelevanceReport::Unconfigured => false,
        }
    }

    /// Short human-readable explanation, used as the skip reason.
    pub fn reason(&self) -> String {
        match self {
            RelevanceReport::Unconfigured => {
                "not relevant: edge has no trigger or concern tags configured".to_string()
            }
            RelevanceReport::Consumer { .. } if !self.is_relevant() => {
                "not relevant: no trigger category or interface file matched".to_string()
            }
            RelevanceReport::Consumer {
                matched_triggers,
                interface_matches,
            } => format!(
                "relevant: triggers {:?}, interface files {:?}",
                matched_triggers, interface_matches
            ),
            RelevanceReport::Derivative {
                shared_score,
                divergent_score,
                ..
            } => format!(
                "{}: shared score {} vs divergent score {}",
                if self.is_relevant() { "relevant" } else { "not relevant" },
                shared_score,
                divergent_score
            ),
        }
    }

    /// Paths to fetch from the dependent for context.
    pub fn context_paths(&self, edge: &DependencyEdge) -> Vec<String> {
        match (self, &edge.policy) {
            (RelevanceReport::Consumer { .. }, EdgePolicy::Consumer(p)) => {
                p.interface_files.clone()
            }
            (RelevanceReport::Derivative { relevant_files, .. }, _) => relevant_files.clone(),
            _ => Vec::new(),
        }
    }
}

/// Evaluate `edge` against `event` and explain the result.
pub fn assess(event: &ChangeEvent, edge: &DependencyEdge) -> RelevanceReport {
    if edge.has_no_tags() {
        return RelevanceReport::Unconfigured;
    }
    match &edge.policy {
        EdgePolicy::Consumer(policy) => assess_consumer(event, policy),
        EdgePolicy::Derivative(policy) => assess_derivative(event, policy),
    }
}

/// `true` iff the change is pertinent to `edge`.
pub fn is_relevant(event: &ChangeEvent, edge: &DependencyEdge) -> bool {
    assess(event, edge).is_relevant()
}

/// Trigger categories and literal terms the event exhibits.
pub fn extract_signals(event: &ChangeEvent) -> BTreeSet<String> {
    let mut words: BTreeSet<String> = event.pattern_summary.terms().collect();
    for term in event.pattern_summary.terms() {
        words.extend(tokens(&term).collect::<Vec<_>>());
    }
    words.extend(tokens(&event.commit_message));
    for file in &event.changed_files {
        words.extend(tokens(&file.path));
    }

    let mut signals = words.clone();
    for (category, vocab) in TRIGGER_VOCABULARY {
        if words
            .iter()
            .any(|w| vocab.iter().any(|v| w.starts_with(v)))
        {
            signals.insert((*category).to_string());
        }
    }
    let touches_api_surface = event.changed_files.iter().any(|f| {
        let path = f.path.to_ascii_lowercase();
        API_SURFACE_PATHS.iter().any(|p| path.contains(p))
    });
    if touches_api_surface {
        signals.extend(API_SURFACE_CATEGORIES.iter().map(|c| (*c).to_string()));
    }
    signals
}

fn assess_consumer(event: &ChangeEvent, policy: &ConsumerPolicy) -> RelevanceReport {
    let signals = extract_signals(event);
    let matched_triggers = policy
        .triggers
        .iter()
        .filter(|t| {
            let tag = t.to_ascii_lowercase();
            signals.contains(&tag)
                || (vocabulary(TRIGGER_VOCABULARY, &tag).is_none()
                    && signals.iter().any(|s| s.starts_with(&tag)))
        })
        .cloned()
        .collect();

    let interface_matches = event
        .changed_files
        .iter()
        .filter(|f| {
            policy
                .interface_files
                .iter()
                .any(|i| !i.is_empty() && (f.path == *i || f.path.starts_with(i.as_str())))
        })
        .map(|f| f.path.clone())
        .collect();

    RelevanceReport::Consumer {
        matched_triggers,
        interface_matches,
    }
}

fn concern_matches(item: &str, tag: &str) -> bool {
    let tag = tag.to_ascii_lowercase();
    match vocabulary(CONCERN_VOCABULARY, &tag) {
        Some(words) => words.iter().any(|w| item.contains(w)),
        None => item.contains(&tag),
    }
}

fn assess_derivative(event: &ChangeEvent, policy: &DerivativePolicy) -> RelevanceReport {
    let paths: Vec<(String, &str)> = event
        .changed_files
        .iter()
        .map(|f| (f.path.to_ascii_lowercase(), f.path.as_str()))
        .collect();
    let items: Vec<String> = paths
        .iter()
        .map(|(lower, _)| lower.clone())
        .chain(event.pattern_summary.terms())
        .collect();

    let mut matched_shared = BTreeSet::new();
    let mut matched_divergent = BTreeSet::new();
    let mut shared_score = 0;
    let mut divergent_score = 0;

    for item in &items {
        let shared: Vec<&String> = policy
            .shared_concerns
            .iter()
            .filter(|c| concern_matches(item, c))
            .collect();
        let divergent: Vec<&String> = policy
            .divergent_concerns
            .iter()
            .filter(|c| concern_matches(item, c))
            .collect();
        if !shared.is_empty() {
            shared_score += 1;
        }
        if !divergent.is_empty() {
            divergent_score += 1;
        }
        matched_shared.extend(shared.into_iter().cloned());
        matched_divergent.extend(divergent.into_iter().cloned());
    }

    let relevant_files = paths
        .iter()
        .filter(|(lower, _)| {
            policy.shared_concerns.iter().any(|c| concern_matches(lower, c))
                && !policy
                    .divergent_concerns
                    .iter()
                    .any(|c| concern_matches(lower, c))
        })
        .map(|(_, original)| (*original).to_string())
        .collect();

    RelevanceReport::Derivative {
        shared_score,
        divergent_score,
        matched_shared,
        matched_divergent,
        relevant_files,
    }
}
