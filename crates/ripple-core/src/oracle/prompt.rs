//! Prompt construction for the impact oracle.

use std::fmt::Write as _;

use serde_json::{json, Value};

use crate::context::FileContext;
use crate::domain::{ChangeEvent, ConsumerPolicy, DependencyEdge, DerivativePolicy, EdgePolicy};
use crate::relevance::{self, RelevanceReport};

/// Changed files beyond this are left out of the prompt.
pub const MAX_PROMPT_FILES: usize = 10;
/// Per-file diff excerpt length, in characters.
pub const MAX_DIFF_CHARS: usize = 1_500;
/// Per-file dependent context excerpt length, in characters.
pub const MAX_CONTEXT_CHARS: usize = 2_000;

/// JSON object the oracle must answer with.
pub const RESPONSE_SCHEMA: &str = r#"{
  "requires_action": true/false,
  "urgency": "critical|high|medium|low",
  "impact_summary": "The key change and why it matters, in 1-2 sentences",
  "affected_files": ["only files present in the dependent context above"],
  "recommended_changes": "Numbered, concrete steps for the dependent",
  "confidence": 0.0-1.0,
  "reasoning": "Why the dependent does or does not need to act"
}"#;

const URGENCY_GUIDE_CONSUMER: &str = "\
- critical: breaking change that will cause immediate failures
- high: breaking change that will cause issues soon
- medium: non-breaking but important update needed
- low: optional improvement or informational";

const URGENCY_GUIDE_DERIVATIVE: &str = "\
- critical: security patch or critical bug fix
- high: important infrastructure improvement or bug fix
- medium: nice-to-have optimization or enhancement
- low: minor improvement or informational";

fn excerpt(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

fn files_summary(event: &ChangeEvent, only: Option<&[String]>) -> Value {
    let files: Vec<Value> = event
        .changed_files
        .iter()
        .filter(|f| only.map_or(true, |paths| paths.contains(&f.path)))
        .take(MAX_PROMPT_FILES)
        .map(|f| {
            json!({
                "path": f.path,
                "change_type": f.kind,
                "diff": excerpt(&f.diff, MAX_DIFF_CHARS),
            })
        })
        .collect();
    Value::Array(files)
}

fn context_summary(context: &[FileContext]) -> Value {
    let mut map = serde_json::Map::new();
    for file in context {
        let value = match (&file.content, &file.absent_reason) {
            (Some(content), _) => Value::String(excerpt(content, MAX_CONTEXT_CHARS).to_string()),
            (None, Some(reason)) => Value::String(format!("<unavailable: {reason}>")),
            (None, None) => Value::String("<unavailable>".to_string()),
        };
        map.insert(file.path.clone(), value);
    }
    Value::Object(map)
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}

/// Render the full prompt for one edge.
pub fn build_prompt(event: &ChangeEvent, edge: &DependencyEdge, context: &[FileContext]) -> String {
    match &edge.policy {
        EdgePolicy::Consumer(policy) => consumer_prompt(event, edge, policy, context),
        EdgePolicy::Derivative(policy) => derivative_prompt(event, edge, policy, context),
    }
}

fn header(out: &mut String, event: &ChangeEvent, only: Option<&[String]>) {
    let _ = writeln!(out, "Commit: {} on {}", event.short_sha(), event.branch);
    let _ = writeln!(out, "Commit Message: {}\n", event.commit_message);
    let _ = writeln!(out, "Files Changed:\n{}\n", pretty(&files_summary(event, only)));
    let _ = writeln!(
        out,
        "Pattern Summary:\n{}\n",
        pretty(&json!(event.pattern_summary))
    );
}

fn consumer_prompt(
    event: &ChangeEvent,
    edge: &DependencyEdge,
    policy: &ConsumerPolicy,
    context: &[FileContext],
) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "You are analyzing the impact of changes in a service provider repository on a consumer application.\n"
    );
    let _ = writeln!(out, "Provider Repository (Source): {}", event.source_repo);
    let _ = writeln!(out, "Consumer Repository (Target): {}", edge.target_repo);
    let _ = writeln!(
        out,
        "Relationship: API consumer, the consumer depends on the provider's API or service\n"
    );
    header(&mut out, event, None);
    let _ = writeln!(
        out,
        "Consumer Code Context (how the consumer currently uses the provider):\n{}\n",
        pretty(&context_summary(context))
    );
    let _ = writeln!(out, "Consumer Configuration:");
    let _ = writeln!(out, "- Interface Files: {:?}", policy.interface_files);
    let _ = writeln!(out, "- Change Triggers: {:?}\n", policy.triggers);
    let _ = writeln!(
        out,
        "Decide whether these provider changes require action in the consumer. Consider breaking \
         API contract changes, configuration and deployment changes (ports, URLs, environment), \
         and authentication changes. Only list affected_files that appear in the consumer code \
         context above.\n"
    );
    let _ = writeln!(out, "Respond ONLY with valid JSON in this exact format:\n{RESPONSE_SCHEMA}\n");
    let _ = writeln!(out, "Urgency Levels:\n{URGENCY_GUIDE_CONSUMER}\n");
    let _ = write!(
        out,
        "If the context does not show whether the consumer uses this provider, set \
         requires_action=true and urgency=high, and say so in reasoning."
    );
    out
}

fn derivative_prompt(
    event: &ChangeEvent,
    edge: &DependencyEdge,
    policy: &DerivativePolicy,
    context: &[FileContext],
) -> String {
    let (matched_shared, matched_divergent, relevant_files) = match relevance::assess(event, edge) {
        RelevanceReport::Derivative {
            matched_shared,
            matched_divergent,
            relevant_files,
            ..
        } => (matched_shared, matched_divergent, relevant_files),
        _ => Default::default(),
    };

    let mut out = String::new();
    let _ = writeln!(
        out,
        "You are analyzing changes in a template repository to determine if they should propagate to a derivative (fork).\n"
    );
    let _ = writeln!(out, "Template Repository (Source): {}", event.source_repo);
    let _ = writeln!(out, "Derivative Repository (Target): {}", edge.target_repo);
    let _ = writeln!(
        out,
        "Relationship: template fork, the derivative is based on the template but has diverged\n"
    );
    header(&mut out, event, Some(relevant_files.as_slice()));
    let _ = writeln!(out, "Matched Shared Concerns: {:?}", matched_shared);
    let _ = writeln!(out, "Matched Divergent Concerns: {:?}\n", matched_divergent);
    let _ = writeln!(
        out,
        "Derivative's Current State (same files):\n{}\n",
        pretty(&context_summary(context))
    );
    let _ = writeln!(out, "Derivative Configuration:");
    let _ = writeln!(out, "- Shared Concerns: {:?}", policy.shared_concerns);
    let _ = writeln!(out, "- Divergent Concerns: {:?}", policy.divergent_concerns);
    let _ = writeln!(out, "- Sync Strategy: {}\n", policy.sync_strategy);
    let _ = writeln!(
        out,
        "Decide whether these template changes should be synced to the derivative. Infrastructure \
         improvements and bug fixes usually sync. Application logic, model-specific configuration \
         and API endpoint changes should not.\n"
    );
    let _ = writeln!(out, "Respond ONLY with valid JSON in this exact format:\n{RESPONSE_SCHEMA}\n");
    let _ = writeln!(out, "Urgency Levels:\n{URGENCY_GUIDE_DERIVATIVE}\n");
    let _ = write!(
        out,
        "Only set requires_action=true if the changes benefit the derivative and do not conflict \
         with its divergent concerns."
    );
    out
}
