//! Parse, validate and repair oracle output.
//!
//! The oracle is untrusted: its text is parsed as-is first, and if that fails
//! exactly one repair pass is attempted (strip markdown code fences, keep the
//! outermost `{...}`). Anything still unusable is a
//! [`OracleError::MalformedResponse`], never a default verdict.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::domain::{OracleError, TriageVerdict};

const REQUIRED_FIELDS: &[&str] = &[
    "requires_action",
    "urgency",
    "impact_summary",
    "confidence",
    "reasoning",
];

/// A line holding only a code fence, optionally tagged with a language.
fn fence_pattern() -> Option<&'static Regex> {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    FENCE
        .get_or_init(|| Regex::new(r"(?m)^[ \t]*```[A-Za-z0-9_+-]*[ \t]*\r?$").ok())
        .as_ref()
}

/// Body of the first fenced block, up to the last fence line after it.
///
/// Fences inside JSON string values are escaped onto the same line and never
/// match, so their content survives.
fn fenced_body(raw: &str) -> Option<&str> {
    let re = fence_pattern()?;
    let open = re.find(raw)?;
    let rest = &raw[open.end()..];
    let body = match re.find_iter(rest).last() {
        Some(close) => &rest[..close.start()],
        None => rest,
    };
    Some(body)
}

/// Strip code fences and surrounding prose around a JSON object.
pub fn repair(raw: &str) -> String {
    let trimmed = fenced_body(raw).unwrap_or(raw).trim();
    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => trimmed[start..=end].to_string(),
        _ => trimmed.to_string(),
    }
}

/// Parse oracle text into a validated verdict.
pub fn parse_verdict(raw: &str) -> Result<TriageVerdict, OracleError> {
    let value = match serde_json::from_str::<Value>(raw.trim()) {
        Ok(value) => value,
        Err(first) => {
            let repaired = repair(raw);
            serde_json::from_str::<Value>(&repaired).map_err(|second| {
                OracleError::malformed(format!(
                    "not JSON ({first}); after repair: {second}"
                ))
            })?
        }
    };
    validate(value)
}

fn validate(value: Value) -> Result<TriageVerdict, OracleError> {
    let object = value
        .as_object()
        .ok_or_else(|| OracleError::malformed("response is not a JSON object"))?;
    let missing: Vec<&str> = REQUIRED_FIELDS
        .iter()
        .copied()
        .filter(|field| !object.contains_key(*field))
        .collect();
    if !missing.is_empty() {
        return Err(OracleError::malformed(format!(
            "missing required field(s): {}",
            missing.join(", ")
        )));
    }

    let verdict: TriageVerdict = serde_json::from_value(value)
        .map_err(|e| OracleError::malformed(format!("invalid field: {e}")))?;

    if !(0.0..=1.0).contains(&verdict.confidence) {
        return Err(OracleError::malformed(format!(
            "confidence {} outside [0, 1]",
            verdict.confidence
        )));
    }
    Ok(verdict)
}
