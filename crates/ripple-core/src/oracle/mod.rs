//! Impact oracle client.
//!
//! [`ImpactOracle`] is the seam the triage pipeline calls. [`LlmOracle`] is the
//! production implementation: it renders a prompt, sends it to a
//! [`TextGenerator`] under a bounded timeout, and parses the reply.

pub mod anthropic;
pub mod parse;
pub mod prompt;

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::context::FileContext;
use crate::domain::{ChangeEvent, DependencyEdge, OracleError, TriageVerdict};

pub use anthropic::{AnthropicConfig, AnthropicGenerator};
pub use parse::parse_verdict;
pub use prompt::build_prompt;

/// Classifies the impact of a change event on one dependent.
#[async_trait]
pub trait ImpactOracle: Send + Sync {
    async fn classify(
        &self,
        event: &ChangeEvent,
        edge: &DependencyEdge,
        context: &[FileContext],
    ) -> Result<TriageVerdict, OracleError>;
}

/// One-shot text generation service.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, OracleError>;
}

/// [`ImpactOracle`] backed by a text generation service.
pub struct LlmOracle<G> {
    generator: G,
    timeout: Duration,
}

impl<G: TextGenerator> LlmOracle<G> {
    pub fn new(generator: G, timeout: Duration) -> Self {
        Self { generator, timeout }
    }
}

#[async_trait]
impl<G: TextGenerator> ImpactOracle for LlmOracle<G> {
    async fn classify(
        &self,
        event: &ChangeEvent,
        edge: &DependencyEdge,
        context: &[FileContext],
    ) -> Result<TriageVerdict, OracleError> {
        let prompt = build_prompt(event, edge, context);
        debug!(
            target_repo = %edge.target_repo,
            prompt_chars = prompt.len(),
            "sending prompt to oracle"
        );

        let raw = tokio::time::timeout(self.timeout, self.generator.generate(&prompt))
            .await
            .map_err(|_| OracleError::Timeout {
                after_secs: self.timeout.as_secs(),
            })??;

        parse_verdict(&raw).map_err(|e| {
            warn!(target_repo = %edge.target_repo, error = %e, "oracle output rejected");
            e
        })
    }
}
