//! Anthropic Messages API text generator.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::OracleError;
use crate::oracle::TextGenerator;

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
pub const DEFAULT_MAX_TOKENS: u32 = 2000;
const API_VERSION: &str = "2023-06-01";

/// Anthropic client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicConfig {
    pub base_url: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        AnthropicConfig {
            base_url: "https://api.anthropic.com".to_string(),
            api_key: std::env::var("ANTHROPIC_API_KEY").ok(),
            model: std::env::var("RIPPLE_ORACLE_MODEL")
                .unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            max_tokens: std::env::var("RIPPLE_ORACLE_MAX_TOKENS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MAX_TOKENS),
        }
    }
}

impl AnthropicConfig {
    /// Create a new config from environment variables
    pub fn from_env() -> Self {
        Self::default()
    }

    pub fn with_api_key(mut self, api_key: &str) -> Self {
        self.api_key = Some(api_key.to_string());
        self
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: [Message<'a>; 1],
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

/// [`TextGenerator`] over `POST /v1/messages`.
pub struct AnthropicGenerator {
    config: AnthropicConfig,
    http_client: reqwest::Client,
}

impl AnthropicGenerator {
    pub fn new(config: AnthropicConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("ripple/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        AnthropicGenerator {
            config,
            http_client,
        }
    }

    pub fn from_env() -> Self {
        Self::new(AnthropicConfig::from_env())
    }

    pub fn config(&self) -> &AnthropicConfig {
        &self.config
    }
}

fn retry_after(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

#[async_trait::async_trait]
impl TextGenerator for AnthropicGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, OracleError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(OracleError::MissingApiKey)?;
        let url = format!("{}/v1/messages", self.config.base_url);
        let body = MessagesRequest {
            model: &self.config.model,
            max_tokens: self.config.max_tokens,
            messages: [Message {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .http_client
            .post(&url)
            .header("x-api-key", api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(OracleError::RateLimited {
                retry_after_secs: retry_after(&response),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OracleError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| OracleError::malformed(format!("unreadable API envelope: {e}")))?;
        let text: String = parsed
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text)
            .collect();
        debug!(model = %self.config.model, chars = text.len(), "oracle replied");
        if text.trim().is_empty() {
            return Err(OracleError::malformed("empty completion"));
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn generator_for(server: &MockServer) -> AnthropicGenerator {
        AnthropicGenerator::new(AnthropicConfig {
            base_url: server.uri(),
            api_key: Some("sk-test".to_string()),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
        })
    }

    async fn serve(server: &MockServer, response: ResponseTemplate) {
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "sk-test"))
            .and(header("anthropic-version", API_VERSION))
            .respond_with(response)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_text_blocks_are_concatenated() {
        let server = MockServer::start().await;
        serve(
            &server,
            ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": [
                    {"type": "text", "text": "{\"requires_action\": "},
                    {"type": "tool_use", "id": "t1", "name": "noop", "input": {}},
                    {"type": "text", "text": "false}"}
                ]
            })),
        )
        .await;

        let text = generator_for(&server).generate("prompt").await.unwrap();
        assert_eq!(text, "{\"requires_action\": false}");
    }

    #[tokio::test]
    async fn test_429_is_rate_limited_with_retry_after() {
        let server = MockServer::start().await;
        serve(
            &server,
            ResponseTemplate::new(429).insert_header("retry-after", "30"),
        )
        .await;

        assert_eq!(
            generator_for(&server).generate("prompt").await.unwrap_err(),
            OracleError::RateLimited {
                retry_after_secs: Some(30)
            }
        );
    }

    #[tokio::test]
    async fn test_server_error_is_rejected() {
        let server = MockServer::start().await;
        serve(&server, ResponseTemplate::new(529).set_body_string("overloaded")).await;

        assert_eq!(
            generator_for(&server).generate("prompt").await.unwrap_err(),
            OracleError::Rejected {
                status: 529,
                body: "overloaded".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_empty_completion_is_malformed() {
        let server = MockServer::start().await;
        serve(
            &server,
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"content": []})),
        )
        .await;

        assert!(matches!(
            generator_for(&server).generate("prompt").await,
            Err(OracleError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn test_config_builders() {
        let config = AnthropicConfig {
            base_url: "https://api.anthropic.com".to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
        .with_api_key("sk-test")
        .with_base_url("http://localhost:9999/");
        assert_eq!(config.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.base_url, "http://localhost:9999");
    }

    #[test]
    fn test_api_key_not_serialized() {
        let config = AnthropicConfig::default().with_api_key("sk-secret");
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("sk-secret"));
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_before_network() {
        let mut config = AnthropicConfig::default();
        config.api_key = None;
        let generator = AnthropicGenerator::new(config);
        assert_eq!(
            generator.generate("hi").await.unwrap_err(),
            OracleError::MissingApiKey
        );
    }

    #[test]
    fn test_request_body_shape() {
        let body = MessagesRequest {
            model: DEFAULT_MODEL,
            max_tokens: 2000,
            messages: [Message {
                role: "user",
                content: "prompt",
            }],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["max_tokens"], 2000);
    }
}
