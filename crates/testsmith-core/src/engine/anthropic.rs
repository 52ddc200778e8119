//! Anthropic Messages API engine.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use super::config::EngineConfig;
use super::{EngineError, LlmEngine};

const PROVIDER_NAME: &str = "anthropic";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Engine backed by `POST /v1/messages`.
pub struct AnthropicEngine {
    client: Client,
    config: EngineConfig,
    system: String,
}

impl std::fmt::Debug for AnthropicEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicEngine")
            .field("model", &self.config.model)
            .field("base_url", &self.config.base_url)
            .finish()
    }
}

impl AnthropicEngine {
    /// Build an engine whose every call carries `system` as the system prompt.
    pub fn new(config: EngineConfig, system: impl Into<String>) -> Result<Self, EngineError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| EngineError::Config(e.to_string()))?;

        Ok(Self {
            client,
            config,
            system: system.into(),
        })
    }

    /// The system prompt fixed at construction.
    pub fn system(&self) -> &str {
        &self.system
    }

    fn build_request<'a>(&'a self, content: &'a str) -> MessagesRequest<'a> {
        MessagesRequest {
            model: &self.config.model,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            system: (!self.system.is_empty()).then_some(self.system.as_str()),
            messages: vec![RequestMessage {
                role: "user",
                content,
            }],
        }
    }
}

#[async_trait]
impl LlmEngine for AnthropicEngine {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn send_message(&self, content: &str) -> Result<String, EngineError> {
        let url = self.config.messages_url();
        let body = self.build_request(content);

        tracing::debug!(url = %url, model = %self.config.model, "sending message");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", self.config.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "{PROVIDER_NAME} request failed");
                EngineError::Request {
                    provider: PROVIDER_NAME.to_string(),
                    reason: e.to_string(),
                }
            })?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let payload = response.text().await;

        tracing::debug!(status = status.as_u16(), "{PROVIDER_NAME} responded");

        if !status.is_success() {
            let text = payload.unwrap_or_else(|e| format!("<unreadable body: {e}>"));
            return Err(match status.as_u16() {
                401 | 403 => EngineError::AuthFailed {
                    provider: PROVIDER_NAME.to_string(),
                },
                429 => EngineError::RateLimited {
                    provider: PROVIDER_NAME.to_string(),
                    retry_after,
                },
                code => EngineError::Http {
                    provider: PROVIDER_NAME.to_string(),
                    status: code,
                    body: text,
                },
            });
        }

        let text = payload.map_err(|e| {
            tracing::error!(error = %e, "{PROVIDER_NAME} response body could not be read");
            EngineError::Request {
                provider: PROVIDER_NAME.to_string(),
                reason: format!("failed to read response body: {e}"),
            }
        })?;

        let parsed: MessagesResponse =
            serde_json::from_str(&text).map_err(|e| EngineError::InvalidResponse {
                provider: PROVIDER_NAME.to_string(),
                reason: format!("JSON parse error: {e}"),
            })?;

        collect_text(parsed.content).ok_or_else(|| EngineError::EmptyResponse {
            provider: PROVIDER_NAME.to_string(),
        })
    }
}

/// Join every text block; `None` if there were none.
fn collect_text(blocks: Vec<ContentBlock>) -> Option<String> {
    let texts: Vec<String> = blocks
        .into_iter()
        .filter_map(|b| match b {
            ContentBlock::Text { text } => Some(text),
            ContentBlock::Other => None,
        })
        .collect();

    if texts.is_empty() {
        None
    } else {
        Some(texts.join("\n"))
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<RequestMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: String },
    #[serde(other)]
    Other,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_omits_empty_system() {
        let engine = AnthropicEngine::new(EngineConfig::new("k"), "").unwrap();
        let json = serde_json::to_value(engine.build_request("code")).unwrap();
        assert!(json.get("system").is_none());
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "code");
    }

    #[test]
    fn request_carries_system_and_sampling() {
        let cfg = EngineConfig::new("k").model("m-1").max_tokens(64);
        let engine = AnthropicEngine::new(cfg, "be terse").unwrap();
        let json = serde_json::to_value(engine.build_request("x")).unwrap();
        assert_eq!(json["system"], "be terse");
        assert_eq!(json["model"], "m-1");
        assert_eq!(json["max_tokens"], 64);
    }

    #[test]
    fn text_blocks_are_joined_and_others_skipped() {
        let body = r#"{"content":[
            {"type":"text","text":"first"},
            {"type":"tool_use","id":"t","name":"x","input":{}},
            {"type":"text","text":"second"}
        ]}"#;
        let parsed: MessagesResponse = serde_json::from_str(body).unwrap();
        assert_eq!(collect_text(parsed.content).as_deref(), Some("first\nsecond"));
    }

    #[test]
    fn no_text_blocks_yields_none() {
        let parsed: MessagesResponse = serde_json::from_str(r#"{"content":[]}"#).unwrap();
        assert!(collect_text(parsed.content).is_none());
    }
}
