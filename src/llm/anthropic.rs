//! `LlmClient` backed by the Anthropic Messages endpoint.
//!
//! Both the coordinator and every worker share one of these; nothing here
//! knows about capabilities or dispatch.

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::Client;
use serde_json::{Value, json};

use super::client::{LlmClient, LlmError};
use super::types::{CompletionRequest, CompletionResponse, StopReason, ToolCall, Usage};

/// Public endpoint used when no base URL is configured
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

/// Value sent in the `anthropic-version` header
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Completion cap applied when neither the request nor the settings set one
const DEFAULT_MAX_TOKENS: u32 = 16384;

pub const DEFAULT_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

/// Connection settings; the key itself is read from `api_key_env`
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub timeout: Duration,
    pub api_key_env: String,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout: Duration::from_secs(300),
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
        }
    }
}

impl AnthropicConfig {
    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.base_url.trim_end_matches('/'))
    }
}

pub struct AnthropicClient {
    client: Client,
    api_key: String,
    config: AnthropicConfig,
}

impl AnthropicClient {
    /// Read the key from the configured variable and build the client
    pub fn new(config: AnthropicConfig) -> Result<Self, LlmError> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| LlmError::MissingApiKey {
            env_var: config.api_key_env.clone(),
        })?;

        Self::with_api_key(api_key, config)
    }

    pub fn with_api_key(api_key: String, config: AnthropicConfig) -> Result<Self, LlmError> {
        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            api_key,
            config,
        })
    }

    fn request_body(&self, request: &CompletionRequest) -> Value {
        let model = request.model.as_ref().unwrap_or(&self.config.model).clone();
        let max_tokens = request.max_tokens.unwrap_or(self.config.max_tokens);

        let mut body = json!({
            "model": model,
            "max_tokens": max_tokens,
            "messages": request.messages,
        });

        if !request.system.is_empty() {
            body["system"] = json!(request.system);
        }

        if !request.tools.is_empty() {
            let tools: Vec<Value> = request.tools.iter().map(|t| t.to_anthropic_schema()).collect();
            body["tools"] = json!(tools);
        }

        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(top_p) = request.top_p {
            body["top_p"] = json!(top_p);
        }
        if !request.stop_sequences.is_empty() {
            body["stop_sequences"] = json!(request.stop_sequences);
        }

        body
    }

    /// Text blocks are joined with newlines; unknown block types are skipped
    fn decode_reply(&self, body: Value) -> Result<CompletionResponse, LlmError> {
        if !body.is_object() {
            return Err(LlmError::InvalidResponse("body is not a JSON object".to_string()));
        }

        let stop_reason = stop_reason_from(body["stop_reason"].as_str());

        let usage = body
            .get("usage")
            .map(|u| {
                Usage::new(
                    u["input_tokens"].as_u64().unwrap_or_default(),
                    u["output_tokens"].as_u64().unwrap_or_default(),
                )
            })
            .unwrap_or_default();

        let mut content = String::new();
        let mut tool_calls = Vec::new();

        if let Some(blocks) = body["content"].as_array() {
            for block in blocks {
                match block["type"].as_str() {
                    Some("text") => {
                        if let Some(text) = block["text"].as_str() {
                            if !content.is_empty() {
                                content.push('\n');
                            }
                            content.push_str(text);
                        }
                    }
                    Some("tool_use") => {
                        let id = block["id"].as_str().unwrap_or("").to_string();
                        let name = block["name"].as_str().unwrap_or("").to_string();
                        tool_calls.push(ToolCall::new(id, name, block["input"].clone()));
                    }
                    _ => {}
                }
            }
        }

        Ok(CompletionResponse {
            content,
            tool_calls,
            stop_reason,
            usage,
        })
    }

    async fn post_messages(&self, body: Value) -> Result<Value, LlmError> {
        let response = self
            .client
            .post(self.config.messages_url())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(self.config.timeout)
                } else {
                    LlmError::Network(e)
                }
            })?;

        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(60);
            warn!("Provider asked us to back off for {}s", retry_after);
            return Err(LlmError::RateLimited {
                retry_after: Duration::from_secs(retry_after),
            });
        }

        if !status.is_success() {
            let message = response.text().await.unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(LlmError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json().await?)
    }
}

fn stop_reason_from(raw: Option<&str>) -> StopReason {
    match raw {
        Some("tool_use") => StopReason::ToolUse,
        Some("max_tokens") => StopReason::MaxTokens,
        Some("stop_sequence") => StopReason::StopSequence,
        _ => StopReason::EndTurn,
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        debug!(
            "Posting {} message(s) with {} tool(s) to {}",
            request.messages.len(),
            request.tools.len(),
            self.config.messages_url()
        );
        let reply = self.post_messages(self.request_body(&request)).await?;
        self.decode_reply(reply)
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    fn is_ready(&self) -> bool {
        !self.api_key.is_empty()
    }
}

impl std::fmt::Debug for AnthropicClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicClient")
            .field("base_url", &self.config.base_url)
            .field("model", &self.config.model)
            .field("max_tokens", &self.config.max_tokens)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::{Message, ModelSettings, ToolDefinition, ToolResult};

    fn client() -> AnthropicClient {
        AnthropicClient::with_api_key("test-key".to_string(), AnthropicConfig::default()).unwrap()
    }

    #[test]
    fn test_config_default() {
        let config = AnthropicConfig::default();
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.max_tokens, DEFAULT_MAX_TOKENS);
        assert_eq!(config.api_key_env, "ANTHROPIC_API_KEY");
        assert_eq!(config.messages_url(), "https://api.anthropic.com/v1/messages");
    }

    #[test]
    fn test_messages_url_trims_trailing_slash() {
        let config = AnthropicConfig {
            base_url: "http://localhost:8080/".to_string(),
            ..Default::default()
        };
        assert_eq!(config.messages_url(), "http://localhost:8080/v1/messages");
    }

    #[test]
    fn test_client_missing_key_env() {
        let config = AnthropicConfig {
            api_key_env: "ARR_ROUTER_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..Default::default()
        };
        let err = AnthropicClient::new(config).unwrap_err();
        assert!(matches!(err, LlmError::MissingApiKey { .. }));
    }

    #[test]
    fn test_client_with_api_key() {
        let client = client();
        assert!(client.is_ready());
        assert_eq!(client.model(), DEFAULT_MODEL);
    }

    #[test]
    fn test_request_body_basic() {
        let request = CompletionRequest::new("You are helpful").with_user_message("Hello");
        let body = client().request_body(&request);

        assert_eq!(body["model"], DEFAULT_MODEL);
        assert_eq!(body["max_tokens"], DEFAULT_MAX_TOKENS);
        assert_eq!(body["system"], "You are helpful");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"][0]["type"], "text");
        assert_eq!(body["messages"][0]["content"][0]["text"], "Hello");
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn test_request_body_with_settings_and_tools() {
        let settings = ModelSettings {
            model: "claude-opus-4-5".to_string(),
            top_p: Some(1.0),
            stop_sequences: vec!["DONE".to_string()],
            ..Default::default()
        };
        let tool = ToolDefinition::new(
            "dispatch_Queue",
            "Assign a task related to Queue",
            json!({"type": "object", "properties": {"task": {"type": "string"}}}),
        );
        let request = CompletionRequest::new("sys")
            .with_user_message("What is downloading?")
            .with_tools(vec![tool])
            .with_settings(&settings);

        let body = client().request_body(&request);
        assert_eq!(body["model"], "claude-opus-4-5");
        assert_eq!(body["tools"][0]["name"], "dispatch_Queue");
        assert!((body["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
        assert_eq!(body["top_p"], 1.0);
        assert_eq!(body["stop_sequences"][0], "DONE");
    }

    #[test]
    fn test_request_body_replays_tool_turns() {
        let calls = vec![ToolCall::new("toolu_1", "get_queue", json!({}))];
        let request = CompletionRequest::new("sys")
            .with_user_message("queue?")
            .with_message(Message::assistant_turn("", &calls))
            .with_message(Message::tool_results(&[ToolResult::success("toolu_1", "[]")]));

        let body = client().request_body(&request);
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1]["content"][0]["type"], "tool_use");
        assert_eq!(messages[2]["role"], "user");
        assert_eq!(messages[2]["content"][0]["type"], "tool_result");
        assert_eq!(messages[2]["content"][0]["tool_use_id"], "toolu_1");
        assert_eq!(messages[2]["content"][0]["is_error"], false);
    }

    #[test]
    fn test_decode_reply_with_tool_use() {
        let api_response = json!({
            "content": [
                { "type": "text", "text": "Let me check the queue" },
                {
                    "type": "tool_use",
                    "id": "toolu_123",
                    "name": "get_queue",
                    "input": { "page": 1 }
                }
            ],
            "stop_reason": "tool_use",
            "usage": { "input_tokens": 50, "output_tokens": 30 }
        });

        let response = client().decode_reply(api_response).unwrap();
        assert_eq!(response.content, "Let me check the queue");
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].name, "get_queue");
        assert_eq!(response.tool_calls[0].input["page"], 1);
        assert_eq!(response.stop_reason, StopReason::ToolUse);
        assert_eq!(response.usage, Usage::new(50, 30));
    }

    #[test]
    fn test_decode_reply_stop_reasons() {
        assert_eq!(stop_reason_from(Some("max_tokens")), StopReason::MaxTokens);
        assert_eq!(stop_reason_from(Some("stop_sequence")), StopReason::StopSequence);
        assert_eq!(stop_reason_from(Some("something_new")), StopReason::EndTurn);
        assert_eq!(stop_reason_from(None), StopReason::EndTurn);

        let reply = client()
            .decode_reply(json!({"content": [], "stop_reason": "max_tokens"}))
            .unwrap();
        assert_eq!(reply.stop_reason, StopReason::MaxTokens);
        assert_eq!(reply.usage, Usage::default());
    }

    #[test]
    fn test_decode_reply_rejects_non_object() {
        let err = client().decode_reply(json!("nope")).unwrap_err();
        assert!(matches!(err, LlmError::InvalidResponse(_)));
    }

    #[test]
    fn test_debug_impl_hides_key() {
        let debug_str = format!("{:?}", client());
        assert!(debug_str.contains("AnthropicClient"));
        assert!(debug_str.contains(DEFAULT_MODEL));
        assert!(!debug_str.contains("test-key"));
    }

    #[test]
    fn test_empty_api_key_not_ready() {
        let client = AnthropicClient::with_api_key(String::new(), AnthropicConfig::default()).unwrap();
        assert!(!client.is_ready());
    }
}
