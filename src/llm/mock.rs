//! Scripted LLM client for tests and offline runs
//!
//! Replies are queued per agent, keyed by a fragment of the system prompt, so
//! the coordinator and each worker can be scripted independently even when
//! they run concurrently.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::client::{LlmClient, LlmError};
use super::types::{CompletionRequest, CompletionResponse, StopReason, ToolCall, Usage};
use crate::id::generate_call_id;

#[derive(Debug, Clone)]
enum ReplyKind {
    Text(String),
    ToolUse(Vec<(String, Value)>),
    Fail(String),
}

/// One scripted model turn
#[derive(Debug, Clone)]
pub struct MockReply {
    kind: ReplyKind,
    usage: Usage,
    delay: Option<Duration>,
}

impl MockReply {
    /// Final text answer
    pub fn text(text: impl Into<String>) -> Self {
        Self::from_kind(ReplyKind::Text(text.into()))
    }

    /// A single tool call
    pub fn tool_use(name: impl Into<String>, input: Value) -> Self {
        Self::from_kind(ReplyKind::ToolUse(vec![(name.into(), input)]))
    }

    /// Several tool calls in one turn
    pub fn tool_uses(calls: Vec<(&str, Value)>) -> Self {
        Self::from_kind(ReplyKind::ToolUse(
            calls.into_iter().map(|(n, v)| (n.to_string(), v)).collect(),
        ))
    }

    /// The model call itself fails
    pub fn failure(message: impl Into<String>) -> Self {
        Self::from_kind(ReplyKind::Fail(message.into()))
    }

    pub fn with_usage(mut self, input_tokens: u64, output_tokens: u64) -> Self {
        self.usage = Usage::new(input_tokens, output_tokens);
        self
    }

    /// Sleep before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn from_kind(kind: ReplyKind) -> Self {
        Self {
            kind,
            usage: Usage::new(10, 5),
            delay: None,
        }
    }

    fn into_response(self) -> Result<CompletionResponse, LlmError> {
        match self.kind {
            ReplyKind::Text(content) => Ok(CompletionResponse {
                content,
                tool_calls: Vec::new(),
                stop_reason: StopReason::EndTurn,
                usage: self.usage,
            }),
            ReplyKind::ToolUse(calls) => Ok(CompletionResponse {
                content: String::new(),
                tool_calls: calls
                    .into_iter()
                    .map(|(name, input)| ToolCall::new(generate_call_id(), name, input))
                    .collect(),
                stop_reason: StopReason::ToolUse,
                usage: self.usage,
            }),
            ReplyKind::Fail(message) => Err(LlmError::ApiError { status: 500, message }),
        }
    }
}

#[derive(Debug)]
struct Script {
    system_contains: String,
    replies: VecDeque<MockReply>,
}

/// LlmClient that replays scripted turns
#[derive(Debug, Default)]
pub struct MockLlmClient {
    scripts: Mutex<Vec<Script>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue replies for every request whose system prompt contains `system_contains`.
    ///
    /// Scripts are matched in registration order; an exhausted script is skipped.
    pub fn script(self, system_contains: impl Into<String>, replies: Vec<MockReply>) -> Self {
        if let Ok(mut scripts) = self.scripts.lock() {
            scripts.push(Script {
                system_contains: system_contains.into(),
                replies: replies.into(),
            });
        }
        self
    }

    /// Every request received so far
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Requests whose system prompt contains `fragment`
    pub fn requests_for(&self, fragment: &str) -> Vec<CompletionRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.system.contains(fragment))
            .collect()
    }

    /// Replies not yet consumed across all scripts
    pub fn remaining(&self) -> usize {
        self.scripts
            .lock()
            .map(|s| s.iter().map(|s| s.replies.len()).sum())
            .unwrap_or(0)
    }

    fn next_reply(&self, system: &str) -> Option<MockReply> {
        let mut scripts = self.scripts.lock().ok()?;
        scripts
            .iter_mut()
            .filter(|s| system.contains(&s.system_contains))
            .find_map(|s| s.replies.pop_front())
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let reply = self.next_reply(&request.system);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        let reply = reply.ok_or_else(|| {
            let head: String = request.system.chars().take(60).collect();
            LlmError::InvalidResponse(format!("no scripted reply for system prompt '{}'", head))
        })?;

        if let Some(delay) = reply.delay {
            tokio::time::sleep(delay).await;
        }
        reply.into_response()
    }

    fn model(&self) -> &str {
        "mock"
    }
}
