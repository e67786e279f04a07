//! Agent runner - drives the model/tool loop for one agent.
//!
//! The same runner powers every worker and the coordinator. Only the
//! instructions and the tool router differ between them.

use std::sync::Arc;

use futures::future::join_all;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::context::ExecutionContext;
use crate::error::{Result, RouterError};
use crate::llm::{
    CompletionRequest, LlmClient, LlmError, Message, ModelSettings, StopReason, ToolCall, ToolResult, Usage,
};
use crate::tools::ToolRouter;

/// How the tool calls of a single model turn are executed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// One at a time, in the order the model listed them
    #[default]
    Sequential,
    /// All at once; results are still returned in call order
    Concurrent,
}

/// Configuration for the AgentRunner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Model turns allowed before the run fails
    pub max_steps: u32,
    pub dispatch_mode: DispatchMode,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_steps: 25,
            dispatch_mode: DispatchMode::Sequential,
        }
    }
}

/// Outcome of one agent run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutput {
    /// Final text answer
    pub text: String,
    /// Usage of this agent's own model calls
    pub usage: Usage,
    /// Model turns taken
    pub steps: u32,
}

/// AgentRunner executes one agent until it produces a final answer.
///
/// Each step:
/// 1. Checks cancellation and reserves the call against the usage limits
/// 2. Calls the model with the whole conversation so far
/// 3. Records the call's usage on the context
/// 4. Stops if the model answered without tool calls
/// 5. Otherwise executes the tool calls and feeds the results back
pub struct AgentRunner {
    llm: Arc<dyn LlmClient>,
    settings: ModelSettings,
    config: RunnerConfig,
}

impl AgentRunner {
    pub fn new(llm: Arc<dyn LlmClient>, settings: ModelSettings) -> Self {
        Self::with_config(llm, settings, RunnerConfig::default())
    }

    pub fn with_config(llm: Arc<dyn LlmClient>, settings: ModelSettings, config: RunnerConfig) -> Self {
        Self { llm, settings, config }
    }

    pub fn settings(&self) -> &ModelSettings {
        &self.settings
    }

    /// Run an agent against `input` until it answers.
    pub async fn run(
        &self,
        instructions: &str,
        tools: &dyn ToolRouter,
        input: &str,
        ctx: &ExecutionContext,
    ) -> Result<RunOutput> {
        let definitions = tools.definitions();
        let mut messages = vec![Message::user(input)];
        let mut usage = Usage::default();

        for step in 1..=self.config.max_steps {
            if ctx.is_cancelled() {
                return Err(RouterError::Cancelled);
            }
            let slot = ctx.reserve_request()?;

            let request = CompletionRequest::new(instructions)
                .with_messages(messages.clone())
                .with_tools(definitions.clone())
                .with_settings(&self.settings);

            let timeout = self.settings.timeout;
            let response = tokio::select! {
                _ = ctx.cancelled() => return Err(RouterError::Cancelled),
                result = tokio::time::timeout(timeout, self.llm.complete(request)) => {
                    result.map_err(|_| LlmError::Timeout(timeout))?.map_err(|e| {
                        let kind = if e.is_retryable() { "transient" } else { "permanent" };
                        warn!("Model call failed at step {} ({}): {}", step, kind, e);
                        e
                    })?
                }
            };

            let step_usage = Usage {
                requests: 1,
                ..response.usage
            };
            ctx.record_request(slot, &step_usage);
            usage.add(&step_usage);

            if response.tool_calls.is_empty() {
                if response.stop_reason == StopReason::MaxTokens {
                    warn!("Answer cut off at max_tokens ({})", self.settings.max_tokens);
                }
                debug!("Agent answered after {} step(s)", step);
                return Ok(RunOutput {
                    text: response.content,
                    usage,
                    steps: step,
                });
            }

            debug!("Step {}: {} tool call(s)", step, response.tool_calls.len());
            messages.push(Message::assistant_turn(&response.content, &response.tool_calls));
            let results = self.execute_calls(tools, response.tool_calls, ctx).await?;
            messages.push(Message::tool_results(&results));
        }

        Err(RouterError::UsageLimitExceeded(format!(
            "max_steps of {} reached without a final answer",
            self.config.max_steps
        )))
    }

    async fn execute_calls(
        &self,
        tools: &dyn ToolRouter,
        calls: Vec<ToolCall>,
        ctx: &ExecutionContext,
    ) -> Result<Vec<ToolResult>> {
        match self.config.dispatch_mode {
            DispatchMode::Sequential => {
                let mut results = Vec::with_capacity(calls.len());
                for call in calls {
                    results.push(tools.execute(call, ctx).await?);
                }
                Ok(results)
            }
            DispatchMode::Concurrent => join_all(calls.into_iter().map(|call| tools.execute(call, ctx)))
                .await
                .into_iter()
                .collect(),
        }
    }
}

impl std::fmt::Debug for AgentRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRunner")
            .field("model", &self.settings.model)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use serde_json::json;

    use crate::context::{Deps, UsageLimits};
    use crate::llm::{ContentBlock, MockLlmClient, MockReply};
    use crate::tools::{StaticHandler, ToolDescriptor, Toolset, ToolsetRouter};

    const AGENT: &str = "You are the Radarr Queue Agent.";

    fn router() -> ToolsetRouter {
        let tools = vec![
            ToolDescriptor::new("get_queue", "List queue", Arc::new(StaticHandler("2 items downloading".into()))),
            ToolDescriptor::new("get_queue_status", "Queue status", Arc::new(StaticHandler("healthy".into()))),
        ];
        ToolsetRouter::new(Toolset::new(tools.into_iter().map(Arc::new).collect()))
    }

    fn runner(mock: MockLlmClient, config: RunnerConfig) -> (AgentRunner, Arc<MockLlmClient>) {
        let mock = Arc::new(mock);
        let runner = AgentRunner::with_config(mock.clone(), ModelSettings::default(), config);
        (runner, mock)
    }

    #[tokio::test]
    async fn test_direct_answer() {
        let (runner, mock) = runner(
            MockLlmClient::new().script(AGENT, vec![MockReply::text("Queue is empty").with_usage(20, 4)]),
            RunnerConfig::default(),
        );
        let ctx = ExecutionContext::new(Deps::default());

        let output = runner.run(AGENT, &router(), "what is queued?", &ctx).await.unwrap();
        assert_eq!(output.text, "Queue is empty");
        assert_eq!(output.steps, 1);
        assert_eq!(
            output.usage,
            Usage {
                requests: 1,
                input_tokens: 20,
                output_tokens: 4
            }
        );
        assert_eq!(ctx.usage(), output.usage);

        let request = &mock.requests()[0];
        assert_eq!(request.system, AGENT);
        assert_eq!(request.tools.len(), 2);
        assert_eq!(request.max_tokens, Some(16384));
    }

    #[tokio::test]
    async fn test_tool_loop_feeds_results_back() {
        let (runner, mock) = runner(
            MockLlmClient::new().script(
                AGENT,
                vec![
                    MockReply::tool_use("get_queue", json!({})),
                    MockReply::text("2 items downloading"),
                ],
            ),
            RunnerConfig::default(),
        );
        let ctx = ExecutionContext::new(Deps::default());

        let output = runner.run(AGENT, &router(), "what is queued?", &ctx).await.unwrap();
        assert_eq!(output.steps, 2);
        assert_eq!(ctx.usage().requests, 2);

        let second = &mock.requests()[1];
        assert_eq!(second.messages.len(), 3);
        match &second.messages[2].content[0] {
            ContentBlock::ToolResult { content, is_error, .. } => {
                assert_eq!(content, "2 items downloading");
                assert!(!is_error);
            }
            other => panic!("unexpected block: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_concurrent_mode_keeps_call_order() {
        let (runner, mock) = runner(
            MockLlmClient::new().script(
                AGENT,
                vec![
                    MockReply::tool_uses(vec![("get_queue_status", json!({})), ("get_queue", json!({}))]),
                    MockReply::text("done"),
                ],
            ),
            RunnerConfig {
                dispatch_mode: DispatchMode::Concurrent,
                ..Default::default()
            },
        );
        let ctx = ExecutionContext::new(Deps::default());
        runner.run(AGENT, &router(), "status", &ctx).await.unwrap();

        let results = &mock.requests()[1].messages[2];
        let contents: Vec<&str> = results
            .content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolResult { content, .. } => Some(content.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(contents, vec!["healthy", "2 items downloading"]);
    }

    #[tokio::test]
    async fn test_max_steps() {
        let (runner, _) = runner(
            MockLlmClient::new().script(
                AGENT,
                vec![
                    MockReply::tool_use("get_queue", json!({})),
                    MockReply::tool_use("get_queue", json!({})),
                ],
            ),
            RunnerConfig {
                max_steps: 2,
                ..Default::default()
            },
        );
        let ctx = ExecutionContext::new(Deps::default());
        let err = runner.run(AGENT, &router(), "loop", &ctx).await.unwrap_err();
        assert!(err.to_string().contains("max_steps of 2"));
        assert_eq!(ctx.usage().requests, 2);
    }

    #[tokio::test]
    async fn test_usage_limit_checked_before_call() {
        let (runner, mock) = runner(
            MockLlmClient::new().script(
                AGENT,
                vec![MockReply::tool_use("get_queue", json!({})), MockReply::text("never")],
            ),
            RunnerConfig::default(),
        );
        let ctx = ExecutionContext::new(Deps::default()).with_limits(UsageLimits {
            request_limit: Some(1),
            total_tokens_limit: None,
        });
        let err = runner.run(AGENT, &router(), "q", &ctx).await.unwrap_err();
        assert!(matches!(err, RouterError::UsageLimitExceeded(_)));
        assert_eq!(mock.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_model_failure_is_llm_error() {
        let (runner, _) = runner(
            MockLlmClient::new().script(AGENT, vec![MockReply::failure("overloaded")]),
            RunnerConfig::default(),
        );
        let ctx = ExecutionContext::new(Deps::default());
        let err = runner.run(AGENT, &router(), "q", &ctx).await.unwrap_err();
        assert!(matches!(err, RouterError::Llm(_)));
        assert!(err.to_string().contains("overloaded"));
    }

    #[tokio::test]
    async fn test_already_cancelled() {
        let (runner, mock) = runner(
            MockLlmClient::new().script(AGENT, vec![MockReply::text("never")]),
            RunnerConfig::default(),
        );
        let ctx = ExecutionContext::new(Deps::default());
        ctx.cancel();
        let err = runner.run(AGENT, &router(), "q", &ctx).await.unwrap_err();
        assert!(matches!(err, RouterError::Cancelled));
        assert!(mock.requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_model_call() {
        let (runner, _) = runner(
            MockLlmClient::new().script(
                AGENT,
                vec![MockReply::text("late").with_delay(Duration::from_secs(10))],
            ),
            RunnerConfig::default(),
        );
        let ctx = ExecutionContext::new(Deps::default());
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });
        let err = runner.run(AGENT, &router(), "q", &ctx).await.unwrap_err();
        assert!(matches!(err, RouterError::Cancelled));
        assert!(ctx.usage().is_zero());
    }

    #[tokio::test(start_paused = true)]
    async fn test_model_call_timeout() {
        let mock = Arc::new(MockLlmClient::new().script(
            AGENT,
            vec![MockReply::text("late").with_delay(Duration::from_secs(10))],
        ));
        let settings = ModelSettings {
            timeout: Duration::from_secs(1),
            ..Default::default()
        };
        let runner = AgentRunner::new(mock, settings);
        let ctx = ExecutionContext::new(Deps::default());
        let err = runner.run(AGENT, &router(), "q", &ctx).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
