//! Tool routing and execution
//!
//! Defines the ToolRouter trait the agent loop calls into, and
//! `ToolsetRouter`, which executes calls against a fixed toolset.

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};

use crate::context::ExecutionContext;
use crate::error::{Result, RouterError};
use crate::llm::{ToolCall, ToolDefinition, ToolResult};

use super::toolset::Toolset;

/// Trait for routing and executing tool calls
#[async_trait]
pub trait ToolRouter: Send + Sync {
    /// Execute a tool call.
    ///
    /// Tool failures come back as error results for the model to read. Only
    /// cancellation is returned as `Err`.
    async fn execute(&self, call: ToolCall, ctx: &ExecutionContext) -> Result<ToolResult>;

    /// Get list of available tool names
    fn available_tools(&self) -> Vec<String>;

    /// Definitions advertised to the model
    fn definitions(&self) -> Vec<ToolDefinition>;
}

/// Router restricted to one toolset
#[derive(Debug, Clone)]
pub struct ToolsetRouter {
    toolset: Toolset,
    timeout: Option<Duration>,
}

impl ToolsetRouter {
    pub fn new(toolset: Toolset) -> Self {
        Self { toolset, timeout: None }
    }

    /// Bound every call by `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn toolset(&self) -> &Toolset {
        &self.toolset
    }
}

#[async_trait]
impl ToolRouter for ToolsetRouter {
    async fn execute(&self, call: ToolCall, ctx: &ExecutionContext) -> Result<ToolResult> {
        let Some(tool) = self.toolset.get(&call.name) else {
            warn!("Model requested tool outside its toolset: {}", call.name);
            return Ok(ToolResult::error(call.id, format!("Unknown tool: {}", call.name)));
        };

        debug!("Executing tool {} ({})", call.name, call.id);
        let invocation = tool.invoke(call.input, ctx);
        // handler first, so one that reacts to cancellation can finish its bookkeeping
        let outcome = tokio::select! {
            biased;
            outcome = async {
                match self.timeout {
                    Some(limit) => tokio::time::timeout(limit, invocation).await.map_err(|_| limit),
                    None => Ok(invocation.await),
                }
            } => outcome,
            _ = ctx.cancelled() => return Err(RouterError::Cancelled),
        };

        match outcome {
            Ok(Ok(output)) => Ok(ToolResult::success(call.id, output)),
            Ok(Err(RouterError::Cancelled)) => Err(RouterError::Cancelled),
            Ok(Err(e)) => {
                debug!("Tool {} failed: {}", call.name, e);
                Ok(ToolResult::error(call.id, e.to_string()))
            }
            Err(limit) => Ok(ToolResult::error(
                call.id,
                format!("Tool '{}' timed out after {}ms", call.name, limit.as_millis()),
            )),
        }
    }

    fn available_tools(&self) -> Vec<String> {
        self.toolset.names().into_iter().map(String::from).collect()
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        self.toolset.definitions()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use serde_json::{Value, json};

    use crate::context::Deps;
    use crate::tools::definition::{FnHandler, StaticHandler, ToolDescriptor, ToolHandler};

    struct SlowHandler(Duration);

    #[async_trait]
    impl ToolHandler for SlowHandler {
        async fn invoke(&self, _params: Value, _ctx: &ExecutionContext) -> Result<String> {
            tokio::time::sleep(self.0).await;
            Ok("slow".to_string())
        }
    }

    fn router() -> ToolsetRouter {
        let tools = vec![
            ToolDescriptor::new("get_queue", "List queue", Arc::new(StaticHandler("2 items".into()))),
            ToolDescriptor::new(
                "get_movie",
                "Get movie",
                Arc::new(FnHandler(|params: Value| match params["id"].as_i64() {
                    Some(id) => Ok(format!("movie {}", id)),
                    None => Err(RouterError::Tool("Missing 'id' parameter".into())),
                })),
            ),
            ToolDescriptor::new("slow", "Slow op", Arc::new(SlowHandler(Duration::from_secs(5)))),
        ];
        ToolsetRouter::new(Toolset::new(tools.into_iter().map(Arc::new).collect()))
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext::new(Deps::default())
    }

    #[test]
    fn test_available_tools() {
        let router = router();
        assert_eq!(router.available_tools(), vec!["get_queue", "get_movie", "slow"]);
        assert_eq!(router.definitions()[0].name, "get_queue");
    }

    #[tokio::test]
    async fn test_execute_success() {
        let call = ToolCall::new("call_1", "get_movie", json!({"id": 7}));
        let result = router().execute(call, &ctx()).await.unwrap();
        assert!(!result.is_error);
        assert_eq!(result.tool_use_id, "call_1");
        assert_eq!(result.content, "movie 7");
    }

    #[tokio::test]
    async fn test_execute_handler_error_becomes_result() {
        let call = ToolCall::new("call_1", "get_movie", json!({}));
        let result = router().execute(call, &ctx()).await.unwrap();
        assert!(result.is_error);
        assert!(result.content.contains("Missing 'id' parameter"));
    }

    #[tokio::test]
    async fn test_execute_unknown_tool() {
        let call = ToolCall::new("call_1", "delete_everything", json!({}));
        let result = router().execute(call, &ctx()).await.unwrap();
        assert!(result.is_error);
        assert!(result.content.contains("Unknown tool: delete_everything"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_timeout() {
        let router = router().with_timeout(Duration::from_millis(100));
        let call = ToolCall::new("call_1", "slow", json!({}));
        let result = router.execute(call, &ctx()).await.unwrap();
        assert!(result.is_error);
        assert_eq!(result.content, "Tool 'slow' timed out after 100ms");
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_cancelled() {
        let ctx = ctx();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });
        let call = ToolCall::new("call_1", "slow", json!({}));
        let err = router().execute(call, &ctx).await.unwrap_err();
        assert!(matches!(err, RouterError::Cancelled));
    }
}
