//! Worker - one capability domain's agent
//!
//! A worker pairs fixed instruction text with a fixed toolset. It keeps no
//! state between runs; everything request-specific arrives through the
//! `ExecutionContext`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::debug;

use crate::context::ExecutionContext;
use crate::error::{Result, RouterError};
use crate::llm::Usage;
use crate::registry::RegistryEntry;
use crate::runner::AgentRunner;
use crate::tools::{CapabilityTag, Toolset, ToolsetRouter};

/// Outcome of one worker run
#[derive(Debug)]
pub struct TaskResult {
    /// Final text, or `DispatchTimeout` / `DispatchFailure`
    pub outcome: std::result::Result<String, RouterError>,
    /// Usage committed to the caller's context by this run
    pub usage_delta: Usage,
    pub duration: Duration,
}

impl TaskResult {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn text(&self) -> Option<&str> {
        self.outcome.as_deref().ok()
    }
}

pub struct Worker {
    tag: CapabilityTag,
    identity: String,
    instructions: String,
    router: ToolsetRouter,
    timeout: Duration,
    runner: Arc<AgentRunner>,
}

impl Worker {
    pub fn new(entry: &RegistryEntry, toolset: Toolset, runner: Arc<AgentRunner>, timeout: Duration) -> Self {
        Self {
            tag: entry.tag().clone(),
            identity: entry.identity().to_string(),
            instructions: entry.instructions().to_string(),
            router: ToolsetRouter::new(toolset),
            timeout,
            runner,
        }
    }

    /// Bound each backend call made by this worker
    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.router = self.router.with_timeout(timeout);
        self
    }

    pub fn tag(&self) -> &CapabilityTag {
        &self.tag
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    pub fn toolset(&self) -> &Toolset {
        self.router.toolset()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run the worker on one sub-task.
    ///
    /// The run gets its own usage scope under `ctx`. When it settles, whatever
    /// it consumed is added to `ctx`, including the partial usage of a run that
    /// timed out. Cancellation of `ctx` is the only `Err`; its usage is
    /// discarded.
    pub async fn run(&self, task: &str, ctx: &ExecutionContext) -> Result<TaskResult> {
        let scope = ctx.scope();
        let started = Instant::now();

        let run = self.runner.run(&self.instructions, &self.router, task, &scope);
        let outcome = match tokio::time::timeout(self.timeout, run).await {
            Ok(Ok(output)) => Ok(output.text),
            Ok(Err(RouterError::Cancelled)) => return Err(RouterError::Cancelled),
            Ok(Err(e)) => Err(RouterError::DispatchFailure {
                tag: self.tag.to_string(),
                reason: e.to_string(),
            }),
            Err(_) => {
                scope.cancel();
                Err(RouterError::DispatchTimeout {
                    tag: self.tag.to_string(),
                    timeout: self.timeout,
                })
            }
        };

        if ctx.is_cancelled() {
            return Err(RouterError::Cancelled);
        }

        let usage_delta = scope.usage();
        ctx.commit(&usage_delta);
        debug!(
            "{} settled in {:?} (ok: {}, usage: {})",
            self.identity,
            started.elapsed(),
            outcome.is_ok(),
            usage_delta
        );

        Ok(TaskResult {
            outcome,
            usage_delta,
            duration: started.elapsed(),
        })
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("tag", &self.tag)
            .field("identity", &self.identity)
            .field("tools", &self.router.toolset().names())
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Deps, UsageLimits};
    use crate::llm::{MockLlmClient, MockReply, ModelSettings};
    use crate::tools::{StaticHandler, ToolDescriptor};
    use serde_json::json;

    fn entry() -> RegistryEntry {
        RegistryEntry::new("Queue", "Radarr_Queue_Agent", "You are the Radarr Queue Agent.").unwrap()
    }

    fn toolset() -> Toolset {
        let tool = ToolDescriptor::new("get_queue", "List the queue", Arc::new(StaticHandler("2 items".into())))
            .with_tag("Queue");
        Toolset::new(vec![Arc::new(tool)])
    }

    fn worker(mock: MockLlmClient, timeout: Duration) -> Worker {
        let runner = Arc::new(AgentRunner::new(Arc::new(mock), ModelSettings::default()));
        Worker::new(&entry(), toolset(), runner, timeout)
    }

    #[tokio::test]
    async fn test_run_commits_usage_to_caller() {
        let mock = MockLlmClient::new().script(
            "Queue Agent",
            vec![
                MockReply::tool_use("get_queue", json!({})).with_usage(100, 10),
                MockReply::text("The queue has 2 items").with_usage(200, 20),
            ],
        );
        let worker = worker(mock, Duration::from_secs(30));
        let ctx = ExecutionContext::new(Deps::default());

        let result = worker.run("what is in the queue?", &ctx).await.unwrap();

        assert_eq!(result.text(), Some("The queue has 2 items"));
        assert_eq!(result.usage_delta, Usage { requests: 2, input_tokens: 300, output_tokens: 30 });
        assert_eq!(ctx.usage(), result.usage_delta);
    }

    #[tokio::test]
    async fn test_run_adds_to_existing_usage() {
        let mock = MockLlmClient::new().script("Queue Agent", vec![MockReply::text("done").with_usage(5, 5)]);
        let worker = worker(mock, Duration::from_secs(30));
        let ctx = ExecutionContext::new(Deps::default());
        ctx.record_usage(&Usage { requests: 3, input_tokens: 50, output_tokens: 50 });

        worker.run("task", &ctx).await.unwrap();

        assert_eq!(ctx.usage(), Usage { requests: 4, input_tokens: 55, output_tokens: 55 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_failure_with_partial_usage() {
        let mock = MockLlmClient::new().script(
            "Queue Agent",
            vec![
                MockReply::tool_use("get_queue", json!({})).with_usage(40, 4),
                MockReply::text("too late").with_delay(Duration::from_secs(60)),
            ],
        );
        let worker = worker(mock, Duration::from_secs(5));
        let ctx = ExecutionContext::new(Deps::default());

        let result = worker.run("task", &ctx).await.unwrap();

        match &result.outcome {
            Err(RouterError::DispatchTimeout { tag, timeout }) => {
                assert_eq!(tag, "Queue");
                assert_eq!(*timeout, Duration::from_secs(5));
            }
            other => panic!("expected timeout, got {:?}", other),
        }
        assert_eq!(result.usage_delta, Usage { requests: 1, input_tokens: 40, output_tokens: 4 });
        assert_eq!(ctx.usage(), result.usage_delta);
    }

    #[tokio::test]
    async fn test_model_error_is_dispatch_failure() {
        let mock = MockLlmClient::new().script("Queue Agent", vec![MockReply::failure("backend exploded")]);
        let worker = worker(mock, Duration::from_secs(30));
        let ctx = ExecutionContext::new(Deps::default());

        let result = worker.run("task", &ctx).await.unwrap();

        let err = result.outcome.unwrap_err();
        assert!(err.is_dispatch_failure());
        assert!(err.to_string().contains("backend exploded"));
    }

    #[tokio::test]
    async fn test_limits_include_caller_usage() {
        let mock = MockLlmClient::new().script("Queue Agent", vec![MockReply::text("never")]);
        let worker = worker(mock, Duration::from_secs(30));
        let ctx = ExecutionContext::new(Deps::default()).with_limits(UsageLimits {
            request_limit: Some(1),
            total_tokens_limit: None,
        });
        ctx.record_usage(&Usage { requests: 1, input_tokens: 1, output_tokens: 1 });

        let result = worker.run("task", &ctx).await.unwrap();

        assert!(matches!(result.outcome, Err(RouterError::DispatchFailure { .. })));
        assert!(result.usage_delta.is_zero());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_discards_usage() {
        let mock = MockLlmClient::new().script(
            "Queue Agent",
            vec![
                MockReply::tool_use("get_queue", json!({})).with_usage(40, 4),
                MockReply::text("never").with_delay(Duration::from_secs(60)),
            ],
        );
        let worker = worker(mock, Duration::from_secs(120));
        let ctx = ExecutionContext::new(Deps::default());

        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            canceller.cancel();
        });

        let err = worker.run("task", &ctx).await.unwrap_err();
        assert!(matches!(err, RouterError::Cancelled));
        assert!(ctx.usage().is_zero());
    }
}
