//! Coordinator - the single request entry point
//!
//! Runs the supervisor agent with the delegation table as its only toolset,
//! then surfaces failed dispatches in the final text.

use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::context::{Deps, ExecutionContext, UsageLimits};
use crate::error::{Result, RouterError};
use crate::llm::Usage;
use crate::runner::AgentRunner;
use crate::tools::ToolsetRouter;

use super::aggregate::surface_failures;
use super::delegation::DelegationTable;
use super::trace::{RequestPhase, RequestTrace, TraceHandle};

/// Final result of one top-level request
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub request_id: String,
    pub text: String,
    /// Everything the request consumed: coordinator plus every dispatch
    pub usage: Usage,
    /// The coordinator's own model calls
    pub coordinator_usage: Usage,
    pub trace: RequestTrace,
}

pub struct Coordinator {
    instructions: String,
    table: DelegationTable,
    router: ToolsetRouter,
    runner: Arc<AgentRunner>,
    limits: UsageLimits,
    deadline: Option<Duration>,
}

impl Coordinator {
    pub fn new(instructions: impl Into<String>, table: DelegationTable, runner: Arc<AgentRunner>) -> Self {
        let router = ToolsetRouter::new(table.toolset());
        Self {
            instructions: instructions.into(),
            table,
            router,
            runner,
            limits: UsageLimits::default(),
            deadline: None,
        }
    }

    pub fn with_limits(mut self, limits: UsageLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Overall deadline for each request
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    pub fn table(&self) -> &DelegationTable {
        &self.table
    }

    pub async fn handle(&self, input: &str, deps: Deps) -> Result<Answer> {
        self.handle_with_cancel(input, deps, CancellationToken::new()).await
    }

    /// Handle a request that `cancel` can abort from outside
    pub async fn handle_with_cancel(&self, input: &str, deps: Deps, cancel: CancellationToken) -> Result<Answer> {
        let ctx = ExecutionContext::new(deps)
            .with_limits(self.limits)
            .with_cancel_token(cancel);
        self.handle_in(input, ctx).await
    }

    /// Handle a request in a caller-built context.
    ///
    /// A trace is attached if the context has none.
    pub async fn handle_in(&self, input: &str, ctx: ExecutionContext) -> Result<Answer> {
        let existing = ctx.trace().cloned();
        let (ctx, trace) = match existing {
            Some(trace) => (ctx, trace),
            None => {
                let trace = TraceHandle::new(ctx.request_id());
                (ctx.with_trace(trace.clone()), trace)
            }
        };
        let request_id = ctx.request_id().to_string();
        info!("[{}] Request received ({} chars)", request_id, input.len());

        trace.advance(RequestPhase::Decomposing)?;
        let run = self.runner.run(&self.instructions, &self.router, input, &ctx);
        let result = match self.deadline {
            Some(limit) => match tokio::time::timeout(limit, run).await {
                Ok(result) => result,
                Err(_) => {
                    ctx.cancel();
                    Err(RouterError::DeadlineExceeded(limit))
                }
            },
            None => run.await,
        };

        let output = match result {
            Ok(output) => output,
            Err(e) => {
                let phase = match e {
                    RouterError::Cancelled | RouterError::DeadlineExceeded(_) => {
                        warn!("[{}] Request cancelled: {}", request_id, e);
                        RequestPhase::Cancelled
                    }
                    _ => {
                        error!("[{}] Request failed: {}", request_id, e);
                        RequestPhase::Failed
                    }
                };
                if let Err(trace_err) = trace.advance(phase) {
                    warn!("[{}] {}", request_id, trace_err);
                }
                return Err(e);
            }
        };

        trace.advance(RequestPhase::Aggregating)?;
        let dispatches = trace.snapshot()?.dispatches;
        let text = surface_failures(&output.text, &dispatches);
        trace.advance(RequestPhase::Completed)?;

        let usage = ctx.usage();
        info!(
            "[{}] Request completed: {} dispatch(es), {} failed, {}",
            request_id,
            dispatches.len(),
            dispatches.iter().filter(|d| d.outcome.is_failure()).count(),
            usage
        );

        Ok(Answer {
            request_id,
            text,
            usage,
            coordinator_usage: output.usage,
            trace: trace.snapshot()?,
        })
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("operations", &self.table.names())
            .field("limits", &self.limits)
            .field("deadline", &self.deadline)
            .finish()
    }
}
