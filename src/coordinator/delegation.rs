//! Delegation table
//!
//! One dispatch operation per registry entry, exposed to the coordinator as
//! an ordinary tool named `dispatch_<tag>`. The table is built by iterating
//! the workers once; each handler owns its worker.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde_json::{Value, json};

use crate::context::ExecutionContext;
use crate::error::{Result, RouterError};
use crate::llm::Usage;
use crate::tools::{CapabilityTag, ToolDescriptor, ToolHandler, Toolset};
use crate::worker::Worker;

use super::trace::{DispatchOutcome, DispatchRecord};

pub const DISPATCH_PREFIX: &str = "dispatch_";

/// `Queue` -> `dispatch_Queue`
pub fn dispatch_name(tag: &str) -> String {
    format!("{}{}", DISPATCH_PREFIX, tag)
}

fn dispatch_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "task": {
                "type": "string",
                "description": "Precise, self-contained description of the sub-task"
            }
        },
        "required": ["task"]
    })
}

/// Runs one worker on behalf of the coordinator
pub struct DelegationHandler {
    worker: Worker,
}

impl DelegationHandler {
    pub fn new(worker: Worker) -> Self {
        Self { worker }
    }

    pub fn worker(&self) -> &Worker {
        &self.worker
    }

    /// Run the bound worker on `task` and record the dispatch on the
    /// request trace, if the context carries one.
    ///
    /// Timeouts and failures come back as `Err` after being recorded; the
    /// tool router turns them into error results for the coordinator.
    pub async fn dispatch(&self, task: &str, ctx: &ExecutionContext) -> Result<String> {
        let tag = self.worker.tag().as_str();
        let index = match ctx.trace() {
            Some(trace) => trace.begin_dispatch()?,
            None => 0,
        };
        let started_at = Utc::now();
        info!("[{}] dispatch #{} -> {}: {}", ctx.request_id(), index, tag, task);

        let result = match self.worker.run(task, ctx).await {
            Ok(result) => result,
            Err(e) => {
                warn!("[{}] dispatch #{} to {} cancelled", ctx.request_id(), index, tag);
                let cancelled = self.record_for(index, task, DispatchOutcome::Cancelled, Usage::default(), started_at, 0);
                if let Err(trace_err) = record_dispatch(ctx, cancelled) {
                    debug!("Could not record cancelled dispatch: {}", trace_err);
                }
                return Err(e);
            }
        };

        let duration_ms = result.duration.as_millis() as u64;
        let outcome = match &result.outcome {
            Ok(_) => DispatchOutcome::Completed,
            Err(RouterError::DispatchTimeout { timeout, .. }) => {
                DispatchOutcome::TimedOut(format!("timed out after {:?}", timeout))
            }
            Err(RouterError::DispatchFailure { reason, .. }) => DispatchOutcome::Failed(reason.clone()),
            Err(other) => DispatchOutcome::Failed(other.to_string()),
        };

        match &outcome {
            DispatchOutcome::Completed => info!(
                "[{}] dispatch #{} to {} completed in {}ms ({})",
                ctx.request_id(),
                index,
                tag,
                duration_ms,
                result.usage_delta
            ),
            other => warn!(
                "[{}] dispatch #{} to {} did not complete in {}ms: {} ({})",
                ctx.request_id(),
                index,
                tag,
                duration_ms,
                other.reason().unwrap_or("unknown"),
                result.usage_delta
            ),
        }

        record_dispatch(ctx, self.record_for(index, task, outcome, result.usage_delta, started_at, duration_ms))?;
        result.outcome
    }

    fn record_for(
        &self,
        index: usize,
        task: &str,
        outcome: DispatchOutcome,
        usage: Usage,
        started_at: DateTime<Utc>,
        duration_ms: u64,
    ) -> DispatchRecord {
        DispatchRecord {
            index,
            tag: self.worker.tag().to_string(),
            task: task.to_string(),
            outcome,
            usage,
            started_at,
            duration_ms,
        }
    }
}

fn record_dispatch(ctx: &ExecutionContext, record: DispatchRecord) -> Result<()> {
    match ctx.trace() {
        Some(trace) => trace.record(record),
        None => Ok(()),
    }
}

#[async_trait]
impl ToolHandler for DelegationHandler {
    async fn invoke(&self, params: Value, ctx: &ExecutionContext) -> Result<String> {
        let task = params
            .get("task")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                RouterError::Tool(format!(
                    "{} requires a non-empty 'task' string",
                    dispatch_name(self.worker.tag().as_str())
                ))
            })?;
        self.dispatch(task, ctx).await
    }
}

/// One generated dispatch operation
#[derive(Clone)]
pub struct DelegationOperation {
    tag: CapabilityTag,
    handler: Arc<DelegationHandler>,
    descriptor: Arc<ToolDescriptor>,
}

impl DelegationOperation {
    fn new(worker: Worker) -> Self {
        let tag = worker.tag().clone();
        let handler = Arc::new(DelegationHandler::new(worker));
        let descriptor = ToolDescriptor::new(
            dispatch_name(tag.as_str()),
            format!("Assign a task related to {} to the {} Agent.", tag, tag),
            Arc::clone(&handler) as Arc<dyn ToolHandler>,
        )
        .with_schema(dispatch_schema());
        Self {
            tag,
            handler,
            descriptor: Arc::new(descriptor),
        }
    }

    pub fn tag(&self) -> &CapabilityTag {
        &self.tag
    }

    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    pub fn worker(&self) -> &Worker {
        self.handler.worker()
    }

    pub fn descriptor(&self) -> &Arc<ToolDescriptor> {
        &self.descriptor
    }

    pub async fn dispatch(&self, task: &str, ctx: &ExecutionContext) -> Result<String> {
        self.handler.dispatch(task, ctx).await
    }
}

impl std::fmt::Debug for DelegationOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelegationOperation")
            .field("name", &self.name())
            .field("worker", self.worker())
            .finish()
    }
}

/// Tag -> dispatch operation, in registry order
#[derive(Debug, Clone)]
pub struct DelegationTable {
    operations: Vec<DelegationOperation>,
    by_tag: HashMap<CapabilityTag, usize>,
}

impl DelegationTable {
    /// One operation per worker. A repeated tag is a registry error.
    pub fn build(workers: Vec<Worker>) -> Result<Self> {
        let mut operations = Vec::with_capacity(workers.len());
        let mut by_tag = HashMap::with_capacity(workers.len());
        for worker in workers {
            let tag = worker.tag().clone();
            if by_tag.insert(tag.clone(), operations.len()).is_some() {
                return Err(RouterError::RegistryConfig(format!(
                    "more than one worker for capability tag '{}'",
                    tag
                )));
            }
            operations.push(DelegationOperation::new(worker));
        }
        Ok(Self { operations, by_tag })
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DelegationOperation> {
        self.operations.iter()
    }

    pub fn get(&self, tag: &str) -> Option<&DelegationOperation> {
        CapabilityTag::parse(tag)
            .ok()
            .and_then(|t| self.by_tag.get(&t))
            .map(|&i| &self.operations[i])
    }

    pub fn names(&self) -> Vec<&str> {
        self.operations.iter().map(|op| op.name()).collect()
    }

    /// The coordinator's entire toolset
    pub fn toolset(&self) -> Toolset {
        Toolset::new(self.operations.iter().map(|op| Arc::clone(&op.descriptor)).collect())
    }
}
