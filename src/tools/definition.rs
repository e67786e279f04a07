//! Tool descriptors and capability tags
//!
//! A `ToolDescriptor` is one invocable named operation. Descriptors are built
//! once by a catalog and then shared read-only behind `Arc`.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::context::ExecutionContext;
use crate::error::{Result, RouterError};
use crate::llm::ToolDefinition;

/// Identifier naming one capability domain, e.g. `Queue` or `Indexer`.
///
/// Case-sensitive. Only ASCII alphanumerics, `_` and `-` are accepted so the
/// tag can be embedded in a tool name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CapabilityTag(String);

impl CapabilityTag {
    pub fn parse(tag: impl Into<String>) -> Result<Self> {
        let tag = tag.into();
        if tag.is_empty() {
            return Err(RouterError::RegistryConfig("capability tag is empty".to_string()));
        }
        if let Some(bad) = tag.chars().find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-')) {
            return Err(RouterError::RegistryConfig(format!(
                "capability tag '{}' contains invalid character '{}'",
                tag, bad
            )));
        }
        Ok(Self(tag))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CapabilityTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CapabilityTag {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The backend call behind a descriptor
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Run the operation with model-supplied parameters
    async fn invoke(&self, params: Value, ctx: &ExecutionContext) -> Result<String>;
}

/// Handler that always returns the same text
#[derive(Debug, Clone)]
pub struct StaticHandler(pub String);

#[async_trait]
impl ToolHandler for StaticHandler {
    async fn invoke(&self, _params: Value, _ctx: &ExecutionContext) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Handler backed by a synchronous closure
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F> ToolHandler for FnHandler<F>
where
    F: Fn(Value) -> Result<String> + Send + Sync,
{
    async fn invoke(&self, params: Value, _ctx: &ExecutionContext) -> Result<String> {
        (self.0)(params)
    }
}

/// One invocable named operation with its capability tags
#[derive(Clone)]
pub struct ToolDescriptor {
    name: String,
    description: String,
    input_schema: Value,
    tags: BTreeSet<String>,
    handler: Arc<dyn ToolHandler>,
}

impl ToolDescriptor {
    /// Create a descriptor with an empty object schema and no tags
    pub fn new(name: impl Into<String>, description: impl Into<String>, handler: Arc<dyn ToolHandler>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
            tags: BTreeSet::new(),
            handler,
        }
    }

    /// Set input schema
    pub fn with_schema(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn input_schema(&self) -> &Value {
        &self.input_schema
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    /// Exact, case-sensitive tag membership
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    pub async fn invoke(&self, params: Value, ctx: &ExecutionContext) -> Result<String> {
        self.handler.invoke(params, ctx).await
    }

    /// Convert to LLM ToolDefinition for API calls
    pub fn to_llm_definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name.clone(), self.description.clone(), self.input_schema.clone())
    }
}

impl fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .field("tags", &self.tags)
            .finish_non_exhaustive()
    }
}
