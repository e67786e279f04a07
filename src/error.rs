//! Library error type.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RouterError {
    /// Duplicate, empty or malformed registry entry. Fatal at startup.
    #[error("Registry config error: {0}")]
    RegistryConfig(String),

    /// A catalog cannot be enumerated for filtering
    #[error("Catalog '{catalog}' unavailable: {reason}")]
    CatalogUnavailable { catalog: String, reason: String },

    /// A worker run exceeded its per-call timeout
    #[error("Dispatch to '{tag}' timed out after {timeout:?}")]
    DispatchTimeout { tag: String, timeout: Duration },

    /// A worker run failed
    #[error("Dispatch to '{tag}' failed: {reason}")]
    DispatchFailure { tag: String, reason: String },

    /// The top-level request was cancelled
    #[error("Request cancelled")]
    Cancelled,

    /// The top-level request ran past its overall deadline
    #[error("Request deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),

    #[error("Usage limit exceeded: {0}")]
    UsageLimitExceeded(String),

    /// Invalid state transition or operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Model provider failure, already rendered
    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Tool error: {0}")]
    Tool(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Catalog manifests
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl RouterError {
    /// Only registry misconfiguration stops the process.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RouterError::RegistryConfig(_))
    }

    /// True for the failures a dispatch reports back to the coordinator.
    pub fn is_dispatch_failure(&self) -> bool {
        matches!(
            self,
            RouterError::DispatchTimeout { .. } | RouterError::DispatchFailure { .. }
        )
    }
}

impl From<crate::llm::LlmError> for RouterError {
    fn from(err: crate::llm::LlmError) -> Self {
        RouterError::Llm(err.to_string())
    }
}

/// Result type alias for router operations
pub type Result<T> = std::result::Result<T, RouterError>;
