//! The text-generation boundary
//!
//! Everything above this trait treats the model as opaque: send the
//! instructions, the toolset and the conversation, get back text and/or tool
//! calls plus token usage.

use std::time::Duration;

use async_trait::async_trait;

use super::types::{CompletionRequest, CompletionResponse};

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// One model turn. The request carries the whole conversation; clients
    /// keep no per-conversation state.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Model used when a request does not name one
    fn model(&self) -> &str;

    /// False when the client is known to be unable to authenticate
    fn is_ready(&self) -> bool {
        true
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider is rate limiting; retry in {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("Provider returned HTTP {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Request to provider failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Unusable provider response: {0}")]
    InvalidResponse(String),

    #[error("Provider JSON could not be decoded: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("No API key: ${env_var} is not set")]
    MissingApiKey { env_var: String },

    #[error("Model call timed out after {0:?}")]
    Timeout(Duration),
}

impl LlmError {
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, LlmError::RateLimited { .. })
    }

    /// Transient failures: throttling, 5xx, transport and timeouts
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::ApiError { status, .. } => *status >= 500,
            LlmError::RateLimited { .. } | LlmError::Network(_) | LlmError::Timeout(_) => true,
            LlmError::InvalidResponse(_) | LlmError::JsonError(_) | LlmError::MissingApiKey { .. } => false,
        }
    }
}
