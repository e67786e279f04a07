//! Model access shared by the coordinator and the workers.
//!
//! `AnthropicClient` talks HTTP; `MockLlmClient` replays scripted replies
//! and is what the tests drive the router with.

pub mod anthropic;
pub mod client;
pub mod mock;
pub mod types;

pub use anthropic::{AnthropicClient, AnthropicConfig};
pub use client::{LlmClient, LlmError};
pub use mock::{MockLlmClient, MockReply};
pub use types::{
    CompletionRequest, CompletionResponse, ContentBlock, Message, ModelSettings, Role, StopReason, ToolCall,
    ToolDefinition, ToolResult, Usage,
};
