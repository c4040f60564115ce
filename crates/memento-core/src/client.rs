//! Conversation client abstraction

use async_trait::async_trait;

use crate::chat::{ChatMessage, ChatResponse, ToolDefinition};
use crate::error::Result;

/// Sends a transcript to a language model and returns its reply
///
/// Implementations keep the order of the requested tool calls and make sure
/// every call id is unique within one response. Transport retries, if any,
/// happen inside the implementation.
#[async_trait]
pub trait ConversationClient: Send + Sync {
    /// Model identifier, used for logging
    fn model(&self) -> &str;

    async fn chat(&self, messages: &[ChatMessage], tools: &[ToolDefinition])
        -> Result<ChatResponse>;
}
