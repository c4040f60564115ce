//! memento-core: Shared library for the memento agent
//!
//! Provides:
//! - Configuration loading (config.toml)
//! - Transcript data model and tool schemas
//! - Conversation client trait and an OpenAI-compatible implementation
//! - The single-note durable store
//! - The error taxonomy used at the cycle boundary

pub mod chat;
pub mod client;
pub mod config;
pub mod error;
pub mod memento;
pub mod openai;

pub use chat::{
    ChatMessage, ChatResponse, ParameterProperty, ParameterSchema, Role, ToolCall, ToolDefinition,
};
pub use client::ConversationClient;
pub use config::Config;
pub use error::{AgentError, ApiError, Result};
pub use memento::{Memento, NoteStore};
pub use openai::{OpenAiClient, RetryConfig};
