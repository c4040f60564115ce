//! Deterministic collaborators for orchestrator tests

use std::collections::VecDeque;
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use memento_core::{
    AgentError, ApiError, ChatMessage, ChatResponse, ConversationClient, NoteStore, Result,
    ToolCall, ToolDefinition,
};
use serde_json::Value;
use tokio::sync::Mutex;

/// Scripted reply for one chat call
#[derive(Debug, Clone)]
pub enum MockStep {
    Reply(ChatResponse),
    Fail(String),
}

impl MockStep {
    pub fn text(content: impl Into<String>) -> Self {
        MockStep::Reply(ChatResponse::text(content))
    }

    pub fn tool_calls(content: Option<&str>, calls: Vec<(&str, &str, Value)>) -> Self {
        MockStep::Reply(ChatResponse {
            content: content.map(str::to_string),
            tool_calls: calls
                .into_iter()
                .map(|(id, name, args)| ToolCall::new(id, name, args))
                .collect(),
        })
    }

    pub fn fail(message: impl Into<String>) -> Self {
        MockStep::Fail(message.into())
    }
}

/// Conversation client that replays steps and records every transcript it sees
#[derive(Debug, Default)]
pub struct ScriptedClient {
    steps: Mutex<VecDeque<MockStep>>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedClient {
    pub fn new(steps: Vec<MockStep>) -> Self {
        Self {
            steps: Mutex::new(VecDeque::from(steps)),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub async fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl ConversationClient for ScriptedClient {
    fn model(&self) -> &str {
        "scripted"
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        _tools: &[ToolDefinition],
    ) -> Result<ChatResponse> {
        self.requests.lock().await.push(messages.to_vec());
        match self.steps.lock().await.pop_front() {
            Some(MockStep::Reply(response)) => Ok(response),
            Some(MockStep::Fail(message)) => Err(ApiError::Status {
                status: 500,
                message,
            }
            .into()),
            None => Err(ApiError::MalformedResponse("script exhausted".to_string()).into()),
        }
    }
}

/// In-memory note store that counts writes
#[derive(Debug, Default)]
pub struct RecordingStore {
    note: StdMutex<String>,
    writes: StdMutex<Vec<String>>,
    fail_reads: bool,
}

impl RecordingStore {
    pub fn with_note(note: &str) -> Self {
        Self {
            note: StdMutex::new(note.to_string()),
            ..Default::default()
        }
    }

    pub fn failing_reads() -> Self {
        Self {
            fail_reads: true,
            ..Default::default()
        }
    }

    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().unwrap().clone()
    }
}

impl NoteStore for RecordingStore {
    fn read(&self) -> Result<String> {
        if self.fail_reads {
            return Err(AgentError::storage(
                "/unreadable/note.txt",
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
            ));
        }
        Ok(self.note.lock().unwrap().clone())
    }

    fn write(&self, text: &str) -> Result<()> {
        *self.note.lock().unwrap() = text.to_string();
        self.writes.lock().unwrap().push(text.to_string());
        Ok(())
    }
}
