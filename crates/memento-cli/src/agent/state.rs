//! Per-cycle state

use memento_core::{ChatMessage, ToolCall};

/// How the note was handled at the end of a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteUpdate {
    /// A new note was written; `from_marker` tells whether the marker was found
    Saved { from_marker: bool },
    /// Reflection was empty, the previous note stays
    Unchanged,
    /// Cycle was cancelled before it reached the persist step
    Skipped,
}

/// Summary of one finished cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleOutcome {
    pub cycle: u64,
    pub tool_calls: usize,
    pub note: NoteUpdate,
}

/// Transcript and counters owned by one cycle, dropped when it ends
#[derive(Debug)]
pub struct CycleState {
    cycle: u64,
    messages: Vec<ChatMessage>,
    tool_calls: usize,
}

impl CycleState {
    pub fn new(cycle: u64) -> Self {
        Self {
            cycle,
            messages: Vec::new(),
            tool_calls: 0,
        }
    }

    /// Append to the transcript; messages are never changed afterwards
    pub fn add_message(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn record_tool_result(&mut self, call: &ToolCall, output: String) {
        self.tool_calls += 1;
        self.messages
            .push(ChatMessage::tool_result(call.id.clone(), output));
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn outcome(&self, note: NoteUpdate) -> CycleOutcome {
        CycleOutcome {
            cycle: self.cycle,
            tool_calls: self.tool_calls,
            note,
        }
    }
}
