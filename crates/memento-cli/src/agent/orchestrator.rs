//! Cycle orchestrator

use std::sync::Arc;
use std::time::Duration;

use memento_core::{AgentError, ChatMessage, ConversationClient, NoteStore, ToolDefinition};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::prompt::{compose_user_message, extract_note, system_directive};
use super::state::{CycleOutcome, CycleState, NoteUpdate};
use crate::tools::{self, ToolRouter};

/// Drives the recall → compose → think → act → reflect → persist → rest loop
pub struct Orchestrator {
    client: Arc<dyn ConversationClient>,
    memento: Arc<dyn NoteStore>,
    router: ToolRouter,
    interval: Duration,
    definitions: Vec<ToolDefinition>,
}

impl Orchestrator {
    pub fn new(
        client: Arc<dyn ConversationClient>,
        memento: Arc<dyn NoteStore>,
        router: ToolRouter,
        interval: Duration,
    ) -> Self {
        Self {
            client,
            memento,
            router,
            interval,
            definitions: tools::definitions(),
        }
    }

    /// Run cycles until `cancel` fires; returns the number of cycles started
    pub async fn run(&self, cancel: CancellationToken) -> u64 {
        info!(
            model = %self.client.model(),
            interval_secs = self.interval.as_secs(),
            tools_dir = %self.router.registry().dir().display(),
            "Agent is waking up"
        );

        let mut cycle = 0;
        while !cancel.is_cancelled() {
            cycle += 1;

            match self.run_cycle(cycle, &cancel).await {
                Ok(outcome) => debug!(?outcome, "Cycle complete"),
                Err(e) => error!(cycle, category = e.category(), error = %e, "Cycle failed"),
            }

            if cancel.is_cancelled() {
                break;
            }

            info!(interval_secs = self.interval.as_secs(), "Resting");
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        info!(cycles = cycle, "Agent is shutting down");
        cycle
    }

    /// One full cycle; every error is returned to the caller, none panics
    #[instrument(skip(self, cancel))]
    pub async fn run_cycle(
        &self,
        cycle: u64,
        cancel: &CancellationToken,
    ) -> Result<CycleOutcome, AgentError> {
        let mut state = CycleState::new(cycle);

        // Recall
        let note = self.recall();

        // Compose
        let inventory = self.inventory();
        state.add_message(ChatMessage::system(system_directive()));
        state.add_message(ChatMessage::user(compose_user_message(
            &note,
            &inventory,
            self.router.registry().dir(),
        )));

        // Think
        let response = self.client.chat(state.messages(), &self.definitions).await?;
        if !response.content_text().is_empty() {
            info!(thought = %response.content_text(), "Thought");
        }

        let reflection = if response.tool_calls.is_empty() {
            response.content.unwrap_or_default()
        } else {
            // Act
            let calls = response.tool_calls;
            state.add_message(ChatMessage::assistant(response.content, calls.clone()));
            debug!(tool_count = calls.len(), "Processing tool calls");

            for (i, call) in calls.iter().enumerate() {
                if cancel.is_cancelled() {
                    warn!(
                        remaining = calls.len() - i,
                        "Cancelled during tool calls, skipping reflection"
                    );
                    return Ok(state.outcome(NoteUpdate::Skipped));
                }
                let result = self.router.route(call).await;
                state.record_tool_result(call, result.message());
            }

            // Reflect
            let followup = self.client.chat(state.messages(), &self.definitions).await?;
            if !followup.tool_calls.is_empty() {
                warn!(
                    ignored = followup.tool_calls.len(),
                    "Tool calls in the reflection turn are ignored"
                );
            }
            if !followup.content_text().is_empty() {
                info!(thought = %followup.content_text(), "Reflection");
            }
            followup.content.unwrap_or_default()
        };

        // Persist
        let update = self.persist(&reflection)?;
        Ok(state.outcome(update))
    }

    fn recall(&self) -> String {
        match self.memento.read() {
            Ok(note) if note.is_empty() => {
                info!("Memory is empty, first awakening");
                note
            }
            Ok(note) => {
                info!(note = %note, "Recalled note");
                note
            }
            Err(e) => {
                error!(
                    category = e.category(),
                    error = %e,
                    "Failed to read note, continuing without memory"
                );
                String::new()
            }
        }
    }

    fn inventory(&self) -> Vec<String> {
        match self.router.registry().list_tools() {
            Ok(tools) => {
                debug!(tools = ?tools, "Current inventory");
                tools
            }
            Err(e) => {
                error!(
                    category = e.category(),
                    error = %e,
                    "Failed to list tools, continuing with none"
                );
                Vec::new()
            }
        }
    }

    fn persist(&self, reflection: &str) -> Result<NoteUpdate, AgentError> {
        if reflection.is_empty() {
            info!("Nothing to remember this cycle, note unchanged");
            return Ok(NoteUpdate::Unchanged);
        }

        let (note, from_marker) = extract_note(reflection);
        self.memento.write(note)?;
        if from_marker {
            info!(bytes = note.len(), "Note saved");
        } else {
            info!(bytes = note.len(), "No marker found, full response saved as note");
        }
        Ok(NoteUpdate::Saved { from_marker })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::prompt::{EMPTY_INVENTORY, FIRST_AWAKENING};
    use crate::agent::testing::{MockStep, RecordingStore, ScriptedClient};
    use crate::tools::{ToolRegistry, CREATE_TOOL, RUN_TOOL};
    use memento_core::Role;
    use serde_json::json;
    use tempfile::TempDir;

    struct Harness {
        _temp: TempDir,
        client: Arc<ScriptedClient>,
        store: Arc<RecordingStore>,
        orchestrator: Orchestrator,
    }

    fn harness(steps: Vec<MockStep>, store: RecordingStore, interval: Duration) -> Harness {
        let temp = TempDir::new().unwrap();
        let registry = ToolRegistry::new(temp.path().join("tools"), Duration::from_secs(5), 10_000);
        let client = Arc::new(ScriptedClient::new(steps));
        let store = Arc::new(store);
        let orchestrator = Orchestrator::new(
            client.clone(),
            store.clone(),
            ToolRouter::new(registry),
            interval,
        );
        Harness {
            _temp: temp,
            client,
            store,
            orchestrator,
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_first_cycle_create_then_run() {
        let h = harness(
            vec![
                MockStep::tool_calls(
                    Some("I should build something."),
                    vec![
                        (
                            "call_1",
                            CREATE_TOOL,
                            json!({"filename": "hello.sh", "code": "echo hello from tool"}),
                        ),
                        ("call_2", RUN_TOOL, json!({"filename": "hello.sh"})),
                    ],
                ),
                MockStep::text("It worked. MEMENTO_NOTE:I have hello.sh, it prints a greeting."),
            ],
            RecordingStore::default(),
            Duration::from_millis(10),
        );

        let outcome = h
            .orchestrator
            .run_cycle(1, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.tool_calls, 2);
        assert_eq!(outcome.note, NoteUpdate::Saved { from_marker: true });

        let requests = h.client.requests().await;
        assert_eq!(requests.len(), 2);

        // First prompt: system directive plus a first-awakening user message
        let first = &requests[0];
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].role, Role::System);
        assert!(first[1].text().contains(FIRST_AWAKENING));
        assert!(first[1].text().ends_with(EMPTY_INVENTORY));

        // Second prompt: assistant turn then one tool result per call, in order
        let second = &requests[1];
        assert_eq!(second.len(), 5);
        assert_eq!(second[2].role, Role::Assistant);
        assert_eq!(second[2].tool_calls.as_ref().unwrap().len(), 2);
        assert_eq!(second[3].tool_call_id.as_deref(), Some("call_1"));
        assert!(second[3].text().starts_with("success: hello.sh created and saved"));
        assert_eq!(second[4].tool_call_id.as_deref(), Some("call_2"));
        assert!(second[4].text().contains("hello from tool"));

        assert_eq!(
            h.store.writes(),
            vec!["I have hello.sh, it prints a greeting.".to_string()]
        );
        assert_eq!(
            h.orchestrator.router.registry().list_tools().unwrap(),
            vec!["hello.sh"]
        );
    }

    #[tokio::test]
    async fn test_text_only_reply_saved_verbatim() {
        let h = harness(
            vec![MockStep::text("just thinking, no marker")],
            RecordingStore::with_note("old note"),
            Duration::from_millis(10),
        );

        let outcome = h
            .orchestrator
            .run_cycle(1, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.tool_calls, 0);
        assert_eq!(outcome.note, NoteUpdate::Saved { from_marker: false });
        assert_eq!(h.store.writes(), vec!["just thinking, no marker".to_string()]);

        let requests = h.client.requests().await;
        assert_eq!(requests.len(), 1);
        assert!(requests[0][1].text().starts_with("MEMENTO_READ:\nold note"));
        assert!(!requests[0][1].text().contains(FIRST_AWAKENING));
    }

    #[tokio::test]
    async fn test_unknown_tool_does_not_abort_cycle() {
        let h = harness(
            vec![
                MockStep::tool_calls(
                    None,
                    vec![
                        ("x1", "tool_summon", json!({})),
                        ("x2", RUN_TOOL, json!({"filename": "missing.py"})),
                    ],
                ),
                MockStep::text("MEMENTO_NOTE:only two tools exist"),
            ],
            RecordingStore::default(),
            Duration::from_millis(10),
        );

        let outcome = h
            .orchestrator
            .run_cycle(1, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.tool_calls, 2);

        let requests = h.client.requests().await;
        let second = &requests[1];
        assert_eq!(second[2].content, None);
        assert_eq!(second[3].text(), "unknown tool: tool_summon");
        assert_eq!(second[4].text(), "tool not found: missing.py");
        assert_eq!(h.store.writes(), vec!["only two tools exist".to_string()]);
    }

    #[tokio::test]
    async fn test_malformed_arguments_reported_to_model() {
        let h = harness(
            vec![
                MockStep::tool_calls(None, vec![("m1", CREATE_TOOL, json!({"name": "x"}))]),
                MockStep::text("MEMENTO_NOTE:use filename and code"),
            ],
            RecordingStore::default(),
            Duration::from_millis(10),
        );

        h.orchestrator
            .run_cycle(1, &CancellationToken::new())
            .await
            .unwrap();

        let requests = h.client.requests().await;
        assert!(requests[1][3].text().contains("malformed arguments for tool_write_script"));
    }

    #[tokio::test]
    async fn test_empty_reflection_leaves_note_unchanged() {
        let h = harness(
            vec![
                MockStep::tool_calls(None, vec![("e1", RUN_TOOL, json!({"filename": "none.sh"}))]),
                MockStep::Reply(Default::default()),
            ],
            RecordingStore::with_note("keep me"),
            Duration::from_millis(10),
        );

        let outcome = h
            .orchestrator
            .run_cycle(1, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.note, NoteUpdate::Unchanged);
        assert!(h.store.writes().is_empty());
    }

    #[tokio::test]
    async fn test_api_error_is_returned_not_panicked() {
        let h = harness(
            vec![MockStep::fail("upstream down")],
            RecordingStore::default(),
            Duration::from_millis(10),
        );

        let err = h
            .orchestrator
            .run_cycle(1, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.category(), "api");
        assert!(h.store.writes().is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_note_treated_as_first_awakening() {
        let h = harness(
            vec![MockStep::text("MEMENTO_NOTE:fresh start")],
            RecordingStore::failing_reads(),
            Duration::from_millis(10),
        );

        h.orchestrator
            .run_cycle(1, &CancellationToken::new())
            .await
            .unwrap();

        let requests = h.client.requests().await;
        assert!(requests[0][1].text().contains(FIRST_AWAKENING));
        assert_eq!(h.store.writes(), vec!["fresh start".to_string()]);
    }

    #[tokio::test]
    async fn test_cancelled_before_tool_calls_skips_reflection() {
        let h = harness(
            vec![MockStep::tool_calls(
                None,
                vec![("c1", CREATE_TOOL, json!({"filename": "a.sh", "code": "echo"}))],
            )],
            RecordingStore::default(),
            Duration::from_millis(10),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = h.orchestrator.run_cycle(1, &cancel).await.unwrap();

        assert_eq!(outcome.note, NoteUpdate::Skipped);
        assert_eq!(outcome.tool_calls, 0);
        assert_eq!(h.client.requests().await.len(), 1);
        assert!(h.orchestrator.router.registry().list_tools().unwrap().is_empty());
        assert!(h.store.writes().is_empty());
    }

    #[tokio::test]
    async fn test_run_survives_api_error_and_continues() {
        let h = harness(
            vec![
                MockStep::fail("first attempt fails"),
                MockStep::text("MEMENTO_NOTE:second cycle worked"),
            ],
            RecordingStore::default(),
            Duration::from_millis(10),
        );
        let Harness {
            _temp,
            client,
            store,
            orchestrator,
        } = h;
        let orchestrator = Arc::new(orchestrator);

        let cancel = CancellationToken::new();
        let handle = {
            let orchestrator = orchestrator.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { orchestrator.run(cancel).await })
        };

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while store.writes().is_empty() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        cancel.cancel();

        let cycles = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(cycles >= 2);
        assert_eq!(store.writes()[0], "second cycle worked");
        assert!(client.requests().await.len() >= 2);
    }

    #[tokio::test]
    async fn test_cancel_during_rest_returns_promptly() {
        let h = harness(
            vec![MockStep::text("MEMENTO_NOTE:resting")],
            RecordingStore::default(),
            Duration::from_secs(3600),
        );
        let orchestrator = Arc::new(h.orchestrator);

        let cancel = CancellationToken::new();
        let handle = {
            let orchestrator = orchestrator.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { orchestrator.run(cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();

        let cycles = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("run should stop well before the interval elapses")
            .unwrap();
        assert_eq!(cycles, 1);
        assert_eq!(h.store.writes(), vec!["resting".to_string()]);
    }
}
