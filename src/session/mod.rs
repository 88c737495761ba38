//! The in-memory chat session: a single-threaded reducer that turns the
//! heterogeneous inbound frame stream into a consistent set of UI state
//! slices (message log, activity block, query and sandbox runs).
//!
//! One event is fully classified, filtered, and routed before the next is
//! processed. Side-effecting jobs (query/sandbox execution) are returned
//! as [`SideEffect`] values for the caller to spawn; their completions
//! re-enter the reducer as [`SessionEvent`]s, unordered relative to the
//! frame stream.

pub mod classify;
pub mod filter;
mod router;
pub mod tags;
pub mod timeline;

pub use classify::Role;

use classify::{classify, ClassifiedFrame, RawToolCall, RawToolResponse};
use serde_json::Value;
use timeline::ActivityBlock;
use tracing::warn;

use crate::queries::QueryTracker;
use crate::sandbox::{GraphFragment, SandboxFailure, SandboxOutcome, SandboxTracker};

const WELCOME: &str = "## Ad Optimiser Agent\n\nHi, I'm your Ad Optimiser. I'm here to help you analyze and optimize your marketing campaigns across platforms. How can I help you?";

/// One chronological chat-log entry. Immutable once appended.
#[derive(Debug, Clone)]
pub struct Message {
    pub sender: Role,
    pub content: String,
    pub timestamp: i64,
}

/// Everything the reducer reacts to: inbound frames, async job
/// completions, and the one-shot connection-loss notification.
#[derive(Debug)]
pub enum SessionEvent {
    Frame(String),
    QueryDone {
        id: String,
        result: Result<Vec<Value>, String>,
    },
    SandboxDone {
        result: Result<SandboxOutcome, String>,
    },
    Disconnected {
        reason: String,
    },
}

/// Fire-and-forget jobs the reducer asks its caller to spawn.
#[derive(Debug, Clone)]
pub enum SideEffect {
    RunQuery { id: String, query: String },
    RunSandbox { fragment: GraphFragment },
}

pub struct ChatSession {
    /// Append-only chronological chat log.
    pub messages: Vec<Message>,
    /// The single live activity block, lazily created and never replaced.
    pub activity: Option<ActivityBlock>,
    /// True between a user send (or tool_call frame) and the sentinel.
    pub processing: bool,
    pub queries: QueryTracker,
    pub sandbox: SandboxTracker,
}

impl ChatSession {
    pub fn new() -> Self {
        Self {
            messages: vec![Message {
                sender: Role::Agent,
                content: WELCOME.to_string(),
                timestamp: Self::now(),
            }],
            activity: None,
            processing: false,
            queries: QueryTracker::default(),
            sandbox: SandboxTracker::default(),
        }
    }

    pub fn now() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    pub fn push_system_error(&mut self, content: String) {
        self.push_message(Role::SystemError, content);
    }

    pub fn handle_event(&mut self, event: SessionEvent) -> Vec<SideEffect> {
        match event {
            SessionEvent::Frame(raw) => self.apply_frame(&raw),
            SessionEvent::QueryDone { id, result } => {
                self.apply_query_done(&id, result);
                Vec::new()
            }
            SessionEvent::SandboxDone { result } => {
                self.apply_sandbox_done(result);
                Vec::new()
            }
            SessionEvent::Disconnected { reason } => {
                warn!(%reason, "transport disconnected");
                self.push_message(
                    Role::SystemError,
                    "Connection lost. Please restart.".to_string(),
                );
                Vec::new()
            }
        }
    }

    /// Classify, filter, and route one raw inbound frame.
    pub fn apply_frame(&mut self, raw: &str) -> Vec<SideEffect> {
        if raw.trim().is_empty() {
            return Vec::new();
        }
        let frame = classify(raw);
        if filter::is_noise(&frame) {
            return Vec::new();
        }
        match frame {
            ClassifiedFrame::Sentinel => {
                // Turn finished: only the flag changes, the block stays.
                self.processing = false;
                Vec::new()
            }
            ClassifiedFrame::ToolCall { content, calls } => {
                self.apply_tool_call(content, calls);
                Vec::new()
            }
            ClassifiedFrame::ToolResponse { responses } => {
                self.apply_tool_responses(&responses);
                Vec::new()
            }
            ClassifiedFrame::Text { sender, content } => self.route_text(sender, content),
            ClassifiedFrame::Malformed { raw } => {
                self.surface_malformed(&raw);
                Vec::new()
            }
        }
    }

    /// Append the user's outbound message and enter Processing.
    pub fn note_user_send(&mut self, text: &str) {
        self.push_message(Role::User, text.to_string());
        self.processing = true;
    }

    pub fn push_message(&mut self, sender: Role, content: String) {
        self.messages.push(Message {
            sender,
            content,
            timestamp: Self::now(),
        });
    }

    pub fn toggle_activity_collapse(&mut self) {
        if let Some(block) = &mut self.activity {
            block.collapsed = !block.collapsed;
        }
    }

    /// Materialize the activity block on first need. A second block is
    /// never started: all activity accumulates into the single live block.
    fn ensure_activity(&mut self, now: i64) -> &mut ActivityBlock {
        self.activity.get_or_insert_with(|| ActivityBlock::new(now))
    }

    fn apply_tool_call(&mut self, content: Option<String>, calls: Vec<RawToolCall>) {
        let now = Self::now();
        let block = self.ensure_activity(now);
        if let Some(bundled) = content {
            if let Some(thinking) = tags::extract(&bundled, "thinking") {
                block.push_thinking(thinking, now);
            }
        }
        for call in &calls {
            block.push_tool_call(call, now);
        }
        self.processing = true;
    }

    fn apply_tool_responses(&mut self, responses: &[RawToolResponse]) {
        let now = Self::now();
        match &mut self.activity {
            Some(block) => block.resolve_tool_responses(responses, now),
            None => warn!(
                count = responses.len(),
                "tool_response without an active activity block, ignoring"
            ),
        }
    }

    /// Diagnostics for undecodable frames. A frame that looked like a JSON
    /// object but failed to decode gets a visible error; anything else is
    /// only logged — the relay occasionally emits bare status strings.
    fn surface_malformed(&mut self, raw: &str) {
        warn!(raw, "malformed inbound frame");
        let trimmed = raw.trim();
        match serde_json::from_str::<Value>(trimmed) {
            Ok(value) => {
                let frame_type = value.get("type").and_then(|v| v.as_str());
                if let Some(kind @ ("tool_call" | "tool_response")) = frame_type {
                    self.push_message(
                        Role::SystemError,
                        format!("System error: Malformed {kind} structure."),
                    );
                }
            }
            Err(_) if trimmed.starts_with('{') => {
                self.push_message(
                    Role::SystemError,
                    "System error: Could not parse message from server.".to_string(),
                );
            }
            Err(_) => {}
        }
    }

    fn apply_query_done(&mut self, id: &str, result: Result<Vec<Value>, String>) {
        match result {
            Ok(records) => {
                let empty = records.is_empty();
                if self.queries.mark_success(id, records) && empty {
                    self.push_message(
                        Role::Agent,
                        format!("Query (ID {id}) executed successfully but returned no data."),
                    );
                }
            }
            Err(details) => {
                if self.queries.mark_error(id, details.clone()) {
                    self.push_message(
                        Role::SystemError,
                        format!("API Error for query (ID {id}): {details}"),
                    );
                }
            }
        }
    }

    fn apply_sandbox_done(&mut self, result: Result<SandboxOutcome, String>) {
        match result {
            Ok(outcome) => {
                if let SandboxOutcome::Failure(failure) = &outcome {
                    let detail = failure.details.as_deref().unwrap_or(&failure.error);
                    self.push_message(Role::SystemError, format!("Sandbox Error: {detail}"));
                }
                self.sandbox.finish(outcome);
            }
            Err(message) => {
                self.push_message(
                    Role::SystemError,
                    format!("Sandbox API Call Failed: {message}"),
                );
                self.sandbox.finish(SandboxOutcome::Failure(SandboxFailure {
                    error: "Network or parsing error when calling sandbox API.".to_string(),
                    details: Some(message),
                    template_used: None,
                    stack: None,
                }));
            }
        }
    }
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::timeline::{StepStatus, StreamEntry};
    use super::*;
    use crate::queries::QueryStatus;
    use serde_json::json;

    fn session() -> ChatSession {
        ChatSession::new()
    }

    fn message_count(s: &ChatSession) -> usize {
        // Ignore the seeded welcome message in assertions.
        s.messages.len() - 1
    }

    #[test]
    fn query_frame_creates_pending_execution_and_no_message() {
        let mut s = session();
        let effects = s.apply_frame(
            r#"{"type":"text","sender":"QueryGeneratorAgent","content":"<query>{\"queries\":[\"MATCH (n) RETURN n\"]}</query>"}"#,
        );

        assert_eq!(s.queries.executions.len(), 1);
        let exec = &s.queries.executions[0];
        assert_eq!(exec.query, "MATCH (n) RETURN n");
        assert_eq!(exec.status, QueryStatus::Pending);
        assert_eq!(s.queries.active_id.as_deref(), Some(exec.id.as_str()));
        assert_eq!(message_count(&s), 0);
        assert!(
            matches!(&effects[..], [SideEffect::RunQuery { query, .. }] if query == "MATCH (n) RETURN n")
        );
    }

    #[test]
    fn two_queries_in_one_frame_are_independent_and_first_is_active() {
        let mut s = session();
        let effects = s.apply_frame(
            r#"{"type":"text","sender":"QueryGeneratorAgent","content":"<query>{\"queries\":[\"MATCH (a) RETURN a\",\"MATCH (b) RETURN b\"]}</query>"}"#,
        );

        assert_eq!(s.queries.executions.len(), 2);
        assert_eq!(effects.len(), 2);
        let first = &s.queries.executions[0];
        let second = &s.queries.executions[1];
        assert_ne!(first.id, second.id);
        assert_eq!(first.status, QueryStatus::Pending);
        assert_eq!(second.status, QueryStatus::Pending);
        assert_eq!(s.queries.active_id.as_deref(), Some(first.id.as_str()));
    }

    #[test]
    fn malformed_query_payload_appends_diagnostic_and_no_partial_state() {
        let mut s = session();
        let effects = s.apply_frame(
            r#"{"type":"text","sender":"QueryGeneratorAgent","content":"<query>not json</query>"}"#,
        );
        assert!(effects.is_empty());
        assert!(s.queries.executions.is_empty());
        assert_eq!(message_count(&s), 1);
        assert_eq!(s.messages.last().unwrap().sender, Role::SystemError);
    }

    #[test]
    fn orchestrator_without_thinking_tag_is_dropped_silently() {
        let mut s = session();
        let effects = s.apply_frame(
            r#"{"type":"text","sender":"OrchestratorAgent","content":"no thinking tag here"}"#,
        );
        assert!(effects.is_empty());
        assert_eq!(message_count(&s), 0);
        assert!(s.activity.is_none());
    }

    #[test]
    fn orchestrator_thinking_goes_to_activity_and_remainder_to_chat() {
        let mut s = session();
        s.apply_frame(
            r#"{"type":"text","sender":"OrchestratorAgent","content":"<thinking>check meta spend</thinking>Here is my plan."}"#,
        );
        let block = s.activity.as_ref().expect("activity block");
        assert_eq!(block.stream.len(), 1);
        match &block.stream[0] {
            StreamEntry::Thinking(step) => assert_eq!(step.text, "check meta spend"),
            other => panic!("expected thinking step, got {other:?}"),
        }
        assert_eq!(message_count(&s), 1);
        assert_eq!(s.messages.last().unwrap().content, "Here is my plan.");
    }

    #[test]
    fn insight_frame_appends_analysis_message() {
        let mut s = session();
        s.apply_frame(
            r#"{"type":"text","sender":"AnalysisAgent","content":"<insight>Spend is up 12%</insight>"}"#,
        );
        assert_eq!(message_count(&s), 1);
        let last = s.messages.last().unwrap();
        assert_eq!(last.sender, Role::Analysis);
        assert_eq!(last.content, "Spend is up 12%");
    }

    #[test]
    fn analysis_frame_without_tag_produces_nothing() {
        let mut s = session();
        s.apply_frame(r#"{"type":"text","sender":"AnalysisAgent","content":"just musing"}"#);
        assert_eq!(message_count(&s), 0);
    }

    #[test]
    fn code_frame_submits_sandbox_fragment_and_is_terminal() {
        let mut s = session();
        let effects = s.apply_frame(
            r#"{"type":"text","sender":"GraphGeneratorAgent","content":"<code>export default () => null;</code>"}"#,
        );
        assert_eq!(message_count(&s), 0);
        assert!(s.sandbox.loading);
        match &effects[..] {
            [SideEffect::RunSandbox { fragment }] => {
                assert_eq!(fragment.code, "export default () => null;");
                assert!(fragment.template.is_some());
            }
            other => panic!("expected sandbox effect, got {other:?}"),
        }
    }

    #[test]
    fn sentinel_clears_processing_and_touches_nothing_else() {
        let mut s = session();
        s.note_user_send("optimize my campaigns");
        s.apply_frame(
            r#"{"type":"text","sender":"OrchestratorAgent","content":"<thinking>plan</thinking>"}"#,
        );
        assert!(s.processing);
        let messages_before = s.messages.len();
        let stream_before = s.activity.as_ref().unwrap().stream.len();

        s.apply_frame(r#"{"type":"chat_interaction_done_sentinel"}"#);

        assert!(!s.processing);
        assert_eq!(s.messages.len(), messages_before);
        // Block survives the Idle transition, finished but visible.
        assert_eq!(s.activity.as_ref().unwrap().stream.len(), stream_before);
    }

    #[test]
    fn user_echo_is_dropped_for_any_outer_sender() {
        let echo = r#"{\"sender\":\"user\",\"type\":\"text\",\"content\":\"show spend\"}"#;
        for outer in ["agent", "OrchestratorAgent", "RelayAgent"] {
            let mut s = session();
            let frame =
                format!(r#"{{"type":"text","sender":"{outer}","content":"{echo}"}}"#);
            s.apply_frame(&frame);
            assert_eq!(message_count(&s), 0, "echo leaked for sender {outer}");
        }
    }

    #[test]
    fn wrapped_user_proxy_status_frame_never_reaches_the_log() {
        let mut s = session();
        s.apply_frame(
            r#"{"type":"text","sender":"agent","content":"{\"sender\":\"UserProxy\",\"status\":\"forwarding\"}"}"#,
        );
        assert_eq!(message_count(&s), 0);
    }

    #[test]
    fn tool_call_then_response_resolves_by_id() {
        let mut s = session();
        s.apply_frame(
            r#"{"type":"tool_call","content":{"content":"<thinking>query the graph</thinking>","tool_calls":[{"id":"c1","type":"function","function":{"name":"execute_cypher_query","arguments":"{\"query\":\"MATCH (n) RETURN n\"}"}}]}}"#,
        );
        assert!(s.processing);
        s.apply_frame(
            r#"{"type":"tool_response","content":{"tool_responses":[{"tool_call_id":"c1","role":"tool","content":"3 rows"}]}}"#,
        );

        let block = s.activity.as_ref().expect("activity block");
        assert_eq!(block.stream.len(), 2);
        match &block.stream[1] {
            StreamEntry::ToolCall(entry) => {
                assert_eq!(entry.id, "c1");
                assert_eq!(entry.status, StepStatus::Success);
                assert_eq!(entry.response.as_deref(), Some("3 rows"));
            }
            other => panic!("expected tool call entry, got {other:?}"),
        }
    }

    #[test]
    fn tool_response_for_unknown_id_is_observable_noop() {
        let mut s = session();
        s.apply_frame(
            r#"{"type":"tool_call","content":{"tool_calls":[{"id":"c1","type":"function","function":{"name":"fetch_stats","arguments":"{}"}}]}}"#,
        );
        let before = s.activity.as_ref().unwrap().clone();
        s.apply_frame(
            r#"{"type":"tool_response","content":{"tool_responses":[{"tool_call_id":"zzz","role":"tool","content":"late"}]}}"#,
        );
        let after = s.activity.as_ref().unwrap();
        assert_eq!(after.stream.len(), before.stream.len());
        assert_eq!(after.pending_count(), 1);
    }

    #[test]
    fn tool_response_without_block_is_ignored() {
        let mut s = session();
        s.apply_frame(
            r#"{"type":"tool_response","content":{"tool_responses":[{"tool_call_id":"c1","role":"tool","content":"late"}]}}"#,
        );
        assert!(s.activity.is_none());
        assert_eq!(message_count(&s), 0);
    }

    #[test]
    fn concurrent_tool_calls_share_one_block_in_arrival_order() {
        let mut s = session();
        s.apply_frame(
            r#"{"type":"tool_call","content":{"tool_calls":[{"id":"c1","type":"function","function":{"name":"a","arguments":"{}"}}]}}"#,
        );
        s.apply_frame(
            r#"{"type":"tool_call","content":{"tool_calls":[{"id":"c2","type":"function","function":{"name":"b","arguments":"{}"}}]}}"#,
        );
        let block = s.activity.as_ref().unwrap();
        let ids: Vec<&str> = block
            .stream
            .iter()
            .filter_map(|e| match e {
                StreamEntry::ToolCall(c) => Some(c.id.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(ids, ["c1", "c2"]);
    }

    #[test]
    fn query_completion_updates_its_record_and_reports_empty_results() {
        let mut s = session();
        s.queries
            .create_pending("q1".to_string(), "MATCH (n) RETURN n".to_string());

        s.handle_event(SessionEvent::QueryDone {
            id: "q1".to_string(),
            result: Ok(Vec::new()),
        });

        assert_eq!(s.queries.get("q1").unwrap().status, QueryStatus::Success);
        assert!(s
            .messages
            .last()
            .unwrap()
            .content
            .contains("returned no data"));

        s.queries
            .create_pending("q2".to_string(), "MATCH (m) RETURN m".to_string());
        s.handle_event(SessionEvent::QueryDone {
            id: "q2".to_string(),
            result: Ok(vec![json!({"m": 1})]),
        });
        // Non-empty success appends no chat message.
        assert_eq!(s.queries.get("q2").unwrap().status, QueryStatus::Success);
        assert!(!s.messages.last().unwrap().content.contains("q2"));
    }

    #[test]
    fn query_failure_marks_record_and_appends_diagnostic() {
        let mut s = session();
        s.queries
            .create_pending("q1".to_string(), "BAD".to_string());
        s.handle_event(SessionEvent::QueryDone {
            id: "q1".to_string(),
            result: Err("syntax error".to_string()),
        });
        assert_eq!(s.queries.get("q1").unwrap().status, QueryStatus::Error);
        let last = s.messages.last().unwrap();
        assert_eq!(last.sender, Role::SystemError);
        assert!(last.content.contains("syntax error"));
    }

    #[test]
    fn malformed_json_object_frame_surfaces_one_diagnostic() {
        let mut s = session();
        s.apply_frame("{\"type\": ");
        assert_eq!(message_count(&s), 1);
        assert_eq!(s.messages.last().unwrap().sender, Role::SystemError);

        // Bare non-object noise is logged but not surfaced.
        let mut s = session();
        s.apply_frame("ping");
        assert_eq!(message_count(&s), 0);
    }

    #[test]
    fn disconnect_surfaces_once_as_system_message() {
        let mut s = session();
        s.handle_event(SessionEvent::Disconnected {
            reason: "stream ended".to_string(),
        });
        assert_eq!(message_count(&s), 1);
        assert_eq!(s.messages.last().unwrap().sender, Role::SystemError);
    }

    #[test]
    fn default_sender_text_appends_plain_message() {
        let mut s = session();
        s.apply_frame(r#"{"type":"text","sender":"agent","content":"hello there"}"#);
        assert_eq!(message_count(&s), 1);
        assert_eq!(s.messages.last().unwrap().content, "hello there");
    }
}
