use super::classify::{RawToolCall, RawToolResponse};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

/// Lifecycle of a tool-call entry within the activity stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Pending,
    Success,
    Error,
}

/// One thinking trace extracted from a frame. Immutable once appended.
#[derive(Debug, Clone)]
pub struct ThinkingStep {
    pub id: String,
    pub text: String,
    pub timestamp: i64,
}

/// One backend tool invocation. The `id` is the backend-assigned call id
/// and is the join key for the matching tool response.
#[derive(Debug, Clone)]
pub struct ToolCallEntry {
    pub id: String,
    pub function_name: String,
    /// Opaque JSON argument string, only probed for a display summary.
    pub arguments: String,
    pub status: StepStatus,
    pub response: Option<String>,
    pub error_message: Option<String>,
    /// Creation time while pending, resolution time afterwards.
    pub timestamp: i64,
    pub display_text: String,
}

#[derive(Debug, Clone)]
pub enum StreamEntry {
    Thinking(ThinkingStep),
    ToolCall(ToolCallEntry),
}

/// The single live progress block: an ordered, append-only stream of
/// thinking steps and tool-call entries shown while the backend works.
#[derive(Debug, Clone)]
pub struct ActivityBlock {
    pub id: Uuid,
    pub stream: Vec<StreamEntry>,
    pub collapsed: bool,
    /// Timestamp of the most recent mutation; positions the block among
    /// chat messages in the merged display timeline.
    pub last_activity: i64,
}

impl ActivityBlock {
    pub fn new(now: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            stream: Vec::new(),
            collapsed: false,
            last_activity: now,
        }
    }

    pub fn push_thinking(&mut self, text: String, now: i64) {
        self.stream.push(StreamEntry::Thinking(ThinkingStep {
            id: format!("thinking-{}-{}", now, Uuid::new_v4().simple()),
            text,
            timestamp: now,
        }));
        self.last_activity = now;
    }

    pub fn push_tool_call(&mut self, call: &RawToolCall, now: i64) {
        self.stream.push(StreamEntry::ToolCall(ToolCallEntry {
            id: call.id.clone(),
            function_name: call.name.clone(),
            arguments: call.arguments.clone(),
            status: StepStatus::Pending,
            response: None,
            error_message: None,
            timestamp: now,
            display_text: derive_display_text(&call.name, &call.arguments),
        }));
        self.last_activity = now;
    }

    /// Resolve pending tool-call entries in place by call id. Unknown ids
    /// are ignored: a response may arrive after a block boundary, and that
    /// must never corrupt the stream. Order is preserved.
    pub fn resolve_tool_responses(&mut self, responses: &[RawToolResponse], now: i64) {
        for response in responses {
            let entry = self.stream.iter_mut().find_map(|item| match item {
                StreamEntry::ToolCall(entry) if entry.id == response.tool_call_id => Some(entry),
                _ => None,
            });
            let Some(entry) = entry else {
                warn!(
                    tool_call_id = %response.tool_call_id,
                    "tool_response for unknown call id, ignoring"
                );
                continue;
            };
            if response_is_error(&response.content) {
                entry.status = StepStatus::Error;
                entry.error_message = Some(response.content.clone());
                entry.response = None;
            } else {
                entry.status = StepStatus::Success;
                entry.response = Some(response.content.clone());
                entry.error_message = None;
            }
            entry.timestamp = now;
            self.last_activity = now;
        }
    }

    pub fn pending_count(&self) -> usize {
        self.stream
            .iter()
            .filter(|item| {
                matches!(item, StreamEntry::ToolCall(e) if e.status == StepStatus::Pending)
            })
            .count()
    }
}

/// The backend marks failed tool runs with an error prefix in the result
/// text; there is no dedicated wire field.
fn response_is_error(content: &str) -> bool {
    let trimmed = content.trim_start();
    trimmed.starts_with("Error:") || trimmed.starts_with("error:")
}

/// Derive the one-line display string for a tool call from its function
/// name plus a best-effort argument summary. Arguments that do not decode
/// fall back to the bare function name.
fn derive_display_text(name: &str, arguments: &str) -> String {
    let Ok(args) = serde_json::from_str::<Value>(arguments) else {
        return name.to_string();
    };
    if let Some(platform) = args.get("platform_name").and_then(|v| v.as_str()) {
        return format!("{name} for {platform}");
    }
    if let Some(query) = args.get("query").and_then(|v| v.as_str()) {
        return format!("{name}: {}", truncate(query, 30));
    }
    if let Some(desc) = args.get("description").and_then(|v| v.as_str()) {
        return format!("{name}: {}", truncate(desc, 30));
    }
    name.to_string()
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_chars).collect();
        format!("{head}...")
    }
}
