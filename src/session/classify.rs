use serde_json::Value;
use std::fmt;

/// Logical origin of a message. The backend identifies agents by name
/// strings on the wire; unknown names are kept verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    User,
    Agent,
    Orchestrator,
    QueryGenerator,
    Analysis,
    GraphGenerator,
    /// Internal relay role used by the backend to forward frames. Never
    /// shown in the UI.
    UserProxy,
    SystemError,
    Other(String),
}

impl Role {
    pub fn parse(s: &str) -> Role {
        match s {
            "user" => Role::User,
            "agent" => Role::Agent,
            "OrchestratorAgent" => Role::Orchestrator,
            "QueryGeneratorAgent" => Role::QueryGenerator,
            "AnalysisAgent" => Role::Analysis,
            "GraphGeneratorAgent" => Role::GraphGenerator,
            "UserProxy" => Role::UserProxy,
            "system_error" => Role::SystemError,
            other => Role::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Role::User => "user",
            Role::Agent => "agent",
            Role::Orchestrator => "OrchestratorAgent",
            Role::QueryGenerator => "QueryGeneratorAgent",
            Role::Analysis => "AnalysisAgent",
            Role::GraphGenerator => "GraphGeneratorAgent",
            Role::UserProxy => "UserProxy",
            Role::SystemError => "system_error",
            Role::Other(name) => name,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One backend-announced tool invocation, as carried in a `tool_call` frame.
#[derive(Debug, Clone)]
pub struct RawToolCall {
    pub id: String,
    pub name: String,
    /// JSON-encoded argument string, kept opaque.
    pub arguments: String,
}

/// One tool result, keyed by the backend-assigned call id.
#[derive(Debug, Clone)]
pub struct RawToolResponse {
    pub tool_call_id: String,
    pub content: String,
}

/// A normalized inbound frame. Classification is total: any input shape
/// maps to exactly one variant, never a panic or error.
#[derive(Debug, Clone)]
pub enum ClassifiedFrame {
    /// Interaction-complete marker. Carries no payload.
    Sentinel,
    /// Tool invocations, optionally bundled with a `<thinking>` trace in
    /// the payload's own content field.
    ToolCall {
        content: Option<String>,
        calls: Vec<RawToolCall>,
    },
    ToolResponse {
        responses: Vec<RawToolResponse>,
    },
    /// A chat-style message with its best-effort sender and unwrapped
    /// content string.
    Text { sender: Role, content: String },
    /// Anything that could not be decoded. The raw text is kept for
    /// diagnostic surfacing.
    Malformed { raw: String },
}

/// Classify one raw frame from the transport.
///
/// The wire has accumulated several envelope shapes over time; content may
/// be a literal object, a string, a JSON-encoded string-in-string, or live
/// under the legacy `message` field. Matchers are tried in that order, and
/// a content-level sender always overrides the frame-level one.
pub fn classify(raw: &str) -> ClassifiedFrame {
    let parsed: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(_) => {
            return ClassifiedFrame::Malformed {
                raw: raw.to_string(),
            }
        }
    };
    if !parsed.is_object() {
        return ClassifiedFrame::Malformed {
            raw: raw.to_string(),
        };
    }

    let frame_type = parsed.get("type").and_then(|v| v.as_str());
    match frame_type {
        Some("chat_interaction_done_sentinel") => ClassifiedFrame::Sentinel,
        Some("tool_call") => classify_tool_call(&parsed, raw),
        Some("tool_response") => classify_tool_response(&parsed, raw),
        _ => classify_text(&parsed, raw),
    }
}

fn classify_tool_call(frame: &Value, raw: &str) -> ClassifiedFrame {
    let Some(payload) = frame.get("content").filter(|v| v.is_object()) else {
        return ClassifiedFrame::Malformed {
            raw: raw.to_string(),
        };
    };
    let content = payload
        .get("content")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());
    let calls = payload
        .get("tool_calls")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|tc| {
                    let id = tc.get("id")?.as_str()?.to_string();
                    let func = tc.get("function")?;
                    let name = func.get("name")?.as_str()?.to_string();
                    let arguments = func
                        .get("arguments")
                        .and_then(|v| v.as_str())
                        .unwrap_or("")
                        .to_string();
                    Some(RawToolCall {
                        id,
                        name,
                        arguments,
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    ClassifiedFrame::ToolCall { content, calls }
}

fn classify_tool_response(frame: &Value, raw: &str) -> ClassifiedFrame {
    let Some(payload) = frame.get("content").filter(|v| v.is_object()) else {
        return ClassifiedFrame::Malformed {
            raw: raw.to_string(),
        };
    };
    let responses = payload
        .get("tool_responses")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|tr| {
                    let tool_call_id = tr.get("tool_call_id")?.as_str()?.to_string();
                    let content = tr
                        .get("content")
                        .and_then(|v| v.as_str())
                        .unwrap_or("")
                        .to_string();
                    Some(RawToolResponse {
                        tool_call_id,
                        content,
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    ClassifiedFrame::ToolResponse { responses }
}

fn classify_text(frame: &Value, raw: &str) -> ClassifiedFrame {
    let frame_sender = frame.get("sender").and_then(|v| v.as_str());
    let mut sender = frame_sender.map(Role::parse).unwrap_or(Role::Agent);

    let content: Option<String> = match frame.get("content") {
        // Shape 1: content is itself an object carrying content + sender.
        Some(Value::Object(inner)) => {
            if let Some(s) = inner.get("sender").and_then(|v| v.as_str()) {
                sender = Role::parse(s);
            }
            inner
                .get("content")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string())
        }
        // Shape 2: content is a string. It may be a JSON-encoded envelope
        // that needs unwrapping one level, or plain text. A complete user
        // text frame is left wrapped: that is the relay echoing our own
        // outbound frame, and the noise filter must still see it as such.
        Some(Value::String(s)) => match serde_json::from_str::<Value>(s) {
            Ok(inner)
                if inner.get("content").and_then(|v| v.as_str()).is_some()
                    && !is_user_text_envelope(&inner) =>
            {
                if let Some(inner_sender) = inner.get("sender").and_then(|v| v.as_str()) {
                    sender = Role::parse(inner_sender);
                }
                inner
                    .get("content")
                    .and_then(|v| v.as_str())
                    .map(|c| c.to_string())
            }
            _ => Some(s.clone()),
        },
        // Shape 3: legacy frames used a `message` field instead.
        _ => frame
            .get("message")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()),
    };

    match content {
        Some(content) => ClassifiedFrame::Text { sender, content },
        None => ClassifiedFrame::Malformed {
            raw: raw.to_string(),
        },
    }
}

/// True when `value` is itself a complete `{sender:"user", type:"text"}`
/// envelope with string content.
pub(super) fn is_user_text_envelope(value: &Value) -> bool {
    value.get("sender").and_then(|v| v.as_str()) == Some("user")
        && value.get("type").and_then(|v| v.as_str()) == Some("text")
        && value
            .get("content")
            .map(|v| v.is_string())
            .unwrap_or(false)
}
