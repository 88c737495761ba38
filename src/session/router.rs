use super::classify::Role;
use super::{tags, ChatSession, SideEffect};
use crate::sandbox::GraphFragment;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

/// Sender-keyed dispatch of surviving text frames.
///
/// Tag-delimited senders (query/analysis/code generation) produce no
/// visible output when their expected tag is absent — the frame is
/// incomplete, not chat text. Everyone else falls through to a plain
/// chat message. Only the first match of a tag is honored per frame;
/// a frame never triggers two routes.
impl ChatSession {
    pub(super) fn route_text(&mut self, sender: Role, content: String) -> Vec<SideEffect> {
        let mut effects = Vec::new();
        match sender {
            Role::Orchestrator => self.route_thinking(&content),
            Role::QueryGenerator => self.route_queries(&content, &mut effects),
            Role::Analysis => self.route_insight(&content),
            Role::GraphGenerator => self.route_code(&content, &mut effects),
            other => {
                if !content.trim().is_empty() {
                    self.push_message(other, content);
                }
            }
        }
        effects
    }

    /// Orchestrator frames only matter for their `<thinking>` trace; a
    /// frame without one is backend chatter and is dropped whole.
    fn route_thinking(&mut self, content: &str) {
        if !content.contains("<thinking>") {
            debug!("orchestrator frame without thinking tag, dropping");
            return;
        }
        match tags::extract(content, "thinking") {
            Some(thinking) => {
                let now = Self::now();
                self.ensure_activity(now).push_thinking(thinking, now);
                let remainder = tags::strip_all(content, "thinking");
                if !remainder.is_empty() {
                    self.push_message(Role::Orchestrator, remainder);
                }
            }
            // Tag opened but never closed: treat the whole text as chat.
            None => self.push_message(Role::Orchestrator, content.to_string()),
        }
    }

    /// `<query>` carries a JSON object with an ordered `queries` list.
    /// Each non-empty query becomes an independent pending execution; the
    /// first submitted id becomes the active results tab.
    fn route_queries(&mut self, content: &str, effects: &mut Vec<SideEffect>) {
        let Some(inner) = tags::extract(content, "query") else {
            debug!("query generator frame without query tag");
            return;
        };
        let parsed: Value = match serde_json::from_str(&inner) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "failed to parse query payload");
                self.push_message(
                    Role::SystemError,
                    format!("Error parsing queries from QueryGeneratorAgent: {e}"),
                );
                return;
            }
        };
        let Some(queries) = parsed.get("queries").and_then(|v| v.as_array()) else {
            warn!("query payload missing queries list");
            self.push_message(
                Role::SystemError,
                "Error parsing queries from QueryGeneratorAgent: missing queries list".to_string(),
            );
            return;
        };

        let mut first_id: Option<String> = None;
        for query in queries {
            let Some(text) = query.as_str().map(str::trim).filter(|s| !s.is_empty()) else {
                warn!("skipping empty or non-string query entry");
                continue;
            };
            let id = Uuid::new_v4().to_string();
            if first_id.is_none() {
                first_id = Some(id.clone());
            }
            self.queries.create_pending(id.clone(), text.to_string());
            effects.push(SideEffect::RunQuery {
                id,
                query: text.to_string(),
            });
        }
        if let Some(id) = first_id {
            self.queries.active_id = Some(id);
            self.queries.panel_visible = true;
            self.queries.panel_collapsed = false;
        }
    }

    fn route_insight(&mut self, content: &str) {
        match tags::extract(content, "insight") {
            Some(insight) => self.push_message(Role::Analysis, insight),
            None => debug!("analysis frame without insight tag"),
        }
    }

    /// `<code>` frames are terminal: the extracted fragment goes to the
    /// sandbox and no chat message is appended for the frame.
    fn route_code(&mut self, content: &str, effects: &mut Vec<SideEffect>) {
        match tags::extract(content, "code") {
            Some(code) => {
                let fragment = GraphFragment::for_code(code);
                self.sandbox.begin(fragment.clone());
                effects.push(SideEffect::RunSandbox { fragment });
            }
            None => debug!("graph generator frame without code tag"),
        }
    }
}
