use crate::queries::QueryBackend;
use crate::sandbox::SandboxBackend;
use crate::session::{ChatSession, SessionEvent, SideEffect};
use crate::transport::Transport;
use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

// Compact box-drawing logo (Calvin S figlet style)
const LOGO_1: &str = "┏━┓╺┳┓┏━┓┏━╸┏━┓┏━┓┏━╸";
const LOGO_2: &str = "┣━┫ ┃┃┗━┓┃  ┃ ┃┣━┛┣╸ ";
const LOGO_3: &str = "╹ ╹╺┻┛┗━┛┗━╸┗━┛╹  ┗━╸";

pub struct App {
    pub session: ChatSession,
    pub events_rx: mpsc::UnboundedReceiver<SessionEvent>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    transport: Transport,
    query_backend: Arc<QueryBackend>,
    sandbox_backend: Arc<SandboxBackend>,
    pub input: String,
    pub scroll_offset: usize,
    pub connected: bool,
}

impl App {
    pub fn new(
        transport: Transport,
        events_tx: mpsc::UnboundedSender<SessionEvent>,
        events_rx: mpsc::UnboundedReceiver<SessionEvent>,
        query_backend: Arc<QueryBackend>,
        sandbox_backend: Arc<SandboxBackend>,
    ) -> Self {
        Self {
            session: ChatSession::new(),
            events_rx,
            events_tx,
            transport,
            query_backend,
            sandbox_backend,
            input: String::new(),
            scroll_offset: 0,
            connected: true,
        }
    }

    pub fn logo_lines() -> [&'static str; 3] {
        [LOGO_1, LOGO_2, LOGO_3]
    }

    /// Feed one event through the session reducer and spawn any backend
    /// work it asks for.
    pub fn handle_event(&mut self, event: SessionEvent) {
        if let SessionEvent::Disconnected { ref reason } = event {
            info!("connection closed: {}", reason);
            self.connected = false;
        }
        let effects = self.session.handle_event(event);
        self.dispatch_effects(effects);
    }

    fn dispatch_effects(&mut self, effects: Vec<SideEffect>) {
        for effect in effects {
            match effect {
                SideEffect::RunQuery { id, query } => {
                    let backend = Arc::clone(&self.query_backend);
                    let tx = self.events_tx.clone();
                    tokio::spawn(async move {
                        let result = backend.run(&query).await.map_err(|e| e.to_string());
                        let _ = tx.send(SessionEvent::QueryDone { id, result });
                    });
                }
                SideEffect::RunSandbox { fragment } => {
                    let backend = Arc::clone(&self.sandbox_backend);
                    let tx = self.events_tx.clone();
                    tokio::spawn(async move {
                        let result = backend.run(&fragment).await.map_err(|e| e.to_string());
                        let _ = tx.send(SessionEvent::SandboxDone { result });
                    });
                }
            }
        }
    }

    /// Returns Ok(true) when the app should exit.
    pub fn handle_key(&mut self, key: KeyEvent) -> Result<bool> {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return Ok(true);
        }

        match key.code {
            KeyCode::Up => {
                self.scroll_offset = self.scroll_offset.saturating_add(1);
            }
            KeyCode::Down => {
                self.scroll_offset = self.scroll_offset.saturating_sub(1);
            }
            KeyCode::PageUp => {
                self.scroll_offset = self.scroll_offset.saturating_add(10);
            }
            KeyCode::PageDown => {
                self.scroll_offset = self.scroll_offset.saturating_sub(10);
            }
            KeyCode::Char(c) => {
                self.input.push(c);
            }
            KeyCode::Backspace => {
                self.input.pop();
            }
            KeyCode::Enter => {
                let text = std::mem::take(&mut self.input);
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    return Ok(false);
                }
                if let Some(cmd) = trimmed.strip_prefix('/') {
                    return Ok(self.handle_command(cmd));
                }
                self.send_message(trimmed);
                self.scroll_offset = 0;
            }
            _ => {}
        }
        Ok(false)
    }

    /// Slash commands. Returns true to exit.
    fn handle_command(&mut self, cmd: &str) -> bool {
        match cmd {
            "quit" | "exit" => true,
            "clear-queries" => {
                self.session.queries.clear();
                false
            }
            "clear-sandbox" => {
                self.session.sandbox.clear();
                false
            }
            "collapse" => {
                self.session.toggle_activity_collapse();
                false
            }
            "collapse-queries" => {
                let tracker = &mut self.session.queries;
                tracker.panel_collapsed = !tracker.panel_collapsed;
                false
            }
            "collapse-sandbox" => {
                let tracker = &mut self.session.sandbox;
                tracker.panel_collapsed = !tracker.panel_collapsed;
                false
            }
            other => {
                self.session
                    .push_system_error(format!("Unknown command: /{}", other));
                false
            }
        }
    }

    fn send_message(&mut self, text: &str) {
        let timestamp = ChatSession::now();
        if self.transport.send_user_message(text, timestamp) {
            self.session.note_user_send(text);
        } else {
            self.connected = false;
            self.session
                .push_system_error("Not connected. Cannot send message.".to_string());
        }
    }
}
