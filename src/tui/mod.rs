pub mod app;
pub mod render;

use crate::config::Config;
use crate::queries::QueryBackend;
use crate::sandbox::SandboxBackend;
use crate::session::SessionEvent;
use crate::transport::Transport;
use anyhow::Result;
use crossterm::event::{Event, EventStream};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use futures_util::StreamExt;
use ratatui::backend::CrosstermBackend;
use ratatui::{Terminal, TerminalOptions, Viewport};
use std::io::{self, Stdout};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub async fn run_tui(config: Config) -> Result<()> {
    let (events_tx, events_rx) = mpsc::unbounded_channel::<SessionEvent>();
    let transport = Transport::connect(&config.transport.url, events_tx.clone()).await?;
    let query_backend = Arc::new(QueryBackend::new(config.backends.query_url.clone()));
    let sandbox_backend = Arc::new(SandboxBackend::new(config.backends.sandbox_url.clone()));

    let mut terminal = setup_terminal()?;
    let mut app = app::App::new(transport, events_tx, events_rx, query_backend, sandbox_backend);

    let tick_rate = Duration::from_millis(50);
    let mut event_stream = EventStream::new();

    loop {
        // Drain pending session events before rendering.
        while let Ok(event) = app.events_rx.try_recv() {
            app.handle_event(event);
        }

        terminal.draw(|f| render::render(f, &mut app))?;

        tokio::select! {
            maybe_event = event_stream.next() => {
                if let Some(Ok(Event::Key(key))) = maybe_event {
                    if app.handle_key(key)? {
                        break;
                    }
                }
            }
            Some(event) = app.events_rx.recv() => {
                app.handle_event(event);
            }
            _ = tokio::time::sleep(tick_rate) => {}
        }
    }

    restore_terminal(terminal)
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode()?;
    let stdout = io::stdout();
    let backend = CrosstermBackend::new(stdout);
    let (_, rows) = crossterm::terminal::size()?;
    let terminal = Terminal::with_options(
        backend,
        TerminalOptions {
            viewport: Viewport::Inline(rows),
        },
    )?;
    Ok(terminal)
}

fn restore_terminal(mut terminal: Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    terminal.show_cursor()?;
    Ok(())
}
