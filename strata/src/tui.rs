use std::{io, time::Duration};

use crossterm::{
    event::Event as CEvent,
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use strata_app::{App, Dependencies, Message, Runtime, UiMessage};
use thiserror::Error;
use tokio::{sync::mpsc, time::interval};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::draw::{DrawState, draw_ui};

#[derive(Error, Debug)]
pub enum TuiError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("terminal init failed")]
    TerminalInit,

    #[error("failed to enable raw mode")]
    EnableRawMode,
}

/// Own the terminal until the user quits or the root token is cancelled.
pub async fn run(
    mut app: App,
    deps: Dependencies,
    cancel: CancellationToken,
) -> Result<(), TuiError> {
    let mut terminal_session = TerminalSession::enter()?;
    let mut event_rx = spawn_crossterm_event_channel();
    let (tx, mut rx) = mpsc::channel(64);
    let runtime = Runtime::new(deps, tx);
    let mut tick = interval(Duration::from_millis(100));
    let mut draw_state = DrawState::default();

    let commands = app.start();
    runtime.run(&mut app, commands);

    loop {
        terminal_session
            .terminal
            .draw(|frame| draw_ui(frame, &app, &mut draw_state))?;

        let message = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("cancelled, leaving the ui");
                break;
            }

            Some(event) = event_rx.recv() => match event {
                CEvent::Key(key) => Message::Key(key),
                CEvent::Resize(..) => Message::Resize,
                _ => continue,
            },

            Some(message) = rx.recv() => message,

            message = app.next_stream_message() => message,

            _ = tick.tick() => Message::Ui(UiMessage::Tick),
        };

        let commands = app.update(message);
        runtime.run(&mut app, commands);

        if app.should_quit() {
            break;
        }
    }

    Ok(())
}

struct TerminalSession {
    terminal: Terminal<CrosstermBackend<io::Stdout>>,
}

impl TerminalSession {
    fn enter() -> Result<Self, TuiError> {
        enable_raw_mode().map_err(|_| TuiError::EnableRawMode)?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen).map_err(|_| TuiError::TerminalInit)?;

        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).map_err(|_| TuiError::TerminalInit)?;
        terminal.clear()?;

        Ok(Self { terminal })
    }
}

impl Drop for TerminalSession {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        let _ = self.terminal.show_cursor();
    }
}

fn spawn_crossterm_event_channel() -> mpsc::Receiver<CEvent> {
    let (tx, rx) = mpsc::channel(64);
    std::thread::spawn(move || {
        loop {
            let ready = crossterm::event::poll(Duration::from_millis(100)).unwrap_or(false);
            if !ready {
                if tx.is_closed() {
                    break;
                }
                continue;
            }
            if let Ok(event) = crossterm::event::read() {
                if tx.blocking_send(event).is_err() {
                    break;
                }
            }
        }
    });
    rx
}
