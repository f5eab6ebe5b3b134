//! Local terminal runs (`typioca` and `typioca timer-run`).
//!
//! The program runs through the same session driver as remote sessions,
//! with crossterm events as input and stdout as the sink.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use crossterm::event::{self, Event, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{self, disable_raw_mode, enable_raw_mode, LeaveAlternateScreen, SetTitle};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::core::context::RenderingContext;
use crate::core::session::{drive, Sink};
use crate::program::{self, Start};
use crate::ui::Input;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Restores the terminal on drop, including when unwinding from a panic
pub struct TerminalGuard;

impl TerminalGuard {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TerminalGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen, crossterm::cursor::Show);
    }
}

struct StdoutSink;

#[async_trait]
impl Sink for StdoutSink {
    async fn write(&mut self, bytes: Vec<u8>) -> io::Result<()> {
        let mut out = io::stdout().lock();
        out.write_all(&bytes)?;
        out.flush()
    }
}

/// Run the program on the local terminal.
///
/// Returns the wpm of the last finished test, if any.
pub async fn run(start: Start) -> io::Result<Option<f64>> {
    let (width, height) = terminal::size()?;
    let context = RenderingContext::local(width, height);
    info!(width, height, profile = ?context.profile, ?start, "Starting local session");
    let (mut program, options) = program::build_with(context, start);

    enable_raw_mode()?;
    let _guard = TerminalGuard::new();
    execute!(io::stdout(), SetTitle("typioca"))?;

    let (tx, mut events) = mpsc::channel(64);
    let stop = Arc::new(AtomicBool::new(false));
    let reader = {
        let stop = stop.clone();
        tokio::task::spawn_blocking(move || read_events(tx, &stop))
    };

    let result = drive(
        &mut program,
        options,
        &mut events,
        &mut StdoutSink,
        &CancellationToken::new(),
    )
    .await;

    stop.store(true, Ordering::Relaxed);
    drop(events);
    if let Err(err) = reader.await {
        warn!(error = %err, "Input reader failed");
    }

    let exit = result?;
    info!(?exit, "Local session ended");
    Ok(program.last_wpm())
}

/// Forward terminal events until stopped or the session stops listening
fn read_events(tx: mpsc::Sender<Input>, stop: &AtomicBool) {
    while !stop.load(Ordering::Relaxed) {
        match event::poll(POLL_INTERVAL) {
            Ok(true) => {}
            Ok(false) => continue,
            Err(err) => {
                warn!(error = %err, "Failed to poll terminal events");
                break;
            }
        }
        let event = match event::read() {
            Ok(event) => event,
            Err(err) => {
                warn!(error = %err, "Failed to read terminal event");
                break;
            }
        };
        if let Some(input) = translate(event) {
            if tx.blocking_send(input).is_err() {
                break;
            }
        }
    }
}

fn translate(event: Event) -> Option<Input> {
    match event {
        Event::Key(key) if key.kind != KeyEventKind::Release => Some(Input::Key(key)),
        Event::Resize(width, height) => Some(Input::Resize { width, height }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyCode, KeyEvent, KeyEventState, KeyModifiers};

    #[test]
    fn test_translate_events() {
        let key = KeyEvent::new(KeyCode::Char('a'), KeyModifiers::NONE);
        assert_eq!(translate(Event::Key(key)), Some(Input::Key(key)));
        assert_eq!(
            translate(Event::Resize(120, 40)),
            Some(Input::Resize { width: 120, height: 40 })
        );

        let release = KeyEvent {
            code: KeyCode::Char('a'),
            modifiers: KeyModifiers::NONE,
            kind: KeyEventKind::Release,
            state: KeyEventState::NONE,
        };
        assert_eq!(translate(Event::Key(release)), None);
        assert_eq!(translate(Event::FocusGained), None);
    }

    #[test]
    fn test_reader_stops_when_flagged() {
        let (tx, _rx) = mpsc::channel(1);
        let stop = AtomicBool::new(true);
        read_events(tx, &stop);
    }
}
