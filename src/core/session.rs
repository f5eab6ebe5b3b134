//! Session driver
//!
//! Runs a program against an input queue and an output sink until it quits,
//! the input side goes away, or the session is cancelled. Local and remote
//! sessions share this loop; they only differ in the `Sink` they plug in.

use std::io::{self, Write};
use std::mem;
use std::time::Duration;

use async_trait::async_trait;
use crossterm::cursor::{Hide, Show};
use crossterm::execute;
use crossterm::terminal::{EnterAlternateScreen, LeaveAlternateScreen};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::Rect;
use ratatui::{Terminal, TerminalOptions, Viewport};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::program::{Msg, Program, RunOptions};
use crate::ui::Input;

/// Interval between clock ticks delivered to the program
pub const TICK_RATE: Duration = Duration::from_millis(100);

/// Why a session's event loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// The program quit on its own
    Quit,
    /// The input side was closed by the client
    Disconnected,
    /// The session was cancelled from outside
    Cancelled,
}

/// Destination of rendered terminal output
#[async_trait]
pub trait Sink: Send {
    async fn write(&mut self, bytes: Vec<u8>) -> io::Result<()>;
}

/// `Write` adapter handed to the ratatui backend.
///
/// Buffers until flush, then queues the frame for the sink.
pub struct TerminalWriter {
    tx: UnboundedSender<Vec<u8>>,
    sink: Vec<u8>,
}

impl TerminalWriter {
    pub fn new(tx: UnboundedSender<Vec<u8>>) -> Self {
        Self { tx, sink: Vec::new() }
    }
}

impl Write for TerminalWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.sink.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.sink.is_empty() {
            return Ok(());
        }
        self.tx
            .send(mem::take(&mut self.sink))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "output closed"))
    }
}

/// Drive `program` until it exits.
///
/// On `Quit` and `Cancelled` the terminal is restored (cursor shown,
/// alternate screen left) before returning. A disconnected client gets
/// nothing more.
pub async fn drive<S: Sink + ?Sized>(
    program: &mut Program,
    options: RunOptions,
    events: &mut mpsc::Receiver<Input>,
    sink: &mut S,
    cancel: &CancellationToken,
) -> io::Result<Exit> {
    let ctx = *program.context();
    let (tx, mut output) = mpsc::unbounded_channel();
    let mut control = TerminalWriter::new(tx.clone());

    if options.alt_screen {
        execute!(control, EnterAlternateScreen)?;
    }
    execute!(control, Hide)?;
    let mut terminal = open_terminal(&tx, ctx.width, ctx.height)?;

    let mut ticker = time::interval(TICK_RATE);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let exit = loop {
        let now = time::Instant::now().into_std();
        terminal.draw(|frame| program.render(frame, now))?;
        forward(&mut output, sink).await?;

        if program.is_finished() {
            break Exit::Quit;
        }

        tokio::select! {
            _ = cancel.cancelled() => break Exit::Cancelled,
            input = events.recv() => match input {
                None => break Exit::Disconnected,
                Some(Input::Key(key)) => {
                    program.update(Msg::Key(key), time::Instant::now().into_std());
                }
                Some(Input::Resize { width, height }) => {
                    // A fixed viewport never resizes itself
                    terminal = open_terminal(&tx, width, height)?;
                }
            },
            _ = ticker.tick() => {
                program.update(Msg::Tick, time::Instant::now().into_std());
            }
        }
    };

    if exit != Exit::Disconnected {
        execute!(control, Show)?;
        if options.alt_screen {
            execute!(control, LeaveAlternateScreen)?;
        }
        forward(&mut output, sink).await?;
    }

    Ok(exit)
}

type SessionTerminal = Terminal<CrosstermBackend<TerminalWriter>>;

/// Terminal pinned to the client's size, cleared and ready to draw
fn open_terminal(
    tx: &UnboundedSender<Vec<u8>>,
    width: u16,
    height: u16,
) -> io::Result<SessionTerminal> {
    let backend = CrosstermBackend::new(TerminalWriter::new(tx.clone()));
    let mut terminal = Terminal::with_options(
        backend,
        TerminalOptions {
            viewport: Viewport::Fixed(Rect::new(0, 0, width, height)),
        },
    )?;
    terminal.clear()?;
    Ok(terminal)
}

/// Send every queued frame to the sink
async fn forward<S: Sink + ?Sized>(
    output: &mut UnboundedReceiver<Vec<u8>>,
    sink: &mut S,
) -> io::Result<()> {
    while let Ok(chunk) = output.try_recv() {
        sink.write(chunk).await?;
    }
    Ok(())
}
