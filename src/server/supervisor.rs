//! Per-channel session supervision
//!
//! A supervisor owns one program for one SSH channel. It runs the shared
//! session driver, contains panics and I/O failures to that channel, and
//! always releases the channel: exit status, EOF, close.

use std::any::Any;
use std::io;
use std::panic::AssertUnwindSafe;
use std::time::Instant;

use async_trait::async_trait;
use futures::FutureExt;
use russh::server::Handle;
use russh::{ChannelId, CryptoVec};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::SessionError;
use crate::core::session::{drive, Exit, Sink};
use crate::program::{Program, RunOptions};
use crate::ui::Input;

/// Output side of a session that can be released
#[async_trait]
pub trait ChannelOutput: Sink {
    /// Report the exit status and close the channel
    async fn close(&mut self, exit_status: u32);
}

/// Run `program` on its channel until it completes, then release the channel.
///
/// Returns how the session ended. Errors are logged here; they never reach
/// other sessions.
pub async fn supervise<O: ChannelOutput>(
    mut program: Program,
    options: RunOptions,
    mut events: mpsc::Receiver<Input>,
    mut output: O,
    force: CancellationToken,
) -> Result<Exit, SessionError> {
    debug!("Session started");
    let started = Instant::now();
    let run = AssertUnwindSafe(drive(&mut program, options, &mut events, &mut output, &force))
        .catch_unwind()
        .await;

    let result = match run {
        Ok(Ok(exit)) => Ok(exit),
        Ok(Err(err)) => Err(SessionError::Io(err)),
        Err(panic) => Err(SessionError::Panicked(panic_message(&*panic))),
    };

    let duration = started.elapsed();
    let status = match &result {
        Ok(Exit::Quit) => {
            info!(?duration, "Session finished");
            0
        }
        Ok(Exit::Disconnected) => {
            info!(?duration, "Client disconnected");
            0
        }
        Ok(Exit::Cancelled) => {
            info!(?duration, "Session terminated by shutdown");
            0
        }
        Err(err) => {
            error!(?duration, error = %err, "Session failed");
            1
        }
    };

    output.close(status).await;
    result
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// SSH channel output.
///
/// Closing is guaranteed: if the supervisor is dropped before it released
/// the channel, the guard closes it.
pub struct ChannelSink {
    handle: Handle,
    channel: ChannelId,
    closed: bool,
}

impl ChannelSink {
    pub fn new(handle: Handle, channel: ChannelId) -> Self {
        Self {
            handle,
            channel,
            closed: false,
        }
    }
}

#[async_trait]
impl Sink for ChannelSink {
    async fn write(&mut self, bytes: Vec<u8>) -> io::Result<()> {
        self.handle
            .data(self.channel, CryptoVec::from(bytes))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "channel closed"))
    }
}

#[async_trait]
impl ChannelOutput for ChannelSink {
    async fn close(&mut self, exit_status: u32) {
        self.closed = true;
        // The client may already be gone
        let _ = self.handle.exit_status_request(self.channel, exit_status).await;
        let _ = self.handle.eof(self.channel).await;
        let _ = self.handle.close(self.channel).await;
    }
}

impl Drop for ChannelSink {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let handle = self.handle.clone();
            let channel = self.channel;
            runtime.spawn(async move {
                let _ = handle.close(channel).await;
            });
        }
    }
}
