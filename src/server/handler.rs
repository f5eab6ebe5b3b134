//! Per-connection SSH handler
//!
//! Tracks the pty state of each channel, admits channels that asked for a
//! shell (or exec) with a pty, and spawns one supervised program per
//! admitted channel. Channels without a pty are refused with `not a tty`.

use std::collections::HashMap;
use std::net::SocketAddr;

use async_trait::async_trait;
use russh::server::{Auth, Handler, Msg, Session};
use russh::{Channel, ChannelId, CryptoVec, Pty};
use russh_keys::key::PublicKey;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, info_span, warn, Instrument};

use super::shutdown::{Phase, Shutdown};
use super::supervisor::{supervise, ChannelSink};
use super::SessionError;
use crate::core::context::RenderingContext;
use crate::program;
use crate::ui::{Input, InputDecoder};

/// Pending input events per session
const INPUT_QUEUE: usize = 1024;

/// Terminal size reported by a pty request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PtySize {
    pub width: u16,
    pub height: u16,
}

impl PtySize {
    fn from_request(cols: u32, rows: u32) -> Self {
        Self {
            width: cols.min(u32::from(u16::MAX)) as u16,
            height: rows.min(u32::from(u16::MAX)) as u16,
        }
    }
}

/// Decide whether a channel gets a session.
///
/// Only channels with an active pty are admitted; their rendering context is
/// pinned to the remote profile at the reported size.
pub fn admit(pty: Option<PtySize>) -> Result<RenderingContext, SessionError> {
    let pty = pty.ok_or(SessionError::NotATty)?;
    Ok(RenderingContext::remote(pty.width, pty.height))
}

/// New sessions are only started while the server is running
pub fn accepting(phase: Phase) -> Result<(), SessionError> {
    match phase {
        Phase::Running => Ok(()),
        Phase::Draining | Phase::Stopped => Err(SessionError::ShuttingDown),
    }
}

#[derive(Default)]
struct ChannelState {
    pty: Option<PtySize>,
    term: String,
    decoder: InputDecoder,
    input: Option<mpsc::Sender<Input>>,
}

/// Handler for one SSH connection
pub struct ConnectionHandler {
    peer: Option<SocketAddr>,
    user: Option<String>,
    shutdown: Shutdown,
    sessions: TaskTracker,
    channels: HashMap<ChannelId, ChannelState>,
}

impl ConnectionHandler {
    pub fn new(peer: Option<SocketAddr>, shutdown: Shutdown) -> Self {
        Self {
            peer,
            user: None,
            shutdown,
            sessions: TaskTracker::new(),
            channels: HashMap::new(),
        }
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Tracker of the sessions started on this connection
    pub fn sessions(&self) -> TaskTracker {
        self.sessions.clone()
    }

    fn authenticated(&mut self, user: &str) -> Auth {
        debug!(peer = ?self.peer, user, "Authenticated");
        self.user = Some(user.to_string());
        Auth::Accept
    }

    fn start_session(&mut self, channel: ChannelId, session: &mut Session) {
        let peer = self.peer;
        let Some(state) = self.channels.get_mut(&channel) else {
            return;
        };
        if state.input.is_some() {
            debug!(?peer, ?channel, "Session already running");
            return;
        }

        let user = self.user.as_deref().unwrap_or_default();
        let admitted = accepting(self.shutdown.phase()).and_then(|()| admit(state.pty));
        let context = match admitted {
            Ok(context) => context,
            Err(err) => {
                warn!(?peer, user, ?channel, error = %err, "Refusing session");
                let message = format!("{}\n", err);
                session.extended_data(channel, 1, CryptoVec::from_slice(message.as_bytes()));
                session.exit_status_request(channel, 1);
                session.eof(channel);
                session.close(channel);
                return;
            }
        };

        info!(
            ?peer,
            user,
            term = %state.term,
            size = %format!("{}x{}", context.width, context.height),
            "Session connected"
        );
        let (program, options) = program::build(context);
        let (tx, rx) = mpsc::channel(INPUT_QUEUE);
        state.input = Some(tx);

        let output = ChannelSink::new(session.handle(), channel);
        let force = self.shutdown.force_token();
        let span = info_span!("session", ?peer, user, ?channel);
        let supervised = supervise(program, options, rx, output, force).instrument(span);
        self.shutdown
            .tracker()
            .spawn(self.sessions.track_future(supervised));
    }

    fn send_input(&mut self, channel: ChannelId, input: Input) {
        let Some(tx) = self.channels.get(&channel).and_then(|s| s.input.as_ref()) else {
            return;
        };
        match tx.try_send(input) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                debug!(peer = ?self.peer, ?channel, "Input queue full, dropping event");
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }
}

#[async_trait]
impl Handler for ConnectionHandler {
    type Error = russh::Error;

    async fn auth_none(&mut self, user: &str) -> Result<Auth, Self::Error> {
        Ok(self.authenticated(user))
    }

    async fn auth_publickey(
        &mut self,
        user: &str,
        _public_key: &PublicKey,
    ) -> Result<Auth, Self::Error> {
        Ok(self.authenticated(user))
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        self.channels.insert(channel.id(), ChannelState::default());
        Ok(true)
    }

    #[allow(clippy::too_many_arguments)]
    async fn pty_request(
        &mut self,
        channel: ChannelId,
        term: &str,
        col_width: u32,
        row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        _modes: &[(Pty, u32)],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        if let Some(state) = self.channels.get_mut(&channel) {
            debug!(peer = ?self.peer, ?channel, term, col_width, row_height, "Pty requested");
            state.pty = Some(PtySize::from_request(col_width, row_height));
            state.term = term.to_string();
        }
        session.channel_success(channel);
        Ok(())
    }

    async fn shell_request(
        &mut self,
        channel: ChannelId,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        session.channel_success(channel);
        self.start_session(channel, session);
        Ok(())
    }

    async fn exec_request(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        debug!(
            peer = ?self.peer,
            ?channel,
            command = %String::from_utf8_lossy(data),
            "Exec requested, starting program"
        );
        session.channel_success(channel);
        self.start_session(channel, session);
        Ok(())
    }

    async fn data(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        let keys = match self.channels.get_mut(&channel) {
            Some(state) => state.decoder.decode(data),
            None => return Ok(()),
        };
        for key in keys {
            self.send_input(channel, Input::Key(key));
        }
        Ok(())
    }

    async fn window_change_request(
        &mut self,
        channel: ChannelId,
        col_width: u32,
        row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        let size = PtySize::from_request(col_width, row_height);
        if let Some(state) = self.channels.get_mut(&channel) {
            state.pty = Some(size);
        }
        self.send_input(
            channel,
            Input::Resize {
                width: size.width,
                height: size.height,
            },
        );
        Ok(())
    }

    async fn channel_eof(
        &mut self,
        channel: ChannelId,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        // Closing the input queue ends the session
        if let Some(state) = self.channels.get_mut(&channel) {
            state.input = None;
        }
        Ok(())
    }

    async fn channel_close(
        &mut self,
        channel: ChannelId,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        self.channels.remove(&channel);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::ColorProfile;
    use ratatui::style::Color;
    use std::time::Duration;

    #[test]
    fn test_no_pty_is_refused() {
        assert!(matches!(admit(None), Err(SessionError::NotATty)));
        assert_eq!(SessionError::NotATty.to_string(), "not a tty");
    }

    #[test]
    fn test_pty_size_becomes_context() {
        let ctx = admit(Some(PtySize { width: 80, height: 24 })).unwrap();
        assert_eq!(ctx.width, 80);
        assert_eq!(ctx.height, 24);
        assert_eq!(ctx.profile, ColorProfile::Ansi256);
        assert_eq!(ctx.foreground, Color::Gray);

        let ctx = admit(Some(PtySize { width: 200, height: 60 })).unwrap();
        assert_eq!((ctx.width, ctx.height), (200, 60));
    }

    #[test]
    fn test_pty_size_clamps() {
        let size = PtySize::from_request(100_000, 40);
        assert_eq!(size, PtySize { width: u16::MAX, height: 40 });
    }

    #[test]
    fn test_sessions_only_start_while_running() {
        assert!(accepting(Phase::Running).is_ok());
        assert!(matches!(accepting(Phase::Draining), Err(SessionError::ShuttingDown)));
        assert!(matches!(accepting(Phase::Stopped), Err(SessionError::ShuttingDown)));
        assert_eq!(SessionError::ShuttingDown.to_string(), "server is shutting down");
    }

    #[tokio::test]
    async fn test_auth_records_user() {
        let mut handler = ConnectionHandler::new(None, Shutdown::new(Duration::from_secs(1)));
        assert!(handler.user.is_none());

        let auth = handler.auth_none("alice").await.unwrap();
        assert!(matches!(auth, Auth::Accept));
        assert_eq!(handler.user.as_deref(), Some("alice"));
        assert!(handler.sessions().is_empty());
    }

    #[test]
    fn test_built_program_starts_at_menu() {
        let ctx = admit(Some(PtySize { width: 80, height: 24 })).unwrap();
        let (program, options) = program::build(ctx);
        assert!(options.alt_screen);
        assert!(matches!(program.screen(), program::Screen::Menu));
    }
}
