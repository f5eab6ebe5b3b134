//! SSH server hosting one typing-test program per session.
//!
//! - **handler**: per-connection russh handler, pty tracking and admission
//! - **supervisor**: runs one program per channel and releases the channel
//! - **shutdown**: Running/Draining/Stopped coordination and signal handling
//!
//! # Architecture
//!
//! ```text
//! Server (accept loop)
//! └── connection task (russh session)        tracked
//!     └── ConnectionHandler
//!         └── supervisor task per channel     tracked
//!             └── Program
//! ```

pub mod handler;
pub mod shutdown;
pub mod supervisor;

use std::fs::{self, OpenOptions};
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use russh::Disconnect;
use russh_keys::key::KeyPair;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use handler::ConnectionHandler;
use shutdown::{listen_for_signals, Shutdown, ShutdownError};

/// Errors that stop the server
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to load host key {}: {source}", path.display())]
    HostKey {
        path: PathBuf,
        #[source]
        source: russh_keys::Error,
    },

    #[error("failed to write host key {}: {source}", path.display())]
    HostKeyWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to generate host key")]
    KeyGeneration,

    #[error(transparent)]
    Shutdown(#[from] ShutdownError),
}

/// Errors that end a single session
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("not a tty")]
    NotATty,

    #[error("server is shutting down")]
    ShuttingDown,

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("program panicked: {0}")]
    Panicked(String),
}

/// A bound, not yet running server
pub struct Server {
    config: ServerConfig,
    ssh: Arc<russh::server::Config>,
    listener: TcpListener,
    shutdown: Shutdown,
}

impl Server {
    /// Load (or create) the host key and bind the listening socket
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        let key = load_or_generate_host_key(&config.host_key_path)?;
        let ssh = russh::server::Config {
            inactivity_timeout: Some(Duration::from_secs(3600)),
            auth_rejection_time: Duration::from_secs(1),
            auth_rejection_time_initial: Some(Duration::ZERO),
            keys: vec![key],
            ..Default::default()
        };

        let addr = config.address();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;

        let shutdown = Shutdown::new(config.grace_period);
        Ok(Self {
            config,
            ssh: Arc::new(ssh),
            listener,
            shutdown,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Handle to this server's shutdown state
    pub fn shutdown(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Accept connections until shutdown begins, then drain sessions
    pub async fn run(self) -> Result<(), ServerError> {
        if let Ok(addr) = self.local_addr() {
            debug!(%addr, "Listening");
        }
        let Server {
            config,
            ssh,
            listener,
            shutdown,
        } = self;
        let bind_display = format!("{}:{}", config.bind, config.port);

        info!("Starting server on {}", bind_display);
        accept_loop(listener, ssh, &shutdown).await;
        info!("Stopping SSH server on {}", bind_display);

        shutdown.drain().await?;
        info!("Server stopped");
        Ok(())
    }
}

/// Run the server until a shutdown signal arrives and every session is released
pub async fn serve(config: ServerConfig) -> Result<(), ServerError> {
    let server = Server::bind(config).await?;

    let shutdown = server.shutdown();
    tokio::spawn(async move {
        if let Err(err) = listen_for_signals(shutdown).await {
            error!(error = %err, "Failed to install signal handlers");
        }
    });

    server.run().await
}

/// Pause after a failed accept; errors such as EMFILE persist until
/// descriptors are released.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Source of incoming connections
#[async_trait]
pub trait Accept: Send {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    async fn accept(&mut self) -> io::Result<(Self::Stream, SocketAddr)>;
}

#[async_trait]
impl Accept for TcpListener {
    type Stream = TcpStream;

    async fn accept(&mut self) -> io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self).await
    }
}

async fn accept_loop<A: Accept>(
    mut listener: A,
    ssh: Arc<russh::server::Config>,
    shutdown: &Shutdown,
) {
    loop {
        let (stream, peer) = tokio::select! {
            _ = shutdown.wait_for_drain_request() => break,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(err) => {
                    warn!(error = %err, "Failed to accept connection");
                    tokio::select! {
                        _ = shutdown.wait_for_drain_request() => break,
                        _ = time::sleep(ACCEPT_BACKOFF) => continue,
                    }
                }
            },
        };

        info!(%peer, "Accepted connection");
        let handler = ConnectionHandler::new(Some(peer), shutdown.clone());
        let connection = serve_connection(ssh.clone(), stream, handler, shutdown.force_token());
        shutdown.tracker().spawn(connection);
    }
}

/// Run one SSH connection until the client leaves or shutdown forces it.
///
/// When forced, the connection stays up until its sessions have released
/// their channels, then disconnects the client.
async fn serve_connection<S>(
    ssh: Arc<russh::server::Config>,
    stream: S,
    handler: ConnectionHandler,
    force: CancellationToken,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let peer = handler.peer();
    let sessions = handler.sessions();
    let connected = Instant::now();

    let session = match russh::server::run_stream(ssh, stream, handler).await {
        Ok(session) => session,
        Err(err) => {
            warn!(?peer, error = %err, "SSH handshake failed");
            return;
        }
    };
    let handle = session.handle();
    tokio::pin!(session);

    let finished = tokio::select! {
        result = &mut session => Some(result),
        _ = force.cancelled() => None,
    };
    let result = match finished {
        Some(result) => result,
        None => {
            sessions.close();
            let finished = tokio::select! {
                result = &mut session => Some(result),
                _ = sessions.wait() => None,
            };
            match finished {
                Some(result) => result,
                None => {
                    debug!(?peer, "Sessions released, disconnecting");
                    let _ = handle
                        .disconnect(
                            Disconnect::ByApplication,
                            "server shutting down".to_string(),
                            String::new(),
                        )
                        .await;
                    session.await
                }
            }
        }
    };

    let duration = connected.elapsed();
    match result {
        Ok(()) => info!(?peer, ?duration, "Connection closed"),
        Err(err) => warn!(?peer, ?duration, error = %err, "Connection error"),
    }
}

/// Load the host key at `path`, generating an Ed25519 key there if it is missing
pub fn load_or_generate_host_key(path: &Path) -> Result<KeyPair, ServerError> {
    if path.exists() {
        debug!(path = %path.display(), "Loading host key");
        return russh_keys::load_secret_key(path, None).map_err(|source| ServerError::HostKey {
            path: path.to_path_buf(),
            source,
        });
    }

    info!(path = %path.display(), "Generating new host key");
    let key = KeyPair::generate_ed25519().ok_or(ServerError::KeyGeneration)?;

    let write_err = |source| ServerError::HostKeyWrite {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(write_err)?;
    }

    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let file = options.open(path).map_err(write_err)?;
    russh_keys::encode_pkcs8_pem(&key, file).map_err(|source| ServerError::HostKey {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(key)
}
