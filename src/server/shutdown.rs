//! Graceful shutdown coordination
//!
//! ```text
//! Running ──begin()──▶ Draining ──drain()──▶ Stopped
//! ```
//!
//! `begin()` stops the accept loop. `drain()` then waits for every tracked
//! connection and session task, up to the grace period. Tasks still running
//! after that are told to terminate through the force token and get a short
//! release window before shutdown gives up on them.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Time forced sessions get to release their channels
pub const RELEASE_WINDOW: Duration = Duration::from_secs(5);

/// Server lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Running,
    Draining,
    Stopped,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShutdownError {
    #[error("{remaining} task(s) still running after forced termination")]
    ForcedRelease { remaining: usize },
}

/// Shared shutdown state. Cloning yields another handle to the same state.
#[derive(Debug, Clone)]
pub struct Shutdown {
    phase: Arc<watch::Sender<Phase>>,
    stop: CancellationToken,
    force: CancellationToken,
    tracker: TaskTracker,
    grace: Duration,
}

impl Shutdown {
    pub fn new(grace: Duration) -> Self {
        let (phase, _) = watch::channel(Phase::Running);
        Self {
            phase: Arc::new(phase),
            stop: CancellationToken::new(),
            force: CancellationToken::new(),
            tracker: TaskTracker::new(),
            grace,
        }
    }

    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    /// Cancelled when the grace period runs out
    pub fn force_token(&self) -> CancellationToken {
        self.force.clone()
    }

    /// Tracker every connection and session task is spawned on
    pub fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }

    /// Move from Running to Draining. Returns `false` if shutdown had already begun.
    pub fn begin(&self) -> bool {
        let began = self.phase.send_if_modified(|phase| {
            if *phase == Phase::Running {
                *phase = Phase::Draining;
                true
            } else {
                false
            }
        });
        if began {
            self.stop.cancel();
            info!(grace_secs = self.grace.as_secs(), "Shutdown started");
        }
        began
    }

    /// Resolves once shutdown has been requested; the accept loop stops on it
    pub async fn wait_for_drain_request(&self) {
        self.stop.cancelled().await;
    }

    /// Wait for all tracked tasks, forcing them after the grace period.
    ///
    /// Forced termination is not an error by itself; only tasks that outlive
    /// the release window are.
    pub async fn drain(&self) -> Result<(), ShutdownError> {
        self.begin();
        self.tracker.close();

        let result = if timeout(self.grace, self.tracker.wait()).await.is_ok() {
            debug!("All sessions finished within the grace period");
            Ok(())
        } else {
            warn!(
                remaining = self.tracker.len(),
                "Grace period elapsed, terminating sessions"
            );
            self.force.cancel();
            match timeout(RELEASE_WINDOW, self.tracker.wait()).await {
                Ok(()) => Ok(()),
                Err(_) => Err(ShutdownError::ForcedRelease {
                    remaining: self.tracker.len(),
                }),
            }
        };

        self.phase.send_replace(Phase::Stopped);
        result
    }
}

/// Begin shutdown on the first SIGINT or SIGTERM; later signals are logged.
#[cfg(unix)]
pub async fn listen_for_signals(shutdown: Shutdown) -> io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    loop {
        let name = tokio::select! {
            _ = interrupt.recv() => "SIGINT",
            _ = terminate.recv() => "SIGTERM",
        };
        on_signal(&shutdown, name);
    }
}

/// Begin shutdown on the first Ctrl-C; later ones are logged.
#[cfg(not(unix))]
pub async fn listen_for_signals(shutdown: Shutdown) -> io::Result<()> {
    loop {
        tokio::signal::ctrl_c().await?;
        on_signal(&shutdown, "Ctrl-C");
    }
}

fn on_signal(shutdown: &Shutdown, name: &str) {
    if shutdown.begin() {
        info!(signal = name, "Received shutdown signal");
    } else {
        info!(signal = name, "Already shutting down, ignoring signal");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use tokio::time::{sleep, Instant};

    const GRACE: Duration = Duration::from_secs(30);

    #[tokio::test(start_paused = true)]
    async fn test_begin_is_idempotent() {
        let shutdown = Shutdown::new(GRACE);
        assert_eq!(shutdown.phase(), Phase::Running);
        assert!(shutdown.wait_for_drain_request().now_or_never().is_none());

        assert!(shutdown.begin());
        assert!(!shutdown.begin());
        assert!(!shutdown.clone().begin());

        assert_eq!(shutdown.phase(), Phase::Draining);
        assert!(shutdown.wait_for_drain_request().now_or_never().is_some());
        assert!(!shutdown.force_token().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_server_drains_immediately() {
        let shutdown = Shutdown::new(GRACE);
        let start = Instant::now();
        shutdown.begin();
        shutdown.drain().await.unwrap();
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(shutdown.phase(), Phase::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_waits_for_sessions_within_grace() {
        let shutdown = Shutdown::new(GRACE);
        for secs in [1, 5, 10] {
            shutdown.tracker().spawn(sleep(Duration::from_secs(secs)));
        }

        let start = Instant::now();
        shutdown.drain().await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(10));
        assert!(!shutdown.force_token().is_cancelled());
        assert_eq!(shutdown.phase(), Phase::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_forced_termination_is_not_an_error() {
        let shutdown = Shutdown::new(GRACE);
        let force = shutdown.force_token();
        shutdown.tracker().spawn(async move {
            force.cancelled().await;
            sleep(Duration::from_secs(1)).await;
        });

        let start = Instant::now();
        shutdown.drain().await.unwrap();
        assert_eq!(start.elapsed(), GRACE + Duration::from_secs(1));
        assert!(shutdown.force_token().is_cancelled());
        assert!(shutdown.tracker().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_task_fails_release() {
        let shutdown = Shutdown::new(GRACE);
        shutdown.tracker().spawn(sleep(Duration::from_secs(3600)));

        let start = Instant::now();
        let err = shutdown.drain().await.unwrap_err();
        assert_eq!(err, ShutdownError::ForcedRelease { remaining: 1 });
        assert_eq!(start.elapsed(), GRACE + RELEASE_WINDOW);
        assert_eq!(shutdown.phase(), Phase::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_drain_request() {
        let shutdown = Shutdown::new(GRACE);
        let waiter = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move { shutdown.wait_for_drain_request().await })
        };
        sleep(Duration::from_secs(1)).await;
        assert!(!waiter.is_finished());

        shutdown.begin();
        waiter.await.unwrap();
    }
}
