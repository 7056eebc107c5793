//! Cancellation signal shared by the event loop and the schedulers

use clap::ValueEnum;
use log::{info, warn};
use std::sync::Arc;
use tokio::sync::watch;

/// Cloneable handle on a one-way "stop now" flag
#[derive(Debug, Clone)]
pub struct Shutdown {
    sender: Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
            receiver,
        }
    }

    /// Asks every holder to stop. Calling it again is harmless.
    pub fn trigger(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once [`trigger`](Self::trigger) has been called
    pub async fn wait(&self) {
        let mut receiver = self.receiver.clone();
        // Only fails when every sender is gone, which cannot happen while `self` lives
        let _ = receiver.wait_for(|stopped| *stopped).await;
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// What to do when persistence or notification keeps failing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum IoFailurePolicy {
    /// Log, skip this cycle and try again next time
    #[default]
    Continue,
    /// Trigger a graceful shutdown
    Shutdown,
}

impl IoFailurePolicy {
    pub fn handle(self, shutdown: &Shutdown, what: &str) {
        match self {
            IoFailurePolicy::Continue => warn!("{} failed; retrying next cycle", what),
            IoFailurePolicy::Shutdown => {
                warn!("{} failed; shutting down", what);
                shutdown.trigger();
            }
        }
    }
}

/// Triggers `shutdown` on Ctrl+C or, on Unix, SIGTERM
pub async fn listen_for_signals(shutdown: Shutdown) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Received Ctrl+C, shutting down gracefully..."),
                    _ = terminate.recv() => info!("Received SIGTERM, shutting down gracefully..."),
                    _ = shutdown.wait() => return,
                }
            }
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {}", e);
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Received Ctrl+C, shutting down gracefully..."),
                    _ = shutdown.wait() => return,
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("Received Ctrl+C, shutting down gracefully..."),
            _ = shutdown.wait() => return,
        }
    }

    shutdown.trigger();
}
