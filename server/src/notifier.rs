//! Ranking-change announcements over UDP multicast

use async_trait::async_trait;
use log::{debug, warn};
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use thiserror::Error;
use tokio::net::UdpSocket;

pub const DEFAULT_SEND_ATTEMPTS: u32 = 3;

#[derive(Debug, Error)]
pub enum NotifierError {
    #[error("failed to open the announcement socket: {0}")]
    Socket(#[source] io::Error),

    #[error("announcement to {target} failed after {attempts} attempts: {source}")]
    Send {
        target: SocketAddr,
        attempts: u32,
        #[source]
        source: io::Error,
    },
}

/// Announces a change of a city's top-ranked hotel
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn announce(&self, city: &str, hotel: &str) -> Result<(), NotifierError>;
}

pub fn announcement(city: &str, hotel: &str) -> String {
    format!("Ranking update for {}: {} is now the top hotel", city, hotel)
}

/// Sends one datagram per announcement to a multicast group (or any UDP address)
pub struct MulticastNotifier {
    socket: UdpSocket,
    target: SocketAddr,
    attempts: u32,
}

impl MulticastNotifier {
    /// Opens the sending socket. Must be called from within the runtime that
    /// will drive the announcements.
    pub async fn bind(target: SocketAddr) -> Result<Self, NotifierError> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
            .await
            .map_err(NotifierError::Socket)?;
        if target.ip().is_multicast() {
            socket.set_multicast_ttl_v4(1).map_err(NotifierError::Socket)?;
        }
        Ok(Self {
            socket,
            target,
            attempts: DEFAULT_SEND_ATTEMPTS,
        })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }
}

#[async_trait]
impl Notifier for MulticastNotifier {
    async fn announce(&self, city: &str, hotel: &str) -> Result<(), NotifierError> {
        let message = announcement(city, hotel);
        let mut attempt = 1;
        loop {
            match self.socket.send_to(message.as_bytes(), self.target).await {
                Ok(_) => {
                    debug!("Announced new leader {} in {}", hotel, city);
                    return Ok(());
                }
                Err(source) if attempt >= self.attempts => {
                    return Err(NotifierError::Send {
                        target: self.target,
                        attempts: attempt,
                        source,
                    });
                }
                Err(e) => {
                    warn!(
                        "Announcement attempt {} to {} failed: {}",
                        attempt, self.target, e
                    );
                    attempt += 1;
                }
            }
        }
    }
}

/// Keeps announcements in memory instead of sending them
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: std::sync::Mutex<Vec<(String, String)>>,
}

#[cfg(test)]
impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Announcements so far as (city, hotel) pairs
    pub fn announcements(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl Notifier for RecordingNotifier {
    async fn announce(&self, city: &str, hotel: &str) -> Result<(), NotifierError> {
        self.sent
            .lock()
            .unwrap()
            .push((city.to_string(), hotel.to_string()));
        Ok(())
    }
}
