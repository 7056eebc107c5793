//! One client connection, driven by socket readiness
//!
//! A connection alternates between two phases. While nothing is queued for
//! the peer it waits for read readiness and feeds the bytes to its
//! [`FrameDecoder`]; as soon as a whole request is buffered it is dispatched
//! and the response is queued. While a response is queued it only waits for
//! write readiness and flushes as much as the socket accepts. Further
//! requests already sitting in the decoder are not looked at until the
//! response has been written out completely.

use crate::dispatcher::Dispatcher;
use crate::shutdown::Shutdown;
use crate::ConnectionId;
use log::{debug, error, warn};
use shared::{FrameDecoder, FrameError, OutboundBuffer};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::Interest;
use tokio::net::TcpStream;

/// Why a connection ended
#[derive(Debug)]
pub enum CloseReason {
    /// The peer closed its end
    PeerClosed,
    /// The peer sent the exit message
    ExitRequested,
    /// The server is shutting down
    Shutdown,
    /// Bad framing or undecodable payload
    Protocol(FrameError),
    /// A response could not be encoded
    Encoding(serde_json::Error),
    /// Socket error
    Io(io::Error),
}

/// Per-connection limits
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub buffer_size: usize,
    pub max_message_size: usize,
    pub exit_message: String,
}

pub struct Connection {
    id: ConnectionId,
    peer: SocketAddr,
    stream: TcpStream,
    decoder: FrameDecoder,
    outbound: OutboundBuffer,
    read_buffer: Vec<u8>,
    exit_message: String,
    dispatcher: Arc<Dispatcher>,
}

impl Connection {
    pub fn new(
        id: ConnectionId,
        peer: SocketAddr,
        stream: TcpStream,
        dispatcher: Arc<Dispatcher>,
        settings: &ConnectionSettings,
    ) -> Self {
        Self {
            id,
            peer,
            stream,
            decoder: FrameDecoder::new(settings.max_message_size),
            outbound: OutboundBuffer::new(),
            read_buffer: vec![0u8; settings.buffer_size.max(1)],
            exit_message: settings.exit_message.to_lowercase(),
            dispatcher,
        }
    }

    /// Serves requests until the peer leaves, an error occurs, or `shutdown`
    /// fires. Any session this connection owned is released before returning.
    pub async fn serve(mut self, shutdown: Shutdown) -> CloseReason {
        let reason = tokio::select! {
            reason = self.drive() => reason,
            _ = shutdown.wait() => CloseReason::Shutdown,
        };

        self.dispatcher.release(self.id);
        match &reason {
            CloseReason::PeerClosed if self.decoder.buffered() > 0 => debug!(
                "Connection {} ({}) closed with {} unread bytes",
                self.id,
                self.peer,
                self.decoder.buffered()
            ),
            CloseReason::PeerClosed | CloseReason::ExitRequested | CloseReason::Shutdown => {
                debug!("Connection {} ({}) finished: {:?}", self.id, self.peer, reason)
            }
            CloseReason::Protocol(e) => {
                warn!("Closing connection {} ({}): {}", self.id, self.peer, e)
            }
            CloseReason::Encoding(e) => {
                error!("Closing connection {} ({}): {}", self.id, self.peer, e)
            }
            CloseReason::Io(e) => {
                error!("I/O error on connection {} ({}): {}", self.id, self.peer, e)
            }
        }
        reason
    }

    async fn drive(&mut self) -> CloseReason {
        loop {
            if self.outbound.is_empty() {
                match self.decoder.next_message() {
                    Ok(Some(message)) => {
                        if message.to_lowercase() == self.exit_message {
                            return CloseReason::ExitRequested;
                        }
                        if let Err(reason) = self.respond(&message) {
                            return reason;
                        }
                        continue;
                    }
                    Ok(None) => {}
                    Err(e) => return CloseReason::Protocol(e),
                }

                if let Err(e) = self.stream.ready(Interest::READABLE).await {
                    return CloseReason::Io(e);
                }
                match self.stream.try_read(&mut self.read_buffer) {
                    Ok(0) => return CloseReason::PeerClosed,
                    Ok(n) => self.decoder.extend(&self.read_buffer[..n]),
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                    Err(e) => return CloseReason::Io(e),
                }
            } else {
                if let Err(e) = self.stream.ready(Interest::WRITABLE).await {
                    return CloseReason::Io(e);
                }
                match self.stream.try_write(self.outbound.pending()) {
                    Ok(n) => self.outbound.advance(n),
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                    Err(e) => return CloseReason::Io(e),
                }
            }
        }
    }

    fn respond(&mut self, message: &str) -> Result<(), CloseReason> {
        let response = self.dispatcher.dispatch(message, self.id);
        let body = response.to_json().map_err(CloseReason::Encoding)?;
        self.outbound
            .queue(body.as_bytes())
            .map_err(CloseReason::Protocol)
    }
}
