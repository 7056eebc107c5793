//! Server network layer: accepting TCP connections and running them on the event loop

use crate::config::ServerConfig;
use crate::connection::{CloseReason, Connection, ConnectionSettings};
use crate::connection_manager::ConnectionManager;
use crate::dispatcher::Dispatcher;
use crate::shutdown::Shutdown;
use crate::ConnectionId;
use log::{debug, error, info, warn};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Messages sent from connection tasks to the main server loop
#[derive(Debug)]
pub enum ServerMessage {
    ConnectionClosed {
        id: ConnectionId,
        reason: CloseReason,
    },
}

/// Accept loop plus every connection it spawned.
///
/// All connections run as tasks on the runtime that drives [`Server::run`].
/// The binary uses a current-thread runtime, so request handling never leaves
/// the event-loop thread.
pub struct Server {
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    connections: ConnectionManager,
    settings: ConnectionSettings,
    shutdown: Shutdown,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl Server {
    pub async fn bind(
        address: &str,
        dispatcher: Arc<Dispatcher>,
        config: &ServerConfig,
        shutdown: Shutdown,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(address)
            .await
            .map_err(|source| ServerError::Bind {
                address: address.to_string(),
                source,
            })?;
        info!("Server listening on {}", listener.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener,
            dispatcher,
            connections: ConnectionManager::new(config.max_connections),
            settings: ConnectionSettings {
                buffer_size: config.buffer_size,
                max_message_size: config.max_message_size,
                exit_message: config.exit_message.clone(),
            },
            shutdown,
            server_tx,
            server_rx,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Registers an accepted socket and spawns its task, or turns it away
    /// when the server is full.
    fn admit(&mut self, stream: TcpStream, peer: SocketAddr, tasks: &mut JoinSet<()>) {
        if self.connections.is_full() {
            warn!("Connection limit reached, rejecting {}", peer);
            drop(stream);
            return;
        }
        let id = self.connections.add(peer);

        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not disable Nagle on connection {}: {}", id, e);
        }

        let connection = Connection::new(
            id,
            peer,
            stream,
            Arc::clone(&self.dispatcher),
            &self.settings,
        );
        let shutdown = self.shutdown.clone();
        let server_tx = self.server_tx.clone();

        tasks.spawn(async move {
            let reason = connection.serve(shutdown).await;
            if let Err(e) = server_tx.send(ServerMessage::ConnectionClosed { id, reason }) {
                debug!("Main loop gone before connection {} closed: {}", id, e);
            }
        });
    }

    fn handle_message(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::ConnectionClosed { id, reason } => {
                debug!("Connection {} reported close: {:?}", id, reason);
                self.connections.remove(id);
            }
        }
    }

    /// Main server loop: accepts connections and reaps finished ones until
    /// shutdown is triggered, then waits for every connection task to end.
    pub async fn run(mut self) -> Result<(), ServerError> {
        let mut tasks = JoinSet::new();
        let shutdown = self.shutdown.clone();

        info!("Server started successfully");

        loop {
            tokio::select! {
                _ = shutdown.wait() => break,

                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => self.admit(stream, peer, &mut tasks),
                    Err(e) => error!("Failed to accept connection: {}", e),
                },

                Some(message) = self.server_rx.recv() => self.handle_message(message),

                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        error!("Connection task failed: {}", e);
                    }
                }
            }
        }

        if self.connections.is_empty() {
            info!("Server shutting down");
        } else {
            info!(
                "Server shutting down, closing {} connections",
                self.connections.len()
            );
        }
        drop(self.listener);

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!("Connection task failed: {}", e);
            }
        }
        while let Ok(ServerMessage::ConnectionClosed { id, .. }) = self.server_rx.try_recv() {
            self.connections.remove(id);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Snapshot, Store};
    use shared::{encode_frame, Envelope, Hotel};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn start(config: ServerConfig) -> (SocketAddr, Arc<Store>, Shutdown) {
        let snapshot = Snapshot {
            hotels: vec![Hotel::new(1, "Plaza", "Rome")],
            ..Snapshot::default()
        };
        let store = Arc::new(Store::from_snapshot(snapshot, 0));
        let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&store), config.review_cooldown));
        let shutdown = Shutdown::new();
        let server = Server::bind("127.0.0.1:0", dispatcher, &config, shutdown.clone())
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.run());
        (addr, store, shutdown)
    }

    async fn request(stream: &mut TcpStream, text: &str) -> Envelope {
        stream
            .write_all(&encode_frame(text.as_bytes()).unwrap())
            .await
            .unwrap();
        let length = stream.read_u32().await.unwrap() as usize;
        let mut body = vec![0u8; length];
        stream.read_exact(&mut body).await.unwrap();
        Envelope::from_json(std::str::from_utf8(&body).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_request_response_over_tcp() {
        let (addr, _store, shutdown) = start(ServerConfig::default()).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        assert_eq!(request(&mut stream, "register,bob,Secret123").await.status_code, 200);
        assert_eq!(request(&mut stream, "searchAllHotels,Rome").await.status_code, 204);
        assert_eq!(request(&mut stream, "nonsense").await.status_code, 500);

        shutdown.trigger();
    }

    #[tokio::test]
    async fn test_connection_limit() {
        let config = ServerConfig {
            max_connections: 1,
            ..ServerConfig::default()
        };
        let (addr, _store, shutdown) = start(config).await;

        let mut first = TcpStream::connect(addr).await.unwrap();
        assert_eq!(request(&mut first, "searchAllHotels,Rome").await.status_code, 204);

        let mut second = TcpStream::connect(addr).await.unwrap();
        let mut byte = [0u8; 1];
        let read = tokio::time::timeout(Duration::from_secs(2), second.read(&mut byte))
            .await
            .expect("rejected connection should be closed");
        assert!(matches!(read, Ok(0) | Err(_)));

        shutdown.trigger();
    }

    #[tokio::test]
    async fn test_shutdown_closes_connections() {
        let (addr, store, shutdown) = start(ServerConfig::default()).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();
        assert_eq!(request(&mut stream, "register,amy,Secret123").await.status_code, 200);
        assert_eq!(request(&mut stream, "login,amy,Secret123").await.status_code, 201);

        shutdown.trigger();

        let mut byte = [0u8; 1];
        let read = tokio::time::timeout(Duration::from_secs(2), stream.read(&mut byte))
            .await
            .expect("connection should close on shutdown");
        assert!(matches!(read, Ok(0) | Err(_)));
        assert!(!store.is_logged_in("amy"));
    }
}
