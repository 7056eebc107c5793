//! Registry of live TCP connections
//!
//! This module tracks which connections the event loop is currently serving:
//! - Connection id assignment (process-unique, never reused)
//! - Peer address and accept time for logging
//! - Capacity enforcement
//!
//! Session ownership (which user a connection is logged in as) lives in the
//! store; this registry only knows about sockets.

use crate::ConnectionId;
use log::info;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Bookkeeping for one accepted connection
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    /// Unique id assigned at accept time
    pub id: ConnectionId,
    /// Remote end of the socket
    pub peer: SocketAddr,
    /// When the connection was accepted
    pub accepted_at: Instant,
}

impl ConnectionInfo {
    pub fn new(id: ConnectionId, peer: SocketAddr) -> Self {
        Self {
            id,
            peer,
            accepted_at: Instant::now(),
        }
    }

    pub fn age(&self) -> Duration {
        self.accepted_at.elapsed()
    }
}

/// Manages all live connections
///
/// Ids start from 1 and only increase, so an id seen in a log line or stored
/// as a session owner can never refer to a later connection.
#[derive(Debug)]
pub struct ConnectionManager {
    /// Live connections indexed by id
    connections: HashMap<ConnectionId, ConnectionInfo>,
    /// Next id to hand out
    next_id: ConnectionId,
    /// Maximum number of simultaneous connections
    max_connections: usize,
}

impl ConnectionManager {
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: HashMap::new(),
            next_id: 1,
            max_connections,
        }
    }

    /// Registers a newly accepted connection. Callers check
    /// [`is_full`](Self::is_full) first.
    pub fn add(&mut self, peer: SocketAddr) -> ConnectionId {
        let id = self.next_id;
        self.next_id += 1;

        info!("Connection {} accepted from {}", id, peer);
        self.connections.insert(id, ConnectionInfo::new(id, peer));
        id
    }

    /// Forgets a connection. Returns its info if it was still registered.
    pub fn remove(&mut self, id: ConnectionId) -> Option<ConnectionInfo> {
        let removed = self.connections.remove(&id);
        if let Some(connection) = &removed {
            info!(
                "Connection {} from {} closed after {:.1}s",
                id,
                connection.peer,
                connection.age().as_secs_f32()
            );
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.connections.len() >= self.max_connections
    }
}
