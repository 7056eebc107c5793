//! # Hotel Review Server Library
//!
//! This library implements the server side of a hotel review and ranking
//! service. Clients register, log in, search hotels by city, post scored
//! reviews and check their reviewer badge over a length-prefixed TCP
//! protocol. The server keeps a per-city ranking of hotels and announces
//! changes at the top of a city over UDP multicast.
//!
//! ## Architecture
//!
//! ### Single-Threaded Event Loop
//! All sockets are served from one current-thread tokio runtime. Every
//! connection is a task that waits on socket readiness and performs
//! non-blocking reads and writes, so the loop handles many clients without a
//! thread per connection. Each connection has at most one request in flight:
//! the next request is not decoded until the previous response has been
//! flushed.
//!
//! ### Shared Store
//! The [`store::Store`] is built from the persisted snapshot at startup and
//! shared through `Arc` with two background tasks running on a separate
//! two-worker runtime: a persistence task that saves snapshots and a ranking
//! task that re-sorts every city and notifies on leader changes.
//!
//! ### Shutdown
//! A single [`shutdown::Shutdown`] signal stops the event loop and both
//! background tasks. The binary then logs every user out and performs one
//! last synchronous save.
//!
//! ## Module Organization
//!
//! - `network` / `connection` / `connection_manager`: accept loop, per-socket
//!   state machine, live connection registry
//! - `dispatcher`: request text in, [`shared::ServerResponse`] out
//! - `store` / `ranking` / `credentials`: domain state and rules
//! - `scheduler` / `notifier` / `persistence`: background work and its
//!   collaborators
//! - `config` / `shutdown`: runtime settings and cancellation
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::dispatcher::Dispatcher;
//! use server::network::Server;
//! use server::persistence::{JsonFiles, Persistence};
//! use server::shutdown::Shutdown;
//! use server::store::Store;
//! use std::sync::Arc;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::default();
//!     let snapshot = JsonFiles::in_dir("data").load()?;
//!     let store = Arc::new(Store::from_snapshot(snapshot, server::utils::get_timestamp()));
//!     let dispatcher = Arc::new(Dispatcher::new(store, config.review_cooldown));
//!
//!     let shutdown = Shutdown::new();
//!     let server = Server::bind(&config.listen_address(), dispatcher, &config, shutdown).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connection;
pub mod connection_manager;
pub mod credentials;
pub mod dispatcher;
pub mod network;
pub mod notifier;
pub mod persistence;
pub mod ranking;
pub mod scheduler;
pub mod shutdown;
pub mod store;
pub mod utils;

/// Process-unique id of an accepted TCP connection
pub type ConnectionId = u64;
