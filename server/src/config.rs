use crate::persistence::JsonFiles;
use crate::shutdown::IoFailurePolicy;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Runtime settings for the whole server. The binary fills this from
/// command-line flags; tests usually start from [`ServerConfig::default`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Bytes read from a socket per readiness event
    pub buffer_size: usize,
    /// Largest accepted request payload
    pub max_message_size: usize,
    /// Payload that ends a session without a response, compared case-insensitively
    pub exit_message: String,
    pub persist_interval: Duration,
    pub ranking_interval: Duration,
    /// Minimum gap between two reviews of the same hotel by the same user
    pub review_cooldown: Duration,
    pub multicast_addr: Ipv4Addr,
    pub multicast_port: u16,
    pub shutdown_grace: Duration,
    pub max_connections: usize,
    pub hotels_path: PathBuf,
    pub users_path: PathBuf,
    pub reviews_path: PathBuf,
    pub on_io_failure: IoFailurePolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6789,
            buffer_size: 4096,
            max_message_size: 64 * 1024,
            exit_message: "exit".to_string(),
            persist_interval: Duration::from_secs(60),
            ranking_interval: Duration::from_secs(30),
            review_cooldown: Duration::from_secs(60),
            multicast_addr: Ipv4Addr::new(230, 0, 0, 1),
            multicast_port: 4321,
            shutdown_grace: Duration::from_secs(5),
            max_connections: 1024,
            hotels_path: PathBuf::from("data/hotels.json"),
            users_path: PathBuf::from("data/users.json"),
            reviews_path: PathBuf::from("data/reviews.json"),
            on_io_failure: IoFailurePolicy::Continue,
        }
    }
}

impl ServerConfig {
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn multicast_target(&self) -> SocketAddr {
        SocketAddr::from((self.multicast_addr, self.multicast_port))
    }

    pub fn data_files(&self) -> JsonFiles {
        JsonFiles::new(&self.hotels_path, &self.users_path, &self.reviews_path)
    }
}
