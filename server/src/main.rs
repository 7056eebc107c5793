use clap::Parser;
use env_logger::Env;
use log::{error, info, warn};
use server::config::ServerConfig;
use server::dispatcher::Dispatcher;
use server::network::Server;
use server::notifier::MulticastNotifier;
use server::persistence::Persistence;
use server::scheduler::{self, Schedulers};
use server::shutdown::{self, IoFailurePolicy, Shutdown};
use server::store::Store;
use server::utils::get_timestamp;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "6789")]
    port: u16,

    /// Bytes read from a socket per readiness event
    #[arg(long, default_value = "4096")]
    buffer_size: usize,

    /// Largest accepted request payload in bytes
    #[arg(long, default_value = "65536")]
    max_message_size: usize,

    /// Message that ends a client session
    #[arg(long, default_value = "exit")]
    exit_message: String,

    /// Seconds between snapshot saves
    #[arg(long, default_value = "60")]
    persist_interval: u64,

    /// Seconds between ranking passes
    #[arg(long, default_value = "30")]
    ranking_interval: u64,

    /// Seconds a user must wait before reviewing the same hotel again
    #[arg(long, default_value = "60")]
    review_cooldown: u64,

    /// Multicast group for ranking announcements
    #[arg(long, default_value = "230.0.0.1")]
    multicast_addr: Ipv4Addr,

    /// Multicast port for ranking announcements
    #[arg(long, default_value = "4321")]
    multicast_port: u16,

    /// Seconds to wait for background tasks at shutdown
    #[arg(long, default_value = "5")]
    shutdown_grace: u64,

    /// Maximum number of simultaneous client connections
    #[arg(long, default_value = "1024")]
    max_connections: usize,

    /// Hotels data file
    #[arg(long, default_value = "data/hotels.json")]
    hotels: PathBuf,

    /// Users data file
    #[arg(long, default_value = "data/users.json")]
    users: PathBuf,

    /// Reviews data file
    #[arg(long, default_value = "data/reviews.json")]
    reviews: PathBuf,

    /// What to do when saving or announcing keeps failing
    #[arg(long, value_enum, default_value = "continue")]
    on_io_failure: IoFailurePolicy,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        ServerConfig {
            host: self.host,
            port: self.port,
            buffer_size: self.buffer_size,
            max_message_size: self.max_message_size,
            exit_message: self.exit_message,
            persist_interval: Duration::from_secs(self.persist_interval.max(1)),
            ranking_interval: Duration::from_secs(self.ranking_interval.max(1)),
            review_cooldown: Duration::from_secs(self.review_cooldown),
            multicast_addr: self.multicast_addr,
            multicast_port: self.multicast_port,
            shutdown_grace: Duration::from_secs(self.shutdown_grace),
            max_connections: self.max_connections,
            hotels_path: self.hotels,
            users_path: self.users,
            reviews_path: self.reviews,
            on_io_failure: self.on_io_failure,
        }
    }
}

/// Main-method of the application.
/// Loads the data files, starts the background schedulers on a two-worker
/// runtime, then runs the event loop on this thread until a shutdown signal.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    env_logger::Builder::from_env(Env::default().default_filter_or(args.log_level.as_str()))
        .init();
    let config = args.into_config();

    let persistence = Arc::new(config.data_files());
    let snapshot = persistence.load()?;
    let store = Arc::new(Store::from_snapshot(snapshot, get_timestamp()));
    let shutdown = Shutdown::new();

    let background = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("scheduler")
        .enable_all()
        .build()?;
    let notifier = background.block_on(MulticastNotifier::bind(config.multicast_target()))?;
    info!("Ranking updates go to {}", notifier.target());
    let notifier = Arc::new(notifier);
    let schedulers = Schedulers::spawn(
        background.handle(),
        Arc::clone(&store),
        persistence.clone(),
        notifier,
        &config,
        shutdown.clone(),
    );

    let event_loop = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&store), config.review_cooldown));
    let served = event_loop.block_on(async {
        tokio::spawn(shutdown::listen_for_signals(shutdown.clone()));
        let server =
            Server::bind(&config.listen_address(), dispatcher, &config, shutdown.clone()).await?;
        server.run().await
    });

    // The event loop may also have stopped on a bind or accept failure
    shutdown.trigger();
    if !background.block_on(schedulers.stop()) {
        warn!("Background tasks were aborted");
    }
    background.shutdown_timeout(config.shutdown_grace);

    if let Err(e) = scheduler::final_save(&store, persistence.as_ref()) {
        error!("Final save failed: {}", e);
        return Err(e.into());
    }

    served?;
    info!("Server stopped");
    Ok(())
}
