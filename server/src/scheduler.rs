//! Periodic persistence and ranking tasks
//!
//! Both tasks run on a small multi-thread runtime next to the event loop and
//! share the store with it. Each waits one full period before its first run,
//! and a late tick pushes the following ones back instead of bursting.

use crate::config::ServerConfig;
use crate::notifier::Notifier;
use crate::persistence::{Persistence, PersistenceError};
use crate::shutdown::{IoFailurePolicy, Shutdown};
use crate::store::{LeaderChange, Store};
use crate::utils::get_timestamp;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// Saves one snapshot of the store
pub fn persist_once(store: &Store, persistence: &dyn Persistence) -> Result<(), PersistenceError> {
    persistence.save(&store.snapshot())
}

/// Last save before exit: every session is closed first, so the snapshot
/// never records a logged-in user. Call only after the event loop and both
/// background tasks have stopped.
pub fn final_save(store: &Store, persistence: &dyn Persistence) -> Result<(), PersistenceError> {
    store.logout_all();
    persist_once(store, persistence)?;
    info!("Final snapshot saved");
    Ok(())
}

/// Re-ranks every city and announces each new leader.
///
/// Returns the changes that were detected, including any whose announcement
/// failed; a failed announcement is reported through `policy`.
pub async fn rank_once(
    store: &Store,
    notifier: &dyn Notifier,
    policy: IoFailurePolicy,
    shutdown: &Shutdown,
) -> Vec<LeaderChange> {
    let changes = store.rank_all(get_timestamp());
    for change in &changes {
        info!("New top hotel in {}: {}", change.city, change.hotel);
        if let Err(e) = notifier.announce(&change.city, &change.hotel).await {
            error!("{}", e);
            policy.handle(shutdown, "Ranking announcement");
        }
    }
    changes
}

/// Handles of the two running background tasks
pub struct Schedulers {
    persistence: JoinHandle<()>,
    ranking: JoinHandle<()>,
    grace: Duration,
}

impl Schedulers {
    /// Starts both tasks on `runtime`
    pub fn spawn(
        runtime: &Handle,
        store: Arc<Store>,
        persistence: Arc<dyn Persistence>,
        notifier: Arc<dyn Notifier>,
        config: &ServerConfig,
        shutdown: Shutdown,
    ) -> Self {
        let policy = config.on_io_failure;

        let persistence_task = {
            let store = Arc::clone(&store);
            let shutdown = shutdown.clone();
            let period = config.persist_interval;
            runtime.spawn(async move {
                let mut ticker = fixed_delay(period);
                loop {
                    tokio::select! {
                        _ = shutdown.wait() => break,
                        _ = ticker.tick() => {
                            save_in_background(&store, &persistence, policy, &shutdown).await;
                        }
                    }
                }
            })
        };

        let ranking_task = {
            let shutdown = shutdown.clone();
            let period = config.ranking_interval;
            runtime.spawn(async move {
                let mut ticker = fixed_delay(period);
                loop {
                    tokio::select! {
                        _ = shutdown.wait() => break,
                        _ = ticker.tick() => {
                            rank_once(&store, notifier.as_ref(), policy, &shutdown).await;
                        }
                    }
                }
            })
        };

        info!(
            "Schedulers started (persist every {:?}, rank every {:?})",
            config.persist_interval, config.ranking_interval
        );

        Self {
            persistence: persistence_task,
            ranking: ranking_task,
            grace: config.shutdown_grace,
        }
    }

    /// Waits for both tasks to notice the shutdown signal, aborting whatever
    /// is still running once the grace period has passed.
    ///
    /// Returns `true` when both stopped on their own.
    pub async fn stop(self) -> bool {
        let Self {
            mut persistence,
            mut ranking,
            grace,
        } = self;

        let joined = tokio::time::timeout(grace, async {
            if let Err(e) = (&mut persistence).await {
                error!("Persistence task failed: {}", e);
            }
            if let Err(e) = (&mut ranking).await {
                error!("Ranking task failed: {}", e);
            }
        })
        .await;

        match joined {
            Ok(()) => {
                info!("Schedulers stopped");
                true
            }
            Err(_) => {
                warn!("Schedulers still busy after {:?}; aborting", grace);
                persistence.abort();
                ranking.abort();
                false
            }
        }
    }
}

/// Ticks every `period`, starting one period from now. A late tick delays
/// the following ones instead of firing a burst to catch up.
fn fixed_delay(period: Duration) -> Interval {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// Takes a snapshot and writes it on the blocking pool
async fn save_in_background(
    store: &Store,
    persistence: &Arc<dyn Persistence>,
    policy: IoFailurePolicy,
    shutdown: &Shutdown,
) {
    let snapshot = store.snapshot();
    let persistence = Arc::clone(persistence);
    match tokio::task::spawn_blocking(move || persistence.save(&snapshot)).await {
        Ok(Ok(())) => debug!("Periodic snapshot saved"),
        Ok(Err(e)) => {
            error!("Periodic save failed: {}", e);
            policy.handle(shutdown, "Periodic save");
        }
        Err(e) => error!("Periodic save task failed: {}", e),
    }
}
