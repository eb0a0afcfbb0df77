//! Online/offline tracking
//!
//! The monitor is a `watch` channel of "is the server reachable". A health
//! probe task feeds it; the auto-sync task reacts to offline→online edges.

use super::orchestrator::SyncOrchestrator;
use super::transport::SyncTransport;
use crate::remote::RemoteClient;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

#[derive(Clone)]
pub struct ConnectivityMonitor {
    tx: Arc<watch::Sender<bool>>,
}

impl ConnectivityMonitor {
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self { tx: Arc::new(tx) }
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Record the current state; subscribers only wake on a change
    pub fn set_online(&self, online: bool) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                return false;
            }
            *current = online;
            true
        });

        if changed {
            if online {
                tracing::info!("Connectivity restored");
            } else {
                tracing::warn!("Connectivity lost");
            }
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Probe `GET /health` every `interval`; a failed or slow probe means offline
    pub fn spawn_health_probe(
        &self,
        client: RemoteClient,
        interval: Duration,
        timeout: Duration,
    ) -> JoinHandle<()> {
        let monitor = self.clone();

        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;

                match client.health(timeout).await {
                    Ok(_) => monitor.set_online(true),
                    Err(e) => {
                        tracing::debug!("Health probe against {} failed: {}", client.base_url(), e);
                        monitor.set_online(false);
                    }
                }
            }
        })
    }
}

/// Run a full sync `delay` after every offline→online transition
pub fn spawn_auto_sync<R: SyncTransport>(
    orchestrator: Arc<SyncOrchestrator<R>>,
    connectivity: &ConnectivityMonitor,
    delay: Duration,
) -> JoinHandle<()> {
    let mut rx = connectivity.subscribe();

    tokio::spawn(async move {
        let mut was_online = *rx.borrow_and_update();

        while rx.changed().await.is_ok() {
            let online = *rx.borrow_and_update();

            if online && !was_online {
                tracing::info!("Back online, syncing in {:?}", delay);
                time::sleep(delay).await;

                match orchestrator.sync_all().await {
                    Ok(report) => tracing::info!("Reconnect sync finished: {}", report.summary()),
                    Err(e) => tracing::info!("Reconnect sync skipped: {}", e),
                }
            }

            was_online = online;
        }
    })
}
