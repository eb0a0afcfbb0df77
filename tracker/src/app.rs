//! Device-side application state and initialization
//!
//! Opens the local record store, loads settings and wires every service to
//! the same store, clock, connectivity monitor and remote client.

use crate::config::{HEALTH_CHECK_TIMEOUT_SECS, LOCAL_DB_FILE};
use crate::database::{self, RecordStore};
use crate::domain::{SharedClock, SystemClock};
use crate::error::Result;
use crate::remote::RemoteClient;
use crate::services::{
    BestEffortPush, ExportService, HabitsService, NotesService, SessionsService, SettingsService,
    TasksService, TrackerSettings,
};
use crate::sync::{spawn_auto_sync, ConnectivityMonitor, SyncOrchestrator, SyncScheduler};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Central application state holding all services
#[derive(Clone)]
pub struct AppState {
    pub data_dir: PathBuf,
    pub settings: TrackerSettings,
    pub store: RecordStore,
    pub connectivity: ConnectivityMonitor,
    pub client: RemoteClient,
    pub orchestrator: Arc<SyncOrchestrator<RemoteClient>>,
    pub tasks: TasksService,
    pub notes: NotesService,
    pub habits: HabitsService,
    pub sessions: SessionsService,
    pub export: ExportService,
}

/// Handles of the tasks started by `AppState::start_background`
pub struct Background {
    pub probe: JoinHandle<()>,
    pub auto_sync: Option<JoinHandle<()>>,
    pub scheduler: SyncScheduler,
}

impl Background {
    pub async fn shutdown(self) -> Result<()> {
        self.probe.abort();
        if let Some(auto_sync) = self.auto_sync {
            auto_sync.abort();
        }
        self.scheduler.shutdown().await
    }
}

impl AppState {
    /// Initialize state under `data_dir`, creating it on first use.
    ///
    /// Connectivity starts offline; the first health probe or
    /// [`AppState::probe_once`] decides.
    pub async fn init(data_dir: PathBuf) -> Result<Self> {
        tracing::info!("Initializing tracker in {:?}", data_dir);
        std::fs::create_dir_all(&data_dir)?;

        let settings = SettingsService::new(data_dir.clone()).load().await?;
        let pool = database::create_pool(&data_dir.join(LOCAL_DB_FILE)).await?;
        let store = RecordStore::new(pool);

        let clock: SharedClock = Arc::new(SystemClock);
        let connectivity = ConnectivityMonitor::new(false);
        let client = RemoteClient::new(settings.server_url.clone(), settings.request_timeout())?;
        let push = BestEffortPush::new(client.clone(), connectivity.clone());

        let orchestrator = Arc::new(SyncOrchestrator::new(
            store.clone(),
            Arc::new(client.clone()),
            connectivity.clone(),
            clock.clone(),
            settings.request_timeout(),
        ));

        let policy = settings.calendar;
        let state = Self {
            tasks: TasksService::new(&store, clock.clone(), push.clone()),
            notes: NotesService::new(&store, clock.clone(), push.clone()),
            habits: HabitsService::new(&store, clock.clone(), policy, push.clone()),
            sessions: SessionsService::new(&store, clock.clone(), policy, push),
            export: ExportService::new(store.clone(), clock, &data_dir),
            data_dir,
            settings,
            store,
            connectivity,
            client,
            orchestrator,
        };

        tracing::info!("Tracker initialized successfully");
        Ok(state)
    }

    /// Probe the server once and record the result
    pub async fn probe_once(&self) -> bool {
        let timeout = Duration::from_secs(HEALTH_CHECK_TIMEOUT_SECS);
        let online = match self.client.health(timeout).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("Server {} unreachable: {}", self.client.base_url(), e);
                false
            }
        };
        self.connectivity.set_online(online);
        online
    }

    /// Start the health probe, the reconnect trigger and the periodic sync
    pub async fn start_background(&self) -> Result<Background> {
        let probe = self.connectivity.spawn_health_probe(
            self.client.clone(),
            self.settings.health_check_interval(),
            Duration::from_secs(HEALTH_CHECK_TIMEOUT_SECS),
        );

        let scheduler = SyncScheduler::new().await?;
        let auto_sync = if self.settings.auto_sync {
            scheduler
                .schedule(self.orchestrator.clone(), self.settings.sync_frequency()?)
                .await?;
            Some(spawn_auto_sync(
                self.orchestrator.clone(),
                &self.connectivity,
                self.settings.reconnect_delay(),
            ))
        } else {
            tracing::info!("Automatic sync disabled");
            None
        };
        scheduler.start().await?;

        Ok(Background {
            probe,
            auto_sync,
            scheduler,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::rules::NewTask;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_init_creates_store_and_settings() {
        let temp = TempDir::new().unwrap();
        let data_dir = temp.path().join("tracker");

        let state = AppState::init(data_dir.clone()).await.unwrap();

        assert!(data_dir.join(LOCAL_DB_FILE).exists());
        assert!(data_dir.join(crate::config::SETTINGS_FILE).exists());
        assert!(!state.connectivity.is_online());

        // Offline writes still land locally
        state
            .tasks
            .create_task(NewTask {
                title: "Offline".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(state.tasks.list_tasks().await.unwrap().len(), 1);
    }
}
