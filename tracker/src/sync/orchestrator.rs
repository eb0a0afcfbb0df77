//! Client-side sync cycle
//!
//! One cycle reconciles every entity type concurrently. Each type reads its
//! full local collection (soft-deleted records included), submits it with
//! its watermark, writes every returned server record back verbatim and
//! then advances the watermark to the server's `syncTime`.

use super::connectivity::ConnectivityMonitor;
use super::transport::SyncTransport;
use crate::database::{EntityKind, Habit, Note, Record, RecordStore, Session, Task, Visibility};
use crate::domain::SharedClock;
use crate::error::{AppError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

/// Why a cycle did not start. Neither is fatal.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncError {
    #[error("Sync already in progress")]
    AlreadyInProgress,

    #[error("Offline - cannot sync")]
    Offline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Running { started_at: DateTime<Utc> },
}

/// Returns the state to `Idle` when the cycle ends, however it ends
struct RunningGuard<'a> {
    state: &'a Mutex<SyncState>,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        *state = SyncState::Idle;
    }
}

/// Outcome counts for one entity type
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KindSummary {
    pub sent: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub conflicts: usize,
    pub rejected: usize,
    pub applied: usize,
    pub sync_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum KindOutcome {
    Synced(KindSummary),
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KindReport {
    pub kind: EntityKind,
    pub outcome: KindOutcome,
}

/// Result of one `sync_all` cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub kinds: Vec<KindReport>,
}

impl SyncReport {
    pub fn outcome(&self, kind: EntityKind) -> Option<&KindOutcome> {
        self.kinds.iter().find(|r| r.kind == kind).map(|r| &r.outcome)
    }

    pub fn failed(&self) -> Vec<EntityKind> {
        self.kinds
            .iter()
            .filter(|r| matches!(r.outcome, KindOutcome::Failed { .. }))
            .map(|r| r.kind)
            .collect()
    }

    pub fn is_success(&self) -> bool {
        self.failed().is_empty()
    }

    /// One-line description for logs
    pub fn summary(&self) -> String {
        let parts: Vec<String> = self
            .kinds
            .iter()
            .map(|r| match &r.outcome {
                KindOutcome::Synced(s) => format!(
                    "{}: {} sent, {} conflicts, {} applied",
                    r.kind, s.sent, s.conflicts, s.applied
                ),
                KindOutcome::Failed { error } => format!("{}: failed ({})", r.kind, error),
            })
            .collect();
        parts.join("; ")
    }
}

pub struct SyncOrchestrator<R> {
    store: RecordStore,
    transport: Arc<R>,
    connectivity: ConnectivityMonitor,
    clock: SharedClock,
    timeout: Duration,
    state: Mutex<SyncState>,
}

impl<R: SyncTransport> SyncOrchestrator<R> {
    pub fn new(
        store: RecordStore,
        transport: Arc<R>,
        connectivity: ConnectivityMonitor,
        clock: SharedClock,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            transport,
            connectivity,
            clock,
            timeout,
            state: Mutex::new(SyncState::Idle),
        }
    }

    pub fn state(&self) -> SyncState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn connectivity(&self) -> &ConnectivityMonitor {
        &self.connectivity
    }

    fn try_begin(&self) -> std::result::Result<RunningGuard<'_>, SyncError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        if matches!(*state, SyncState::Running { .. }) {
            return Err(SyncError::AlreadyInProgress);
        }
        if !self.connectivity.is_online() {
            return Err(SyncError::Offline);
        }

        *state = SyncState::Running {
            started_at: self.clock.now(),
        };
        Ok(RunningGuard { state: &self.state })
    }

    /// Run one full cycle across every entity type.
    ///
    /// Fails fast when a cycle is already running or the device is offline.
    /// A failure in one entity type is reported in its `KindReport` and does
    /// not stop the others.
    pub async fn sync_all(&self) -> std::result::Result<SyncReport, SyncError> {
        let guard = match self.try_begin() {
            Ok(guard) => guard,
            Err(e) => {
                tracing::info!("Sync not started: {}", e);
                return Err(e);
            }
        };

        let started_at = self.clock.now();
        tracing::info!("Starting full sync");

        let (tasks, notes, habits, sessions) = tokio::join!(
            self.sync_kind::<Task>(),
            self.sync_kind::<Note>(),
            self.sync_kind::<Habit>(),
            self.sync_kind::<Session>(),
        );

        let kinds = vec![
            Self::report(EntityKind::Task, tasks),
            Self::report(EntityKind::Note, notes),
            Self::report(EntityKind::Habit, habits),
            Self::report(EntityKind::Session, sessions),
        ];

        drop(guard);

        let report = SyncReport {
            started_at,
            finished_at: self.clock.now(),
            kinds,
        };

        if report.is_success() {
            tracing::info!("Full sync completed: {}", report.summary());
        } else {
            tracing::warn!("Full sync finished with failures: {}", report.summary());
        }

        Ok(report)
    }

    fn report(kind: EntityKind, result: Result<KindSummary>) -> KindReport {
        let outcome = match result {
            Ok(summary) => KindOutcome::Synced(summary),
            Err(e) => {
                tracing::error!("{} sync failed: {}", kind, e);
                KindOutcome::Failed {
                    error: e.to_string(),
                }
            }
        };
        KindReport { kind, outcome }
    }

    async fn sync_kind<T: Record>(&self) -> Result<KindSummary> {
        let collection = self.store.collection::<T>();
        let local = collection.get_all(Visibility::IncludeDeleted).await?;
        let watermark = self.store.watermark(T::KIND).await?;
        let sent = local.len();

        tracing::debug!("Syncing {} {} records (watermark: {:?})", sent, T::KIND, watermark);

        let response = tokio::time::timeout(
            self.timeout,
            SyncTransport::batch_sync(&*self.transport, local, watermark),
        )
        .await
        .map_err(|_| AppError::Timeout(self.timeout))??;

        if !response.success {
            return Err(AppError::Generic(format!(
                "Server reported an unsuccessful {} sync",
                T::KIND
            )));
        }

        let mut applied = 0;
        for record in &response.server_records {
            match collection.put(record).await {
                Ok(()) => applied += 1,
                Err(e) => tracing::warn!("Skipping server {} {}: {}", T::KIND, record.id(), e),
            }
        }

        self.store.set_watermark(T::KIND, response.sync_time).await?;

        let results = &response.results;
        Ok(KindSummary {
            sent,
            created: results.created.len(),
            updated: results.updated.len(),
            unchanged: results.unchanged.len(),
            conflicts: results.conflicts.len(),
            rejected: results.errors.len(),
            applied,
            sync_time: Some(response.sync_time),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{create_memory_pool, RecordMeta};
    use crate::domain::{CalendarPolicy, ManualClock};
    use crate::remote::BatchSyncResponse;
    use crate::server::Reconciler;
    use async_trait::async_trait;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 6, 9, 0, 0).unwrap()
    }

    async fn memory_store() -> RecordStore {
        RecordStore::new(create_memory_pool().await.unwrap())
    }

    async fn server(clock: Arc<ManualClock>) -> Arc<Reconciler> {
        Arc::new(Reconciler::new(
            memory_store().await,
            clock,
            CalendarPolicy::default(),
        ))
    }

    fn task(title: &str, at: DateTime<Utc>) -> Task {
        Task {
            meta: RecordMeta::new(at),
            title: title.to_string(),
            description: String::new(),
            priority: Default::default(),
            deadline: None,
            completed: false,
        }
    }

    /// Fails note batches, forwards everything else
    struct NotesDown(Arc<Reconciler>);

    #[async_trait]
    impl SyncTransport for NotesDown {
        async fn batch_sync<T: Record>(
            &self,
            records: Vec<T>,
            last_sync_time: Option<DateTime<Utc>>,
        ) -> Result<BatchSyncResponse<T>> {
            if T::KIND == EntityKind::Note {
                return Err(AppError::Remote {
                    status: 503,
                    message: "unavailable".to_string(),
                });
            }
            SyncTransport::batch_sync(&*self.0, records, last_sync_time).await
        }
    }

    /// Never answers in time
    struct Stalled;

    #[async_trait]
    impl SyncTransport for Stalled {
        async fn batch_sync<T: Record>(
            &self,
            _records: Vec<T>,
            _last_sync_time: Option<DateTime<Utc>>,
        ) -> Result<BatchSyncResponse<T>> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Err(AppError::Generic("unreachable".to_string()))
        }
    }

    #[tokio::test]
    async fn test_sync_pushes_local_and_advances_watermarks() {
        let clock = Arc::new(ManualClock::new(t0()));
        let server = server(clock.clone()).await;
        let local = memory_store().await;
        local.tasks().put(&task("Local", t0())).await.unwrap();

        let orchestrator = SyncOrchestrator::new(
            local.clone(),
            server.clone(),
            ConnectivityMonitor::new(true),
            clock.clone(),
            Duration::from_secs(5),
        );

        let report = orchestrator.sync_all().await.unwrap();
        assert!(report.is_success());
        match report.outcome(EntityKind::Task) {
            Some(KindOutcome::Synced(s)) => {
                assert_eq!(s.sent, 1);
                assert_eq!(s.created, 1);
                assert_eq!(s.applied, 1);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }

        assert_eq!(server.list::<Task>(Visibility::Active).await.unwrap().len(), 1);
        for kind in EntityKind::ALL {
            assert!(local.watermark(kind).await.unwrap().is_some());
        }
        assert_eq!(orchestrator.state(), SyncState::Idle);
    }

    #[tokio::test]
    async fn test_offline_and_in_progress_fail_fast() {
        let clock = Arc::new(ManualClock::new(t0()));
        let connectivity = ConnectivityMonitor::new(false);
        let orchestrator = SyncOrchestrator::new(
            memory_store().await,
            server(clock.clone()).await,
            connectivity.clone(),
            clock,
            Duration::from_secs(5),
        );

        assert_eq!(orchestrator.sync_all().await.unwrap_err(), SyncError::Offline);

        connectivity.set_online(true);
        let guard = orchestrator.try_begin().unwrap();
        assert!(matches!(orchestrator.state(), SyncState::Running { .. }));
        assert_eq!(
            orchestrator.sync_all().await.unwrap_err(),
            SyncError::AlreadyInProgress
        );

        drop(guard);
        assert_eq!(orchestrator.state(), SyncState::Idle);
        assert!(orchestrator.sync_all().await.is_ok());
    }

    #[tokio::test]
    async fn test_one_failing_type_does_not_block_others() {
        let clock = Arc::new(ManualClock::new(t0()));
        let server = server(clock.clone()).await;
        let local = memory_store().await;
        local.tasks().put(&task("Goes through", t0())).await.unwrap();

        let orchestrator = SyncOrchestrator::new(
            local.clone(),
            Arc::new(NotesDown(server.clone())),
            ConnectivityMonitor::new(true),
            clock,
            Duration::from_secs(5),
        );

        let report = orchestrator.sync_all().await.unwrap();
        assert_eq!(report.failed(), vec![EntityKind::Note]);
        assert!(matches!(
            report.outcome(EntityKind::Task),
            Some(KindOutcome::Synced(_))
        ));

        // The failed type keeps its old watermark
        assert!(local.watermark(EntityKind::Note).await.unwrap().is_none());
        assert!(local.watermark(EntityKind::Task).await.unwrap().is_some());
        assert_eq!(server.list::<Task>(Visibility::Active).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failure() {
        let clock = Arc::new(ManualClock::new(t0()));
        let orchestrator = SyncOrchestrator::new(
            memory_store().await,
            Arc::new(Stalled),
            ConnectivityMonitor::new(true),
            clock,
            Duration::from_millis(20),
        );

        let report = orchestrator.sync_all().await.unwrap();
        assert_eq!(report.failed().len(), 4);
        assert_eq!(orchestrator.state(), SyncState::Idle);
    }
}
