//! Authoritative side of the sync protocol
//!
//! The reconciler owns the server's record store. Every server write goes
//! through a single gate that also hands out timestamps, so stamps are
//! strictly increasing and a batch's `syncTime` never trails a record it
//! wrote.

use crate::database::{Habit, Note, Record, RecordStore, Session, Visibility};
use crate::domain::focus::{self, FocusReport};
use crate::domain::{habits, rules, CalendarPolicy, HabitStats, SharedClock};
use crate::error::{AppError, Result};
use crate::remote::wire::{
    BatchSyncRequest, BatchSyncResponse, Conflict, RecordError, SyncResults, TodaySessions,
};
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use tokio::sync::{Mutex, MutexGuard};

/// What happened to one submitted record
#[derive(Debug)]
enum Outcome<T> {
    Created(String),
    Updated(String),
    Unchanged(String),
    Conflict(Conflict<T>),
}

pub struct Reconciler {
    store: RecordStore,
    clock: SharedClock,
    policy: CalendarPolicy,
    /// Last timestamp handed out; holding the lock serializes writes
    gate: Mutex<DateTime<Utc>>,
}

impl Reconciler {
    pub fn new(store: RecordStore, clock: SharedClock, policy: CalendarPolicy) -> Self {
        Self {
            store,
            clock,
            policy,
            gate: Mutex::new(DateTime::<Utc>::MIN_UTC),
        }
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn policy(&self) -> &CalendarPolicy {
        &self.policy
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Take the write gate and the next server timestamp
    async fn begin_write(&self) -> (MutexGuard<'_, DateTime<Utc>>, DateTime<Utc>) {
        let mut last = self.gate.lock().await;
        let now = self.clock.now();
        let stamp = if now > *last {
            now
        } else {
            *last + Duration::milliseconds(1)
        };
        *last = stamp;
        (last, stamp)
    }

    /// Merge a client batch into the authoritative store.
    ///
    /// Records are processed in order. A record that fails to decode,
    /// validate or persist is reported in `results.errors` and skipped.
    pub async fn reconcile<T: Record>(
        &self,
        request: BatchSyncRequest<Value>,
    ) -> Result<BatchSyncResponse<T>> {
        let (_gate, now) = self.begin_write().await;
        let watermark = request.last_sync_time;
        let mut results = SyncResults::default();

        tracing::info!(
            "Reconciling {} {} records (watermark: {:?})",
            request.records.len(),
            T::KIND,
            watermark
        );

        for raw in request.records {
            let id = raw.get("id").and_then(Value::as_str).map(str::to_string);

            match self.apply_one::<T>(raw, watermark, now).await {
                Ok(Outcome::Created(id)) => results.created.push(id),
                Ok(Outcome::Updated(id)) => results.updated.push(id),
                Ok(Outcome::Unchanged(id)) => results.unchanged.push(id),
                Ok(Outcome::Conflict(conflict)) => results.conflicts.push(conflict),
                Err(e) => {
                    tracing::warn!("Skipping {} {:?}: {}", T::KIND, id, e);
                    results.errors.push(RecordError {
                        id,
                        error: e.to_string(),
                    });
                }
            }
        }

        let server_records = self.store.collection::<T>().updated_since(watermark).await?;

        tracing::info!(
            "Reconciled {}: {} created, {} updated, {} conflicts, {} errors, {} returned",
            T::KIND,
            results.created.len(),
            results.updated.len(),
            results.conflicts.len(),
            results.errors.len(),
            server_records.len()
        );

        Ok(BatchSyncResponse {
            success: true,
            results,
            server_records,
            sync_time: now,
        })
    }

    async fn apply_one<T: Record>(
        &self,
        raw: Value,
        watermark: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Outcome<T>> {
        let mut incoming: T = serde_json::from_value(raw)?;
        incoming.validate()?;

        let collection = self.store.collection::<T>();
        let id = incoming.id().to_string();

        let Some(stored) = collection.find(&id).await? else {
            incoming.meta_mut().updated_at = now;
            collection.put(&incoming).await?;
            return Ok(Outcome::Created(id));
        };

        let mut merged = stored.clone();
        merged.merge_from(incoming);
        if merged == stored {
            return Ok(Outcome::Unchanged(id));
        }

        let server_is_newer = watermark.map_or(true, |w| stored.meta().updated_at > w);
        if server_is_newer {
            tracing::debug!("Conflict on {} {}: server wins", T::KIND, id);
            return Ok(Outcome::Conflict(Conflict {
                id,
                server_data: stored,
            }));
        }

        merged.meta_mut().updated_at = now;
        collection.put(&merged).await?;
        Ok(Outcome::Updated(id))
    }

    // ===== Non-batch operations =====

    pub async fn list<T: Record>(&self, visibility: Visibility) -> Result<Vec<T>> {
        self.store.collection::<T>().get_all(visibility).await
    }

    pub async fn get<T: Record>(&self, id: &str) -> Result<T> {
        self.store.collection::<T>().get_by_id(id).await
    }

    /// Create or update one record by id, stamped with server time.
    ///
    /// Pushing the same value twice leaves the store as one push would.
    pub async fn upsert<T: Record>(&self, mut incoming: T) -> Result<T> {
        incoming.validate()?;
        let (_gate, now) = self.begin_write().await;
        let collection = self.store.collection::<T>();

        let next = match collection.find(incoming.id()).await? {
            None => {
                incoming.meta_mut().updated_at = now;
                incoming
            }
            Some(stored) => {
                let mut merged = stored.clone();
                merged.merge_from(incoming);
                if merged == stored {
                    return Ok(stored);
                }
                merged.meta_mut().updated_at = now;
                merged
            }
        };

        collection.put(&next).await?;
        Ok(next)
    }

    /// Soft delete by default; `hard` removes the row
    pub async fn delete<T: Record>(&self, id: &str, hard: bool) -> Result<Option<T>> {
        let (_gate, now) = self.begin_write().await;
        let collection = self.store.collection::<T>();

        if hard {
            collection.delete(id).await?;
            return Ok(None);
        }

        let stored = collection.get_by_id(id).await?;
        if stored.is_deleted() {
            return Ok(Some(stored));
        }

        let deleted = rules::soft_delete(&stored, now);
        collection.put(&deleted).await?;
        Ok(Some(deleted))
    }

    async fn active_habit(&self, id: &str) -> Result<Habit> {
        let habit = self.store.habits().get_by_id(id).await?;
        if habit.is_deleted() {
            return Err(AppError::not_found(Habit::KIND, id));
        }
        Ok(habit)
    }

    pub async fn complete_habit(&self, id: &str) -> Result<Habit> {
        let (_gate, now) = self.begin_write().await;
        let habit = self.active_habit(id).await?;

        let completed = habits::complete(&habit, now, &self.policy)?;
        self.store.habits().put(&completed).await?;

        tracing::info!("Completed habit {} (streak {})", id, completed.streak);
        Ok(completed)
    }

    pub async fn reset_habit(&self, id: &str) -> Result<Habit> {
        let (_gate, now) = self.begin_write().await;
        let habit = self.active_habit(id).await?;

        let cleared = habits::reset(&habit, now);
        self.store.habits().put(&cleared).await?;
        Ok(cleared)
    }

    pub async fn habit_stats(&self) -> Result<HabitStats> {
        let habits = self.store.habits().get_all(Visibility::Active).await?;
        Ok(HabitStats::compute(&habits, self.clock.now(), &self.policy))
    }

    pub async fn search_notes(&self, query: &str) -> Result<Vec<Note>> {
        if query.trim().is_empty() {
            return Err(AppError::validation("Search query is required"));
        }

        let notes = self.store.notes().get_all(Visibility::Active).await?;
        Ok(notes
            .into_iter()
            .filter(|n| rules::note_matches(n, query))
            .collect())
    }

    pub async fn today_sessions(&self) -> Result<TodaySessions<Session>> {
        let sessions = self.store.sessions().get_all(Visibility::Active).await?;
        let (todays, summary) = focus::today_sessions(&sessions, self.clock.now(), &self.policy);

        Ok(TodaySessions {
            sessions: todays.into_iter().cloned().collect(),
            summary,
        })
    }

    pub async fn focus_report(&self, days: u32) -> Result<FocusReport> {
        let sessions = self.store.sessions().get_all(Visibility::Active).await?;
        Ok(FocusReport::compute(
            &sessions,
            days,
            self.clock.now(),
            &self.policy,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{create_memory_pool, Frequency, Priority, RecordMeta, Task};
    use crate::domain::ManualClock;
    use chrono::TimeZone;
    use serde_json::json;
    use std::sync::Arc;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 6, 9, 0, 0).unwrap()
    }

    async fn setup() -> (Reconciler, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(t0()));
        let store = RecordStore::new(create_memory_pool().await.unwrap());
        let reconciler = Reconciler::new(store, clock.clone(), CalendarPolicy::default());
        (reconciler, clock)
    }

    fn task(id: &str, title: &str, updated_at: DateTime<Utc>) -> Task {
        Task {
            meta: RecordMeta {
                id: id.to_string(),
                created_at: updated_at,
                updated_at,
                deleted: false,
            },
            title: title.to_string(),
            description: String::new(),
            priority: Priority::Medium,
            deadline: None,
            completed: false,
        }
    }

    fn batch<T: serde::Serialize>(
        records: &[T],
        watermark: Option<DateTime<Utc>>,
    ) -> BatchSyncRequest<Value> {
        BatchSyncRequest {
            records: records
                .iter()
                .map(|r| serde_json::to_value(r).unwrap())
                .collect(),
            last_sync_time: watermark,
        }
    }

    #[tokio::test]
    async fn test_new_records_are_created_and_returned() {
        let (reconciler, _) = setup().await;
        let a = task("a", "First", t0());

        let response = reconciler
            .reconcile::<Task>(batch(&[a.clone()], None))
            .await
            .unwrap();

        assert_eq!(response.results.created, vec!["a"]);
        assert_eq!(response.server_records.len(), 1);
        assert_eq!(response.server_records[0].title, "First");
        assert_eq!(response.server_records[0].meta.updated_at, response.sync_time);
    }

    #[tokio::test]
    async fn test_stale_client_loses_conflict() {
        let (reconciler, clock) = setup().await;
        let watermark = t0();

        // Server copy changed after the client's watermark
        clock.advance(Duration::minutes(5));
        reconciler.upsert(task("n", "Server title", t0())).await.unwrap();

        clock.advance(Duration::minutes(5));
        let client = task("n", "Client title", t0() - Duration::hours(1));
        let response = reconciler
            .reconcile::<Task>(batch(&[client], Some(watermark)))
            .await
            .unwrap();

        assert!(response.results.updated.is_empty());
        assert_eq!(response.results.conflicts.len(), 1);
        assert_eq!(response.results.conflicts[0].server_data.title, "Server title");
        assert_eq!(response.server_records[0].title, "Server title");

        let stored = reconciler.get::<Task>("n").await.unwrap();
        assert_eq!(stored.title, "Server title");
    }

    #[tokio::test]
    async fn test_client_with_fresh_watermark_overwrites() {
        let (reconciler, clock) = setup().await;
        let first = reconciler
            .reconcile::<Task>(batch(&[task("x", "v1", t0())], None))
            .await
            .unwrap();

        clock.advance(Duration::minutes(1));
        let mut edited = first.server_records[0].clone();
        edited.title = "v2".to_string();
        let second = reconciler
            .reconcile::<Task>(batch(&[edited], Some(first.sync_time)))
            .await
            .unwrap();

        assert_eq!(second.results.updated, vec!["x"]);
        assert_eq!(second.server_records.len(), 1);
        let stored = reconciler.get::<Task>("x").await.unwrap();
        assert_eq!(stored.title, "v2");
        assert_eq!(stored.meta.updated_at, second.sync_time);
        assert!(second.sync_time > first.sync_time);
    }

    #[tokio::test]
    async fn test_resubmitting_same_value_is_unchanged() {
        let (reconciler, _) = setup().await;
        let first = reconciler
            .reconcile::<Task>(batch(&[task("x", "same", t0())], None))
            .await
            .unwrap();

        // Even with a stale watermark an identical value is not a conflict
        let again = reconciler
            .reconcile::<Task>(batch(&first.server_records, None))
            .await
            .unwrap();
        assert_eq!(again.results.unchanged, vec!["x"]);
        assert!(again.results.conflicts.is_empty());

        let stored = reconciler.get::<Task>("x").await.unwrap();
        assert_eq!(stored.meta.updated_at, first.sync_time);
    }

    #[tokio::test]
    async fn test_identical_value_against_newer_server_copy_is_unchanged() {
        let (reconciler, clock) = setup().await;
        let first = reconciler
            .reconcile::<Task>(batch(&[task("x", "v1", t0())], None))
            .await
            .unwrap();

        // Another device moves the server copy past this client's watermark
        clock.advance(Duration::minutes(1));
        let mut other = first.server_records[0].clone();
        other.title = "v2".to_string();
        let moved = reconciler
            .reconcile::<Task>(batch(&[other.clone()], Some(first.sync_time)))
            .await
            .unwrap();
        assert_eq!(moved.results.updated, vec!["x"]);

        // This client made the same edit offline
        clock.advance(Duration::minutes(1));
        let response = reconciler
            .reconcile::<Task>(batch(&[other], Some(first.sync_time)))
            .await
            .unwrap();
        assert_eq!(response.results.unchanged, vec!["x"]);
        assert!(response.results.conflicts.is_empty());
        assert_eq!(response.server_records.len(), 1);

        let stored = reconciler.get::<Task>("x").await.unwrap();
        assert_eq!(stored.meta.updated_at, moved.sync_time);
    }

    #[tokio::test]
    async fn test_bad_record_does_not_abort_batch() {
        let (reconciler, _) = setup().await;
        let good = serde_json::to_value(task("ok", "Fine", t0())).unwrap();
        let request = BatchSyncRequest {
            records: vec![
                json!({ "id": "bad", "title": "Missing timestamps" }),
                serde_json::to_value(task("empty", "", t0())).unwrap(),
                good,
            ],
            last_sync_time: None,
        };

        let response = reconciler.reconcile::<Task>(request).await.unwrap();
        assert_eq!(response.results.created, vec!["ok"]);
        assert_eq!(response.results.errors.len(), 2);
        assert_eq!(response.results.errors[0].id.as_deref(), Some("bad"));
        assert_eq!(response.server_records.len(), 1);
    }

    #[tokio::test]
    async fn test_session_fields_are_immutable() {
        let (reconciler, clock) = setup().await;
        let session = Session {
            meta: RecordMeta::new(t0()),
            minutes: 25,
            completed_at: t0(),
        };
        let first = reconciler
            .reconcile::<Session>(batch(&[session.clone()], None))
            .await
            .unwrap();

        clock.advance(Duration::minutes(1));
        let mut edited = first.server_records[0].clone();
        edited.minutes = 90;
        let second = reconciler
            .reconcile::<Session>(batch(&[edited.clone()], Some(first.sync_time)))
            .await
            .unwrap();
        assert_eq!(second.results.unchanged.len(), 1);

        edited.meta.deleted = true;
        let third = reconciler
            .reconcile::<Session>(batch(&[edited], Some(second.sync_time)))
            .await
            .unwrap();
        assert_eq!(third.results.updated.len(), 1);

        let stored = reconciler.get::<Session>(&session.meta.id).await.unwrap();
        assert_eq!(stored.minutes, 25);
        assert!(stored.meta.deleted);
    }

    #[tokio::test]
    async fn test_stamps_increase_under_a_frozen_clock() {
        let (reconciler, _) = setup().await;
        let a = reconciler.upsert(task("a", "A", t0())).await.unwrap();
        let b = reconciler.upsert(task("b", "B", t0())).await.unwrap();
        assert!(b.meta.updated_at > a.meta.updated_at);
    }

    #[tokio::test]
    async fn test_soft_delete_then_hard_delete() {
        let (reconciler, _) = setup().await;
        reconciler.upsert(task("d", "Doomed", t0())).await.unwrap();

        let soft = reconciler.delete::<Task>("d", false).await.unwrap().unwrap();
        assert!(soft.meta.deleted);
        assert!(reconciler.list::<Task>(Visibility::Active).await.unwrap().is_empty());
        assert_eq!(
            reconciler.list::<Task>(Visibility::IncludeDeleted).await.unwrap().len(),
            1
        );

        assert!(reconciler.delete::<Task>("d", true).await.unwrap().is_none());
        assert!(reconciler.get::<Task>("d").await.is_err());
    }

    #[tokio::test]
    async fn test_complete_habit_on_server_clock() {
        let (reconciler, clock) = setup().await;
        let habit = Habit {
            meta: RecordMeta::new(t0()),
            name: "Stretch".to_string(),
            frequency: Frequency::Daily,
            streak: 0,
            last_completed: None,
        };
        let id = habit.meta.id.clone();
        reconciler.upsert(habit).await.unwrap();

        let done = reconciler.complete_habit(&id).await.unwrap();
        assert_eq!(done.streak, 1);

        clock.advance(Duration::hours(2));
        let err = reconciler.complete_habit(&id).await.unwrap_err();
        assert!(matches!(err, AppError::AlreadyCompletedInPeriod { .. }));

        clock.advance(Duration::hours(22));
        assert_eq!(reconciler.complete_habit(&id).await.unwrap().streak, 2);

        let stats = reconciler.habit_stats().await.unwrap();
        assert_eq!(stats.longest_streak, 2);

        let cleared = reconciler.reset_habit(&id).await.unwrap();
        assert_eq!(cleared.streak, 0);
        assert_eq!(cleared.last_completed, None);
    }
}
