//! Focus sessions service
//!
//! Sessions are append-only: recording creates one, deleting flags it.

use super::{load_active, BestEffortPush};
use crate::database::{Collection, Record, RecordStore, Session, Visibility};
use crate::domain::focus::{self, FocusReport, TodaySummary};
use crate::domain::habits::CalendarPolicy;
use crate::domain::rules;
use crate::domain::SharedClock;
use crate::error::Result;
use chrono::{DateTime, Utc};

#[derive(Clone)]
pub struct SessionsService {
    sessions: Collection<Session>,
    clock: SharedClock,
    policy: CalendarPolicy,
    push: BestEffortPush,
}

impl SessionsService {
    pub fn new(
        store: &RecordStore,
        clock: SharedClock,
        policy: CalendarPolicy,
        push: BestEffortPush,
    ) -> Self {
        Self {
            sessions: store.sessions(),
            clock,
            policy,
            push,
        }
    }

    /// Record a finished session; `completed_at` defaults to now
    pub async fn record_session(
        &self,
        minutes: u32,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<Session> {
        let now = self.clock.now();
        let session = rules::new_session(minutes, completed_at.unwrap_or(now), now)?;
        tracing::info!("Recording {} minute focus session", minutes);

        self.sessions.put(&session).await?;
        self.push.record(&session).await;

        Ok(session)
    }

    pub async fn list_sessions(&self) -> Result<Vec<Session>> {
        self.sessions.get_all(Visibility::Active).await
    }

    pub async fn delete_session(&self, id: &str) -> Result<()> {
        let session = load_active(&self.sessions, id).await?;
        let deleted = rules::soft_delete(&session, self.clock.now());

        self.sessions.put(&deleted).await?;
        self.push.deletion(Session::KIND, id).await;

        Ok(())
    }

    pub async fn today(&self) -> Result<(Vec<Session>, TodaySummary)> {
        let sessions = self.list_sessions().await?;
        let (todays, summary) = focus::today_sessions(&sessions, self.clock.now(), &self.policy);
        Ok((todays.into_iter().cloned().collect(), summary))
    }

    pub async fn report(&self, days: u32) -> Result<FocusReport> {
        let sessions = self.list_sessions().await?;
        Ok(FocusReport::compute(
            &sessions,
            days,
            self.clock.now(),
            &self.policy,
        ))
    }
}
