//! Database models
//!
//! Rust structs for the four synced collections. Every entity carries the
//! same `RecordMeta` header, flattened into both its JSON form and its row.

use crate::domain::rules;
use crate::error::{AppError, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{FromRow, Sqlite};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

/// The synced collections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Task,
    Note,
    Habit,
    Session,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Task,
        EntityKind::Note,
        EntityKind::Habit,
        EntityKind::Session,
    ];

    /// Table holding this collection
    pub fn table(self) -> &'static str {
        match self {
            EntityKind::Task => "tasks",
            EntityKind::Note => "notes",
            EntityKind::Habit => "habits",
            EntityKind::Session => "pomodoro_sessions",
        }
    }

    /// URL segment under the API prefix
    pub fn route(self) -> &'static str {
        match self {
            EntityKind::Task => "tasks",
            EntityKind::Note => "notes",
            EntityKind::Habit => "habits",
            EntityKind::Session => "pomodoro",
        }
    }

    /// Key of the pulled records in a batch sync response
    pub fn server_records_key(self) -> &'static str {
        match self {
            EntityKind::Task => "serverTasks",
            EntityKind::Note => "serverNotes",
            EntityKind::Habit => "serverHabits",
            EntityKind::Session => "serverSessions",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Task => "task",
            EntityKind::Note => "note",
            EntityKind::Habit => "habit",
            EntityKind::Session => "session",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "task" | "tasks" => Ok(EntityKind::Task),
            "note" | "notes" => Ok(EntityKind::Note),
            "habit" | "habits" => Ok(EntityKind::Habit),
            "session" | "sessions" | "pomodoro" => Ok(EntityKind::Session),
            other => Err(AppError::validation(format!("Unknown entity type: {}", other))),
        }
    }
}

/// Fields shared by every record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct RecordMeta {
    /// Client-generated, stable across the whole lifecycle
    pub id: String,
    pub created_at: DateTime<Utc>,
    /// Sole basis of conflict detection; never moves backwards
    pub updated_at: DateTime<Utc>,
    /// Soft-delete flag
    #[serde(default)]
    pub deleted: bool,
}

impl RecordMeta {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            deleted: false,
        }
    }

    /// Refresh `updated_at` after a visible change, keeping it monotonic
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.updated_at {
            self.updated_at = now;
        }
    }
}

/// Behaviour every synced entity shares.
///
/// The store and the reconciler are written once against this trait.
pub trait Record:
    Clone
    + PartialEq
    + std::fmt::Debug
    + Send
    + Sync
    + Unpin
    + Serialize
    + DeserializeOwned
    + for<'r> FromRow<'r, SqliteRow>
    + 'static
{
    const KIND: EntityKind;

    /// Entity-specific columns, in the order `bind_fields` binds them
    const FIELDS: &'static [&'static str];

    /// Columns accepted by `Collection::find_by`
    const INDEXED: &'static [&'static str];

    /// ORDER BY clause for collection scans
    const ORDER_BY: &'static str;

    fn meta(&self) -> &RecordMeta;

    fn meta_mut(&mut self) -> &mut RecordMeta;

    fn bind_fields<'q>(&'q self, query: SqliteQuery<'q>) -> SqliteQuery<'q>;

    /// Reject values that must never reach a store
    fn validate(&self) -> Result<()>;

    /// Take the client-mutable fields of `incoming`, keeping identity
    fn merge_from(&mut self, incoming: Self);

    fn id(&self) -> &str {
        &self.meta().id
    }

    fn is_deleted(&self) -> bool {
        self.meta().deleted
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl FromStr for Priority {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            other => Err(AppError::validation(format!(
                "Priority must be \"low\", \"medium\" or \"high\", got \"{}\"",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Frequency {
    #[default]
    Daily,
    Weekly,
}

impl FromStr for Frequency {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "daily" => Ok(Frequency::Daily),
            "weekly" => Ok(Frequency::Weekly),
            other => Err(AppError::validation(format!(
                "Frequency must be \"daily\" or \"weekly\", got \"{}\"",
                other
            ))),
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frequency::Daily => f.write_str("daily"),
            Frequency::Weekly => f.write_str("weekly"),
        }
    }
}

/// A to-do item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Task {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub meta: RecordMeta,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed: bool,
}

impl Record for Task {
    const KIND: EntityKind = EntityKind::Task;
    const FIELDS: &'static [&'static str] =
        &["title", "description", "priority", "deadline", "completed"];
    const INDEXED: &'static [&'static str] = &["priority", "completed"];
    const ORDER_BY: &'static str = "created_at DESC";

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta {
        &mut self.meta
    }

    fn bind_fields<'q>(&'q self, query: SqliteQuery<'q>) -> SqliteQuery<'q> {
        query
            .bind(&self.title)
            .bind(&self.description)
            .bind(self.priority)
            .bind(self.deadline)
            .bind(self.completed)
    }

    fn validate(&self) -> Result<()> {
        rules::validate_meta(&self.meta)?;
        rules::validate_title("Task title", &self.title)
    }

    fn merge_from(&mut self, incoming: Self) {
        self.title = incoming.title;
        self.description = incoming.description;
        self.priority = incoming.priority;
        self.deadline = incoming.deadline;
        self.completed = incoming.completed;
        self.meta.deleted = incoming.meta.deleted;
    }
}

/// A free-text note with tags
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Note {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub meta: RecordMeta,
    pub title: String,
    #[serde(default)]
    pub content: String,
    /// Insertion order is kept for display; matching ignores it
    #[serde(default)]
    #[sqlx(json)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub pinned: bool,
}

impl Record for Note {
    const KIND: EntityKind = EntityKind::Note;
    const FIELDS: &'static [&'static str] = &["title", "content", "tags", "pinned"];
    const INDEXED: &'static [&'static str] = &["pinned"];
    const ORDER_BY: &'static str = "pinned DESC, updated_at DESC";

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta {
        &mut self.meta
    }

    fn bind_fields<'q>(&'q self, query: SqliteQuery<'q>) -> SqliteQuery<'q> {
        query
            .bind(&self.title)
            .bind(&self.content)
            .bind(sqlx::types::Json(&self.tags))
            .bind(self.pinned)
    }

    fn validate(&self) -> Result<()> {
        rules::validate_meta(&self.meta)?;
        rules::validate_title("Note title", &self.title)?;
        rules::validate_tags(&self.tags)
    }

    fn merge_from(&mut self, incoming: Self) {
        self.title = incoming.title;
        self.content = incoming.content;
        self.tags = incoming.tags;
        self.pinned = incoming.pinned;
        self.meta.deleted = incoming.meta.deleted;
    }
}

/// A recurring habit and its streak
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Habit {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub meta: RecordMeta,
    pub name: String,
    #[serde(default)]
    pub frequency: Frequency,
    /// Moves only together with `last_completed`
    #[serde(default)]
    pub streak: u32,
    #[serde(default)]
    pub last_completed: Option<DateTime<Utc>>,
}

impl Record for Habit {
    const KIND: EntityKind = EntityKind::Habit;
    const FIELDS: &'static [&'static str] = &["name", "frequency", "streak", "last_completed"];
    const INDEXED: &'static [&'static str] = &["frequency"];
    const ORDER_BY: &'static str = "streak DESC, created_at DESC";

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta {
        &mut self.meta
    }

    fn bind_fields<'q>(&'q self, query: SqliteQuery<'q>) -> SqliteQuery<'q> {
        query
            .bind(&self.name)
            .bind(self.frequency)
            .bind(self.streak)
            .bind(self.last_completed)
    }

    fn validate(&self) -> Result<()> {
        rules::validate_meta(&self.meta)?;
        rules::validate_title("Habit name", &self.name)?;
        if self.streak > 0 && self.last_completed.is_none() {
            return Err(AppError::validation(
                "Habit with a streak must have a last completion",
            ));
        }
        Ok(())
    }

    fn merge_from(&mut self, incoming: Self) {
        self.name = incoming.name;
        self.frequency = incoming.frequency;
        self.streak = incoming.streak;
        self.last_completed = incoming.last_completed;
        self.meta.deleted = incoming.meta.deleted;
    }
}

/// A finished focus (pomodoro) session. Immutable apart from deletion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Session {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub meta: RecordMeta,
    pub minutes: u32,
    pub completed_at: DateTime<Utc>,
}

impl Record for Session {
    const KIND: EntityKind = EntityKind::Session;
    const FIELDS: &'static [&'static str] = &["minutes", "completed_at"];
    const INDEXED: &'static [&'static str] = &[];
    const ORDER_BY: &'static str = "completed_at DESC";

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta {
        &mut self.meta
    }

    fn bind_fields<'q>(&'q self, query: SqliteQuery<'q>) -> SqliteQuery<'q> {
        query.bind(self.minutes).bind(self.completed_at)
    }

    fn validate(&self) -> Result<()> {
        rules::validate_meta(&self.meta)?;
        rules::validate_minutes(self.minutes)
    }

    fn merge_from(&mut self, incoming: Self) {
        self.meta.deleted = incoming.meta.deleted;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_note_json_is_flat() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let note = Note {
            meta: RecordMeta {
                id: "n-1".to_string(),
                created_at: at,
                updated_at: at,
                deleted: false,
            },
            title: "Groceries".to_string(),
            content: "milk".to_string(),
            tags: vec!["home".to_string(), "errands".to_string()],
            pinned: true,
        };

        let value = serde_json::to_value(&note).unwrap();
        assert_eq!(value["id"], "n-1");
        assert_eq!(value["deleted"], false);
        assert_eq!(value["tags"][1], "errands");
        assert!(value.get("meta").is_none());
    }

    #[test]
    fn test_unknown_fields_are_dropped_and_defaults_applied() {
        let value = serde_json::json!({
            "id": "t-1",
            "created_at": "2024-03-01T09:00:00Z",
            "updated_at": "2024-03-01T09:00:00Z",
            "title": "Write report",
            "user_id": "someone",
        });

        let task: Task = serde_json::from_value(value).unwrap();
        assert_eq!(task.priority, Priority::Medium);
        assert!(!task.completed);
        assert!(!task.meta.deleted);
    }

    #[test]
    fn test_invalid_enum_value_is_rejected() {
        assert!("urgent".parse::<Priority>().is_err());
        assert_eq!("Weekly".parse::<Frequency>().unwrap(), Frequency::Weekly);
        assert_eq!("pomodoro".parse::<EntityKind>().unwrap(), EntityKind::Session);

        let value = serde_json::json!({
            "id": "h-1",
            "created_at": "2024-03-01T09:00:00Z",
            "updated_at": "2024-03-01T09:00:00Z",
            "name": "Stretch",
            "frequency": "hourly",
        });
        assert!(serde_json::from_value::<Habit>(value).is_err());
    }

    #[test]
    fn test_session_merge_only_takes_deletion() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let mut stored = Session {
            meta: RecordMeta::new(at),
            minutes: 25,
            completed_at: at,
        };
        let mut incoming = stored.clone();
        incoming.minutes = 50;
        incoming.meta.deleted = true;

        stored.merge_from(incoming);
        assert_eq!(stored.minutes, 25);
        assert!(stored.meta.deleted);
    }

    #[test]
    fn test_touch_never_moves_backwards() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let mut meta = RecordMeta::new(at);
        meta.touch(at - chrono::Duration::hours(1));
        assert_eq!(meta.updated_at, at);
        meta.touch(at + chrono::Duration::hours(1));
        assert_eq!(meta.updated_at, at + chrono::Duration::hours(1));
    }
}
