//! Repository layer for database operations
//!
//! One `Collection<T>` per entity table, written once against the `Record`
//! trait. Writes are full-record upserts keyed by `id`: the caller computes
//! the merged value, the store persists it verbatim.

use super::models::*;
use crate::error::{AppError, Result};
use chrono::{DateTime, Utc};
use sqlx::{Encode, Sqlite, SqlitePool, Type};
use std::marker::PhantomData;

const META_COLUMNS: [&str; 4] = ["id", "created_at", "updated_at", "deleted"];

/// Which records a read returns
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Visibility {
    /// Hide soft-deleted records
    #[default]
    Active,
    IncludeDeleted,
}

impl Visibility {
    fn where_clause(self) -> &'static str {
        match self {
            Visibility::Active => "WHERE deleted = 0",
            Visibility::IncludeDeleted => "",
        }
    }
}

/// Durable store for every synced collection plus the sync watermarks
#[derive(Clone)]
pub struct RecordStore {
    pool: SqlitePool,
}

impl RecordStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn collection<T: Record>(&self) -> Collection<T> {
        Collection {
            pool: self.pool.clone(),
            _record: PhantomData,
        }
    }

    pub fn tasks(&self) -> Collection<Task> {
        self.collection()
    }

    pub fn notes(&self) -> Collection<Note> {
        self.collection()
    }

    pub fn habits(&self) -> Collection<Habit> {
        self.collection()
    }

    pub fn sessions(&self) -> Collection<Session> {
        self.collection()
    }

    /// Time of the last successful reconciliation for `kind`
    pub async fn watermark(&self, kind: EntityKind) -> Result<Option<DateTime<Utc>>> {
        let at = sqlx::query_scalar::<_, DateTime<Utc>>(
            "SELECT synced_at FROM sync_watermarks WHERE entity = ?",
        )
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(at)
    }

    pub async fn set_watermark(&self, kind: EntityKind, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_watermarks (entity, synced_at) VALUES (?, ?)
            ON CONFLICT(entity) DO UPDATE SET synced_at = excluded.synced_at
            "#,
        )
        .bind(kind.as_str())
        .bind(at)
        .execute(&self.pool)
        .await?;

        tracing::debug!("Advanced {} watermark to {}", kind, at);
        Ok(())
    }

    /// Forget every watermark so the next sync pulls everything
    pub async fn clear_watermarks(&self) -> Result<()> {
        sqlx::query("DELETE FROM sync_watermarks")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Typed access to one entity table
pub struct Collection<T> {
    pool: SqlitePool,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            _record: PhantomData,
        }
    }
}

impl<T: Record> Collection<T> {
    fn table(&self) -> &'static str {
        T::KIND.table()
    }

    fn upsert_sql() -> String {
        let columns: Vec<&str> = META_COLUMNS.iter().chain(T::FIELDS).copied().collect();
        let placeholders = vec!["?"; columns.len()].join(", ");
        let updates = columns
            .iter()
            .skip(1)
            .map(|c| format!("{c} = excluded.{c}"))
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT(id) DO UPDATE SET {}",
            T::KIND.table(),
            columns.join(", "),
            placeholders,
            updates
        )
    }

    /// All records in display order
    pub async fn get_all(&self, visibility: Visibility) -> Result<Vec<T>> {
        let sql = format!(
            "SELECT * FROM {} {} ORDER BY {}",
            self.table(),
            visibility.where_clause(),
            T::ORDER_BY
        );

        let records = sqlx::query_as::<_, T>(&sql).fetch_all(&self.pool).await?;
        Ok(records)
    }

    /// Point lookup; soft-deleted records are returned too
    pub async fn get_by_id(&self, id: &str) -> Result<T> {
        self.find(id)
            .await?
            .ok_or_else(|| AppError::not_found(T::KIND, id))
    }

    pub async fn find(&self, id: &str) -> Result<Option<T>> {
        let sql = format!("SELECT * FROM {} WHERE id = ?", self.table());
        let record = sqlx::query_as::<_, T>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(record)
    }

    /// Insert or replace by id, writing every column as given
    pub async fn put(&self, record: &T) -> Result<()> {
        record.validate()?;

        let sql = Self::upsert_sql();
        let meta = record.meta();
        let query = sqlx::query(&sql)
            .bind(&meta.id)
            .bind(meta.created_at)
            .bind(meta.updated_at)
            .bind(meta.deleted);

        record.bind_fields(query).execute(&self.pool).await?;

        tracing::debug!("Stored {} {}", T::KIND, meta.id);
        Ok(())
    }

    /// Put a batch of records in one transaction
    pub async fn put_all(&self, records: &[T]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let sql = Self::upsert_sql();
        let mut tx = self.pool.begin().await?;

        for record in records {
            record.validate()?;
            let meta = record.meta();
            let query = sqlx::query(&sql)
                .bind(&meta.id)
                .bind(meta.created_at)
                .bind(meta.updated_at)
                .bind(meta.deleted);
            record.bind_fields(query).execute(&mut *tx).await?;
        }

        tx.commit().await?;

        tracing::debug!("Stored {} {} records", records.len(), T::KIND);
        Ok(())
    }

    /// Remove a record for good. Not reconciled.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let sql = format!("DELETE FROM {} WHERE id = ?", self.table());
        let rows = sqlx::query(&sql)
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if rows == 0 {
            return Err(AppError::not_found(T::KIND, id));
        }

        tracing::debug!("Hard deleted {} {}", T::KIND, id);
        Ok(())
    }

    /// Active records whose indexed `field` equals `value`
    pub async fn find_by<V>(&self, field: &str, value: V) -> Result<Vec<T>>
    where
        V: for<'q> Encode<'q, Sqlite> + Type<Sqlite> + Send,
    {
        if !T::INDEXED.contains(&field) {
            return Err(AppError::validation(format!(
                "{} cannot be queried by \"{}\"",
                T::KIND,
                field
            )));
        }

        let sql = format!(
            "SELECT * FROM {} WHERE {} = ? AND deleted = 0 ORDER BY {}",
            self.table(),
            field,
            T::ORDER_BY
        );
        let records = sqlx::query_as::<_, T>(&sql)
            .bind(value)
            .fetch_all(&self.pool)
            .await?;

        Ok(records)
    }

    /// Every record, deleted or not, changed after `since`
    pub async fn updated_since(&self, since: Option<DateTime<Utc>>) -> Result<Vec<T>> {
        let records = match since {
            Some(at) => {
                let sql = format!(
                    "SELECT * FROM {} WHERE updated_at > ? ORDER BY updated_at ASC",
                    self.table()
                );
                sqlx::query_as::<_, T>(&sql)
                    .bind(at)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                let sql = format!("SELECT * FROM {} ORDER BY updated_at ASC", self.table());
                sqlx::query_as::<_, T>(&sql).fetch_all(&self.pool).await?
            }
        };

        Ok(records)
    }

    pub async fn count(&self, visibility: Visibility) -> Result<i64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} {}",
            self.table(),
            visibility.where_clause()
        );
        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(count)
    }

    /// Hard-delete soft-deleted records last changed at or before `through`,
    /// returning how many went
    pub async fn prune_deleted(&self, through: DateTime<Utc>) -> Result<u64> {
        let sql = format!(
            "DELETE FROM {} WHERE deleted = 1 AND updated_at <= ?",
            self.table()
        );
        let rows = sqlx::query(&sql)
            .bind(through)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if rows > 0 {
            tracing::info!("Pruned {} deleted {} records", rows, T::KIND);
        }
        Ok(rows)
    }

    /// Hard-delete the whole collection
    pub async fn clear(&self) -> Result<u64> {
        let sql = format!("DELETE FROM {}", self.table());
        let rows = sqlx::query(&sql).execute(&self.pool).await?.rows_affected();
        Ok(rows)
    }
}
