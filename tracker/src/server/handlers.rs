//! HTTP handlers
//!
//! Thin adapters between axum extractors and the `Reconciler`. The entity
//! handlers are generic over `Record` and mounted once per collection.

use super::reconcile::Reconciler;
use crate::config::DEFAULT_STATS_DAYS;
use crate::database::{Habit, Note, Record, Session, Visibility};
use crate::domain::focus::FocusReport;
use crate::domain::HabitStats;
use crate::error::{AppError, Result};
use crate::remote::wire::{BatchSyncRequest, BatchSyncResponse, Envelope, HealthStatus, TodaySessions};
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

pub type SharedReconciler = Arc<Reconciler>;

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub include_deleted: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteParams {
    #[serde(default)]
    pub hard: bool,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Deserialize)]
pub struct StatsParams {
    pub days: Option<u32>,
}

pub async fn health(State(reconciler): State<SharedReconciler>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok".to_string(),
        timestamp: reconciler.now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub async fn list<T: Record>(
    State(reconciler): State<SharedReconciler>,
    Query(params): Query<ListParams>,
) -> Result<Json<Envelope<Vec<T>>>> {
    let visibility = if params.include_deleted {
        Visibility::IncludeDeleted
    } else {
        Visibility::Active
    };

    let records = reconciler.list::<T>(visibility).await?;
    Ok(Json(Envelope::ok(records)))
}

pub async fn fetch<T: Record>(
    State(reconciler): State<SharedReconciler>,
    Path(id): Path<String>,
) -> Result<Json<Envelope<T>>> {
    let record = reconciler.get::<T>(&id).await?;
    Ok(Json(Envelope::ok(record)))
}

pub async fn create<T: Record>(
    State(reconciler): State<SharedReconciler>,
    Json(record): Json<T>,
) -> Result<Json<Envelope<T>>> {
    let stored = reconciler.upsert(record).await?;
    Ok(Json(Envelope::ok(stored)))
}

pub async fn update<T: Record>(
    State(reconciler): State<SharedReconciler>,
    Path(id): Path<String>,
    Json(record): Json<T>,
) -> Result<Json<Envelope<T>>> {
    if record.id() != id {
        return Err(AppError::validation(format!(
            "Body id {} does not match path id {}",
            record.id(),
            id
        )));
    }

    let stored = reconciler.upsert(record).await?;
    Ok(Json(Envelope::ok(stored)))
}

pub async fn remove<T: Record>(
    State(reconciler): State<SharedReconciler>,
    Path(id): Path<String>,
    Query(params): Query<DeleteParams>,
) -> Result<Json<Envelope<T>>> {
    let removed = reconciler.delete::<T>(&id, params.hard).await?;
    let message = if params.hard {
        format!("{} {} permanently deleted", T::KIND, id)
    } else {
        format!("{} {} deleted", T::KIND, id)
    };

    Ok(Json(Envelope {
        success: true,
        data: removed,
        message: Some(message),
        error: None,
    }))
}

/// `POST /api/<entity>/sync/batch`
///
/// The body is decoded by hand so a malformed envelope gets the JSON error
/// shape rather than the extractor's plain-text rejection.
pub async fn batch_sync<T: Record>(
    State(reconciler): State<SharedReconciler>,
    Json(body): Json<Value>,
) -> Result<Json<BatchSyncResponse<T>>> {
    let request: BatchSyncRequest<Value> = serde_json::from_value(body)
        .map_err(|e| AppError::validation(format!("{} batch must be an array: {}", T::KIND, e)))?;

    let response = reconciler.reconcile::<T>(request).await?;
    Ok(Json(response))
}

pub async fn complete_habit(
    State(reconciler): State<SharedReconciler>,
    Path(id): Path<String>,
) -> Result<Json<Envelope<Habit>>> {
    let habit = reconciler.complete_habit(&id).await?;
    Ok(Json(Envelope::ok(habit).with_message("Habit completed")))
}

pub async fn reset_habit(
    State(reconciler): State<SharedReconciler>,
    Path(id): Path<String>,
) -> Result<Json<Envelope<Habit>>> {
    let habit = reconciler.reset_habit(&id).await?;
    Ok(Json(Envelope::ok(habit).with_message("Habit streak reset")))
}

pub async fn habit_stats(
    State(reconciler): State<SharedReconciler>,
) -> Result<Json<Envelope<HabitStats>>> {
    Ok(Json(Envelope::ok(reconciler.habit_stats().await?)))
}

pub async fn search_notes(
    State(reconciler): State<SharedReconciler>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Envelope<Vec<Note>>>> {
    let notes = reconciler.search_notes(&params.q).await?;
    Ok(Json(Envelope::ok(notes)))
}

pub async fn today_sessions(
    State(reconciler): State<SharedReconciler>,
) -> Result<Json<Envelope<TodaySessions<Session>>>> {
    Ok(Json(Envelope::ok(reconciler.today_sessions().await?)))
}

pub async fn focus_stats(
    State(reconciler): State<SharedReconciler>,
    Query(params): Query<StatsParams>,
) -> Result<Json<Envelope<FocusReport>>> {
    let days = params.days.filter(|d| *d > 0).unwrap_or(DEFAULT_STATS_DAYS);
    Ok(Json(Envelope::ok(reconciler.focus_report(days).await?)))
}
