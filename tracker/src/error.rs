//! Error types for the tracker
//!
//! All errors use thiserror for structured error handling.
//! They serialize to a plain message and map onto the HTTP error envelope.

use crate::database::{EntityKind, Frequency};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Habit {id} already completed this {}", period_name(.frequency))]
    AlreadyCompletedInPeriod { id: String, frequency: Frequency },

    #[error("Remote error ({status}): {message}")]
    Remote { status: u16, message: String },

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Scheduler error: {0}")]
    Scheduler(String),

    #[error("{0}")]
    Generic(String),
}

fn period_name(frequency: &Frequency) -> &'static str {
    match frequency {
        Frequency::Daily => "day",
        Frequency::Weekly => "week",
    }
}

impl AppError {
    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        AppError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(message.into())
    }

    /// HTTP status used when this error crosses the server boundary
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Validation(_)
            | AppError::AlreadyCompletedInPeriod { .. }
            | AppError::Serialization(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl serde::Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }

        let body = Json(serde_json::json!({
            "success": false,
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_serializes_as_message() {
        let err = AppError::AlreadyCompletedInPeriod {
            id: "h1".to_string(),
            frequency: Frequency::Weekly,
        };
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value, "Habit h1 already completed this week");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let missing = AppError::not_found(EntityKind::Task, "t1");
        assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);
    }
}
