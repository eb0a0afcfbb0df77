//! HTTP client for the reconciliation server

pub mod wire;

pub use wire::{
    BatchSyncRequest, BatchSyncResponse, Conflict, Envelope, HealthStatus, RecordError,
    SyncResults,
};

use crate::config::API_PREFIX;
use crate::database::{EntityKind, Habit, Record};
use crate::error::{AppError, Result};
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;

#[derive(Clone)]
pub struct RemoteClient {
    http: Client,
    base_url: String,
    timeout: Duration,
}

impl RemoteClient {
    /// Client for `base_url` (scheme, host and port; no API prefix)
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();

        Ok(Self {
            http,
            base_url,
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn api_url(&self, kind: EntityKind, path: &str) -> String {
        format!("{}{}/{}{}", self.base_url, API_PREFIX, kind.route(), path)
    }

    /// Liveness probe with its own, usually shorter, timeout
    pub async fn health(&self, timeout: Duration) -> Result<HealthStatus> {
        let request = self
            .http
            .get(format!("{}/health", self.base_url))
            .timeout(timeout);
        let response = self.send(request, timeout).await?;
        let status = Self::check_status(response).await?;
        Ok(status.json().await?)
    }

    /// Submit the full local collection of `T` with the caller's watermark
    pub async fn batch_sync<T: Record>(
        &self,
        records: &[T],
        last_sync_time: Option<DateTime<Utc>>,
    ) -> Result<BatchSyncResponse<T>> {
        let body = BatchSyncRequest {
            records: records.iter().collect::<Vec<&T>>(),
            last_sync_time,
        };

        tracing::debug!(
            "Sending {} {} records to {}",
            records.len(),
            T::KIND,
            self.base_url
        );

        let request = self
            .http
            .post(self.api_url(T::KIND, "/sync/batch"))
            .json(&body);
        let response = self.send(request, self.timeout).await?;
        let response = Self::check_status(response).await?;
        Ok(response.json().await?)
    }

    /// Idempotent create-or-update of one record
    pub async fn upsert<T: Record>(&self, record: &T) -> Result<T> {
        let path = format!("/{}", record.id());
        let request = self.http.put(self.api_url(T::KIND, &path)).json(record);
        self.envelope(request).await
    }

    pub async fn get<T: Record>(&self, id: &str) -> Result<T> {
        let request = self.http.get(self.api_url(T::KIND, &format!("/{}", id)));
        self.envelope(request).await
    }

    /// Soft delete, or remove outright when `hard`
    pub async fn delete(&self, kind: EntityKind, id: &str, hard: bool) -> Result<()> {
        let request = self
            .http
            .delete(self.api_url(kind, &format!("/{}", id)))
            .query(&[("hard", hard)]);
        let response = self.send(request, self.timeout).await?;
        Self::check_status(response).await?;
        Ok(())
    }

    pub async fn complete_habit(&self, id: &str) -> Result<Habit> {
        let request = self
            .http
            .post(self.api_url(EntityKind::Habit, &format!("/{}/complete", id)));
        self.envelope(request).await
    }

    pub async fn reset_habit(&self, id: &str) -> Result<Habit> {
        let request = self
            .http
            .post(self.api_url(EntityKind::Habit, &format!("/{}/reset", id)));
        self.envelope(request).await
    }

    async fn send(&self, request: RequestBuilder, timeout: Duration) -> Result<Response> {
        request.send().await.map_err(|e| {
            if e.is_timeout() {
                AppError::Timeout(timeout)
            } else {
                AppError::Http(e)
            }
        })
    }

    async fn envelope<R: DeserializeOwned>(&self, request: RequestBuilder) -> Result<R> {
        let response = self.send(request, self.timeout).await?;
        let response = Self::check_status(response).await?;
        let envelope: Envelope<R> = response.json().await?;

        envelope
            .data
            .ok_or_else(|| AppError::Generic("Response carried no data".to_string()))
    }

    /// Turn a non-2xx response into `AppError::Remote` with the server's message
    async fn check_status(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Envelope<serde_json::Value>>(&text)
            .ok()
            .and_then(|e| e.error)
            .unwrap_or(text);

        Err(AppError::Remote {
            status: status.as_u16(),
            message,
        })
    }
}
