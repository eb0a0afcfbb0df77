//! The batch call the orchestrator depends on

use crate::database::Record;
use crate::error::Result;
use crate::remote::{BatchSyncRequest, BatchSyncResponse, RemoteClient};
use crate::server::Reconciler;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Something that can reconcile a batch of `T` against the server copy
#[async_trait]
pub trait SyncTransport: Send + Sync + 'static {
    async fn batch_sync<T: Record>(
        &self,
        records: Vec<T>,
        last_sync_time: Option<DateTime<Utc>>,
    ) -> Result<BatchSyncResponse<T>>;
}

/// Over HTTP
#[async_trait]
impl SyncTransport for RemoteClient {
    async fn batch_sync<T: Record>(
        &self,
        records: Vec<T>,
        last_sync_time: Option<DateTime<Utc>>,
    ) -> Result<BatchSyncResponse<T>> {
        RemoteClient::batch_sync(self, &records, last_sync_time).await
    }
}

/// In process, through the same decode path the HTTP handler uses
#[async_trait]
impl SyncTransport for Reconciler {
    async fn batch_sync<T: Record>(
        &self,
        records: Vec<T>,
        last_sync_time: Option<DateTime<Utc>>,
    ) -> Result<BatchSyncResponse<T>> {
        let records = records
            .iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        self.reconcile::<T>(BatchSyncRequest {
            records,
            last_sync_time,
        })
        .await
    }
}

#[async_trait]
impl<S: SyncTransport> SyncTransport for Arc<S> {
    async fn batch_sync<T: Record>(
        &self,
        records: Vec<T>,
        last_sync_time: Option<DateTime<Utc>>,
    ) -> Result<BatchSyncResponse<T>> {
        SyncTransport::batch_sync(&**self, records, last_sync_time).await
    }
}
