//! Best-effort push of single local writes
//!
//! A local write is already durable when the push runs. The push only
//! shortens the time until the server sees it; whatever it misses, the
//! next full sync carries.

use crate::database::{EntityKind, Record};
use crate::remote::RemoteClient;
use crate::sync::ConnectivityMonitor;

#[derive(Clone)]
pub struct BestEffortPush {
    client: Option<RemoteClient>,
    connectivity: ConnectivityMonitor,
}

impl BestEffortPush {
    pub fn new(client: RemoteClient, connectivity: ConnectivityMonitor) -> Self {
        Self {
            client: Some(client),
            connectivity,
        }
    }

    /// A push that never leaves the device
    pub fn disabled() -> Self {
        Self {
            client: None,
            connectivity: ConnectivityMonitor::new(false),
        }
    }

    fn target(&self) -> Option<&RemoteClient> {
        if !self.connectivity.is_online() {
            return None;
        }
        self.client.as_ref()
    }

    /// Upsert `record` on the server. Returns whether the server accepted it.
    pub async fn record<T: Record>(&self, record: &T) -> bool {
        let Some(client) = self.target() else {
            tracing::debug!("Offline, {} {} left for the next sync", T::KIND, record.id());
            return false;
        };

        match client.upsert(record).await {
            Ok(_) => {
                tracing::debug!("Pushed {} {}", T::KIND, record.id());
                true
            }
            Err(e) => {
                tracing::warn!("Push of {} {} failed: {}", T::KIND, record.id(), e);
                false
            }
        }
    }

    /// Soft-delete `id` on the server. Returns whether the server accepted it.
    pub async fn deletion(&self, kind: EntityKind, id: &str) -> bool {
        let Some(client) = self.target() else {
            tracing::debug!("Offline, deletion of {} {} left for the next sync", kind, id);
            return false;
        };

        match client.delete(kind, id, false).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Push of {} {} deletion failed: {}", kind, id, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::rules::{self, NewTask};
    use chrono::Utc;
    use std::time::Duration;

    fn task() -> crate::database::Task {
        rules::new_task(
            NewTask {
                title: "Push me".to_string(),
                ..Default::default()
            },
            Utc::now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_offline_push_is_skipped() {
        let push = BestEffortPush::disabled();
        assert!(!push.record(&task()).await);
        assert!(!push.deletion(EntityKind::Task, "t1").await);
    }

    #[tokio::test]
    async fn test_failed_push_is_swallowed() {
        let client = RemoteClient::new("http://127.0.0.1:9", Duration::from_millis(200)).unwrap();
        let push = BestEffortPush::new(client, ConnectivityMonitor::new(true));

        assert!(!push.record(&task()).await);
        assert!(!push.deletion(EntityKind::Task, "t1").await);
    }
}
