//! Export service
//!
//! Packages the active local records as a ZIP with one JSON file per
//! collection and a manifest of SHA-256 checksums. Also hosts the local
//! maintenance actions: pruning soft-deleted records and wiping the store.

use crate::database::{EntityKind, Habit, Note, Record, RecordStore, Session, Task, Visibility};
use crate::domain::SharedClock;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::fs;
use zip::write::FileOptions;
use zip::ZipWriter;

/// Export manifest structure
#[derive(Debug, Serialize, Deserialize)]
pub struct ExportManifest {
    pub version: String,
    pub timestamp: String,
    pub files: Vec<FileEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    pub records: usize,
    pub size: u64,
    pub checksum: String,
}

/// Per-collection row counts removed by a maintenance action
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct RemovedCounts {
    pub tasks: u64,
    pub notes: u64,
    pub habits: u64,
    pub sessions: u64,
}

impl RemovedCounts {
    pub fn total(&self) -> u64 {
        self.tasks + self.notes + self.habits + self.sessions
    }
}

#[derive(Clone)]
pub struct ExportService {
    store: RecordStore,
    clock: SharedClock,
    exports_dir: PathBuf,
}

impl ExportService {
    pub fn new(store: RecordStore, clock: SharedClock, data_dir: &Path) -> Self {
        Self {
            store,
            clock,
            exports_dir: data_dir.join("exports"),
        }
    }

    /// Write `tracker_export_<timestamp>.zip` and return its path
    pub async fn export(&self) -> Result<PathBuf> {
        tracing::info!("Exporting local records");

        fs::create_dir_all(&self.exports_dir).await?;

        let now = self.clock.now();
        let export_path = self
            .exports_dir
            .join(format!("tracker_export_{}.zip", now.format("%Y%m%d_%H%M%S")));

        let mut manifest = ExportManifest {
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: now.to_rfc3339(),
            files: Vec::new(),
        };

        let collections = vec![
            self.collection_json::<Task>().await?,
            self.collection_json::<Note>().await?,
            self.collection_json::<Habit>().await?,
            self.collection_json::<Session>().await?,
        ];

        let file = std::fs::File::create(&export_path)?;
        let mut zip = ZipWriter::new(file);
        let options =
            FileOptions::<()>::default().compression_method(zip::CompressionMethod::Deflated);

        for (kind, count, data) in collections {
            let path = format!("{}.json", kind.table());

            zip.start_file(path.as_str(), options)?;
            zip.write_all(&data)?;

            manifest.files.push(FileEntry {
                path,
                records: count,
                size: data.len() as u64,
                checksum: calculate_checksum(&data),
            });
        }

        let manifest_json = serde_json::to_string_pretty(&manifest)?;
        zip.start_file("manifest.json", options)?;
        zip.write_all(manifest_json.as_bytes())?;
        zip.finish()?;

        tracing::info!("Export written to {:?}", export_path);
        Ok(export_path)
    }

    async fn collection_json<T: Record>(&self) -> Result<(EntityKind, usize, Vec<u8>)> {
        let records = self
            .store
            .collection::<T>()
            .get_all(Visibility::Active)
            .await?;
        let data = serde_json::to_vec_pretty(&records)?;
        Ok((T::KIND, records.len(), data))
    }

    /// Hard-delete soft-deleted records the server has acknowledged.
    ///
    /// A tombstone is acknowledged once a sync has pulled it back, which
    /// leaves its `updated_at` at or before that kind's watermark. Newer
    /// tombstones, and every tombstone of a kind never synced, are kept so
    /// the deletion still reaches the server.
    pub async fn prune_deleted(&self) -> Result<RemovedCounts> {
        let removed = RemovedCounts {
            tasks: self.prune_acknowledged::<Task>().await?,
            notes: self.prune_acknowledged::<Note>().await?,
            habits: self.prune_acknowledged::<Habit>().await?,
            sessions: self.prune_acknowledged::<Session>().await?,
        };

        tracing::info!("Pruned {} soft-deleted records", removed.total());
        Ok(removed)
    }

    async fn prune_acknowledged<T: Record>(&self) -> Result<u64> {
        match self.store.watermark(T::KIND).await? {
            Some(through) => self.store.collection::<T>().prune_deleted(through).await,
            None => Ok(0),
        }
    }

    /// Remove every local record and forget the sync watermarks.
    ///
    /// Nothing is sent to the server; the next sync pulls the full server
    /// copy back down.
    pub async fn clear_all(&self) -> Result<RemovedCounts> {
        let removed = RemovedCounts {
            tasks: self.store.tasks().clear().await?,
            notes: self.store.notes().clear().await?,
            habits: self.store.habits().clear().await?,
            sessions: self.store.sessions().clear().await?,
        };
        self.store.clear_watermarks().await?;

        tracing::warn!("Cleared {} local records", removed.total());
        Ok(removed)
    }
}

fn calculate_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}
