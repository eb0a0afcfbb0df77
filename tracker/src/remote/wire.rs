//! JSON shapes exchanged with the reconciliation server

use crate::database::Record;
use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

/// Body of `POST /api/<entity>/sync/batch`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSyncRequest<T> {
    #[serde(alias = "tasks", alias = "notes", alias = "habits", alias = "sessions")]
    pub records: Vec<T>,
    /// Watermark of the caller; `None` on the first sync
    #[serde(rename = "lastSyncTime", default)]
    pub last_sync_time: Option<DateTime<Utc>>,
}

/// The server's record for an id the client submitted stale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict<T> {
    pub id: String,
    #[serde(rename = "serverData")]
    pub server_data: T,
}

/// A submitted record the server skipped
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordError {
    /// Absent when the record carried no readable id
    pub id: Option<String>,
    pub error: String,
}

/// Per-record outcome of one batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct SyncResults<T> {
    #[serde(default)]
    pub created: Vec<String>,
    #[serde(default)]
    pub updated: Vec<String>,
    /// Identical to the stored value; nothing written
    #[serde(default)]
    pub unchanged: Vec<String>,
    #[serde(default)]
    pub conflicts: Vec<Conflict<T>>,
    #[serde(default)]
    pub errors: Vec<RecordError>,
}

impl<T> Default for SyncResults<T> {
    fn default() -> Self {
        Self {
            created: Vec::new(),
            updated: Vec::new(),
            unchanged: Vec::new(),
            conflicts: Vec::new(),
            errors: Vec::new(),
        }
    }
}

/// Successful batch response.
///
/// The pulled records go out under an entity-specific key (`serverTasks`,
/// `serverNotes`, ...); any of those keys, or `serverRecords`, is accepted
/// when reading.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchSyncResponse<T> {
    pub success: bool,
    pub results: SyncResults<T>,
    #[serde(
        rename = "serverRecords",
        alias = "serverTasks",
        alias = "serverNotes",
        alias = "serverHabits",
        alias = "serverSessions",
        default = "Vec::new"
    )]
    pub server_records: Vec<T>,
    #[serde(rename = "syncTime")]
    pub sync_time: DateTime<Utc>,
}

impl<T: Record> Serialize for BatchSyncResponse<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(4))?;
        map.serialize_entry("success", &self.success)?;
        map.serialize_entry("results", &self.results)?;
        map.serialize_entry(T::KIND.server_records_key(), &self.server_records)?;
        map.serialize_entry("syncTime", &self.sync_time)?;
        map.end()
    }
}

/// `{ success, data }` envelope used by the non-batch endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            error: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Body of `GET /health`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub version: String,
}

/// Today's sessions plus their summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TodaySessions<T> {
    pub sessions: Vec<T>,
    pub summary: crate::domain::focus::TodaySummary,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{Note, RecordMeta, Task};
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_request_accepts_entity_key_and_camel_case_watermark() {
        let body = json!({
            "tasks": [],
            "lastSyncTime": "2024-05-01T10:00:00Z",
        });
        let request: BatchSyncRequest<serde_json::Value> = serde_json::from_value(body).unwrap();
        assert!(request.records.is_empty());
        assert_eq!(
            request.last_sync_time,
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap())
        );

        let first: BatchSyncRequest<serde_json::Value> =
            serde_json::from_value(json!({ "records": [], "lastSyncTime": null })).unwrap();
        assert_eq!(first.last_sync_time, None);
    }

    #[test]
    fn test_response_uses_entity_specific_key() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let note = Note {
            meta: RecordMeta::new(at),
            title: "Server".to_string(),
            content: String::new(),
            tags: vec![],
            pinned: false,
        };
        let response = BatchSyncResponse {
            success: true,
            results: SyncResults {
                conflicts: vec![Conflict {
                    id: note.meta.id.clone(),
                    server_data: note.clone(),
                }],
                ..Default::default()
            },
            server_records: vec![note.clone()],
            sync_time: at,
        };

        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["serverNotes"][0]["title"], "Server");
        assert_eq!(value["results"]["conflicts"][0]["serverData"]["id"], note.meta.id);
        assert!(value.get("serverRecords").is_none());

        let back: BatchSyncResponse<Note> = serde_json::from_value(value).unwrap();
        assert_eq!(back.server_records, vec![note]);
    }

    #[test]
    fn test_envelope_reads_record_payload_and_bare_message() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let task = Task {
            meta: RecordMeta::new(at),
            title: "Wire".to_string(),
            description: String::new(),
            priority: Default::default(),
            deadline: None,
            completed: false,
        };
        let value = serde_json::to_value(Envelope::ok(task.clone())).unwrap();
        let back: Envelope<Task> = serde_json::from_value(value).unwrap();
        assert_eq!(back.data, Some(task));

        let bare: Envelope<Task> =
            serde_json::from_value(json!({ "success": true, "message": "Task deleted" })).unwrap();
        assert!(bare.data.is_none());
        assert_eq!(bare.message.as_deref(), Some("Task deleted"));
    }

    #[test]
    fn test_response_without_records_key_reads_as_empty() {
        let value = json!({
            "success": true,
            "results": { "created": ["a"] },
            "syncTime": "2024-05-01T10:00:00Z",
        });
        let response: BatchSyncResponse<Task> = serde_json::from_value(value).unwrap();
        assert_eq!(response.results.created, vec!["a"]);
        assert!(response.server_records.is_empty());
    }
}
