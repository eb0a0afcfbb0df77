//! Settings service
//!
//! Manages tracker settings persistence using JSON file storage.

use crate::config::{
    DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_SERVER_PORT, DEFAULT_SERVER_URL, DEFAULT_SYNC_FREQUENCY,
    HEALTH_CHECK_INTERVAL_SECS, RECONNECT_SYNC_DELAY_MS, SETTINGS_FILE,
};
use crate::domain::CalendarPolicy;
use crate::error::{AppError, Result};
use crate::sync::SyncFrequency;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// Settings of the reconciliation server (`tracker serve`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Authoritative store; relative paths resolve against the data directory
    #[serde(default = "default_server_database")]
    pub database_path: PathBuf,
    #[serde(default = "default_true")]
    pub enable_cors: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    DEFAULT_SERVER_PORT
}

fn default_server_database() -> PathBuf {
    PathBuf::from("server.sqlite")
}

fn default_true() -> bool {
    true
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            database_path: default_server_database(),
            enable_cors: true,
        }
    }
}

/// Tracker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerSettings {
    #[serde(default = "default_server_url")]
    pub server_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_health_interval")]
    pub health_check_interval_secs: u64,
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,
    /// "15m", "2h", "1d", "hourly" or "daily"
    #[serde(default = "default_sync_frequency")]
    pub sync_frequency: String,
    #[serde(default = "default_true")]
    pub auto_sync: bool,
    #[serde(default)]
    pub calendar: CalendarPolicy,
    #[serde(default)]
    pub server: ServerSettings,
}

fn default_server_url() -> String {
    DEFAULT_SERVER_URL.to_string()
}

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_health_interval() -> u64 {
    HEALTH_CHECK_INTERVAL_SECS
}

fn default_reconnect_delay() -> u64 {
    RECONNECT_SYNC_DELAY_MS
}

fn default_sync_frequency() -> String {
    DEFAULT_SYNC_FREQUENCY.to_string()
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            request_timeout_secs: default_request_timeout(),
            health_check_interval_secs: default_health_interval(),
            reconnect_delay_ms: default_reconnect_delay(),
            sync_frequency: default_sync_frequency(),
            auto_sync: true,
            calendar: CalendarPolicy::default(),
            server: ServerSettings::default(),
        }
    }
}

impl TrackerSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs.max(1))
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn sync_frequency(&self) -> Result<SyncFrequency> {
        self.sync_frequency.parse()
    }

    /// Resolve the server database path against `data_dir`
    pub fn server_database_path(&self, data_dir: &Path) -> PathBuf {
        if self.server.database_path.is_absolute() {
            self.server.database_path.clone()
        } else {
            data_dir.join(&self.server.database_path)
        }
    }
}

/// Service for managing tracker settings
#[derive(Clone)]
pub struct SettingsService {
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            settings_path: data_dir.join(SETTINGS_FILE),
        }
    }

    /// Load settings from disk or create default if not exists
    pub async fn load(&self) -> Result<TrackerSettings> {
        if !self.settings_path.exists() {
            tracing::info!("Settings file not found, creating default settings");
            let default = TrackerSettings::default();
            self.save(&default).await?;
            return Ok(default);
        }

        let content = fs::read_to_string(&self.settings_path).await?;
        let settings: TrackerSettings = serde_json::from_str(&content)
            .map_err(|e| AppError::Generic(format!("Failed to parse settings: {}", e)))?;

        // Frequency must parse
        settings.sync_frequency()?;

        Ok(settings)
    }

    /// Save settings to disk
    pub async fn save(&self, settings: &TrackerSettings) -> Result<()> {
        if let Some(parent) = self.settings_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(settings)
            .map_err(|e| AppError::Generic(format!("Failed to serialize settings: {}", e)))?;

        fs::write(&self.settings_path, content).await?;
        tracing::info!("Settings saved to {:?}", self.settings_path);

        Ok(())
    }

    pub async fn update_server_url(&self, server_url: String) -> Result<()> {
        let mut settings = self.load().await?;
        settings.server_url = server_url;
        self.save(&settings).await
    }

    pub async fn update_sync_frequency(&self, frequency: SyncFrequency) -> Result<()> {
        let mut settings = self.load().await?;
        settings.sync_frequency = frequency.to_string();
        self.save(&settings).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;
    use tempfile::TempDir;

    fn create_test_service() -> (SettingsService, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let service = SettingsService::new(temp_dir.path().to_path_buf());
        (service, temp_dir)
    }

    #[tokio::test]
    async fn test_default_settings_created_on_load() {
        let (service, temp) = create_test_service();

        let settings = service.load().await.unwrap();

        assert!(temp.path().join(SETTINGS_FILE).exists());
        assert_eq!(settings.server_url, DEFAULT_SERVER_URL);
        assert_eq!(settings.health_check_interval(), Duration::from_secs(30));
        assert_eq!(settings.reconnect_delay(), Duration::from_millis(1000));
        assert_eq!(settings.sync_frequency().unwrap(), SyncFrequency::Minutes(15));
        assert_eq!(settings.calendar.week_start, Weekday::Sun);
        assert_eq!(settings.server.port, DEFAULT_SERVER_PORT);
    }

    #[tokio::test]
    async fn test_partial_file_gets_defaults() {
        let (service, temp) = create_test_service();
        std::fs::write(
            temp.path().join(SETTINGS_FILE),
            r#"{ "server_url": "http://sync.local:8080", "calendar": { "week_start": "Mon" } }"#,
        )
        .unwrap();

        let settings = service.load().await.unwrap();

        assert_eq!(settings.server_url, "http://sync.local:8080");
        assert_eq!(settings.calendar.week_start, Weekday::Mon);
        assert_eq!(settings.calendar.utc_offset_minutes, 0);
        assert!(settings.auto_sync);
    }

    #[tokio::test]
    async fn test_bad_frequency_is_rejected() {
        let (service, temp) = create_test_service();
        std::fs::write(
            temp.path().join(SETTINGS_FILE),
            r#"{ "sync_frequency": "often" }"#,
        )
        .unwrap();

        assert!(matches!(
            service.load().await.unwrap_err(),
            AppError::Validation(_)
        ));
    }

    #[tokio::test]
    async fn test_settings_persistence() {
        let temp_dir = TempDir::new().unwrap();
        let data_dir = temp_dir.path().to_path_buf();

        {
            let service = SettingsService::new(data_dir.clone());
            service
                .update_server_url("http://10.0.0.2:5000".to_string())
                .await
                .unwrap();
            service
                .update_sync_frequency(SyncFrequency::Hours(2))
                .await
                .unwrap();
        }

        {
            let service = SettingsService::new(data_dir.clone());
            let loaded = service.load().await.unwrap();
            assert_eq!(loaded.server_url, "http://10.0.0.2:5000");
            assert_eq!(loaded.sync_frequency, "2h");
            assert_eq!(
                loaded.server_database_path(&data_dir),
                data_dir.join("server.sqlite")
            );
        }
    }
}
