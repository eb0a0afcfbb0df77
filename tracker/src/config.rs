//! Application configuration constants
//!
//! Central location for timing defaults, wire constants and validation
//! boundaries used by both the device-local side and the server.

// ===== Time =====

/// Length of a day in milliseconds, the unit of the habit gap calculation
pub const DAY_MS: i64 = 24 * 60 * 60 * 1000;

// ===== Network =====

/// Default reconciliation server base URL
pub const DEFAULT_SERVER_URL: &str = "http://localhost:5000";

/// Prefix under which all entity endpoints are mounted
pub const API_PREFIX: &str = "/api";

/// Default listen port for the reconciliation server
pub const DEFAULT_SERVER_PORT: u16 = 5000;

/// Default timeout for a single call to the reconciliation service.
/// A call exceeding it counts as a failure for that entity type.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

/// Interval between liveness probes of the server
pub const HEALTH_CHECK_INTERVAL_SECS: u64 = 30;

/// Timeout for a single liveness probe
pub const HEALTH_CHECK_TIMEOUT_SECS: u64 = 5;

/// Delay between regaining connectivity and starting the triggered sync
pub const RECONNECT_SYNC_DELAY_MS: u64 = 1_000;

/// Default periodic sync frequency (see `sync::SyncFrequency`)
pub const DEFAULT_SYNC_FREQUENCY: &str = "15m";

// ===== Validation Limits =====

/// Maximum length of a task/note title or habit name
pub const MAX_TITLE_LENGTH: usize = 255;

/// Maximum length of a single note tag
pub const MAX_TAG_LENGTH: usize = 50;

/// Longest focus session accepted, in minutes (one full day)
pub const MAX_SESSION_MINUTES: u32 = 24 * 60;

/// Default window for focus statistics, in days
pub const DEFAULT_STATS_DAYS: u32 = 7;

/// Widest window for focus statistics, in days; larger requests are clamped
pub const MAX_STATS_DAYS: u32 = 3650;

// ===== Files =====

/// File name of the device-local record store inside the data directory
pub const LOCAL_DB_FILE: &str = "tracker.sqlite";

/// File name of the settings file inside the data directory
pub const SETTINGS_FILE: &str = "settings.json";
