//! Client-side synchronization
//!
//! - `SyncOrchestrator` runs reconciliation cycles against a `SyncTransport`
//! - `ConnectivityMonitor` tracks reachability and triggers reconnect syncs
//! - `SyncScheduler` triggers cycles periodically

pub mod connectivity;
pub mod orchestrator;
pub mod scheduler;
pub mod transport;

pub use connectivity::{spawn_auto_sync, ConnectivityMonitor};
pub use orchestrator::{
    KindOutcome, KindReport, KindSummary, SyncError, SyncOrchestrator, SyncReport, SyncState,
};
pub use scheduler::{SyncFrequency, SyncScheduler};
pub use transport::SyncTransport;
