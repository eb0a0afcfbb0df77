//! Services module
//!
//! Device-side business logic between the caller and the local record
//! store. Writes are local first; the server hears about them through a
//! best-effort push and, reliably, through the next sync.

pub mod export;
pub mod habits;
pub mod notes;
pub mod push;
pub mod sessions;
pub mod settings;
pub mod tasks;

pub use export::ExportService;
pub use habits::HabitsService;
pub use notes::NotesService;
pub use push::BestEffortPush;
pub use sessions::SessionsService;
pub use settings::{ServerSettings, SettingsService, TrackerSettings};
pub use tasks::TasksService;

use crate::database::{Collection, Record};
use crate::error::{AppError, Result};

/// Fetch a record for editing; soft-deleted records count as missing
pub(crate) async fn load_active<T: Record>(collection: &Collection<T>, id: &str) -> Result<T> {
    let record = collection.get_by_id(id).await?;
    if record.is_deleted() {
        return Err(AppError::not_found(T::KIND, id));
    }
    Ok(record)
}
