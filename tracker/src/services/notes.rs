//! Notes service
//!
//! High-level business logic for notes on the device.
//! Every write lands in the local store first, then is pushed best-effort.

use super::{load_active, BestEffortPush};
use crate::database::{Collection, Note, Record, RecordStore, Visibility};
use crate::domain::rules::{self, NewNote, NotePatch};
use crate::domain::SharedClock;
use crate::error::{AppError, Result};

/// Service for managing notes
#[derive(Clone)]
pub struct NotesService {
    notes: Collection<Note>,
    clock: SharedClock,
    push: BestEffortPush,
}

impl NotesService {
    pub fn new(store: &RecordStore, clock: SharedClock, push: BestEffortPush) -> Self {
        Self {
            notes: store.notes(),
            clock,
            push,
        }
    }

    /// Create a new note
    pub async fn create_note(&self, input: NewNote) -> Result<Note> {
        let note = rules::new_note(input, self.clock.now())?;
        tracing::info!("Creating new note: {}", note.title);

        self.notes.put(&note).await?;
        self.push.record(&note).await;

        Ok(note)
    }

    /// Get a note by ID
    pub async fn get_note(&self, id: &str) -> Result<Note> {
        load_active(&self.notes, id).await
    }

    /// List notes, pinned first, then most recently updated
    pub async fn list_notes(&self) -> Result<Vec<Note>> {
        self.notes.get_all(Visibility::Active).await
    }

    pub async fn pinned_notes(&self) -> Result<Vec<Note>> {
        self.notes.find_by("pinned", true).await
    }

    /// Update a note
    pub async fn update_note(&self, id: &str, patch: NotePatch) -> Result<Note> {
        tracing::debug!("Updating note: {}", id);

        let note = load_active(&self.notes, id).await?;
        let updated = rules::apply_note_patch(&note, patch, self.clock.now())?;
        if updated == note {
            return Ok(note);
        }

        self.notes.put(&updated).await?;
        self.push.record(&updated).await;

        Ok(updated)
    }

    pub async fn toggle_pinned(&self, id: &str) -> Result<Note> {
        let note = load_active(&self.notes, id).await?;
        let toggled = rules::toggle_pinned(&note, self.clock.now());

        self.notes.put(&toggled).await?;
        self.push.record(&toggled).await;

        Ok(toggled)
    }

    /// Delete a note (soft delete, so the deletion syncs)
    pub async fn delete_note(&self, id: &str) -> Result<()> {
        tracing::info!("Deleting note: {}", id);

        let note = load_active(&self.notes, id).await?;
        let deleted = rules::soft_delete(&note, self.clock.now());

        self.notes.put(&deleted).await?;
        self.push.deletion(Note::KIND, id).await;

        Ok(())
    }

    /// Case-insensitive search over title, content and tags
    pub async fn search_notes(&self, query: &str) -> Result<Vec<Note>> {
        if query.trim().is_empty() {
            return Err(AppError::validation("Search query is required"));
        }

        let all_notes = self.list_notes().await?;

        Ok(all_notes
            .into_iter()
            .filter(|note| rules::note_matches(note, query))
            .collect())
    }
}
