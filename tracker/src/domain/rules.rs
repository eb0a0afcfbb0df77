//! Mutation rules for tasks, notes, habits and sessions
//!
//! Validation happens here, before anything reaches a store. Patches are
//! merged onto the full stored value so the store only ever sees complete
//! records.

use crate::config::{MAX_SESSION_MINUTES, MAX_TAG_LENGTH, MAX_TITLE_LENGTH};
use crate::database::{Frequency, Habit, Note, Priority, Record, RecordMeta, Session, Task};
use crate::error::{AppError, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashSet;

pub fn validate_meta(meta: &RecordMeta) -> Result<()> {
    if meta.id.trim().is_empty() {
        return Err(AppError::validation("Record id is required"));
    }
    Ok(())
}

pub fn validate_title(label: &str, title: &str) -> Result<()> {
    if title.trim().is_empty() {
        return Err(AppError::validation(format!("{} is required", label)));
    }
    if title.chars().count() > MAX_TITLE_LENGTH {
        return Err(AppError::validation(format!(
            "{} must be at most {} characters",
            label, MAX_TITLE_LENGTH
        )));
    }
    Ok(())
}

pub fn validate_tags(tags: &[String]) -> Result<()> {
    for tag in tags {
        if tag.trim().is_empty() {
            return Err(AppError::validation("Tags must not be empty"));
        }
        if tag.chars().count() > MAX_TAG_LENGTH {
            return Err(AppError::validation(format!(
                "Tag \"{}\" exceeds {} characters",
                tag, MAX_TAG_LENGTH
            )));
        }
    }
    Ok(())
}

pub fn validate_minutes(minutes: u32) -> Result<()> {
    if minutes == 0 || minutes > MAX_SESSION_MINUTES {
        return Err(AppError::validation(format!(
            "Minutes must be between 1 and {}",
            MAX_SESSION_MINUTES
        )));
    }
    Ok(())
}

/// Trim tags, drop empties and duplicates, keep first-seen order
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    tags.into_iter()
        .map(|t| t.as_ref().trim().to_string())
        .filter(|t| !t.is_empty())
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// Tag sets are equal regardless of order
pub fn same_tags(a: &[String], b: &[String]) -> bool {
    let a: HashSet<&str> = a.iter().map(String::as_str).collect();
    let b: HashSet<&str> = b.iter().map(String::as_str).collect();
    a == b
}

/// Case-insensitive match against title, content and tags
pub fn note_matches(note: &Note, query: &str) -> bool {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return false;
    }
    note.title.to_lowercase().contains(&query)
        || note.content.to_lowercase().contains(&query)
        || note.tags.iter().any(|t| t.to_lowercase().contains(&query))
}

/// Mark a record deleted without removing it
pub fn soft_delete<T: Record>(record: &T, now: DateTime<Utc>) -> T {
    let mut next = record.clone();
    next.meta_mut().deleted = true;
    next.meta_mut().touch(now);
    next
}

// ===== Tasks =====

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
}

/// Partial task update; absent fields keep their stored value
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    /// `Some(None)` clears the deadline
    pub deadline: Option<Option<DateTime<Utc>>>,
    pub completed: Option<bool>,
}

pub fn new_task(input: NewTask, now: DateTime<Utc>) -> Result<Task> {
    let task = Task {
        meta: RecordMeta::new(now),
        title: input.title.trim().to_string(),
        description: input.description,
        priority: input.priority,
        deadline: input.deadline,
        completed: false,
    };
    task.validate()?;
    Ok(task)
}

pub fn apply_task_patch(task: &Task, patch: TaskPatch, now: DateTime<Utc>) -> Result<Task> {
    let mut next = task.clone();
    if let Some(title) = patch.title {
        next.title = title.trim().to_string();
    }
    if let Some(description) = patch.description {
        next.description = description;
    }
    if let Some(priority) = patch.priority {
        next.priority = priority;
    }
    if let Some(deadline) = patch.deadline {
        next.deadline = deadline;
    }
    if let Some(completed) = patch.completed {
        next.completed = completed;
    }
    next.validate()?;
    if next != *task {
        next.meta.touch(now);
    }
    Ok(next)
}

pub fn toggle_completed(task: &Task, now: DateTime<Utc>) -> Task {
    let mut next = task.clone();
    next.completed = !next.completed;
    next.meta.touch(now);
    next
}

// ===== Notes =====

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewNote {
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub pinned: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotePatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub tags: Option<Vec<String>>,
    pub pinned: Option<bool>,
}

pub fn new_note(input: NewNote, now: DateTime<Utc>) -> Result<Note> {
    let note = Note {
        meta: RecordMeta::new(now),
        title: input.title.trim().to_string(),
        content: input.content,
        tags: normalize_tags(input.tags),
        pinned: input.pinned,
    };
    note.validate()?;
    Ok(note)
}

pub fn apply_note_patch(note: &Note, patch: NotePatch, now: DateTime<Utc>) -> Result<Note> {
    let mut next = note.clone();
    if let Some(title) = patch.title {
        next.title = title.trim().to_string();
    }
    if let Some(content) = patch.content {
        next.content = content;
    }
    if let Some(tags) = patch.tags {
        let tags = normalize_tags(tags);
        // A reordering of the stored tags is not an edit
        if !same_tags(&next.tags, &tags) {
            next.tags = tags;
        }
    }
    if let Some(pinned) = patch.pinned {
        next.pinned = pinned;
    }
    next.validate()?;
    if next != *note {
        next.meta.touch(now);
    }
    Ok(next)
}

pub fn toggle_pinned(note: &Note, now: DateTime<Utc>) -> Note {
    let mut next = note.clone();
    next.pinned = !next.pinned;
    next.meta.touch(now);
    next
}

// ===== Habits =====

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewHabit {
    pub name: String,
    #[serde(default)]
    pub frequency: Frequency,
}

/// Editable habit fields. Streak state only changes through the state machine.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HabitPatch {
    pub name: Option<String>,
    pub frequency: Option<Frequency>,
}

pub fn new_habit(input: NewHabit, now: DateTime<Utc>) -> Result<Habit> {
    let habit = Habit {
        meta: RecordMeta::new(now),
        name: input.name.trim().to_string(),
        frequency: input.frequency,
        streak: 0,
        last_completed: None,
    };
    habit.validate()?;
    Ok(habit)
}

pub fn apply_habit_patch(habit: &Habit, patch: HabitPatch, now: DateTime<Utc>) -> Result<Habit> {
    let mut next = habit.clone();
    if let Some(name) = patch.name {
        next.name = name.trim().to_string();
    }
    if let Some(frequency) = patch.frequency {
        next.frequency = frequency;
    }
    next.validate()?;
    if next != *habit {
        next.meta.touch(now);
    }
    Ok(next)
}

// ===== Sessions =====

pub fn new_session(minutes: u32, completed_at: DateTime<Utc>, now: DateTime<Utc>) -> Result<Session> {
    let session = Session {
        meta: RecordMeta::new(now),
        minutes,
        completed_at,
    };
    session.validate()?;
    Ok(session)
}
