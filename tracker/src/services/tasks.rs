//! Tasks service

use super::{load_active, BestEffortPush};
use crate::database::{Collection, Priority, Record, RecordStore, Task, Visibility};
use crate::domain::rules::{self, NewTask, TaskPatch};
use crate::domain::SharedClock;
use crate::error::Result;

#[derive(Clone)]
pub struct TasksService {
    tasks: Collection<Task>,
    clock: SharedClock,
    push: BestEffortPush,
}

impl TasksService {
    pub fn new(store: &RecordStore, clock: SharedClock, push: BestEffortPush) -> Self {
        Self {
            tasks: store.tasks(),
            clock,
            push,
        }
    }

    pub async fn create_task(&self, input: NewTask) -> Result<Task> {
        let task = rules::new_task(input, self.clock.now())?;
        tracing::info!("Creating new task: {}", task.title);

        self.tasks.put(&task).await?;
        self.push.record(&task).await;

        Ok(task)
    }

    pub async fn get_task(&self, id: &str) -> Result<Task> {
        load_active(&self.tasks, id).await
    }

    pub async fn list_tasks(&self) -> Result<Vec<Task>> {
        self.tasks.get_all(Visibility::Active).await
    }

    pub async fn open_tasks(&self) -> Result<Vec<Task>> {
        self.tasks.find_by("completed", false).await
    }

    pub async fn tasks_with_priority(&self, priority: Priority) -> Result<Vec<Task>> {
        self.tasks.find_by("priority", priority).await
    }

    pub async fn update_task(&self, id: &str, patch: TaskPatch) -> Result<Task> {
        tracing::debug!("Updating task: {}", id);

        let task = load_active(&self.tasks, id).await?;
        let updated = rules::apply_task_patch(&task, patch, self.clock.now())?;
        if updated == task {
            return Ok(task);
        }

        self.tasks.put(&updated).await?;
        self.push.record(&updated).await;

        Ok(updated)
    }

    pub async fn toggle_completed(&self, id: &str) -> Result<Task> {
        let task = load_active(&self.tasks, id).await?;
        let toggled = rules::toggle_completed(&task, self.clock.now());

        self.tasks.put(&toggled).await?;
        self.push.record(&toggled).await;

        Ok(toggled)
    }

    pub async fn delete_task(&self, id: &str) -> Result<()> {
        tracing::info!("Deleting task: {}", id);

        let task = load_active(&self.tasks, id).await?;
        let deleted = rules::soft_delete(&task, self.clock.now());

        self.tasks.put(&deleted).await?;
        self.push.deletion(Task::KIND, id).await;

        Ok(())
    }
}
