//! Habits service
//!
//! Completion and reset run the streak state machine against the local copy
//! with the device clock. The resulting record syncs like any other edit.

use super::{load_active, BestEffortPush};
use crate::database::{Collection, Frequency, Habit, Record, RecordStore, Visibility};
use crate::domain::habits::{self, CalendarPolicy, HabitPeriod, HabitStats};
use crate::domain::rules::{self, HabitPatch, NewHabit};
use crate::domain::SharedClock;
use crate::error::Result;

#[derive(Clone)]
pub struct HabitsService {
    habits: Collection<Habit>,
    clock: SharedClock,
    policy: CalendarPolicy,
    push: BestEffortPush,
}

impl HabitsService {
    pub fn new(
        store: &RecordStore,
        clock: SharedClock,
        policy: CalendarPolicy,
        push: BestEffortPush,
    ) -> Self {
        Self {
            habits: store.habits(),
            clock,
            policy,
            push,
        }
    }

    pub async fn create_habit(&self, input: NewHabit) -> Result<Habit> {
        let habit = rules::new_habit(input, self.clock.now())?;
        tracing::info!("Creating new {} habit: {}", habit.frequency, habit.name);

        self.habits.put(&habit).await?;
        self.push.record(&habit).await;

        Ok(habit)
    }

    pub async fn get_habit(&self, id: &str) -> Result<Habit> {
        load_active(&self.habits, id).await
    }

    pub async fn list_habits(&self) -> Result<Vec<Habit>> {
        self.habits.get_all(Visibility::Active).await
    }

    pub async fn habits_with_frequency(&self, frequency: Frequency) -> Result<Vec<Habit>> {
        self.habits.find_by("frequency", frequency).await
    }

    pub async fn update_habit(&self, id: &str, patch: HabitPatch) -> Result<Habit> {
        let habit = load_active(&self.habits, id).await?;
        let updated = rules::apply_habit_patch(&habit, patch, self.clock.now())?;
        if updated == habit {
            return Ok(habit);
        }

        self.habits.put(&updated).await?;
        self.push.record(&updated).await;

        Ok(updated)
    }

    /// Where the habit stands in its current day or week
    pub async fn period(&self, id: &str) -> Result<HabitPeriod> {
        let habit = load_active(&self.habits, id).await?;
        Ok(habits::period_state(&habit, self.clock.now(), &self.policy))
    }

    /// Record a completion now.
    ///
    /// Fails with `AlreadyCompletedInPeriod` and writes nothing when the
    /// habit was already completed in the current period.
    pub async fn complete_habit(&self, id: &str) -> Result<Habit> {
        let habit = load_active(&self.habits, id).await?;
        let completed = habits::complete(&habit, self.clock.now(), &self.policy)?;

        self.habits.put(&completed).await?;
        tracing::info!("Completed habit {} (streak {})", id, completed.streak);
        self.push.record(&completed).await;

        Ok(completed)
    }

    pub async fn reset_habit(&self, id: &str) -> Result<Habit> {
        let habit = load_active(&self.habits, id).await?;
        let cleared = habits::reset(&habit, self.clock.now());

        self.habits.put(&cleared).await?;
        self.push.record(&cleared).await;

        Ok(cleared)
    }

    pub async fn delete_habit(&self, id: &str) -> Result<()> {
        tracing::info!("Deleting habit: {}", id);

        let habit = load_active(&self.habits, id).await?;
        let deleted = rules::soft_delete(&habit, self.clock.now());

        self.habits.put(&deleted).await?;
        self.push.deletion(Habit::KIND, id).await;

        Ok(())
    }

    pub async fn stats(&self) -> Result<HabitStats> {
        let habits = self.list_habits().await?;
        Ok(HabitStats::compute(&habits, self.clock.now(), &self.policy))
    }
}
