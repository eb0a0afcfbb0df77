//! Habit completion state machine
//!
//! A habit is in one of three states relative to "now": never completed,
//! completed within the current period, or completed in an earlier period.
//! Completing moves `streak` and `last_completed` together; resetting
//! clears both.

use crate::config::DAY_MS;
use crate::database::{Frequency, Habit, Record};
use crate::error::{AppError, Result};
use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, Offset, Utc, Weekday};
use serde::{Deserialize, Serialize};

/// Defines what "calendar day" and "calendar week" mean.
///
/// Device and server must be configured with the same policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarPolicy {
    /// Offset of the user's local time from UTC
    #[serde(default)]
    pub utc_offset_minutes: i32,
    /// First day of the week
    #[serde(default = "default_week_start")]
    pub week_start: Weekday,
}

fn default_week_start() -> Weekday {
    Weekday::Sun
}

impl Default for CalendarPolicy {
    fn default() -> Self {
        Self {
            utc_offset_minutes: 0,
            week_start: default_week_start(),
        }
    }
}

impl CalendarPolicy {
    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix())
    }

    /// Local calendar date of an instant
    pub fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.offset()).date_naive()
    }

    /// Local midnight at the start of `date`, as an instant
    pub fn start_of_day(&self, date: NaiveDate) -> DateTime<Utc> {
        let local_midnight = date.and_time(chrono::NaiveTime::MIN);
        let utc = local_midnight - Duration::seconds(i64::from(self.offset().local_minus_utc()));
        DateTime::from_naive_utc_and_offset(utc, Utc)
    }

    /// First date of the calendar week containing `date`
    pub fn week_start_date(&self, date: NaiveDate) -> NaiveDate {
        let back = (date.weekday().num_days_from_monday() + 7
            - self.week_start.num_days_from_monday())
            % 7;
        date - Duration::days(i64::from(back))
    }

    /// Instant at which the calendar week containing `at` began
    pub fn start_of_week(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        self.start_of_day(self.week_start_date(self.local_date(at)))
    }
}

/// Where a habit stands relative to its current period
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HabitPeriod {
    NeverCompleted,
    CompletedThisPeriod,
    CompletedPriorPeriod,
}

pub fn period_state(habit: &Habit, now: DateTime<Utc>, policy: &CalendarPolicy) -> HabitPeriod {
    let Some(last) = habit.last_completed else {
        return HabitPeriod::NeverCompleted;
    };

    let this_period = match habit.frequency {
        Frequency::Daily => policy.local_date(last) == policy.local_date(now),
        Frequency::Weekly => last >= policy.start_of_week(now),
    };

    if this_period {
        HabitPeriod::CompletedThisPeriod
    } else {
        HabitPeriod::CompletedPriorPeriod
    }
}

/// Whole days between two instants, rounded up
pub fn gap_in_days(now: DateTime<Utc>, last: DateTime<Utc>) -> i64 {
    let ms = (now - last).num_milliseconds().abs();
    (ms + DAY_MS - 1) / DAY_MS
}

/// Record a completion at `now`, returning the new habit value.
///
/// Fails with `AlreadyCompletedInPeriod` when the habit was already
/// completed this day (daily) or this week (weekly); the input is untouched.
pub fn complete(habit: &Habit, now: DateTime<Utc>, policy: &CalendarPolicy) -> Result<Habit> {
    if period_state(habit, now, policy) == HabitPeriod::CompletedThisPeriod {
        return Err(AppError::AlreadyCompletedInPeriod {
            id: habit.id().to_string(),
            frequency: habit.frequency,
        });
    }

    let streak = match habit.last_completed {
        None => 1,
        Some(last) => {
            let window = match habit.frequency {
                Frequency::Daily => 1,
                Frequency::Weekly => 7,
            };
            if gap_in_days(now, last) <= window {
                habit.streak.saturating_add(1)
            } else {
                1
            }
        }
    };

    let mut next = habit.clone();
    next.streak = streak;
    next.last_completed = Some(now);
    next.meta.touch(now);
    Ok(next)
}

/// Clear the streak unconditionally
pub fn reset(habit: &Habit, now: DateTime<Utc>) -> Habit {
    let mut next = habit.clone();
    next.streak = 0;
    next.last_completed = None;
    next.meta.touch(now);
    next
}

/// Summary over the active habits
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HabitStats {
    pub total_habits: usize,
    pub daily_habits: usize,
    pub weekly_habits: usize,
    pub active_streaks: usize,
    pub longest_streak: u32,
    pub average_streak: u32,
    pub completed_today: usize,
    pub completed_this_week: usize,
}

impl HabitStats {
    pub fn compute(habits: &[Habit], now: DateTime<Utc>, policy: &CalendarPolicy) -> Self {
        let active: Vec<&Habit> = habits.iter().filter(|h| !h.is_deleted()).collect();
        let today = policy.local_date(now);
        let week_start = policy.start_of_week(now);

        let total_streak: u64 = active.iter().map(|h| u64::from(h.streak)).sum();
        let average_streak = if active.is_empty() {
            0
        } else {
            (total_streak as f64 / active.len() as f64).round() as u32
        };

        let mut stats = HabitStats {
            total_habits: active.len(),
            daily_habits: active.iter().filter(|h| h.frequency == Frequency::Daily).count(),
            weekly_habits: active.iter().filter(|h| h.frequency == Frequency::Weekly).count(),
            active_streaks: active.iter().filter(|h| h.streak > 0).count(),
            longest_streak: active.iter().map(|h| h.streak).max().unwrap_or(0),
            average_streak,
            ..Default::default()
        };

        for habit in &active {
            let Some(last) = habit.last_completed else {
                continue;
            };
            if habit.frequency == Frequency::Daily && policy.local_date(last) == today {
                stats.completed_today += 1;
            }
            if last >= week_start {
                stats.completed_this_week += 1;
            }
        }

        stats
    }
}
