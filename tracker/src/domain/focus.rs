//! Focus session summaries

use crate::config::MAX_STATS_DAYS;
use crate::database::{Record, Session};
use crate::domain::habits::CalendarPolicy;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

fn hours(minutes: u64) -> f64 {
    (minutes as f64 / 60.0 * 10.0).round() / 10.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodaySummary {
    pub date: NaiveDate,
    pub total_sessions: usize,
    pub total_minutes: u64,
    pub total_hours: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayTotals {
    pub count: usize,
    pub minutes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductiveDay {
    pub date: NaiveDate,
    pub count: usize,
    pub minutes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FocusReport {
    pub days: u32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_sessions: usize,
    pub total_minutes: u64,
    pub total_hours: f64,
    pub sessions_per_day: f64,
    pub minutes_per_day: u64,
    /// Consecutive local days ending today with at least one session
    pub current_streak: u32,
    pub most_productive_day: Option<ProductiveDay>,
    pub daily_breakdown: BTreeMap<NaiveDate, DayTotals>,
}

/// Active sessions completed on the local calendar day of `now`
pub fn today_sessions<'a>(
    sessions: &'a [Session],
    now: DateTime<Utc>,
    policy: &CalendarPolicy,
) -> (Vec<&'a Session>, TodaySummary) {
    let today = policy.local_date(now);
    let todays: Vec<&Session> = sessions
        .iter()
        .filter(|s| !s.is_deleted() && policy.local_date(s.completed_at) == today)
        .collect();

    let total_minutes: u64 = todays.iter().map(|s| u64::from(s.minutes)).sum();
    let summary = TodaySummary {
        date: today,
        total_sessions: todays.len(),
        total_minutes,
        total_hours: hours(total_minutes),
    };
    (todays, summary)
}

impl FocusReport {
    /// Report over the last `days` days, at most [`MAX_STATS_DAYS`].
    ///
    /// Totals and the breakdown cover the window; the streak counts back
    /// from today across every active session.
    pub fn compute(
        sessions: &[Session],
        days: u32,
        now: DateTime<Utc>,
        policy: &CalendarPolicy,
    ) -> Self {
        let days = days.min(MAX_STATS_DAYS);
        let window_start = now
            .checked_sub_signed(Duration::days(i64::from(days)))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let active: Vec<&Session> = sessions.iter().filter(|s| !s.is_deleted()).collect();

        let mut daily_breakdown: BTreeMap<NaiveDate, DayTotals> = BTreeMap::new();
        for session in active.iter().filter(|s| s.completed_at >= window_start) {
            let day = daily_breakdown
                .entry(policy.local_date(session.completed_at))
                .or_default();
            day.count += 1;
            day.minutes += u64::from(session.minutes);
        }

        let total_sessions: usize = daily_breakdown.values().map(|d| d.count).sum();
        let total_minutes: u64 = daily_breakdown.values().map(|d| d.minutes).sum();

        // Earliest date wins a tie
        let most_productive_day = daily_breakdown
            .iter()
            .filter(|(_, totals)| totals.minutes > 0)
            .fold(None::<ProductiveDay>, |best, (date, totals)| match best {
                Some(b) if b.minutes >= totals.minutes => Some(b),
                _ => Some(ProductiveDay {
                    date: *date,
                    count: totals.count,
                    minutes: totals.minutes,
                }),
            });

        let active_days: HashSet<NaiveDate> = active
            .iter()
            .map(|s| policy.local_date(s.completed_at))
            .collect();
        let mut current_streak = 0;
        let mut cursor = policy.local_date(now);
        while active_days.contains(&cursor) {
            current_streak += 1;
            match cursor.pred_opt() {
                Some(prev) => cursor = prev,
                None => break,
            }
        }

        let (sessions_per_day, minutes_per_day) = if days > 0 {
            (
                (total_sessions as f64 / f64::from(days) * 10.0).round() / 10.0,
                (total_minutes as f64 / f64::from(days)).round() as u64,
            )
        } else {
            (0.0, 0)
        };

        FocusReport {
            days,
            start_date: policy.local_date(window_start),
            end_date: policy.local_date(now),
            total_sessions,
            total_minutes,
            total_hours: hours(total_minutes),
            sessions_per_day,
            minutes_per_day,
            current_streak,
            most_productive_day,
            daily_breakdown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::RecordMeta;
    use chrono::TimeZone;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, day, hour, 0, 0).unwrap()
    }

    fn session(minutes: u32, completed_at: DateTime<Utc>) -> Session {
        Session {
            meta: RecordMeta::new(completed_at),
            minutes,
            completed_at,
        }
    }

    #[test]
    fn test_today_summary() {
        let policy = CalendarPolicy::default();
        let mut gone = session(25, at(10, 9));
        gone.meta.deleted = true;
        let sessions = vec![
            session(25, at(10, 8)),
            session(50, at(10, 14)),
            session(25, at(9, 23)),
            gone,
        ];

        let (todays, summary) = today_sessions(&sessions, at(10, 18), &policy);
        assert_eq!(todays.len(), 2);
        assert_eq!(summary.total_sessions, 2);
        assert_eq!(summary.total_minutes, 75);
        assert_eq!(summary.total_hours, 1.3);
        assert_eq!(summary.date, NaiveDate::from_ymd_opt(2024, 5, 10).unwrap());
    }

    #[test]
    fn test_report_breakdown_and_streak() {
        let policy = CalendarPolicy::default();
        let sessions = vec![
            session(25, at(10, 8)),
            session(25, at(9, 8)),
            session(50, at(9, 12)),
            session(25, at(8, 8)),
            // gap on the 7th
            session(90, at(6, 8)),
            // outside a 7-day window
            session(25, at(1, 8)),
        ];

        let report = FocusReport::compute(&sessions, 7, at(10, 18), &policy);
        assert_eq!(report.total_sessions, 5);
        assert_eq!(report.total_minutes, 215);
        assert_eq!(report.current_streak, 3);
        assert_eq!(report.minutes_per_day, 31);
        assert_eq!(report.sessions_per_day, 0.7);
        assert_eq!(report.daily_breakdown.len(), 4);

        let best = report.most_productive_day.unwrap();
        assert_eq!(best.date, NaiveDate::from_ymd_opt(2024, 5, 6).unwrap());
        assert_eq!(best.minutes, 90);
    }

    #[test]
    fn test_streak_is_zero_without_a_session_today() {
        let policy = CalendarPolicy::default();
        let sessions = vec![session(25, at(9, 8))];
        let report = FocusReport::compute(&sessions, 7, at(10, 18), &policy);
        assert_eq!(report.current_streak, 0);
        assert_eq!(report.total_sessions, 1);
    }

    #[test]
    fn test_oversized_window_is_clamped() {
        let policy = CalendarPolicy::default();
        let sessions = vec![session(25, at(10, 8)), session(25, at(1, 8))];

        let report = FocusReport::compute(&sessions, u32::MAX, at(10, 18), &policy);
        assert_eq!(report.days, MAX_STATS_DAYS);
        assert_eq!(report.total_sessions, 2);
        assert_eq!(report.end_date, NaiveDate::from_ymd_opt(2024, 5, 10).unwrap());
    }
}
