//! Pure enumeration of occurrence dates for each [`Recurrence`] variant,
//! evaluated within a schedule's IANA timezone.

use std::str::FromStr;

use chrono::{Datelike, NaiveDate, TimeZone};
use chrono_tz::Tz;
use cron::Schedule as CronSchedule;
use hearth_core::Recurrence;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecurrenceError {
    #[error("invalid cron expression {0:?}: {1}")]
    InvalidCron(String, String),

    #[error("invalid timezone {0:?}")]
    InvalidTimezone(String),
}

/// Enumerates every occurrence date in `[window_start, window_end]`
/// (inclusive) for `recurrence`, relative to `start_date`.
pub fn enumerate(
    recurrence: &Recurrence,
    timezone: &str,
    start_date: NaiveDate,
    window_start: NaiveDate,
    window_end: NaiveDate,
) -> Result<Vec<NaiveDate>, RecurrenceError> {
    if window_start > window_end {
        return Ok(Vec::new());
    }

    let dates = match recurrence {
        Recurrence::Daily => daily(window_start, window_end),
        Recurrence::Weekly { weekdays } => weekly(weekdays, window_start, window_end),
        Recurrence::MonthlyDay { day_of_month } => monthly_day(*day_of_month, window_start, window_end),
        Recurrence::MonthlyNthWeekday { nth, weekday } => {
            monthly_nth_weekday(*nth, *weekday, window_start, window_end)
        }
        Recurrence::Interval { seconds } => interval(*seconds, start_date, window_start, window_end),
        Recurrence::Cron { expression } => cron_dates(expression, timezone, window_start, window_end)?,
    };

    Ok(dates.into_iter().filter(|d| *d >= start_date).collect())
}

fn daily(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut dates = Vec::new();
    let mut d = start;
    while d <= end {
        dates.push(d);
        d += chrono::Duration::days(1);
    }
    dates
}

fn weekly(weekdays: &std::collections::BTreeSet<u8>, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    daily(start, end)
        .into_iter()
        .filter(|d| weekdays.contains(&(d.weekday().num_days_from_monday() as u8)))
        .collect()
}

fn monthly_day(day_of_month: u32, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut dates = Vec::new();
    let mut year = start.year();
    let mut month = start.month();

    loop {
        let last_day = last_day_of_month(year, month);
        let clamped = day_of_month.min(last_day);
        if let Some(date) = NaiveDate::from_ymd_opt(year, month, clamped) {
            if date > end {
                break;
            }
            if date >= start {
                dates.push(date);
            }
        }
        if month == 12 {
            year += 1;
            month = 1;
        } else {
            month += 1;
        }
        if year > end.year() + 1 {
            break;
        }
    }
    dates
}

fn monthly_nth_weekday(nth: u8, weekday: u8, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut dates = Vec::new();
    let mut year = start.year();
    let mut month = start.month();

    loop {
        if let Some(date) = nth_weekday_of_month(year, month, nth, weekday) {
            if date > end {
                break;
            }
            if date >= start {
                dates.push(date);
            }
        }
        if month == 12 {
            year += 1;
            month = 1;
        } else {
            month += 1;
        }
        if year > end.year() + 1 {
            break;
        }
    }
    dates
}

fn nth_weekday_of_month(year: i32, month: u32, nth: u8, weekday: u8) -> Option<NaiveDate> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let first_weekday = first.weekday().num_days_from_monday() as i64;
    let target = weekday as i64;
    let offset = (target - first_weekday).rem_euclid(7);
    let day = 1 + offset + (nth.saturating_sub(1) as i64) * 7;
    if day < 1 || day > last_day_of_month(year, month) as i64 {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, day as u32)
}

fn last_day_of_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .unwrap()
        .pred_opt()
        .unwrap()
        .day()
}

fn interval(seconds: i64, start_date: NaiveDate, window_start: NaiveDate, window_end: NaiveDate) -> Vec<NaiveDate> {
    let step_days = (seconds / 86_400).max(1);
    let mut dates = Vec::new();
    let mut d = start_date;
    while d <= window_end {
        if d >= window_start {
            dates.push(d);
        }
        d += chrono::Duration::days(step_days);
    }
    dates
}

/// Cron evaluation happens in the schedule's zone. Across a DST forward
/// jump a local time may not exist for an hour; the `cron` crate's
/// iterator simply skips non-existent local times, which is equivalent to
/// "take the first matching instant on the other side" for our purposes
/// since the next candidate instant is the following valid firing.
fn cron_dates(expression: &str, timezone: &str, window_start: NaiveDate, window_end: NaiveDate) -> Result<Vec<NaiveDate>, RecurrenceError> {
    let schedule = CronSchedule::from_str(expression)
        .map_err(|e| RecurrenceError::InvalidCron(expression.to_string(), e.to_string()))?;
    let tz: Tz = timezone.parse().map_err(|_| RecurrenceError::InvalidTimezone(timezone.to_string()))?;

    let start_of_window = tz
        .from_local_datetime(&window_start.and_hms_opt(0, 0, 0).unwrap())
        .earliest()
        .ok_or_else(|| RecurrenceError::InvalidTimezone(timezone.to_string()))?;

    let mut dates = Vec::new();
    let mut seen = std::collections::BTreeSet::new();
    for fire in schedule.after(&start_of_window) {
        let local_date = fire.date_naive();
        if local_date > window_end {
            break;
        }
        if seen.insert(local_date) {
            dates.push(local_date);
        }
    }
    Ok(dates)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daily_covers_whole_window() {
        let start = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2026, 1, 3).unwrap();
        let dates = enumerate(&Recurrence::Daily, "UTC", start, start, end).unwrap();
        assert_eq!(dates.len(), 3);
    }

    #[test]
    fn monthly_day_clamps_on_short_february() {
        let start = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let window_start = NaiveDate::from_ymd_opt(2026, 2, 1).unwrap();
        let window_end = NaiveDate::from_ymd_opt(2026, 2, 28).unwrap();
        let dates = enumerate(
            &Recurrence::MonthlyDay { day_of_month: 31 },
            "UTC",
            start,
            window_start,
            window_end,
        )
        .unwrap();
        assert_eq!(dates, vec![NaiveDate::from_ymd_opt(2026, 2, 28).unwrap()]);
    }

    #[test]
    fn monthly_nth_weekday_skips_months_without_a_fifth() {
        // 5th Monday of Feb 2026 does not exist (Feb 2026 has 4 Mondays).
        let start = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let window_start = NaiveDate::from_ymd_opt(2026, 2, 1).unwrap();
        let window_end = NaiveDate::from_ymd_opt(2026, 2, 28).unwrap();
        let dates = enumerate(
            &Recurrence::MonthlyNthWeekday { nth: 5, weekday: 0 },
            "UTC",
            start,
            window_start,
            window_end,
        )
        .unwrap();
        assert!(dates.is_empty());
    }

    #[test]
    fn weekly_filters_to_selected_weekdays() {
        let mut weekdays = std::collections::BTreeSet::new();
        weekdays.insert(0u8); // Monday
        let start = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(); // a Monday
        let end = NaiveDate::from_ymd_opt(2026, 3, 15).unwrap();
        let dates = enumerate(&Recurrence::Weekly { weekdays }, "UTC", start, start, end).unwrap();
        assert_eq!(dates.len(), 2);
        for d in dates {
            assert_eq!(d.weekday().num_days_from_monday(), 0);
        }
    }

    #[test]
    fn cron_dedupes_multiple_fires_per_day() {
        let start = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2026, 3, 3).unwrap();
        let dates = enumerate(
            &Recurrence::Cron { expression: "0 0,30 7 * * * *".into() },
            "UTC",
            start,
            start,
            end,
        )
        .unwrap();
        assert_eq!(dates.len(), 3);
    }
}
