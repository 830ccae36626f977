//! Month-bucket conversions for the monthly gold views.
//!
//! Monthly views key rows by the first day of the month. These helpers parse
//! user-supplied dates, label months, and derive the default windows the
//! dashboard opens with.

use chrono::{Datelike, Months, NaiveDate, NaiveDateTime};
use serde::Serialize;

/// Months the dashboard looks back by default.
pub const DEFAULT_LOOKBACK_MONTHS: u32 = 3;

/// Inclusive range of months available in the warehouse.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MonthBounds {
    pub min: NaiveDate,
    pub max: NaiveDate,
    /// True when the warehouse had no rows and the window was synthesized.
    pub bootstrapped: bool,
}

/// Format a date as its month key (`YYYY-MM`).
pub fn month_label(date: NaiveDate) -> String {
    date.format("%Y-%m").to_string()
}

/// First day of the month containing `date`.
pub fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// `date` moved back by `months`, clamped to the end of shorter months.
pub fn months_before(date: NaiveDate, months: u32) -> NaiveDate {
    date.checked_sub_months(Months::new(months))
        .unwrap_or(NaiveDate::MIN)
}

/// The month start `months` month starts before `date`. A date already on a
/// month start steps back whole months; any other date counts the start of
/// its own month as the first step.
pub fn month_starts_before(date: NaiveDate, months: u32) -> NaiveDate {
    let start = month_start(date);
    let steps = if start == date {
        months
    } else {
        months.saturating_sub(1)
    };
    months_before(start, steps)
}

/// Parse a user-supplied date: `YYYY-MM-DD` or `YYYY-MM` (first of month).
pub fn parse_user_date(input: &str) -> Option<NaiveDate> {
    let s = input.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .or_else(|| NaiveDate::parse_from_str(&format!("{s}-01"), "%Y-%m-%d").ok())
}

/// Parse a date-ish warehouse value: a date, a timestamp, or an RFC 3339
/// instant (time of day is discarded).
pub fn parse_warehouse_date(input: &str) -> Option<NaiveDate> {
    let s = input.trim();
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d);
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    None
}

/// Window used when the warehouse has no monthly rows: the last three
/// months up to `today`.
pub fn bootstrap_bounds(today: NaiveDate) -> MonthBounds {
    MonthBounds {
        min: month_starts_before(today, DEFAULT_LOOKBACK_MONTHS),
        max: today,
        bootstrapped: true,
    }
}

/// Default selected window inside `bounds`: roughly the last three months,
/// never starting before the first available month. A single-month
/// warehouse yields `start == end`.
pub fn default_window(bounds: &MonthBounds) -> (NaiveDate, NaiveDate) {
    let start = month_starts_before(bounds.max, DEFAULT_LOOKBACK_MONTHS).max(bounds.min);
    (start, bounds.max)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
