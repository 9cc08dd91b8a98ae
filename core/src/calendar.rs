//! Weekly calendar navigation.

use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};

/// Number of days shown per calendar page.
pub const DAYS_PER_WEEK: usize = 7;

/// One day cell of the weekly calendar
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarDay {
    /// The calendar date
    pub date: NaiveDate,
    /// Strictly before today; shown for context but not selectable
    pub is_past: bool,
}

/// The Sunday-first week containing `anchor`.
///
/// `today` is the venue-local current date and only feeds `is_past`.
#[must_use]
pub fn week_of(anchor: NaiveDate, today: NaiveDate) -> [CalendarDay; DAYS_PER_WEEK] {
    let sunday = anchor
        .checked_sub_days(Days::new(u64::from(anchor.weekday().num_days_from_sunday())))
        .unwrap_or(NaiveDate::MIN);

    std::array::from_fn(|offset| {
        let date = sunday
            .checked_add_days(Days::new(offset as u64))
            .unwrap_or(NaiveDate::MAX);
        CalendarDay {
            date,
            is_past: date < today,
        }
    })
}

/// Move `anchor` by whole weeks (negative goes back).
///
/// Saturates at the ends of the supported date range.
#[must_use]
pub fn shift_week(anchor: NaiveDate, delta_weeks: i64) -> NaiveDate {
    let days = delta_weeks.unsigned_abs().saturating_mul(7);
    let shifted = if delta_weeks >= 0 {
        anchor.checked_add_days(Days::new(days))
    } else {
        anchor.checked_sub_days(Days::new(days))
    };
    shifted.unwrap_or(if delta_weeks >= 0 {
        NaiveDate::MAX
    } else {
        NaiveDate::MIN
    })
}
