//! Rolling acquisition time window.

use chrono::{Days, NaiveDate};

/// Inclusive date range used to filter the imagery catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    /// First day of the window.
    pub start: NaiveDate,
    /// Last day of the window.
    pub end: NaiveDate,
}

impl TimeWindow {
    /// Window of `half_width_days` on either side of `today`.
    ///
    /// The window extends into the future; the catalog simply has no images there yet.
    pub fn around(today: NaiveDate, half_width_days: i64) -> Self {
        let days = Days::new(half_width_days.unsigned_abs());
        Self {
            start: today.checked_sub_days(days).unwrap_or(NaiveDate::MIN),
            end: today.checked_add_days(days).unwrap_or(NaiveDate::MAX),
        }
    }
}

impl std::fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}
