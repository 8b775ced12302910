//! Domain data structures for listing days, access tokens and programme entries.

use std::{array, fmt};

use chrono::{Datelike, Days, Duration, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Offset suffix appended to every XMLTV timestamp written by epgpatch.
pub const XMLTV_OFFSET: &str = "+0800";

/// Offset of the listing site's local time from UTC, in seconds.
pub const LISTING_UTC_OFFSET_SECS: i64 = 8 * 3600;

/// Number of consecutive days fetched per run, today included.
pub const WINDOW_DAYS: usize = 3;

const XMLTV_TIME_FORMAT: &str = "%Y%m%d%H%M%S";

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Short-lived token handed out by the listing site for its AJAX endpoint.
pub struct AccessToken(pub String);

impl AccessToken {
    /// Borrow the raw token value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Tokens should not end up in logs verbatim.
impl fmt::Debug for AccessToken {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "AccessToken(<{} chars>)", self.0.chars().count())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
/// One calendar day of the listing window together with the site's weekday index.
pub struct ScheduleDay {
    /// Calendar date the listings belong to.
    pub date: NaiveDate,
    /// Weekday index used in listing URLs: Monday is 1, Sunday is 7.
    pub weekday: u32,
}

impl ScheduleDay {
    /// Build the listing day for `date`.
    #[must_use]
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            weekday: date.weekday().num_days_from_monday() + 1,
        }
    }
}

/// Resolve the listing window: `today` and the following days, ascending.
#[must_use]
pub fn resolve_window(today: NaiveDate) -> [ScheduleDay; WINDOW_DAYS] {
    array::from_fn(|offset| ScheduleDay::new(today + Days::new(offset as u64)))
}

/// Current calendar date in the listing site's time zone.
#[must_use]
pub fn today_in_listing_zone() -> NaiveDate {
    (Utc::now().naive_utc() + Duration::seconds(LISTING_UTC_OFFSET_SECS)).date()
}

/// Format a naive listing time as an XMLTV timestamp with the fixed `+0800` suffix.
#[must_use]
pub fn format_xmltv(time: NaiveDateTime) -> String {
    format!("{} {XMLTV_OFFSET}", time.format(XMLTV_TIME_FORMAT))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// A programme slot scraped from the listing site.
pub struct ProgramEntry {
    /// Naive start time in the listing site's local time.
    pub start: NaiveDateTime,
    /// `start` rendered for XMLTV output.
    pub start_formatted: String,
    /// Programme title.
    pub title: String,
}

impl ProgramEntry {
    /// Create an entry, pre-rendering its XMLTV start time.
    #[must_use]
    pub fn new(start: NaiveDateTime, title: impl Into<String>) -> Self {
        Self {
            start,
            start_formatted: format_xmltv(start),
            title: title.into(),
        }
    }
}

/// Stable sort by start time; entries sharing a start keep their relative order.
pub fn sort_by_start(entries: &mut [ProgramEntry]) {
    entries.sort_by_key(|entry| entry.start);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    #[test]
    fn weekday_index_starts_at_monday() {
        // 2026-10-19 is a Monday.
        assert_eq!(ScheduleDay::new(date(2026, 10, 19)).weekday, 1);
        assert_eq!(ScheduleDay::new(date(2026, 10, 24)).weekday, 6);
        assert_eq!(ScheduleDay::new(date(2026, 10, 25)).weekday, 7);
    }

    #[test]
    fn window_covers_three_ascending_days_across_week_boundary() {
        let window = resolve_window(date(2026, 10, 24));
        let days: Vec<(NaiveDate, u32)> = window.iter().map(|day| (day.date, day.weekday)).collect();
        assert_eq!(
            days,
            vec![
                (date(2026, 10, 24), 6),
                (date(2026, 10, 25), 7),
                (date(2026, 10, 26), 1),
            ]
        );
    }

    #[test]
    fn window_crosses_month_end() {
        let window = resolve_window(date(2026, 10, 31));
        assert_eq!(window[2].date, date(2026, 11, 2));
    }

    #[test]
    fn xmltv_format_has_fixed_offset() {
        let start = date(2026, 10, 19).and_hms_opt(9, 15, 0).expect("valid time");
        assert_eq!(format_xmltv(start), "20261019091500 +0800");
        assert_eq!(ProgramEntry::new(start, "x").start_formatted, "20261019091500 +0800");
    }

    #[test]
    fn sort_keeps_insertion_order_for_equal_starts() {
        let at = |hour| date(2026, 10, 19).and_hms_opt(hour, 0, 0).expect("valid time");
        let mut entries = vec![
            ProgramEntry::new(at(9), "page nine"),
            ProgramEntry::new(at(8), "page eight"),
            ProgramEntry::new(at(9), "ajax nine"),
            ProgramEntry::new(at(8), "ajax eight"),
        ];
        sort_by_start(&mut entries);
        let titles: Vec<&str> = entries.iter().map(|entry| entry.title.as_str()).collect();
        assert_eq!(titles, ["page eight", "ajax eight", "page nine", "ajax nine"]);
    }

    #[test]
    fn token_debug_hides_value() {
        let token = AccessToken("secret-value".to_owned());
        assert!(!format!("{token:?}").contains("secret"));
    }
}
