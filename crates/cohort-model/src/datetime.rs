//! Date parsing for the temporal columns of a table.
//!
//! Only calendar dates take part in matching, so datetimes are truncated to
//! their date component.

use chrono::{NaiveDate, NaiveDateTime};

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%d-%b-%Y %H:%M:%S", // 15-Jan-2024 10:30:00
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%Y%m%d",   // Compact: 20240115
    "%d-%b-%Y", // 15-Jan-2024
    "%d-%B-%Y", // 15-January-2024
    "%d.%m.%Y", // German: 15.01.2024
    "%d/%m/%Y", // European: 15/01/2024
    "%m/%d/%Y", // US: 01/15/2024
];

/// Parse a date or datetime string into a calendar date.
///
/// Returns `None` for empty or unrecognised input.
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use cohort_model::datetime::parse_date;
///
/// let expected = NaiveDate::from_ymd_opt(2001, 3, 2);
/// assert_eq!(parse_date("2001-03-02"), expected);
/// assert_eq!(parse_date("2001-03-02T14:30:00"), expected);
/// assert_eq!(parse_date("20010302"), expected);
/// assert_eq!(parse_date("02-Mar-2001"), expected);
/// assert_eq!(parse_date("not a date"), None);
/// ```
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, fmt) {
            return Some(date);
        }
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Some(dt.date());
        }
    }
    None
}

/// Signed number of days from `anchor` to `other` (`other - anchor`).
pub fn day_difference(anchor: NaiveDate, other: NaiveDate) -> i64 {
    other.signed_duration_since(anchor).num_days()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn parses_iso_and_compact_dates() {
        assert_eq!(parse_date("2024-01-15"), Some(ymd(2024, 1, 15)));
        assert_eq!(parse_date("2024/01/15"), Some(ymd(2024, 1, 15)));
        assert_eq!(parse_date("20240115"), Some(ymd(2024, 1, 15)));
        assert_eq!(parse_date("  2024-01-15  "), Some(ymd(2024, 1, 15)));
    }

    #[test]
    fn truncates_datetimes() {
        assert_eq!(parse_date("2024-01-15T23:59:59"), Some(ymd(2024, 1, 15)));
        assert_eq!(parse_date("2024-01-15 08:00"), Some(ymd(2024, 1, 15)));
        assert_eq!(parse_date("2024-01-15T08:00:00.250"), Some(ymd(2024, 1, 15)));
    }

    #[test]
    fn european_form_wins_over_us_form() {
        assert_eq!(parse_date("03/02/2001"), Some(ymd(2001, 2, 3)));
        // Only valid as month/day.
        assert_eq!(parse_date("12/31/2001"), Some(ymd(2001, 12, 31)));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_date(""), None);
        assert_eq!(parse_date("2024-13-40"), None);
        assert_eq!(parse_date("unknown"), None);
    }

    #[test]
    fn day_difference_is_signed() {
        let anchor = ymd(2001, 1, 1);
        assert_eq!(day_difference(anchor, ymd(2001, 1, 15)), 14);
        assert_eq!(day_difference(anchor, ymd(2000, 12, 20)), -12);
        assert_eq!(day_difference(anchor, anchor), 0);
    }
}
