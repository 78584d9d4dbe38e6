//! Timestamp and identifier parsing for raw work-order exports.
//!
//! The municipal export writes timestamps as `01/15/2015 02:30:00 PM`;
//! re-exports and API pulls use ISO 8601. Both are accepted.

use chrono::{NaiveDate, NaiveDateTime};

/// Datetime formats tried in order.
const DATETIME_FORMATS: &[&str] = &[
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
];

/// Date-only formats, interpreted as midnight.
const DATE_FORMATS: &[&str] = &["%m/%d/%Y", "%Y-%m-%d"];

/// Parses a raw timestamp. Returns `None` for empty or unparseable input.
#[must_use]
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    // Trailing UTC designators carry no information for local exports.
    let s = s.strip_suffix('Z').unwrap_or(s);

    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(dt);
        }
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            return date.and_hms_opt(0, 0, 0);
        }
    }

    None
}

/// Parses a record identifier. Accepts integral floats (`"123.0"`) as
/// written by spreadsheet round-trips.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
pub fn parse_object_id(s: &str) -> Option<i64> {
    let s = s.trim();
    if let Ok(id) = s.parse::<i64>() {
        return Some(id);
    }
    let float = s.parse::<f64>().ok()?;
    if float.fract() == 0.0 && float.abs() < 9.0e15 {
        return Some(float as i64);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_municipal_export_format() {
        let dt = parse_timestamp("01/15/2015 02:30:00 PM").unwrap();
        assert_eq!(dt.to_string(), "2015-01-15 14:30:00");
    }

    #[test]
    fn parses_iso_with_fraction_and_zulu() {
        let dt = parse_timestamp("2015-01-15T14:30:00.000Z").unwrap();
        assert_eq!(dt.to_string(), "2015-01-15 14:30:00");
    }

    #[test]
    fn parses_bare_date_as_midnight() {
        let dt = parse_timestamp("2015-01-15").unwrap();
        assert_eq!(dt.to_string(), "2015-01-15 00:00:00");
    }

    #[test]
    fn rejects_garbage_and_empty() {
        assert!(parse_timestamp("yesterday").is_none());
        assert!(parse_timestamp("   ").is_none());
        assert!(parse_timestamp("13/45/2015 10:00:00 AM").is_none());
    }

    #[test]
    fn parses_integral_float_ids() {
        assert_eq!(parse_object_id("42"), Some(42));
        assert_eq!(parse_object_id(" 42.0 "), Some(42));
        assert_eq!(parse_object_id("42.5"), None);
        assert_eq!(parse_object_id("abc"), None);
    }
}
