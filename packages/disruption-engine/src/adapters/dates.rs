//! Date parsing for the encodings external datasets use.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};

use crate::error::{NormalizeError, NormalizeResult};
use crate::types::external::DatePrecision;

/// A foreign date resolved to a span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedDate {
    pub start: NaiveDate,
    /// Last day, when the value covers more than one day
    pub end: Option<NaiveDate>,
    pub precision: DatePrecision,
}

impl ParsedDate {
    pub fn day(date: NaiveDate) -> Self {
        Self {
            start: date,
            end: None,
            precision: DatePrecision::Day,
        }
    }
}

const DAY_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%Y/%m/%d", "%d %B %Y", "%d %b %Y", "%B %d, %Y"];

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"];

/// Parse a single calendar day from the common encodings, including ISO
/// datetimes (the time of day is dropped).
pub fn parse_day(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Some(date) = DAY_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(value, f).ok())
    {
        return Some(date);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.date_naive());
    }

    DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(value, f).ok())
        .map(|dt| dt.date())
}

/// Parse a day, a `YYYY-MM` month or a bare `YYYY` year.
///
/// Months and years become spans over every day they cover.
pub fn parse_flexible(value: &str) -> Option<ParsedDate> {
    if let Some(date) = parse_day(value) {
        return Some(ParsedDate::day(date));
    }

    let value = value.trim();
    if let Some((year, month)) = value.split_once('-') {
        let year: i32 = year.parse().ok()?;
        let month: u32 = month.parse().ok()?;
        let start = NaiveDate::from_ymd_opt(year, month, 1)?;
        return Some(ParsedDate {
            start,
            end: Some(last_day_of_month(start)?),
            precision: DatePrecision::Month,
        });
    }

    if value.len() == 4 {
        let year: i32 = value.parse().ok()?;
        return Some(ParsedDate {
            start: NaiveDate::from_ymd_opt(year, 1, 1)?,
            end: NaiveDate::from_ymd_opt(year, 12, 31),
            precision: DatePrecision::Year,
        });
    }

    None
}

fn last_day_of_month(first: NaiveDate) -> Option<NaiveDate> {
    let (year, month) = if first.month() == 12 {
        (first.year() + 1, 1)
    } else {
        (first.year(), first.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)?.pred_opt()
}

/// Parse a required day-precision field.
pub fn day_field(field: &str, value: Option<String>) -> NormalizeResult<NaiveDate> {
    let value = value.ok_or_else(|| NormalizeError::missing(field))?;
    parse_day(&value).ok_or(NormalizeError::InvalidDate {
        field: field.to_string(),
        value,
    })
}

/// Parse an optional day-precision field; present but unparsable is an error.
pub fn optional_day_field(field: &str, value: Option<String>) -> NormalizeResult<Option<NaiveDate>> {
    match value {
        None => Ok(None),
        Some(v) => day_field(field, Some(v)).map(Some),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_day_encodings() {
        assert_eq!(parse_day("2024-03-01"), Some(ymd(2024, 3, 1)));
        assert_eq!(parse_day("01/03/2024"), Some(ymd(2024, 3, 1)));
        assert_eq!(parse_day("1 March 2024"), Some(ymd(2024, 3, 1)));
        assert_eq!(parse_day("2024-03-01T18:30:00"), Some(ymd(2024, 3, 1)));
        assert_eq!(parse_day("2024-03-01T18:30:00Z"), Some(ymd(2024, 3, 1)));
        assert_eq!(parse_day("next tuesday"), None);
        assert_eq!(parse_day(""), None);
    }

    #[test]
    fn test_month_and_year_become_spans() {
        let month = parse_flexible("2024-02").unwrap();
        assert_eq!(month.start, ymd(2024, 2, 1));
        assert_eq!(month.end, Some(ymd(2024, 2, 29)));
        assert_eq!(month.precision, DatePrecision::Month);

        let december = parse_flexible("2023-12").unwrap();
        assert_eq!(december.end, Some(ymd(2023, 12, 31)));

        let year = parse_flexible("2023").unwrap();
        assert_eq!(year.start, ymd(2023, 1, 1));
        assert_eq!(year.end, Some(ymd(2023, 12, 31)));
        assert_eq!(year.precision, DatePrecision::Year);
    }

    #[test]
    fn test_day_field_errors() {
        assert!(matches!(
            day_field("event_date", None),
            Err(NormalizeError::MissingField { .. })
        ));
        assert!(matches!(
            day_field("event_date", Some("soon".into())),
            Err(NormalizeError::InvalidDate { .. })
        ));
        assert_eq!(optional_day_field("todate", None).unwrap(), None);
    }
}
