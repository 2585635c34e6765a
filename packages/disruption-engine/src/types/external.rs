//! External dataset records - raw foreign rows and their canonical form.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::event::{EventType, Location};

/// Inclusive date window used when fetching from a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Create a range; bounds are swapped if given in reverse.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self { start: end, end: start }
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Whether `[start, end]` intersects this range.
    pub fn overlaps(&self, start: NaiveDate, end: NaiveDate) -> bool {
        start <= self.end && end >= self.start
    }

    /// Widen both ends by `days`.
    pub fn padded(&self, days: i64) -> Self {
        let pad = chrono::Duration::days(days);
        Self {
            start: self.start - pad,
            end: self.end + pad,
        }
    }
}

/// One foreign row exactly as the dataset delivered it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord {
    pub fields: serde_json::Map<String, Value>,
}

impl RawRecord {
    /// Build from a JSON value; non-objects yield `None`.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self { fields }),
            _ => None,
        }
    }

    /// Builder used by tests and static feeds.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Field as trimmed text; numbers are rendered, empty strings and nulls are `None`.
    pub fn text(&self, key: &str) -> Option<String> {
        match self.fields.get(key)? {
            Value::String(s) => {
                let trimmed = s.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Field as a float, accepting numeric strings.
    pub fn number(&self, key: &str) -> Option<std::result::Result<f64, String>> {
        match self.fields.get(key)? {
            Value::Number(n) => n.as_f64().map(Ok),
            Value::String(s) if s.trim().is_empty() => None,
            Value::String(s) => Some(s.trim().parse::<f64>().map_err(|_| s.clone())),
            Value::Null => None,
            other => Some(Err(other.to_string())),
        }
    }

    /// First present text field among `keys`, for logging malformed rows.
    pub fn identifier(&self, keys: &[&str]) -> String {
        keys.iter()
            .find_map(|k| self.text(k))
            .unwrap_or_else(|| "<no id>".to_string())
    }

    /// Every scalar field rendered as a string.
    pub fn to_string_map(&self) -> BTreeMap<String, String> {
        self.fields
            .iter()
            .filter_map(|(k, v)| {
                let rendered = match v {
                    Value::String(s) => s.clone(),
                    Value::Null => return None,
                    Value::Number(_) | Value::Bool(_) => v.to_string(),
                    Value::Array(_) | Value::Object(_) => v.to_string(),
                };
                Some((k.clone(), rendered))
            })
            .collect()
    }
}

/// How finely a dataset pins down when something happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatePrecision {
    Day,
    Month,
    Year,
}

/// Canonical form of a foreign incident, the only shape the validator sees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalRecord {
    pub external_id: String,
    pub dataset_name: String,

    /// Canonical type via the adapter's mapping table; `Unknown` for gaps
    pub event_type_mapped: EventType,

    /// The foreign type string the mapping was looked up with
    pub foreign_type: String,

    pub location: Location,

    /// First day of the record
    pub date: NaiveDate,

    /// Last day, for multi-day incidents or coarse precision
    #[serde(default)]
    pub date_end: Option<NaiveDate>,

    pub date_precision: DatePrecision,

    /// Free text used for textual similarity
    #[serde(default)]
    pub text: String,

    pub raw_fields: BTreeMap<String, String>,
}

impl ExternalRecord {
    /// Last day covered by the record.
    pub fn last_date(&self) -> NaiveDate {
        self.date_end.unwrap_or(self.date).max(self.date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_date_range_normalizes_order() {
        let range = DateRange::new(date(2024, 3, 5), date(2024, 3, 1));
        assert_eq!(range.start, date(2024, 3, 1));
        assert!(range.contains(date(2024, 3, 3)));
        assert!(range.overlaps(date(2024, 2, 20), date(2024, 3, 1)));
        assert!(!range.overlaps(date(2024, 3, 6), date(2024, 3, 9)));
    }

    #[test]
    fn test_raw_record_accessors() {
        let raw = RawRecord::from_value(json!({
            "id": 42,
            "lat": "-6.5",
            "lon": "east",
            "name": "  ",
            "missing": null
        }))
        .unwrap();

        assert_eq!(raw.text("id").as_deref(), Some("42"));
        assert_eq!(raw.text("name"), None);
        assert_eq!(raw.number("lat"), Some(Ok(-6.5)));
        assert!(matches!(raw.number("lon"), Some(Err(_))));
        assert_eq!(raw.number("missing"), None);
        assert_eq!(raw.identifier(&["event_id", "id"]), "42");
        assert!(!raw.to_string_map().contains_key("missing"));
    }

    #[test]
    fn test_non_object_rejected() {
        assert!(RawRecord::from_value(json!([1, 2])).is_none());
    }
}
