//! Extraction module - repair, validate and convert generator output.
//!
//! The generator is untrusted. Its raw text goes through three steps:
//! 1. [`repair_json`] recovers a JSON value from fenced or chatty output
//! 2. [`parse_model_output`] checks it against the response schema
//! 3. [`to_event`] turns each valid item into an [`Event`], filling gaps
//!    from the article and marking the result `partial`

use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SchemaViolation;
use crate::geo::{valid_coordinates, UNKNOWN_COUNTRY};
use crate::types::article::Article;
use crate::types::event::{Event, EventType, ExtractionStatus, Location};

/// Response shape requested from the generator.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExtractionResponse {
    /// Every distinct disruption the article reports
    pub events: Vec<ExtractedEventItem>,
}

/// One event as the generator reports it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ExtractedEventItem {
    /// Subtype from the allowed list, or "unknown"
    #[serde(alias = "disruption_type", alias = "type")]
    pub event_type: Option<String>,

    /// Country name or ISO code
    #[serde(default)]
    pub country: Option<String>,

    /// State, province or region
    #[serde(default, alias = "region")]
    pub admin1: Option<String>,

    #[serde(default)]
    pub lat: Option<f64>,

    #[serde(default)]
    pub lon: Option<f64>,

    /// YYYY-MM-DD
    #[serde(default, alias = "event_date", alias = "date")]
    pub start_date: Option<String>,

    /// YYYY-MM-DD
    #[serde(default)]
    pub end_date: Option<String>,

    #[serde(default)]
    pub actors: Vec<String>,

    #[serde(default)]
    pub description: Option<String>,

    /// 0.0 to 1.0
    pub confidence: Option<f64>,
}

/// An item that passed schema validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidItem {
    pub event_type: EventType,
    pub country: Option<String>,
    pub admin1: Option<String>,
    pub coordinates: Option<(f64, f64)>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub actors: Vec<String>,
    pub description: Option<String>,
    pub confidence: f64,
}

/// Recover a JSON value from raw generator text.
///
/// Handles markdown code fences and prose around the payload by falling
/// back to the outermost `{...}` or `[...]` span.
pub fn repair_json(raw: &str) -> Result<Value, SchemaViolation> {
    let text = strip_fences(raw.trim());
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return Ok(value);
    }

    let open = text.find(['{', '[']);
    let candidate = open.and_then(|start| {
        let close = if text[start..].starts_with('{') { '}' } else { ']' };
        text.rfind(close)
            .filter(|end| *end > start)
            .map(|end| &text[start..=end])
    });

    candidate
        .and_then(|span| serde_json::from_str::<Value>(span).ok())
        .ok_or_else(|| SchemaViolation::NotJson(snippet(raw)))
}

fn strip_fences(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the language tag line
    let body = rest.split_once('\n').map(|(_, b)| b).unwrap_or(rest);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

fn snippet(raw: &str) -> String {
    const MAX: usize = 80;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }
    match trimmed.char_indices().nth(MAX) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}

/// Validate raw output against the response schema.
///
/// Accepts `{"events": [...]}`, a bare array, or a single event object.
/// Items typed `unknown` mean "no qualifying disruption" and are dropped
/// here, so an empty result is a legitimate `no_event`.
pub fn parse_model_output(raw: &str) -> Result<Vec<ValidItem>, SchemaViolation> {
    let items = match repair_json(raw)? {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("events") {
            Some(Value::Array(items)) => items,
            Some(Value::Null) => Vec::new(),
            Some(other) => {
                return Err(SchemaViolation::InvalidValue {
                    field: "events".to_string(),
                    value: snippet(&other.to_string()),
                })
            }
            None if ["event_type", "disruption_type", "type"]
                .iter()
                .any(|k| map.contains_key(*k)) =>
            {
                vec![Value::Object(map)]
            }
            None => return Err(SchemaViolation::MissingField("events".to_string())),
        },
        other => {
            return Err(SchemaViolation::InvalidValue {
                field: "events".to_string(),
                value: snippet(&other.to_string()),
            })
        }
    };

    let mut valid = Vec::with_capacity(items.len());
    for (i, item) in items.into_iter().enumerate() {
        if let Some(item) = validate_item(i, item)? {
            valid.push(item);
        }
    }
    Ok(valid)
}

fn validate_item(index: usize, value: Value) -> Result<Option<ValidItem>, SchemaViolation> {
    let field = |name: &str| format!("events[{index}].{name}");

    let item: ExtractedEventItem =
        serde_json::from_value(value).map_err(|e| SchemaViolation::InvalidValue {
            field: format!("events[{index}]"),
            value: e.to_string(),
        })?;

    let type_label = non_blank(item.event_type).ok_or_else(|| SchemaViolation::MissingField(field("event_type")))?;
    let event_type: EventType = type_label
        .parse()
        .map_err(|_| SchemaViolation::UnknownEventType(type_label.clone()))?;
    if event_type.is_unknown() {
        return Ok(None);
    }

    let confidence = item
        .confidence
        .ok_or_else(|| SchemaViolation::MissingField(field("confidence")))?;
    if !(0.0..=1.0).contains(&confidence) {
        return Err(SchemaViolation::InvalidValue {
            field: field("confidence"),
            value: confidence.to_string(),
        });
    }

    let start_date = parse_date(&field("start_date"), item.start_date)?;
    let end_date = parse_date(&field("end_date"), item.end_date)?;

    let coordinates = match (item.lat, item.lon) {
        (Some(lat), Some(lon)) if valid_coordinates(lat, lon) => Some((lat, lon)),
        (None, None) => None,
        (lat, lon) => {
            return Err(SchemaViolation::InvalidValue {
                field: field("lat/lon"),
                value: format!("{lat:?},{lon:?}"),
            })
        }
    };

    let country = non_blank(item.country).filter(|c| {
        let lowered = c.to_lowercase();
        lowered != "unknown" && lowered != "unk"
    });

    Ok(Some(ValidItem {
        event_type,
        country,
        admin1: non_blank(item.admin1),
        coordinates,
        start_date,
        end_date,
        actors: item
            .actors
            .into_iter()
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .collect(),
        description: non_blank(item.description),
        confidence,
    }))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_date(field: &str, value: Option<String>) -> Result<Option<NaiveDate>, SchemaViolation> {
    match non_blank(value) {
        None => Ok(None),
        Some(v) if v.eq_ignore_ascii_case("null") => Ok(None),
        Some(v) => NaiveDate::parse_from_str(&v, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| SchemaViolation::InvalidValue {
                field: field.to_string(),
                value: v,
            }),
    }
}

/// Build an event from a validated item.
///
/// Gaps are filled from the article and each one multiplies confidence by
/// `partial_factor`:
/// - no start date: the article's publication date
/// - no country: the article's country hint, else `UNK`
/// - no description: empty
/// - end date before start date: dropped
pub fn to_event(article: &Article, item: ValidItem, partial_factor: f64) -> Event {
    let mut missing = 0;

    let start_date = item.start_date.unwrap_or_else(|| {
        missing += 1;
        article.published_at
    });

    let country = match item.country {
        Some(country) => country,
        None => {
            missing += 1;
            article
                .country_hint
                .clone()
                .unwrap_or_else(|| UNKNOWN_COUNTRY.to_string())
        }
    };

    let mut location = Location::country(&country);
    if let Some(admin1) = item.admin1 {
        location = location.with_admin1(admin1);
    }
    if let Some((lat, lon)) = item.coordinates {
        location = location.with_coordinates(lat, lon);
    }

    let description = item.description.unwrap_or_else(|| {
        missing += 1;
        String::new()
    });

    let end_date = match item.end_date {
        Some(end) if end < start_date => {
            missing += 1;
            None
        }
        other => other,
    };

    let status = if missing == 0 {
        ExtractionStatus::Ok
    } else {
        ExtractionStatus::Partial
    };

    let mut event = Event::new(&article.id, item.event_type, location, start_date)
        .with_actors(item.actors)
        .with_description(description)
        .with_confidence(item.confidence * partial_factor.powi(missing))
        .with_status(status);
    if let Some(end) = end_date {
        event = event.with_end_date(end);
    }
    event
}

/// Placeholder recorded when every attempt for an article failed.
pub fn failed_event(article: &Article, detail: &str) -> Event {
    let country = article
        .country_hint
        .clone()
        .unwrap_or_else(|| UNKNOWN_COUNTRY.to_string());
    Event::new(
        &article.id,
        EventType::Unknown,
        Location::country(&country),
        article.published_at,
    )
    .with_description(detail)
    .with_confidence(0.0)
    .with_status(ExtractionStatus::Failed)
}
