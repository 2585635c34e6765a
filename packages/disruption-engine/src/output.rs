//! Stable output formats: JSON Lines and flattened CSV.

use std::io::Write;

use serde::Serialize;

use crate::error::Result;
use crate::types::event::Event;
use crate::types::validation::ValidationMatch;

/// Separator for list-valued CSV cells.
const LIST_SEPARATOR: &str = "; ";

/// One CSV row per event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventRow {
    pub event_id: String,
    pub source_article_id: String,
    pub event_type: String,
    pub country: String,
    pub admin1: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub start_date: String,
    pub end_date: Option<String>,
    pub actors: String,
    pub description: String,
    pub confidence: f64,
    pub extraction_status: String,
}

impl From<&Event> for EventRow {
    fn from(event: &Event) -> Self {
        Self {
            event_id: event.event_id.clone(),
            source_article_id: event.source_article_id.clone(),
            event_type: event.event_type.to_string(),
            country: event.location.country.clone(),
            admin1: event.location.admin1.clone(),
            lat: event.location.lat,
            lon: event.location.lon,
            start_date: event.start_date.to_string(),
            end_date: event.end_date.map(|d| d.to_string()),
            actors: event.actors.join(LIST_SEPARATOR),
            description: event.description.clone(),
            confidence: event.confidence,
            extraction_status: event.extraction_status.as_str().to_string(),
        }
    }
}

/// One CSV row per validation match, field scores flattened into columns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchRow {
    pub event_id: String,
    pub dataset_name: String,
    pub external_id: Option<String>,
    pub score: f64,
    pub tier: String,
    pub reason: Option<String>,
    pub time_score: Option<f64>,
    pub geo_score: Option<f64>,
    pub type_score: Option<f64>,
    pub text_score: Option<f64>,
    pub date_delta_days: Option<i64>,
    pub distance_km: Option<f64>,
}

impl From<&ValidationMatch> for MatchRow {
    fn from(m: &ValidationMatch) -> Self {
        let field = |name: &str| m.field_scores.get(name).copied();
        Self {
            event_id: m.event_id.clone(),
            dataset_name: m.dataset_name.clone(),
            external_id: m.external_id.clone(),
            score: m.score,
            tier: m.tier.as_str().to_string(),
            reason: m.reason.map(|r| r.as_str().to_string()),
            time_score: field("time"),
            geo_score: field("geo"),
            type_score: field("type"),
            text_score: field("text"),
            date_delta_days: m.date_delta_days,
            distance_km: m.distance_km,
        }
    }
}

/// Write each item as one JSON line. Returns the number of lines written.
pub fn write_jsonl<'a, T, W>(mut writer: W, items: impl IntoIterator<Item = &'a T>) -> Result<usize>
where
    T: Serialize + 'a,
    W: Write,
{
    let mut written = 0;
    for item in items {
        serde_json::to_writer(&mut writer, item)?;
        writer.write_all(b"\n")?;
        written += 1;
    }
    writer.flush()?;
    Ok(written)
}

fn write_csv<R: Serialize, W: Write>(writer: W, rows: impl IntoIterator<Item = R>) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    for row in rows {
        csv.serialize(row).map_err(std::io::Error::from)?;
    }
    csv.flush()?;
    Ok(())
}

pub fn write_events_csv<W: Write>(writer: W, events: &[Event]) -> Result<()> {
    write_csv(writer, events.iter().map(EventRow::from))
}

pub fn write_matches_csv<W: Write>(writer: W, matches: &[ValidationMatch]) -> Result<()> {
    write_csv(writer, matches.iter().map(MatchRow::from))
}
