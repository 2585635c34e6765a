//! Political and protest event adapter.
//!
//! Protest trackers of this family code dates at mixed granularity: some
//! rows give a day, others only a `YYYY-MM` month or a bare year. Coarse
//! rows become spans covering the whole period, so blocking can still
//! overlap them with a dated event.

use async_trait::async_trait;

use super::dates::parse_flexible;
use super::feed::RecordFeed;
use super::mapping::MappingTable;
use super::{coordinates, fetch_from, joined_text, required_text};
use crate::error::{NormalizeError, NormalizeResult, Result};
use crate::traits::adapter::DatasetAdapter;
use crate::types::event::{EventType, Location};
use crate::types::external::{DateRange, ExternalRecord, RawRecord};

pub const DATASET: &str = "mmad";

pub fn default_mapping() -> MappingTable {
    MappingTable::new(DATASET)
        .with("strike", EventType::LabourStrike)
        .with("labour", EventType::LabourStrike)
        .with("labor", EventType::LabourStrike)
        .with("protest", EventType::Protest)
        .with("demonstration", EventType::Protest)
        .with("riot", EventType::Riot)
        .with("sanction", EventType::TradeEmbargo)
        .with("embargo", EventType::TradeEmbargo)
}

pub struct PoliticalEventAdapter {
    name: String,
    feed: Box<dyn RecordFeed>,
    mapping: MappingTable,
}

impl PoliticalEventAdapter {
    pub fn new(feed: impl RecordFeed + 'static) -> Self {
        Self {
            name: DATASET.to_string(),
            feed: Box::new(feed),
            mapping: default_mapping(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_mapping(mut self, mapping: MappingTable) -> Self {
        self.mapping = mapping;
        self
    }
}

#[async_trait]
impl DatasetAdapter for PoliticalEventAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, range: &DateRange) -> Result<Vec<RawRecord>> {
        fetch_from(self.feed.as_ref(), &self.name, range).await
    }

    fn normalize(&self, raw: &RawRecord) -> NormalizeResult<ExternalRecord> {
        let external_id = required_text(raw, "id")?;
        let foreign_type = raw
            .text("event_type")
            .or_else(|| raw.text("issue"))
            .ok_or_else(|| NormalizeError::missing("event_type"))?;

        let date_text = required_text(raw, "event_date")?;
        let parsed = parse_flexible(&date_text).ok_or(NormalizeError::InvalidDate {
            field: "event_date".to_string(),
            value: date_text,
        })?;

        let mut location = Location::country(&required_text(raw, "country")?);
        if let Some(region) = raw.text("location") {
            location = location.with_admin1(region);
        }
        if let Some((lat, lon)) = coordinates(raw, "latitude", "longitude")? {
            location = location.with_coordinates(lat, lon);
        }

        Ok(ExternalRecord {
            external_id,
            dataset_name: self.name.clone(),
            event_type_mapped: self.mapping.lookup(&foreign_type),
            foreign_type,
            location,
            date: parsed.start,
            date_end: parsed.end,
            date_precision: parsed.precision,
            text: joined_text(raw, &["description", "actors", "side", "issue"]),
            raw_fields: raw.to_string_map(),
        })
    }

    fn mapping(&self) -> &MappingTable {
        &self.mapping
    }
}
