//! GDACS disaster alert adapter.
//!
//! GDACS events span `fromdate`..`todate` as ISO datetimes, carry an ISO3
//! code (and sometimes a comma-separated country list), and arrive either
//! as flat rows or GeoJSON features with point geometry.

use async_trait::async_trait;

use super::dates::{day_field, optional_day_field};
use super::feed::RecordFeed;
use super::mapping::MappingTable;
use super::{coordinates, fetch_from, joined_text, required_text};
use crate::error::{NormalizeError, NormalizeResult, Result};
use crate::traits::adapter::DatasetAdapter;
use crate::types::event::{EventType, Location};
use crate::types::external::{DatePrecision, DateRange, ExternalRecord, RawRecord};

pub const DATASET: &str = "gdacs";

/// Default GDACS hazard table. Volcanoes (`VO`) and tsunamis (`TS`) have no
/// canonical type.
pub fn default_mapping() -> MappingTable {
    MappingTable::new(DATASET)
        .with("FL", EventType::Flood)
        .with("TC", EventType::CycloneHurricane)
        .with("EQ", EventType::Earthquake)
        .with("DR", EventType::Drought)
        .with("WF", EventType::Fire)
}

pub struct GdacsAdapter {
    name: String,
    feed: Box<dyn RecordFeed>,
    mapping: MappingTable,
}

impl GdacsAdapter {
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

/// ISO3 when present, otherwise the first named country.
fn country_of(raw: &RawRecord) -> NormalizeResult<String> {
    if let Some(iso3) = raw.text("iso3") {
        return Ok(iso3);
    }
    let names = required_text(raw, "country")?;
    names
        .split([',', ';'])
        .map(str::trim)
        .find(|n| !n.is_empty())
        .map(str::to_string)
        .ok_or_else(|| NormalizeError::missing("country"))
}

#[async_trait]
impl DatasetAdapter for GdacsAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, range: &DateRange) -> Result<Vec<RawRecord>> {
        fetch_from(self.feed.as_ref(), &self.name, range).await
    }

    fn normalize(&self, raw: &RawRecord) -> NormalizeResult<ExternalRecord> {
        let event_id = raw
            .text("eventid")
            .or_else(|| raw.text("id"))
            .ok_or_else(|| NormalizeError::missing("eventid"))?;
        let foreign_type = required_text(raw, "eventtype")?.to_uppercase();

        let date = day_field("fromdate", raw.text("fromdate"))?;
        let date_end = optional_day_field("todate", raw.text("todate"))?.filter(|end| *end > date);

        let mut location = Location::country(&country_of(raw)?);
        if let Some((lat, lon)) = coordinates(raw, "lat", "lon")? {
            location = location.with_coordinates(lat, lon);
        }

        Ok(ExternalRecord {
            external_id: format!("{foreign_type}-{event_id}"),
            dataset_name: self.name.clone(),
            event_type_mapped: self.mapping.lookup(&foreign_type),
            foreign_type,
            location,
            date,
            date_end,
            date_precision: DatePrecision::Day,
            text: joined_text(raw, &["name", "eventname", "description", "country"]),
            raw_fields: raw.to_string_map(),
        })
    }

    fn mapping(&self) -> &MappingTable {
        &self.mapping
    }

    fn raw_id(&self, raw: &RawRecord) -> String {
        raw.identifier(&["eventid", "id"])
    }
}
