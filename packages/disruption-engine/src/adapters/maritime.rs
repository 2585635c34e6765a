//! Maritime incident adapter.
//!
//! Incident logs report ISO2 country codes, a port name, decimal
//! coordinates and `DD/MM/YYYY` dates.

use async_trait::async_trait;

use super::dates::day_field;
use super::feed::RecordFeed;
use super::mapping::MappingTable;
use super::{coordinates, fetch_from, joined_text, required_text};
use crate::error::{NormalizeError, NormalizeResult, Result};
use crate::traits::adapter::DatasetAdapter;
use crate::types::event::{EventType, Location};
use crate::types::external::{DatePrecision, DateRange, ExternalRecord, RawRecord};

pub const DATASET: &str = "maritime";

pub fn default_mapping() -> MappingTable {
    MappingTable::new(DATASET)
        .with("Port closure", EventType::PortDisruption)
        .with("Port congestion", EventType::PortDisruption)
        .with("Blockade", EventType::PortDisruption)
        .with("Piracy", EventType::MaritimeSecurity)
        .with("Armed robbery", EventType::MaritimeSecurity)
        .with("Hijack", EventType::MaritimeSecurity)
        .with("Hijacking", EventType::MaritimeSecurity)
        .with("Boarding", EventType::MaritimeSecurity)
        .with("Collision", EventType::ShippingAccident)
        .with("Grounding", EventType::ShippingAccident)
        .with("Sinking", EventType::ShippingAccident)
}

pub struct MaritimeAdapter {
    name: String,
    feed: Box<dyn RecordFeed>,
    mapping: MappingTable,
}

impl MaritimeAdapter {
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
impl DatasetAdapter for MaritimeAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, range: &DateRange) -> Result<Vec<RawRecord>> {
        fetch_from(self.feed.as_ref(), &self.name, range).await
    }

    fn normalize(&self, raw: &RawRecord) -> NormalizeResult<ExternalRecord> {
        let external_id = raw
            .text("incident_id")
            .ok_or_else(|| NormalizeError::missing("incident_id"))?;
        let foreign_type = required_text(raw, "incident_type")?;
        let date = day_field("date", raw.text("date"))?;

        let mut location = Location::country(&required_text(raw, "country")?);
        if let Some(region) = raw.text("region") {
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
            date,
            date_end: None,
            date_precision: DatePrecision::Day,
            text: joined_text(raw, &["port", "description", "vessel"]),
            raw_fields: raw.to_string_map(),
        })
    }

    fn mapping(&self) -> &MappingTable {
        &self.mapping
    }

    fn raw_id(&self, raw: &RawRecord) -> String {
        raw.identifier(&["incident_id", "id"])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::feed::StaticFeed;
    use chrono::NaiveDate;

    fn row() -> RawRecord {
        RawRecord::default()
            .with("incident_id", "MAR-2024-0042")
            .with("date", "02/03/2024")
            .with("country", "ID")
            .with("port", "Tanjung Priok")
            .with("latitude", "-6.10")
            .with("longitude", "106.88")
            .with("incident_type", "Port closure")
            .with("description", "Port closed after dock workers strike")
    }

    #[test]
    fn test_normalize_row() {
        let record = MaritimeAdapter::new(StaticFeed::default())
            .normalize(&row())
            .unwrap();
        assert_eq!(record.external_id, "MAR-2024-0042");
        assert_eq!(record.location.country, "IDN");
        assert_eq!(record.date, NaiveDate::from_ymd_opt(2024, 3, 2).unwrap());
        assert_eq!(record.event_type_mapped, EventType::PortDisruption);
        assert!(record.text.starts_with("Tanjung Priok"));
    }

    #[test]
    fn test_missing_incident_type_is_malformed() {
        let mut raw = row();
        raw.fields.remove("incident_type");
        assert!(MaritimeAdapter::new(StaticFeed::default())
            .normalize(&raw)
            .is_err());
    }
}
