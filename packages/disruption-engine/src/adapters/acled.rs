//! ACLED conflict event adapter.
//!
//! ACLED rows carry country names, an `admin1` region, coordinates as
//! strings and `YYYY-MM-DD` event dates. Types come as a coarse
//! `event_type` and a finer `sub_event_type`; the finer label wins when it
//! is mapped.

use async_trait::async_trait;

use super::dates::day_field;
use super::feed::RecordFeed;
use super::mapping::MappingTable;
use super::{coordinates, fetch_from, joined_text, required_text};
use crate::error::{NormalizeError, NormalizeResult, Result};
use crate::traits::adapter::DatasetAdapter;
use crate::types::event::{EventType, Location};
use crate::types::external::{DatePrecision, DateRange, ExternalRecord, RawRecord};

pub const DATASET: &str = "acled";

/// Default ACLED type table. "Strategic developments" is deliberately left
/// unmapped.
pub fn default_mapping() -> MappingTable {
    MappingTable::new(DATASET)
        .with("Protests", EventType::Protest)
        .with("Peaceful protest", EventType::Protest)
        .with("Protest with intervention", EventType::Protest)
        .with("Excessive force against protesters", EventType::Protest)
        .with("Riots", EventType::Riot)
        .with("Violent demonstration", EventType::Riot)
        .with("Mob violence", EventType::Riot)
        .with("Battles", EventType::ArmedConflict)
        .with("Armed clash", EventType::ArmedConflict)
        .with("Explosions/Remote violence", EventType::ArmedConflict)
        .with("Violence against civilians", EventType::ArmedConflict)
}

pub struct AcledAdapter {
    name: String,
    feed: Box<dyn RecordFeed>,
    mapping: MappingTable,
}

impl AcledAdapter {
    pub fn new(feed: impl RecordFeed + 'static) -> Self {
        Self {
            name: DATASET.to_string(),
            feed: Box::new(feed),
            mapping: default_mapping(),
        }
    }

    /// Register under a different dataset name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_mapping(mut self, mapping: MappingTable) -> Self {
        self.mapping = mapping;
        self
    }

    /// Pick the label to classify by: a mapped sub-type, else the
    /// coarse type, else whatever is present.
    fn foreign_type(&self, raw: &RawRecord) -> NormalizeResult<String> {
        let sub = raw.text("sub_event_type");
        let coarse = raw.text("event_type");
        match (sub, coarse) {
            (Some(sub), _) if self.mapping.is_mapped(&sub) => Ok(sub),
            (_, Some(coarse)) => Ok(coarse),
            (Some(sub), None) => Ok(sub),
            (None, None) => Err(NormalizeError::missing("event_type")),
        }
    }
}

#[async_trait]
impl DatasetAdapter for AcledAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, range: &DateRange) -> Result<Vec<RawRecord>> {
        fetch_from(self.feed.as_ref(), &self.name, range).await
    }

    fn normalize(&self, raw: &RawRecord) -> NormalizeResult<ExternalRecord> {
        let external_id = raw
            .text("event_id_cnty")
            .or_else(|| raw.text("data_id"))
            .ok_or_else(|| NormalizeError::missing("event_id_cnty"))?;
        let foreign_type = self.foreign_type(raw)?;
        let date = day_field("event_date", raw.text("event_date"))?;

        let mut location = Location::country(&required_text(raw, "country")?);
        if let Some(admin1) = raw.text("admin1") {
            location = location.with_admin1(admin1);
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
            text: joined_text(raw, &["notes", "actor1", "actor2", "location"]),
            raw_fields: raw.to_string_map(),
        })
    }

    fn mapping(&self) -> &MappingTable {
        &self.mapping
    }

    fn raw_id(&self, raw: &RawRecord) -> String {
        raw.identifier(&["event_id_cnty", "data_id"])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::feed::StaticFeed;
    use chrono::NaiveDate;

    fn row() -> RawRecord {
        RawRecord::default()
            .with("event_id_cnty", "IDN12345")
            .with("event_date", "2024-03-02")
            .with("event_type", "Protests")
            .with("sub_event_type", "Peaceful protest")
            .with("country", "Indonesia")
            .with("admin1", "Jakarta")
            .with("latitude", "-6.2")
            .with("longitude", "106.8")
            .with("notes", "Dock workers marched on the port authority")
    }

    fn adapter() -> AcledAdapter {
        AcledAdapter::new(StaticFeed::default())
    }

    #[test]
    fn test_normalize_row() {
        let record = adapter().normalize(&row()).unwrap();
        assert_eq!(record.external_id, "IDN12345");
        assert_eq!(record.event_type_mapped, EventType::Protest);
        assert_eq!(record.foreign_type, "Peaceful protest");
        assert_eq!(record.location.country, "IDN");
        assert_eq!(record.location.admin1.as_deref(), Some("Jakarta"));
        assert_eq!(record.location.coordinates(), Some((-6.2, 106.8)));
        assert_eq!(record.date, NaiveDate::from_ymd_opt(2024, 3, 2).unwrap());
        assert!(record.text.contains("port authority"));
        assert_eq!(record.raw_fields["country"], "Indonesia");
    }

    #[test]
    fn test_unmapped_sub_type_falls_back_to_event_type() {
        let raw = row().with("sub_event_type", "Something new");
        let record = adapter().normalize(&raw).unwrap();
        assert_eq!(record.foreign_type, "Protests");
        assert_eq!(record.event_type_mapped, EventType::Protest);
    }

    #[test]
    fn test_strategic_developments_is_a_gap() {
        let raw = row()
            .with("event_type", "Strategic developments")
            .with("sub_event_type", "Agreement");
        let record = adapter().normalize(&raw).unwrap();
        assert_eq!(record.event_type_mapped, EventType::Unknown);
        assert_eq!(record.foreign_type, "Strategic developments");
    }

    #[test]
    fn test_malformed_rows() {
        let no_date = row().with("event_date", "");
        assert!(matches!(
            adapter().normalize(&no_date),
            Err(NormalizeError::MissingField { .. })
        ));

        let bad_coords = row().with("latitude", "n/a");
        assert!(matches!(
            adapter().normalize(&bad_coords),
            Err(NormalizeError::InvalidCoordinate { .. })
        ));

        assert_eq!(adapter().raw_id(&row()), "IDN12345");
    }
}
