//! Candidate generation.
//!
//! Comparing every event with every foreign record is quadratic, so records
//! are indexed by `(canonical type, country)` and only records that also
//! overlap in time and share an area are scored.

use std::collections::HashMap;

use chrono::NaiveDate;

use crate::geo::{haversine_km, UNKNOWN_COUNTRY};
use crate::types::config::ValidationConfig;
use crate::types::event::{Event, EventType, Location};
use crate::types::external::ExternalRecord;

/// Days between two inclusive date spans; 0 when they overlap.
pub fn date_gap_days(a_start: NaiveDate, a_end: NaiveDate, b_start: NaiveDate, b_end: NaiveDate) -> i64 {
    if a_end < b_start {
        (b_start - a_end).num_days()
    } else if b_end < a_start {
        (a_start - b_end).num_days()
    } else {
        0
    }
}

/// Distance between two locations when both carry coordinates.
pub fn distance_km(a: &Location, b: &Location) -> Option<f64> {
    let ((lat1, lon1), (lat2, lon2)) = (a.coordinates()?, b.coordinates()?);
    Some(haversine_km(lat1, lon1, lat2, lon2))
}

/// How two locations in the same country relate at admin1 level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AreaRelation {
    SameRegion,
    Adjacent,
    /// At least one side has no admin1
    CountryLevel,
    Distinct,
}

/// Compare the admin1 regions of two locations, assumed to share a country.
pub fn area_relation(a: &Location, b: &Location, config: &ValidationConfig) -> AreaRelation {
    let (Some(a_region), Some(b_region)) = (a.admin1_key(), b.admin1_key()) else {
        return AreaRelation::CountryLevel;
    };

    if a_region == b_region {
        return AreaRelation::SameRegion;
    }

    let declared = config
        .region_adjacency
        .are_adjacent(&a.country, &a_region, &b_region);
    let nearby = distance_km(a, b).is_some_and(|d| d <= config.adjacent_distance_km);

    if declared || nearby {
        AreaRelation::Adjacent
    } else {
        AreaRelation::Distinct
    }
}

/// Read-only index over one dataset's normalized records.
///
/// Records of unknown type or unknown country are kept (they count towards
/// coverage) but are never indexed, so they can never become candidates.
#[derive(Debug, Default)]
pub struct BlockingIndex {
    records: Vec<ExternalRecord>,
    buckets: HashMap<(EventType, String), Vec<usize>>,
}

impl BlockingIndex {
    pub fn build(records: Vec<ExternalRecord>) -> Self {
        let mut buckets: HashMap<(EventType, String), Vec<usize>> = HashMap::new();
        for (i, record) in records.iter().enumerate() {
            if record.event_type_mapped.is_unknown() || record.location.country == UNKNOWN_COUNTRY {
                continue;
            }
            buckets
                .entry((record.event_type_mapped, record.location.country.clone()))
                .or_default()
                .push(i);
        }
        Self { records, buckets }
    }

    pub fn records(&self) -> &[ExternalRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Indices of records that may describe `event`.
    ///
    /// Every eligible record is returned, ordered by date gap then external
    /// id, so the same input always yields the same list. An event whose
    /// country is unknown has no candidates.
    pub fn candidates(&self, event: &Event, config: &ValidationConfig) -> Vec<usize> {
        if event.event_type.is_unknown() || event.location.country == UNKNOWN_COUNTRY {
            return Vec::new();
        }

        let Some(bucket) = self
            .buckets
            .get(&(event.event_type, event.location.country.clone()))
        else {
            return Vec::new();
        };

        let mut found: Vec<(i64, usize)> = bucket
            .iter()
            .filter_map(|&i| {
                let record = &self.records[i];
                let gap = date_gap_days(event.start_date, event.last_date(), record.date, record.last_date());
                if gap > config.date_tolerance_days {
                    return None;
                }
                if area_relation(&event.location, &record.location, config) == AreaRelation::Distinct {
                    return None;
                }
                Some((gap, i))
            })
            .collect();

        found.sort_by(|(gap_a, a), (gap_b, b)| {
            gap_a
                .cmp(gap_b)
                .then_with(|| self.records[*a].external_id.cmp(&self.records[*b].external_id))
        });
        found.into_iter().map(|(_, i)| i).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::config::RegionAdjacency;
    use crate::types::external::DatePrecision;
    use std::collections::BTreeMap;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn record(id: &str, event_type: EventType, admin1: Option<&str>, d: u32) -> ExternalRecord {
        let mut location = Location::country("IDN");
        if let Some(admin1) = admin1 {
            location = location.with_admin1(admin1);
        }
        ExternalRecord {
            external_id: id.to_string(),
            dataset_name: "test".to_string(),
            event_type_mapped: event_type,
            foreign_type: event_type.as_str().to_string(),
            location,
            date: day(d),
            date_end: None,
            date_precision: DatePrecision::Day,
            text: String::new(),
            raw_fields: BTreeMap::new(),
        }
    }

    fn strike(admin1: &str, d: u32) -> Event {
        Event::new(
            "art-1",
            EventType::LabourStrike,
            Location::country("Indonesia").with_admin1(admin1),
            day(d),
        )
    }

    #[test]
    fn test_date_gap() {
        assert_eq!(date_gap_days(day(1), day(3), day(2), day(2)), 0);
        assert_eq!(date_gap_days(day(1), day(1), day(4), day(5)), 3);
        assert_eq!(date_gap_days(day(9), day(9), day(4), day(5)), 4);
    }

    #[test]
    fn test_candidates_respect_type_date_and_area() {
        let index = BlockingIndex::build(vec![
            record("same", EventType::LabourStrike, Some("Jakarta"), 2),
            record("too-late", EventType::LabourStrike, Some("Jakarta"), 10),
            record("wrong-type", EventType::Protest, Some("Jakarta"), 1),
            record("elsewhere", EventType::LabourStrike, Some("Papua"), 1),
            record("country-level", EventType::LabourStrike, None, 1),
            record("unmapped", EventType::Unknown, Some("Jakarta"), 1),
        ]);

        let found: Vec<&str> = index
            .candidates(&strike("Jakarta", 1), &ValidationConfig::default())
            .into_iter()
            .map(|i| index.records()[i].external_id.as_str())
            .collect();

        assert_eq!(found, vec!["country-level", "same"]);
    }

    #[test]
    fn test_declared_adjacency_admits_neighbour() {
        let index = BlockingIndex::build(vec![record("west-java", EventType::LabourStrike, Some("West Java"), 1)]);
        let event = strike("Jakarta", 1);

        assert!(index.candidates(&event, &ValidationConfig::default()).is_empty());

        let config = ValidationConfig::default()
            .with_region_adjacency(RegionAdjacency::new().with_pair("IDN", "Jakarta", "West Java"));
        assert_eq!(index.candidates(&event, &config), vec![0]);
    }

    #[test]
    fn test_nearby_coordinates_count_as_adjacent() {
        let mut near = record("near", EventType::LabourStrike, Some("Banten"), 1);
        near.location = near.location.with_coordinates(-6.12, 106.15);
        let index = BlockingIndex::build(vec![near]);

        let mut event = strike("Jakarta", 1);
        event.location = event.location.with_coordinates(-6.2, 106.8);

        assert_eq!(index.candidates(&event, &ValidationConfig::default()), vec![0]);
    }

    #[test]
    fn test_large_buckets_are_not_truncated() {
        let records = (0..300)
            .map(|i| record(&format!("r{i:03}"), EventType::LabourStrike, None, 1 + (i % 5) as u32))
            .collect();
        let index = BlockingIndex::build(records);

        let found = index.candidates(&strike("Jakarta", 3), &ValidationConfig::default());
        assert_eq!(found.len(), 300);

        let ids: Vec<&str> = found.iter().take(2).map(|&i| index.records()[i].external_id.as_str()).collect();
        assert_eq!(ids, vec!["r002", "r007"]);
    }

    #[test]
    fn test_unknown_country_never_blocks_together() {
        let mut unknown = record("nowhere", EventType::LabourStrike, None, 1);
        unknown.location = Location::country("unknown");
        let index = BlockingIndex::build(vec![unknown]);

        let event = Event::new("art-1", EventType::LabourStrike, Location::country(""), day(1));
        assert_eq!(event.location.country, UNKNOWN_COUNTRY);
        assert!(index.candidates(&event, &ValidationConfig::default()).is_empty());
    }
}
