//! External dataset adapters.
//!
//! One adapter per third-party dataset. Each knows its dataset's field
//! names, geography encoding and date format, and owns a [`MappingTable`]
//! from foreign type strings to the canonical taxonomy.
//!
//! Adapters read through a [`RecordFeed`], so the same adapter works over a
//! cached JSON download, a live API or a static fixture.

pub mod acled;
pub mod dates;
pub mod feed;
pub mod gdacs;
pub mod mapping;
pub mod maritime;
pub mod political;

pub use acled::AcledAdapter;
pub use feed::{HttpJsonFeed, JsonFileFeed, RecordFeed, StaticFeed};
pub use gdacs::GdacsAdapter;
pub use mapping::MappingTable;
pub use maritime::MaritimeAdapter;
pub use political::PoliticalEventAdapter;

use tracing::debug;

use crate::error::{EngineError, NormalizeError, NormalizeResult, Result};
use crate::geo::valid_coordinates;
use crate::types::external::{DateRange, RawRecord};

/// Load rows for `dataset` from `feed`, mapping any failure to
/// [`EngineError::SourceUnavailable`].
pub(crate) async fn fetch_from(
    feed: &dyn RecordFeed,
    dataset: &str,
    range: &DateRange,
) -> Result<Vec<RawRecord>> {
    match feed.load(range).await {
        Ok(records) => {
            debug!(
                dataset = %dataset,
                feed = %feed.describe(),
                records = records.len(),
                "Fetched external records"
            );
            Ok(records)
        }
        Err(e @ EngineError::SourceUnavailable { .. }) => Err(e),
        Err(e) => Err(EngineError::source_unavailable(dataset, e)),
    }
}

/// Read a required text field.
pub(crate) fn required_text(raw: &RawRecord, field: &str) -> NormalizeResult<String> {
    raw.text(field).ok_or_else(|| NormalizeError::missing(field))
}

/// Read an optional coordinate pair.
///
/// Both absent is fine. One present without the other, a non-numeric
/// value, or an out-of-range pair makes the row malformed.
pub(crate) fn coordinates(
    raw: &RawRecord,
    lat_field: &str,
    lon_field: &str,
) -> NormalizeResult<Option<(f64, f64)>> {
    let lat = raw.number(lat_field);
    let lon = raw.number(lon_field);

    let parse = |field: &str, value: Option<std::result::Result<f64, String>>| match value {
        None => Ok(None),
        Some(Ok(v)) => Ok(Some(v)),
        Some(Err(bad)) => Err(NormalizeError::InvalidCoordinate {
            field: field.to_string(),
            value: bad,
        }),
    };

    match (parse(lat_field, lat)?, parse(lon_field, lon)?) {
        (None, None) => Ok(None),
        (Some(lat), Some(lon)) if valid_coordinates(lat, lon) => Ok(Some((lat, lon))),
        (Some(lat), Some(lon)) => Err(NormalizeError::InvalidCoordinate {
            field: format!("{lat_field},{lon_field}"),
            value: format!("{lat},{lon}"),
        }),
        (Some(_), None) => Err(NormalizeError::missing(lon_field)),
        (None, Some(_)) => Err(NormalizeError::missing(lat_field)),
    }
}

/// Join the non-empty text fields into one blob for textual similarity.
pub(crate) fn joined_text(raw: &RawRecord, fields: &[&str]) -> String {
    fields
        .iter()
        .filter_map(|f| raw.text(f))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_coordinates_accept_strings_and_numbers() {
        let raw = RawRecord::default()
            .with("latitude", "-6.2")
            .with("longitude", json!(106.8));
        assert_eq!(
            coordinates(&raw, "latitude", "longitude").unwrap(),
            Some((-6.2, 106.8))
        );
    }

    #[test]
    fn test_coordinates_absent_is_none() {
        let raw = RawRecord::default().with("latitude", "");
        assert_eq!(coordinates(&raw, "latitude", "longitude").unwrap(), None);
    }

    #[test]
    fn test_coordinates_reject_garbage_and_half_pairs() {
        let garbage = RawRecord::default()
            .with("lat", "north")
            .with("lon", "10");
        assert!(matches!(
            coordinates(&garbage, "lat", "lon"),
            Err(NormalizeError::InvalidCoordinate { .. })
        ));

        let half = RawRecord::default().with("lat", 10.0);
        assert!(matches!(
            coordinates(&half, "lat", "lon"),
            Err(NormalizeError::MissingField { .. })
        ));

        let out_of_range = RawRecord::default().with("lat", 95.0).with("lon", 10.0);
        assert!(coordinates(&out_of_range, "lat", "lon").is_err());
    }
}
