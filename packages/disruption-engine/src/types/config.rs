//! Configuration types for extraction and validation.
//!
//! Everything the engine tunes on is here and passed in at construction.
//! Nothing in the core reads environment variables or files.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::geo::normalize_admin;

/// Configuration for the extraction engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Generator calls per article before degrading to `failed`.
    ///
    /// Schema violations, timeouts and transient upstream errors all count
    /// against the same bound. Default: 3.
    pub max_attempts: u32,

    /// Deadline for a single generator call. Default: 60s.
    #[serde(with = "duration_secs")]
    pub call_timeout: Duration,

    /// Base delay before retrying a transient failure; doubles per attempt.
    #[serde(with = "duration_millis")]
    pub retry_backoff: Duration,

    /// Articles processed concurrently. Default: 8.
    pub concurrency: usize,

    /// Generator calls per second across all workers. Default: 5.
    pub requests_per_second: u32,

    /// Same-article events with identical type and location whose start
    /// dates are at most this many days apart are collapsed. Default: 1.
    pub dedup_window_days: i64,

    /// Multiplier applied to confidence once per missing required field.
    ///
    /// Default: 0.7.
    pub partial_confidence_factor: f64,

    /// Language articles must be written in; `None` disables the check.
    ///
    /// Default: `Some("en")`.
    pub target_language: Option<String>,

    /// Replay cached model output for unchanged articles. Default: true.
    pub use_response_cache: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            call_timeout: Duration::from_secs(60),
            retry_backoff: Duration::from_millis(500),
            concurrency: 8,
            requests_per_second: 5,
            dedup_window_days: 1,
            partial_confidence_factor: 0.7,
            target_language: Some("en".to_string()),
            use_response_cache: true,
        }
    }
}

impl ExtractionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_requests_per_second(mut self, rps: u32) -> Self {
        self.requests_per_second = rps;
        self
    }

    pub fn with_target_language(mut self, language: Option<&str>) -> Self {
        self.target_language = language.map(|l| l.to_string());
        self
    }

    pub fn with_response_cache(mut self, enabled: bool) -> Self {
        self.use_response_cache = enabled;
        self
    }

    /// Reject settings that would make the engine unusable.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(EngineError::Config("max_attempts must be at least 1".into()));
        }
        if self.concurrency == 0 {
            return Err(EngineError::Config("concurrency must be at least 1".into()));
        }
        if self.requests_per_second == 0 {
            return Err(EngineError::Config("requests_per_second must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.partial_confidence_factor) {
            return Err(EngineError::Config(
                "partial_confidence_factor must be within [0, 1]".into(),
            ));
        }
        if self.dedup_window_days < 0 {
            return Err(EngineError::Config("dedup_window_days must not be negative".into()));
        }
        Ok(())
    }
}

/// Tier boundaries for one dataset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// `score >= confirmed` is confirmed
    pub confirmed: f64,
    /// `probable <= score < confirmed` is probable
    pub probable: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            confirmed: 0.75,
            probable: 0.5,
        }
    }
}

/// Relative weight of each similarity component in the total score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub time: f64,
    pub geo: f64,
    pub text: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            time: 0.45,
            geo: 0.35,
            text: 0.20,
        }
    }
}

impl ScoringWeights {
    pub fn total(&self) -> f64 {
        self.time + self.geo + self.text
    }
}

/// Declared neighbours between first-level administrative regions.
///
/// Keys are `ISO3` country codes; region names are normalized on insert
/// and lookup so spelling variants agree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionAdjacency {
    pairs: BTreeMap<String, BTreeMap<String, BTreeSet<String>>>,
}

impl RegionAdjacency {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare two regions of a country adjacent (symmetric).
    pub fn with_pair(mut self, country: &str, a: &str, b: &str) -> Self {
        let country = crate::geo::canonical_country(country);
        let (a, b) = (normalize_admin(a), normalize_admin(b));
        let regions = self.pairs.entry(country).or_default();
        regions.entry(a.clone()).or_default().insert(b.clone());
        regions.entry(b).or_default().insert(a);
        self
    }

    /// Whether `a` and `b` are declared neighbours in `country`.
    pub fn are_adjacent(&self, country: &str, a: &str, b: &str) -> bool {
        let (a, b) = (normalize_admin(a), normalize_admin(b));
        self.pairs
            .get(country)
            .and_then(|regions| regions.get(&a))
            .is_some_and(|neighbours| neighbours.contains(&b))
    }
}

/// Configuration for the validation engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Records further than this many days from the event span are never
    /// candidates and score 0 on time. Default: 3.
    pub date_tolerance_days: i64,

    /// Tier boundaries used when a dataset has no override.
    pub thresholds: Thresholds,

    /// Per-dataset tier boundaries, keyed by dataset name.
    pub dataset_thresholds: BTreeMap<String, Thresholds>,

    pub weights: ScoringWeights,

    pub region_adjacency: RegionAdjacency,

    /// Records with coordinates this close count as the same area even when
    /// their admin1 names differ. Default: 150km.
    pub adjacent_distance_km: f64,

    /// Distance at which the geographic refinement score reaches zero.
    /// Default: 250km.
    pub max_distance_km: f64,

    /// Blocking threads for scoring. Default: 4.
    pub workers: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            date_tolerance_days: 3,
            thresholds: Thresholds::default(),
            dataset_thresholds: BTreeMap::new(),
            weights: ScoringWeights::default(),
            region_adjacency: RegionAdjacency::default(),
            adjacent_distance_km: 150.0,
            max_distance_km: 250.0,
            workers: 4,
        }
    }
}

impl ValidationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_date_tolerance(mut self, days: i64) -> Self {
        self.date_tolerance_days = days;
        self
    }

    pub fn with_thresholds(mut self, confirmed: f64, probable: f64) -> Self {
        self.thresholds = Thresholds { confirmed, probable };
        self
    }

    pub fn with_dataset_thresholds(mut self, dataset: impl Into<String>, confirmed: f64, probable: f64) -> Self {
        self.dataset_thresholds
            .insert(dataset.into(), Thresholds { confirmed, probable });
        self
    }

    pub fn with_weights(mut self, weights: ScoringWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_region_adjacency(mut self, adjacency: RegionAdjacency) -> Self {
        self.region_adjacency = adjacency;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Thresholds in force for a dataset.
    pub fn thresholds_for(&self, dataset: &str) -> Thresholds {
        self.dataset_thresholds
            .get(dataset)
            .copied()
            .unwrap_or(self.thresholds)
    }

    /// Reject inverted thresholds, negative windows and degenerate weights.
    pub fn validate(&self) -> Result<()> {
        if self.date_tolerance_days < 0 {
            return Err(EngineError::Config("date_tolerance_days must not be negative".into()));
        }
        for (name, t) in std::iter::once(("default", &self.thresholds))
            .chain(self.dataset_thresholds.iter().map(|(k, v)| (k.as_str(), v)))
        {
            if !(0.0..=1.0).contains(&t.probable)
                || !(0.0..=1.0).contains(&t.confirmed)
                || t.probable > t.confirmed
            {
                return Err(EngineError::Config(
                    format!("thresholds for {name} must satisfy 0 <= probable <= confirmed <= 1").into(),
                ));
            }
        }
        let w = &self.weights;
        let weights = [w.time, w.geo, w.text];
        if weights.iter().any(|x| !x.is_finite() || *x < 0.0) || w.total() <= 0.0 {
            return Err(EngineError::Config(
                "scoring weights must be finite and non-negative with a positive sum".into(),
            ));
        }
        for (name, km) in [
            ("adjacent_distance_km", self.adjacent_distance_km),
            ("max_distance_km", self.max_distance_km),
        ] {
            if !km.is_finite() || km <= 0.0 {
                return Err(EngineError::Config(format!("{name} must be a positive distance").into()));
            }
        }
        if self.workers == 0 {
            return Err(EngineError::Config("workers must be at least 1".into()));
        }
        Ok(())
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        ExtractionConfig::default().validate().unwrap();
        ValidationConfig::default().validate().unwrap();
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let config = ValidationConfig::new().with_dataset_thresholds("acled", 0.4, 0.6);
        assert!(matches!(config.validate(), Err(EngineError::Config(_))));
    }

    #[test]
    fn test_zero_weights_rejected() {
        let config = ValidationConfig::new().with_weights(ScoringWeights {
            time: 0.0,
            geo: 0.0,
            text: 0.0,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_non_finite_weights_rejected() {
        let config = ValidationConfig::new().with_weights(ScoringWeights {
            time: f64::NAN,
            geo: 0.35,
            text: 0.20,
        });
        assert!(matches!(config.validate(), Err(EngineError::Config(_))));

        let config = ValidationConfig::new().with_weights(ScoringWeights {
            time: 0.45,
            geo: f64::INFINITY,
            text: 0.20,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_non_positive_distances_rejected() {
        let mut config = ValidationConfig::new();
        config.max_distance_km = 0.0;
        assert!(matches!(config.validate(), Err(EngineError::Config(_))));

        let mut config = ValidationConfig::new();
        config.adjacent_distance_km = -10.0;
        assert!(config.validate().is_err());

        let mut config = ValidationConfig::new();
        config.max_distance_km = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_dataset_threshold_override() {
        let config = ValidationConfig::new()
            .with_thresholds(0.8, 0.5)
            .with_dataset_thresholds("gdacs", 0.7, 0.4);
        assert_eq!(config.thresholds_for("gdacs").confirmed, 0.7);
        assert_eq!(config.thresholds_for("acled").confirmed, 0.8);
    }

    #[test]
    fn test_region_adjacency_is_symmetric_and_normalized() {
        let adjacency = RegionAdjacency::new().with_pair("DRC", "Haut-Katanga Province", "Lualaba");
        assert!(adjacency.are_adjacent("COD", "haut-katanga", "Lualaba"));
        assert!(adjacency.are_adjacent("COD", "lualaba", "Haut-Katanga"));
        assert!(!adjacency.are_adjacent("ZMB", "lualaba", "haut-katanga"));
    }

    #[test]
    fn test_config_deserializes_with_partial_fields() {
        let config: ValidationConfig =
            serde_json::from_str(r#"{"date_tolerance_days": 5, "thresholds": {"confirmed": 0.9, "probable": 0.6}}"#)
                .unwrap();
        assert_eq!(config.date_tolerance_days, 5);
        assert_eq!(config.workers, 4);

        let extraction: ExtractionConfig = serde_json::from_str(r#"{"call_timeout": 10}"#).unwrap();
        assert_eq!(extraction.call_timeout, Duration::from_secs(10));
        assert_eq!(extraction.max_attempts, 3);
    }
}
