//! Validation output types - matches, tiers and per-dataset reports.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::types::report::ReasonCode;

/// Confidence tier of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    Confirmed,
    Probable,
    Unmatched,
}

impl MatchTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Confirmed => "confirmed",
            Self::Probable => "probable",
            Self::Unmatched => "unmatched",
        }
    }
}

/// Weak back reference from an event to its match in one dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRef {
    pub dataset_name: String,
    #[serde(default)]
    pub external_id: Option<String>,
    pub tier: MatchTier,
}

/// Best link between one event and one dataset.
///
/// Unmatched rows keep the best available score so "checked, nothing close"
/// stays distinguishable from "not checked".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationMatch {
    pub event_id: String,

    /// Best candidate; `None` only when blocking produced no candidates
    pub external_id: Option<String>,

    pub dataset_name: String,
    pub score: f64,
    pub tier: MatchTier,

    /// Per-field similarity, in a stable order (time, geo, type, text)
    pub field_scores: IndexMap<String, f64>,

    /// Why the row is unmatched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<ReasonCode>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_delta_days: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
}

impl ValidationMatch {
    /// Back reference to attach to the event.
    pub fn to_ref(&self) -> MatchRef {
        MatchRef {
            dataset_name: self.dataset_name.clone(),
            external_id: self.external_id.clone(),
            tier: self.tier,
        }
    }
}

/// A foreign row the adapter could not normalize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedRecord {
    pub raw_id: String,
    pub reason: ReasonCode,
    pub detail: String,
}

/// Whether a dataset took part in the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DatasetStatus {
    Validated,
    Skipped { reason: ReasonCode, detail: String },
}

/// Inverse pass: how many foreign records found an extracted event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coverage {
    pub records_total: usize,

    /// Records whose best event scored at least `probable`
    pub records_matched: usize,

    /// Records whose foreign type had no canonical mapping
    pub records_unknown_type: usize,
}

impl Coverage {
    /// Share of mappable records matched, 0 when there are none.
    pub fn ratio(&self) -> f64 {
        let mappable = self.records_total.saturating_sub(self.records_unknown_type);
        if mappable == 0 {
            0.0
        } else {
            self.records_matched as f64 / mappable as f64
        }
    }
}

/// Inverse-pass decision for one foreign record: the event that scored
/// highest against it, if any did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageMatch {
    pub external_id: String,

    /// `None` when no event was ever scored against the record
    #[serde(default)]
    pub event_id: Option<String>,

    pub score: f64,
    pub tier: MatchTier,
}

/// Result of validating a set of events against one dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetReport {
    pub dataset_name: String,
    pub status: DatasetStatus,
    pub matches: Vec<ValidationMatch>,
    pub skipped_records: Vec<SkippedRecord>,

    /// Foreign types with no canonical mapping, with occurrence counts
    pub mapping_gaps: BTreeMap<String, usize>,

    pub coverage: Coverage,

    /// One decision per normalized record, in feed order
    #[serde(default)]
    pub coverage_matches: Vec<CoverageMatch>,

    /// Events not validated because extraction failed for them
    pub events_excluded: usize,
}

impl DatasetReport {
    /// Empty report for a dataset that was validated.
    pub fn new(dataset_name: impl Into<String>) -> Self {
        Self {
            dataset_name: dataset_name.into(),
            status: DatasetStatus::Validated,
            matches: Vec::new(),
            skipped_records: Vec::new(),
            mapping_gaps: BTreeMap::new(),
            coverage: Coverage::default(),
            coverage_matches: Vec::new(),
            events_excluded: 0,
        }
    }

    /// Report for a dataset that could not be fetched.
    pub fn skipped(dataset_name: impl Into<String>, reason: ReasonCode, detail: impl Into<String>) -> Self {
        Self {
            status: DatasetStatus::Skipped {
                reason,
                detail: detail.into(),
            },
            ..Self::new(dataset_name)
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.status, DatasetStatus::Skipped { .. })
    }

    pub fn tier_counts(&self) -> BTreeMap<MatchTier, usize> {
        let mut counts = BTreeMap::new();
        for m in &self.matches {
            *counts.entry(m.tier).or_insert(0) += 1;
        }
        counts
    }

    /// Unmatched rows and skipped records, by reason.
    pub fn counts_by_reason(&self) -> BTreeMap<ReasonCode, usize> {
        let mut counts = BTreeMap::new();
        for reason in self
            .matches
            .iter()
            .filter_map(|m| m.reason)
            .chain(self.skipped_records.iter().map(|s| s.reason))
        {
            *counts.entry(reason).or_insert(0) += 1;
        }
        if let DatasetStatus::Skipped { reason, .. } = &self.status {
            *counts.entry(*reason).or_insert(0) += 1;
        }
        counts
    }
}

/// Validation of one event set against every registered dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationRun {
    pub run_id: String,
    pub datasets: Vec<DatasetReport>,
}

impl ValidationRun {
    pub fn matches(&self) -> impl Iterator<Item = &ValidationMatch> {
        self.datasets.iter().flat_map(|d| d.matches.iter())
    }

    pub fn skipped_datasets(&self) -> Vec<&str> {
        self.datasets
            .iter()
            .filter(|d| d.is_skipped())
            .map(|d| d.dataset_name.as_str())
            .collect()
    }

    /// Tier counts keyed by dataset name.
    pub fn tier_counts(&self) -> BTreeMap<String, BTreeMap<MatchTier, usize>> {
        self.datasets
            .iter()
            .map(|d| (d.dataset_name.clone(), d.tier_counts()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skipped_report_counts_reason() {
        let report = DatasetReport::skipped("acled", ReasonCode::SourceUnavailable, "HTTP 503");
        assert!(report.is_skipped());
        assert_eq!(
            report.counts_by_reason().get(&ReasonCode::SourceUnavailable),
            Some(&1)
        );
    }

    #[test]
    fn test_coverage_ratio_ignores_unknown_types() {
        let coverage = Coverage {
            records_total: 10,
            records_matched: 4,
            records_unknown_type: 2,
        };
        assert!((coverage.ratio() - 0.5).abs() < 1e-9);
        assert_eq!(Coverage::default().ratio(), 0.0);
    }

    #[test]
    fn test_dataset_status_serialization() {
        let json = serde_json::to_value(DatasetStatus::Validated).unwrap();
        assert_eq!(json["status"], "validated");
    }
}
