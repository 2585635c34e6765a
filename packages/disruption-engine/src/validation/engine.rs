//! The validation engine - record linkage of extracted events against
//! external incident datasets.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use futures::future::try_join_all;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::traits::adapter::DatasetAdapter;
use crate::traits::store::EventStore;
use crate::types::config::{Thresholds, ValidationConfig};
use crate::types::event::{Event, ExtractionStatus};
use crate::types::external::{DateRange, ExternalRecord};
use crate::types::report::ReasonCode;
use crate::types::validation::{
    Coverage, CoverageMatch, DatasetReport, MatchTier, SkippedRecord, ValidationMatch, ValidationRun,
};
use crate::validation::blocking::BlockingIndex;
use crate::validation::scoring::{event_tokens, score_pair, tier_for, tokenize, PairScore};

/// Normalized records of one dataset plus their precomputed text tokens.
///
/// Built once per dataset and shared read-only across scoring workers.
struct DatasetIndex {
    blocking: BlockingIndex,
    tokens: Vec<HashSet<String>>,
}

impl DatasetIndex {
    fn build(records: Vec<ExternalRecord>) -> Self {
        let tokens = records.iter().map(|r| tokenize(&r.text)).collect();
        Self {
            blocking: BlockingIndex::build(records),
            tokens,
        }
    }
}

/// Highest score a record reached and the event that reached it.
type RecordBest = Option<(f64, String)>;

/// Matches for a slice of events, plus the best event for each record.
struct Scored {
    matches: Vec<ValidationMatch>,
    best_per_record: Vec<RecordBest>,
}

impl Scored {
    fn empty(records: usize) -> Self {
        Self {
            matches: Vec::new(),
            best_per_record: vec![None; records],
        }
    }

    fn absorb(&mut self, other: Scored) {
        self.matches.extend(other.matches);
        for (slot, best) in self.best_per_record.iter_mut().zip(other.best_per_record) {
            if let Some((score, event_id)) = best {
                offer(slot, score, &event_id);
            }
        }
    }
}

/// Keep the higher score; equal scores go to the smaller event id so the
/// outcome does not depend on how events were chunked.
fn offer(slot: &mut RecordBest, score: f64, event_id: &str) {
    let better = match slot {
        None => score > 0.0,
        Some((best, id)) => score > *best || (score == *best && event_id < id.as_str()),
    };
    if better {
        *slot = Some((score, event_id.to_string()));
    }
}

/// Validates events against registered dataset adapters.
///
/// # Example
///
/// ```rust,ignore
/// let engine = ValidationEngine::new(ValidationConfig::default())?
///     .with_adapter(AcledAdapter::new(JsonFileFeed::new("acled.json")));
///
/// let report = engine.validate(&events, "acled").await?;
/// ```
pub struct ValidationEngine {
    config: Arc<ValidationConfig>,
    adapters: Vec<Arc<dyn DatasetAdapter>>,
}

impl ValidationEngine {
    pub fn new(config: ValidationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            adapters: Vec::new(),
        })
    }

    /// Register an adapter. A later adapter with the same name replaces the
    /// earlier one.
    pub fn with_adapter(mut self, adapter: impl DatasetAdapter + 'static) -> Self {
        self.register(Arc::new(adapter));
        self
    }

    pub fn register(&mut self, adapter: Arc<dyn DatasetAdapter>) {
        self.adapters.retain(|a| a.name() != adapter.name());
        self.adapters.push(adapter);
    }

    /// Registered dataset names, in registration order.
    pub fn datasets(&self) -> Vec<&str> {
        self.adapters.iter().map(|a| a.name()).collect()
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Validate events against one dataset.
    ///
    /// Returns one match row per distinct eligible event, in input order,
    /// and one coverage decision per normalized record. A dataset that
    /// cannot be fetched yields a `skipped` report rather than an error.
    pub async fn validate(&self, events: &[Event], dataset_name: &str) -> Result<DatasetReport> {
        let adapter = self
            .adapters
            .iter()
            .find(|a| a.name() == dataset_name)
            .ok_or_else(|| EngineError::UnknownDataset {
                name: dataset_name.to_string(),
            })?;

        let (eligible, excluded) = eligible_events(events);
        if excluded > 0 {
            debug!(dataset = %dataset_name, excluded, "Excluding failed extractions");
        }

        let mut report = DatasetReport::new(dataset_name);
        report.events_excluded = excluded;

        let Some(range) = event_window(&eligible, self.config.date_tolerance_days) else {
            info!(dataset = %dataset_name, "No events to validate");
            return Ok(report);
        };

        let raw = match adapter.fetch(&range).await {
            Ok(raw) => raw,
            Err(e @ EngineError::SourceUnavailable { .. }) => {
                warn!(dataset = %dataset_name, error = %e, "Dataset unavailable, skipping");
                let mut skipped = DatasetReport::skipped(dataset_name, ReasonCode::SourceUnavailable, e.to_string());
                skipped.events_excluded = excluded;
                return Ok(skipped);
            }
            Err(e) => return Err(e),
        };

        let mut records = Vec::with_capacity(raw.len());
        for row in &raw {
            match adapter.normalize(row) {
                Ok(record) => {
                    if record.event_type_mapped.is_unknown() {
                        *report.mapping_gaps.entry(record.foreign_type.clone()).or_insert(0) += 1;
                    }
                    records.push(record);
                }
                Err(e) => {
                    let raw_id = adapter.raw_id(row);
                    warn!(dataset = %dataset_name, raw_id = %raw_id, error = %e, "Skipping malformed record");
                    report.skipped_records.push(SkippedRecord {
                        raw_id,
                        reason: ReasonCode::MalformedRecord,
                        detail: e.to_string(),
                    });
                }
            }
        }
        for (foreign_type, count) in &report.mapping_gaps {
            debug!(dataset = %dataset_name, foreign_type = %foreign_type, count, "Unmapped foreign type");
        }

        let index = Arc::new(DatasetIndex::build(records));
        let eligible: Vec<Event> = eligible.into_iter().cloned().collect();
        let scored = self.score_parallel(eligible, dataset_name, Arc::clone(&index)).await?;

        let thresholds = self.config.thresholds_for(dataset_name);
        (report.coverage, report.coverage_matches) = coverage(&index, scored.best_per_record, &thresholds);
        report.matches = scored.matches;

        let tiers = report.tier_counts();
        info!(
            dataset = %dataset_name,
            records = index.blocking.len(),
            malformed = report.skipped_records.len(),
            confirmed = tiers.get(&MatchTier::Confirmed).copied().unwrap_or(0),
            probable = tiers.get(&MatchTier::Probable).copied().unwrap_or(0),
            unmatched = tiers.get(&MatchTier::Unmatched).copied().unwrap_or(0),
            coverage = report.coverage.ratio(),
            "Dataset validated"
        );

        Ok(report)
    }

    /// Validate against every registered dataset.
    pub async fn validate_all(&self, events: &[Event]) -> Result<ValidationRun> {
        let run_id = Uuid::now_v7().to_string();
        info!(run_id = %run_id, events = events.len(), datasets = self.adapters.len(), "Validation run starting");

        let datasets = try_join_all(self.adapters.iter().map(|a| self.validate(events, a.name()))).await?;
        let run = ValidationRun { run_id, datasets };

        let skipped = run.skipped_datasets();
        if !skipped.is_empty() {
            warn!(run_id = %run.run_id, skipped = ?skipped, "Some datasets were skipped");
        }
        info!(run_id = %run.run_id, tiers = ?run.tier_counts(), "Validation run complete");

        Ok(run)
    }

    /// Score events in chunks on the blocking pool; results keep input order.
    async fn score_parallel(
        &self,
        events: Vec<Event>,
        dataset_name: &str,
        index: Arc<DatasetIndex>,
    ) -> Result<Scored> {
        let chunk_size = events.len().div_ceil(self.config.workers.max(1)).max(1);

        let mut handles = Vec::new();
        let mut events = events.into_iter().peekable();
        while events.peek().is_some() {
            let chunk: Vec<Event> = events.by_ref().take(chunk_size).collect();
            let index = Arc::clone(&index);
            let config = Arc::clone(&self.config);
            let dataset = dataset_name.to_string();
            handles.push(tokio::task::spawn_blocking(move || {
                score_chunk(&chunk, &index, &dataset, &config)
            }));
        }

        let mut scored = Scored::empty(index.blocking.len());
        for handle in handles {
            match handle.await {
                Ok(chunk) => scored.absorb(chunk),
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Err(_) => return Err(EngineError::Cancelled),
            }
        }
        Ok(scored)
    }
}

/// Match events against already-normalized records without the async
/// machinery. Same matches and coverage as [`ValidationEngine::validate`]
/// for the same inputs.
pub fn match_events(
    events: &[Event],
    records: Vec<ExternalRecord>,
    dataset_name: &str,
    config: &ValidationConfig,
) -> DatasetReport {
    let (eligible, excluded) = eligible_events(events);
    let eligible: Vec<Event> = eligible.into_iter().cloned().collect();
    let index = DatasetIndex::build(records);
    let scored = score_chunk(&eligible, &index, dataset_name, config);

    let mut report = DatasetReport::new(dataset_name);
    report.events_excluded = excluded;
    (report.coverage, report.coverage_matches) =
        coverage(&index, scored.best_per_record, &config.thresholds_for(dataset_name));
    report.matches = scored.matches;
    report
}

/// Write each match back onto its event as a [`MatchRef`].
///
/// Returns how many events were updated; matches for events no longer in
/// the store are ignored.
///
/// [`MatchRef`]: crate::types::validation::MatchRef
pub async fn attach_matches<S: EventStore + ?Sized>(store: &S, run: &ValidationRun) -> Result<usize> {
    let mut attached = 0;
    for m in run.matches() {
        if store.attach_match(&m.event_id, m.to_ref()).await? {
            attached += 1;
        } else {
            debug!(event_id = %m.event_id, dataset = %m.dataset_name, "Match for unknown event ignored");
        }
    }
    Ok(attached)
}

/// Events to validate, in input order, and how many failed placeholders
/// were left out. A repeated event id keeps its first occurrence.
fn eligible_events(events: &[Event]) -> (Vec<&Event>, usize) {
    let mut seen = HashSet::new();
    let mut eligible = Vec::with_capacity(events.len());
    let mut excluded = 0;
    for event in events {
        if !seen.insert(event.event_id.as_str()) {
            debug!(event_id = %event.event_id, "Duplicate event ignored");
            continue;
        }
        if event.extraction_status == ExtractionStatus::Failed {
            excluded += 1;
        } else {
            eligible.push(event);
        }
    }
    (eligible, excluded)
}

/// Fetch window covering every event span, widened by the tolerance.
fn event_window(events: &[&Event], tolerance_days: i64) -> Option<DateRange> {
    let start = events.iter().map(|e| e.start_date).min()?;
    let end = events.iter().map(|e| e.last_date()).max()?;
    Some(DateRange::new(start, end).padded(tolerance_days))
}

fn score_chunk(events: &[Event], index: &DatasetIndex, dataset_name: &str, config: &ValidationConfig) -> Scored {
    let thresholds = config.thresholds_for(dataset_name);
    let records = index.blocking.records();
    let mut best_per_record: Vec<RecordBest> = vec![None; records.len()];

    let matches = events
        .iter()
        .map(|event| {
            let tokens = event_tokens(event);
            let best = index
                .blocking
                .candidates(event, config)
                .into_iter()
                .map(|i| score_pair(event, &tokens, i, &records[i], &index.tokens[i], config))
                .inspect(|pair| offer(&mut best_per_record[pair.record], pair.score, &event.event_id))
                .min_by(|a, b| rank(a, b, records));

            let Some(best) = best else {
                return ValidationMatch {
                    event_id: event.event_id.clone(),
                    external_id: None,
                    dataset_name: dataset_name.to_string(),
                    score: 0.0,
                    tier: MatchTier::Unmatched,
                    field_scores: Default::default(),
                    reason: Some(ReasonCode::NoCandidates),
                    date_delta_days: None,
                    distance_km: None,
                };
            };

            let tier = tier_for(best.score, &thresholds);
            ValidationMatch {
                event_id: event.event_id.clone(),
                external_id: Some(records[best.record].external_id.clone()),
                dataset_name: dataset_name.to_string(),
                score: best.score,
                tier,
                field_scores: best.field_scores,
                reason: (tier == MatchTier::Unmatched).then_some(ReasonCode::BelowThreshold),
                date_delta_days: Some(best.date_delta_days),
                distance_km: best.distance_km,
            }
        })
        .collect();

    Scored {
        matches,
        best_per_record,
    }
}

/// Best first: higher score, then smaller date gap, then shorter distance,
/// then smallest external id.
fn rank(a: &PairScore, b: &PairScore, records: &[ExternalRecord]) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.date_delta_days.cmp(&b.date_delta_days))
        .then_with(|| {
            let (da, db) = (a.distance_km.unwrap_or(f64::INFINITY), b.distance_km.unwrap_or(f64::INFINITY));
            da.total_cmp(&db)
        })
        .then_with(|| records[a.record].external_id.cmp(&records[b.record].external_id))
}

/// Inverse pass: tier each record by the best event it reached.
fn coverage(
    index: &DatasetIndex,
    best_per_record: Vec<RecordBest>,
    thresholds: &Thresholds,
) -> (Coverage, Vec<CoverageMatch>) {
    let records = index.blocking.records();
    let decisions: Vec<CoverageMatch> = records
        .iter()
        .zip(best_per_record)
        .map(|(record, best)| match best {
            Some((score, event_id)) => CoverageMatch {
                external_id: record.external_id.clone(),
                event_id: Some(event_id),
                score,
                tier: tier_for(score, thresholds),
            },
            None => CoverageMatch {
                external_id: record.external_id.clone(),
                event_id: None,
                score: 0.0,
                tier: MatchTier::Unmatched,
            },
        })
        .collect();

    let coverage = Coverage {
        records_total: records.len(),
        records_matched: decisions.iter().filter(|d| d.tier != MatchTier::Unmatched).count(),
        records_unknown_type: records.iter().filter(|r| r.event_type_mapped.is_unknown()).count(),
    };
    (coverage, decisions)
}
