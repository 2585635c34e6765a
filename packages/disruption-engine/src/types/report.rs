//! Reason codes, per-article dispositions and run reports.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::event::{Event, ExtractionStatus};

/// Why an article or record produced no (or degraded) output.
///
/// Every omission in a run carries one of these so counts reconcile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    EmptyText,
    UnsupportedLanguage,
    NoEvent,
    SchemaInvalid,
    Timeout,
    UpstreamError,
    IdConflict,
    Cancelled,
    SourceUnavailable,
    BelowThreshold,
    NoCandidates,
    MalformedRecord,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EmptyText => "empty_text",
            Self::UnsupportedLanguage => "unsupported_language",
            Self::NoEvent => "no_event",
            Self::SchemaInvalid => "schema_invalid",
            Self::Timeout => "timeout",
            Self::UpstreamError => "upstream_error",
            Self::IdConflict => "id_conflict",
            Self::Cancelled => "cancelled",
            Self::SourceUnavailable => "source_unavailable",
            Self::BelowThreshold => "below_threshold",
            Self::NoCandidates => "no_candidates",
            Self::MalformedRecord => "malformed_record",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal state of one article after extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Disposition {
    /// One or more events were stored
    Extracted { events: usize },
    /// Nothing stored; the reason explains why
    Omitted { reason: ReasonCode },
    /// Retries exhausted; a `failed` placeholder event was stored
    Failed { reason: ReasonCode },
}

impl Disposition {
    pub fn reason(&self) -> Option<ReasonCode> {
        match self {
            Self::Extracted { .. } => None,
            Self::Omitted { reason } | Self::Failed { reason } => Some(*reason),
        }
    }
}

/// A record-level conflict raised while storing an article's events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictNote {
    pub event_id: String,
    pub existing_hash: String,
    pub incoming_hash: String,
}

/// Everything extraction produced for one article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleOutcome {
    pub article_id: String,
    pub disposition: Disposition,

    /// Events accepted into the store (placeholder included when failed)
    pub events: Vec<Event>,

    /// Generator calls made; 0 when cached or short-circuited
    pub attempts: u32,

    /// Whether the model output came from the response cache
    pub cached: bool,

    /// Events rejected by the store because their id already held different content
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<ConflictNote>,

    /// Human-readable detail for failures
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ArticleOutcome {
    /// Outcome for an article that never reached the generator.
    pub fn omitted(article_id: impl Into<String>, reason: ReasonCode) -> Self {
        Self {
            article_id: article_id.into(),
            disposition: Disposition::Omitted { reason },
            events: Vec::new(),
            attempts: 0,
            cached: false,
            conflicts: Vec::new(),
            detail: None,
        }
    }
}

/// Summary of one extraction run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionReport {
    pub run_id: String,
    pub articles_total: usize,
    pub outcomes: Vec<ArticleOutcome>,
}

impl ExtractionReport {
    pub fn new(run_id: impl Into<String>, articles_total: usize) -> Self {
        Self {
            run_id: run_id.into(),
            articles_total,
            outcomes: Vec::with_capacity(articles_total),
        }
    }

    /// Articles that produced events.
    pub fn articles_extracted(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.disposition, Disposition::Extracted { .. }))
            .count()
    }

    /// Articles without events, by reason. Record-level id conflicts are included.
    pub fn counts_by_reason(&self) -> BTreeMap<ReasonCode, usize> {
        let mut counts = BTreeMap::new();
        for outcome in &self.outcomes {
            if let Some(reason) = outcome.disposition.reason() {
                *counts.entry(reason).or_insert(0) += 1;
            }
            if !outcome.conflicts.is_empty() {
                *counts.entry(ReasonCode::IdConflict).or_insert(0) += outcome.conflicts.len();
            }
        }
        counts
    }

    /// Stored events, by extraction status.
    pub fn counts_by_status(&self) -> BTreeMap<ExtractionStatus, usize> {
        let mut counts = BTreeMap::new();
        for event in self.outcomes.iter().flat_map(|o| o.events.iter()) {
            *counts.entry(event.extraction_status).or_insert(0) += 1;
        }
        counts
    }

    /// All events, in article order.
    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.outcomes.iter().flat_map(|o| o.events.iter())
    }

    /// Every input article has exactly one terminal disposition.
    pub fn reconciles(&self) -> bool {
        let mut seen = std::collections::HashSet::new();
        let unique = self.outcomes.iter().all(|o| seen.insert(o.article_id.as_str()));
        let consistent = self.outcomes.iter().all(|o| match o.disposition {
            Disposition::Extracted { events } => events > 0 && events == o.events.len(),
            Disposition::Omitted { .. } => o.events.is_empty(),
            Disposition::Failed { .. } => o.events.len() == 1,
        });
        unique && consistent && self.outcomes.len() == self.articles_total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_code_serializes_snake_case() {
        let json = serde_json::to_string(&ReasonCode::SchemaInvalid).unwrap();
        assert_eq!(json, "\"schema_invalid\"");
        assert_eq!(ReasonCode::BelowThreshold.to_string(), "below_threshold");
    }

    #[test]
    fn test_reconcile_detects_missing_outcome() {
        let mut report = ExtractionReport::new("run", 2);
        report
            .outcomes
            .push(ArticleOutcome::omitted("a1", ReasonCode::EmptyText));
        assert!(!report.reconciles());

        report
            .outcomes
            .push(ArticleOutcome::omitted("a2", ReasonCode::NoEvent));
        assert!(report.reconciles());
        assert_eq!(report.counts_by_reason().get(&ReasonCode::EmptyText), Some(&1));
    }

    #[test]
    fn test_reconcile_detects_duplicate_article() {
        let mut report = ExtractionReport::new("run", 2);
        report
            .outcomes
            .push(ArticleOutcome::omitted("a1", ReasonCode::EmptyText));
        report
            .outcomes
            .push(ArticleOutcome::omitted("a1", ReasonCode::EmptyText));
        assert!(!report.reconciles());
    }
}
