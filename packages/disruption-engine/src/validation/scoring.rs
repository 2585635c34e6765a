//! Pairwise similarity between an extracted event and a foreign record.
//!
//! Every component lies in [0, 1]. Type and country are gates: a mismatch
//! on either, or an unknown country, makes the whole pair score 0.

use std::collections::HashSet;
use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;

use crate::geo::UNKNOWN_COUNTRY;
use crate::types::config::{ScoringWeights, Thresholds, ValidationConfig};
use crate::types::event::{Event, EventType, Location};
use crate::types::external::ExternalRecord;
use crate::types::validation::MatchTier;
use crate::validation::blocking::{area_relation, date_gap_days, distance_km, AreaRelation};

static TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\p{L}\p{N}][\p{L}\p{N}'-]*").expect("TOKEN regex is invalid")
});

static STOPWORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "the", "and", "for", "are", "was", "were", "with", "from", "that", "this", "have", "has",
        "had", "not", "but", "its", "their", "they", "them", "which", "who", "will", "would",
        "been", "into", "over", "after", "before", "about", "than", "also", "said", "says", "on",
        "in", "at", "of", "to", "by", "an", "as", "or", "is", "it", "be",
    ]
    .into_iter()
    .collect()
});

/// Lowercased content tokens longer than two characters.
pub fn tokenize(text: &str) -> HashSet<String> {
    let lowered = text.to_lowercase();
    TOKEN
        .find_iter(&lowered)
        .map(|m| m.as_str().trim_matches(|c| c == '\'' || c == '-'))
        .filter(|t| t.chars().count() > 2 && !STOPWORDS.contains(t))
        .map(str::to_string)
        .collect()
}

/// Tokens of an event's description and actors.
pub fn event_tokens(event: &Event) -> HashSet<String> {
    let mut text = event.description.clone();
    for actor in &event.actors {
        text.push(' ');
        text.push_str(actor);
    }
    tokenize(&text)
}

pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let shared = a.intersection(b).count();
    shared as f64 / (a.len() + b.len() - shared) as f64
}

/// 1 for overlapping spans, decaying linearly to 0 just past `tolerance`.
pub fn time_score(gap_days: i64, tolerance_days: i64) -> f64 {
    if gap_days > tolerance_days {
        return 0.0;
    }
    1.0 - gap_days.max(0) as f64 / (tolerance_days + 1) as f64
}

/// Country agreement is worth half; admin1 or proximity adds the rest.
///
/// Two unknown countries never agree.
pub fn geo_score(event: &Location, record: &Location, config: &ValidationConfig) -> (f64, Option<f64>) {
    let distance = distance_km(event, record);
    if event.country != record.country || event.country == UNKNOWN_COUNTRY {
        return (0.0, distance);
    }

    let regional = match area_relation(event, record, config) {
        AreaRelation::SameRegion => 1.0,
        AreaRelation::Adjacent => 0.5,
        AreaRelation::CountryLevel | AreaRelation::Distinct => 0.0,
    };
    let proximity = distance
        .map(|d| (1.0 - d / config.max_distance_km).clamp(0.0, 1.0))
        .unwrap_or(0.0);

    (0.5 + 0.5 * f64::max(regional, proximity), distance)
}

pub fn type_score(event: EventType, record: EventType) -> f64 {
    if event.compatible_with(&record) {
        1.0
    } else {
        0.0
    }
}

/// Score of one (event, record) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct PairScore {
    /// Position of the record in its index
    pub record: usize,
    pub score: f64,
    pub field_scores: IndexMap<String, f64>,
    pub date_delta_days: i64,
    pub distance_km: Option<f64>,
}

/// Weighted similarity of one pair, normalized by the weight sum.
pub fn score_pair(
    event: &Event,
    event_tokens: &HashSet<String>,
    record_index: usize,
    record: &ExternalRecord,
    record_tokens: &HashSet<String>,
    config: &ValidationConfig,
) -> PairScore {
    let gap = date_gap_days(event.start_date, event.last_date(), record.date, record.last_date());
    let time = time_score(gap, config.date_tolerance_days);
    let (geo, distance) = geo_score(&event.location, &record.location, config);
    let kind = type_score(event.event_type, record.event_type_mapped);
    let text = jaccard(event_tokens, record_tokens);

    let score = if kind == 0.0 || geo == 0.0 {
        0.0
    } else {
        weighted(&config.weights, time, geo, text)
    };

    let mut field_scores = IndexMap::new();
    field_scores.insert("time".to_string(), time);
    field_scores.insert("geo".to_string(), geo);
    field_scores.insert("type".to_string(), kind);
    field_scores.insert("text".to_string(), text);

    PairScore {
        record: record_index,
        score,
        field_scores,
        date_delta_days: gap,
        distance_km: distance,
    }
}

fn weighted(weights: &ScoringWeights, time: f64, geo: f64, text: f64) -> f64 {
    let total = weights.total();
    if total <= 0.0 {
        return 0.0;
    }
    ((weights.time * time + weights.geo * geo + weights.text * text) / total).clamp(0.0, 1.0)
}

/// Tier for a score; never lower for a higher score.
pub fn tier_for(score: f64, thresholds: &Thresholds) -> MatchTier {
    if score >= thresholds.confirmed {
        MatchTier::Confirmed
    } else if score >= thresholds.probable {
        MatchTier::Probable
    } else {
        MatchTier::Unmatched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_tokenize_drops_stopwords_and_short_tokens() {
        let tokens = tokenize("The port of Tanjung Priok was closed by dock-workers' strike, 2024");
        assert!(tokens.contains("tanjung"));
        assert!(tokens.contains("dock-workers"));
        assert!(tokens.contains("2024"));
        assert!(!tokens.contains("the"));
        assert!(!tokens.contains("of"));
        assert!(!tokens.contains("was"));
    }

    #[test]
    fn test_jaccard() {
        let a = tokenize("port strike jakarta");
        let b = tokenize("strike jakarta dockers");
        assert!((jaccard(&a, &b) - 0.5).abs() < 1e-9);
        assert_eq!(jaccard(&a, &HashSet::new()), 0.0);
    }

    #[test]
    fn test_time_score_decays_linearly() {
        assert_eq!(time_score(0, 3), 1.0);
        assert_eq!(time_score(1, 3), 0.75);
        assert_eq!(time_score(3, 3), 0.25);
        assert_eq!(time_score(4, 3), 0.0);
    }

    #[test]
    fn test_geo_score_levels() {
        let config = ValidationConfig::default();
        let jakarta = Location::country("IDN").with_admin1("Jakarta");

        assert_eq!(geo_score(&jakarta, &jakarta.clone(), &config).0, 1.0);
        assert_eq!(geo_score(&jakarta, &Location::country("IDN"), &config).0, 0.5);
        assert_eq!(geo_score(&jakarta, &Location::country("MYS"), &config).0, 0.0);
    }

    #[test]
    fn test_unknown_countries_do_not_agree() {
        let config = ValidationConfig::default();
        let missing = Location::country("");
        let blank = Location::country("unknown");
        assert_eq!(geo_score(&missing, &blank, &config).0, 0.0);
    }

    #[test]
    fn test_type_mismatch_zeroes_pair() {
        let event = Event::new(
            "a",
            EventType::Protest,
            Location::country("IDN"),
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        );
        let record = ExternalRecord {
            external_id: "r".into(),
            dataset_name: "d".into(),
            event_type_mapped: EventType::Riot,
            foreign_type: "Riots".into(),
            location: Location::country("IDN"),
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            date_end: None,
            date_precision: crate::types::external::DatePrecision::Day,
            text: String::new(),
            raw_fields: Default::default(),
        };

        let scored = score_pair(&event, &HashSet::new(), 0, &record, &HashSet::new(), &ValidationConfig::default());
        assert_eq!(scored.score, 0.0);
        assert_eq!(scored.field_scores.keys().collect::<Vec<_>>(), vec!["time", "geo", "type", "text"]);
    }

    #[test]
    fn test_tiers() {
        let thresholds = Thresholds::default();
        assert_eq!(tier_for(0.9, &thresholds), MatchTier::Confirmed);
        assert_eq!(tier_for(0.75, &thresholds), MatchTier::Confirmed);
        assert_eq!(tier_for(0.6, &thresholds), MatchTier::Probable);
        assert_eq!(tier_for(0.2, &thresholds), MatchTier::Unmatched);
    }
}
