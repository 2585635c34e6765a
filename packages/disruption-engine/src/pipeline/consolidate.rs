//! Cross-article consolidation.
//!
//! Event ids include the source article, so two outlets reporting the same
//! strike produce two stored events. This module groups them into a
//! read-only view without touching the store.

use std::collections::{BTreeSet, HashSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::types::event::{Event, ExtractionStatus};

/// Events from one or more articles judged to describe one occurrence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidatedEvent {
    /// Most confident member
    pub representative: Event,
    pub event_ids: Vec<String>,
    pub article_ids: Vec<String>,
    pub num_articles: usize,
    /// Earliest start date across members
    pub start_date: NaiveDate,
    /// Highest member confidence
    pub confidence: f64,
}

/// Lowercased admin1 tokens longer than two characters.
fn location_tokens(event: &Event) -> HashSet<String> {
    event
        .location
        .admin1
        .as_deref()
        .unwrap_or_default()
        .to_lowercase()
        .split(|c: char| !c.is_alphabetic())
        .filter(|t| t.chars().count() > 2)
        .map(str::to_string)
        .collect()
}

/// Same country, and shared admin1 tokens unless either side is
/// country-level.
fn same_place(a: &Event, a_tokens: &HashSet<String>, b: &Event, b_tokens: &HashSet<String>) -> bool {
    a.location.country == b.location.country
        && (a_tokens.is_empty() || b_tokens.is_empty() || !a_tokens.is_disjoint(b_tokens))
}

/// Greedily cluster events by type, date proximity and shared location.
///
/// Each event joins the first cluster whose first member has the same
/// type, a start date within `window_days`, and a compatible place. Failed
/// placeholders are never merged.
pub fn consolidate(events: &[Event], window_days: i64) -> Vec<ConsolidatedEvent> {
    let mut ordered: Vec<&Event> = events.iter().collect();
    ordered.sort_by(|a, b| a.start_date.cmp(&b.start_date).then_with(|| a.event_id.cmp(&b.event_id)));

    let mut clusters: Vec<(HashSet<String>, Vec<&Event>)> = Vec::new();
    let mut passthrough: Vec<&Event> = Vec::new();

    for event in ordered {
        if event.extraction_status == ExtractionStatus::Failed || event.event_type.is_unknown() {
            passthrough.push(event);
            continue;
        }

        let tokens = location_tokens(event);
        let home = clusters.iter_mut().find(|(rep_tokens, members)| {
            let rep = members[0];
            rep.event_type == event.event_type
                && (event.start_date - rep.start_date).num_days().abs() <= window_days
                && same_place(rep, rep_tokens, event, &tokens)
        });

        match home {
            Some((_, members)) => members.push(event),
            None => clusters.push((tokens, vec![event])),
        }
    }

    clusters
        .into_iter()
        .map(|(_, members)| merge(members))
        .chain(passthrough.into_iter().map(|e| merge(vec![e])))
        .collect()
}

fn merge(members: Vec<&Event>) -> ConsolidatedEvent {
    let representative = members
        .iter()
        .copied()
        .fold(members[0], |best, e| if e.confidence > best.confidence { e } else { best })
        .clone();

    let article_ids: BTreeSet<&str> = members.iter().map(|e| e.source_article_id.as_str()).collect();

    ConsolidatedEvent {
        event_ids: members.iter().map(|e| e.event_id.clone()).collect(),
        num_articles: article_ids.len(),
        article_ids: article_ids.into_iter().map(str::to_string).collect(),
        start_date: members.iter().map(|e| e.start_date).min().unwrap_or(representative.start_date),
        confidence: representative.confidence,
        representative,
    }
}
