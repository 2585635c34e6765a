//! Collapse repeated mentions of one event within an article.

use std::collections::BTreeMap;

use crate::types::event::Event;

/// Merge same-article events that share type and location and whose start
/// dates fall within `window_days` of the group's earliest start.
///
/// The most confident event of each group survives with the union of all
/// actors. Output is sorted by start date, then id.
pub fn dedup_events(events: Vec<Event>, window_days: i64) -> Vec<Event> {
    let mut groups: BTreeMap<(String, String, String), Vec<Event>> = BTreeMap::new();
    for event in events {
        let key = (
            event.source_article_id.clone(),
            event.event_type.as_str().to_string(),
            event.location.identity_key(),
        );
        groups.entry(key).or_default().push(event);
    }

    let mut kept = Vec::new();
    for (_, mut group) in groups {
        group.sort_by(|a, b| a.start_date.cmp(&b.start_date).then_with(|| a.event_id.cmp(&b.event_id)));

        let mut cluster: Vec<Event> = Vec::new();
        for event in group {
            let fits = cluster
                .first()
                .is_some_and(|anchor| (event.start_date - anchor.start_date).num_days() <= window_days);
            if !fits && !cluster.is_empty() {
                kept.push(merge(std::mem::take(&mut cluster)));
            }
            cluster.push(event);
        }
        if !cluster.is_empty() {
            kept.push(merge(cluster));
        }
    }

    kept.sort_by(|a, b| a.start_date.cmp(&b.start_date).then_with(|| a.event_id.cmp(&b.event_id)));
    kept
}

fn merge(mut cluster: Vec<Event>) -> Event {
    // Highest confidence wins; ties go to the earliest (cluster is date-sorted)
    let best = cluster
        .iter()
        .enumerate()
        .fold(0, |best, (i, e)| if e.confidence > cluster[best].confidence { i } else { best });

    let mut actors: Vec<String> = cluster[best].actors.clone();
    for event in &cluster {
        for actor in &event.actors {
            if !actors.iter().any(|a| a.eq_ignore_ascii_case(actor)) {
                actors.push(actor.clone());
            }
        }
    }

    let mut survivor = cluster.swap_remove(best);
    survivor.actors = actors;
    survivor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::event::{EventType, Location};
    use chrono::NaiveDate;

    fn event(day: u32, confidence: f64, actor: &str) -> Event {
        Event::new(
            "art-1",
            EventType::LabourStrike,
            Location::country("Chile").with_admin1("Antofagasta"),
            NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
        )
        .with_description(format!("strike reported with confidence {confidence}"))
        .with_actors([actor])
        .with_confidence(confidence)
    }

    #[test]
    fn test_repeats_within_window_collapse() {
        let events = vec![event(1, 0.6, "union"), event(2, 0.9, "miners"), event(1, 0.7, "Union")];
        let kept = dedup_events(events, 1);

        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[0].start_date, NaiveDate::from_ymd_opt(2024, 3, 2).unwrap());
        assert_eq!(kept[0].actors, vec!["miners".to_string(), "union".to_string()]);
    }

    #[test]
    fn test_outside_window_kept_apart() {
        let kept = dedup_events(vec![event(1, 0.6, "a"), event(5, 0.6, "b")], 1);
        assert_eq!(kept.len(), 2);
        assert!(kept[0].start_date < kept[1].start_date);
    }

    #[test]
    fn test_different_location_kept_apart() {
        let other = Event::new(
            "art-1",
            EventType::LabourStrike,
            Location::country("Chile").with_admin1("Atacama"),
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        );
        assert_eq!(dedup_events(vec![event(1, 0.6, "a"), other], 1).len(), 2);
    }
}
