//! Property tests for blocking, scoring and tiering.

use chrono::NaiveDate;
use disruption_engine::geo::UNKNOWN_COUNTRY;
use disruption_engine::validation::scoring::{event_tokens, tokenize};
use disruption_engine::validation::{area_relation, date_gap_days, score_pair, tier_for, AreaRelation, BlockingIndex};
use disruption_engine::{
    DatePrecision, Event, EventType, ExternalRecord, Location, MatchTier, Thresholds, ValidationConfig,
};
use proptest::prelude::*;

const TYPES: &[EventType] = &[EventType::Protest, EventType::PortDisruption, EventType::Unknown];
const COUNTRIES: &[&str] = &["KEN", "IDN", "unknown"];
const REGIONS: &[&str] = &["Nairobi", "Mombasa", "Jakarta"];

fn base() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
}

fn location(country: usize, region: Option<usize>) -> Location {
    let location = Location::country(COUNTRIES[country]);
    match region {
        Some(r) => location.with_admin1(REGIONS[r]),
        None => location,
    }
}

prop_compose! {
    fn arb_record(id: usize)(
        kind in 0..TYPES.len(),
        country in 0..COUNTRIES.len(),
        region in proptest::option::of(0..REGIONS.len()),
        offset in 0i64..20,
        span in proptest::option::of(1i64..4),
    ) -> ExternalRecord {
        let date = base() + chrono::Duration::days(offset);
        ExternalRecord {
            external_id: format!("R{id:03}"),
            dataset_name: "prop".to_string(),
            event_type_mapped: TYPES[kind],
            foreign_type: TYPES[kind].as_str().to_string(),
            location: location(country, region),
            date,
            date_end: span.map(|s| date + chrono::Duration::days(s)),
            date_precision: DatePrecision::Day,
            text: "port strike protest".to_string(),
            raw_fields: Default::default(),
        }
    }
}

prop_compose! {
    fn arb_event()(
        kind in 0..TYPES.len() - 1,
        country in 0..COUNTRIES.len(),
        region in proptest::option::of(0..REGIONS.len()),
        offset in 0i64..20,
    ) -> Event {
        Event::new(
            "art-prop",
            TYPES[kind],
            location(country, region),
            base() + chrono::Duration::days(offset),
        )
        .with_description("Dock workers strike at the port")
    }
}

fn arb_records() -> impl Strategy<Value = Vec<ExternalRecord>> {
    (0usize..12).prop_flat_map(|n| (0..n).map(arb_record).collect::<Vec<_>>())
}

proptest! {
    #[test]
    fn prop_blocking_returns_exactly_the_eligible_records(
        event in arb_event(),
        records in arb_records(),
        tolerance in 0i64..5,
    ) {
        let config = ValidationConfig::default().with_date_tolerance(tolerance);
        let index = BlockingIndex::build(records.clone());
        let candidates = index.candidates(&event, &config);

        let eligible: Vec<usize> = records
            .iter()
            .enumerate()
            .filter(|(_, r)| {
                r.event_type_mapped == event.event_type
                    && r.location.country == event.location.country
                    && r.location.country != UNKNOWN_COUNTRY
                    && date_gap_days(event.start_date, event.last_date(), r.date, r.last_date()) <= tolerance
                    && area_relation(&event.location, &r.location, &config) != AreaRelation::Distinct
            })
            .map(|(i, _)| i)
            .collect();

        let mut sorted = candidates.clone();
        sorted.sort_unstable();
        prop_assert_eq!(sorted, eligible);

        let gaps: Vec<i64> = candidates
            .iter()
            .map(|&i| date_gap_days(event.start_date, event.last_date(), records[i].date, records[i].last_date()))
            .collect();
        prop_assert!(gaps.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn prop_scores_are_bounded_and_gated(
        event in arb_event(),
        record in arb_record(0),
    ) {
        let config = ValidationConfig::default();
        let scored = score_pair(
            &event,
            &event_tokens(&event),
            0,
            &record,
            &tokenize(&record.text),
            &config,
        );

        prop_assert!((0.0..=1.0).contains(&scored.score));
        if record.location.country != event.location.country
            || record.location.country == UNKNOWN_COUNTRY
            || record.event_type_mapped != event.event_type
        {
            prop_assert_eq!(scored.score, 0.0);
        }
        if scored.date_delta_days > config.date_tolerance_days {
            prop_assert_eq!(scored.field_scores["time"], 0.0);
        }
    }

    #[test]
    fn prop_higher_score_never_gets_lower_tier(
        a in 0.0f64..=1.0,
        b in 0.0f64..=1.0,
        probable in 0.0f64..=1.0,
        gap in 0.0f64..=1.0,
    ) {
        let thresholds = Thresholds {
            confirmed: (probable + gap).min(1.0),
            probable,
        };
        let (low, high) = if a <= b { (a, b) } else { (b, a) };

        // Confirmed < Probable < Unmatched in declaration order
        prop_assert!(tier_for(high, &thresholds) <= tier_for(low, &thresholds));
        if high >= thresholds.confirmed {
            prop_assert_eq!(tier_for(high, &thresholds), MatchTier::Confirmed);
        }
    }
}
