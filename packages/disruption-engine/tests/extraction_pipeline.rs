//! End-to-end tests for the extraction pipeline.
//!
//! These run whole batches through the engine with a scripted generator
//! and check what ends up in the report and the store.

use std::time::Duration;

use disruption_engine::{
    consolidate,
    testing::{sample_article, MockGenerator, VecArticleSource},
    Article, Disposition, EngineError, EventStore, EventType, ExtractionConfig, ExtractionEngine,
    ExtractionStatus, MemoryStore, ReasonCode,
};
use tokio_util::sync::CancellationToken;

const STRIKE: &str = r#"{"events": [{"event_type": "labour_strike", "country": "Indonesia",
    "admin1": "Jakarta", "start_date": "2024-03-01", "actors": ["dock workers"],
    "description": "Dock workers strike at Tanjung Priok", "confidence": 0.9}]}"#;

/// Two mentions of the same closure a day apart, plus a separate flood.
const CLOSURE_TWICE_AND_FLOOD: &str = r#"```json
{"events": [
  {"event_type": "port_disruption", "country": "IDN", "admin1": "Jakarta",
   "start_date": "2024-03-01", "description": "Tanjung Priok port closed", "confidence": 0.8},
  {"event_type": "port_disruption", "country": "IDN", "admin1": "Jakarta",
   "start_date": "2024-03-02", "description": "Port still closed at Tanjung Priok", "confidence": 0.6},
  {"event_type": "flood", "country": "IDN", "admin1": "Jakarta",
   "start_date": "2024-03-01", "description": "Flooding in North Jakarta", "confidence": 0.7}
]}
```"#;

fn fast_config() -> ExtractionConfig {
    ExtractionConfig::default()
        .with_retry_backoff(Duration::from_millis(1))
        .with_requests_per_second(1000)
}

fn engine(generator: MockGenerator) -> ExtractionEngine<MemoryStore, MockGenerator> {
    ExtractionEngine::with_config(MemoryStore::new(), generator, fast_config()).unwrap()
}

fn spanish_article(id: &str) -> Article {
    Article::new(
        id,
        "Los trabajadores del puerto iniciaron una huelga por los salarios según el sindicato y la carga se detuvo.",
        sample_article(id).published_at,
        "https://news.example.com/es",
    )
}

#[tokio::test]
async fn test_every_article_is_accounted_for() {
    let generator = MockGenerator::new()
        .with_response("ok", STRIKE)
        .with_response("quiet", r#"{"events": []}"#)
        .with_default_response("{\"not\": \"what we asked for\"}");
    let engine = engine(generator);

    let blank = Article::new("blank", "  ", sample_article("x").published_at, "https://x");
    let articles = vec![
        sample_article("ok"),
        sample_article("quiet"),
        sample_article("broken"),
        blank,
        spanish_article("es"),
    ];

    let report = engine
        .extract_batch(articles, &CancellationToken::new())
        .await
        .unwrap();

    assert!(report.reconciles());
    assert_eq!(report.articles_total, 5);
    assert_eq!(report.articles_extracted(), 1);

    let reasons = report.counts_by_reason();
    assert_eq!(reasons.get(&ReasonCode::NoEvent), Some(&1));
    assert_eq!(reasons.get(&ReasonCode::SchemaInvalid), Some(&1));
    assert_eq!(reasons.get(&ReasonCode::EmptyText), Some(&1));
    assert_eq!(reasons.get(&ReasonCode::UnsupportedLanguage), Some(&1));

    // The extracted event plus the failed placeholder
    assert_eq!(engine.store().count().await.unwrap(), 2);
    let statuses = report.counts_by_status();
    assert_eq!(statuses.get(&ExtractionStatus::Failed), Some(&1));
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let generator = MockGenerator::new().with_default_response(STRIKE);
    let engine = engine(generator.clone());
    let source = VecArticleSource::new(vec![sample_article("a"), sample_article("b")]);
    let cancel = CancellationToken::new();

    let first = engine.run_source(&source, &cancel).await.unwrap();
    let second = engine.run_source(&source, &cancel).await.unwrap();

    let ids = |r: &disruption_engine::ExtractionReport| {
        let mut ids: Vec<String> = r.events().map(|e| e.event_id.clone()).collect();
        ids.sort();
        ids
    };
    assert_eq!(ids(&first), ids(&second));
    assert_ne!(first.run_id, second.run_id);
    assert_eq!(engine.store().count().await.unwrap(), 2);

    // Second run is served from the response cache
    assert_eq!(generator.call_count(), 2);
    assert!(second.outcomes.iter().all(|o| o.cached));
}

#[tokio::test]
async fn test_same_story_in_two_articles_gets_two_ids() {
    let generator = MockGenerator::new().with_default_response(STRIKE);
    let engine = engine(generator);

    let report = engine
        .extract_batch(
            vec![sample_article("wire"), sample_article("local")],
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let events: Vec<_> = report.events().cloned().collect();
    assert_eq!(events.len(), 2);
    assert_ne!(events[0].event_id, events[1].event_id);

    // Consolidation groups them as one real-world event
    let grouped = consolidate(&events, 1);
    assert_eq!(grouped.len(), 1);
    assert_eq!(grouped[0].num_articles, 2);
}

#[tokio::test]
async fn test_changed_content_under_same_id_is_a_conflict() {
    let revised = STRIKE.replace("Dock workers strike at Tanjung Priok", "Strike ends early");
    let generator = MockGenerator::new()
        .with_response("art-1", STRIKE)
        .with_response("art-1", revised);
    let engine = ExtractionEngine::with_config(
        MemoryStore::new(),
        generator,
        fast_config().with_response_cache(false),
    )
    .unwrap();

    let first = engine.extract(&sample_article("art-1")).await.unwrap();
    assert_eq!(first.disposition, Disposition::Extracted { events: 1 });

    let second = engine.extract(&sample_article("art-1")).await.unwrap();
    assert_eq!(
        second.disposition,
        Disposition::Omitted {
            reason: ReasonCode::IdConflict
        }
    );
    assert_eq!(second.conflicts.len(), 1);
    assert_eq!(second.conflicts[0].event_id, first.events[0].event_id);
    assert_ne!(second.conflicts[0].existing_hash, second.conflicts[0].incoming_hash);

    let stored = engine
        .store()
        .get(&first.events[0].event_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.description, "Dock workers strike at Tanjung Priok");
}

#[tokio::test]
async fn test_repeated_mentions_are_deduplicated() {
    let engine = engine(MockGenerator::new().with_response("art-1", CLOSURE_TWICE_AND_FLOOD));

    let outcome = engine.extract(&sample_article("art-1")).await.unwrap();
    assert_eq!(outcome.disposition, Disposition::Extracted { events: 2 });

    let closure = outcome
        .events
        .iter()
        .find(|e| e.event_type == EventType::PortDisruption)
        .unwrap();
    assert_eq!(closure.start_date.to_string(), "2024-03-01");
    assert_eq!(closure.description, "Tanjung Priok port closed");
    assert!((closure.confidence - 0.8).abs() < 1e-9);
}

#[tokio::test]
async fn test_retry_bound_holds_across_failure_kinds() {
    let generator = MockGenerator::new()
        .with_error("art-1", EngineError::TransientUpstream("503".into()))
        .with_response("art-1", "I could not find any events, sorry!")
        .with_error("art-1", EngineError::TransientUpstream("503".into()))
        .with_response("art-1", STRIKE);
    let engine = engine(generator.clone());

    let outcome = engine.extract(&sample_article("art-1")).await.unwrap();

    assert_eq!(outcome.disposition.reason(), Some(ReasonCode::UpstreamError));
    assert_eq!(outcome.attempts, 3);
    assert_eq!(generator.calls_for("art-1"), 3);
    assert_eq!(outcome.events[0].extraction_status, ExtractionStatus::Failed);
}

#[tokio::test]
async fn test_slow_generator_times_out_per_call() {
    let generator = MockGenerator::new()
        .with_default_response(STRIKE)
        .with_delay(Duration::from_millis(200));
    let config = fast_config()
        .with_call_timeout(Duration::from_millis(10))
        .with_max_attempts(2);
    let engine = ExtractionEngine::with_config(MemoryStore::new(), generator, config).unwrap();

    let report = engine
        .extract_batch(vec![sample_article("slow")], &CancellationToken::new())
        .await
        .unwrap();

    assert!(report.reconciles());
    assert_eq!(report.counts_by_reason().get(&ReasonCode::Timeout), Some(&1));
}

#[tokio::test]
async fn test_duplicate_article_ids_processed_once() {
    let generator = MockGenerator::new().with_default_response(STRIKE);
    let engine = engine(generator.clone());

    let report = engine
        .extract_batch(
            vec![sample_article("dup"), sample_article("dup")],
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(report.articles_total, 1);
    assert!(report.reconciles());
    assert_eq!(generator.calls_for("dup"), 1);
}

#[tokio::test]
async fn test_generator_calls_never_exceed_concurrency() {
    let generator = MockGenerator::new()
        .with_default_response(STRIKE)
        .with_delay(Duration::from_millis(50));
    let engine = ExtractionEngine::with_config(
        MemoryStore::new(),
        generator.clone(),
        fast_config().with_concurrency(3),
    )
    .unwrap();

    let articles = (0..8).map(|i| sample_article(&format!("art-{i}"))).collect();
    let report = engine
        .extract_batch(articles, &CancellationToken::new())
        .await
        .unwrap();

    assert!(report.reconciles());
    assert_eq!(report.articles_extracted(), 8);
    assert_eq!(generator.call_count(), 8);
    assert_eq!(generator.max_in_flight(), 3);
}

#[tokio::test]
async fn test_cancel_mid_run_finishes_in_flight_articles() {
    let generator = MockGenerator::new()
        .with_default_response(STRIKE)
        .with_delay(Duration::from_millis(100));
    let engine = ExtractionEngine::with_config(
        MemoryStore::new(),
        generator.clone(),
        fast_config().with_concurrency(1),
    )
    .unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        trigger.cancel();
    });

    let articles = vec![sample_article("first"), sample_article("second"), sample_article("third")];
    let report = engine.extract_batch(articles, &cancel).await.unwrap();

    assert!(report.reconciles());
    assert_eq!(report.articles_total, 3);
    assert_eq!(report.outcomes[0].disposition, Disposition::Extracted { events: 1 });
    for outcome in &report.outcomes[1..] {
        assert_eq!(outcome.disposition.reason(), Some(ReasonCode::Cancelled));
    }
    assert_eq!(generator.call_count(), 1);
    assert_eq!(engine.store().count().await.unwrap(), 1);
}
