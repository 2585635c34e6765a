//! The extraction engine - article in, stored events out.

use std::collections::HashSet;
use std::num::NonZeroU32;
use std::sync::Arc;

use futures::{stream, StreamExt, TryStreamExt};
use governor::{Quota, RateLimiter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{EngineError, Result, SchemaViolation};
use crate::pipeline::dedup::dedup_events;
use crate::pipeline::extract::{failed_event, parse_model_output, to_event, ValidItem};
use crate::pipeline::language::is_language;
use crate::pipeline::prompts::{build_prompt, extract_prompt_hash};
use crate::traits::generator::Generator;
use crate::traits::source::ArticleSource;
use crate::traits::store::{CachedResponse, Store};
use crate::types::{
    article::Article,
    config::ExtractionConfig,
    event::Event,
    report::{ArticleOutcome, ConflictNote, Disposition, ExtractionReport, ReasonCode},
};

type DefaultRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// How the generator loop ended for one article.
enum Generation {
    Parsed {
        items: Vec<ValidItem>,
        raw: String,
        attempts: u32,
    },
    Exhausted {
        reason: ReasonCode,
        detail: String,
        attempts: u32,
    },
}

/// Turns articles into stored events.
///
/// # Example
///
/// ```rust,ignore
/// let engine = ExtractionEngine::new(MemoryStore::new(), generator)?;
/// let report = engine.extract_batch(articles, &CancellationToken::new()).await?;
/// assert!(report.reconciles());
/// ```
pub struct ExtractionEngine<S: Store, G: Generator> {
    store: S,
    generator: G,
    config: ExtractionConfig,
    limiter: Arc<DefaultRateLimiter>,
    prompt_hash: String,
}

impl<S: Store, G: Generator> ExtractionEngine<S, G> {
    /// Create an engine with the default configuration.
    pub fn new(store: S, generator: G) -> Result<Self> {
        Self::with_config(store, generator, ExtractionConfig::default())
    }

    /// Create with custom configuration.
    pub fn with_config(store: S, generator: G, config: ExtractionConfig) -> Result<Self> {
        config.validate()?;
        let rps = NonZeroU32::new(config.requests_per_second)
            .ok_or_else(|| EngineError::Config("requests_per_second must be at least 1".into()))?;

        Ok(Self {
            store,
            generator,
            limiter: Arc::new(RateLimiter::direct(Quota::per_second(rps))),
            config,
            prompt_hash: extract_prompt_hash(),
        })
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Extract, deduplicate and store the events of one article.
    ///
    /// Per-article problems (empty text, wrong language, exhausted retries,
    /// id conflicts) are reported in the outcome. Only storage failures
    /// are returned as errors.
    pub async fn extract(&self, article: &Article) -> Result<ArticleOutcome> {
        if article.is_blank() {
            debug!(article_id = %article.id, "Skipping empty article");
            return Ok(ArticleOutcome::omitted(&article.id, ReasonCode::EmptyText));
        }

        if let Some(target) = self.config.target_language.as_deref() {
            if !is_language(&article.text, target) {
                debug!(article_id = %article.id, target = %target, "Skipping article in another language");
                return Ok(ArticleOutcome::omitted(&article.id, ReasonCode::UnsupportedLanguage));
            }
        }

        let content_hash = article.content_hash();
        let (items, attempts, cached) = match self.cached_items(article, &content_hash).await? {
            Some(items) => (items, 0, true),
            None => match self.generate(article).await {
                Generation::Parsed { items, raw, attempts } => {
                    if self.config.use_response_cache {
                        let response = CachedResponse::new(
                            &article.id,
                            &content_hash,
                            &self.prompt_hash,
                            raw,
                            self.generator.model(),
                        );
                        self.store.store_response(&response).await?;
                    }
                    (items, attempts, false)
                }
                Generation::Exhausted {
                    reason,
                    detail,
                    attempts,
                } => return self.record_failure(article, reason, detail, attempts).await,
            },
        };

        let events: Vec<Event> = items
            .into_iter()
            .map(|item| to_event(article, item, self.config.partial_confidence_factor))
            .collect();
        let events = dedup_events(events, self.config.dedup_window_days);

        if events.is_empty() {
            debug!(article_id = %article.id, "No qualifying disruption");
            let mut outcome = ArticleOutcome::omitted(&article.id, ReasonCode::NoEvent);
            outcome.attempts = attempts;
            outcome.cached = cached;
            return Ok(outcome);
        }

        let mut stored = Vec::with_capacity(events.len());
        let mut conflicts = Vec::new();
        for event in events {
            match self.upsert(&event).await? {
                Ok(()) => stored.push(event),
                Err(note) => conflicts.push(note),
            }
        }

        let disposition = if stored.is_empty() {
            Disposition::Omitted {
                reason: ReasonCode::IdConflict,
            }
        } else {
            Disposition::Extracted {
                events: stored.len(),
            }
        };

        Ok(ArticleOutcome {
            article_id: article.id.clone(),
            disposition,
            events: stored,
            attempts,
            cached,
            conflicts,
            detail: None,
        })
    }

    /// Extract every article, up to `concurrency` at a time.
    ///
    /// Articles not yet started when `cancel` fires are reported as
    /// `cancelled`; in-flight articles finish. Duplicate article ids are
    /// processed once.
    pub async fn extract_batch(
        &self,
        articles: Vec<Article>,
        cancel: &CancellationToken,
    ) -> Result<ExtractionReport> {
        let run_id = Uuid::now_v7().to_string();

        let mut seen = HashSet::new();
        let articles: Vec<Article> = articles
            .into_iter()
            .filter(|a| {
                let fresh = seen.insert(a.id.clone());
                if !fresh {
                    warn!(article_id = %a.id, "Duplicate article id in batch, processing once");
                }
                fresh
            })
            .collect();

        info!(run_id = %run_id, articles = articles.len(), "Extraction run starting");

        if self.config.use_response_cache {
            let dropped = self.store.invalidate_stale_responses(&self.prompt_hash).await?;
            if dropped > 0 {
                info!(dropped, "Invalidated responses cached under an older prompt");
            }
        }

        let mut outcomes: Vec<(usize, ArticleOutcome)> = stream::iter(articles.iter().enumerate())
            .map(|(i, article)| async move {
                if cancel.is_cancelled() {
                    return Ok((i, ArticleOutcome::omitted(&article.id, ReasonCode::Cancelled)));
                }
                self.extract(article).await.map(|outcome| (i, outcome))
            })
            .buffer_unordered(self.config.concurrency)
            .try_collect()
            .await?;
        outcomes.sort_by_key(|(i, _)| *i);

        let mut report = ExtractionReport::new(run_id, articles.len());
        report.outcomes = outcomes.into_iter().map(|(_, o)| o).collect();

        info!(
            run_id = %report.run_id,
            articles = report.articles_total,
            extracted = report.articles_extracted(),
            events = report.events().count(),
            reasons = ?report.counts_by_reason(),
            "Extraction run complete"
        );

        Ok(report)
    }

    /// Pull one run's articles from a source and extract them.
    pub async fn run_source<A: ArticleSource + ?Sized>(
        &self,
        source: &A,
        cancel: &CancellationToken,
    ) -> Result<ExtractionReport> {
        let articles = source.articles().await?;
        self.extract_batch(articles, cancel).await
    }

    async fn cached_items(&self, article: &Article, content_hash: &str) -> Result<Option<Vec<ValidItem>>> {
        if !self.config.use_response_cache {
            return Ok(None);
        }
        let Some(cached) = self
            .store
            .get_response(&article.id, content_hash, &self.prompt_hash)
            .await?
        else {
            return Ok(None);
        };

        match parse_model_output(&cached.raw) {
            Ok(items) => {
                debug!(article_id = %article.id, "Replaying cached response");
                Ok(Some(items))
            }
            Err(e) => {
                warn!(article_id = %article.id, error = %e, "Cached response no longer parses, regenerating");
                Ok(None)
            }
        }
    }

    /// Call the generator until it yields schema-valid output or the
    /// attempts run out.
    async fn generate(&self, article: &Article) -> Generation {
        let max_attempts = self.config.max_attempts;
        let mut last_violation: Option<SchemaViolation> = None;
        let mut last_failure = (ReasonCode::UpstreamError, String::new());

        for attempt in 1..=max_attempts {
            self.limiter.until_ready().await;

            let prompt = build_prompt(article, attempt, last_violation.as_ref());
            let call = tokio::time::timeout(self.config.call_timeout, self.generator.generate(&prompt)).await;

            let error = match call {
                Ok(Ok(raw)) => match parse_model_output(&raw) {
                    Ok(items) => {
                        return Generation::Parsed {
                            items,
                            raw,
                            attempts: attempt,
                        }
                    }
                    Err(violation) => EngineError::SchemaViolation(violation),
                },
                Ok(Err(e)) => e,
                Err(_) => EngineError::Timeout(self.config.call_timeout),
            };

            let reason = match &error {
                EngineError::SchemaViolation(_) => ReasonCode::SchemaInvalid,
                EngineError::Timeout(_) => ReasonCode::Timeout,
                _ => ReasonCode::UpstreamError,
            };
            warn!(
                article_id = %article.id,
                attempt,
                max_attempts,
                reason = %reason,
                error = %error,
                "Generation attempt failed"
            );
            last_failure = (reason, error.to_string());

            if !error.is_retryable() {
                return Generation::Exhausted {
                    reason,
                    detail: last_failure.1,
                    attempts: attempt,
                };
            }

            match error {
                EngineError::SchemaViolation(violation) => last_violation = Some(violation),
                _ if attempt < max_attempts => {
                    let backoff = self.config.retry_backoff * 2u32.saturating_pow(attempt - 1);
                    debug!(article_id = %article.id, ?backoff, "Backing off before retry");
                    tokio::time::sleep(backoff).await;
                }
                _ => {}
            }
        }

        let (reason, detail) = last_failure;
        Generation::Exhausted {
            reason,
            detail,
            attempts: max_attempts,
        }
    }

    async fn record_failure(
        &self,
        article: &Article,
        reason: ReasonCode,
        detail: String,
        attempts: u32,
    ) -> Result<ArticleOutcome> {
        warn!(article_id = %article.id, reason = %reason, attempts, "Extraction failed, storing placeholder");

        let placeholder = failed_event(article, &format!("{reason}: {detail}"));
        let mut conflicts = Vec::new();
        let event = match self.upsert(&placeholder).await? {
            Ok(()) => placeholder,
            Err(note) => {
                conflicts.push(note);
                // An earlier run stored a placeholder with a different detail
                self.store.get(&placeholder.event_id).await?.unwrap_or(placeholder)
            }
        };

        Ok(ArticleOutcome {
            article_id: article.id.clone(),
            disposition: Disposition::Failed { reason },
            events: vec![event],
            attempts,
            cached: false,
            conflicts,
            detail: Some(detail),
        })
    }

    /// Upsert one event. Conflicts are item-level and come back as a note;
    /// any other store error is fatal.
    async fn upsert(&self, event: &Event) -> Result<std::result::Result<(), ConflictNote>> {
        match self.store.upsert(event).await {
            Ok(_) => Ok(Ok(())),
            Err(EngineError::Conflict(conflict)) => {
                warn!(
                    event_id = %conflict.event_id,
                    article_id = %event.source_article_id,
                    "Event id conflict, keeping stored version"
                );
                Ok(Err(ConflictNote {
                    event_id: conflict.event_id,
                    existing_hash: conflict.existing_hash,
                    incoming_hash: conflict.incoming_hash,
                }))
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::MemoryStore;
    use crate::traits::store::EventStore;
    use crate::testing::{sample_article, MockGenerator};
    use crate::types::event::{EventType, ExtractionStatus};
    use std::time::Duration;

    const STRIKE: &str = r#"{"events": [{"event_type": "labour_strike", "country": "Indonesia",
        "admin1": "Jakarta", "start_date": "2024-03-01", "actors": ["dock workers"],
        "description": "Dock workers strike at Tanjung Priok", "confidence": 0.9}]}"#;

    fn fast_config() -> ExtractionConfig {
        ExtractionConfig::default()
            .with_retry_backoff(Duration::from_millis(1))
            .with_requests_per_second(1000)
    }

    fn engine(generator: MockGenerator) -> ExtractionEngine<MemoryStore, MockGenerator> {
        ExtractionEngine::with_config(MemoryStore::new(), generator, fast_config()).unwrap()
    }

    #[tokio::test]
    async fn test_extract_stores_events() {
        let engine = engine(MockGenerator::new().with_response("art-1", STRIKE));
        let outcome = engine.extract(&sample_article("art-1")).await.unwrap();

        assert_eq!(outcome.disposition, Disposition::Extracted { events: 1 });
        assert_eq!(outcome.events[0].event_type, EventType::LabourStrike);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(engine.store().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_schema_violation_retries_with_correction() {
        let generator = MockGenerator::new()
            .with_response("art-1", "not json at all")
            .with_response("art-1", STRIKE);
        let engine = engine(generator.clone());

        let outcome = engine.extract(&sample_article("art-1")).await.unwrap();
        assert_eq!(outcome.attempts, 2);

        let prompts = generator.prompts();
        assert_eq!(prompts.len(), 2);
        assert!(!prompts[0].user.contains("rejected"));
        assert!(prompts[1].user.contains("rejected"));
    }

    #[tokio::test]
    async fn test_exhausted_retries_store_failed_placeholder() {
        let generator = MockGenerator::new().with_default_response("{\"oops\": true}");
        let engine = engine(generator.clone());

        let outcome = engine.extract(&sample_article("art-1")).await.unwrap();
        assert_eq!(
            outcome.disposition,
            Disposition::Failed {
                reason: ReasonCode::SchemaInvalid
            }
        );
        assert_eq!(outcome.events.len(), 1);
        assert_eq!(outcome.events[0].extraction_status, ExtractionStatus::Failed);
        assert_eq!(generator.call_count(), 3);
    }

    #[tokio::test]
    async fn test_timeouts_are_retried_then_fail() {
        let generator = MockGenerator::new()
            .with_default_response(STRIKE)
            .with_delay(Duration::from_millis(200));
        let config = fast_config()
            .with_call_timeout(Duration::from_millis(20))
            .with_max_attempts(2);
        let engine = ExtractionEngine::with_config(MemoryStore::new(), generator.clone(), config).unwrap();

        let outcome = engine.extract(&sample_article("art-1")).await.unwrap();
        assert_eq!(outcome.disposition.reason(), Some(ReasonCode::Timeout));
        assert_eq!(outcome.attempts, 2);
    }

    #[tokio::test]
    async fn test_transient_error_then_success() {
        let generator = MockGenerator::new()
            .with_error("art-1", EngineError::TransientUpstream("429".into()))
            .with_response("art-1", STRIKE);
        let engine = engine(generator);

        let outcome = engine.extract(&sample_article("art-1")).await.unwrap();
        assert_eq!(outcome.disposition, Disposition::Extracted { events: 1 });
        assert_eq!(outcome.attempts, 2);
    }

    #[tokio::test]
    async fn test_empty_and_foreign_articles_are_omitted() {
        let generator = MockGenerator::new().with_default_response(STRIKE);
        let engine = engine(generator.clone());

        let empty = Article::new("e", "   ", sample_article("x").published_at, "https://x");
        let outcome = engine.extract(&empty).await.unwrap();
        assert_eq!(outcome.disposition.reason(), Some(ReasonCode::EmptyText));

        let spanish = Article::new(
            "s",
            "Los trabajadores del puerto iniciaron una huelga por los salarios según el sindicato y la carga se detuvo.",
            sample_article("x").published_at,
            "https://x",
        );
        let outcome = engine.extract(&spanish).await.unwrap();
        assert_eq!(outcome.disposition.reason(), Some(ReasonCode::UnsupportedLanguage));
        assert_eq!(generator.call_count(), 0);
    }

    #[tokio::test]
    async fn test_cached_response_replayed() {
        let generator = MockGenerator::new().with_response("art-1", STRIKE);
        let engine = engine(generator.clone());
        let article = sample_article("art-1");

        let first = engine.extract(&article).await.unwrap();
        let second = engine.extract(&article).await.unwrap();

        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(first.events, second.events);
        assert_eq!(generator.call_count(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_batch_reports_every_article() {
        let engine = engine(MockGenerator::new().with_default_response(STRIKE));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let articles = vec![sample_article("a"), sample_article("b")];
        let report = engine.extract_batch(articles, &cancel).await.unwrap();

        assert!(report.reconciles());
        assert_eq!(report.counts_by_reason().get(&ReasonCode::Cancelled), Some(&2));
    }
}
