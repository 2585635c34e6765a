//! Testing utilities including mock implementations.
//!
//! These are useful for testing applications that use the engine without
//! calling a real model or reaching external datasets.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::adapters::feed::RecordFeed;
use crate::error::{EngineError, Result};
use crate::traits::{
    generator::{Generator, Prompt},
    source::ArticleSource,
};
use crate::types::{
    article::Article,
    external::{DateRange, RawRecord},
};

pub use crate::adapters::feed::StaticFeed;

/// What the mock returns when nothing is scripted.
const NO_EVENTS: &str = r#"{"events": []}"#;

/// A mock generator for testing.
///
/// Replies are scripted per article and consumed in order; once an
/// article's script runs out the default response is returned. Clones share
/// scripts and call history, so a test can keep a handle after moving the
/// generator into an engine.
#[derive(Clone, Default)]
pub struct MockGenerator {
    /// Scripted replies by article id
    scripts: Arc<RwLock<HashMap<String, VecDeque<Result<String>>>>>,

    /// Reply once scripts are exhausted
    default_response: Option<String>,

    /// Delay before every reply
    delay: Option<Duration>,

    /// Call tracking for assertions
    prompts: Arc<RwLock<Vec<Prompt>>>,

    /// Calls currently running, and the most ever running at once
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

/// Decrements the in-flight count when a call ends, including when the
/// caller drops it on timeout.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockGenerator {
    /// Create a mock that answers `{"events": []}` to everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a raw reply for an article.
    pub fn with_response(self, article_id: impl Into<String>, raw: impl Into<String>) -> Self {
        self.push(article_id.into(), Ok(raw.into()));
        self
    }

    /// Queue an error for an article.
    pub fn with_error(self, article_id: impl Into<String>, error: EngineError) -> Self {
        self.push(article_id.into(), Err(error));
        self
    }

    /// Reply used when an article has no scripted replies left.
    pub fn with_default_response(mut self, raw: impl Into<String>) -> Self {
        self.default_response = Some(raw.into());
        self
    }

    /// Sleep before every reply, to exercise call timeouts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every prompt received, in call order.
    pub fn prompts(&self) -> Vec<Prompt> {
        self.prompts.read().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.read().unwrap().len()
    }

    /// Most calls that were ever running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Calls made for one article.
    pub fn calls_for(&self, article_id: &str) -> usize {
        self.prompts
            .read()
            .unwrap()
            .iter()
            .filter(|p| p.article_id == article_id)
            .count()
    }

    fn push(&self, article_id: String, reply: Result<String>) {
        self.scripts
            .write()
            .unwrap()
            .entry(article_id)
            .or_default()
            .push_back(reply);
    }
}

#[async_trait]
impl Generator for MockGenerator {
    async fn generate(&self, prompt: &Prompt) -> Result<String> {
        self.prompts.write().unwrap().push(prompt.clone());

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.in_flight);
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self
            .scripts
            .write()
            .unwrap()
            .get_mut(&prompt.article_id)
            .and_then(VecDeque::pop_front);

        match scripted {
            Some(reply) => reply,
            None => Ok(self
                .default_response
                .clone()
                .unwrap_or_else(|| NO_EVENTS.to_string())),
        }
    }

    fn model(&self) -> &str {
        "mock"
    }
}

/// A feed whose dataset is always unreachable.
pub struct UnavailableFeed {
    detail: String,
}

impl UnavailableFeed {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

#[async_trait]
impl RecordFeed for UnavailableFeed {
    async fn load(&self, _range: &DateRange) -> Result<Vec<RawRecord>> {
        Err(EngineError::source_unavailable(self.describe(), self.detail.clone()))
    }

    fn describe(&self) -> String {
        "unavailable".to_string()
    }
}

/// Articles held in memory.
#[derive(Debug, Clone, Default)]
pub struct VecArticleSource {
    articles: Vec<Article>,
}

impl VecArticleSource {
    pub fn new(articles: Vec<Article>) -> Self {
        Self { articles }
    }
}

#[async_trait]
impl ArticleSource for VecArticleSource {
    async fn articles(&self) -> Result<Vec<Article>> {
        Ok(self.articles.clone())
    }
}

/// An English article about a port strike, published 2024-03-02.
pub fn sample_article(id: &str) -> Article {
    Article::new(
        id,
        "Dock workers at Tanjung Priok in Jakarta went on strike on Friday over pay, \
         and the port authority said that container handling had stopped for the day.",
        NaiveDate::from_ymd_opt(2024, 3, 2).unwrap_or_default(),
        format!("https://news.example.com/{id}"),
    )
    .with_title("Jakarta dock workers strike")
    .with_country_hint("Indonesia")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt(article_id: &str) -> Prompt {
        Prompt {
            system: String::new(),
            user: String::new(),
            schema: serde_json::Value::Null,
            article_id: article_id.to_string(),
            attempt: 1,
        }
    }

    #[tokio::test]
    async fn test_scripted_replies_then_default() {
        let generator = MockGenerator::new()
            .with_response("a", "first")
            .with_error("a", EngineError::TransientUpstream("busy".into()))
            .with_default_response("fallback");

        assert_eq!(generator.generate(&prompt("a")).await.unwrap(), "first");
        assert!(generator.generate(&prompt("a")).await.is_err());
        assert_eq!(generator.generate(&prompt("a")).await.unwrap(), "fallback");
        assert_eq!(generator.generate(&prompt("b")).await.unwrap(), "fallback");
        assert_eq!(generator.calls_for("a"), 3);
    }

    #[tokio::test]
    async fn test_clones_share_history() {
        let generator = MockGenerator::new();
        let handle = generator.clone();
        generator.generate(&prompt("a")).await.unwrap();
        assert_eq!(handle.call_count(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_feed() {
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        );
        let err = UnavailableFeed::new("HTTP 503").load(&range).await.unwrap_err();
        assert!(matches!(err, EngineError::SourceUnavailable { .. }));
    }
}
