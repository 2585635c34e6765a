//! Storage traits for events and cached model responses.
//!
//! The storage layer is split into focused traits:
//! - `EventStore`: Append-only event records keyed by derived id
//! - `ResponseCache`: Raw generator output keyed by article content and prompt
//! - `Store`: Composite trait combining both

use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{Stream, TryStreamExt};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{event::Event, validation::MatchRef};

/// Lazy, finite scan over stored events.
pub type EventStream<'a> = Pin<Box<dyn Stream<Item = Result<Event>> + Send + 'a>>;

/// Append-only collection of accepted events.
///
/// Upserts are serialized by the implementation. Re-inserting identical
/// content is a no-op; different content under an existing id fails with
/// [`crate::EngineError::Conflict`] and leaves the stored row untouched.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Insert an event, returning its id.
    async fn upsert(&self, event: &Event) -> Result<String>;

    /// Get an event by id.
    async fn get(&self, event_id: &str) -> Result<Option<Event>>;

    /// Scan every event in id order.
    ///
    /// Each call starts a fresh scan.
    fn all(&self) -> EventStream<'_>;

    /// Record a validation back reference, replacing any earlier one for the
    /// same dataset. Returns false if the event does not exist.
    async fn attach_match(&self, event_id: &str, match_ref: MatchRef) -> Result<bool>;

    /// Number of stored events.
    async fn count(&self) -> Result<usize>;

    /// Collect a full scan into memory.
    async fn collect_all(&self) -> Result<Vec<Event>> {
        self.all().try_collect().await
    }
}

/// Raw generator output that parsed successfully.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub article_id: String,

    /// Hash of the article content the output was generated from
    pub content_hash: String,

    /// Hash of the prompt templates in force
    pub prompt_hash: String,

    pub raw: String,
    pub model: String,
    pub created_at: DateTime<Utc>,
}

impl CachedResponse {
    pub fn new(
        article_id: impl Into<String>,
        content_hash: impl Into<String>,
        prompt_hash: impl Into<String>,
        raw: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            article_id: article_id.into(),
            content_hash: content_hash.into(),
            prompt_hash: prompt_hash.into(),
            raw: raw.into(),
            model: model.into(),
            created_at: Utc::now(),
        }
    }
}

/// Cache of generator output, so re-extracting an unchanged article replays
/// the same output instead of sampling the model again.
#[async_trait]
pub trait ResponseCache: Send + Sync {
    /// Get a cached response.
    ///
    /// Returns None if:
    /// - Nothing was cached for the article
    /// - The article content or prompt changed since it was cached
    async fn get_response(
        &self,
        article_id: &str,
        content_hash: &str,
        prompt_hash: &str,
    ) -> Result<Option<CachedResponse>>;

    /// Store a response, replacing any earlier one for the article.
    async fn store_response(&self, response: &CachedResponse) -> Result<()>;

    /// Drop responses produced under an old prompt.
    ///
    /// Returns the number of responses invalidated.
    async fn invalidate_stale_responses(&self, current_prompt_hash: &str) -> Result<usize>;
}

/// Composite storage trait used by the extraction engine.
pub trait Store: EventStore + ResponseCache {}

// Blanket implementation: anything implementing both traits is a Store
impl<T: EventStore + ResponseCache> Store for T {}
