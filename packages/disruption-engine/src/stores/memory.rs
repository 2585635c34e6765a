//! In-memory storage implementation for tests and single-run pipelines.

use async_stream::stream;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};

use crate::error::{ConflictError, EngineError, Result};
use crate::traits::store::{CachedResponse, EventStore, EventStream, ResponseCache};
use crate::types::{event::Event, validation::MatchRef};

/// In-memory storage for events and cached responses.
///
/// A single write lock serializes upserts, so the check-then-insert in
/// [`EventStore::upsert`] is atomic. Data is lost on restart.
pub struct MemoryStore {
    events: RwLock<BTreeMap<String, Event>>,
    responses: RwLock<HashMap<String, CachedResponse>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: PoisonError<T>) -> EngineError {
    EngineError::Storage("memory store lock poisoned".into())
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self {
            events: RwLock::new(BTreeMap::new()),
            responses: RwLock::new(HashMap::new()),
        }
    }

    /// Get the number of cached responses.
    pub fn response_count(&self) -> usize {
        self.responses.read().map(|r| r.len()).unwrap_or(0)
    }

    fn read_event(&self, event_id: &str) -> Result<Option<Event>> {
        Ok(self.events.read().map_err(poisoned)?.get(event_id).cloned())
    }

    fn event_ids(&self) -> Result<Vec<String>> {
        Ok(self.events.read().map_err(poisoned)?.keys().cloned().collect())
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn upsert(&self, event: &Event) -> Result<String> {
        let mut events = self.events.write().map_err(poisoned)?;

        if let Some(existing) = events.get(&event.event_id) {
            let existing_hash = existing.content_hash();
            let incoming_hash = event.content_hash();
            if existing_hash != incoming_hash {
                return Err(ConflictError {
                    event_id: event.event_id.clone(),
                    existing_hash,
                    incoming_hash,
                }
                .into());
            }
            return Ok(event.event_id.clone());
        }

        let mut stored = event.clone();
        stored.matches.clear();
        events.insert(stored.event_id.clone(), stored);
        Ok(event.event_id.clone())
    }

    async fn get(&self, event_id: &str) -> Result<Option<Event>> {
        self.read_event(event_id)
    }

    fn all(&self) -> EventStream<'_> {
        Box::pin(stream! {
            let ids = match self.event_ids() {
                Ok(ids) => ids,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            for id in ids {
                match self.read_event(&id) {
                    Ok(Some(event)) => yield Ok(event),
                    Ok(None) => continue,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }
        })
    }

    async fn attach_match(&self, event_id: &str, match_ref: MatchRef) -> Result<bool> {
        let mut events = self.events.write().map_err(poisoned)?;
        let Some(event) = events.get_mut(event_id) else {
            return Ok(false);
        };

        event
            .matches
            .retain(|m| m.dataset_name != match_ref.dataset_name);
        event.matches.push(match_ref);
        event
            .matches
            .sort_by(|a, b| a.dataset_name.cmp(&b.dataset_name));
        Ok(true)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.events.read().map_err(poisoned)?.len())
    }
}

#[async_trait]
impl ResponseCache for MemoryStore {
    async fn get_response(
        &self,
        article_id: &str,
        content_hash: &str,
        prompt_hash: &str,
    ) -> Result<Option<CachedResponse>> {
        Ok(self
            .responses
            .read()
            .map_err(poisoned)?
            .get(article_id)
            .filter(|r| r.content_hash == content_hash && r.prompt_hash == prompt_hash)
            .cloned())
    }

    async fn store_response(&self, response: &CachedResponse) -> Result<()> {
        self.responses
            .write()
            .map_err(poisoned)?
            .insert(response.article_id.clone(), response.clone());
        Ok(())
    }

    async fn invalidate_stale_responses(&self, current_prompt_hash: &str) -> Result<usize> {
        let mut responses = self.responses.write().map_err(poisoned)?;
        let before = responses.len();
        responses.retain(|_, r| r.prompt_hash == current_prompt_hash);
        Ok(before - responses.len())
    }
}
