//! SQLite storage implementation.
//!
//! A file-based storage backend using SQLite. Good for:
//! - Repeated runs over the same article corpus
//! - Keeping cached model responses between runs
//! - Testing with persistent data

use async_stream::stream;
use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;

use crate::error::{ConflictError, EngineError, Result};
use crate::traits::store::{CachedResponse, EventStore, EventStream, ResponseCache};
use crate::types::{event::Event, validation::MatchRef};

/// Events fetched per page during a scan.
const SCAN_PAGE_SIZE: i64 = 256;

fn storage_err(e: impl std::fmt::Display) -> EngineError {
    EngineError::Storage(e.to_string().into())
}

/// SQLite-based event store and response cache.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create a new SQLite store with the given connection URL.
    ///
    /// # Example URLs
    /// - `sqlite::memory:` - In-memory database (ephemeral)
    /// - `sqlite:./events.db` - File-based database
    /// - `sqlite:./events.db?mode=rwc` - Create if not exists
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(storage_err)?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Create an in-memory SQLite store (for testing).
    ///
    /// Limited to one connection so every query sees the same database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(storage_err)?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                event_id TEXT PRIMARY KEY,
                source_article_id TEXT NOT NULL,
                start_date TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                body TEXT NOT NULL,
                matches TEXT NOT NULL DEFAULT '[]'
            );

            CREATE INDEX IF NOT EXISTS idx_events_article ON events(source_article_id);
            CREATE INDEX IF NOT EXISTS idx_events_start_date ON events(start_date);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS responses (
                article_id TEXT PRIMARY KEY,
                content_hash TEXT NOT NULL,
                prompt_hash TEXT NOT NULL,
                raw TEXT NOT NULL,
                model TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_responses_prompt_hash ON responses(prompt_hash);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn page_after(&self, after: &str) -> Result<Vec<EventRow>> {
        sqlx::query_as::<_, EventRow>(
            "SELECT event_id, body, matches FROM events WHERE event_id > ? ORDER BY event_id LIMIT ?",
        )
        .bind(after)
        .bind(SCAN_PAGE_SIZE)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)
    }
}

// Row types for sqlx queries
#[derive(Debug, FromRow)]
struct EventRow {
    event_id: String,
    body: String,
    matches: String,
}

impl EventRow {
    fn into_event(self) -> Result<Event> {
        let mut event: Event = serde_json::from_str(&self.body)
            .map_err(|e| storage_err(format!("Invalid event JSON for {}: {}", self.event_id, e)))?;
        event.matches = serde_json::from_str(&self.matches)
            .map_err(|e| storage_err(format!("Invalid matches JSON for {}: {}", self.event_id, e)))?;
        Ok(event)
    }
}

#[derive(Debug, FromRow)]
struct ResponseRow {
    article_id: String,
    content_hash: String,
    prompt_hash: String,
    raw: String,
    model: String,
    created_at: String,
}

impl ResponseRow {
    fn into_response(self) -> Result<CachedResponse> {
        let created_at = chrono::DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|e| storage_err(format!("Invalid date: {}", e)))?
            .with_timezone(&chrono::Utc);

        Ok(CachedResponse {
            article_id: self.article_id,
            content_hash: self.content_hash,
            prompt_hash: self.prompt_hash,
            raw: self.raw,
            model: self.model,
            created_at,
        })
    }
}

#[async_trait]
impl EventStore for SqliteStore {
    async fn upsert(&self, event: &Event) -> Result<String> {
        let incoming_hash = event.content_hash();
        let mut stored = event.clone();
        stored.matches.clear();
        let body = serde_json::to_string(&stored)?;

        // Insert-or-ignore is a single statement, so concurrent upserts of
        // the same id cannot both insert.
        let inserted = sqlx::query(
            r#"
            INSERT INTO events (event_id, source_article_id, start_date, content_hash, body)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(event_id) DO NOTHING
            "#,
        )
        .bind(&event.event_id)
        .bind(&event.source_article_id)
        .bind(event.start_date.to_string())
        .bind(&incoming_hash)
        .bind(&body)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?
        .rows_affected();

        if inserted == 0 {
            let (existing_hash,): (String,) =
                sqlx::query_as("SELECT content_hash FROM events WHERE event_id = ?")
                    .bind(&event.event_id)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(storage_err)?;

            if existing_hash != incoming_hash {
                return Err(ConflictError {
                    event_id: event.event_id.clone(),
                    existing_hash,
                    incoming_hash,
                }
                .into());
            }
        }

        Ok(event.event_id.clone())
    }

    async fn get(&self, event_id: &str) -> Result<Option<Event>> {
        let row = sqlx::query_as::<_, EventRow>("SELECT event_id, body, matches FROM events WHERE event_id = ?")
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;

        row.map(EventRow::into_event).transpose()
    }

    fn all(&self) -> EventStream<'_> {
        Box::pin(stream! {
            let mut after = String::new();
            loop {
                let rows = match self.page_after(&after).await {
                    Ok(rows) => rows,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                };
                let last_page = (rows.len() as i64) < SCAN_PAGE_SIZE;

                for row in rows {
                    after = row.event_id.clone();
                    yield row.into_event();
                }

                if last_page {
                    return;
                }
            }
        })
    }

    async fn attach_match(&self, event_id: &str, match_ref: MatchRef) -> Result<bool> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;

        let current: Option<(String,)> = sqlx::query_as("SELECT matches FROM events WHERE event_id = ?")
            .bind(event_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(storage_err)?;
        let Some((current,)) = current else {
            return Ok(false);
        };

        let mut matches: Vec<MatchRef> = serde_json::from_str(&current)?;
        matches.retain(|m| m.dataset_name != match_ref.dataset_name);
        matches.push(match_ref);
        matches.sort_by(|a, b| a.dataset_name.cmp(&b.dataset_name));

        sqlx::query("UPDATE events SET matches = ? WHERE event_id = ?")
            .bind(serde_json::to_string(&matches)?)
            .bind(event_id)
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;

        tx.commit().await.map_err(storage_err)?;
        Ok(true)
    }

    async fn count(&self) -> Result<usize> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM events")
            .fetch_one(&self.pool)
            .await
            .map_err(storage_err)?;

        Ok(count.0 as usize)
    }
}

#[async_trait]
impl ResponseCache for SqliteStore {
    async fn get_response(
        &self,
        article_id: &str,
        content_hash: &str,
        prompt_hash: &str,
    ) -> Result<Option<CachedResponse>> {
        let row = sqlx::query_as::<_, ResponseRow>(
            "SELECT article_id, content_hash, prompt_hash, raw, model, created_at FROM responses WHERE article_id = ? AND content_hash = ? AND prompt_hash = ?",
        )
        .bind(article_id)
        .bind(content_hash)
        .bind(prompt_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        row.map(ResponseRow::into_response).transpose()
    }

    async fn store_response(&self, response: &CachedResponse) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO responses (article_id, content_hash, prompt_hash, raw, model, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(article_id) DO UPDATE SET
                content_hash = excluded.content_hash,
                prompt_hash = excluded.prompt_hash,
                raw = excluded.raw,
                model = excluded.model,
                created_at = excluded.created_at
            "#,
        )
        .bind(&response.article_id)
        .bind(&response.content_hash)
        .bind(&response.prompt_hash)
        .bind(&response.raw)
        .bind(&response.model)
        .bind(response.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(())
    }

    async fn invalidate_stale_responses(&self, current_prompt_hash: &str) -> Result<usize> {
        let result = sqlx::query("DELETE FROM responses WHERE prompt_hash != ?")
            .bind(current_prompt_hash)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        Ok(result.rows_affected() as usize)
    }
}
