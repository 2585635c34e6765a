//! Supply-Chain Disruption Extraction & Validation Engine
//!
//! Turns news articles into structured disruption events with a generative
//! model, then cross-checks those events against independent incident
//! datasets by fuzzy record linkage.
//!
//! # Design Philosophy
//!
//! - The model is untrusted: every output is repaired, validated and
//!   retried with a correction before anything is stored
//! - Every article and every event ends in an explicit, reason-coded state
//! - Matching is scored and tiered, never an exact join
//! - Library handles mechanics, callers supply configuration
//!
//! # Usage
//!
//! ```rust,ignore
//! use disruption_engine::{ExtractionEngine, MemoryStore, ValidationEngine, ValidationConfig};
//! use disruption_engine::adapters::{AcledAdapter, JsonFileFeed};
//! use disruption_engine::testing::MockGenerator;
//! use tokio_util::sync::CancellationToken;
//!
//! let engine = ExtractionEngine::new(MemoryStore::new(), MockGenerator::new())?;
//! let report = engine.extract_batch(articles, &CancellationToken::new()).await?;
//! assert!(report.reconciles());
//!
//! let validator = ValidationEngine::new(ValidationConfig::default())?
//!     .with_adapter(AcledAdapter::new(JsonFileFeed::new("acled.json")));
//! let events: Vec<_> = report.events().cloned().collect();
//! let run = validator.validate_all(&events).await?;
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Core trait abstractions (Generator, EventStore, DatasetAdapter)
//! - [`types`] - Articles, events, external records, reports and config
//! - [`pipeline`] - Extraction, deduplication and consolidation
//! - [`validation`] - Blocking, scoring and tiering
//! - [`adapters`] - External dataset adapters and record feeds
//! - [`stores`] - Storage implementations (MemoryStore, SqliteStore)
//! - [`sources`] - Article input
//! - [`output`] - JSONL and CSV writers
//! - [`security`] - Credential handling
//! - [`testing`] - Mock implementations for testing

pub mod adapters;
pub mod error;
pub mod geo;
pub mod output;
pub mod pipeline;
pub mod security;
pub mod sources;
pub mod stores;
pub mod testing;
pub mod traits;
pub mod types;
pub mod validation;

#[cfg(feature = "openai")]
pub mod ai;

// Re-export core types at crate root
pub use error::{ConflictError, EngineError, NormalizeError, Result, SchemaViolation};
pub use traits::{
    adapter::DatasetAdapter,
    generator::{Generator, Prompt},
    source::ArticleSource,
    store::{CachedResponse, EventStore, EventStream, ResponseCache, Store},
};
pub use types::{
    article::Article,
    config::{ExtractionConfig, RegionAdjacency, ScoringWeights, Thresholds, ValidationConfig},
    event::{derive_event_id, Event, EventCategory, EventType, ExtractionStatus, Location},
    external::{DatePrecision, DateRange, ExternalRecord, RawRecord},
    report::{ArticleOutcome, ConflictNote, Disposition, ExtractionReport, ReasonCode},
    validation::{
        Coverage, CoverageMatch, DatasetReport, DatasetStatus, MatchRef, MatchTier, SkippedRecord, ValidationMatch,
        ValidationRun,
    },
};

// Re-export engines
pub use pipeline::{consolidate, ConsolidatedEvent, ExtractionEngine};
pub use validation::{attach_matches, match_events, ValidationEngine};

// Re-export stores
pub use stores::MemoryStore;

#[cfg(feature = "sqlite")]
pub use stores::SqliteStore;

// Re-export sources
pub use sources::JsonlArticleSource;

// Re-export testing utilities
pub use testing::{MockGenerator, UnavailableFeed, VecArticleSource};
