//! Extraction pipeline - article text to stored events.
//!
//! The pipeline orchestrates:
//! - Language and emptiness screening
//! - Schema-constrained generation with retry and correction
//! - Repair and validation of untrusted model output
//! - Within-article deduplication
//! - Idempotent storage
//! - Cross-article consolidation (read-only view)

pub mod consolidate;
pub mod dedup;
pub mod engine;
pub mod extract;
pub mod language;
pub mod prompts;

pub use consolidate::{consolidate, ConsolidatedEvent};
pub use dedup::dedup_events;
pub use engine::ExtractionEngine;
pub use extract::{
    failed_event, parse_model_output, repair_json, to_event, ExtractedEventItem,
    ExtractionResponse, ValidItem,
};
pub use language::{detect_language, is_language};
pub use prompts::{
    build_prompt, extract_prompt_hash, format_corrective_prompt, format_extract_prompt,
    CORRECTIVE_PROMPT, EXTRACT_PROMPT, RESPONSE_SCHEMA, SYSTEM_PROMPT,
};
