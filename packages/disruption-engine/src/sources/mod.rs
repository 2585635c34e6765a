//! Article sources.
//!
//! Acquisition and relevance filtering live upstream; these read the
//! already-filtered output.

pub mod jsonl;

pub use jsonl::{parse_articles, JsonlArticleSource};
