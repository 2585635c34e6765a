//! Record-linkage validation of extracted events.
//!
//! - Blocking by canonical type and country, then date and area
//! - Weighted time/geo/type/text scoring
//! - Tiering against per-dataset thresholds
//! - Inverse coverage pass over the foreign records

pub mod blocking;
pub mod engine;
pub mod scoring;

pub use blocking::{area_relation, date_gap_days, AreaRelation, BlockingIndex};
pub use engine::{attach_matches, match_events, ValidationEngine};
pub use scoring::{score_pair, tier_for, tokenize, PairScore};
