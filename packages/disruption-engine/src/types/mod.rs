//! Data types for the disruption engine.

pub mod article;
pub mod config;
pub mod event;
pub mod external;
pub mod report;
pub mod validation;
