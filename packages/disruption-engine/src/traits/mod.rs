//! Core trait abstractions for the disruption engine.
//!
//! These traits define the seams where applications plug in a generative
//! model, storage, external datasets and article supply.

pub mod adapter;
pub mod generator;
pub mod source;
pub mod store;
