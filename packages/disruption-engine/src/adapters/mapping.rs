//! Foreign-to-canonical event type tables.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::event::EventType;

/// Explicit mapping from a dataset's own type labels to [`EventType`].
///
/// Labels are matched case-insensitively after whitespace is collapsed.
/// Anything not in the table maps to [`EventType::Unknown`]; the caller
/// counts it as a mapping gap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingTable {
    dataset: String,
    entries: BTreeMap<String, EventType>,
}

fn label_key(label: &str) -> String {
    label
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

impl MappingTable {
    pub fn new(dataset: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            entries: BTreeMap::new(),
        }
    }

    /// Add or replace a mapping.
    pub fn with(mut self, foreign: &str, canonical: EventType) -> Self {
        self.insert(foreign, canonical);
        self
    }

    pub fn insert(&mut self, foreign: &str, canonical: EventType) {
        self.entries.insert(label_key(foreign), canonical);
    }

    /// Canonical type for a foreign label, `Unknown` when unmapped.
    pub fn lookup(&self, foreign: &str) -> EventType {
        self.entries
            .get(&label_key(foreign))
            .copied()
            .unwrap_or(EventType::Unknown)
    }

    pub fn is_mapped(&self, foreign: &str) -> bool {
        !self.lookup(foreign).is_unknown()
    }

    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    /// Every mapping, sorted by foreign label.
    pub fn entries(&self) -> impl Iterator<Item = (&str, EventType)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
