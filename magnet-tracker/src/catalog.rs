//! Reference catalog
//!
//! Maps reference pattern names to the descriptive text shown next to a
//! tracked magnet. Seeded at construction, upserted at runtime. Lookups never
//! fail: unknown names get a synthesized placeholder.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Descriptive metadata for one reference pattern
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceInfo {
    pub title: String,
    pub details: String,
}

impl ReferenceInfo {
    pub fn new(title: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            details: details.into(),
        }
    }

    /// Placeholder used when an anchor names a pattern the catalog lacks
    pub fn placeholder(name: &str) -> Self {
        Self {
            title: format!("Magnet {}", name),
            details: "Add details with set_reference_info(name, info).".to_string(),
        }
    }
}

/// Pattern name → display info
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferenceCatalog {
    entries: HashMap<String, ReferenceInfo>,
}

impl ReferenceCatalog {
    /// Empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in fridge magnet set
    pub fn with_defaults() -> Self {
        Self::from_entries([
            (
                "espresso",
                ReferenceInfo::new("Espresso Shot", "Dial in a double in 25 seconds."),
            ),
            (
                "matcha",
                ReferenceInfo::new("Matcha Mood", "Whisk to 70°C and savor slowly."),
            ),
            (
                "market",
                ReferenceInfo::new("Farmer's Harvest", "Restock fresh greens every Sunday."),
            ),
            (
                "mistery",
                ReferenceInfo::new("The Green Spurt", "Restock fresh greens every future."),
            ),
        ])
    }

    pub fn from_entries<I, N>(entries: I) -> Self
    where
        I: IntoIterator<Item = (N, ReferenceInfo)>,
        N: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(name, info)| (name.into(), info))
                .collect(),
        }
    }

    /// Insert or replace an entry, returning the previous info if any
    pub fn upsert(&mut self, name: impl Into<String>, info: ReferenceInfo) -> Option<ReferenceInfo> {
        self.entries.insert(name.into(), info)
    }

    pub fn get(&self, name: &str) -> Option<&ReferenceInfo> {
        self.entries.get(name)
    }

    /// Info for `name`, or a placeholder for unknown names
    pub fn info(&self, name: &str) -> ReferenceInfo {
        self.entries
            .get(name)
            .cloned()
            .unwrap_or_else(|| ReferenceInfo::placeholder(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Configured names in sorted order
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }
}
