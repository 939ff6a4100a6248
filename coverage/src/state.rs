//! Saved colors and visibility of outlines.

use std::collections::BTreeMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::color::Color;
use crate::error::CoverageError;
use crate::feature_store::{FeatureQuery, FeatureStore};

/// State of one outline.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OutlineStateEntry {
    /// Name of the outline.
    pub name: String,
    /// Color of the outline stroke.
    pub color: Color,
    /// Whether the outline is displayed.
    pub visible: bool,
}

/// State of all outlines of a feature set.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct OutlineState {
    entries: Vec<OutlineStateEntry>,
}

impl OutlineState {
    /// Creates the state from a list of entries.
    pub fn new(entries: impl IntoIterator<Item = OutlineStateEntry>) -> Self {
        let mut entries: Vec<_> = entries.into_iter().collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries.dedup_by(|next, prev| next.name == prev.name);

        Self { entries }
    }

    /// Captures color and visibility of every outline stroke in the feature set.
    ///
    /// An outline drawn by several strokes is visible if any of them is visible. Its color is the color of the first
    /// stroke.
    pub fn capture(store: &FeatureStore, feature_set: &str) -> Self {
        let mut entries: BTreeMap<String, OutlineStateEntry> = BTreeMap::new();
        for feature in store.query_features(&FeatureQuery::feature_set(feature_set).strokes_only()) {
            entries
                .entry(feature.name.clone())
                .and_modify(|entry| entry.visible |= feature.visible)
                .or_insert(OutlineStateEntry {
                    name: feature.name,
                    color: feature.style.color(),
                    visible: feature.visible,
                });
        }

        Self {
            entries: entries.into_values().collect(),
        }
    }

    /// Saved entries.
    pub fn entries(&self) -> &[OutlineStateEntry] {
        &self.entries
    }

    /// Entry of the outline with the given name.
    pub fn get(&self, name: &str) -> Option<&OutlineStateEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    /// Returns true if there are no saved entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Applies the saved colors and visibility to the features of the feature set, labels included.
    ///
    /// With `adopt_existing_visibility` a feature that is currently displayed stays displayed even if the saved state
    /// hides it. Names missing from the store are ignored. Features removed while the state is being applied are
    /// logged and skipped. Returns the number of updated features.
    pub fn apply(&self, store: &FeatureStore, feature_set: &str, adopt_existing_visibility: bool) -> usize {
        let mut updated = 0;
        for entry in &self.entries {
            let features =
                store.query_features(&FeatureQuery::feature_set(feature_set).with_names([entry.name.as_str()]));

            for feature in features {
                let visible = entry.visible || (adopt_existing_visibility && feature.visible);
                let result = store
                    .update_style(feature.id, feature.style.with_color(entry.color))
                    .and_then(|_| store.set_feature_visible(feature.id, visible));

                match result {
                    Ok(()) => updated += 1,
                    Err(err @ CoverageError::StaleFeature(_)) => {
                        log::error!("Failed to restore outline '{}': {err}", entry.name)
                    }
                    Err(err) => log::warn!("Failed to restore outline '{}': {err}", entry.name),
                }
            }
        }

        updated
    }
}
