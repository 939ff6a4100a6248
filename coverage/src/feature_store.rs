//! Thread safe storage of outline and label features.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use coverage_types::geo::GeoBounds;
use coverage_types::Geometry;
use parking_lot::{Mutex, RwLock, RwLockWriteGuard};

use crate::color::Color;
use crate::error::CoverageError;

/// Identifier of a feature in a [`FeatureStore`]. Ids are never reused by the same store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeatureId(u64);

impl FeatureId {
    /// Numeric value of the id.
    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Stroke of an outline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrokeStyle {
    /// Line color.
    pub color: Color,
    /// Line width in pixels.
    pub width: f32,
}

/// Text label placed at a point.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelStyle {
    /// Label text.
    pub text: String,
    /// Text color.
    pub color: Color,
    /// The label is only displayed at resolutions finer than this one, in meters per pixel.
    pub min_resolution: f64,
}

/// Style of a stored feature.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureStyle {
    /// Outline of the coverage.
    Stroke(StrokeStyle),
    /// Label of an outline.
    Label(LabelStyle),
}

impl FeatureStyle {
    /// Color of the feature.
    pub fn color(&self) -> Color {
        match self {
            FeatureStyle::Stroke(stroke) => stroke.color,
            FeatureStyle::Label(label) => label.color,
        }
    }

    /// Returns a copy of the style with the color replaced.
    pub fn with_color(&self, color: Color) -> Self {
        match self {
            FeatureStyle::Stroke(stroke) => FeatureStyle::Stroke(StrokeStyle { color, ..*stroke }),
            FeatureStyle::Label(label) => FeatureStyle::Label(LabelStyle {
                color,
                ..label.clone()
            }),
        }
    }

    /// Returns true for outline strokes.
    pub fn is_stroke(&self) -> bool {
        matches!(self, FeatureStyle::Stroke(_))
    }
}

/// Feature to be inserted into a [`FeatureStore`].
#[derive(Debug, Clone)]
pub struct NewFeature {
    /// Name of the feature. Outlines and labels of the same selection share the name.
    pub name: String,
    /// Geometry of the feature.
    pub geometry: Arc<Geometry>,
    /// Style of the feature.
    pub style: FeatureStyle,
    /// Whether the feature is displayed.
    pub visible: bool,
}

/// Copy of a stored feature.
#[derive(Debug, Clone)]
pub struct Feature {
    /// Id of the feature.
    pub id: FeatureId,
    /// Feature set the feature belongs to.
    pub feature_set: String,
    /// Name of the feature.
    pub name: String,
    /// Geometry of the feature.
    pub geometry: Arc<Geometry>,
    /// Style of the feature.
    pub style: FeatureStyle,
    /// Whether the feature is displayed.
    pub visible: bool,
}

/// Change of the store content, to be picked up by a renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureUpdate {
    /// A feature was inserted.
    Insert {
        /// Id of the feature.
        id: FeatureId,
    },
    /// Style or visibility of a feature changed.
    Update {
        /// Id of the feature.
        id: FeatureId,
    },
    /// A feature was deleted.
    Delete {
        /// Id of the feature.
        id: FeatureId,
    },
}

/// Filter for feature queries. Empty filter matches all features.
#[derive(Debug, Clone, Default)]
pub struct FeatureQuery {
    /// Only features of this feature set.
    pub feature_set: Option<String>,
    /// Only features with one of these names.
    pub names: Option<HashSet<String>>,
    /// Only visible features.
    pub visible_only: bool,
    /// Only outline strokes, no labels.
    pub strokes_only: bool,
    /// Only features whose geometry envelope overlaps the bounds.
    pub region: Option<GeoBounds>,
    /// Maximum number of returned features.
    pub limit: Option<usize>,
}

impl FeatureQuery {
    /// Query matching all features of the feature set.
    pub fn feature_set(feature_set: impl Into<String>) -> Self {
        Self {
            feature_set: Some(feature_set.into()),
            ..Default::default()
        }
    }

    /// Restricts the query to the given names.
    pub fn with_names(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.names = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Restricts the query to visible features.
    pub fn visible_only(mut self) -> Self {
        self.visible_only = true;
        self
    }

    /// Restricts the query to outline strokes.
    pub fn strokes_only(mut self) -> Self {
        self.strokes_only = true;
        self
    }

    /// Restricts the query to the region.
    pub fn with_region(mut self, region: GeoBounds) -> Self {
        self.region = Some(region);
        self
    }

    /// Limits the number of results.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn matches(&self, entry: &FeatureEntry) -> bool {
        if self
            .feature_set
            .as_ref()
            .is_some_and(|set| *set != entry.feature_set)
        {
            return false;
        }
        if self
            .names
            .as_ref()
            .is_some_and(|names| !names.contains(&entry.name))
        {
            return false;
        }
        if self.visible_only && !entry.visible {
            return false;
        }
        if self.strokes_only && !entry.style.is_stroke() {
            return false;
        }
        if let Some(region) = &self.region {
            let overlaps = entry
                .geometry
                .envelope()
                .is_some_and(|envelope| GeoBounds::from_envelope(&envelope).intersects(region));
            if !overlaps {
                return false;
            }
        }

        true
    }
}

struct FeatureEntry {
    feature_set: String,
    name: String,
    geometry: Arc<Geometry>,
    style: FeatureStyle,
    visible: bool,
}

impl FeatureEntry {
    fn to_feature(&self, id: FeatureId) -> Feature {
        Feature {
            id,
            feature_set: self.feature_set.clone(),
            name: self.name.clone(),
            geometry: self.geometry.clone(),
            style: self.style.clone(),
            visible: self.visible,
        }
    }
}

#[derive(Default)]
struct StoreContent {
    // Insertion order is kept by the ids, which only grow.
    features: BTreeMap<FeatureId, FeatureEntry>,
    next_id: u64,
}

impl StoreContent {
    fn name_visibility(&self, feature_set: &str) -> HashMap<String, bool> {
        let mut result: HashMap<String, bool> = HashMap::new();
        for entry in self.features.values() {
            if entry.feature_set == feature_set {
                *result.entry(entry.name.clone()).or_default() |= entry.visible;
            }
        }

        result
    }
}

/// Thread safe storage of outline and label features.
///
/// Every change of the content is recorded as a [`FeatureUpdate`] that a renderer can pick up with
/// [`FeatureStore::drain_updates`].
///
/// Groups of changes that must not be observed half-done are made through a [`BulkModification`], which holds the
/// exclusive lock of the store for its lifetime.
#[derive(Default)]
pub struct FeatureStore {
    content: RwLock<StoreContent>,
    pending_updates: Arc<Mutex<Vec<FeatureUpdate>>>,
}

impl FeatureStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a bulk modification. The store is locked until the returned guard is dropped.
    pub fn bulk(&self) -> BulkModification<'_> {
        BulkModification {
            content: self.content.write(),
            pending_updates: self.pending_updates.clone(),
            changes: vec![],
        }
    }

    /// Copies of all features matching the query, in insertion order.
    pub fn query_features(&self, query: &FeatureQuery) -> Vec<Feature> {
        let content = self.content.read();
        let matching = content
            .features
            .iter()
            .filter(|(_, entry)| query.matches(entry))
            .map(|(id, entry)| entry.to_feature(*id));

        match query.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        }
    }

    /// Number of features matching the query.
    pub fn query_features_count(&self, query: &FeatureQuery) -> usize {
        let count = self
            .content
            .read()
            .features
            .values()
            .filter(|entry| query.matches(entry))
            .count();

        query.limit.map_or(count, |limit| count.min(limit))
    }

    /// Copy of the feature with the given id.
    pub fn get(&self, id: FeatureId) -> Option<Feature> {
        self.content
            .read()
            .features
            .get(&id)
            .map(|entry| entry.to_feature(id))
    }

    /// Visibility of the feature. `None` if the feature does not exist.
    pub fn is_feature_visible(&self, id: FeatureId) -> Option<bool> {
        self.content.read().features.get(&id).map(|entry| entry.visible)
    }

    /// Visibility of every feature name of the feature set.
    ///
    /// A name is visible if any of the features with this name is visible.
    pub fn name_visibility(&self, feature_set: &str) -> HashMap<String, bool> {
        self.content.read().name_visibility(feature_set)
    }

    /// Color of the outline with the given name in the feature set.
    pub fn outline_color(&self, feature_set: &str, name: &str) -> Option<Color> {
        self.content
            .read()
            .features
            .values()
            .find(|entry| {
                entry.feature_set == feature_set && entry.name == name && entry.style.is_stroke()
            })
            .map(|entry| entry.style.color())
    }

    /// Sets visibility of all features matching the query. Returns the number of changed features.
    pub fn set_features_visible(&self, query: &FeatureQuery, visible: bool) -> usize {
        let mut bulk = self.bulk();
        let ids: Vec<_> = bulk
            .content
            .features
            .iter()
            .filter(|(_, entry)| query.matches(entry))
            .map(|(id, _)| *id)
            .collect();

        ids.into_iter()
            .filter(|id| bulk.set_feature_visible(*id, visible).unwrap_or(false))
            .count()
    }

    /// Sets visibility of the feature.
    pub fn set_feature_visible(&self, id: FeatureId, visible: bool) -> Result<(), CoverageError> {
        self.bulk().set_feature_visible(id, visible).map(|_| ())
    }

    /// Replaces the style of the feature.
    pub fn update_style(&self, id: FeatureId, style: FeatureStyle) -> Result<(), CoverageError> {
        self.bulk().update_style(id, style)
    }

    /// Takes all changes recorded since the previous call.
    pub fn drain_updates(&self) -> Vec<FeatureUpdate> {
        std::mem::take(&mut *self.pending_updates.lock())
    }
}

/// Exclusive access to a [`FeatureStore`].
///
/// Recorded updates are published when the guard is dropped.
pub struct BulkModification<'a> {
    content: RwLockWriteGuard<'a, StoreContent>,
    pending_updates: Arc<Mutex<Vec<FeatureUpdate>>>,
    changes: Vec<FeatureUpdate>,
}

impl BulkModification<'_> {
    /// Visibility of every feature name of the feature set, see [`FeatureStore::name_visibility`].
    pub fn name_visibility(&self, feature_set: &str) -> HashMap<String, bool> {
        self.content.name_visibility(feature_set)
    }

    /// Adds a feature to the feature set.
    pub fn insert(&mut self, feature_set: &str, feature: NewFeature) -> FeatureId {
        let id = FeatureId(self.content.next_id);
        self.content.next_id += 1;
        self.content.features.insert(
            id,
            FeatureEntry {
                feature_set: feature_set.to_string(),
                name: feature.name,
                geometry: feature.geometry,
                style: feature.style,
                visible: feature.visible,
            },
        );

        self.changes.push(FeatureUpdate::Insert { id });
        id
    }

    /// Deletes all features of the feature set. Returns the number of deleted features.
    pub fn delete_feature_set(&mut self, feature_set: &str) -> usize {
        let ids: Vec<_> = self
            .content
            .features
            .iter()
            .filter(|(_, entry)| entry.feature_set == feature_set)
            .map(|(id, _)| *id)
            .collect();

        for id in &ids {
            self.content.features.remove(id);
            self.changes.push(FeatureUpdate::Delete { id: *id });
        }

        ids.len()
    }

    /// Sets visibility of all features with the name in the feature set.
    pub fn set_visible_by_name(&mut self, feature_set: &str, name: &str, visible: bool) {
        for (id, entry) in self.content.features.iter_mut() {
            if entry.feature_set == feature_set && entry.name == name && entry.visible != visible {
                entry.visible = visible;
                self.changes.push(FeatureUpdate::Update { id: *id });
            }
        }
    }

    /// Sets visibility of the feature. Returns true if the visibility changed.
    pub fn set_feature_visible(&mut self, id: FeatureId, visible: bool) -> Result<bool, CoverageError> {
        let entry = self
            .content
            .features
            .get_mut(&id)
            .ok_or(CoverageError::StaleFeature(id))?;

        if entry.visible == visible {
            return Ok(false);
        }

        entry.visible = visible;
        self.changes.push(FeatureUpdate::Update { id });
        Ok(true)
    }

    /// Replaces the style of the feature.
    pub fn update_style(&mut self, id: FeatureId, style: FeatureStyle) -> Result<(), CoverageError> {
        let entry = self
            .content
            .features
            .get_mut(&id)
            .ok_or(CoverageError::StaleFeature(id))?;

        entry.style = style;
        self.changes.push(FeatureUpdate::Update { id });
        Ok(())
    }
}

impl Drop for BulkModification<'_> {
    fn drop(&mut self) {
        if !self.changes.is_empty() {
            self.pending_updates.lock().append(&mut self.changes);
        }
    }
}
