//! Outline features kept in sync with a coverage source.
//!
//! [`OutlineSynchronizer`] projects the coverages of a [`CoverageSource`] into outline (and optional label) features
//! of a [`FeatureStore`]. Refresh passes run on a dedicated worker thread one at a time, in the order they were
//! requested. A pass is requested every time the source reports a change, or explicitly with
//! [`OutlineSynchronizer::refresh`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use coverage_types::geo::{Datum, GeoBounds, GeoPoint};
use coverage_types::{Geometry, GeometryCollection, Point2d};
use parking_lot::{Condvar, Mutex, RwLock};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::catalog::{CoverageSource, Subscription};
use crate::color::Color;
use crate::engine::{GeoEngine, GeometryEngine};
use crate::error::CoverageError;
use crate::feature_store::{FeatureQuery, FeatureStore, FeatureStyle, LabelStyle, NewFeature, StrokeStyle};
use crate::messenger::Messenger;
use crate::state::OutlineState;

/// How datasets of the source are grouped into outlines.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum OutlineGrouping {
    /// One outline per dataset name.
    #[default]
    ByName,
    /// One outline per imagery type. Coverages of datasets sharing the type are collected together.
    ByImageryType,
}

/// Configuration of an [`OutlineSynchronizer`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct OutlineConfig {
    /// Feature set in the store the outlines are written to.
    pub feature_set: String,
    /// Grouping of the datasets.
    pub grouping: OutlineGrouping,
    /// Merge collection coverages into a single shape.
    pub union: bool,
    /// Width of outline strokes in pixels.
    pub stroke_width: f32,
    /// Color used for all outlines instead of the palette colors.
    pub override_color: Option<Color>,
    /// Add a name label to every outline.
    pub labels: bool,
    /// A label is displayed once its outline is at least this wide on screen, in pixels.
    pub label_pixel_span: f64,
    /// Visibility of outlines that were not displayed before.
    pub default_visible: bool,
}

impl Default for OutlineConfig {
    fn default() -> Self {
        Self {
            feature_set: "outlines".into(),
            grouping: OutlineGrouping::ByName,
            union: false,
            stroke_width: 2.0,
            override_color: None,
            labels: true,
            label_pixel_span: 128.0,
            default_visible: true,
        }
    }
}

/// Convenience type to initialize an [`OutlineSynchronizer`].
pub struct OutlineSynchronizerBuilder {
    source: Arc<dyn CoverageSource>,
    store: Arc<FeatureStore>,
    engine: Option<Arc<dyn GeometryEngine>>,
    messenger: Option<Box<dyn Messenger>>,
    config: OutlineConfig,
    initial_refresh: bool,
}

impl OutlineSynchronizerBuilder {
    /// Creates a builder for a synchronizer writing outlines of the `source` into the `store`.
    pub fn new(source: Arc<dyn CoverageSource>, store: Arc<FeatureStore>) -> Self {
        Self {
            source,
            store,
            engine: None,
            messenger: None,
            config: OutlineConfig::default(),
            initial_refresh: true,
        }
    }

    /// Sets the geometry engine used for unions. Defaults to [`GeoEngine`].
    pub fn with_engine(mut self, engine: Arc<dyn GeometryEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Sets the messenger notified after every refresh pass.
    pub fn with_messenger(mut self, messenger: impl Messenger + 'static) -> Self {
        self.messenger = Some(Box::new(messenger));
        self
    }

    /// Replaces the whole configuration.
    pub fn with_config(mut self, config: OutlineConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the grouping of the datasets.
    pub fn with_grouping(mut self, grouping: OutlineGrouping) -> Self {
        self.config.grouping = grouping;
        self
    }

    /// Enables or disables union of collection coverages.
    pub fn with_union(mut self, union: bool) -> Self {
        self.config.union = union;
        self
    }

    /// Sets the color used for all outlines.
    pub fn with_override_color(mut self, color: Color) -> Self {
        self.config.override_color = Some(color);
        self
    }

    /// Enables or disables labels.
    pub fn with_labels(mut self, labels: bool) -> Self {
        self.config.labels = labels;
        self
    }

    /// Whether the first refresh pass is queued on build. Defaults to `true`.
    pub fn with_initial_refresh(mut self, initial_refresh: bool) -> Self {
        self.initial_refresh = initial_refresh;
        self
    }

    /// Starts the refresh worker and subscribes to the source changes.
    pub fn build(self) -> Result<OutlineSynchronizer, CoverageError> {
        let (sender, receiver) = mpsc::channel();
        let shared = Arc::new(Shared {
            source: self.source,
            store: self.store,
            engine: self.engine.unwrap_or_else(|| Arc::new(GeoEngine)),
            messenger: self.messenger,
            config: RwLock::new(self.config),
            name_colors: RwLock::new(HashMap::new()),
            disposed: AtomicBool::new(false),
            jobs: Mutex::new(Some(sender)),
            progress: Mutex::new(Progress::default()),
            idle: Condvar::new(),
        });

        let worker_shared = shared.clone();
        let worker = std::thread::Builder::new()
            .name("outline-refresh".into())
            .spawn(move || run_worker(worker_shared, receiver))?;

        let listener_shared = Arc::downgrade(&shared);
        let subscription = shared.source.subscribe(Arc::new(move || {
            on_catalog_changed(&listener_shared);
        }));

        let synchronizer = OutlineSynchronizer {
            shared,
            worker: Mutex::new(Some(worker)),
            subscription: Mutex::new(Some(subscription)),
        };

        if self.initial_refresh {
            synchronizer.refresh()?;
        }

        Ok(synchronizer)
    }
}

/// Keeps outline features of a [`FeatureStore`] in sync with a [`CoverageSource`].
///
/// Every refresh pass:
/// 1. collects the coverage of every outline from the source,
/// 2. merges collection coverages if union is enabled, dropping the outlines whose union fails,
/// 3. under one store lock, takes a snapshot of the outline visibility by name, replaces all features of the feature
///    set with new outlines and labels, and restores the visibility snapshot.
///
/// Outline colors are picked from the palette by the name hash, unless an override color or a color for the name is
/// set.
pub struct OutlineSynchronizer {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
    subscription: Mutex<Option<Subscription>>,
}

struct Shared {
    source: Arc<dyn CoverageSource>,
    store: Arc<FeatureStore>,
    engine: Arc<dyn GeometryEngine>,
    messenger: Option<Box<dyn Messenger>>,
    config: RwLock<OutlineConfig>,
    name_colors: RwLock<HashMap<String, Color>>,
    disposed: AtomicBool,
    jobs: Mutex<Option<mpsc::Sender<()>>>,
    progress: Mutex<Progress>,
    idle: Condvar,
}

#[derive(Default)]
struct Progress {
    requested: u64,
    completed: u64,
}

impl Shared {
    fn enqueue(&self) -> Result<(), CoverageError> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(CoverageError::Disposed);
        }

        let jobs = self.jobs.lock();
        let sender = jobs.as_ref().ok_or(CoverageError::Disposed)?;

        self.progress.lock().requested += 1;
        if sender.send(()).is_err() {
            let mut progress = self.progress.lock();
            progress.requested -= 1;
            return Err(CoverageError::Disposed);
        }

        Ok(())
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

fn on_catalog_changed(shared: &Weak<Shared>) {
    let Some(shared) = shared.upgrade() else {
        return;
    };

    log::debug!("Coverage source changed, refreshing outlines");
    if let Err(err) = shared.enqueue() {
        log::debug!("Outline refresh is not queued: {err}");
    }
}

fn run_worker(shared: Arc<Shared>, receiver: mpsc::Receiver<()>) {
    log::debug!("Outline refresh worker started");

    for () in receiver {
        if shared.is_disposed() {
            log::debug!("Skipping outline refresh of a disposed synchronizer");
        } else {
            match refresh_pass(&shared) {
                Ok(count) => log::debug!("Outlines refreshed, {count} outlines"),
                Err(CoverageError::Disposed) => {
                    log::debug!("Synchronizer disposed during refresh, result discarded")
                }
                Err(err) => log::warn!("Outline refresh failed: {err}"),
            }
        }

        let mut progress = shared.progress.lock();
        progress.completed += 1;
        shared.idle.notify_all();
    }

    log::debug!("Outline refresh worker stopped");
}

fn refresh_pass(shared: &Shared) -> Result<usize, CoverageError> {
    let config = shared.config.read().clone();

    let mut entries = collect_outlines(shared.source.as_ref(), config.grouping);

    if config.union {
        let mut batch = shared.engine.begin_batch();
        entries.retain_mut(|(name, geometry)| {
            if !geometry.is_collection() {
                return true;
            }

            let handle = batch.create_geometry(geometry.as_ref());
            match batch.unary_union(handle) {
                Some(union) => {
                    *geometry = Arc::new(union);
                    true
                }
                None => {
                    log::warn!("{}", CoverageError::UnionFailure(name.clone()));
                    false
                }
            }
        });
    }

    let name_colors = shared.name_colors.read().clone();
    let features: Vec<NewFeature> = entries
        .into_iter()
        .flat_map(|(name, geometry)| {
            let color = config
                .override_color
                .or_else(|| name_colors.get(&name).copied())
                .unwrap_or_else(|| Color::for_name(&name));
            outline_features(&config, name, geometry, color)
        })
        .collect();

    let mut bulk = shared.store.bulk();
    if shared.is_disposed() {
        return Err(CoverageError::Disposed);
    }

    let visibility = bulk.name_visibility(&config.feature_set);
    bulk.delete_feature_set(&config.feature_set);
    let mut count = 0;
    for feature in features {
        if feature.style.is_stroke() {
            count += 1;
        }
        bulk.insert(&config.feature_set, feature);
    }

    for (name, visible) in &visibility {
        bulk.set_visible_by_name(&config.feature_set, name, *visible);
    }
    drop(bulk);

    if let Some(messenger) = &shared.messenger {
        messenger.request_update();
    }

    Ok(count)
}

fn collect_outlines(source: &dyn CoverageSource, grouping: OutlineGrouping) -> Vec<(String, Arc<Geometry>)> {
    let mut entries: Vec<(String, Vec<Arc<Geometry>>)> = vec![];
    for dataset in source.datasets() {
        let key = match grouping {
            OutlineGrouping::ByName => dataset.name,
            OutlineGrouping::ByImageryType => dataset.imagery_type,
        };

        match entries.iter_mut().find(|(name, _)| *name == key) {
            Some((_, geometries)) => geometries.push(dataset.coverage),
            None => entries.push((key, vec![dataset.coverage])),
        }
    }

    entries
        .into_iter()
        .filter_map(|(name, mut geometries)| {
            let geometry = match geometries.len() {
                0 => None,
                1 => geometries.pop(),
                _ => Some(Arc::new(Geometry::Collection(GeometryCollection::new(
                    geometries.iter().map(|g| (**g).clone()).collect(),
                )))),
            };

            match geometry {
                Some(geometry) => Some((name, geometry)),
                None => {
                    log::debug!("{}", CoverageError::MissingGeometry(name));
                    None
                }
            }
        })
        .collect()
}

fn outline_features(config: &OutlineConfig, name: String, geometry: Arc<Geometry>, color: Color) -> Vec<NewFeature> {
    let label = match (config.labels, geometry.envelope()) {
        (true, Some(envelope)) => {
            let bounds = GeoBounds::from_envelope(&envelope);
            let center = bounds.center();
            let lateral_extent = bounds.width() * Datum::WGS84.meters_per_degree_lon(center.lat());

            Some(NewFeature {
                name: name.clone(),
                geometry: Arc::new(Point2d::new(center.lon(), envelope.min_y).into()),
                style: FeatureStyle::Label(LabelStyle {
                    text: name.clone(),
                    color,
                    min_resolution: lateral_extent / config.label_pixel_span,
                }),
                visible: config.default_visible,
            })
        }
        _ => None,
    };

    let outline = NewFeature {
        name,
        geometry,
        style: FeatureStyle::Stroke(StrokeStyle {
            color,
            width: config.stroke_width,
        }),
        visible: config.default_visible,
    };

    std::iter::once(outline).chain(label).collect()
}

impl OutlineSynchronizer {
    /// Creates a builder.
    pub fn builder(source: Arc<dyn CoverageSource>, store: Arc<FeatureStore>) -> OutlineSynchronizerBuilder {
        OutlineSynchronizerBuilder::new(source, store)
    }

    /// Queues a refresh pass. Never blocks on a running pass.
    pub fn refresh(&self) -> Result<(), CoverageError> {
        self.shared.enqueue()
    }

    /// Waits until all queued refresh passes are done. Returns false if the timeout expired first.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut progress = self.shared.progress.lock();
        while progress.completed < progress.requested {
            if self.shared.idle.wait_until(&mut progress, deadline).timed_out() {
                return progress.completed >= progress.requested;
            }
        }

        true
    }

    /// Current configuration.
    pub fn config(&self) -> OutlineConfig {
        self.shared.config.read().clone()
    }

    /// Replaces the configuration and queues a refresh pass.
    ///
    /// If the feature set changes, outlines in the old feature set are left as they are.
    pub fn set_config(&self, config: OutlineConfig) -> Result<(), CoverageError> {
        *self.shared.config.write() = config;
        self.refresh()
    }

    /// Store the outlines are written to.
    pub fn store(&self) -> &Arc<FeatureStore> {
        &self.shared.store
    }

    /// Shows or hides the outline and the label with the given name.
    pub fn set_visible(&self, name: &str, visible: bool) -> usize {
        let feature_set = self.shared.config.read().feature_set.clone();
        self.shared
            .store
            .set_features_visible(&FeatureQuery::feature_set(feature_set).with_names([name]), visible)
    }

    /// Returns true if the outline with the given name is displayed.
    pub fn is_visible(&self, name: &str) -> bool {
        let feature_set = self.shared.config.read().feature_set.clone();
        self.shared
            .store
            .name_visibility(&feature_set)
            .get(name)
            .copied()
            .unwrap_or(false)
    }

    /// Sets the color of the outline with the given name, or returns it to the palette color with `None`.
    ///
    /// The color is kept over refresh passes. Existing features are updated right away. The override color of the
    /// configuration takes precedence over it.
    pub fn set_outline_color(&self, name: &str, color: Option<Color>) {
        match color {
            Some(color) => self.shared.name_colors.write().insert(name.to_string(), color),
            None => self.shared.name_colors.write().remove(name),
        };

        let config = self.config();
        let color = config
            .override_color
            .or(color)
            .unwrap_or_else(|| Color::for_name(name));

        let features = self
            .shared
            .store
            .query_features(&FeatureQuery::feature_set(config.feature_set).with_names([name]));
        for feature in features {
            if let Err(err) = self.shared.store.update_style(feature.id, feature.style.with_color(color)) {
                log::error!("Failed to update outline color: {err}");
            }
        }
    }

    /// Color of the outline with the given name as currently displayed.
    pub fn outline_color(&self, name: &str) -> Option<Color> {
        let feature_set = self.shared.config.read().feature_set.clone();
        self.shared.store.outline_color(&feature_set, name)
    }

    /// Captures colors and visibility of the displayed outlines.
    pub fn capture_state(&self) -> OutlineState {
        let feature_set = self.shared.config.read().feature_set.clone();
        OutlineState::capture(&self.shared.store, &feature_set)
    }

    /// Applies a saved state to the displayed outlines. Saved colors are kept for subsequent refresh passes.
    pub fn restore_state(&self, state: &OutlineState, adopt_existing_visibility: bool) -> usize {
        {
            let mut name_colors = self.shared.name_colors.write();
            for entry in state.entries() {
                name_colors.insert(entry.name.clone(), entry.color);
            }
        }

        let feature_set = self.shared.config.read().feature_set.clone();
        state.apply(&self.shared.store, &feature_set, adopt_existing_visibility)
    }

    /// Returns true if [`dispose`](Self::dispose) was called.
    pub fn is_disposed(&self) -> bool {
        self.shared.is_disposed()
    }

    /// Stops listening to the source, stops the worker and waits for it to exit.
    ///
    /// A refresh pass running at the moment completes, but its result is not written to the store. Calling this
    /// method more than once has no effect.
    pub fn dispose(&self) {
        drop(self.subscription.lock().take());

        if self.shared.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        drop(self.shared.jobs.lock().take());

        if let Some(worker) = self.worker.lock().take() {
            if worker.thread().id() == std::thread::current().id() {
                log::warn!("Outline synchronizer disposed from its own worker, not joining");
                return;
            }

            if worker.join().is_err() {
                log::error!("Outline refresh worker panicked");
            }
        }

        log::debug!("Outline synchronizer disposed");
    }
}

impl Drop for OutlineSynchronizer {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{DatasetDescriptor, InMemoryCatalog};
    use crate::feature_store::FeatureUpdate;
    use coverage_types::Envelope;
    use std::sync::atomic::AtomicUsize;

    const TIMEOUT: Duration = Duration::from_secs(10);

    fn dataset(name: &str, imagery_type: &str, envelope: Envelope) -> DatasetDescriptor {
        DatasetDescriptor {
            name: name.into(),
            imagery_type: imagery_type.into(),
            coverage: Arc::new(envelope.into_polygon().into()),
            min_resolution: 100.0,
            max_resolution: 1.0,
        }
    }

    fn catalog() -> Arc<InMemoryCatalog> {
        let catalog = Arc::new(InMemoryCatalog::new());
        catalog.extend([
            dataset("a.ntf", "CIB", Envelope::new(0.0, 0.0, 2.0, 2.0)),
            dataset("b.ntf", "CIB", Envelope::new(1.0, 1.0, 3.0, 3.0)),
            dataset("c.tif", "DTED", Envelope::new(10.0, 10.0, 11.0, 11.0)),
        ]);
        catalog
    }

    fn outline_names(store: &FeatureStore) -> Vec<String> {
        store
            .query_features(&FeatureQuery::feature_set("outlines").strokes_only())
            .into_iter()
            .map(|f| f.name)
            .collect()
    }

    #[test]
    fn one_outline_per_dataset() {
        let store = Arc::new(FeatureStore::new());
        let synchronizer = OutlineSynchronizer::builder(catalog(), store.clone())
            .with_labels(false)
            .build()
            .expect("failed to build");
        assert!(synchronizer.wait_idle(TIMEOUT));

        assert_eq!(outline_names(&store), vec!["a.ntf", "b.ntf", "c.tif"]);
        assert_eq!(store.query_features_count(&FeatureQuery::feature_set("outlines")), 3);
    }

    #[test]
    fn union_collapses_imagery_type() {
        let store = Arc::new(FeatureStore::new());
        let synchronizer = OutlineSynchronizer::builder(catalog(), store.clone())
            .with_grouping(OutlineGrouping::ByImageryType)
            .with_union(true)
            .with_labels(false)
            .build()
            .expect("failed to build");
        assert!(synchronizer.wait_idle(TIMEOUT));

        let outlines = store.query_features(&FeatureQuery::feature_set("outlines"));
        assert_eq!(outlines.len(), 2);
        assert_eq!(outlines[0].name, "CIB");
        assert!(!outlines[0].geometry.is_collection());
        assert_eq!(outlines[0].geometry.envelope(), Some(Envelope::new(0.0, 0.0, 3.0, 3.0)));
    }

    #[test]
    fn grouping_without_union_keeps_collection() {
        let store = Arc::new(FeatureStore::new());
        let synchronizer = OutlineSynchronizer::builder(catalog(), store.clone())
            .with_grouping(OutlineGrouping::ByImageryType)
            .with_labels(false)
            .build()
            .expect("failed to build");
        assert!(synchronizer.wait_idle(TIMEOUT));

        let outlines = store.query_features(&FeatureQuery::feature_set("outlines").with_names(["CIB"]));
        assert_eq!(outlines.len(), 1);
        assert!(outlines[0].geometry.is_collection());
    }

    #[test]
    fn failed_union_drops_outline() {
        let catalog = Arc::new(InMemoryCatalog::new());
        catalog.extend([
            DatasetDescriptor {
                coverage: Arc::new(Point2d::new(0.0, 0.0).into()),
                ..dataset("p1", "POINTS", Envelope::new(0.0, 0.0, 1.0, 1.0))
            },
            DatasetDescriptor {
                coverage: Arc::new(Point2d::new(1.0, 1.0).into()),
                ..dataset("p2", "POINTS", Envelope::new(0.0, 0.0, 1.0, 1.0))
            },
            dataset("c.tif", "DTED", Envelope::new(10.0, 10.0, 11.0, 11.0)),
        ]);

        let store = Arc::new(FeatureStore::new());
        let synchronizer = OutlineSynchronizer::builder(catalog, store.clone())
            .with_grouping(OutlineGrouping::ByImageryType)
            .with_union(true)
            .with_labels(false)
            .build()
            .expect("failed to build");
        assert!(synchronizer.wait_idle(TIMEOUT));

        assert_eq!(outline_names(&store), vec!["DTED"]);
    }

    #[test]
    fn visibility_survives_refresh() {
        let catalog = catalog();
        let store = Arc::new(FeatureStore::new());
        let synchronizer = OutlineSynchronizer::builder(catalog.clone(), store.clone())
            .build()
            .expect("failed to build");
        assert!(synchronizer.wait_idle(TIMEOUT));

        assert_eq!(synchronizer.set_visible("a.ntf", false), 2);
        assert!(!synchronizer.is_visible("a.ntf"));

        catalog.insert(dataset("d.ntf", "CIB", Envelope::new(5.0, 5.0, 6.0, 6.0)));
        assert!(synchronizer.wait_idle(TIMEOUT));

        assert!(!synchronizer.is_visible("a.ntf"));
        assert!(synchronizer.is_visible("b.ntf"));
        assert!(synchronizer.is_visible("d.ntf"));
        assert_eq!(
            store.query_features_count(&FeatureQuery::feature_set("outlines").with_names(["a.ntf"]).visible_only()),
            0
        );
    }

    #[test]
    fn colors_are_stable_and_can_be_overridden() {
        let catalog = catalog();
        let store = Arc::new(FeatureStore::new());
        let synchronizer = OutlineSynchronizer::builder(catalog.clone(), store.clone())
            .build()
            .expect("failed to build");
        assert!(synchronizer.wait_idle(TIMEOUT));

        let color = synchronizer.outline_color("c.tif");
        assert_eq!(color, Some(Color::for_name("c.tif")));

        synchronizer.set_outline_color("c.tif", Some(Color::rgba(1, 2, 3, 255)));
        assert_eq!(synchronizer.outline_color("c.tif"), Some(Color::rgba(1, 2, 3, 255)));

        synchronizer.refresh().expect("disposed");
        assert!(synchronizer.wait_idle(TIMEOUT));
        assert_eq!(synchronizer.outline_color("c.tif"), Some(Color::rgba(1, 2, 3, 255)));
        assert_eq!(synchronizer.outline_color("a.ntf"), Some(Color::for_name("a.ntf")));

        let config = OutlineConfig {
            override_color: Some(Color::WHITE),
            ..synchronizer.config()
        };
        synchronizer.set_config(config).expect("disposed");
        assert!(synchronizer.wait_idle(TIMEOUT));
        assert_eq!(synchronizer.outline_color("a.ntf"), Some(Color::WHITE));
        assert_eq!(synchronizer.outline_color("c.tif"), Some(Color::WHITE));
    }

    #[test]
    fn labels_are_placed_at_lower_center() {
        let catalog = Arc::new(InMemoryCatalog::new());
        catalog.insert(dataset("a", "A", Envelope::new(10.0, 0.0, 12.0, 4.0)));

        let store = Arc::new(FeatureStore::new());
        let synchronizer = OutlineSynchronizer::builder(catalog, store.clone())
            .build()
            .expect("failed to build");
        assert!(synchronizer.wait_idle(TIMEOUT));

        let features = store.query_features(&FeatureQuery::feature_set("outlines"));
        let label = features
            .iter()
            .find(|f| !f.style.is_stroke())
            .expect("no label");

        assert_eq!(*label.geometry, Geometry::from(Point2d::new(11.0, 0.0)));
        let FeatureStyle::Label(style) = &label.style else {
            panic!("not a label");
        };
        assert_eq!(style.text, "a");
        let expected = 2.0 * Datum::WGS84.meters_per_degree_lon(2.0) / OutlineConfig::default().label_pixel_span;
        approx::assert_relative_eq!(style.min_resolution, expected, max_relative = 1e-12);
    }

    #[test]
    fn refresh_notifies_messenger_and_store_consumers() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        let store = Arc::new(FeatureStore::new());
        let synchronizer = OutlineSynchronizer::builder(catalog(), store.clone())
            .with_messenger(move || {
                calls_clone.fetch_add(1, Ordering::Relaxed);
            })
            .build()
            .expect("failed to build");
        assert!(synchronizer.wait_idle(TIMEOUT));

        assert_eq!(calls.load(Ordering::Relaxed), 1);
        let updates = store.drain_updates();
        assert!(!updates.is_empty());
        assert!(updates.iter().all(|u| matches!(u, FeatureUpdate::Insert { .. })));
    }

    #[test]
    fn dispose_unsubscribes_and_rejects_refresh() {
        let catalog = catalog();
        let store = Arc::new(FeatureStore::new());
        let synchronizer = OutlineSynchronizer::builder(catalog.clone(), store.clone())
            .build()
            .expect("failed to build");
        assert!(synchronizer.wait_idle(TIMEOUT));
        let count = store.query_features_count(&FeatureQuery::default());

        synchronizer.dispose();
        assert!(synchronizer.is_disposed());
        assert!(matches!(synchronizer.refresh(), Err(CoverageError::Disposed)));

        catalog.insert(dataset("d.ntf", "CIB", Envelope::new(5.0, 5.0, 6.0, 6.0)));
        assert_eq!(store.query_features_count(&FeatureQuery::default()), count);

        // second call is a no-op
        synchronizer.dispose();
    }

    /// Source that can hold the refresh worker inside `datasets` and counts concurrent passes.
    struct GatedSource {
        catalog: Arc<InMemoryCatalog>,
        gate: Mutex<Option<(mpsc::Sender<()>, mpsc::Receiver<()>)>>,
        active: AtomicUsize,
        max_active: AtomicUsize,
        passes: AtomicUsize,
    }

    impl GatedSource {
        fn new(catalog: Arc<InMemoryCatalog>) -> Arc<Self> {
            Arc::new(Self {
                catalog,
                gate: Mutex::new(None),
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
                passes: AtomicUsize::new(0),
            })
        }

        /// The next pass signals `started` and waits for `release`.
        fn arm(&self) -> (mpsc::Receiver<()>, mpsc::Sender<()>) {
            let (started_sender, started) = mpsc::channel();
            let (release, gate) = mpsc::channel();
            *self.gate.lock() = Some((started_sender, gate));
            (started, release)
        }
    }

    impl CoverageSource for GatedSource {
        fn selection_names(&self) -> Vec<String> {
            self.catalog.selection_names()
        }

        fn geometry(&self, name: &str) -> Option<Arc<Geometry>> {
            self.catalog.geometry(name)
        }

        fn min_resolution(&self, name: &str) -> f64 {
            self.catalog.min_resolution(name)
        }

        fn max_resolution(&self, name: &str) -> f64 {
            self.catalog.max_resolution(name)
        }

        fn datasets(&self) -> Vec<DatasetDescriptor> {
            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(active, Ordering::SeqCst);

            let gate = self.gate.lock().take();
            if let Some((started, release)) = gate {
                let _ = started.send(());
                let _ = release.recv();
            }
            std::thread::sleep(Duration::from_millis(2));

            let datasets = self.catalog.datasets();
            self.passes.fetch_add(1, Ordering::SeqCst);
            self.active.fetch_sub(1, Ordering::SeqCst);
            datasets
        }

        fn subscribe(&self, listener: Arc<dyn crate::catalog::CatalogListener>) -> Subscription {
            self.catalog.subscribe(listener)
        }
    }

    #[test]
    fn refresh_passes_run_one_at_a_time() {
        let catalog = catalog();
        let source = GatedSource::new(catalog.clone());
        let store = Arc::new(FeatureStore::new());
        let synchronizer = OutlineSynchronizer::builder(source.clone(), store.clone())
            .with_labels(false)
            .build()
            .expect("failed to build");

        for _ in 0..5 {
            synchronizer.refresh().expect("disposed");
        }
        catalog.insert(dataset("d.ntf", "CIB", Envelope::new(5.0, 5.0, 6.0, 6.0)));
        assert!(synchronizer.wait_idle(TIMEOUT));

        assert_eq!(source.passes.load(Ordering::SeqCst), 7);
        assert_eq!(source.max_active.load(Ordering::SeqCst), 1);

        // the last queued pass saw the last catalog change
        assert_eq!(outline_names(&store), vec!["a.ntf", "b.ntf", "c.tif", "d.ntf"]);
    }

    #[test]
    fn pass_in_flight_during_dispose_is_discarded() {
        let source = GatedSource::new(catalog());
        let (started, release) = source.arm();
        let store = Arc::new(FeatureStore::new());
        let synchronizer = OutlineSynchronizer::builder(source.clone(), store.clone())
            .build()
            .expect("failed to build");
        started.recv_timeout(TIMEOUT).expect("refresh did not start");

        std::thread::scope(|scope| {
            let disposing = scope.spawn(|| synchronizer.dispose());

            let deadline = Instant::now() + TIMEOUT;
            while !synchronizer.is_disposed() {
                assert!(Instant::now() < deadline, "dispose did not start");
                std::thread::sleep(Duration::from_millis(1));
            }

            release.send(()).expect("worker is gone");
            disposing.join().expect("dispose panicked");
        });

        assert_eq!(source.passes.load(Ordering::SeqCst), 1);
        assert_eq!(store.query_features_count(&FeatureQuery::default()), 0);
        assert!(store.drain_updates().is_empty());
    }

    #[test]
    fn visibility_change_during_pass_is_kept() {
        let source = GatedSource::new(catalog());
        let store = Arc::new(FeatureStore::new());
        let synchronizer = OutlineSynchronizer::builder(source.clone(), store.clone())
            .with_labels(false)
            .build()
            .expect("failed to build");
        assert!(synchronizer.wait_idle(TIMEOUT));

        let (started, release) = source.arm();
        synchronizer.refresh().expect("disposed");
        started.recv_timeout(TIMEOUT).expect("refresh did not start");

        assert_eq!(synchronizer.set_visible("a.ntf", false), 1);
        release.send(()).expect("worker is gone");
        assert!(synchronizer.wait_idle(TIMEOUT));

        assert!(!synchronizer.is_visible("a.ntf"));
        assert!(synchronizer.is_visible("b.ntf"));
    }

    #[test]
    fn restored_state_survives_refresh() {
        let store = Arc::new(FeatureStore::new());
        let synchronizer = OutlineSynchronizer::builder(catalog(), store.clone())
            .build()
            .expect("failed to build");
        assert!(synchronizer.wait_idle(TIMEOUT));

        synchronizer.set_visible("b.ntf", false);
        synchronizer.set_outline_color("a.ntf", Some(Color::WHITE));
        let state = synchronizer.capture_state();
        assert_eq!(state.entries().len(), 3);

        let other_store = Arc::new(FeatureStore::new());
        let other = OutlineSynchronizer::builder(catalog(), other_store)
            .build()
            .expect("failed to build");
        assert!(other.wait_idle(TIMEOUT));

        assert_eq!(other.restore_state(&state, false), 6);
        other.refresh().expect("refresh failed");
        assert!(other.wait_idle(TIMEOUT));

        assert_eq!(other.outline_color("a.ntf"), Some(Color::WHITE));
        assert!(!other.is_visible("b.ntf"));
        assert!(other.is_visible("c.tif"));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn config_deserializes_with_defaults() {
        let config: OutlineConfig =
            serde_json::from_str(r##"{"grouping": "by_imagery_type", "override_color": "#FF0000"}"##)
                .expect("invalid config");

        assert_eq!(config.grouping, OutlineGrouping::ByImageryType);
        assert_eq!(config.override_color, Some(Color::RED));
        assert_eq!(config.feature_set, OutlineConfig::default().feature_set);
        assert!(config.labels);
    }
}
