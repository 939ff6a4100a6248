//! Sources of named coverage geometries and change notifications.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use coverage_types::{Geometry, GeometryCollection};
use parking_lot::{Mutex, RwLock};

/// Receives a notification every time the content of a [`CoverageSource`] changes.
pub trait CatalogListener: Send + Sync {
    /// Called after the catalog content was changed. Can be called from any thread.
    fn catalog_changed(&self);
}

impl<F> CatalogListener for F
where
    F: Fn() + Send + Sync,
{
    fn catalog_changed(&self) {
        self()
    }
}

/// Catalog entry describing one dataset.
#[derive(Debug, Clone)]
pub struct DatasetDescriptor {
    /// Unique name of the dataset.
    pub name: String,
    /// Imagery type of the dataset. Several datasets can share the same type.
    pub imagery_type: String,
    /// Area covered by the dataset.
    pub coverage: Arc<Geometry>,
    /// Coarsest resolution the dataset can be displayed at, in meters per pixel.
    pub min_resolution: f64,
    /// Finest resolution of the dataset, in meters per pixel.
    pub max_resolution: f64,
}

/// Provider of named coverage geometries with resolution ranges.
///
/// Implementations must be safe to call from background threads.
pub trait CoverageSource: Send + Sync {
    /// Names of all selections currently known to the source.
    fn selection_names(&self) -> Vec<String>;

    /// Coverage geometry of the selection with the given name.
    fn geometry(&self, name: &str) -> Option<Arc<Geometry>>;

    /// Coarsest resolution of the selection. NaN if the name is unknown.
    fn min_resolution(&self, name: &str) -> f64;

    /// Finest resolution of the selection. NaN if the name is unknown.
    fn max_resolution(&self, name: &str) -> f64;

    /// All datasets of the source.
    ///
    /// The default implementation describes every selection as a single dataset with the imagery type equal to its
    /// name.
    fn datasets(&self) -> Vec<DatasetDescriptor> {
        self.selection_names()
            .into_iter()
            .filter_map(|name| {
                let coverage = self.geometry(&name)?;
                Some(DatasetDescriptor {
                    imagery_type: name.clone(),
                    min_resolution: self.min_resolution(&name),
                    max_resolution: self.max_resolution(&name),
                    coverage,
                    name,
                })
            })
            .collect()
    }

    /// Registers a listener that is called every time the source content changes.
    ///
    /// The listener stays registered until the returned subscription is dropped. Sources that never change return a
    /// detached subscription.
    fn subscribe(&self, _listener: Arc<dyn CatalogListener>) -> Subscription {
        Subscription::detached()
    }
}

type ListenerList = Mutex<Vec<(u64, Arc<dyn CatalogListener>)>>;

/// List of listeners of a source.
#[derive(Default)]
pub struct ChangeNotifier {
    listeners: Arc<ListenerList>,
    next_id: AtomicU64,
}

impl ChangeNotifier {
    /// Creates a notifier without listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a listener.
    pub fn subscribe(&self, listener: Arc<dyn CatalogListener>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push((id, listener));

        Subscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    /// Calls all registered listeners.
    ///
    /// Listeners are called without holding the internal lock, so they may subscribe or unsubscribe.
    pub fn notify(&self) {
        let listeners: Vec<_> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();

        for listener in listeners {
            listener.catalog_changed();
        }
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }
}

/// Registration of a [`CatalogListener`]. The listener is removed when the subscription is dropped.
#[must_use = "the listener is removed as soon as the subscription is dropped"]
pub struct Subscription {
    id: u64,
    listeners: Weak<ListenerList>,
}

impl Subscription {
    /// Subscription that is not connected to any notifier.
    pub fn detached() -> Self {
        Self {
            id: 0,
            listeners: Weak::new(),
        }
    }

    /// Removes the listener.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners.lock().retain(|(id, _)| *id != self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("attached", &(self.listeners.strong_count() > 0))
            .finish()
    }
}

/// Coverage source backed by a list of datasets kept in memory.
///
/// Selection names are the imagery types of the datasets. The coverage of a selection is the coverage of its only
/// dataset, or a collection of coverages of all datasets sharing the imagery type. Its resolution range spans the
/// ranges of all the datasets.
///
/// The catalog is meant to be created once and shared between the components through an `Arc`.
#[derive(Default)]
pub struct InMemoryCatalog {
    datasets: RwLock<Vec<DatasetDescriptor>>,
    notifier: ChangeNotifier,
}

impl InMemoryCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a dataset, replacing a dataset with the same name, and notifies the listeners.
    pub fn insert(&self, dataset: DatasetDescriptor) {
        {
            let mut datasets = self.datasets.write();
            match datasets.iter_mut().find(|d| d.name == dataset.name) {
                Some(existing) => *existing = dataset,
                None => datasets.push(dataset),
            }
        }

        self.notifier.notify();
    }

    /// Adds multiple datasets with a single notification.
    pub fn extend(&self, datasets: impl IntoIterator<Item = DatasetDescriptor>) {
        {
            let mut stored = self.datasets.write();
            for dataset in datasets {
                match stored.iter_mut().find(|d| d.name == dataset.name) {
                    Some(existing) => *existing = dataset,
                    None => stored.push(dataset),
                }
            }
        }

        self.notifier.notify();
    }

    /// Removes the dataset with the given name.
    pub fn remove(&self, name: &str) -> Option<DatasetDescriptor> {
        let removed = {
            let mut datasets = self.datasets.write();
            let index = datasets.iter().position(|d| d.name == name)?;
            datasets.remove(index)
        };

        self.notifier.notify();
        Some(removed)
    }

    /// Removes all datasets.
    pub fn clear(&self) {
        self.datasets.write().clear();
        self.notifier.notify();
    }

    /// Number of datasets in the catalog.
    pub fn len(&self) -> usize {
        self.datasets.read().len()
    }

    /// Returns true if the catalog has no datasets.
    pub fn is_empty(&self) -> bool {
        self.datasets.read().is_empty()
    }

    fn resolutions(&self, imagery_type: &str) -> Vec<(f64, f64)> {
        self.datasets
            .read()
            .iter()
            .filter(|d| d.imagery_type == imagery_type)
            .map(|d| (d.min_resolution, d.max_resolution))
            .collect()
    }
}

impl CoverageSource for InMemoryCatalog {
    fn selection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = vec![];
        for dataset in self.datasets.read().iter() {
            if !names.contains(&dataset.imagery_type) {
                names.push(dataset.imagery_type.clone());
            }
        }

        names
    }

    fn geometry(&self, name: &str) -> Option<Arc<Geometry>> {
        let datasets = self.datasets.read();
        let mut coverages: Vec<_> = datasets
            .iter()
            .filter(|d| d.imagery_type == name)
            .map(|d| d.coverage.clone())
            .collect();

        match coverages.len() {
            0 => None,
            1 => coverages.pop(),
            _ => Some(Arc::new(Geometry::Collection(GeometryCollection::new(
                coverages.iter().map(|c| (**c).clone()).collect(),
            )))),
        }
    }

    fn min_resolution(&self, name: &str) -> f64 {
        self.resolutions(name)
            .into_iter()
            .map(|(min, _)| min)
            .reduce(f64::max)
            .unwrap_or(f64::NAN)
    }

    fn max_resolution(&self, name: &str) -> f64 {
        self.resolutions(name)
            .into_iter()
            .map(|(_, max)| max)
            .reduce(f64::min)
            .unwrap_or(f64::NAN)
    }

    fn datasets(&self) -> Vec<DatasetDescriptor> {
        self.datasets.read().clone()
    }

    fn subscribe(&self, listener: Arc<dyn CatalogListener>) -> Subscription {
        self.notifier.subscribe(listener)
    }
}
