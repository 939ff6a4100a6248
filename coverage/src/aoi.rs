//! Background computation of the selections intersecting the viewport.

use ahash::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use coverage_types::geo::GeoBounds;
use parking_lot::{Condvar, Mutex};

use crate::catalog::CoverageSource;
use crate::engine::GeometryEngine;
use crate::error::CoverageError;
use crate::index::SelectionIndex;
use crate::messenger::Messenger;
use crate::selection::Selection;

/// Provides current bounds of the map view.
pub trait ViewportProvider: Send + Sync {
    /// Visible bounds. Any of the values can be NaN if the view is not laid out yet.
    fn bounds(&self) -> GeoBounds;
}

impl<F> ViewportProvider for F
where
    F: Fn() -> GeoBounds + Send + Sync,
{
    fn bounds(&self) -> GeoBounds {
        self()
    }
}

/// Computes which selections of a source intersect the viewport on a dedicated thread.
///
/// Every [`query`](Self::query) bumps a request counter and wakes the worker. Requests that arrive while a pass is
/// running are collapsed into a single following pass. A pass tests the exact coverage geometry of every selection of
/// the source against the viewport polygon and publishes the result only if its set of selection names differs from
/// the names the owner currently holds, as reported by the `current` source given to [`start`](Self::start). A result
/// equal to the current content withdraws a published result that was not applied yet. The owner picks up the
/// published result with [`take_published`](Self::take_published) or [`apply_to`](Self::apply_to), usually after the
/// messenger asked it to.
pub struct AoiIsectComputer<T = ()> {
    shared: Arc<AoiShared<T>>,
    worker: Option<JoinHandle<()>>,
}

struct AoiShared<T> {
    source: Arc<dyn CoverageSource>,
    current: Arc<dyn CoverageSource>,
    viewport: Arc<dyn ViewportProvider>,
    engine: Arc<dyn GeometryEngine>,
    messenger: Option<Box<dyn Messenger>>,
    state: Mutex<AoiState>,
    wake: Condvar,
    idle: Condvar,
    published: Mutex<Option<Vec<Selection<T>>>>,
    passes: AtomicU64,
}

#[derive(Default)]
struct AoiState {
    requested: u64,
    computed: u64,
    disposed: bool,
}

impl<T: Send + 'static> AoiIsectComputer<T> {
    /// Starts the worker thread.
    ///
    /// `source` provides all selections to test. `current` reports the selections the owner displays at the moment,
    /// usually the [`SelectionIndex`] the results are applied to.
    pub fn start(
        source: Arc<dyn CoverageSource>,
        current: Arc<dyn CoverageSource>,
        viewport: Arc<dyn ViewportProvider>,
        engine: Arc<dyn GeometryEngine>,
        messenger: Option<Box<dyn Messenger>>,
    ) -> Result<Self, CoverageError> {
        let shared = Arc::new(AoiShared {
            source,
            current,
            viewport,
            engine,
            messenger,
            state: Mutex::new(AoiState::default()),
            wake: Condvar::new(),
            idle: Condvar::new(),
            published: Mutex::new(None),
            passes: AtomicU64::new(0),
        });

        let worker_shared = shared.clone();
        let worker = std::thread::Builder::new()
            .name("aoi-isect".into())
            .spawn(move || run_worker(&worker_shared))?;

        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }
}

impl<T> AoiIsectComputer<T> {
    /// Requests a new pass, e.g. after the viewport moved. Never blocks on a running pass.
    pub fn query(&self) {
        let mut state = self.shared.state.lock();
        state.requested += 1;
        self.shared.wake.notify_one();
    }

    /// Takes the last published result, if it was not taken yet.
    pub fn take_published(&self) -> Option<Vec<Selection<T>>> {
        self.shared.published.lock().take()
    }

    /// Replaces the content of the index with the last published result. Returns false if there was nothing new.
    ///
    /// Should be called from the owner thread of the index.
    pub fn apply_to(&self, index: &SelectionIndex<T>) -> bool {
        match self.take_published() {
            Some(selections) => {
                index.replace_selections(selections);
                true
            }
            None => false,
        }
    }

    /// Number of passes executed so far, including the passes skipped because of unknown viewport bounds.
    pub fn passes(&self) -> u64 {
        self.shared.passes.load(Ordering::Acquire)
    }

    /// Waits until all requested passes are done. Returns false if the timeout expired first.
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        while state.computed < state.requested && !state.disposed {
            if self.shared.idle.wait_until(&mut state, deadline).timed_out() {
                return state.computed >= state.requested;
            }
        }

        true
    }

    /// Signals the worker to stop and waits for it to exit. Calling this method more than once has no effect.
    pub fn dispose(&mut self) {
        {
            let mut state = self.shared.state.lock();
            state.disposed = true;
            self.shared.wake.notify_all();
            self.shared.idle.notify_all();
        }

        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("AOI intersection worker panicked");
            }
        }
    }
}

impl<T> Drop for AoiIsectComputer<T> {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn run_worker<T>(shared: &AoiShared<T>) {
    log::debug!("AOI intersection worker started");

    let mut compute = 0;
    loop {
        {
            let mut state = shared.state.lock();
            loop {
                if state.disposed {
                    log::debug!("AOI intersection worker stopped");
                    return;
                }
                if state.requested != compute {
                    compute = state.requested;
                    break;
                }
                shared.wake.wait(&mut state);
            }
        }

        shared.passes.fetch_add(1, Ordering::AcqRel);
        if let Some(selections) = compute_pass::<T>(shared) {
            let names: HashSet<String> = selections.iter().map(|s| s.name().to_string()).collect();
            let current: HashSet<String> = shared.current.selection_names().into_iter().collect();
            if names != current {
                log::debug!("Selections in view changed, {} selections", selections.len());
                *shared.published.lock() = Some(selections);

                if let Some(messenger) = &shared.messenger {
                    messenger.request_update();
                }
            } else if shared.published.lock().take().is_some() {
                log::debug!("Selections in view are back to the current ones, dropping unapplied result");
            }
        }

        let mut state = shared.state.lock();
        state.computed = compute;
        shared.idle.notify_all();
    }
}

fn compute_pass<T>(shared: &AoiShared<T>) -> Option<Vec<Selection<T>>> {
    let bounds = shared.viewport.bounds();
    if !bounds.is_valid() {
        log::debug!("Viewport bounds are not available, skipping intersection pass");
        return None;
    }

    let mut batch = shared.engine.begin_batch();
    let aoi = batch.create_polygon(&bounds);

    let mut selections = vec![];
    for name in shared.source.selection_names() {
        let Some(coverage) = shared.source.geometry(&name) else {
            continue;
        };

        let handle = batch.create_geometry(&coverage);
        if !batch.intersects(aoi, handle) {
            continue;
        }

        let min_resolution = shared.source.min_resolution(&name);
        let max_resolution = shared.source.max_resolution(&name);
        match Selection::new(name, coverage, min_resolution, max_resolution) {
            Ok(selection) => selections.push(selection),
            Err(err) => log::warn!("Skipping selection: {err}"),
        }
    }

    Some(selections)
}
