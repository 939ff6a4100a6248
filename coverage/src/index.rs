//! Ordered collection of [`Selection`]s with spatial queries.

use std::cmp::Ordering;
use std::sync::Arc;
use std::thread::ThreadId;

use ahash::{HashMap, HashMapExt, HashSet, HashSetExt};
use coverage_types::geo::{GeoBounds, GeoPoint2d};
use coverage_types::Geometry;
use parking_lot::RwLock;

use crate::catalog::CoverageSource;
use crate::engine::GeometryEngine;
use crate::error::CoverageError;
use crate::selection::Selection;

/// Total order over selections used by [`SelectionIndex::sort`].
pub type Comparator<T> = Arc<dyn Fn(&Selection<T>, &Selection<T>) -> Ordering + Send + Sync>;

/// Set of named selections, one per distinct name.
///
/// The index belongs to an owner thread: the thread that created it. Only the owner is supposed to change the content
/// of the index ([`rebuild`](Self::rebuild), [`sort`](Self::sort), [`replace_selections`](Self::replace_selections)).
/// Calling these from other threads is logged as a warning, but the operation is still performed. Read-only queries
/// can be done from any thread.
pub struct SelectionIndex<T = ()> {
    owner: ThreadId,
    state: RwLock<IndexState<T>>,
}

struct IndexState<T> {
    selections: Vec<Selection<T>>,
    comparator: Option<Comparator<T>>,
}

impl<T> IndexState<T> {
    fn apply_comparator(&mut self) {
        if let Some(comparator) = &self.comparator {
            self.selections.sort_by(|a, b| comparator(a, b));
        }
    }
}

impl<T> Default for SelectionIndex<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SelectionIndex<T> {
    /// Creates an empty index owned by the current thread.
    pub fn new() -> Self {
        Self {
            owner: std::thread::current().id(),
            state: RwLock::new(IndexState {
                selections: vec![],
                comparator: None,
            }),
        }
    }

    /// Id of the owner thread.
    pub fn owner(&self) -> ThreadId {
        self.owner
    }

    /// Returns true if called from the owner thread.
    pub fn is_owner_thread(&self) -> bool {
        std::thread::current().id() == self.owner
    }

    fn check_owner(&self, operation: &str) {
        if !self.is_owner_thread() {
            log::warn!(
                "SelectionIndex::{operation} called from thread {:?}, but the index is owned by {:?}",
                std::thread::current().id(),
                self.owner
            );
        }
    }

    /// Rebuilds the index from the source.
    ///
    /// With `rebuild == false` selections whose names are still present in the source are kept as is, including
    /// their tags. Otherwise all selections are created anew. Names without a coverage geometry and names whose data
    /// cannot form a valid selection are skipped. Selections are ordered by the last applied comparator, or in the
    /// source order if the index was never sorted.
    ///
    /// The source must not be the index itself.
    pub fn rebuild(&self, source: &dyn CoverageSource, rebuild: bool) {
        self.check_owner("rebuild");

        let names = source.selection_names();
        let mut state = self.state.write();

        let mut previous: HashMap<String, Selection<T>> = HashMap::new();
        let existing = std::mem::take(&mut state.selections);
        if !rebuild {
            previous.extend(
                existing
                    .into_iter()
                    .map(|selection| (selection.name().to_string(), selection)),
            );
        }

        let mut seen = HashSet::with_capacity(names.len());
        let mut selections = Vec::with_capacity(names.len());
        for name in names {
            if !seen.insert(name.clone()) {
                log::debug!("Duplicate selection name '{name}' in the source, ignoring");
                continue;
            }

            if let Some(existing) = previous.remove(&name) {
                selections.push(existing);
                continue;
            }

            let Some(coverage) = source.geometry(&name) else {
                log::debug!("No coverage geometry for selection '{name}', skipping");
                continue;
            };

            let min_resolution = source.min_resolution(&name);
            let max_resolution = source.max_resolution(&name);
            match Selection::new(name, coverage, min_resolution, max_resolution) {
                Ok(selection) => selections.push(selection),
                Err(err) => log::warn!("Skipping selection: {err}"),
            }
        }

        state.selections = selections;
        state.apply_comparator();

        log::debug!(
            "Selection index rebuilt (full: {rebuild}), {} selections",
            state.selections.len()
        );
    }

    /// Sorts the selections and remembers the comparator for subsequent rebuilds.
    pub fn sort(&self, comparator: Comparator<T>) {
        self.check_owner("sort");

        let mut state = self.state.write();
        state.comparator = Some(comparator);
        state.apply_comparator();
    }

    /// Replaces all selections, for example with the result of a background computation.
    ///
    /// Only the first selection with each name is kept. The selections are sorted with the last applied comparator.
    pub fn replace_selections(&self, selections: impl IntoIterator<Item = Selection<T>>) {
        self.check_owner("replace_selections");

        let mut seen = HashSet::new();
        let selections: Vec<_> = selections
            .into_iter()
            .filter(|selection| seen.insert(selection.name().to_string()))
            .collect();

        let mut state = self.state.write();
        state.selections = selections;
        state.apply_comparator();
    }

    /// Sets the tag of the selection with the given name, returning the previous tag.
    pub fn set_tag(&self, name: &str, tag: Option<T>) -> Result<Option<T>, CoverageError> {
        self.with_selection_mut(name, |selection| selection.set_tag(tag))
            .ok_or_else(|| CoverageError::NotFound(name.to_string()))
    }

    /// Calls `f` with the selection with the given name.
    pub fn with_selection_mut<R>(&self, name: &str, f: impl FnOnce(&mut Selection<T>) -> R) -> Option<R> {
        let mut state = self.state.write();
        state
            .selections
            .iter_mut()
            .find(|selection| selection.name() == name)
            .map(f)
    }

    /// Number of selections.
    pub fn len(&self) -> usize {
        self.state.read().selections.len()
    }

    /// Returns true if the index has no selections.
    pub fn is_empty(&self) -> bool {
        self.state.read().selections.is_empty()
    }

    /// Names of the selections in the index order.
    pub fn names(&self) -> Vec<String> {
        self.state
            .read()
            .selections
            .iter()
            .map(|selection| selection.name().to_string())
            .collect()
    }

    /// Returns true if a selection with the name is in the index.
    pub fn contains(&self, name: &str) -> bool {
        self.state
            .read()
            .selections
            .iter()
            .any(|selection| selection.name() == name)
    }
}

impl<T: Clone> SelectionIndex<T> {
    /// Copy of all selections in the index order.
    pub fn selections(&self) -> Vec<Selection<T>> {
        self.state.read().selections.clone()
    }

    /// Selection with the given name.
    pub fn find_by_name(&self, name: &str) -> Option<Selection<T>> {
        self.state
            .read()
            .selections
            .iter()
            .find(|selection| selection.name() == name)
            .cloned()
    }

    /// Selections whose bounds overlap the viewport bounds, in the index order.
    ///
    /// Only the bounding rectangles are compared. Use [`exact_intersecting`](Self::exact_intersecting) when the
    /// coverage geometry matters.
    pub fn selections_within_viewport(&self, viewport: &GeoBounds) -> Vec<Selection<T>> {
        self.filtered(|selection| selection.intersects_bounds(viewport))
    }

    /// Selections whose coverage geometry intersects the viewport bounds, in the index order.
    pub fn exact_intersecting(&self, engine: &dyn GeometryEngine, viewport: &GeoBounds) -> Vec<Selection<T>> {
        let state = self.state.read();

        let mut batch = engine.begin_batch();
        let aoi = batch.create_polygon(viewport);

        state
            .selections
            .iter()
            .filter(|selection| selection.intersects_bounds(viewport))
            .filter(|selection| {
                let coverage = batch.create_geometry(selection.coverage());
                batch.intersects(aoi, coverage)
            })
            .cloned()
            .collect()
    }

    /// Selections containing the point. See [`Selection::contains_point`] for the containment semantics.
    pub fn selections_containing_point(&self, point: &GeoPoint2d) -> Vec<Selection<T>> {
        self.filtered(|selection| selection.contains_point(point))
    }

    /// Selection closest to the point.
    ///
    /// A selection containing the point in its bounds is returned immediately. Otherwise the selection with the
    /// smallest [`distance`](Selection::distance_to) wins, the first one in the index order on ties.
    pub fn nearest(&self, point: &GeoPoint2d) -> Option<Selection<T>> {
        let state = self.state.read();

        let mut nearest: Option<(&Selection<T>, f64)> = None;
        for selection in &state.selections {
            let distance = selection.distance_to(point);
            if distance == 0.0 {
                return Some(selection.clone());
            }

            if nearest.map_or(true, |(_, min)| distance < min) {
                nearest = Some((selection, distance));
            }
        }

        nearest.map(|(selection, _)| selection.clone())
    }

    fn filtered(&self, predicate: impl Fn(&Selection<T>) -> bool) -> Vec<Selection<T>> {
        self.state
            .read()
            .selections
            .iter()
            .filter(|selection| predicate(selection))
            .cloned()
            .collect()
    }
}

impl<T: Send + Sync> CoverageSource for SelectionIndex<T> {
    fn selection_names(&self) -> Vec<String> {
        self.names()
    }

    fn geometry(&self, name: &str) -> Option<Arc<Geometry>> {
        self.state
            .read()
            .selections
            .iter()
            .find(|selection| selection.name() == name)
            .map(|selection| selection.coverage().clone())
    }

    fn min_resolution(&self, name: &str) -> f64 {
        self.state
            .read()
            .selections
            .iter()
            .find(|selection| selection.name() == name)
            .map_or(f64::NAN, |selection| selection.min_resolution())
    }

    fn max_resolution(&self, name: &str) -> f64 {
        self.state
            .read()
            .selections
            .iter()
            .find(|selection| selection.name() == name)
            .map_or(f64::NAN, |selection| selection.max_resolution())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use crate::engine::GeoEngine;
    use crate::ordering;
    use coverage_types::geo::{Datum, GeoPoint};
    use coverage_types::{latlon, Envelope};
    use parking_lot::Mutex;

    type Entry = (String, Option<Arc<Geometry>>, f64, f64);

    #[derive(Default)]
    struct TestSource {
        entries: Mutex<Vec<Entry>>,
    }

    impl TestSource {
        fn new(entries: &[(&str, Option<Envelope>, f64, f64)]) -> Self {
            let source = Self::default();
            source.set(entries);
            source
        }

        fn set(&self, entries: &[(&str, Option<Envelope>, f64, f64)]) {
            *self.entries.lock() = entries
                .iter()
                .map(|(name, envelope, min, max)| {
                    (
                        name.to_string(),
                        envelope.map(|e| Arc::new(Geometry::from(e.into_polygon()))),
                        *min,
                        *max,
                    )
                })
                .collect();
        }

        fn entry(&self, name: &str) -> Option<Entry> {
            self.entries.lock().iter().find(|e| e.0 == name).cloned()
        }
    }

    impl CoverageSource for TestSource {
        fn selection_names(&self) -> Vec<String> {
            self.entries.lock().iter().map(|e| e.0.clone()).collect()
        }

        fn geometry(&self, name: &str) -> Option<Arc<Geometry>> {
            self.entry(name).and_then(|e| e.1)
        }

        fn min_resolution(&self, name: &str) -> f64 {
            self.entry(name).map_or(f64::NAN, |e| e.2)
        }

        fn max_resolution(&self, name: &str) -> f64 {
            self.entry(name).map_or(f64::NAN, |e| e.3)
        }
    }

    fn example_source() -> TestSource {
        TestSource::new(&[
            ("A", Some(Envelope::new(0.0, 0.0, 10.0, 10.0)), 100.0, 10.0),
            ("B", Some(Envelope::new(20.0, 20.0, 30.0, 30.0)), 50.0, 5.0),
        ])
    }

    #[test]
    fn full_rebuild_contains_resolvable_names_only() {
        let source = TestSource::new(&[
            ("A", Some(Envelope::new(0.0, 0.0, 1.0, 1.0)), 10.0, 1.0),
            ("no geometry", None, 10.0, 1.0),
            ("inverted", Some(Envelope::new(0.0, 0.0, 1.0, 1.0)), 1.0, 10.0),
            ("B", Some(Envelope::new(0.0, 0.0, 1.0, 1.0)), 10.0, 1.0),
            ("A", Some(Envelope::new(5.0, 5.0, 6.0, 6.0)), 10.0, 1.0),
        ]);

        let index = SelectionIndex::<()>::new();
        index.rebuild(&source, true);

        assert_eq!(index.names(), vec!["A", "B"]);
    }

    #[test]
    fn incremental_rebuild_preserves_tags() {
        let source = example_source();
        let index = SelectionIndex::new();
        index.rebuild(&source, true);
        assert_matches!(index.set_tag("A", Some(42u32)), Ok(None));
        assert_matches!(index.set_tag("missing", Some(1)), Err(CoverageError::NotFound(name)) if name == "missing");

        source.set(&[
            ("A", Some(Envelope::new(0.0, 0.0, 10.0, 10.0)), 100.0, 10.0),
            ("C", Some(Envelope::new(40.0, 40.0, 50.0, 50.0)), 100.0, 10.0),
        ]);
        index.rebuild(&source, false);

        assert_eq!(index.names(), vec!["A", "C"]);
        assert_eq!(index.find_by_name("A").and_then(|s| s.tag().copied()), Some(42));
        assert!(index.find_by_name("B").is_none());

        index.rebuild(&source, true);
        assert_eq!(index.find_by_name("A").and_then(|s| s.tag().copied()), None);
    }

    #[test]
    fn example_scenario() {
        let index = SelectionIndex::<()>::new();
        index.rebuild(&example_source(), true);

        let viewport = GeoBounds::new(5.0, -5.0, 5.0, -5.0);
        let within: Vec<_> = index
            .selections_within_viewport(&viewport)
            .into_iter()
            .map(|s| s.name().to_string())
            .collect();
        assert_eq!(within, vec!["A"]);

        let containing: Vec<_> = index
            .selections_containing_point(&latlon!(25.0, 25.0))
            .into_iter()
            .map(|s| s.name().to_string())
            .collect();
        assert_eq!(containing, vec!["B"]);

        let far = latlon!(60.0, 60.0);
        let nearest = index.nearest(&far).expect("no nearest");
        let to_a = latlon!(5.0, 5.0).distance(&far, &Datum::WGS84).expect("no distance");
        let to_b = latlon!(25.0, 25.0).distance(&far, &Datum::WGS84).expect("no distance");
        let expected = if to_a < to_b { "A" } else { "B" };
        assert_eq!(nearest.name(), expected);
    }

    #[test]
    fn nearest_prefers_containing_selection() {
        let index = SelectionIndex::<()>::new();
        index.rebuild(
            &TestSource::new(&[
                ("big", Some(Envelope::new(-50.0, -50.0, 50.0, 50.0)), 10.0, 1.0),
                ("small", Some(Envelope::new(0.0, 0.0, 0.1, 0.1)), 10.0, 1.0),
            ]),
            true,
        );

        // center of "small" is closer, but "big" contains the point in its bounds and comes first
        assert_eq!(index.nearest(&latlon!(0.2, 0.2)).map(|s| s.name().to_string()), Some("big".into()));
    }

    #[test]
    fn nearest_ties_resolve_to_first() {
        let index = SelectionIndex::<()>::new();
        index.rebuild(
            &TestSource::new(&[
                ("west", Some(Envelope::new(-11.0, -1.0, -9.0, 1.0)), 10.0, 1.0),
                ("east", Some(Envelope::new(9.0, -1.0, 11.0, 1.0)), 10.0, 1.0),
            ]),
            true,
        );

        assert_eq!(index.nearest(&latlon!(0.0, 0.0)).map(|s| s.name().to_string()), Some("west".into()));
        assert!(SelectionIndex::<()>::new().nearest(&latlon!(0.0, 0.0)).is_none());
    }

    #[test]
    fn sort_order_is_kept_after_rebuild() {
        let index = SelectionIndex::<()>::new();
        let source = TestSource::new(&[
            ("b", Some(Envelope::new(0.0, 0.0, 1.0, 1.0)), 10.0, 1.0),
            ("C", Some(Envelope::new(0.0, 0.0, 1.0, 1.0)), 10.0, 1.0),
            ("a", Some(Envelope::new(0.0, 0.0, 1.0, 1.0)), 10.0, 1.0),
        ]);
        index.rebuild(&source, true);
        index.sort(ordering::by_name_ignore_case());
        assert_eq!(index.names(), vec!["a", "b", "C"]);

        index.rebuild(&source, true);
        assert_eq!(index.names(), vec!["a", "b", "C"]);

        index.sort(ordering::by_name());
        assert_eq!(index.names(), vec!["C", "a", "b"]);
    }

    #[test]
    fn off_thread_sort_still_applies() {
        let _ = env_logger::builder().is_test(true).try_init();

        let index = Arc::new(SelectionIndex::<()>::new());
        index.rebuild(
            &TestSource::new(&[
                ("b", Some(Envelope::new(0.0, 0.0, 1.0, 1.0)), 10.0, 1.0),
                ("a", Some(Envelope::new(0.0, 0.0, 1.0, 1.0)), 10.0, 1.0),
            ]),
            true,
        );

        let index_clone = index.clone();
        std::thread::spawn(move || {
            assert!(!index_clone.is_owner_thread());
            index_clone.sort(ordering::by_name());
        })
        .join()
        .expect("sort thread panicked");

        assert_eq!(index.names(), vec!["a", "b"]);
    }

    #[test]
    fn replace_selections_dedups_and_sorts() {
        let index = SelectionIndex::<()>::new();
        index.sort(ordering::by_name());

        let rect = |name: &str| {
            Selection::new(name, Geometry::from(Envelope::new(0.0, 0.0, 1.0, 1.0).into_polygon()), 10.0, 1.0)
                .expect("invalid selection")
        };
        index.replace_selections([rect("b"), rect("a"), rect("b")]);

        assert_eq!(index.names(), vec!["a", "b"]);
    }

    #[test]
    fn exact_intersection_checks_coverage() {
        let index = SelectionIndex::<()>::new();
        let l_shape = Geometry::from(vec![
            Geometry::from(Envelope::new(0.0, 0.0, 1.0, 10.0).into_polygon()),
            Geometry::from(Envelope::new(0.0, 0.0, 10.0, 1.0).into_polygon()),
        ]);
        index.replace_selections([Selection::new("L", l_shape, 10.0, 1.0).expect("invalid selection")]);

        let viewport = GeoBounds::new(9.0, 5.0, 9.0, 5.0);
        assert_eq!(index.selections_within_viewport(&viewport).len(), 1);
        assert!(index.exact_intersecting(&GeoEngine, &viewport).is_empty());
    }

    #[test]
    fn index_is_a_coverage_source() {
        let index = SelectionIndex::<()>::new();
        index.rebuild(&example_source(), true);

        let copy = SelectionIndex::<()>::new();
        copy.rebuild(&index, true);
        assert_eq!(copy.names(), vec!["A", "B"]);
        assert_eq!(copy.find_by_name("B").map(|s| s.min_resolution()), Some(50.0));
        assert!(CoverageSource::geometry(&index, "missing").is_none());
    }
}
