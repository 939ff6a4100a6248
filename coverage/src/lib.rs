//! Index of named imagery layer selections and their coverage on the globe.
//!
//! A *selection* is a named, geographically bounded subset of an imagery layer's data with a resolution range. The
//! crate keeps selections of a [`CoverageSource`] in a [`SelectionIndex`] and answers spatial questions about them:
//! which selections intersect the viewport, which ones contain a point, and which one is the nearest.
//!
//! # Main components
//!
//! * [`SelectionIndex`] is an ordered set of [`Selection`]s with unique names, owned by a single thread (usually the
//!   UI thread). It is rebuilt from a [`CoverageSource`] and sorted with a comparator from the [`ordering`] module.
//! * [`OutlineSynchronizer`] keeps outline and label features of a [`FeatureStore`] in sync with the coverages of a
//!   source. Refresh passes run one at a time on a dedicated worker.
//! * [`AoiIsectComputer`] tests the exact coverage geometries against the viewport on a background thread and
//!   publishes the result for the owner of the index to apply.
//!
//! Background workers never change the state of the owner directly. They notify it through a [`Messenger`], and the
//! owner picks up the published results from its own thread.
//!
//! Exact geometry operations go through the [`GeometryEngine`] trait. [`GeoEngine`] implements it with the
//! [`geo`](https://docs.rs/geo) crate.
//!
//! Coordinates of all geometries follow the `x = longitude`, `y = latitude` convention.

#![warn(clippy::unwrap_used)]
#![warn(missing_docs)]

mod aoi;
mod catalog;
mod color;
mod engine;
pub mod error;
mod feature_store;
mod index;
mod messenger;
pub mod ordering;
mod outline;
mod selection;
mod state;
mod viewport;

pub use aoi::{AoiIsectComputer, ViewportProvider};
pub use catalog::{
    CatalogListener, ChangeNotifier, CoverageSource, DatasetDescriptor, InMemoryCatalog, Subscription,
};
pub use color::{Color, OUTLINE_PALETTE};
pub use engine::{GeoEngine, GeometryBatch, GeometryEngine, GeometryHandle};
pub use feature_store::{
    BulkModification, Feature, FeatureId, FeatureQuery, FeatureStore, FeatureStyle, FeatureUpdate, LabelStyle,
    NewFeature, StrokeStyle,
};
pub use index::{Comparator, SelectionIndex};
pub use messenger::{DummyMessenger, Messenger};
pub use outline::{OutlineConfig, OutlineGrouping, OutlineSynchronizer, OutlineSynchronizerBuilder};
pub use selection::{ResolutionRange, Selection};
pub use state::{OutlineState, OutlineStateEntry};
pub use viewport::Viewport;

pub use coverage_types;
