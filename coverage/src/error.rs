//! Error types used by the crate.

use coverage_types::error::CoverageTypesError;
use thiserror::Error;

use crate::feature_store::FeatureId;

/// Coverage index error type.
#[derive(Debug, Error)]
pub enum CoverageError {
    /// A named entry has no resolvable coverage geometry.
    #[error("no coverage geometry for '{0}'")]
    MissingGeometry(String),
    /// Unary union of the coverages sharing a key produced no result.
    #[error("failed to union coverage for '{0}'")]
    UnionFailure(String),
    /// A feature id captured earlier does not exist in the store anymore.
    #[error("feature {0:?} does not exist anymore")]
    StaleFeature(FeatureId),
    /// Selection cannot be constructed from the given input.
    #[error("invalid selection '{name}': {reason}")]
    InvalidSelection {
        /// Name of the selection.
        name: String,
        /// What is wrong with the input.
        reason: String,
    },
    /// There is no selection with the given name.
    #[error("selection '{0}' not found")]
    NotFound(String),
    /// The structure has been disposed and does not accept requests anymore.
    #[error("already disposed")]
    Disposed,
    /// Failed to start a worker thread.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// Geometry error.
    #[error(transparent)]
    Types(#[from] CoverageTypesError),
}
