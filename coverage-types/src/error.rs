//! Error type used by the crate.

use thiserror::Error;

/// Error enum.
#[derive(Debug, Error)]
pub enum CoverageTypesError {
    /// Geometry conversion error.
    #[error("invalid input geometry: {0}")]
    Conversion(String),
    /// Geometry contains no coordinates.
    #[error("geometry is empty")]
    Empty,
    /// Geometry contains NaN or infinite coordinates.
    #[error("geometry has non-finite coordinate at ({x}, {y})")]
    NonFinite {
        /// X (longitude) value of the offending coordinate.
        x: f64,
        /// Y (latitude) value of the offending coordinate.
        y: f64,
    },
}
