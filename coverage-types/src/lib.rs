//! Geometry primitives used to describe where on the globe a layer selection has data.
//!
//! The crate provides a closed set of geometry shapes ([`Geometry`]), tight axis-aligned envelopes ([`Envelope`]),
//! and geographic helpers in the [`geo`] module: points with latitude/longitude ([`geo::GeoPoint2d`]), great-circle
//! distance and [`geo::GeoBounds`] with antimeridian handling.
//!
//! Geometry coordinates follow the `x = longitude`, `y = latitude` convention.

#![warn(clippy::unwrap_used)]
#![warn(missing_docs)]

mod envelope;
pub mod error;
pub mod geo;
mod geometry;

#[cfg(feature = "geo-types")]
mod geo_types;

pub use envelope::Envelope;
pub use geometry::{Geometry, GeometryCollection, LineString, Point2d, Polygon};
