//! Geometries in geographic coordinates (latitude and longitude) (see [`GeoPoint`]), great-circle distances and
//! geographic bounds (see [`GeoBounds`]).

mod bounds;
mod datum;
mod point;

pub use bounds::GeoBounds;
pub use datum::Datum;
pub use point::{GeoPoint, GeoPoint2d, NewGeoPoint};
