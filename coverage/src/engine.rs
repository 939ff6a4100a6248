//! Exact geometry operations used for coverage unions and area-of-interest intersections.
//!
//! Geometries are loaded into a [`GeometryBatch`] and referred to by [`GeometryHandle`]s. All geometries of a batch
//! are released together when the batch is dropped.

use std::panic::AssertUnwindSafe;

use coverage_types::geo::GeoBounds;
use coverage_types::{Geometry, GeometryCollection};
use geo::{BooleanOps, Intersects};
use geo_types::{Geometry as GtGeometry, MultiPolygon, Polygon as GtPolygon};

/// Reference to a geometry loaded into a [`GeometryBatch`]. Only valid within the batch that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GeometryHandle(usize);

/// Provider of geometry batches.
pub trait GeometryEngine: Send + Sync {
    /// Starts a new batch.
    fn begin_batch(&self) -> Box<dyn GeometryBatch + '_>;
}

/// Set of geometries loaded into the engine. Ending the batch is done by dropping it.
pub trait GeometryBatch {
    /// Loads a geometry into the batch.
    fn create_geometry(&mut self, geometry: &Geometry) -> GeometryHandle;

    /// Loads a polygon covering the bounds. Bounds crossing the antimeridian produce two polygons.
    fn create_polygon(&mut self, bounds: &GeoBounds) -> GeometryHandle {
        self.create_geometry(&bounds.to_geometry())
    }

    /// Exact intersection test. Returns false if any of the handles does not belong to the batch.
    fn intersects(&self, a: GeometryHandle, b: GeometryHandle) -> bool;

    /// Unary union of all polygonal members of the geometry.
    ///
    /// Returns `None` if the geometry has no polygonal members or the union cannot be computed.
    fn unary_union(&mut self, handle: GeometryHandle) -> Option<Geometry>;
}

/// Geometry engine based on the `geo` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct GeoEngine;

impl GeometryEngine for GeoEngine {
    fn begin_batch(&self) -> Box<dyn GeometryBatch + '_> {
        Box::new(GeoBatch::default())
    }
}

#[derive(Default)]
struct GeoBatch {
    geometries: Vec<GtGeometry<f64>>,
}

impl GeometryBatch for GeoBatch {
    fn create_geometry(&mut self, geometry: &Geometry) -> GeometryHandle {
        self.geometries.push(geometry.into());
        GeometryHandle(self.geometries.len() - 1)
    }

    fn intersects(&self, a: GeometryHandle, b: GeometryHandle) -> bool {
        match (self.geometries.get(a.0), self.geometries.get(b.0)) {
            (Some(a), Some(b)) => a.intersects(b),
            _ => false,
        }
    }

    fn unary_union(&mut self, handle: GeometryHandle) -> Option<Geometry> {
        let mut polygons = vec![];
        collect_polygons(self.geometries.get(handle.0)?, &mut polygons);

        let mut polygons = polygons.into_iter();
        let first = MultiPolygon::new(vec![polygons.next()?]);

        // Sweep line of the boolean operations can panic on degenerate input.
        let union = std::panic::catch_unwind(AssertUnwindSafe(|| {
            polygons.fold(first, |acc, polygon| {
                acc.union(&MultiPolygon::new(vec![polygon]))
            })
        }));

        let union = match union {
            Ok(union) => union,
            Err(_) => {
                log::warn!("Boolean union panicked, treating as empty result");
                return None;
            }
        };

        let mut result: Vec<Geometry> = union
            .iter()
            .map(|polygon| Geometry::Polygon(polygon.into()))
            .collect();

        match result.len() {
            0 => None,
            1 => result.pop(),
            _ => Some(Geometry::Collection(GeometryCollection::new(result))),
        }
    }
}

impl Drop for GeoBatch {
    fn drop(&mut self) {
        log::trace!("Releasing {} batch geometries", self.geometries.len());
    }
}

fn collect_polygons(geometry: &GtGeometry<f64>, target: &mut Vec<GtPolygon<f64>>) {
    match geometry {
        GtGeometry::Polygon(polygon) => target.push(polygon.clone()),
        GtGeometry::MultiPolygon(polygons) => target.extend(polygons.iter().cloned()),
        GtGeometry::Rect(rect) => target.push(rect.to_polygon()),
        GtGeometry::Triangle(triangle) => target.push(triangle.to_polygon()),
        GtGeometry::GeometryCollection(collection) => {
            for member in collection.iter() {
                collect_polygons(member, target);
            }
        }
        _ => {}
    }
}
