//! Named layer selections with coverage geometry and a valid resolution range.

use std::fmt::{Display, Formatter};
use std::sync::Arc;

use coverage_types::geo::{Datum, GeoBounds, GeoPoint, GeoPoint2d};
use coverage_types::Geometry;

use crate::error::CoverageError;

/// A named, georeferenced dataset entry with coverage geometry and a valid resolution range.
///
/// Resolutions are ground sample distances in meters per pixel. `min_resolution` is the coarsest resolution the
/// selection can be displayed at and `max_resolution` the finest one, so `min_resolution >= max_resolution`.
///
/// The selection bounds are computed once on construction from the coverage envelope. The `tag` is an arbitrary
/// payload attached by the owner of the selection; it survives incremental index rebuilds.
#[derive(Debug, Clone)]
pub struct Selection<T = ()> {
    name: String,
    coverage: Arc<Geometry>,
    min_resolution: f64,
    max_resolution: f64,
    bounds: GeoBounds,
    tag: Option<T>,
}

impl<T> Selection<T> {
    /// Creates a new selection.
    ///
    /// Fails if the coverage has no coordinates or non-finite coordinates, if any of the resolutions is NaN, or if
    /// `min_resolution < max_resolution`.
    pub fn new(
        name: impl Into<String>,
        coverage: impl Into<Arc<Geometry>>,
        min_resolution: f64,
        max_resolution: f64,
    ) -> Result<Self, CoverageError> {
        let name = name.into();
        let coverage = coverage.into();

        let invalid = |reason: String| CoverageError::InvalidSelection {
            name: name.clone(),
            reason,
        };

        coverage
            .validate()
            .map_err(|err| invalid(err.to_string()))?;
        let envelope = coverage
            .envelope()
            .ok_or_else(|| invalid("coverage has no envelope".into()))?;

        if min_resolution.is_nan() || max_resolution.is_nan() {
            return Err(invalid("resolution is NaN".into()));
        }
        if min_resolution < max_resolution {
            return Err(invalid(format!(
                "minimum resolution {min_resolution} is finer than maximum resolution {max_resolution}"
            )));
        }

        Ok(Self {
            name,
            coverage,
            min_resolution,
            max_resolution,
            bounds: GeoBounds::from_envelope(&envelope),
            tag: None,
        })
    }

    /// Sets the tag of the selection.
    pub fn with_tag(mut self, tag: T) -> Self {
        self.tag = Some(tag);
        self
    }

    /// Name of the selection. Unique within an index.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Coverage geometry.
    pub fn coverage(&self) -> &Arc<Geometry> {
        &self.coverage
    }

    /// Coarsest resolution in meters per pixel.
    pub fn min_resolution(&self) -> f64 {
        self.min_resolution
    }

    /// Finest resolution in meters per pixel.
    pub fn max_resolution(&self) -> f64 {
        self.max_resolution
    }

    /// Resolution range for display.
    pub fn resolution_range(&self) -> ResolutionRange {
        ResolutionRange::new(self.min_resolution, self.max_resolution)
    }

    /// Bounds of the coverage.
    pub fn bounds(&self) -> &GeoBounds {
        &self.bounds
    }

    /// Northern latitude of the coverage.
    pub fn north(&self) -> f64 {
        self.bounds.north
    }

    /// Southern latitude of the coverage.
    pub fn south(&self) -> f64 {
        self.bounds.south
    }

    /// Eastern longitude of the coverage.
    pub fn east(&self) -> f64 {
        self.bounds.east
    }

    /// Western longitude of the coverage.
    pub fn west(&self) -> f64 {
        self.bounds.west
    }

    /// Tag of the selection.
    pub fn tag(&self) -> Option<&T> {
        self.tag.as_ref()
    }

    /// Mutable tag of the selection.
    pub fn tag_mut(&mut self) -> Option<&mut T> {
        self.tag.as_mut()
    }

    /// Replaces the tag, returning the previous one.
    pub fn set_tag(&mut self, tag: Option<T>) -> Option<T> {
        std::mem::replace(&mut self.tag, tag)
    }

    /// Returns true if the selection bounds overlap the given bounds. The coverage geometry itself is not tested.
    pub fn intersects_bounds(&self, bounds: &GeoBounds) -> bool {
        self.bounds.intersects(bounds)
    }

    /// Approximate point containment.
    ///
    /// The point must lie in the selection bounds and, for collection coverages, in the envelope of at least one leaf
    /// of the collection. Polygon and line containment is not tested: any non-collection geometry whose envelope
    /// contains the point is considered to contain it.
    pub fn contains_point(&self, point: &GeoPoint2d) -> bool {
        self.bounds.contains(point) && covers_point(&self.coverage, point)
    }

    /// Distance in meters from the point to the coverage used for nearest selection queries.
    ///
    /// Zero if the point is inside the envelope of the coverage. Otherwise, the minimum great-circle distance to the
    /// envelope centers of the collection members or to the envelope center of a plain geometry.
    pub fn distance_to(&self, point: &GeoPoint2d) -> f64 {
        if self.bounds.contains(point) {
            return 0.0;
        }

        coverage_distance(&self.coverage, point).unwrap_or(f64::INFINITY)
    }
}

impl<T> PartialEq for Selection<T> {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

fn covers_point(geometry: &Geometry, point: &GeoPoint2d) -> bool {
    match geometry {
        Geometry::Collection(collection) => collection.geometries.iter().any(|child| {
            child
                .envelope()
                .is_some_and(|envelope| GeoBounds::from_envelope(&envelope).contains(point))
                && covers_point(child, point)
        }),
        // XXX: no real polygon/line containment, matches the envelope test above
        _ => true,
    }
}

fn coverage_distance(geometry: &Geometry, point: &GeoPoint2d) -> Option<f64> {
    let envelope = geometry.envelope()?;
    let bounds = GeoBounds::from_envelope(&envelope);
    if bounds.contains(point) {
        return Some(0.0);
    }

    match geometry {
        Geometry::Collection(collection) => {
            let mut min: Option<f64> = None;
            for child in &collection.geometries {
                let Some(distance) = coverage_distance(child, point) else {
                    continue;
                };
                if min.map_or(true, |m| distance < m) {
                    min = Some(distance);
                }
            }
            min
        }
        _ => bounds.center().distance(point, &Datum::WGS84),
    }
}

/// Resolution range formatted for display, e.g. `"5km - 10m"` or `"0.50m"`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolutionRange {
    /// Coarsest resolution in meters per pixel.
    pub min: f64,
    /// Finest resolution in meters per pixel.
    pub max: f64,
}

impl ResolutionRange {
    /// Creates a new range.
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    fn format_value(value: f64) -> String {
        if value > 1000.0 {
            format!("{}km", (value / 1000.0).round())
        } else if value < 1.0 {
            format!("{:.2}m", (value * 100.0).round() / 100.0)
        } else {
            format!("{}m", value.round())
        }
    }
}

impl Display for ResolutionRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let min = Self::format_value(self.min);
        if self.min == self.max {
            return write!(f, "{min}");
        }

        write!(f, "{min} - {}", Self::format_value(self.max))
    }
}
