use crate::envelope::Envelope;
use crate::error::CoverageTypesError;
use serde::{Deserialize, Serialize};

/// 2d point with `x = longitude` and `y = latitude` in degrees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point2d {
    /// Longitude.
    pub x: f64,
    /// Latitude.
    pub y: f64,
}

impl Point2d {
    /// Creates a new point.
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Ordered sequence of points.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineString {
    /// Points of the line.
    pub points: Vec<Point2d>,
}

impl LineString {
    /// Creates a new line from the points.
    pub fn new(points: Vec<Point2d>) -> Self {
        Self { points }
    }

    /// Returns true if the first and the last points of the line are equal.
    pub fn is_closed(&self) -> bool {
        match (self.points.first(), self.points.last()) {
            (Some(first), Some(last)) => self.points.len() > 1 && first == last,
            _ => false,
        }
    }
}

impl From<Vec<Point2d>> for LineString {
    fn from(points: Vec<Point2d>) -> Self {
        Self { points }
    }
}

/// Polygon with an exterior ring and optional holes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    /// Outer ring.
    pub exterior: LineString,
    /// Holes.
    pub interiors: Vec<LineString>,
}

impl Polygon {
    /// Creates a new polygon.
    pub fn new(exterior: LineString, interiors: Vec<LineString>) -> Self {
        Self {
            exterior,
            interiors,
        }
    }

    /// Iterates over the exterior ring followed by the holes.
    pub fn iter_rings(&self) -> impl Iterator<Item = &LineString> {
        std::iter::once(&self.exterior).chain(self.interiors.iter())
    }
}

impl From<LineString> for Polygon {
    fn from(exterior: LineString) -> Self {
        Self {
            exterior,
            interiors: vec![],
        }
    }
}

/// Ordered set of child geometries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeometryCollection {
    /// Child geometries.
    pub geometries: Vec<Geometry>,
}

impl GeometryCollection {
    /// Creates a new collection.
    pub fn new(geometries: Vec<Geometry>) -> Self {
        Self { geometries }
    }
}

/// Coverage geometry of a layer selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Geometry {
    /// Single point.
    Point(Point2d),
    /// Line string.
    LineString(LineString),
    /// Polygon.
    Polygon(Polygon),
    /// Collection of other geometries.
    Collection(GeometryCollection),
}

impl Geometry {
    /// Tight envelope over all coordinates of the geometry, recursively for collections.
    ///
    /// Returns `None` if the geometry has no coordinates.
    pub fn envelope(&self) -> Option<Envelope> {
        match self {
            Geometry::Point(p) => Some(Envelope::from_point(p)),
            Geometry::LineString(line) => Envelope::from_points(line.points.iter()),
            Geometry::Polygon(polygon) => Envelope::merge_all(
                polygon
                    .iter_rings()
                    .filter_map(|ring| Envelope::from_points(ring.points.iter())),
            ),
            Geometry::Collection(collection) => {
                Envelope::merge_all(collection.geometries.iter().filter_map(Geometry::envelope))
            }
        }
    }

    /// Returns the children if the geometry is a collection.
    pub fn children(&self) -> Option<&[Geometry]> {
        match self {
            Geometry::Collection(collection) => Some(&collection.geometries),
            _ => None,
        }
    }

    /// Returns true for [`Geometry::Collection`].
    pub fn is_collection(&self) -> bool {
        matches!(self, Geometry::Collection(_))
    }

    /// Non-collection geometries contained in this geometry, in depth-first order.
    pub fn leaves(&self) -> Vec<&Geometry> {
        let mut leaves = vec![];
        self.collect_leaves(&mut leaves);
        leaves
    }

    fn collect_leaves<'a>(&'a self, leaves: &mut Vec<&'a Geometry>) {
        match self {
            Geometry::Collection(collection) => {
                for child in &collection.geometries {
                    child.collect_leaves(leaves);
                }
            }
            other => leaves.push(other),
        }
    }

    /// Calls `f` for every coordinate of the geometry.
    pub fn for_each_point(&self, f: &mut impl FnMut(&Point2d)) {
        match self {
            Geometry::Point(p) => f(p),
            Geometry::LineString(line) => line.points.iter().for_each(f),
            Geometry::Polygon(polygon) => {
                for ring in polygon.iter_rings() {
                    ring.points.iter().for_each(&mut *f);
                }
            }
            Geometry::Collection(collection) => {
                for child in &collection.geometries {
                    child.for_each_point(f);
                }
            }
        }
    }

    /// Checks that the geometry has at least one coordinate and all coordinates are finite.
    pub fn validate(&self) -> Result<(), CoverageTypesError> {
        let mut count = 0usize;
        let mut non_finite = None;
        self.for_each_point(&mut |p: &Point2d| {
            count += 1;
            if non_finite.is_none() && !(p.x.is_finite() && p.y.is_finite()) {
                non_finite = Some(*p);
            }
        });

        if let Some(p) = non_finite {
            return Err(CoverageTypesError::NonFinite { x: p.x, y: p.y });
        }
        if count == 0 {
            return Err(CoverageTypesError::Empty);
        }

        Ok(())
    }
}

impl From<Point2d> for Geometry {
    fn from(value: Point2d) -> Self {
        Self::Point(value)
    }
}

impl From<LineString> for Geometry {
    fn from(value: LineString) -> Self {
        Self::LineString(value)
    }
}

impl From<Polygon> for Geometry {
    fn from(value: Polygon) -> Self {
        Self::Polygon(value)
    }
}

impl From<GeometryCollection> for Geometry {
    fn from(value: GeometryCollection) -> Self {
        Self::Collection(value)
    }
}

impl From<Vec<Geometry>> for Geometry {
    fn from(value: Vec<Geometry>) -> Self {
        Self::Collection(GeometryCollection::new(value))
    }
}
