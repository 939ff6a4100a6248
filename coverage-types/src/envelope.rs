use crate::geometry::{LineString, Point2d, Polygon};
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding rectangle of a geometry.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Minimum x (west).
    pub min_x: f64,
    /// Minimum y (south).
    pub min_y: f64,
    /// Maximum x (east).
    pub max_x: f64,
    /// Maximum y (north).
    pub max_y: f64,
}

impl Envelope {
    /// Creates a new envelope from its corners.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Degenerate envelope containing only the given point.
    pub fn from_point(p: &Point2d) -> Self {
        Self {
            min_x: p.x,
            max_x: p.x,
            min_y: p.y,
            max_y: p.y,
        }
    }

    /// Tight envelope over the given points. Returns `None` if the iterator is empty.
    pub fn from_points<'a>(mut points: impl Iterator<Item = &'a Point2d>) -> Option<Self> {
        let first = points.next()?;
        let mut x_min = first.x;
        let mut y_min = first.y;
        let mut x_max = first.x;
        let mut y_max = first.y;

        for p in points {
            if x_min > p.x {
                x_min = p.x;
            }
            if y_min > p.y {
                y_min = p.y;
            }
            if x_max < p.x {
                x_max = p.x;
            }
            if y_max < p.y {
                y_max = p.y;
            }
        }

        Some(Self::new(x_min, y_min, x_max, y_max))
    }

    /// Merges all envelopes from the iterator into one. Returns `None` if the iterator is empty.
    pub fn merge_all(iter: impl IntoIterator<Item = Envelope>) -> Option<Self> {
        let mut iter = iter.into_iter();
        let mut curr = iter.next()?;
        for envelope in iter {
            curr = curr.merge(envelope);
        }

        Some(curr)
    }

    /// Width of the envelope (`max_x - min_x`).
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    /// Height of the envelope (`max_y - min_y`).
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Smallest envelope containing both `self` and `other`.
    pub fn merge(&self, other: Self) -> Self {
        Self {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    /// Returns true if the point lies inside or on the border of the envelope.
    pub fn contains(&self, point: &Point2d) -> bool {
        self.min_x <= point.x
            && self.max_x >= point.x
            && self.min_y <= point.y
            && self.max_y >= point.y
    }

    /// Returns true if the two envelopes overlap. Touching borders count as overlap.
    pub fn intersects(&self, other: &Envelope) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }

    /// Center point of the envelope.
    pub fn center(&self) -> Point2d {
        Point2d::new(
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    /// Returns true if none of the envelope values is NaN.
    pub fn is_valid(&self) -> bool {
        !(self.min_x.is_nan() || self.min_y.is_nan() || self.max_x.is_nan() || self.max_y.is_nan())
    }

    /// Corner points in counter-clockwise order starting from the south-west corner.
    pub fn into_quadrangle(self) -> [Point2d; 4] {
        [
            Point2d::new(self.min_x, self.min_y),
            Point2d::new(self.max_x, self.min_y),
            Point2d::new(self.max_x, self.max_y),
            Point2d::new(self.min_x, self.max_y),
        ]
    }

    /// Converts the envelope into a closed polygon without holes.
    pub fn into_polygon(self) -> Polygon {
        let mut points = Vec::from(self.into_quadrangle());
        points.push(points[0]);
        Polygon::new(LineString::new(points), vec![])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_points_is_tight() {
        let points = [
            Point2d::new(1.0, 5.0),
            Point2d::new(-3.0, 2.0),
            Point2d::new(4.0, -1.0),
        ];
        let envelope = Envelope::from_points(points.iter()).expect("no envelope");
        assert_eq!(envelope, Envelope::new(-3.0, -1.0, 4.0, 5.0));

        assert!(Envelope::from_points(std::iter::empty()).is_none());
    }

    #[test]
    fn intersects_includes_touching() {
        let a = Envelope::new(0.0, 0.0, 10.0, 10.0);
        assert!(a.intersects(&Envelope::new(10.0, 10.0, 20.0, 20.0)));
        assert!(a.intersects(&Envelope::new(2.0, 2.0, 3.0, 3.0)));
        assert!(!a.intersects(&Envelope::new(10.1, 0.0, 20.0, 10.0)));
    }

    #[test]
    fn degenerate_envelope_contains_its_point() {
        let p = Point2d::new(12.5, -7.0);
        assert!(Envelope::from_point(&p).contains(&p));
    }

    #[test]
    fn into_polygon_is_closed() {
        let polygon = Envelope::new(0.0, 0.0, 1.0, 2.0).into_polygon();
        let points = &polygon.exterior.points;
        assert_eq!(points.len(), 5);
        assert_eq!(points.first(), points.last());
    }
}
