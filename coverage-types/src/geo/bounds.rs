use crate::envelope::Envelope;
use crate::geo::point::{GeoPoint, GeoPoint2d, NewGeoPoint};
use crate::geometry::{Geometry, Point2d};
use serde::{Deserialize, Serialize};

/// Geographic bounding box in degrees.
///
/// Bounds with `west > east` cross the antimeridian.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoBounds {
    /// Northern latitude.
    pub north: f64,
    /// Southern latitude.
    pub south: f64,
    /// Eastern longitude.
    pub east: f64,
    /// Western longitude.
    pub west: f64,
}

impl GeoBounds {
    /// Creates new bounds.
    pub fn new(north: f64, south: f64, east: f64, west: f64) -> Self {
        Self {
            north,
            south,
            east,
            west,
        }
    }

    /// Bounds covering the whole world.
    pub fn world() -> Self {
        Self::new(90.0, -90.0, 180.0, -180.0)
    }

    /// Bounds of the envelope with `x` treated as longitude and `y` as latitude.
    pub fn from_envelope(envelope: &Envelope) -> Self {
        Self {
            north: envelope.max_y,
            south: envelope.min_y,
            east: envelope.max_x,
            west: envelope.min_x,
        }
    }

    /// Returns false if any of the bounds values is NaN, which is the case for a map view that is not laid out yet.
    pub fn is_valid(&self) -> bool {
        !(self.north.is_nan() || self.south.is_nan() || self.east.is_nan() || self.west.is_nan())
    }

    /// Returns true if the bounds wrap over the 180th meridian.
    pub fn crosses_antimeridian(&self) -> bool {
        self.west > self.east
    }

    /// Splits the bounds into one or two envelopes in the `[-180, 180]` longitude range.
    pub fn envelopes(&self) -> Vec<Envelope> {
        if self.crosses_antimeridian() {
            vec![
                Envelope::new(self.west, self.south, 180.0, self.north),
                Envelope::new(-180.0, self.south, self.east, self.north),
            ]
        } else {
            vec![Envelope::new(self.west, self.south, self.east, self.north)]
        }
    }

    /// Polygon geometry of the bounds. Bounds crossing the antimeridian produce a collection of two polygons.
    pub fn to_geometry(&self) -> Geometry {
        let mut polygons: Vec<Geometry> = self
            .envelopes()
            .into_iter()
            .map(|envelope| envelope.into_polygon().into())
            .collect();

        if polygons.len() == 1 {
            polygons.remove(0)
        } else {
            Geometry::from(polygons)
        }
    }

    /// Simple rectangle overlap test. Touching edges count as overlap.
    pub fn intersects(&self, other: &GeoBounds) -> bool {
        let other_envelopes = other.envelopes();
        self.envelopes()
            .iter()
            .any(|a| other_envelopes.iter().any(|b| a.intersects(b)))
    }

    /// Returns true if the point lies inside or on the border of the bounds.
    pub fn contains(&self, point: &impl GeoPoint<Num = f64>) -> bool {
        let p = Point2d::new(point.lon(), point.lat());
        self.envelopes().iter().any(|envelope| envelope.contains(&p))
    }

    /// Center of the bounds.
    pub fn center(&self) -> GeoPoint2d {
        let lat = (self.north + self.south) / 2.0;
        let mut lon = (self.east + self.west) / 2.0;
        if self.crosses_antimeridian() {
            lon += 180.0;
            if lon > 180.0 {
                lon -= 360.0;
            }
        }

        GeoPoint2d::latlon(lat, lon)
    }

    /// Longitudinal extent in degrees.
    pub fn width(&self) -> f64 {
        if self.crosses_antimeridian() {
            360.0 - (self.west - self.east)
        } else {
            self.east - self.west
        }
    }

    /// Latitudinal extent in degrees.
    pub fn height(&self) -> f64 {
        self.north - self.south
    }
}

impl From<Envelope> for GeoBounds {
    fn from(value: Envelope) -> Self {
        Self::from_envelope(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn antimeridian_split() {
        let bounds = GeoBounds::new(10.0, -10.0, -170.0, 170.0);
        assert!(bounds.crosses_antimeridian());

        let envelopes = bounds.envelopes();
        assert_eq!(envelopes.len(), 2);
        assert_eq!(envelopes[0], Envelope::new(170.0, -10.0, 180.0, 10.0));
        assert_eq!(envelopes[1], Envelope::new(-180.0, -10.0, -170.0, 10.0));

        assert!(bounds.contains(&crate::latlon!(0.0, 175.0)));
        assert!(bounds.contains(&crate::latlon!(0.0, -175.0)));
        assert!(!bounds.contains(&crate::latlon!(0.0, 0.0)));
        assert_eq!(bounds.width(), 20.0);
        assert_eq!(bounds.center(), crate::latlon!(0.0, 180.0));

        assert!(bounds.to_geometry().is_collection());
    }

    #[test]
    fn nan_bounds_are_invalid() {
        assert!(!GeoBounds::new(f64::NAN, 0.0, 1.0, 0.0).is_valid());
        assert!(GeoBounds::world().is_valid());
    }

    #[test]
    fn intersects_handles_wrapped_bounds() {
        let wrapped = GeoBounds::new(10.0, -10.0, -170.0, 170.0);
        let east = GeoBounds::new(5.0, -5.0, -160.0, -175.0);
        let center = GeoBounds::new(5.0, -5.0, 5.0, -5.0);

        assert!(wrapped.intersects(&east));
        assert!(east.intersects(&wrapped));
        assert!(!wrapped.intersects(&center));
    }
}
