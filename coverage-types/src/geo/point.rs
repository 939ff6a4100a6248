use crate::geo::datum::Datum;
use crate::geometry::Point2d;
use approx::{AbsDiffEq, RelativeEq};
use num_traits::{Float, FromPrimitive, One};
use serde::{Deserialize, Serialize};

/// Point on the surface of a celestial body.
pub trait GeoPoint {
    /// Numeric type used to represent coordinates.
    type Num: Float + FromPrimitive;

    /// Latitude in degrees.
    fn lat(&self) -> Self::Num;
    /// Longitude in degrees.
    fn lon(&self) -> Self::Num;

    /// Latitude in radians.
    fn lat_rad(&self) -> Self::Num {
        self.lat().to_radians()
    }

    /// Longitude in radians.
    fn lon_rad(&self) -> Self::Num {
        self.lon().to_radians()
    }

    /// Great-circle distance to `other` in meters, using the semimajor axis of the `datum` as the sphere radius.
    ///
    /// Returns `None` if the radius cannot be represented with `Self::Num`.
    fn distance(&self, other: &impl GeoPoint<Num = Self::Num>, datum: &Datum) -> Option<Self::Num> {
        let radius = Self::Num::from_f64(datum.semimajor())?;
        let two = Self::Num::from_f64(2.0)?;

        let d_lat = other.lat_rad() - self.lat_rad();
        let d_lon = other.lon_rad() - self.lon_rad();

        let sin_lat = (d_lat / two).sin();
        let sin_lon = (d_lon / two).sin();
        let a = sin_lat * sin_lat + self.lat_rad().cos() * other.lat_rad().cos() * sin_lon * sin_lon;
        let c = two * a.sqrt().min(Self::Num::one()).asin();

        Some(radius * c)
    }
}

/// Geo point that can be constructed from coordinates.
pub trait NewGeoPoint<N = f64>: GeoPoint<Num = N> + Sized {
    /// Creates a point from latitude and longitude.
    fn latlon(lat: N, lon: N) -> Self;
    /// Creates a point from longitude and latitude.
    fn lonlat(lon: N, lat: N) -> Self {
        Self::latlon(lat, lon)
    }
}

/// 2d point on the surface of a celestial body.
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Deserialize, Serialize)]
pub struct GeoPoint2d {
    lat: f64,
    lon: f64,
}

impl GeoPoint for GeoPoint2d {
    type Num = f64;

    fn lat(&self) -> f64 {
        self.lat
    }

    fn lon(&self) -> f64 {
        self.lon
    }
}

impl NewGeoPoint<f64> for GeoPoint2d {
    fn latlon(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

impl GeoPoint2d {
    /// Returns true if both coordinates are finite numbers.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite() && self.lon.is_finite()
    }

    /// Converts into a geometry point (`x = lon`, `y = lat`).
    pub fn to_point2d(&self) -> Point2d {
        Point2d::new(self.lon, self.lat)
    }
}

impl From<Point2d> for GeoPoint2d {
    fn from(value: Point2d) -> Self {
        Self {
            lat: value.y,
            lon: value.x,
        }
    }
}

impl From<GeoPoint2d> for Point2d {
    fn from(value: GeoPoint2d) -> Self {
        value.to_point2d()
    }
}

impl AbsDiffEq for GeoPoint2d {
    type Epsilon = f64;

    fn default_epsilon() -> Self::Epsilon {
        f64::default_epsilon()
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: Self::Epsilon) -> bool {
        self.lat.abs_diff_eq(&other.lat, epsilon) && self.lon.abs_diff_eq(&other.lon, epsilon)
    }
}

impl RelativeEq for GeoPoint2d {
    fn default_max_relative() -> Self::Epsilon {
        f64::default_max_relative()
    }

    fn relative_eq(
        &self,
        other: &Self,
        epsilon: Self::Epsilon,
        max_relative: Self::Epsilon,
    ) -> bool {
        self.lat.relative_eq(&other.lat, epsilon, max_relative)
            && self.lon.relative_eq(&other.lon, epsilon, max_relative)
    }
}

/// Creates a new GeoPoint2d from latitude and longitude values (in degrees).
///
/// ```
/// use coverage_types::geo::GeoPoint;
/// use coverage_types::latlon;
///
/// let point = latlon!(38.0, 52.0);
/// assert_eq!(point.lat(), 38.0);
/// ```
#[macro_export]
macro_rules! latlon {
    ($lat:expr, $lon:expr) => {
        <$crate::geo::GeoPoint2d as $crate::geo::NewGeoPoint<f64>>::latlon($lat, $lon)
    };
}
