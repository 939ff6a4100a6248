//! Map view state and the approximate in-view test of selections.

use coverage_types::geo::{Datum, GeoBounds, GeoPoint, GeoPoint2d};
use coverage_types::{Envelope, Geometry};

use crate::selection::Selection;

/// State of the map view used to decide which selections are in view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// Focus point of the view.
    pub center: GeoPoint2d,
    /// Map resolution in meters per pixel.
    pub resolution: f64,
    /// Width of the view in pixels.
    pub width: f64,
    /// Height of the view in pixels.
    pub height: f64,
    /// Visible bounds. Can be NaN when the view is not laid out yet.
    pub bounds: GeoBounds,
}

impl Viewport {
    /// Creates a viewport without known bounds.
    pub fn new(center: GeoPoint2d, resolution: f64, width: f64, height: f64) -> Self {
        Self {
            center,
            resolution,
            width,
            height,
            bounds: GeoBounds::new(f64::NAN, f64::NAN, f64::NAN, f64::NAN),
        }
    }

    /// Sets the visible bounds.
    pub fn with_bounds(mut self, bounds: GeoBounds) -> Self {
        self.bounds = bounds;
        self
    }

    /// Areas of interest of the view in the `[-180, 180]` longitude range.
    ///
    /// If the view bounds are not known, they are estimated from the center, resolution and size of the view. The
    /// estimate is only accurate for a nadir view of a planar projection.
    pub fn aoi_envelopes(&self) -> Vec<Envelope> {
        if self.bounds.is_valid() {
            return self.bounds.envelopes();
        }

        let datum = Datum::WGS84;
        let lat = self.center.lat();
        let lon = self.center.lon();

        let half_width = self.width / 2.0 * self.resolution / datum.meters_per_degree_lon(lat);
        let half_height = self.height / 2.0 * self.resolution / datum.meters_per_degree_lat(lat);

        let min_x = lon - half_width;
        let max_x = lon + half_width;
        let min_y = (lat - half_height).max(-90.0);
        let max_y = (lat + half_height).min(90.0);

        let east_wrap = max_x > 180.0;
        let west_wrap = min_x < -180.0;
        match (west_wrap, east_wrap) {
            (true, true) => vec![Envelope::new(-180.0, min_y, 180.0, max_y)],
            (true, false) => vec![
                Envelope::new(-180.0, min_y, max_x, max_y),
                Envelope::new(360.0 + min_x, min_y, 180.0, max_y),
            ],
            (false, true) => vec![
                Envelope::new(min_x, min_y, 180.0, max_y),
                Envelope::new(-180.0, min_y, max_x - 360.0, max_y),
            ],
            (false, false) => vec![Envelope::new(min_x, min_y, max_x, max_y)],
        }
    }

    /// Tests whether the coverage of the selection is in view, regardless of its resolution range.
    ///
    /// Only envelopes are compared, so the result may be a false positive for a sparse coverage, and a false negative
    /// for a tilted view when the bounds are estimated.
    pub fn is_in_view<T>(&self, selection: &Selection<T>) -> bool {
        if selection.bounds().contains(&self.center) {
            return true;
        }

        envelopes_intersect(&self.aoi_envelopes(), selection.coverage())
    }
}

fn envelopes_intersect(aois: &[Envelope], geometry: &Geometry) -> bool {
    let Some(envelope) = geometry.envelope() else {
        return false;
    };

    if !aois.iter().any(|aoi| aoi.intersects(&envelope)) {
        return false;
    }

    match geometry.children() {
        Some(children) => children.iter().any(|child| envelopes_intersect(aois, child)),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use coverage_types::latlon;

    fn selection(geometry: Geometry) -> Selection {
        Selection::new("S", geometry, 100.0, 1.0).expect("invalid selection")
    }

    #[test]
    fn known_bounds_are_used_as_is() {
        let viewport = Viewport::new(latlon!(0.0, 0.0), 10.0, 100.0, 100.0)
            .with_bounds(GeoBounds::new(1.0, -1.0, 2.0, -2.0));
        assert_eq!(viewport.aoi_envelopes(), vec![Envelope::new(-2.0, -1.0, 2.0, 1.0)]);
    }

    #[test]
    fn estimated_bounds_at_equator() {
        let datum = Datum::WGS84;
        let viewport = Viewport::new(latlon!(0.0, 0.0), 100.0, 200.0, 100.0);
        let envelopes = viewport.aoi_envelopes();
        assert_eq!(envelopes.len(), 1);

        let expected_half_width = 100.0 * 100.0 / datum.meters_per_degree_lon(0.0);
        assert_relative_eq!(envelopes[0].max_x, expected_half_width, max_relative = 1e-12);
        assert_relative_eq!(envelopes[0].min_x, -expected_half_width, max_relative = 1e-12);
    }

    #[test]
    fn estimated_bounds_wrap_over_antimeridian() {
        let viewport = Viewport::new(latlon!(0.0, 179.9), 1000.0, 1000.0, 1000.0);
        let envelopes = viewport.aoi_envelopes();
        assert_eq!(envelopes.len(), 2);
        assert_eq!(envelopes[0].max_x, 180.0);
        assert_eq!(envelopes[1].min_x, -180.0);
        assert!(envelopes[1].max_x > -180.0);

        let world = Viewport::new(latlon!(80.0, 0.0), 100_000.0, 1000.0, 1000.0).aoi_envelopes();
        assert_eq!(world.len(), 1);
        assert_eq!(world[0].min_x, -180.0);
        assert_eq!(world[0].max_x, 180.0);
        assert_eq!(world[0].max_y, 90.0);
    }

    #[test]
    fn in_view_checks_collection_members() {
        let viewport = Viewport::new(latlon!(50.0, 50.0), 10.0, 100.0, 100.0)
            .with_bounds(GeoBounds::new(6.0, 4.0, 6.0, 4.0));

        let sparse = Geometry::from(vec![
            Geometry::from(Envelope::new(0.0, 0.0, 1.0, 1.0).into_polygon()),
            Geometry::from(Envelope::new(9.0, 9.0, 10.0, 10.0).into_polygon()),
        ]);
        assert!(!viewport.is_in_view(&selection(sparse)));

        let solid = Geometry::from(Envelope::new(0.0, 0.0, 10.0, 10.0).into_polygon());
        assert!(viewport.is_in_view(&selection(solid)));
    }

    #[test]
    fn center_inside_bounds_is_in_view() {
        let viewport = Viewport::new(latlon!(0.5, 0.5), 10.0, 100.0, 100.0)
            .with_bounds(GeoBounds::new(50.0, 40.0, 50.0, 40.0));
        let geometry = Geometry::from(Envelope::new(0.0, 0.0, 1.0, 1.0).into_polygon());
        assert!(viewport.is_in_view(&selection(geometry)));
    }
}
