use geo_types::{Coord, Geometry as GtGeometry};

use crate::error::CoverageTypesError;
use crate::geometry::{Geometry, GeometryCollection, LineString, Point2d, Polygon};

impl From<Point2d> for Coord<f64> {
    fn from(value: Point2d) -> Self {
        Coord {
            x: value.x,
            y: value.y,
        }
    }
}

impl From<Coord<f64>> for Point2d {
    fn from(value: Coord<f64>) -> Self {
        Point2d::new(value.x, value.y)
    }
}

impl From<&LineString> for geo_types::LineString<f64> {
    fn from(value: &LineString) -> Self {
        geo_types::LineString::new(value.points.iter().map(|p| Coord::from(*p)).collect())
    }
}

impl From<&geo_types::LineString<f64>> for LineString {
    fn from(value: &geo_types::LineString<f64>) -> Self {
        LineString::new(value.0.iter().map(|c| Point2d::from(*c)).collect())
    }
}

impl From<&Polygon> for geo_types::Polygon<f64> {
    fn from(value: &Polygon) -> Self {
        geo_types::Polygon::new(
            (&value.exterior).into(),
            value.interiors.iter().map(|ring| ring.into()).collect(),
        )
    }
}

impl From<&geo_types::Polygon<f64>> for Polygon {
    fn from(value: &geo_types::Polygon<f64>) -> Self {
        Polygon::new(
            value.exterior().into(),
            value.interiors().iter().map(|ring| ring.into()).collect(),
        )
    }
}

impl From<&Geometry> for GtGeometry<f64> {
    fn from(value: &Geometry) -> Self {
        match value {
            Geometry::Point(p) => GtGeometry::Point(geo_types::Point::from(Coord::from(*p))),
            Geometry::LineString(line) => GtGeometry::LineString(line.into()),
            Geometry::Polygon(polygon) => GtGeometry::Polygon(polygon.into()),
            Geometry::Collection(collection) => {
                GtGeometry::GeometryCollection(geo_types::GeometryCollection::new_from(
                    collection.geometries.iter().map(GtGeometry::from).collect(),
                ))
            }
        }
    }
}

impl TryFrom<&GtGeometry<f64>> for Geometry {
    type Error = CoverageTypesError;

    fn try_from(value: &GtGeometry<f64>) -> Result<Self, Self::Error> {
        let geometry = match value {
            GtGeometry::Point(p) => Geometry::Point(p.0.into()),
            GtGeometry::Line(line) => {
                Geometry::LineString(LineString::new(vec![line.start.into(), line.end.into()]))
            }
            GtGeometry::LineString(line) => Geometry::LineString(line.into()),
            GtGeometry::Polygon(polygon) => Geometry::Polygon(polygon.into()),
            GtGeometry::MultiPoint(points) => Geometry::Collection(GeometryCollection::new(
                points.iter().map(|p| Geometry::Point(p.0.into())).collect(),
            )),
            GtGeometry::MultiLineString(lines) => Geometry::Collection(GeometryCollection::new(
                lines.iter().map(|l| Geometry::LineString(l.into())).collect(),
            )),
            GtGeometry::MultiPolygon(polygons) => Geometry::Collection(GeometryCollection::new(
                polygons.iter().map(|p| Geometry::Polygon(p.into())).collect(),
            )),
            GtGeometry::GeometryCollection(collection) => {
                Geometry::Collection(GeometryCollection::new(
                    collection
                        .iter()
                        .map(Geometry::try_from)
                        .collect::<Result<Vec<_>, _>>()?,
                ))
            }
            GtGeometry::Rect(rect) => Geometry::Polygon((&rect.to_polygon()).into()),
            GtGeometry::Triangle(triangle) => Geometry::Polygon((&triangle.to_polygon()).into()),
        };

        geometry.validate().map_err(|err| {
            CoverageTypesError::Conversion(format!("converted geometry is not valid: {err}"))
        })?;

        Ok(geometry)
    }
}
