// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

//! The only place persisted PostGIS geometry meets `geo` geometry.
//! Everything above the store layer works in plain `geo` types.

use crate::errors::StoreError;
use postgis_diesel::types::{
    GeometryCollection, GeometryContainer, LineString as PgLineString,
    MultiLineString as PgMultiLineString, MultiPoint as PgMultiPoint,
    MultiPolygon as PgMultiPolygon, Point as PgPoint, Polygon as PgPolygon,
};

pub fn coord_to_diesel(coord: geo::Coord) -> PgPoint {
    PgPoint::new(coord.x, coord.y, Some(crate::WGS_84_SRID))
}

pub fn diesel_point_to_coord(point: &PgPoint) -> geo::Coord {
    geo::Coord {
        x: point.x,
        y: point.y,
    }
}

pub fn linestring_geo_to_diesel(linestring_geo: &geo::LineString) -> PgLineString<PgPoint> {
    PgLineString {
        points: linestring_geo.0.iter().copied().map(coord_to_diesel).collect(),
        srid: Some(crate::WGS_84_SRID),
    }
}

pub fn diesel_linestring_to_geo(linestring_diesel: &PgLineString<PgPoint>) -> geo::LineString {
    geo::LineString::from_iter(
        linestring_diesel
            .points
            .iter()
            .map(|point| geo::Coord {
                x: point.x,
                y: point.y,
            }),
    )
}

pub fn polygon_geo_to_diesel(polygon_geo: &geo::Polygon) -> PgPolygon<PgPoint> {
    let rings = std::iter::once(polygon_geo.exterior())
        .chain(polygon_geo.interiors().iter())
        .map(|ring| ring.0.iter().copied().map(coord_to_diesel).collect())
        .collect();

    PgPolygon {
        rings,
        srid: Some(crate::WGS_84_SRID),
    }
}

pub fn diesel_polygon_to_geo(
    polygon_diesel: &PgPolygon<PgPoint>,
) -> Result<geo::Polygon, StoreError> {
    let mut rings = polygon_diesel.rings.iter().map(|ring| {
        geo::LineString::from_iter(ring.iter().map(|point| geo::Coord {
            x: point.x,
            y: point.y,
        }))
    });

    let exterior = rings
        .next()
        .ok_or_else(|| StoreError::Geometry("polygon without an exterior ring".to_string()))?;

    Ok(geo::Polygon::new(exterior, rings.collect()))
}

pub fn geometry_geo_to_diesel(
    geometry: &geo::Geometry,
) -> Result<GeometryContainer<PgPoint>, StoreError> {
    let srid = Some(crate::WGS_84_SRID);

    let container = match geometry {
        geo::Geometry::Point(point) => GeometryContainer::Point(coord_to_diesel(point.0)),
        geo::Geometry::Line(line) => GeometryContainer::LineString(linestring_geo_to_diesel(
            &geo::LineString::from(vec![line.start, line.end]),
        )),
        geo::Geometry::LineString(line) => {
            GeometryContainer::LineString(linestring_geo_to_diesel(line))
        }
        geo::Geometry::Polygon(polygon) => {
            GeometryContainer::Polygon(polygon_geo_to_diesel(polygon))
        }
        geo::Geometry::Rect(rect) => {
            GeometryContainer::Polygon(polygon_geo_to_diesel(&rect.to_polygon()))
        }
        geo::Geometry::Triangle(triangle) => {
            GeometryContainer::Polygon(polygon_geo_to_diesel(&triangle.to_polygon()))
        }
        geo::Geometry::MultiPoint(points) => GeometryContainer::MultiPoint(PgMultiPoint {
            points: points.iter().map(|point| coord_to_diesel(point.0)).collect(),
            srid,
        }),
        geo::Geometry::MultiLineString(lines) => {
            GeometryContainer::MultiLineString(PgMultiLineString {
                lines: lines.iter().map(linestring_geo_to_diesel).collect(),
                srid,
            })
        }
        geo::Geometry::MultiPolygon(polygons) => {
            GeometryContainer::MultiPolygon(PgMultiPolygon {
                polygons: polygons.iter().map(polygon_geo_to_diesel).collect(),
                srid,
            })
        }
        geo::Geometry::GeometryCollection(collection) => {
            GeometryContainer::GeometryCollection(GeometryCollection {
                geometries: collection
                    .iter()
                    .map(geometry_geo_to_diesel)
                    .collect::<Result<Vec<_>, _>>()?,
                srid,
            })
        }
    };

    Ok(container)
}

pub fn diesel_geometry_to_geo(
    container: &GeometryContainer<PgPoint>,
) -> Result<geo::Geometry, StoreError> {
    let geometry = match container {
        GeometryContainer::Point(point) => geo::Geometry::Point(geo::Point::new(point.x, point.y)),
        GeometryContainer::LineString(line) => {
            geo::Geometry::LineString(diesel_linestring_to_geo(line))
        }
        GeometryContainer::Polygon(polygon) => {
            geo::Geometry::Polygon(diesel_polygon_to_geo(polygon)?)
        }
        GeometryContainer::MultiPoint(points) => geo::Geometry::MultiPoint(geo::MultiPoint::new(
            points
                .points
                .iter()
                .map(|point| geo::Point::new(point.x, point.y))
                .collect(),
        )),
        GeometryContainer::MultiLineString(lines) => {
            geo::Geometry::MultiLineString(geo::MultiLineString::new(
                lines.lines.iter().map(diesel_linestring_to_geo).collect(),
            ))
        }
        GeometryContainer::MultiPolygon(polygons) => {
            geo::Geometry::MultiPolygon(geo::MultiPolygon::new(
                polygons
                    .polygons
                    .iter()
                    .map(diesel_polygon_to_geo)
                    .collect::<Result<Vec<_>, _>>()?,
            ))
        }
        GeometryContainer::GeometryCollection(collection) => {
            geo::Geometry::GeometryCollection(geo::GeometryCollection::new_from(
                collection
                    .geometries
                    .iter()
                    .map(diesel_geometry_to_geo)
                    .collect::<Result<Vec<_>, _>>()?,
            ))
        }
    };

    Ok(geometry)
}
