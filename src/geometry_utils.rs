// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

use geo::{Coord, Geometry, Intersects, LineString, MultiPolygon, Polygon, Simplify};
use std::f64::consts::PI;

/// Default half-width of the corridor around a route, in metres.
pub const DEFAULT_CORRIDOR_BUFFER_M: f64 = 500.0;

/// Half-width used to turn a point or line closure into an exclusion polygon.
pub const CLOSURE_EXCLUSION_BUFFER_M: f64 = 25.0;

// vertices used for each half circle of a capsule
const ARC_SEGMENTS: usize = 8;

// --- Metric Projection Helper (Local Tangent Plane) ---

/// A Local Tangent Plane projection centered at a specific (lon0, lat0).
/// Projects (lon, lat) to (x, y) meters and back.
/// Equirectangular, which holds up over the length of a dispatch route.
/// x = R * cos(lat0) * dlon
/// y = R * dlat
#[derive(Debug, Clone, Copy)]
pub struct LocalTangentPlane {
    origin_lon_rad: f64,
    origin_lat_rad: f64,
    cos_lat0: f64,
    radius: f64,
}

impl LocalTangentPlane {
    const EARTH_RADIUS: f64 = 6_371_007.2;

    pub fn new(lon0: f64, lat0: f64) -> Self {
        let origin_lon_rad = lon0.to_radians();
        let origin_lat_rad = lat0.to_radians();
        Self {
            origin_lon_rad,
            origin_lat_rad,
            cos_lat0: origin_lat_rad.cos(),
            radius: Self::EARTH_RADIUS,
        }
    }

    /// Project (lon, lat) to (x, y) meters
    pub fn project(&self, lon: f64, lat: f64) -> (f64, f64) {
        let dlon = lon.to_radians() - self.origin_lon_rad;
        let dlat = lat.to_radians() - self.origin_lat_rad;
        let x = self.radius * self.cos_lat0 * dlon;
        let y = self.radius * dlat;
        (x, y)
    }

    /// Unproject (x, y) meters to (lon, lat)
    pub fn unproject(&self, x: f64, y: f64) -> (f64, f64) {
        let dlon = x / (self.radius * self.cos_lat0);
        let dlat = y / self.radius;
        let lon_rad = self.origin_lon_rad + dlon;
        let lat_rad = self.origin_lat_rad + dlat;
        (lon_rad.to_degrees(), lat_rad.to_degrees())
    }

    fn project_coord(&self, c: Coord) -> Coord {
        let (x, y) = self.project(c.x, c.y);
        Coord { x, y }
    }

    fn unproject_polygon(&self, polygon: Polygon) -> Polygon {
        let (exterior, _) = polygon.into_inner();
        let ring: LineString = exterior
            .into_iter()
            .map(|c| {
                let (x, y) = self.unproject(c.x, c.y);
                Coord { x, y }
            })
            .collect();
        Polygon::new(ring, vec![])
    }
}

// --- Metric Geometry Functions (XY Space) ---

/// Closed polygon around the segment a-b at distance `radius`, with round caps.
fn capsule_metric(a: Coord, b: Coord, radius: f64) -> Polygon {
    let dx = b.x - a.x;
    let dy = b.y - a.y;

    if dx.hypot(dy) < f64::EPSILON {
        return circle_metric(a, radius);
    }

    let heading = dy.atan2(dx);
    let mut ring = Vec::with_capacity(2 * ARC_SEGMENTS + 3);

    // cap around b sweeps from the right side to the left side, cap around a back again
    for i in 0..=ARC_SEGMENTS {
        let angle = heading - PI / 2.0 + PI * (i as f64) / (ARC_SEGMENTS as f64);
        ring.push(Coord {
            x: b.x + radius * angle.cos(),
            y: b.y + radius * angle.sin(),
        });
    }
    for i in 0..=ARC_SEGMENTS {
        let angle = heading + PI / 2.0 + PI * (i as f64) / (ARC_SEGMENTS as f64);
        ring.push(Coord {
            x: a.x + radius * angle.cos(),
            y: a.y + radius * angle.sin(),
        });
    }
    ring.push(ring[0]);

    Polygon::new(LineString::new(ring), vec![])
}

fn circle_metric(centre: Coord, radius: f64) -> Polygon {
    let steps = ARC_SEGMENTS * 2;
    let mut ring: Vec<Coord> = (0..steps)
        .map(|i| {
            let angle = 2.0 * PI * (i as f64) / (steps as f64);
            Coord {
                x: centre.x + radius * angle.cos(),
                y: centre.y + radius * angle.sin(),
            }
        })
        .collect();
    ring.push(ring[0]);
    Polygon::new(LineString::new(ring), vec![])
}

/// Buffers a lon/lat linestring by `buffer_m` metres.
///
/// The result is a set of overlapping capsules, one per (simplified) segment, rather than
/// their union. It is only ever used for intersection tests, where the overlap does not matter.
pub fn buffer_linestring(line: &LineString, buffer_m: f64) -> Option<MultiPolygon> {
    let first = line.0.first()?;
    let ltp = LocalTangentPlane::new(first.x, first.y);

    let metric: LineString = line.0.iter().map(|c| ltp.project_coord(*c)).collect();

    let capsules: Vec<Polygon> = match metric.0.len() {
        0 => return None,
        1 => vec![circle_metric(metric.0[0], buffer_m)],
        2 => vec![capsule_metric(metric.0[0], metric.0[1], buffer_m)],
        // no point keeping vertices that move the line by less than a tenth of the buffer
        _ => metric
            .simplify(&(buffer_m / 10.0))
            .lines()
            .map(|segment| capsule_metric(segment.start, segment.end, buffer_m))
            .collect(),
    };

    Some(MultiPolygon::new(
        capsules
            .into_iter()
            .map(|polygon| ltp.unproject_polygon(polygon))
            .collect(),
    ))
}

/// Corridor polygon around a route, used to match traffic events against it.
pub fn route_corridor(route: &LineString, buffer_m: f64) -> Option<MultiPolygon> {
    buffer_linestring(route, buffer_m)
}

/// Polygons that a routing engine can be told to avoid for a given closure geometry.
///
/// Areal geometry is used as-is; points and lines are buffered into small polygons.
pub fn exclusion_polygons(geometry: &Geometry, buffer_m: f64) -> Vec<Polygon> {
    match geometry {
        Geometry::Polygon(polygon) => vec![polygon.clone()],
        Geometry::MultiPolygon(multi) => multi.0.clone(),
        Geometry::Rect(rect) => vec![rect.to_polygon()],
        Geometry::Triangle(triangle) => vec![triangle.to_polygon()],
        Geometry::Point(point) => buffer_linestring(&LineString::from(vec![point.0]), buffer_m)
            .map(|m| m.0)
            .unwrap_or_default(),
        Geometry::MultiPoint(points) => points
            .iter()
            .filter_map(|point| buffer_linestring(&LineString::from(vec![point.0]), buffer_m))
            .flat_map(|m| m.0)
            .collect(),
        Geometry::Line(line) => {
            buffer_linestring(&LineString::from(vec![line.start, line.end]), buffer_m)
                .map(|m| m.0)
                .unwrap_or_default()
        }
        Geometry::LineString(line) => buffer_linestring(line, buffer_m)
            .map(|m| m.0)
            .unwrap_or_default(),
        Geometry::MultiLineString(lines) => lines
            .iter()
            .filter_map(|line| buffer_linestring(line, buffer_m))
            .flat_map(|m| m.0)
            .collect(),
        Geometry::GeometryCollection(collection) => collection
            .iter()
            .flat_map(|g| exclusion_polygons(g, buffer_m))
            .collect(),
    }
}

pub fn geometry_intersects_corridor(geometry: &Geometry, corridor: &MultiPolygon) -> bool {
    geometry.intersects(corridor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Contains, Point, point};

    fn chicago_route() -> LineString {
        LineString::from(vec![(-87.90, 42.00), (-87.925, 42.025), (-87.95, 42.05)])
    }

    #[test]
    fn tangent_plane_round_trips() {
        let ltp = LocalTangentPlane::new(-87.9, 42.0);
        let (x, y) = ltp.project(-87.95, 42.05);
        let (lon, lat) = ltp.unproject(x, y);

        assert!((lon + 87.95).abs() < 1e-9);
        assert!((lat - 42.05).abs() < 1e-9);
        // ~5.5km north
        assert!((y - 5_559.0).abs() < 20.0);
    }

    #[test]
    fn corridor_catches_nearby_event_and_skips_distant_one() {
        let corridor = route_corridor(&chicago_route(), DEFAULT_CORRIDOR_BUFFER_M).unwrap();

        // roughly 200m east of the midpoint
        let near: Geometry = point!(x: -87.9226, y: 42.025).into();
        // roughly 4km east of the midpoint
        let far: Geometry = point!(x: -87.875, y: 42.025).into();

        assert!(geometry_intersects_corridor(&near, &corridor));
        assert!(!geometry_intersects_corridor(&far, &corridor));
    }

    #[test]
    fn corridor_catches_line_crossing_route() {
        let corridor = route_corridor(&chicago_route(), DEFAULT_CORRIDOR_BUFFER_M).unwrap();
        let crossing: Geometry =
            LineString::from(vec![(-87.96, 42.025), (-87.88, 42.025)]).into();

        assert!(geometry_intersects_corridor(&crossing, &corridor));
    }

    #[test]
    fn single_point_route_gives_circle() {
        let corridor = route_corridor(&LineString::from(vec![(-87.9, 42.0)]), 500.0).unwrap();

        assert_eq!(corridor.0.len(), 1);
        assert!(corridor.contains(&Point::new(-87.9, 42.003)));
        assert!(!corridor.contains(&Point::new(-87.9, 42.01)));
    }

    #[test]
    fn multipoint_closure_gives_one_polygon_per_point() {
        let closure: Geometry =
            geo::MultiPoint::from(vec![(-87.92, 42.02), (-87.91, 42.01)]).into();
        let polygons = exclusion_polygons(&closure, CLOSURE_EXCLUSION_BUFFER_M);

        assert_eq!(polygons.len(), 2);
        assert!(polygons[1].contains(&Point::new(-87.91, 42.01)));
        assert!(!polygons[0].contains(&Point::new(-87.91, 42.01)));
    }

    #[test]
    fn straight_run_of_vertices_is_simplified() {
        let line = LineString::from(vec![
            (-87.90, 42.00),
            (-87.90, 42.01),
            (-87.90, 42.02),
            (-87.90, 42.03),
        ]);
        let corridor = route_corridor(&line, 500.0).unwrap();

        assert_eq!(corridor.0.len(), 1);
        assert!(corridor.contains(&Point::new(-87.90, 42.015)));
    }

    #[test]
    fn repeated_vertex_route_does_not_panic() {
        let line = LineString::from(vec![(-87.9, 42.0), (-87.9, 42.0), (-87.9, 42.0)]);
        let corridor = route_corridor(&line, 500.0).unwrap();

        assert!(corridor.contains(&Point::new(-87.9, 42.003)));
    }

    #[test]
    fn empty_route_has_no_corridor() {
        assert!(route_corridor(&LineString::new(vec![]), 500.0).is_none());
    }

    #[test]
    fn point_closure_is_polygonised() {
        let closure: Geometry = point!(x: -87.92, y: 42.02).into();
        let polygons = exclusion_polygons(&closure, CLOSURE_EXCLUSION_BUFFER_M);

        assert_eq!(polygons.len(), 1);
        assert!(polygons[0].contains(&Point::new(-87.92, 42.02)));
    }

    #[test]
    fn polygon_closure_is_kept_as_is() {
        let square = Polygon::new(
            LineString::from(vec![
                (-87.93, 42.02),
                (-87.92, 42.02),
                (-87.92, 42.03),
                (-87.93, 42.03),
                (-87.93, 42.02),
            ]),
            vec![],
        );
        let polygons = exclusion_polygons(&Geometry::Polygon(square.clone()), 25.0);

        assert_eq!(polygons, vec![square]);
    }
}
