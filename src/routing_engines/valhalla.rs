// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

//! Client for the self-hosted Valhalla-style baseline engine.

use super::{BaselineRoutingEngine, Route};
use crate::Coordinate;
use crate::errors::RoutingEngineError;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

pub const METERS_PER_MILE: f64 = 1609.34;

// valhalla encodes shapes at 1e-6
const SHAPE_PRECISION: u32 = 6;

#[derive(Serialize, Debug)]
pub struct ValhallaRouteRequest {
    pub locations: Vec<ValhallaLocation>,
    pub costing: &'static str,
    pub directions_options: DirectionsOptions,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exclude_polygons: Vec<geojson::Geometry>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct ValhallaLocation {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Serialize, Debug)]
pub struct DirectionsOptions {
    pub units: &'static str,
}

#[derive(Deserialize, Debug)]
struct ValhallaRouteResponse {
    trip: ValhallaTrip,
}

#[derive(Deserialize, Debug)]
struct ValhallaTrip {
    summary: ValhallaSummary,
    #[serde(default)]
    legs: Vec<ValhallaLeg>,
}

#[derive(Deserialize, Debug)]
struct ValhallaSummary {
    time: f64,
    /// miles, because the request asks for miles
    length: f64,
}

#[derive(Deserialize, Debug)]
struct ValhallaLeg {
    shape: ValhallaShape,
}

#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum ValhallaShape {
    Points(Vec<ValhallaLocation>),
    Encoded(String),
}

pub fn build_route_request(
    origin: Coordinate,
    destination: Coordinate,
    exclusions: &[geo::Polygon],
) -> ValhallaRouteRequest {
    ValhallaRouteRequest {
        locations: vec![
            ValhallaLocation {
                lat: origin.lat,
                lon: origin.lon,
            },
            ValhallaLocation {
                lat: destination.lat,
                lon: destination.lon,
            },
        ],
        costing: "auto",
        directions_options: DirectionsOptions { units: "miles" },
        exclude_polygons: exclusions.iter().map(geojson::Geometry::from).collect(),
    }
}

pub fn parse_route_response(body: &str) -> Result<Route, RoutingEngineError> {
    let response: ValhallaRouteResponse = serde_json::from_str(body)
        .map_err(|e| RoutingEngineError::Malformed(e.to_string()))?;

    let mut coords: Vec<geo::Coord> = vec![];

    for leg in response.trip.legs {
        let leg_coords: Vec<geo::Coord> = match leg.shape {
            ValhallaShape::Points(points) => points
                .into_iter()
                .map(|p| geo::Coord { x: p.lon, y: p.lat })
                .collect(),
            ValhallaShape::Encoded(encoded) => {
                polyline::decode_polyline(&encoded, SHAPE_PRECISION)
                    .map_err(|e| RoutingEngineError::Malformed(format!("bad shape: {}", e)))?
                    .0
            }
        };

        // consecutive legs share their joining point
        let skip = match (coords.last(), leg_coords.first()) {
            (Some(last), Some(first)) if last == first => 1,
            _ => 0,
        };
        coords.extend(leg_coords.into_iter().skip(skip));
    }

    if coords.is_empty() {
        return Err(RoutingEngineError::NoRoute);
    }

    Ok(Route {
        duration_seconds: response.trip.summary.time,
        distance_meters: response.trip.summary.length * METERS_PER_MILE,
        geometry: geo::LineString::new(coords),
    })
}

pub struct ValhallaEngine {
    client: reqwest::Client,
    timeout_ms: u64,
}

impl ValhallaEngine {
    pub fn new(timeout: Duration) -> Result<Self, RoutingEngineError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .gzip(true)
            .build()?;

        Ok(Self {
            client,
            timeout_ms: timeout.as_millis() as u64,
        })
    }
}

#[async_trait]
impl BaselineRoutingEngine for ValhallaEngine {
    fn name(&self) -> &str {
        "valhalla"
    }

    async fn route(
        &self,
        endpoint: &str,
        origin: Coordinate,
        destination: Coordinate,
        exclusions: &[geo::Polygon],
    ) -> Result<Route, RoutingEngineError> {
        let url = format!("{}/route", endpoint.trim_end_matches('/'));
        let body = build_route_request(origin, destination, exclusions);

        debug!(%url, exclusions = exclusions.len(), "requesting baseline route");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| RoutingEngineError::from_reqwest(e, self.timeout_ms))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| RoutingEngineError::from_reqwest(e, self.timeout_ms))?;

        if !status.is_success() {
            return Err(RoutingEngineError::Status {
                status: status.as_u16(),
                message: text,
            });
        }

        parse_route_response(&text)
    }
}
