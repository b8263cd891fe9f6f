// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

use super::{PaidRoutingProvider, Route};
use crate::Coordinate;
use crate::errors::RoutingEngineError;
use async_trait::async_trait;
use std::time::Duration;
use url::Url;

pub const MAPBOX_DIRECTIONS_BASE: &str = "https://api.mapbox.com/directions/v5/mapbox/driving";

#[derive(Deserialize, Debug)]
struct DirectionsResponse {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    routes: Vec<DirectionsRoute>,
}

#[derive(Deserialize, Debug)]
struct DirectionsRoute {
    duration: f64,
    distance: f64,
    geometry: RouteGeometry,
}

#[derive(Deserialize, Debug)]
struct RouteGeometry {
    coordinates: Vec<[f64; 2]>,
}

pub struct MapboxProvider {
    client: reqwest::Client,
    access_token: String,
    base_url: String,
    cost_cents: i64,
    timeout_ms: u64,
}

impl MapboxProvider {
    pub fn new(
        access_token: String,
        cost_cents: i64,
        timeout: Duration,
    ) -> Result<Self, RoutingEngineError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .gzip(true)
            .build()?;

        Ok(Self {
            client,
            access_token,
            base_url: MAPBOX_DIRECTIONS_BASE.to_string(),
            cost_cents,
            timeout_ms: timeout.as_millis() as u64,
        })
    }

    pub fn request_url(
        &self,
        origin: Coordinate,
        destination: Coordinate,
    ) -> Result<Url, RoutingEngineError> {
        let raw = format!(
            "{}/{},{};{},{}",
            self.base_url.trim_end_matches('/'),
            origin.lon,
            origin.lat,
            destination.lon,
            destination.lat
        );

        let mut url = Url::parse(&raw)
            .map_err(|e| RoutingEngineError::InvalidConfig(format!("mapbox url {}: {}", raw, e)))?;

        url.query_pairs_mut()
            .append_pair("access_token", &self.access_token)
            .append_pair("geometries", "geojson")
            .append_pair("overview", "full")
            .append_pair("annotations", "duration,distance");

        Ok(url)
    }
}

pub fn parse_directions_response(body: &str) -> Result<Route, RoutingEngineError> {
    let response: DirectionsResponse = serde_json::from_str(body)
        .map_err(|e| RoutingEngineError::Malformed(e.to_string()))?;

    if let Some(code) = response.code.as_deref() {
        if code == "NoRoute" || code == "NoSegment" {
            return Err(RoutingEngineError::NoRoute);
        }
        if code != "Ok" {
            return Err(RoutingEngineError::Malformed(format!(
                "{}: {}",
                code,
                response.message.unwrap_or_default()
            )));
        }
    }

    let route = response
        .routes
        .into_iter()
        .next()
        .ok_or(RoutingEngineError::NoRoute)?;

    Ok(Route {
        duration_seconds: route.duration,
        distance_meters: route.distance,
        geometry: route
            .geometry
            .coordinates
            .into_iter()
            .map(|[lon, lat]| geo::Coord { x: lon, y: lat })
            .collect(),
    })
}

#[async_trait]
impl PaidRoutingProvider for MapboxProvider {
    fn name(&self) -> &str {
        "mapbox"
    }

    fn cost_per_request_cents(&self) -> i64 {
        self.cost_cents
    }

    async fn calculate_route(
        &self,
        origin: Coordinate,
        destination: Coordinate,
    ) -> Result<Route, RoutingEngineError> {
        let url = self.request_url(origin, destination)?;

        let response = self
            .client
            .get(url)
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

        parse_directions_response(&text)
    }
}
