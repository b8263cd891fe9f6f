// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

//! Routing engines the calculator can call.
//!
//! The baseline engine is self-hosted and always consulted. Paid providers are metered and
//! only used under the escalation policy; they are looked up by name in a registry.

pub mod mapbox;
pub mod valhalla;

use crate::Coordinate;
use crate::errors::RoutingEngineError;
use ahash::AHashMap;
use async_trait::async_trait;
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq)]
pub struct Route {
    pub duration_seconds: f64,
    pub distance_meters: f64,
    /// lon/lat
    pub geometry: geo::LineString,
}

#[async_trait]
pub trait BaselineRoutingEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Routes from origin to destination, never passing through any of `exclusions`.
    async fn route(
        &self,
        endpoint: &str,
        origin: Coordinate,
        destination: Coordinate,
        exclusions: &[geo::Polygon],
    ) -> Result<Route, RoutingEngineError>;
}

#[async_trait]
pub trait PaidRoutingProvider: Send + Sync {
    fn name(&self) -> &str;

    /// What one successful request is billed at.
    fn cost_per_request_cents(&self) -> i64;

    async fn calculate_route(
        &self,
        origin: Coordinate,
        destination: Coordinate,
    ) -> Result<Route, RoutingEngineError>;
}

#[derive(Clone, Default)]
pub struct PaidProviderRegistry {
    providers: AHashMap<String, Arc<dyn PaidRoutingProvider>>,
}

impl PaidProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Arc<dyn PaidRoutingProvider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn PaidRoutingProvider>> {
        self.providers.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.providers.keys().map(|k| k.as_str()).collect()
    }
}
