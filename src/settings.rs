// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

//! Process settings from the environment, and wiring for the Postgres-backed services.

use crate::errors::RoutingEngineError;
use crate::feed_ingestion::sources::PgFeedSourceStore;
use crate::feed_ingestion::{FeedIngestionService, HttpFeedFetcher};
use crate::geometry_utils::DEFAULT_CORRIDOR_BUFFER_M;
use crate::postgres_tools::DetourPostgresPool;
use crate::route_calculator::RouteCalculator;
use crate::route_calculator::records::PgRouteCalculationStore;
use crate::routing_config::postgres::PgRoutingConfigStore;
use crate::routing_engines::PaidProviderRegistry;
use crate::routing_engines::mapbox::MapboxProvider;
use crate::routing_engines::valhalla::ValhallaEngine;
use crate::traffic_events::postgres::PgTrafficEventStore;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    pub baseline_timeout: Duration,
    pub paid_timeout: Duration,
    pub feed_timeout: Duration,
    pub corridor_buffer_m: f64,
    pub mapbox_access_token: Option<String>,
    pub mapbox_cost_cents: i64,
    pub juniper_tick: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            baseline_timeout: Duration::from_millis(5000),
            paid_timeout: Duration::from_millis(5000),
            feed_timeout: Duration::from_millis(10_000),
            corridor_buffer_m: DEFAULT_CORRIDOR_BUFFER_M,
            mapbox_access_token: None,
            mapbox_cost_cents: 1,
            juniper_tick: Duration::from_secs(15),
        }
    }
}

fn parsed<T: FromStr, F: Fn(&str) -> Option<String>>(lookup: &F, key: &str, default: T) -> T {
    match lookup(key) {
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                warn!(key, value = %raw, "unparseable setting, using default");
                default
            }
        },
        None => default,
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Self {
        let defaults = Settings::default();

        Settings {
            baseline_timeout: Duration::from_millis(parsed(
                &lookup,
                "BASELINE_TIMEOUT_MS",
                defaults.baseline_timeout.as_millis() as u64,
            )),
            paid_timeout: Duration::from_millis(parsed(
                &lookup,
                "PAID_TIMEOUT_MS",
                defaults.paid_timeout.as_millis() as u64,
            )),
            feed_timeout: Duration::from_millis(parsed(
                &lookup,
                "FEED_TIMEOUT_MS",
                defaults.feed_timeout.as_millis() as u64,
            )),
            corridor_buffer_m: parsed(&lookup, "CORRIDOR_BUFFER_METERS", defaults.corridor_buffer_m),
            mapbox_access_token: lookup("MAPBOX_ACCESS_TOKEN").filter(|t| !t.trim().is_empty()),
            mapbox_cost_cents: parsed(&lookup, "MAPBOX_COST_CENTS", defaults.mapbox_cost_cents),
            // tokio intervals cannot tick every zero seconds
            juniper_tick: Duration::from_secs(
                parsed(&lookup, "JUNIPER_TICK_SECONDS", defaults.juniper_tick.as_secs()).max(1),
            ),
        }
    }

    /// Providers with credentials present. Without a Mapbox token the registry is empty and
    /// escalation quietly never happens.
    pub fn paid_provider_registry(&self) -> Result<PaidProviderRegistry, RoutingEngineError> {
        let mut registry = PaidProviderRegistry::new();

        match &self.mapbox_access_token {
            Some(token) => registry.register(Arc::new(MapboxProvider::new(
                token.clone(),
                self.mapbox_cost_cents,
                self.paid_timeout,
            )?)),
            None => warn!("MAPBOX_ACCESS_TOKEN not set, paid routing unavailable"),
        }

        Ok(registry)
    }

    pub fn route_calculator(
        &self,
        pool: Arc<DetourPostgresPool>,
    ) -> Result<RouteCalculator, RoutingEngineError> {
        Ok(RouteCalculator::new(
            Arc::new(ValhallaEngine::new(self.baseline_timeout)?),
            self.paid_provider_registry()?,
            Arc::new(PgTrafficEventStore::new(pool.clone())),
            Arc::new(PgRoutingConfigStore::new(pool.clone())),
            Arc::new(PgRouteCalculationStore::new(pool)),
        )
        .with_corridor_buffer(self.corridor_buffer_m))
    }

    pub fn feed_ingestion_service(
        &self,
        pool: Arc<DetourPostgresPool>,
    ) -> Result<FeedIngestionService, reqwest::Error> {
        Ok(FeedIngestionService::new(
            Arc::new(HttpFeedFetcher::new(self.feed_timeout)?),
            Arc::new(PgTrafficEventStore::new(pool.clone())),
            Arc::new(PgFeedSourceStore::new(pool)),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ahash::AHashMap;

    fn settings_from(pairs: &[(&str, &str)]) -> Settings {
        let env: AHashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn empty_environment_gives_defaults() {
        assert_eq!(settings_from(&[]), Settings::default());
    }

    #[test]
    fn values_are_read_and_bad_ones_ignored() {
        let settings = settings_from(&[
            ("BASELINE_TIMEOUT_MS", "2500"),
            ("CORRIDOR_BUFFER_METERS", "750.5"),
            ("MAPBOX_COST_CENTS", "a lot"),
            ("MAPBOX_ACCESS_TOKEN", "  "),
            ("JUNIPER_TICK_SECONDS", "30"),
        ]);

        assert_eq!(settings.baseline_timeout, Duration::from_millis(2500));
        assert_eq!(settings.corridor_buffer_m, 750.5);
        assert_eq!(settings.mapbox_cost_cents, 1);
        assert_eq!(settings.mapbox_access_token, None);
        assert_eq!(settings.juniper_tick, Duration::from_secs(30));
        assert_eq!(settings.feed_timeout, Duration::from_millis(10_000));
    }

    #[test]
    fn zero_tick_is_raised_to_one_second() {
        let settings = settings_from(&[("JUNIPER_TICK_SECONDS", "0")]);
        assert_eq!(settings.juniper_tick, Duration::from_secs(1));
    }

    #[test]
    fn registry_follows_credentials() {
        let without = settings_from(&[]).paid_provider_registry().unwrap();
        assert!(without.get("mapbox").is_none());

        let with = settings_from(&[("MAPBOX_ACCESS_TOKEN", "pk.abc"), ("MAPBOX_COST_CENTS", "2")])
            .paid_provider_registry()
            .unwrap();
        assert_eq!(with.get("mapbox").unwrap().cost_per_request_cents(), 2);
    }
}
