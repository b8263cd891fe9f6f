// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

//! The operator-edited routing configuration singleton.

pub mod memory;
pub mod postgres;

use crate::errors::StoreError;
use crate::traffic_events::TrafficSeverity;
use ahash::AHashMap;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};

pub const DEFAULT_PENALTY_SECONDS: i32 = 60;

#[derive(Clone, Debug, PartialEq)]
pub struct RoutingConfig {
    pub baseline_engine_endpoint: String,
    pub paid_api_enabled: bool,
    /// Key into the paid provider registry, e.g. "mapbox".
    pub paid_api_provider: String,
    pub severity_penalties: AHashMap<TrafficSeverity, i32>,
    pub monthly_budget_cents: i64,
    pub current_month_spend_cents: i64,
    /// First day of the month `current_month_spend_cents` belongs to.
    pub spend_month: NaiveDate,
    pub high_priority_levels: Vec<String>,
}

impl RoutingConfig {
    /// Spend attributable to `month`. A counter tagged with an older month has rolled over.
    pub fn spend_for_month(&self, month: NaiveDate) -> i64 {
        if self.spend_month == month {
            self.current_month_spend_cents
        } else {
            0
        }
    }

    pub fn penalty_seconds_for(&self, severity: TrafficSeverity) -> i32 {
        self.severity_penalties
            .get(&severity)
            .copied()
            .unwrap_or(DEFAULT_PENALTY_SECONDS)
    }

    pub fn is_high_priority(&self, priority_level: Option<&str>) -> bool {
        match priority_level {
            Some(level) => self.high_priority_levels.iter().any(|p| p == level),
            None => false,
        }
    }
}

pub fn default_severity_penalties() -> AHashMap<TrafficSeverity, i32> {
    AHashMap::from_iter([
        (TrafficSeverity::Minor, 60),
        (TrafficSeverity::Moderate, 180),
        (TrafficSeverity::Major, 420),
        (TrafficSeverity::RoadClosure, 900),
    ])
}

impl Default for RoutingConfig {
    /// Conservative config used when the stored one cannot be read: paid routing off.
    fn default() -> Self {
        RoutingConfig {
            baseline_engine_endpoint: "http://localhost:8002".to_string(),
            paid_api_enabled: false,
            paid_api_provider: "mapbox".to_string(),
            severity_penalties: default_severity_penalties(),
            monthly_budget_cents: 0,
            current_month_spend_cents: 0,
            spend_month: crate::billing_month(Utc::now()),
            high_priority_levels: vec![],
        }
    }
}

/// Severity map as stored in jsonb: `{"MAJOR": 420, ...}`. Unknown keys are dropped.
pub fn severity_penalties_from_json(
    value: &serde_json::Value,
) -> Result<AHashMap<TrafficSeverity, i32>, StoreError> {
    let raw: AHashMap<String, i32> = serde_json::from_value(value.clone())?;

    Ok(raw
        .into_iter()
        .filter_map(|(k, v)| TrafficSeverity::from_db_str(&k).map(|s| (s, v)))
        .collect())
}

pub fn severity_penalties_to_json(penalties: &AHashMap<TrafficSeverity, i32>) -> serde_json::Value {
    serde_json::Value::Object(
        penalties
            .iter()
            .map(|(k, v)| (k.as_str().to_string(), serde_json::Value::from(*v)))
            .collect(),
    )
}

#[async_trait]
pub trait RoutingConfigStore: Send + Sync {
    async fn load(&self) -> Result<RoutingConfig, StoreError>;

    /// Adds `cost_cents` to the spend counter for `month` in one atomic step,
    /// restarting the counter if it was tagged with another month. Returns the new total.
    async fn increment_spend(&self, cost_cents: i64, month: NaiveDate)
    -> Result<i64, StoreError>;
}
