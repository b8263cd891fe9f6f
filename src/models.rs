// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

use diesel::prelude::*;
use serde_json::Value;
use uuid::Uuid;

#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::traffic::traffic_events)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TrafficEventRow {
    pub id: Uuid,
    pub source_name: String,
    pub source_event_id: String,
    pub event_type: String,
    pub severity: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub geometry: postgis_diesel::types::GeometryContainer<postgis_diesel::types::Point>,
    pub active: bool,
    pub start_time: chrono::DateTime<chrono::Utc>,
    pub end_time: chrono::DateTime<chrono::Utc>,
    pub last_updated: chrono::DateTime<chrono::Utc>,
    pub metadata: Value,
}

#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::traffic::route_calculations)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct RouteCalculationRow {
    pub id: Uuid,
    pub incident_id: Option<String>,
    pub unit_id: Option<String>,
    pub requested_by: Option<String>,
    pub priority_level: Option<String>,
    pub origin: postgis_diesel::types::Point,
    pub destination: postgis_diesel::types::Point,
    pub routing_engine: String,
    pub baseline_eta_seconds: i32,
    pub baseline_distance_meters: f64,
    pub baseline_geometry:
        Option<postgis_diesel::types::LineString<postgis_diesel::types::Point>>,
    pub traffic_adjusted: bool,
    pub traffic_adjusted_eta_seconds: Option<i32>,
    pub traffic_adjusted_distance_meters: Option<f64>,
    pub traffic_adjusted_geometry:
        Option<postgis_diesel::types::LineString<postgis_diesel::types::Point>>,
    pub traffic_event_ids: Vec<Uuid>,
    pub penalties_applied: Value,
    pub paid_api_used: bool,
    pub paid_api_provider: Option<String>,
    pub paid_api_cost_cents: i32,
    pub calculation_time_ms: i64,
    pub dispatcher_requested: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::traffic::routing_config)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct RoutingConfigRow {
    pub id: i32,
    pub baseline_engine_endpoint: String,
    pub paid_api_enabled: bool,
    pub paid_api_provider: String,
    pub severity_penalties: Value,
    pub monthly_budget_cents: i64,
    pub current_month_spend_cents: i64,
    pub spend_month: chrono::NaiveDate,
    pub high_priority_levels: Vec<Option<String>>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::traffic::traffic_feed_sources)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TrafficFeedSourceRow {
    pub name: String,
    pub url: String,
    pub source_type: String,
    pub poll_interval_seconds: i32,
    pub enabled: bool,
    pub last_poll_at: Option<chrono::DateTime<chrono::Utc>>,
    pub last_success_at: Option<chrono::DateTime<chrono::Utc>>,
    pub last_error: Option<String>,
    pub events_ingested_total: i64,
}
