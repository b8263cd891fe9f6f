// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

//! Append-only audit of computed routes.

use crate::Coordinate;
use crate::errors::StoreError;
use crate::models::RouteCalculationRow;
use crate::penalty_engine::AppliedPenalty;
use crate::postgis_to_diesel::{
    coord_to_diesel, diesel_linestring_to_geo, diesel_point_to_coord, linestring_geo_to_diesel,
};
use crate::postgres_tools::DetourPostgresPool;
use crate::schema::traffic::route_calculations::dsl;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::ExpressionMethods;
use diesel::QueryDsl;
use diesel::SelectableHelper;
use diesel_async::RunQueryDsl;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq)]
pub struct RouteCalculation {
    pub id: Uuid,
    pub incident_id: Option<String>,
    pub unit_id: Option<String>,
    pub requested_by: Option<String>,
    pub priority_level: Option<String>,
    pub origin: Coordinate,
    pub destination: Coordinate,
    /// "valhalla", or the paid provider's name when escalation succeeded
    pub routing_engine: String,
    pub baseline_eta_seconds: i32,
    pub baseline_distance_meters: f64,
    pub baseline_geometry: Option<geo::LineString>,
    pub traffic_adjusted: bool,
    pub traffic_adjusted_eta_seconds: Option<i32>,
    pub traffic_adjusted_distance_meters: Option<f64>,
    pub traffic_adjusted_geometry: Option<geo::LineString>,
    pub traffic_event_ids: Vec<Uuid>,
    pub penalties_applied: Vec<AppliedPenalty>,
    pub paid_api_used: bool,
    pub paid_api_provider: Option<String>,
    pub paid_api_cost_cents: i32,
    pub calculation_time_ms: i64,
    pub dispatcher_requested: bool,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<&RouteCalculation> for RouteCalculationRow {
    type Error = StoreError;

    fn try_from(record: &RouteCalculation) -> Result<Self, Self::Error> {
        Ok(RouteCalculationRow {
            id: record.id,
            incident_id: record.incident_id.clone(),
            unit_id: record.unit_id.clone(),
            requested_by: record.requested_by.clone(),
            priority_level: record.priority_level.clone(),
            origin: coord_to_diesel(record.origin.to_coord()),
            destination: coord_to_diesel(record.destination.to_coord()),
            routing_engine: record.routing_engine.clone(),
            baseline_eta_seconds: record.baseline_eta_seconds,
            baseline_distance_meters: record.baseline_distance_meters,
            baseline_geometry: record.baseline_geometry.as_ref().map(linestring_geo_to_diesel),
            traffic_adjusted: record.traffic_adjusted,
            traffic_adjusted_eta_seconds: record.traffic_adjusted_eta_seconds,
            traffic_adjusted_distance_meters: record.traffic_adjusted_distance_meters,
            traffic_adjusted_geometry: record
                .traffic_adjusted_geometry
                .as_ref()
                .map(linestring_geo_to_diesel),
            traffic_event_ids: record.traffic_event_ids.clone(),
            penalties_applied: serde_json::to_value(&record.penalties_applied)?,
            paid_api_used: record.paid_api_used,
            paid_api_provider: record.paid_api_provider.clone(),
            paid_api_cost_cents: record.paid_api_cost_cents,
            calculation_time_ms: record.calculation_time_ms,
            dispatcher_requested: record.dispatcher_requested,
            created_at: record.created_at,
        })
    }
}

impl TryFrom<RouteCalculationRow> for RouteCalculation {
    type Error = StoreError;

    fn try_from(row: RouteCalculationRow) -> Result<Self, Self::Error> {
        Ok(RouteCalculation {
            id: row.id,
            origin: diesel_point_to_coord(&row.origin).into(),
            destination: diesel_point_to_coord(&row.destination).into(),
            baseline_geometry: row.baseline_geometry.as_ref().map(diesel_linestring_to_geo),
            traffic_adjusted_geometry: row
                .traffic_adjusted_geometry
                .as_ref()
                .map(diesel_linestring_to_geo),
            penalties_applied: serde_json::from_value(row.penalties_applied)?,
            incident_id: row.incident_id,
            unit_id: row.unit_id,
            requested_by: row.requested_by,
            priority_level: row.priority_level,
            routing_engine: row.routing_engine,
            baseline_eta_seconds: row.baseline_eta_seconds,
            baseline_distance_meters: row.baseline_distance_meters,
            traffic_adjusted: row.traffic_adjusted,
            traffic_adjusted_eta_seconds: row.traffic_adjusted_eta_seconds,
            traffic_adjusted_distance_meters: row.traffic_adjusted_distance_meters,
            traffic_event_ids: row.traffic_event_ids,
            paid_api_used: row.paid_api_used,
            paid_api_provider: row.paid_api_provider,
            paid_api_cost_cents: row.paid_api_cost_cents,
            calculation_time_ms: row.calculation_time_ms,
            dispatcher_requested: row.dispatcher_requested,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
pub trait RouteCalculationStore: Send + Sync {
    async fn insert(&self, record: &RouteCalculation) -> Result<(), StoreError>;

    /// Newest first.
    async fn for_incident(&self, incident_id: &str) -> Result<Vec<RouteCalculation>, StoreError>;

    /// Newest first.
    async fn for_unit(&self, unit_id: &str) -> Result<Vec<RouteCalculation>, StoreError>;
}

#[derive(Default)]
pub struct InMemoryRouteCalculationStore {
    records: RwLock<Vec<RouteCalculation>>,
}

impl InMemoryRouteCalculationStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn matching<F: Fn(&RouteCalculation) -> bool>(&self, keep: F) -> Vec<RouteCalculation> {
        let mut found: Vec<RouteCalculation> = self
            .records
            .read()
            .await
            .iter()
            .filter(|r| keep(*r))
            .cloned()
            .collect();

        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        found
    }
}

#[async_trait]
impl RouteCalculationStore for InMemoryRouteCalculationStore {
    async fn insert(&self, record: &RouteCalculation) -> Result<(), StoreError> {
        self.records.write().await.push(record.clone());
        Ok(())
    }

    async fn for_incident(&self, incident_id: &str) -> Result<Vec<RouteCalculation>, StoreError> {
        Ok(self
            .matching(|r| r.incident_id.as_deref() == Some(incident_id))
            .await)
    }

    async fn for_unit(&self, unit_id: &str) -> Result<Vec<RouteCalculation>, StoreError> {
        Ok(self.matching(|r| r.unit_id.as_deref() == Some(unit_id)).await)
    }
}

pub struct PgRouteCalculationStore {
    pool: Arc<DetourPostgresPool>,
}

impl PgRouteCalculationStore {
    pub fn new(pool: Arc<DetourPostgresPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RouteCalculationStore for PgRouteCalculationStore {
    async fn insert(&self, record: &RouteCalculation) -> Result<(), StoreError> {
        let row = RouteCalculationRow::try_from(record)?;

        let conn_pool = self.pool.as_ref();
        let conn = &mut conn_pool.get().await?;

        diesel::insert_into(dsl::route_calculations)
            .values(&row)
            .execute(conn)
            .await?;

        Ok(())
    }

    async fn for_incident(&self, incident_id: &str) -> Result<Vec<RouteCalculation>, StoreError> {
        let conn_pool = self.pool.as_ref();
        let conn = &mut conn_pool.get().await?;

        let rows: Vec<RouteCalculationRow> = dsl::route_calculations
            .filter(dsl::incident_id.eq(incident_id))
            .order(dsl::created_at.desc())
            .select(RouteCalculationRow::as_select())
            .load(conn)
            .await?;

        rows.into_iter().map(RouteCalculation::try_from).collect()
    }

    async fn for_unit(&self, unit_id: &str) -> Result<Vec<RouteCalculation>, StoreError> {
        let conn_pool = self.pool.as_ref();
        let conn = &mut conn_pool.get().await?;

        let rows: Vec<RouteCalculationRow> = dsl::route_calculations
            .filter(dsl::unit_id.eq(unit_id))
            .order(dsl::created_at.desc())
            .select(RouteCalculationRow::as_select())
            .load(conn)
            .await?;

        rows.into_iter().map(RouteCalculation::try_from).collect()
    }
}
