// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

use super::{
    NormalizedEvent, TrafficEvent, TrafficEventStore, TrafficEventType, TrafficSeverity,
    UpsertOutcome, resolve_end_time,
};
use crate::errors::StoreError;
use crate::models::TrafficEventRow;
use crate::postgis_to_diesel::{diesel_geometry_to_geo, geometry_geo_to_diesel};
use crate::postgres_tools::DetourPostgresPool;
use crate::schema::traffic::traffic_events::dsl;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::ExpressionMethods;
use diesel::OptionalExtension;
use diesel::QueryDsl;
use diesel::SelectableHelper;
use diesel_async::AsyncConnection;
use diesel_async::RunQueryDsl;
use diesel_async::scoped_futures::ScopedFutureExt;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

pub struct PgTrafficEventStore {
    pool: Arc<DetourPostgresPool>,
}

impl PgTrafficEventStore {
    pub fn new(pool: Arc<DetourPostgresPool>) -> Self {
        Self { pool }
    }
}

impl TryFrom<TrafficEventRow> for TrafficEvent {
    type Error = StoreError;

    fn try_from(row: TrafficEventRow) -> Result<Self, Self::Error> {
        let event_type = TrafficEventType::from_db_str(&row.event_type).unwrap_or_else(|| {
            warn!(event_id = %row.id, event_type = %row.event_type, "unknown stored event type");
            TrafficEventType::Other
        });
        let severity = TrafficSeverity::from_db_str(&row.severity).unwrap_or_else(|| {
            warn!(event_id = %row.id, severity = %row.severity, "unknown stored severity");
            TrafficSeverity::Minor
        });

        Ok(TrafficEvent {
            id: row.id,
            geometry: diesel_geometry_to_geo(&row.geometry)?,
            source_name: row.source_name,
            source_event_id: row.source_event_id,
            event_type,
            severity,
            title: row.title,
            description: row.description,
            active: row.active,
            start_time: row.start_time,
            end_time: row.end_time,
            last_updated: row.last_updated,
            metadata: row.metadata,
        })
    }
}

#[async_trait]
impl TrafficEventStore for PgTrafficEventStore {
    async fn active_events(&self, now: DateTime<Utc>) -> Result<Vec<TrafficEvent>, StoreError> {
        let conn_pool = self.pool.as_ref();
        let conn = &mut conn_pool.get().await?;

        let rows: Vec<TrafficEventRow> = dsl::traffic_events
            .filter(dsl::active.eq(true))
            .filter(dsl::end_time.gt(now))
            .select(TrafficEventRow::as_select())
            .load(conn)
            .await?;

        rows.into_iter().map(TrafficEvent::try_from).collect()
    }

    async fn find_by_dedup_key(
        &self,
        source_name: &str,
        source_event_id: &str,
    ) -> Result<Option<TrafficEvent>, StoreError> {
        let conn_pool = self.pool.as_ref();
        let conn = &mut conn_pool.get().await?;

        let row: Option<TrafficEventRow> = dsl::traffic_events
            .filter(dsl::source_name.eq(source_name))
            .filter(dsl::source_event_id.eq(source_event_id))
            .select(TrafficEventRow::as_select())
            .first(conn)
            .await
            .optional()?;

        row.map(TrafficEvent::try_from).transpose()
    }

    async fn upsert_event(
        &self,
        source_name: &str,
        event: &NormalizedEvent,
        now: DateTime<Utc>,
    ) -> Result<UpsertOutcome, StoreError> {
        let conn_pool = self.pool.as_ref();
        let conn = &mut conn_pool.get().await?;

        let geometry_pg = geometry_geo_to_diesel(&event.geometry)?;
        let source_name = source_name.to_string();
        let event = event.clone();

        // one transaction per event, so a bad record later in the batch keeps earlier ones
        conn.transaction::<_, StoreError, _>(|conn| {
            async move {
                let existing: Option<(Uuid, DateTime<Utc>)> = dsl::traffic_events
                    .filter(dsl::source_name.eq(&source_name))
                    .filter(dsl::source_event_id.eq(&event.source_event_id))
                    .select((dsl::id, dsl::start_time))
                    .for_update()
                    .first(conn)
                    .await
                    .optional()?;

                match existing {
                    Some((existing_id, existing_start)) => {
                        diesel::update(dsl::traffic_events.filter(dsl::id.eq(existing_id)))
                            .set((
                                dsl::title.eq(&event.title),
                                dsl::description.eq(&event.description),
                                dsl::severity.eq(event.severity.as_str()),
                                dsl::event_type.eq(event.event_type.as_str()),
                                dsl::geometry.eq(geometry_pg),
                                dsl::metadata.eq(&event.metadata),
                                dsl::end_time.eq(resolve_end_time(
                                    event.end_time,
                                    existing_start,
                                    now,
                                )),
                                dsl::last_updated.eq(now),
                                dsl::active.eq(true),
                            ))
                            .execute(conn)
                            .await?;

                        Ok(UpsertOutcome {
                            event_id: existing_id,
                            created: false,
                        })
                    }
                    None => {
                        let start_time = event.start_time.unwrap_or(now);
                        let row = TrafficEventRow {
                            id: Uuid::new_v4(),
                            source_name: source_name.clone(),
                            source_event_id: event.source_event_id.clone(),
                            event_type: event.event_type.as_str().to_string(),
                            severity: event.severity.as_str().to_string(),
                            title: event.title.clone(),
                            description: event.description.clone(),
                            geometry: geometry_pg,
                            active: true,
                            start_time,
                            end_time: resolve_end_time(event.end_time, start_time, now),
                            last_updated: now,
                            metadata: event.metadata.clone(),
                        };

                        diesel::insert_into(dsl::traffic_events)
                            .values(&row)
                            .execute(conn)
                            .await?;

                        Ok(UpsertOutcome {
                            event_id: row.id,
                            created: true,
                        })
                    }
                }
            }
            .scope_boxed()
        })
        .await
    }

    async fn deactivate_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let conn_pool = self.pool.as_ref();
        let conn = &mut conn_pool.get().await?;

        let flipped = diesel::update(
            dsl::traffic_events
                .filter(dsl::active.eq(true))
                .filter(dsl::end_time.le(now)),
        )
        .set(dsl::active.eq(false))
        .execute(conn)
        .await?;

        Ok(flipped)
    }
}
