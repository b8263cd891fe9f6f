// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

use super::{RoutingConfig, RoutingConfigStore, severity_penalties_from_json};
use crate::errors::StoreError;
use crate::models::RoutingConfigRow;
use crate::postgres_tools::DetourPostgresPool;
use crate::schema::traffic::routing_config::dsl;
use async_trait::async_trait;
use chrono::NaiveDate;
use diesel::ExpressionMethods;
use diesel::OptionalExtension;
use diesel::QueryDsl;
use diesel::SelectableHelper;
use diesel::sql_types::{BigInt, Date};
use diesel_async::RunQueryDsl;
use std::sync::Arc;

const CONFIG_ROW_ID: i32 = 1;

// single statement so concurrent escalations cannot lose an increment.
// the month tag only moves forward; a charge that lands late goes to the newer month.
const INCREMENT_SPEND_SQL: &str = "UPDATE traffic.routing_config \
     SET current_month_spend_cents = CASE WHEN spend_month >= $1 \
             THEN current_month_spend_cents + $2 ELSE $2 END, \
         spend_month = GREATEST(spend_month, $1), \
         updated_at = now() \
     WHERE id = 1 \
     RETURNING current_month_spend_cents";

#[derive(diesel::QueryableByName)]
struct SpendTotal {
    #[diesel(sql_type = BigInt)]
    current_month_spend_cents: i64,
}

pub struct PgRoutingConfigStore {
    pool: Arc<DetourPostgresPool>,
}

impl PgRoutingConfigStore {
    pub fn new(pool: Arc<DetourPostgresPool>) -> Self {
        Self { pool }
    }
}

impl TryFrom<RoutingConfigRow> for RoutingConfig {
    type Error = StoreError;

    fn try_from(row: RoutingConfigRow) -> Result<Self, Self::Error> {
        Ok(RoutingConfig {
            severity_penalties: severity_penalties_from_json(&row.severity_penalties)?,
            baseline_engine_endpoint: row.baseline_engine_endpoint,
            paid_api_enabled: row.paid_api_enabled,
            paid_api_provider: row.paid_api_provider,
            monthly_budget_cents: row.monthly_budget_cents,
            current_month_spend_cents: row.current_month_spend_cents,
            spend_month: row.spend_month,
            high_priority_levels: row.high_priority_levels.into_iter().flatten().collect(),
        })
    }
}

#[async_trait]
impl RoutingConfigStore for PgRoutingConfigStore {
    async fn load(&self) -> Result<RoutingConfig, StoreError> {
        let conn_pool = self.pool.as_ref();
        let conn = &mut conn_pool.get().await?;

        let row: Option<RoutingConfigRow> = dsl::routing_config
            .filter(dsl::id.eq(CONFIG_ROW_ID))
            .select(RoutingConfigRow::as_select())
            .first(conn)
            .await
            .optional()?;

        match row {
            Some(row) => RoutingConfig::try_from(row),
            None => Err(StoreError::NotFound("traffic.routing_config id=1".to_string())),
        }
    }

    async fn increment_spend(
        &self,
        cost_cents: i64,
        month: NaiveDate,
    ) -> Result<i64, StoreError> {
        let conn_pool = self.pool.as_ref();
        let conn = &mut conn_pool.get().await?;

        let total: Option<SpendTotal> = diesel::sql_query(INCREMENT_SPEND_SQL)
            .bind::<Date, _>(month)
            .bind::<BigInt, _>(cost_cents)
            .get_result(conn)
            .await
            .optional()?;

        match total {
            Some(total) => Ok(total.current_month_spend_cents),
            None => Err(StoreError::NotFound("traffic.routing_config id=1".to_string())),
        }
    }
}
