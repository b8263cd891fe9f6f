// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

use crate::errors::StoreError;
use crate::models::TrafficFeedSourceRow;
use crate::postgres_tools::DetourPostgresPool;
use crate::schema::traffic::traffic_feed_sources::dsl;
use ahash::AHashMap;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use diesel::ExpressionMethods;
use diesel::QueryDsl;
use diesel::SelectableHelper;
use diesel_async::RunQueryDsl;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone, Debug, PartialEq)]
pub struct TrafficFeedSource {
    pub name: String,
    pub url: String,
    /// payload format, e.g. "511_json"
    pub source_type: String,
    pub poll_interval_seconds: i32,
    pub enabled: bool,
    pub last_poll_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub events_ingested_total: i64,
}

impl TrafficFeedSource {
    pub fn new(name: &str, url: &str, source_type: &str, poll_interval_seconds: i32) -> Self {
        TrafficFeedSource {
            name: name.to_string(),
            url: url.to_string(),
            source_type: source_type.to_string(),
            poll_interval_seconds,
            enabled: true,
            last_poll_at: None,
            last_success_at: None,
            last_error: None,
            events_ingested_total: 0,
        }
    }

    /// Enabled, and never polled or polled at least one interval ago.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        if !self.enabled {
            return false;
        }

        match self.last_poll_at {
            Some(last_poll_at) => {
                now - last_poll_at >= Duration::seconds(self.poll_interval_seconds.max(1) as i64)
            }
            None => true,
        }
    }
}

impl From<TrafficFeedSourceRow> for TrafficFeedSource {
    fn from(row: TrafficFeedSourceRow) -> Self {
        TrafficFeedSource {
            name: row.name,
            url: row.url,
            source_type: row.source_type,
            poll_interval_seconds: row.poll_interval_seconds,
            enabled: row.enabled,
            last_poll_at: row.last_poll_at,
            last_success_at: row.last_success_at,
            last_error: row.last_error,
            events_ingested_total: row.events_ingested_total,
        }
    }
}

#[async_trait]
pub trait FeedSourceStore: Send + Sync {
    async fn list_sources(&self) -> Result<Vec<TrafficFeedSource>, StoreError>;

    /// Stamps the poll, stamps success, clears the last error and adds to the running total.
    async fn record_success(
        &self,
        name: &str,
        polled_at: DateTime<Utc>,
        ingested: i64,
    ) -> Result<(), StoreError>;

    /// Stamps the poll and stores the error. Success time and total stay as they were.
    async fn record_failure(
        &self,
        name: &str,
        polled_at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), StoreError>;
}

#[derive(Default)]
pub struct InMemoryFeedSourceStore {
    sources: RwLock<AHashMap<String, TrafficFeedSource>>,
}

impl InMemoryFeedSourceStore {
    pub fn new(sources: Vec<TrafficFeedSource>) -> Self {
        InMemoryFeedSourceStore {
            sources: RwLock::new(
                sources
                    .into_iter()
                    .map(|source| (source.name.clone(), source))
                    .collect(),
            ),
        }
    }

    pub async fn get(&self, name: &str) -> Option<TrafficFeedSource> {
        self.sources.read().await.get(name).cloned()
    }
}

#[async_trait]
impl FeedSourceStore for InMemoryFeedSourceStore {
    async fn list_sources(&self) -> Result<Vec<TrafficFeedSource>, StoreError> {
        let mut sources: Vec<TrafficFeedSource> =
            self.sources.read().await.values().cloned().collect();
        sources.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(sources)
    }

    async fn record_success(
        &self,
        name: &str,
        polled_at: DateTime<Utc>,
        ingested: i64,
    ) -> Result<(), StoreError> {
        let mut sources = self.sources.write().await;
        let source = sources
            .get_mut(name)
            .ok_or_else(|| StoreError::NotFound(format!("feed source {}", name)))?;

        source.last_poll_at = Some(polled_at);
        source.last_success_at = Some(polled_at);
        source.last_error = None;
        source.events_ingested_total += ingested;

        Ok(())
    }

    async fn record_failure(
        &self,
        name: &str,
        polled_at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), StoreError> {
        let mut sources = self.sources.write().await;
        let source = sources
            .get_mut(name)
            .ok_or_else(|| StoreError::NotFound(format!("feed source {}", name)))?;

        source.last_poll_at = Some(polled_at);
        source.last_error = Some(error.to_string());

        Ok(())
    }
}

pub struct PgFeedSourceStore {
    pool: Arc<DetourPostgresPool>,
}

impl PgFeedSourceStore {
    pub fn new(pool: Arc<DetourPostgresPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FeedSourceStore for PgFeedSourceStore {
    async fn list_sources(&self) -> Result<Vec<TrafficFeedSource>, StoreError> {
        let conn_pool = self.pool.as_ref();
        let conn = &mut conn_pool.get().await?;

        let rows: Vec<TrafficFeedSourceRow> = dsl::traffic_feed_sources
            .order(dsl::name.asc())
            .select(TrafficFeedSourceRow::as_select())
            .load(conn)
            .await?;

        Ok(rows.into_iter().map(TrafficFeedSource::from).collect())
    }

    async fn record_success(
        &self,
        name: &str,
        polled_at: DateTime<Utc>,
        ingested: i64,
    ) -> Result<(), StoreError> {
        let conn_pool = self.pool.as_ref();
        let conn = &mut conn_pool.get().await?;

        let updated = diesel::update(dsl::traffic_feed_sources.filter(dsl::name.eq(name)))
            .set((
                dsl::last_poll_at.eq(Some(polled_at)),
                dsl::last_success_at.eq(Some(polled_at)),
                dsl::last_error.eq(None::<String>),
                dsl::events_ingested_total.eq(dsl::events_ingested_total + ingested),
            ))
            .execute(conn)
            .await?;

        match updated {
            0 => Err(StoreError::NotFound(format!("feed source {}", name))),
            _ => Ok(()),
        }
    }

    async fn record_failure(
        &self,
        name: &str,
        polled_at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), StoreError> {
        let conn_pool = self.pool.as_ref();
        let conn = &mut conn_pool.get().await?;

        let updated = diesel::update(dsl::traffic_feed_sources.filter(dsl::name.eq(name)))
            .set((
                dsl::last_poll_at.eq(Some(polled_at)),
                dsl::last_error.eq(Some(error)),
            ))
            .execute(conn)
            .await?;

        match updated {
            0 => Err(StoreError::NotFound(format!("feed source {}", name))),
            _ => Ok(()),
        }
    }
}
