// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

use super::{
    NormalizedEvent, TrafficEvent, TrafficEventStore, UpsertOutcome, resolve_end_time,
};
use crate::errors::StoreError;
use ahash::AHashMap;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

/// How long a retired event is kept so a republish can still revive it under the same id.
pub const DEFAULT_RETENTION_HOURS: i64 = 24;

/// Process-local event store keyed by (source name, source event id).
pub struct InMemoryTrafficEventStore {
    events: RwLock<AHashMap<(String, String), TrafficEvent>>,
    retention: Duration,
}

impl Default for InMemoryTrafficEventStore {
    fn default() -> Self {
        Self {
            events: RwLock::new(AHashMap::new()),
            retention: Duration::hours(DEFAULT_RETENTION_HOURS),
        }
    }
}

impl InMemoryTrafficEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Puts a fully formed event in place, replacing any event with the same dedup key.
    pub async fn insert(&self, event: TrafficEvent) {
        let key = (event.source_name.clone(), event.source_event_id.clone());
        self.events.write().await.insert(key, event);
    }

    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    pub async fn all(&self) -> Vec<TrafficEvent> {
        self.events.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl TrafficEventStore for InMemoryTrafficEventStore {
    async fn active_events(&self, now: DateTime<Utc>) -> Result<Vec<TrafficEvent>, StoreError> {
        Ok(self
            .events
            .read()
            .await
            .values()
            .filter(|event| event.is_live(now))
            .cloned()
            .collect())
    }

    async fn find_by_dedup_key(
        &self,
        source_name: &str,
        source_event_id: &str,
    ) -> Result<Option<TrafficEvent>, StoreError> {
        Ok(self
            .events
            .read()
            .await
            .get(&(source_name.to_string(), source_event_id.to_string()))
            .cloned())
    }

    async fn upsert_event(
        &self,
        source_name: &str,
        event: &NormalizedEvent,
        now: DateTime<Utc>,
    ) -> Result<UpsertOutcome, StoreError> {
        let mut events = self.events.write().await;
        let key = (source_name.to_string(), event.source_event_id.clone());

        if let Some(existing) = events.get_mut(&key) {
            existing.title = event.title.clone();
            existing.description = event.description.clone();
            existing.severity = event.severity;
            existing.event_type = event.event_type;
            existing.geometry = event.geometry.clone();
            existing.metadata = event.metadata.clone();
            existing.end_time = resolve_end_time(event.end_time, existing.start_time, now);
            existing.last_updated = now;
            existing.active = true;

            return Ok(UpsertOutcome {
                event_id: existing.id,
                created: false,
            });
        }

        let start_time = event.start_time.unwrap_or(now);
        let id = Uuid::new_v4();

        events.insert(
            key,
            TrafficEvent {
                id,
                source_name: source_name.to_string(),
                source_event_id: event.source_event_id.clone(),
                event_type: event.event_type,
                severity: event.severity,
                title: event.title.clone(),
                description: event.description.clone(),
                geometry: event.geometry.clone(),
                active: true,
                start_time,
                end_time: resolve_end_time(event.end_time, start_time, now),
                last_updated: now,
                metadata: event.metadata.clone(),
            },
        );

        Ok(UpsertOutcome {
            event_id: id,
            created: true,
        })
    }

    async fn deactivate_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut events = self.events.write().await;
        let mut flipped = 0;

        for event in events.values_mut() {
            if event.active && event.end_time <= now {
                event.active = false;
                flipped += 1;
            }
        }

        let horizon = now - self.retention;
        events.retain(|_, event| event.active || event.end_time > horizon);

        Ok(flipped)
    }
}
