// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

//! Canonical traffic events and the stores that track them.

pub mod memory;
pub mod postgres;

use crate::errors::StoreError;
use crate::geometry_utils::geometry_intersects_corridor;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// How long an event without a published end time is assumed to last.
pub const DEFAULT_EVENT_TTL_SECONDS: i64 = 2 * 60 * 60;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrafficEventType {
    Accident,
    Closure,
    Construction,
    Congestion,
    Hazard,
    Other,
}

impl TrafficEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrafficEventType::Accident => "ACCIDENT",
            TrafficEventType::Closure => "CLOSURE",
            TrafficEventType::Construction => "CONSTRUCTION",
            TrafficEventType::Congestion => "CONGESTION",
            TrafficEventType::Hazard => "HAZARD",
            TrafficEventType::Other => "OTHER",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "ACCIDENT" => Some(TrafficEventType::Accident),
            "CLOSURE" => Some(TrafficEventType::Closure),
            "CONSTRUCTION" => Some(TrafficEventType::Construction),
            "CONGESTION" => Some(TrafficEventType::Congestion),
            "HAZARD" => Some(TrafficEventType::Hazard),
            "OTHER" => Some(TrafficEventType::Other),
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrafficSeverity {
    Minor,
    Moderate,
    Major,
    RoadClosure,
}

impl TrafficSeverity {
    pub const ALL: [TrafficSeverity; 4] = [
        TrafficSeverity::Minor,
        TrafficSeverity::Moderate,
        TrafficSeverity::Major,
        TrafficSeverity::RoadClosure,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TrafficSeverity::Minor => "MINOR",
            TrafficSeverity::Moderate => "MODERATE",
            TrafficSeverity::Major => "MAJOR",
            TrafficSeverity::RoadClosure => "ROAD_CLOSURE",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "MINOR" => Some(TrafficSeverity::Minor),
            "MODERATE" => Some(TrafficSeverity::Moderate),
            "MAJOR" => Some(TrafficSeverity::Major),
            "ROAD_CLOSURE" => Some(TrafficSeverity::RoadClosure),
            _ => None,
        }
    }
}

impl fmt::Display for TrafficSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TrafficEvent {
    pub id: Uuid,
    pub source_name: String,
    pub source_event_id: String,
    pub event_type: TrafficEventType,
    pub severity: TrafficSeverity,
    pub title: Option<String>,
    pub description: Option<String>,
    pub geometry: geo::Geometry,
    pub active: bool,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub metadata: Value,
}

impl TrafficEvent {
    /// An event only counts if it is flagged active and its window has not closed.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.active && self.end_time > now
    }
}

/// A feed record after vocabulary normalisation, before it touches storage.
#[derive(Clone, Debug, PartialEq)]
pub struct NormalizedEvent {
    pub source_event_id: String,
    pub event_type: TrafficEventType,
    pub severity: TrafficSeverity,
    pub title: Option<String>,
    pub description: Option<String>,
    pub geometry: geo::Geometry,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub metadata: Value,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub event_id: Uuid,
    pub created: bool,
}

/// End of an event's validity window.
///
/// A published end time is used when it falls after `start`; otherwise the event is
/// assumed to last [`DEFAULT_EVENT_TTL_SECONDS`] from now (or from `start`, if later).
pub fn resolve_end_time(
    published_end: Option<DateTime<Utc>>,
    start: DateTime<Utc>,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    match published_end {
        Some(end) if end > start => end,
        _ => start.max(now) + Duration::seconds(DEFAULT_EVENT_TTL_SECONDS),
    }
}

#[async_trait]
pub trait TrafficEventStore: Send + Sync {
    /// Events that are flagged active and whose end_time is after `now`.
    async fn active_events(&self, now: DateTime<Utc>) -> Result<Vec<TrafficEvent>, StoreError>;

    async fn find_by_dedup_key(
        &self,
        source_name: &str,
        source_event_id: &str,
    ) -> Result<Option<TrafficEvent>, StoreError>;

    /// Inserts or refreshes the event keyed by (source_name, source_event_id).
    /// Always leaves the event active.
    async fn upsert_event(
        &self,
        source_name: &str,
        event: &NormalizedEvent,
        now: DateTime<Utc>,
    ) -> Result<UpsertOutcome, StoreError>;

    /// Flips `active=false` on events whose window closed at or before `now`.
    async fn deactivate_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError>;

    /// Live events whose geometry touches the corridor. Linear scan over the live set.
    async fn active_events_in_corridor(
        &self,
        corridor: &geo::MultiPolygon,
        now: DateTime<Utc>,
    ) -> Result<Vec<TrafficEvent>, StoreError> {
        let events = self.active_events(now).await?;

        Ok(events
            .into_iter()
            .filter(|event| event.is_live(now))
            .filter(|event| geometry_intersects_corridor(&event.geometry, corridor))
            .collect())
    }
}
