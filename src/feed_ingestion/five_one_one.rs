// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

//! "511_json" feeds: a GeoJSON FeatureCollection of traffic incidents.

use crate::errors::FeedPollError;
use crate::traffic_events::{NormalizedEvent, TrafficEventType, TrafficSeverity};
use chrono::{DateTime, TimeZone, Utc};
use geojson::{GeoJson, feature::Id};
use serde_json::Value;
use tracing::warn;

pub const FORMAT_TAG: &str = "511_json";

pub fn normalize_event_type(raw: Option<&str>) -> TrafficEventType {
    match raw.map(|s| s.trim().to_lowercase()).as_deref() {
        Some("accident") | Some("crash") => TrafficEventType::Accident,
        Some("closure") | Some("road_closure") => TrafficEventType::Closure,
        Some("construction") | Some("work_zone") => TrafficEventType::Construction,
        Some("congestion") => TrafficEventType::Congestion,
        Some("hazard") => TrafficEventType::Hazard,
        _ => TrafficEventType::Other,
    }
}

pub fn normalize_severity(raw: Option<&str>) -> TrafficSeverity {
    match raw.map(|s| s.trim().to_lowercase()).as_deref() {
        Some("closure") | Some("closed") => TrafficSeverity::RoadClosure,
        Some("major") => TrafficSeverity::Major,
        Some("moderate") => TrafficSeverity::Moderate,
        Some("minor") | Some("low") => TrafficSeverity::Minor,
        _ => TrafficSeverity::Minor,
    }
}

/// RFC 3339 strings or unix seconds.
fn parse_time(value: Option<&Value>) -> Option<DateTime<Utc>> {
    match value? {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        Value::Number(n) => n.as_i64().and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
        _ => None,
    }
}

fn property_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn parse_feed(body: &str) -> Result<Vec<NormalizedEvent>, FeedPollError> {
    let geojson: GeoJson = body
        .parse()
        .map_err(|e: geojson::Error| FeedPollError::Payload(e.to_string()))?;

    let GeoJson::FeatureCollection(collection) = geojson else {
        return Err(FeedPollError::Payload(
            "expected a GeoJSON FeatureCollection".to_string(),
        ));
    };

    let mut events = Vec::with_capacity(collection.features.len());

    for feature in collection {
        let source_event_id = property_text(feature.property("id")).or_else(|| {
            feature.id.as_ref().map(|id| match id {
                Id::String(s) => s.clone(),
                Id::Number(n) => n.to_string(),
            })
        });

        let Some(source_event_id) = source_event_id else {
            warn!("511 feature without an id, skipping");
            continue;
        };

        let Some(geometry_json) = feature.geometry.clone() else {
            warn!(%source_event_id, "511 feature without geometry, skipping");
            continue;
        };

        let geometry: geo::Geometry = match geometry_json.try_into() {
            Ok(geometry) => geometry,
            Err(e) => {
                warn!(%source_event_id, error = %e, "511 feature geometry unusable, skipping");
                continue;
            }
        };

        events.push(NormalizedEvent {
            event_type: normalize_event_type(
                feature.property("event_type").and_then(|v| v.as_str()),
            ),
            severity: normalize_severity(feature.property("severity").and_then(|v| v.as_str())),
            title: property_text(feature.property("description")),
            description: property_text(feature.property("long_description")),
            start_time: parse_time(feature.property("start_time")),
            end_time: parse_time(feature.property("end_time")),
            metadata: feature
                .properties
                .clone()
                .map(Value::Object)
                .unwrap_or(Value::Null),
            geometry,
            source_event_id,
        });
    }

    Ok(events)
}
