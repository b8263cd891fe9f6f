// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

//! Turns matched traffic events into time penalties and closure exclusions.

use crate::geometry_utils::{
    CLOSURE_EXCLUSION_BUFFER_M, exclusion_polygons, geometry_intersects_corridor,
};
use crate::routing_config::RoutingConfig;
use crate::traffic_events::{TrafficEvent, TrafficSeverity};
use tracing::debug;
use uuid::Uuid;

/// One entry of the `penalties_applied` audit column.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AppliedPenalty {
    pub event_id: Uuid,
    pub severity: TrafficSeverity,
    pub penalty_seconds: i32,
    /// closures are submitted to the engine as no-go areas
    pub excluded: bool,
}

#[derive(Clone, Debug, Default)]
pub struct PenaltyPlan {
    pub penalties: Vec<AppliedPenalty>,
    pub exclusions: Vec<geo::Polygon>,
    footprints: Vec<geo::Geometry>,
}

impl PenaltyPlan {
    pub fn is_empty(&self) -> bool {
        self.penalties.is_empty()
    }

    pub fn has_exclusions(&self) -> bool {
        !self.exclusions.is_empty()
    }

    pub fn event_ids(&self) -> Vec<Uuid> {
        self.penalties.iter().map(|p| p.event_id).collect()
    }

    pub fn total_penalty_seconds(&self) -> i64 {
        self.penalties
            .iter()
            .map(|p| p.penalty_seconds as i64)
            .sum()
    }

    /// Penalty seconds for the events still touching `corridor`. A detour that clears an
    /// event stops paying for it.
    ///
    /// When the route was planned around the exclusions, closures cost nothing even if a
    /// parallel street keeps them inside the corridor.
    pub fn penalty_seconds_within(
        &self,
        corridor: &geo::MultiPolygon,
        closures_avoided: bool,
    ) -> i64 {
        self.penalties
            .iter()
            .zip(self.footprints.iter())
            .filter(|(p, _)| !(closures_avoided && p.excluded))
            .filter(|(_, footprint)| geometry_intersects_corridor(footprint, corridor))
            .map(|(p, _)| p.penalty_seconds as i64)
            .sum()
    }
}

pub struct PenaltyEngine;

impl PenaltyEngine {
    pub fn apply(config: &RoutingConfig, events: &[TrafficEvent]) -> PenaltyPlan {
        let mut plan = PenaltyPlan::default();

        for event in events {
            let penalty_seconds = config.penalty_seconds_for(event.severity);
            let excluded = event.severity == TrafficSeverity::RoadClosure;

            if excluded {
                let polygons = exclusion_polygons(&event.geometry, CLOSURE_EXCLUSION_BUFFER_M);
                debug!(event_id = %event.id, polygons = polygons.len(), "closure becomes exclusion");
                plan.exclusions.extend(polygons);
            }

            plan.penalties.push(AppliedPenalty {
                event_id: event.id,
                severity: event.severity,
                penalty_seconds,
                excluded,
            });
            plan.footprints.push(event.geometry.clone());
        }

        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry_utils::route_corridor;
    use crate::traffic_events::TrafficEventType;
    use chrono::{Duration, Utc};
    use geo::{LineString, Point};

    fn event(severity: TrafficSeverity, lon: f64, lat: f64) -> TrafficEvent {
        let now = Utc::now();
        TrafficEvent {
            id: Uuid::new_v4(),
            source_name: "il_511".to_string(),
            source_event_id: format!("{}-{}", lon, lat),
            event_type: TrafficEventType::Accident,
            severity,
            title: None,
            description: None,
            geometry: geo::Geometry::Point(Point::new(lon, lat)),
            active: true,
            start_time: now,
            end_time: now + Duration::hours(1),
            last_updated: now,
            metadata: serde_json::Value::Null,
        }
    }

    #[test]
    fn unconfigured_severity_costs_sixty_seconds() {
        let mut config = RoutingConfig::default();
        config.severity_penalties.clear();

        let plan = PenaltyEngine::apply(&config, &[event(TrafficSeverity::Major, -87.9, 42.0)]);

        assert_eq!(plan.penalties[0].penalty_seconds, 60);
        assert_eq!(plan.total_penalty_seconds(), 60);
    }

    #[test]
    fn configured_penalties_are_used() {
        let config = RoutingConfig::default();
        let plan = PenaltyEngine::apply(
            &config,
            &[
                event(TrafficSeverity::Minor, -87.9, 42.0),
                event(TrafficSeverity::Major, -87.91, 42.01),
            ],
        );

        assert_eq!(plan.total_penalty_seconds(), 60 + 420);
        assert!(!plan.has_exclusions());
    }

    #[test]
    fn closure_adds_an_exclusion_and_still_a_penalty() {
        let config = RoutingConfig::default();
        let closure = event(TrafficSeverity::RoadClosure, -87.925, 42.025);

        let plan = PenaltyEngine::apply(&config, std::slice::from_ref(&closure));

        assert_eq!(plan.exclusions.len(), 1);
        assert!(plan.penalties[0].excluded);
        assert_eq!(plan.event_ids(), vec![closure.id]);
    }

    #[test]
    fn detoured_events_stop_counting() {
        let config = RoutingConfig::default();
        let plan = PenaltyEngine::apply(
            &config,
            &[
                event(TrafficSeverity::Major, -87.925, 42.025),
                event(TrafficSeverity::Minor, -87.95, 42.05),
            ],
        );

        // runs east of the first event, ends at the second
        let detour = LineString::from(vec![(-87.9, 42.0), (-87.9, 42.05), (-87.95, 42.05)]);
        let corridor = route_corridor(&detour, 500.0).unwrap();

        assert_eq!(plan.penalty_seconds_within(&corridor, false), 60);
    }

    #[test]
    fn avoided_closure_near_the_route_costs_nothing() {
        let config = RoutingConfig::default();
        let plan = PenaltyEngine::apply(
            &config,
            &[
                event(TrafficSeverity::RoadClosure, -87.925, 42.025),
                event(TrafficSeverity::Moderate, -87.925, 42.025),
            ],
        );

        // parallel street about 200m east of both events
        let parallel = LineString::from(vec![(-87.9226, 42.0), (-87.9226, 42.05)]);
        let corridor = route_corridor(&parallel, 500.0).unwrap();

        assert_eq!(plan.penalty_seconds_within(&corridor, true), 180);
        // the same path without a successful re-route still pays for the closure
        assert_eq!(plan.penalty_seconds_within(&corridor, false), 900 + 180);
    }

    #[test]
    fn penalties_serialize_for_audit() {
        let penalty = AppliedPenalty {
            event_id: Uuid::nil(),
            severity: TrafficSeverity::RoadClosure,
            penalty_seconds: 900,
            excluded: true,
        };

        let value = serde_json::to_value(&penalty).unwrap();
        assert_eq!(value["severity"], "ROAD_CLOSURE");
        assert_eq!(value["penalty_seconds"], 900);
    }
}
