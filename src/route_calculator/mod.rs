// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

//! Traffic-aware route calculation.
//!
//! Every request gets a baseline route from the self-hosted engine. Live traffic events near that
//! route are turned into penalties, and closures into no-go polygons. A dispatcher can ask for the
//! metered paid provider on high priority calls, which is granted only while the monthly budget
//! holds. Everything except the baseline engine degrades instead of failing the request.

pub mod records;

use crate::Coordinate;
use crate::budget_governor::BudgetGovernor;
use crate::errors::{RouteCalculationError, StoreError};
use crate::geometry_utils::{DEFAULT_CORRIDOR_BUFFER_M, route_corridor};
use crate::penalty_engine::{PenaltyEngine, PenaltyPlan};
use crate::routing_config::{RoutingConfig, RoutingConfigStore};
use crate::routing_engines::{BaselineRoutingEngine, PaidProviderRegistry, Route};
use crate::traffic_events::{TrafficEvent, TrafficEventStore};
use chrono::{DateTime, Utc};
use records::{RouteCalculation, RouteCalculationStore};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq)]
pub struct RouteRequest {
    pub origin: Coordinate,
    pub destination: Coordinate,
    pub incident_id: Option<String>,
    pub unit_id: Option<String>,
    pub priority_level: Option<String>,
    /// the dispatcher explicitly asked for the paid provider
    pub dispatcher_requested: bool,
    pub caller_id: Option<String>,
}

impl RouteRequest {
    pub fn new(origin: Coordinate, destination: Coordinate) -> Self {
        RouteRequest {
            origin,
            destination,
            incident_id: None,
            unit_id: None,
            priority_level: None,
            dispatcher_requested: false,
            caller_id: None,
        }
    }
}

/// Everything but the budget: paid routing on, asked for, high priority, and traffic to avoid.
pub fn escalation_requested(
    config: &RoutingConfig,
    request: &RouteRequest,
    matched_events: usize,
) -> bool {
    config.paid_api_enabled
        && request.dispatcher_requested
        && config.is_high_priority(request.priority_level.as_deref())
        && matched_events > 0
}

fn whole_seconds(seconds: f64) -> i32 {
    seconds.round().clamp(0.0, i32::MAX as f64) as i32
}

struct PaidOutcome {
    route: Route,
    provider: String,
    cost_cents: i64,
}

pub struct RouteCalculator {
    baseline: Arc<dyn BaselineRoutingEngine>,
    paid_providers: PaidProviderRegistry,
    events: Arc<dyn TrafficEventStore>,
    config: Arc<dyn RoutingConfigStore>,
    budget: BudgetGovernor,
    records: Arc<dyn RouteCalculationStore>,
    corridor_buffer_m: f64,
}

impl RouteCalculator {
    pub fn new(
        baseline: Arc<dyn BaselineRoutingEngine>,
        paid_providers: PaidProviderRegistry,
        events: Arc<dyn TrafficEventStore>,
        config: Arc<dyn RoutingConfigStore>,
        records: Arc<dyn RouteCalculationStore>,
    ) -> Self {
        RouteCalculator {
            budget: BudgetGovernor::new(config.clone()),
            baseline,
            paid_providers,
            events,
            config,
            records,
            corridor_buffer_m: DEFAULT_CORRIDOR_BUFFER_M,
        }
    }

    pub fn with_corridor_buffer(mut self, corridor_buffer_m: f64) -> Self {
        self.corridor_buffer_m = corridor_buffer_m;
        self
    }

    pub async fn compute_route(
        &self,
        request: RouteRequest,
    ) -> Result<RouteCalculation, RouteCalculationError> {
        let started = Instant::now();
        let now = Utc::now();
        let config = self.load_config().await;

        let baseline = self
            .baseline
            .route(
                &config.baseline_engine_endpoint,
                request.origin,
                request.destination,
                &[],
            )
            .await
            .map_err(RouteCalculationError::BaselineEngine)?;

        let matched = self.matched_events(&baseline.geometry, now).await;
        let plan = PenaltyEngine::apply(&config, &matched);

        let mut record = RouteCalculation {
            id: Uuid::new_v4(),
            incident_id: request.incident_id.clone(),
            unit_id: request.unit_id.clone(),
            requested_by: request.caller_id.clone(),
            priority_level: request.priority_level.clone(),
            origin: request.origin,
            destination: request.destination,
            routing_engine: self.baseline.name().to_string(),
            baseline_eta_seconds: whole_seconds(baseline.duration_seconds),
            baseline_distance_meters: baseline.distance_meters,
            baseline_geometry: Some(baseline.geometry.clone()),
            traffic_adjusted: false,
            traffic_adjusted_eta_seconds: None,
            traffic_adjusted_distance_meters: None,
            traffic_adjusted_geometry: None,
            traffic_event_ids: plan.event_ids(),
            penalties_applied: plan.penalties.clone(),
            paid_api_used: false,
            paid_api_provider: None,
            paid_api_cost_cents: 0,
            calculation_time_ms: 0,
            dispatcher_requested: request.dispatcher_requested,
            created_at: now,
        };

        if !plan.is_empty() {
            let paid = if escalation_requested(&config, &request, matched.len()) {
                self.escalate(&config, &request).await
            } else {
                None
            };

            match paid {
                Some(paid) => {
                    record.routing_engine = paid.provider.clone();
                    record.paid_api_used = true;
                    record.paid_api_provider = Some(paid.provider);
                    record.paid_api_cost_cents =
                        i32::try_from(paid.cost_cents).unwrap_or(i32::MAX);
                    record.traffic_adjusted = true;
                    record.traffic_adjusted_eta_seconds =
                        Some(whole_seconds(paid.route.duration_seconds));
                    record.traffic_adjusted_distance_meters = Some(paid.route.distance_meters);
                    record.traffic_adjusted_geometry = Some(paid.route.geometry);
                }
                None => {
                    let (adjusted, closures_avoided) = self
                        .adjusted_baseline(&config, &request, &baseline, &plan)
                        .await;
                    let penalty_seconds =
                        match route_corridor(&adjusted.geometry, self.corridor_buffer_m) {
                            Some(corridor) => {
                                plan.penalty_seconds_within(&corridor, closures_avoided)
                            }
                            None => plan.total_penalty_seconds(),
                        };

                    record.traffic_adjusted = true;
                    record.traffic_adjusted_eta_seconds = Some(whole_seconds(
                        adjusted.duration_seconds + penalty_seconds as f64,
                    ));
                    record.traffic_adjusted_distance_meters = Some(adjusted.distance_meters);
                    record.traffic_adjusted_geometry = Some(adjusted.geometry);
                }
            }
        }

        record.calculation_time_ms = started.elapsed().as_millis() as i64;

        if let Err(e) = self.records.insert(&record).await {
            error!(route_calculation_id = %record.id, error = %e, "could not persist route calculation");
        }

        info!(
            route_calculation_id = %record.id,
            incident_id = ?record.incident_id,
            unit_id = ?record.unit_id,
            engine = %record.routing_engine,
            matched_events = record.traffic_event_ids.len(),
            baseline_eta_seconds = record.baseline_eta_seconds,
            adjusted_eta_seconds = ?record.traffic_adjusted_eta_seconds,
            paid_api_used = record.paid_api_used,
            calculation_time_ms = record.calculation_time_ms,
            "route calculated"
        );

        Ok(record)
    }

    pub async fn calculations_for_incident(
        &self,
        incident_id: &str,
    ) -> Result<Vec<RouteCalculation>, StoreError> {
        self.records.for_incident(incident_id).await
    }

    pub async fn calculations_for_unit(
        &self,
        unit_id: &str,
    ) -> Result<Vec<RouteCalculation>, StoreError> {
        self.records.for_unit(unit_id).await
    }

    async fn load_config(&self) -> RoutingConfig {
        match self.config.load().await {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "routing config unavailable, using defaults with paid routing off");
                RoutingConfig::default()
            }
        }
    }

    async fn matched_events(&self, route: &geo::LineString, now: DateTime<Utc>) -> Vec<TrafficEvent> {
        let Some(corridor) = route_corridor(route, self.corridor_buffer_m) else {
            return vec![];
        };

        match self.events.active_events_in_corridor(&corridor, now).await {
            Ok(events) => events,
            Err(e) => {
                warn!(error = %e, "traffic events unavailable, routing without traffic");
                vec![]
            }
        }
    }

    async fn escalate(&self, config: &RoutingConfig, request: &RouteRequest) -> Option<PaidOutcome> {
        let Some(provider) = self.paid_providers.get(&config.paid_api_provider) else {
            warn!(provider = %config.paid_api_provider, "paid provider is not registered");
            return None;
        };

        let Some(permit) = self.budget.reserve(provider.cost_per_request_cents()).await else {
            info!(provider = %config.paid_api_provider, "monthly paid routing budget exhausted");
            return None;
        };

        match provider
            .calculate_route(request.origin, request.destination)
            .await
        {
            Ok(route) => {
                let cost_cents = provider.cost_per_request_cents();

                if let Err(e) = permit.commit(cost_cents).await {
                    error!(provider = provider.name(), cost_cents, error = %e, "paid call succeeded but spend was not recorded");
                }

                Some(PaidOutcome {
                    route,
                    provider: provider.name().to_string(),
                    cost_cents,
                })
            }
            Err(e) => {
                warn!(provider = provider.name(), error = %e, "paid provider failed, falling back to baseline");
                None
            }
        }
    }

    /// Baseline route re-requested around closures. Time-only penalties never change the path.
    /// The flag is set only when the engine actually planned around the exclusions.
    async fn adjusted_baseline(
        &self,
        config: &RoutingConfig,
        request: &RouteRequest,
        baseline: &Route,
        plan: &PenaltyPlan,
    ) -> (Route, bool) {
        if !plan.has_exclusions() {
            return (baseline.clone(), false);
        }

        match self
            .baseline
            .route(
                &config.baseline_engine_endpoint,
                request.origin,
                request.destination,
                &plan.exclusions,
            )
            .await
        {
            Ok(route) => (route, true),
            Err(e) => {
                warn!(error = %e, exclusions = plan.exclusions.len(), "no route around closures, keeping baseline path");
                (baseline.clone(), false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::RoutingEngineError;
    use crate::routing_config::memory::InMemoryRoutingConfigStore;
    use crate::routing_engines::PaidRoutingProvider;
    use crate::traffic_events::memory::InMemoryTrafficEventStore;
    use crate::traffic_events::{TrafficEventType, TrafficSeverity};
    use async_trait::async_trait;
    use chrono::Duration;
    use geo::{Intersects, LineString, Point};
    use records::InMemoryRouteCalculationStore;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const ORIGIN: Coordinate = Coordinate {
        lat: 42.00,
        lon: -87.90,
    };
    const DESTINATION: Coordinate = Coordinate {
        lat: 42.05,
        lon: -87.95,
    };

    fn direct_route() -> Route {
        Route {
            duration_seconds: 600.0,
            distance_meters: 6900.0,
            geometry: LineString::from(vec![(-87.90, 42.00), (-87.925, 42.025), (-87.95, 42.05)]),
        }
    }

    fn detour_route() -> Route {
        Route {
            duration_seconds: 780.0,
            distance_meters: 9700.0,
            geometry: LineString::from(vec![(-87.90, 42.00), (-87.90, 42.05), (-87.95, 42.05)]),
        }
    }

    /// Parallel street roughly 150-200m east of the closure on the direct path.
    fn parallel_detour() -> Route {
        Route {
            duration_seconds: 660.0,
            distance_meters: 7100.0,
            geometry: LineString::from(vec![(-87.90, 42.00), (-87.9226, 42.025), (-87.95, 42.05)]),
        }
    }

    /// Takes the direct path unless an exclusion blocks it.
    #[derive(Default)]
    struct FakeBaseline {
        fail: bool,
        /// returned instead of `detour_route` when the direct path is blocked
        detour: Option<Route>,
        /// no way around exclusions at all
        cannot_detour: bool,
        exclusions_seen: Mutex<Vec<Vec<geo::Polygon>>>,
    }

    #[async_trait]
    impl BaselineRoutingEngine for FakeBaseline {
        fn name(&self) -> &str {
            "valhalla"
        }

        async fn route(
            &self,
            _endpoint: &str,
            _origin: Coordinate,
            _destination: Coordinate,
            exclusions: &[geo::Polygon],
        ) -> Result<Route, RoutingEngineError> {
            if self.fail {
                return Err(RoutingEngineError::Status {
                    status: 503,
                    message: "down".to_string(),
                });
            }

            self.exclusions_seen.lock().unwrap().push(exclusions.to_vec());

            if self.cannot_detour && !exclusions.is_empty() {
                return Err(RoutingEngineError::NoRoute);
            }

            let direct = direct_route();
            if exclusions.iter().any(|p| p.intersects(&direct.geometry)) {
                Ok(self.detour.clone().unwrap_or_else(detour_route))
            } else {
                Ok(direct)
            }
        }
    }

    struct FakePaid {
        times_out: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PaidRoutingProvider for FakePaid {
        fn name(&self) -> &str {
            "mapbox"
        }

        fn cost_per_request_cents(&self) -> i64 {
            3
        }

        async fn calculate_route(
            &self,
            _origin: Coordinate,
            _destination: Coordinate,
        ) -> Result<Route, RoutingEngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.times_out {
                Err(RoutingEngineError::Timeout(5000))
            } else {
                Ok(Route {
                    duration_seconds: 690.0,
                    distance_meters: 7200.0,
                    geometry: LineString::from(vec![(-87.90, 42.00), (-87.95, 42.00), (-87.95, 42.05)]),
                })
            }
        }
    }

    /// Answers after a fixed delay, like a provider near its timeout.
    struct SlowPaid {
        delay: std::time::Duration,
    }

    #[async_trait]
    impl PaidRoutingProvider for SlowPaid {
        fn name(&self) -> &str {
            "mapbox"
        }

        fn cost_per_request_cents(&self) -> i64 {
            1
        }

        async fn calculate_route(
            &self,
            _origin: Coordinate,
            _destination: Coordinate,
        ) -> Result<Route, RoutingEngineError> {
            tokio::time::sleep(self.delay).await;
            Err(RoutingEngineError::Timeout(self.delay.as_millis() as u64))
        }
    }

    struct BrokenEvents;

    #[async_trait]
    impl TrafficEventStore for BrokenEvents {
        async fn active_events(&self, _now: DateTime<Utc>) -> Result<Vec<TrafficEvent>, StoreError> {
            Err(StoreError::Pool("connection refused".to_string()))
        }

        async fn find_by_dedup_key(
            &self,
            _source_name: &str,
            _source_event_id: &str,
        ) -> Result<Option<TrafficEvent>, StoreError> {
            Err(StoreError::Pool("connection refused".to_string()))
        }

        async fn upsert_event(
            &self,
            _source_name: &str,
            _event: &crate::traffic_events::NormalizedEvent,
            _now: DateTime<Utc>,
        ) -> Result<crate::traffic_events::UpsertOutcome, StoreError> {
            Err(StoreError::Pool("connection refused".to_string()))
        }

        async fn deactivate_expired(&self, _now: DateTime<Utc>) -> Result<usize, StoreError> {
            Err(StoreError::Pool("connection refused".to_string()))
        }
    }

    fn event_on_route(severity: TrafficSeverity) -> TrafficEvent {
        let now = Utc::now();
        TrafficEvent {
            id: Uuid::new_v4(),
            source_name: "il_511".to_string(),
            source_event_id: format!("evt-{}", severity),
            event_type: match severity {
                TrafficSeverity::RoadClosure => TrafficEventType::Closure,
                _ => TrafficEventType::Accident,
            },
            severity,
            title: None,
            description: None,
            geometry: geo::Geometry::Point(Point::new(-87.925, 42.025)),
            active: true,
            start_time: now - Duration::minutes(10),
            end_time: now + Duration::hours(1),
            last_updated: now,
            metadata: serde_json::Value::Null,
        }
    }

    fn escalation_config(budget: i64, spend: i64) -> RoutingConfig {
        RoutingConfig {
            paid_api_enabled: true,
            monthly_budget_cents: budget,
            current_month_spend_cents: spend,
            spend_month: crate::billing_month(Utc::now()),
            high_priority_levels: vec!["P1".to_string()],
            ..RoutingConfig::default()
        }
    }

    fn escalating_request() -> RouteRequest {
        RouteRequest {
            incident_id: Some("INC-7".to_string()),
            unit_id: Some("M12".to_string()),
            priority_level: Some("P1".to_string()),
            dispatcher_requested: true,
            ..RouteRequest::new(ORIGIN, DESTINATION)
        }
    }

    struct Harness {
        calculator: RouteCalculator,
        baseline: Arc<FakeBaseline>,
        paid: Arc<FakePaid>,
        config: Arc<InMemoryRoutingConfigStore>,
        records: Arc<InMemoryRouteCalculationStore>,
    }

    async fn harness(
        config: RoutingConfig,
        events: Vec<TrafficEvent>,
        paid_times_out: bool,
    ) -> Harness {
        harness_with_baseline(FakeBaseline::default(), config, events, paid_times_out).await
    }

    async fn harness_with_baseline(
        baseline: FakeBaseline,
        config: RoutingConfig,
        events: Vec<TrafficEvent>,
        paid_times_out: bool,
    ) -> Harness {
        let baseline = Arc::new(baseline);
        let paid = Arc::new(FakePaid {
            times_out: paid_times_out,
            calls: AtomicUsize::new(0),
        });
        let store = Arc::new(InMemoryTrafficEventStore::new());
        for event in events {
            store.insert(event).await;
        }
        let config = Arc::new(InMemoryRoutingConfigStore::new(config));
        let records = Arc::new(InMemoryRouteCalculationStore::new());

        let mut registry = PaidProviderRegistry::new();
        registry.register(paid.clone());

        let calculator = RouteCalculator::new(
            baseline.clone(),
            registry,
            store,
            config.clone(),
            records.clone(),
        );

        Harness {
            calculator,
            baseline,
            paid,
            config,
            records,
        }
    }

    #[tokio::test]
    async fn quiet_roads_leave_the_baseline_alone() {
        let h = harness(RoutingConfig::default(), vec![], false).await;

        let record = h
            .calculator
            .compute_route(RouteRequest::new(ORIGIN, DESTINATION))
            .await
            .unwrap();

        assert!(!record.traffic_adjusted);
        assert_eq!(record.baseline_eta_seconds, 600);
        assert_eq!(record.traffic_adjusted_eta_seconds, None);
        assert!(record.traffic_event_ids.is_empty());
        assert_eq!(h.baseline.exclusions_seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn major_event_lengthens_eta_without_paid_routing() {
        let event = event_on_route(TrafficSeverity::Major);
        let h = harness(RoutingConfig::default(), vec![event.clone()], false).await;

        let record = h
            .calculator
            .compute_route(RouteRequest::new(ORIGIN, DESTINATION))
            .await
            .unwrap();

        assert!(record.traffic_adjusted);
        assert!(!record.paid_api_used);
        assert!(record.baseline_eta_seconds < record.traffic_adjusted_eta_seconds.unwrap());
        assert_eq!(record.traffic_adjusted_eta_seconds, Some(600 + 420));
        assert_eq!(record.traffic_event_ids, vec![event.id]);
        assert_eq!(record.traffic_adjusted_geometry, record.baseline_geometry);
        // penalties alone never go back to the engine
        assert_eq!(h.baseline.exclusions_seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn closure_forces_a_physical_detour() {
        let closure = event_on_route(TrafficSeverity::RoadClosure);
        let h = harness(RoutingConfig::default(), vec![closure], false).await;

        let record = h
            .calculator
            .compute_route(RouteRequest::new(ORIGIN, DESTINATION))
            .await
            .unwrap();

        assert!(record.traffic_adjusted);
        assert_ne!(record.traffic_adjusted_geometry, record.baseline_geometry);
        assert_eq!(record.traffic_adjusted_distance_meters, Some(9700.0));
        // the detour clears the closure, so only its travel time counts
        assert_eq!(record.traffic_adjusted_eta_seconds, Some(780));

        let calls = h.baseline.exclusions_seen.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].len(), 1);
        assert!(calls[1][0].intersects(&Point::new(-87.925, 42.025)));
    }

    #[tokio::test]
    async fn parallel_street_detour_does_not_pay_for_avoided_closure() {
        let closure = event_on_route(TrafficSeverity::RoadClosure);
        let h = harness_with_baseline(
            FakeBaseline {
                detour: Some(parallel_detour()),
                ..FakeBaseline::default()
            },
            RoutingConfig::default(),
            vec![closure],
            false,
        )
        .await;

        let record = h
            .calculator
            .compute_route(RouteRequest::new(ORIGIN, DESTINATION))
            .await
            .unwrap();

        assert_eq!(
            record.traffic_adjusted_geometry,
            Some(parallel_detour().geometry)
        );
        assert_eq!(record.traffic_adjusted_eta_seconds, Some(660));
        // still audited
        assert_eq!(record.penalties_applied[0].penalty_seconds, 900);
        assert!(record.penalties_applied[0].excluded);
    }

    #[tokio::test]
    async fn failed_detour_keeps_baseline_and_pays_for_closure() {
        let closure = event_on_route(TrafficSeverity::RoadClosure);
        let h = harness_with_baseline(
            FakeBaseline {
                cannot_detour: true,
                ..FakeBaseline::default()
            },
            RoutingConfig::default(),
            vec![closure],
            false,
        )
        .await;

        let record = h
            .calculator
            .compute_route(RouteRequest::new(ORIGIN, DESTINATION))
            .await
            .unwrap();

        assert_eq!(record.traffic_adjusted_geometry, record.baseline_geometry);
        assert_eq!(record.traffic_adjusted_eta_seconds, Some(600 + 900));
    }

    #[tokio::test]
    async fn exhausted_budget_overrides_dispatcher_request() {
        let h = harness(
            escalation_config(500, 500),
            vec![event_on_route(TrafficSeverity::Major)],
            false,
        )
        .await;

        let record = h.calculator.compute_route(escalating_request()).await.unwrap();

        assert!(!record.paid_api_used);
        assert_eq!(record.paid_api_cost_cents, 0);
        assert_eq!(h.paid.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn paid_timeout_falls_back_to_baseline() {
        let h = harness(
            escalation_config(500, 0),
            vec![event_on_route(TrafficSeverity::Major)],
            true,
        )
        .await;

        let record = h.calculator.compute_route(escalating_request()).await.unwrap();

        assert_eq!(h.paid.calls.load(Ordering::SeqCst), 1);
        assert!(record.traffic_adjusted);
        assert!(!record.paid_api_used);
        assert_eq!(record.paid_api_cost_cents, 0);
        assert_eq!(record.routing_engine, "valhalla");
        assert_eq!(h.config.load().await.unwrap().current_month_spend_cents, 0);
    }

    #[tokio::test]
    async fn successful_escalation_is_charged_once() {
        let h = harness(
            escalation_config(500, 0),
            vec![event_on_route(TrafficSeverity::Major)],
            false,
        )
        .await;

        let record = h.calculator.compute_route(escalating_request()).await.unwrap();

        assert!(record.paid_api_used);
        assert_eq!(record.paid_api_provider.as_deref(), Some("mapbox"));
        assert_eq!(record.routing_engine, "mapbox");
        assert_eq!(record.paid_api_cost_cents, 3);
        assert_eq!(record.traffic_adjusted_eta_seconds, Some(690));
        assert_eq!(h.config.load().await.unwrap().current_month_spend_cents, 3);
    }

    #[test]
    fn escalation_needs_every_condition() {
        let base = escalating_request();
        let config = escalation_config(500, 0);

        assert!(escalation_requested(&config, &base, 1));
        assert!(!escalation_requested(&config, &base, 0));
        assert!(!escalation_requested(
            &config,
            &RouteRequest {
                dispatcher_requested: false,
                ..base.clone()
            },
            1
        ));
        assert!(!escalation_requested(
            &config,
            &RouteRequest {
                priority_level: Some("P3".to_string()),
                ..base.clone()
            },
            1
        ));
        assert!(!escalation_requested(
            &RoutingConfig {
                paid_api_enabled: false,
                ..config.clone()
            },
            &base,
            1
        ));
    }

    #[tokio::test]
    async fn concurrent_escalations_are_all_charged() {
        let h = harness(
            escalation_config(1_000_000, 0),
            vec![event_on_route(TrafficSeverity::Major)],
            false,
        )
        .await;
        let calculator = Arc::new(h.calculator);

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let calculator = calculator.clone();
                tokio::spawn(async move { calculator.compute_route(escalating_request()).await })
            })
            .collect();

        for task in tasks {
            assert!(task.await.unwrap().unwrap().paid_api_used);
        }

        assert_eq!(h.config.load().await.unwrap().current_month_spend_cents, 16 * 3);
    }

    #[tokio::test]
    async fn slow_paid_calls_do_not_queue_behind_each_other() {
        let delay = std::time::Duration::from_millis(400);
        let store = Arc::new(InMemoryTrafficEventStore::new());
        store.insert(event_on_route(TrafficSeverity::Major)).await;
        let config = Arc::new(InMemoryRoutingConfigStore::new(escalation_config(1_000, 0)));

        let mut registry = PaidProviderRegistry::new();
        registry.register(Arc::new(SlowPaid { delay }));

        let calculator = Arc::new(RouteCalculator::new(
            Arc::new(FakeBaseline::default()),
            registry,
            store,
            config.clone(),
            Arc::new(InMemoryRouteCalculationStore::new()),
        ));

        let started = Instant::now();
        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let calculator = calculator.clone();
                tokio::spawn(async move { calculator.compute_route(escalating_request()).await })
            })
            .collect();

        for task in tasks {
            assert!(!task.await.unwrap().unwrap().paid_api_used);
        }

        // four calls one after another would take four delays
        assert!(started.elapsed() < delay * 2);
        assert_eq!(config.load().await.unwrap().current_month_spend_cents, 0);
    }

    #[tokio::test]
    async fn baseline_failure_is_fatal() {
        let calculator = RouteCalculator::new(
            Arc::new(FakeBaseline {
                fail: true,
                ..FakeBaseline::default()
            }),
            PaidProviderRegistry::new(),
            Arc::new(InMemoryTrafficEventStore::new()),
            Arc::new(InMemoryRoutingConfigStore::new(RoutingConfig::default())),
            Arc::new(InMemoryRouteCalculationStore::new()),
        );

        let result = calculator
            .compute_route(RouteRequest::new(ORIGIN, DESTINATION))
            .await;

        assert!(matches!(
            result,
            Err(RouteCalculationError::BaselineEngine(RoutingEngineError::Status { status: 503, .. }))
        ));
    }

    #[tokio::test]
    async fn unavailable_traffic_data_still_routes() {
        let records = Arc::new(InMemoryRouteCalculationStore::new());
        let calculator = RouteCalculator::new(
            Arc::new(FakeBaseline::default()),
            PaidProviderRegistry::new(),
            Arc::new(BrokenEvents),
            Arc::new(InMemoryRoutingConfigStore::new(RoutingConfig::default())),
            records.clone(),
        );

        let record = calculator
            .compute_route(RouteRequest::new(ORIGIN, DESTINATION))
            .await
            .unwrap();

        assert!(!record.traffic_adjusted);
        assert_eq!(record.baseline_eta_seconds, 600);
    }

    #[tokio::test]
    async fn calculations_are_recorded_per_incident_and_unit() {
        let h = harness(
            RoutingConfig::default(),
            vec![event_on_route(TrafficSeverity::Moderate)],
            false,
        )
        .await;

        let record = h.calculator.compute_route(escalating_request()).await.unwrap();

        let by_incident = h.calculator.calculations_for_incident("INC-7").await.unwrap();
        assert_eq!(by_incident, vec![record.clone()]);

        let by_unit = h.records.for_unit("M12").await.unwrap();
        assert_eq!(by_unit[0].id, record.id);
        assert_eq!(by_unit[0].penalties_applied[0].penalty_seconds, 180);
        assert!(by_unit[0].dispatcher_requested);
    }
}
