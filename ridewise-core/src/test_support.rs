//! Deterministic fixtures shared by unit, behaviour and downstream tests.
//!
//! Predictors here count their calls so tests can assert how often the
//! engine consulted them.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::{
    Clock, DemandPrediction, DemandPredictor, HistorySource, LatLng, PredictorError, RouteHistory,
    RouteId, RouteOption, RouteSegment, RouteSource, RouteSourceError, ScoredRoute, TimestampMs,
    TrafficCondition, TrafficPrediction, TrafficPredictor, TransitMode,
};

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// Start at `now_ms`.
    pub fn at(now_ms: TimestampMs) -> Self {
        Self {
            now: AtomicU64::new(now_ms),
        }
    }

    /// Jump to `now_ms`.
    pub fn set(&self, now_ms: TimestampMs) {
        self.now.store(now_ms, Ordering::SeqCst);
    }

    /// Move forward by `delta_ms`.
    pub fn advance(&self, delta_ms: u64) {
        self.now.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> TimestampMs {
        self.now.load(Ordering::SeqCst)
    }
}

/// Traffic predictor returning a fixed delay and condition.
#[derive(Debug)]
pub struct FixedTrafficPredictor {
    delay_sec: f64,
    condition: TrafficCondition,
    confidence: f64,
    calls: AtomicUsize,
}

impl FixedTrafficPredictor {
    /// Predict `delay_sec` over schedule with the given condition.
    pub fn new(delay_sec: f64, condition: TrafficCondition, confidence: f64) -> Self {
        Self {
            delay_sec,
            condition,
            confidence,
            calls: AtomicUsize::new(0),
        }
    }

    /// On-schedule light traffic with full confidence.
    pub fn light() -> Self {
        Self::new(0.0, TrafficCondition::Light, 1.0)
    }

    /// Number of `predict` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TrafficPredictor for FixedTrafficPredictor {
    fn predict(
        &self,
        route: &RouteOption,
        departure_ms: TimestampMs,
        _history: &RouteHistory,
    ) -> Result<TrafficPrediction, PredictorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(TrafficPrediction {
            predicted_duration_sec: route.scheduled_duration_sec() + self.delay_sec,
            expected_delay_sec: self.delay_sec,
            condition: self.condition,
            confidence: self.confidence,
            computed_at: departure_ms,
        })
    }
}

/// Demand predictor returning a fixed occupancy.
#[derive(Debug)]
pub struct FixedDemandPredictor {
    occupancy: f64,
    confidence: f64,
    calls: AtomicUsize,
}

impl FixedDemandPredictor {
    /// Predict `occupancy` with `confidence`.
    pub fn new(occupancy: f64, confidence: f64) -> Self {
        Self {
            occupancy,
            confidence,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of `predict` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl DemandPredictor for FixedDemandPredictor {
    fn predict(
        &self,
        _route: &RouteOption,
        departure_ms: TimestampMs,
        _history: &RouteHistory,
    ) -> Result<DemandPrediction, PredictorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(DemandPrediction {
            predicted_occupancy: self.occupancy,
            confidence: self.confidence,
            computed_at: departure_ms,
        })
    }
}

/// Predictor whose backing model is always down.
#[derive(Debug, Default)]
pub struct UnavailablePredictor {
    calls: AtomicUsize,
}

impl UnavailablePredictor {
    /// Number of `predict` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail(&self) -> PredictorError {
        self.calls.fetch_add(1, Ordering::SeqCst);
        PredictorError::Unavailable {
            name: "unavailable",
            reason: "model offline".into(),
        }
    }
}

impl TrafficPredictor for UnavailablePredictor {
    fn predict(
        &self,
        _route: &RouteOption,
        _departure_ms: TimestampMs,
        _history: &RouteHistory,
    ) -> Result<TrafficPrediction, PredictorError> {
        Err(self.fail())
    }
}

impl DemandPredictor for UnavailablePredictor {
    fn predict(
        &self,
        _route: &RouteOption,
        _departure_ms: TimestampMs,
        _history: &RouteHistory,
    ) -> Result<DemandPrediction, PredictorError> {
        Err(self.fail())
    }
}

/// Route source returning the same candidates for every query.
#[derive(Debug, Default)]
pub struct MemoryRouteSource {
    routes: Vec<RouteOption>,
    calls: AtomicUsize,
}

impl MemoryRouteSource {
    /// Serve `routes` for every query.
    pub fn with_routes<I>(routes: I) -> Self
    where
        I: IntoIterator<Item = RouteOption>,
    {
        Self {
            routes: routes.into_iter().collect(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of `candidates` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RouteSource for MemoryRouteSource {
    fn candidates(
        &self,
        _origin: LatLng,
        _destination: LatLng,
        _departure_ms: TimestampMs,
    ) -> Result<Vec<RouteOption>, RouteSourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.routes.clone())
    }
}

/// History source backed by a map.
#[derive(Debug, Default)]
pub struct MemoryHistory {
    by_route: Mutex<HashMap<RouteId, RouteHistory>>,
}

impl MemoryHistory {
    /// Record `history` for `route_id`, replacing any previous value.
    pub fn insert(&self, route_id: impl Into<RouteId>, history: RouteHistory) {
        self.by_route
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(route_id.into(), history);
    }
}

impl HistorySource for MemoryHistory {
    fn history(&self, route_id: &RouteId) -> RouteHistory {
        self.by_route
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(route_id)
            .cloned()
            .unwrap_or_default()
    }
}

/// A route riding line `line` for the first duration, walking the rest.
///
/// # Panics
///
/// Panics when `durations` is empty or contains a negative value.
pub fn route(line: &str, durations: &[f64]) -> RouteOption {
    let segments = durations
        .iter()
        .enumerate()
        .map(|(i, &d)| {
            if i == 0 {
                RouteSegment::ride(TransitMode::Bus, line, d)
            } else {
                RouteSegment::walk(d)
            }
        })
        .collect();
    RouteOption::new(line, segments).expect("fixture route must be valid")
}

/// `count` scored routes with increasing durations and comfort scores.
pub fn scored_routes(count: usize) -> Vec<ScoredRoute> {
    (0..count)
        .map(|i| {
            let route = route(&format!("R{i}"), &[600.0 + 60.0 * i as f64]);
            let duration = route.scheduled_duration_sec();
            ScoredRoute {
                traffic: TrafficPrediction::neutral(&route, 0),
                demand: DemandPrediction::neutral(0),
                predicted_duration_sec: duration,
                predicted_crowding: crate::NEUTRAL_OCCUPANCY,
                comfort_score: duration * 0.6,
                insights: Vec::new(),
                route,
            }
        })
        .collect()
}
