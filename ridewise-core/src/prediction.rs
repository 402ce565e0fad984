//! Traffic and demand predictions for a route at a departure time.
//!
//! Predictors are pluggable. A heuristic table and a learned model are used
//! the same way: every prediction carries a confidence in `0.0..=1.0`, and a
//! low-confidence prediction is still a usable prediction. A predictor that
//! cannot answer returns [`PredictorError`]; callers substitute the neutral
//! default from [`TrafficPrediction::neutral`] or
//! [`DemandPrediction::neutral`] instead of failing the query.

use thiserror::Error;

use crate::{RouteId, RouteOption, TimestampMs};

/// Confidence attached to neutral fallback predictions.
pub const NEUTRAL_CONFIDENCE: f64 = 0.1;

/// Occupancy assumed when demand is unknown.
pub const NEUTRAL_OCCUPANCY: f64 = 0.5;

/// Road congestion level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum TrafficCondition {
    /// Free-flowing traffic.
    Light,
    /// Noticeable slowdowns.
    Moderate,
    /// Congested.
    Heavy,
}

impl TrafficCondition {
    /// Classify a predicted/scheduled duration ratio.
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio >= 1.4 {
            Self::Heavy
        } else if ratio >= 1.15 {
            Self::Moderate
        } else {
            Self::Light
        }
    }
}

/// Predicted travel time for a route at a departure time.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct TrafficPrediction {
    /// Expected door-to-door duration in seconds.
    pub predicted_duration_sec: f64,
    /// Expected delay over the scheduled duration in seconds.
    pub expected_delay_sec: f64,
    /// Congestion level.
    pub condition: TrafficCondition,
    /// Confidence in `0.0..=1.0`.
    pub confidence: f64,
    /// Reference instant of the prediction: the departure time it was
    /// computed for, not a wall-clock reading. Predictors stay pure.
    pub computed_at: TimestampMs,
}

impl TrafficPrediction {
    /// Prediction used when no predictor answer is available.
    ///
    /// Assumes the route runs to schedule in light traffic.
    pub fn neutral(route: &RouteOption, computed_at: TimestampMs) -> Self {
        Self {
            predicted_duration_sec: route.scheduled_duration_sec(),
            expected_delay_sec: 0.0,
            condition: TrafficCondition::Light,
            confidence: NEUTRAL_CONFIDENCE,
            computed_at,
        }
    }
}

/// Predicted vehicle occupancy for a route at a departure time.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct DemandPrediction {
    /// Expected load factor in `0.0..=1.0`.
    pub predicted_occupancy: f64,
    /// Confidence in `0.0..=1.0`.
    pub confidence: f64,
    /// Reference instant of the prediction: the departure time it was
    /// computed for, not a wall-clock reading. Predictors stay pure.
    pub computed_at: TimestampMs,
}

impl DemandPrediction {
    /// Prediction used when no predictor answer is available.
    pub const fn neutral(computed_at: TimestampMs) -> Self {
        Self {
            predicted_occupancy: NEUTRAL_OCCUPANCY,
            confidence: NEUTRAL_CONFIDENCE,
            computed_at,
        }
    }
}

/// One observed trip used as prediction input.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct HistoricalSample {
    /// Departure time of the observed trip.
    pub departure_ms: TimestampMs,
    /// Timetabled duration of the observed trip in seconds.
    pub scheduled_duration_sec: f64,
    /// Observed duration in seconds.
    pub observed_duration_sec: f64,
    /// Observed load factor in `0.0..=1.0`, if recorded.
    pub observed_occupancy: Option<f64>,
}

/// Past observations for a route.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteHistory {
    /// Samples in no particular order.
    pub samples: Vec<HistoricalSample>,
}

impl RouteHistory {
    /// An empty history.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a history from samples.
    pub fn with_samples<I>(samples: I) -> Self
    where
        I: IntoIterator<Item = HistoricalSample>,
    {
        Self {
            samples: samples.into_iter().collect(),
        }
    }
}

/// Source of historical observations per route.
pub trait HistorySource: Send + Sync {
    /// Return the history recorded for `route_id`.
    fn history(&self, route_id: &RouteId) -> RouteHistory;
}

/// A history source that knows nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHistory;

impl HistorySource for NoHistory {
    fn history(&self, _route_id: &RouteId) -> RouteHistory {
        RouteHistory::empty()
    }
}

/// Reasons a predictor could not answer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PredictorError {
    /// The backing model or service is unavailable.
    #[error("predictor {name} is unavailable: {reason}")]
    Unavailable {
        /// Predictor name.
        name: &'static str,
        /// Human-readable reason.
        reason: String,
    },
    /// The predictor exceeded its time budget.
    #[error("predictor {name} exceeded its {budget_ms} ms budget")]
    Timeout {
        /// Predictor name.
        name: &'static str,
        /// Budget that was exceeded.
        budget_ms: u64,
    },
}

/// Predict travel time for a route.
///
/// Implementations must be pure with respect to their inputs, fast enough to
/// run on the synchronous path of a route query, and thread-safe.
///
/// # Examples
///
/// ```
/// use ridewise_core::{
///     PredictorError, RouteHistory, RouteOption, TimestampMs, TrafficCondition,
///     TrafficPrediction, TrafficPredictor,
/// };
///
/// struct OnSchedule;
///
/// impl TrafficPredictor for OnSchedule {
///     fn predict(
///         &self,
///         route: &RouteOption,
///         departure_ms: TimestampMs,
///         _history: &RouteHistory,
///     ) -> Result<TrafficPrediction, PredictorError> {
///         Ok(TrafficPrediction {
///             predicted_duration_sec: route.scheduled_duration_sec(),
///             expected_delay_sec: 0.0,
///             condition: TrafficCondition::Light,
///             confidence: 1.0,
///             computed_at: departure_ms,
///         })
///     }
/// }
/// ```
pub trait TrafficPredictor: Send + Sync {
    /// Predict the duration of `route` departing at `departure_ms`.
    fn predict(
        &self,
        route: &RouteOption,
        departure_ms: TimestampMs,
        history: &RouteHistory,
    ) -> Result<TrafficPrediction, PredictorError>;
}

/// Predict vehicle occupancy for a route.
///
/// The same purity and latency expectations as [`TrafficPredictor`] apply.
pub trait DemandPredictor: Send + Sync {
    /// Predict the occupancy of `route` departing at `departure_ms`.
    fn predict(
        &self,
        route: &RouteOption,
        departure_ms: TimestampMs,
        history: &RouteHistory,
    ) -> Result<DemandPrediction, PredictorError>;
}

impl<T: TrafficPredictor + ?Sized> TrafficPredictor for std::sync::Arc<T> {
    fn predict(
        &self,
        route: &RouteOption,
        departure_ms: TimestampMs,
        history: &RouteHistory,
    ) -> Result<TrafficPrediction, PredictorError> {
        (**self).predict(route, departure_ms, history)
    }
}

impl<T: DemandPredictor + ?Sized> DemandPredictor for std::sync::Arc<T> {
    fn predict(
        &self,
        route: &RouteOption,
        departure_ms: TimestampMs,
        history: &RouteHistory,
    ) -> Result<DemandPrediction, PredictorError> {
        (**self).predict(route, departure_ms, history)
    }
}
