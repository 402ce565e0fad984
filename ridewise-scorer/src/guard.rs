//! Predictor guards: time budgets and neutral fallbacks.
//!
//! Route queries must never fail or hang because a predictor is down. The
//! helpers here turn every [`PredictorError`] into the neutral prediction and
//! sanitise out-of-range answers; [`TimeBoxed`] converts a slow predictor
//! into a [`PredictorError::Timeout`].

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use log::warn;
use ridewise_core::{
    DemandPrediction, DemandPredictor, PredictorError, RouteHistory, RouteOption, TimestampMs,
    TrafficPrediction, TrafficPredictor,
};

/// Traffic prediction for `route`, or the neutral default on failure.
///
/// Confidence is clamped into `0.0..=1.0`; a prediction whose duration is not
/// a finite, non-negative number is treated as a failure.
pub fn traffic_or_neutral(
    predictor: &dyn TrafficPredictor,
    route: &RouteOption,
    departure_ms: TimestampMs,
    history: &RouteHistory,
) -> TrafficPrediction {
    match predictor.predict(route, departure_ms, history) {
        Ok(prediction)
            if prediction.predicted_duration_sec.is_finite()
                && prediction.predicted_duration_sec >= 0.0 =>
        {
            TrafficPrediction {
                confidence: unit_or_zero(prediction.confidence),
                ..prediction
            }
        }
        Ok(_) => {
            warn!(
                "traffic predictor returned an unusable duration for route option {}; using neutral prediction",
                route.id
            );
            TrafficPrediction::neutral(route, departure_ms)
        }
        Err(err) => {
            warn!("{err}; using neutral traffic prediction for route option {}", route.id);
            TrafficPrediction::neutral(route, departure_ms)
        }
    }
}

/// Demand prediction for `route`, or the neutral default on failure.
///
/// Occupancy and confidence are clamped into `0.0..=1.0`; a NaN occupancy is
/// treated as a failure.
pub fn demand_or_neutral(
    predictor: &dyn DemandPredictor,
    route: &RouteOption,
    departure_ms: TimestampMs,
    history: &RouteHistory,
) -> DemandPrediction {
    match predictor.predict(route, departure_ms, history) {
        Ok(prediction) if !prediction.predicted_occupancy.is_nan() => DemandPrediction {
            predicted_occupancy: prediction.predicted_occupancy.clamp(0.0, 1.0),
            confidence: unit_or_zero(prediction.confidence),
            computed_at: prediction.computed_at,
        },
        Ok(_) => {
            warn!(
                "demand predictor returned NaN occupancy for route option {}; using neutral prediction",
                route.id
            );
            DemandPrediction::neutral(departure_ms)
        }
        Err(err) => {
            warn!("{err}; using neutral demand prediction for route option {}", route.id);
            DemandPrediction::neutral(departure_ms)
        }
    }
}

fn unit_or_zero(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Calls a guard lets run at once before answering
/// [`PredictorError::Unavailable`] without starting another.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 16;

/// Runs a predictor on a helper thread and gives up after a budget.
///
/// A predictor that overruns keeps running in the background and its answer
/// is discarded. Overrunning calls still hold their slot, so a hung model
/// ties up at most [`DEFAULT_MAX_IN_FLIGHT`] threads (or the limit set with
/// [`with_max_in_flight`](Self::with_max_in_flight)); further calls fail
/// fast until a slot frees up.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use ridewise_core::test_support::{FixedTrafficPredictor, route};
/// use ridewise_core::{RouteHistory, TrafficPredictor};
/// use ridewise_scorer::TimeBoxed;
///
/// let guarded = TimeBoxed::new("fixed", Arc::new(FixedTrafficPredictor::light()), Duration::from_secs(1));
/// let prediction = guarded.predict(&route("R1", &[600.0]), 0, &RouteHistory::empty());
/// assert!(prediction.is_ok());
/// ```
#[derive(Debug)]
pub struct TimeBoxed<P: ?Sized> {
    name: &'static str,
    inner: Arc<P>,
    budget: Duration,
    max_in_flight: usize,
    in_flight: Arc<AtomicUsize>,
}

/// Releases one in-flight slot when the helper thread finishes or unwinds.
#[derive(Debug)]
struct Slot(Arc<AtomicUsize>);

impl Drop for Slot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl<P: ?Sized> TimeBoxed<P> {
    /// Guard `inner` with `budget`.
    pub fn new(name: &'static str, inner: Arc<P>, budget: Duration) -> Self {
        Self {
            name,
            inner,
            budget,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Limit concurrent calls, including overrunning ones, to `limit`
    /// (at least one).
    #[must_use]
    pub fn with_max_in_flight(mut self, limit: usize) -> Self {
        self.max_in_flight = limit.max(1);
        self
    }

    /// Calls currently running, finished or not within their budget.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// The configured budget.
    #[must_use]
    pub const fn budget(&self) -> Duration {
        self.budget
    }

    fn acquire(&self) -> Option<Slot> {
        self.in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |running| {
                (running < self.max_in_flight).then_some(running + 1)
            })
            .ok()
            .map(|_| Slot(Arc::clone(&self.in_flight)))
    }

    fn run<T, F>(&self, call: F) -> Result<T, PredictorError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, PredictorError> + Send + 'static,
    {
        let Some(slot) = self.acquire() else {
            return Err(PredictorError::Unavailable {
                name: self.name,
                reason: format!("{} call(s) still running", self.max_in_flight),
            });
        };
        let (sender, receiver) = mpsc::sync_channel(1);
        thread::Builder::new()
            .name(format!("predictor-{}", self.name))
            .spawn(move || {
                let _slot = slot;
                // The receiver is gone once the budget has elapsed.
                sender.send(call()).ok();
            })
            .map_err(|err| PredictorError::Unavailable {
                name: self.name,
                reason: err.to_string(),
            })?;
        match receiver.recv_timeout(self.budget) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(PredictorError::Timeout {
                name: self.name,
                budget_ms: u64::try_from(self.budget.as_millis()).unwrap_or(u64::MAX),
            }),
            Err(RecvTimeoutError::Disconnected) => Err(PredictorError::Unavailable {
                name: self.name,
                reason: "predictor panicked".to_owned(),
            }),
        }
    }
}

impl<P> TrafficPredictor for TimeBoxed<P>
where
    P: TrafficPredictor + ?Sized + 'static,
{
    fn predict(
        &self,
        route: &RouteOption,
        departure_ms: TimestampMs,
        history: &RouteHistory,
    ) -> Result<TrafficPrediction, PredictorError> {
        let inner = Arc::clone(&self.inner);
        let owned_route = route.clone();
        let owned_history = history.clone();
        self.run(move || TrafficPredictor::predict(&*inner, &owned_route, departure_ms, &owned_history))
    }
}

impl<P> DemandPredictor for TimeBoxed<P>
where
    P: DemandPredictor + ?Sized + 'static,
{
    fn predict(
        &self,
        route: &RouteOption,
        departure_ms: TimestampMs,
        history: &RouteHistory,
    ) -> Result<DemandPrediction, PredictorError> {
        let inner = Arc::clone(&self.inner);
        let owned_route = route.clone();
        let owned_history = history.clone();
        self.run(move || DemandPredictor::predict(&*inner, &owned_route, departure_ms, &owned_history))
    }
}
