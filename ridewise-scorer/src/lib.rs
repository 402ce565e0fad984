//! Route prediction and comfort scoring for ridewise.
//!
//! The crate provides three layers:
//! - **Heuristic predictors** estimate travel time and crowding from a
//!   peak-hour table keyed by local time, blended with historical
//!   observations for the same hour.
//! - **Guards** keep route queries alive when a predictor misbehaves:
//!   [`TimeBoxed`] enforces a time budget, while [`traffic_or_neutral`] and
//!   [`demand_or_neutral`] substitute neutral predictions for failures.
//! - **[`RouteScorer`]** turns predictions and rider preferences into a
//!   comfort score and a stable ranking.
//!
//! # Examples
//!
//! ```
//! use ridewise_core::{NoHistory, RoutePreferences};
//! use ridewise_core::test_support::route;
//! use ridewise_scorer::{
//!     HeuristicDemandPredictor, HeuristicTrafficPredictor, PeakHourTable, PredictionInputs,
//!     RouteScorer,
//! };
//!
//! let table = PeakHourTable::new(180).expect("valid offset");
//! let traffic = HeuristicTrafficPredictor::new(table);
//! let demand = HeuristicDemandPredictor::new(table);
//! let ranked = RouteScorer.evaluate(
//!     vec![route("R1", &[900.0]), route("R2", &[600.0, 120.0])],
//!     1_704_691_800_000,
//!     &RoutePreferences::default(),
//!     PredictionInputs { traffic: &traffic, demand: &demand, history: &NoHistory },
//! );
//! assert_eq!(ranked.first().map(|r| r.route.id.as_str()), Some("R2"));
//! ```

#![forbid(unsafe_code)]

mod guard;
mod heuristic;
mod scorer;

pub use guard::{DEFAULT_MAX_IN_FLIGHT, TimeBoxed, demand_or_neutral, traffic_or_neutral};
pub use heuristic::{
    BASE_CONFIDENCE, DemandBucket, HISTORY_CONFIDENCE, HISTORY_HALF_WEIGHT,
    HeuristicDemandPredictor, HeuristicTrafficPredictor, PeakHourError, PeakHourTable,
    history_weight,
};
pub use scorer::{
    CROWDED_THRESHOLD, CROWDING_PENALTY, DURATION_WEIGHT, HEAVY_MULTIPLIER,
    LOW_CONFIDENCE_THRESHOLD, MODERATE_MULTIPLIER, PredictionInputs, RouteScorer, insights,
};
