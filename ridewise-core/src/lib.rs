//! Core domain types for the ridewise engine.
//!
//! This crate holds the pieces every other crate agrees on: identifier
//! newtypes, validated coordinates and vehicle positions, the geohash
//! proximity index, prediction values with the predictor traits, and route
//! types. Constructors return `Result` so malformed input is rejected at the
//! boundary.

mod clock;
pub mod geohash;
mod geo_index;
mod ids;
mod position;
mod prediction;
mod route;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use clock::{Clock, SystemClock};
pub use geo_index::{GeoIndex, GeoIndexEntry, NearbyVehicle, haversine_km};
pub use geohash::{CellBounds, CellCover, GeoHash, cover_circle};
pub use ids::{RouteId, StopId, TripId, VehicleId};
pub use position::{CoordinateError, LatLng, Occupancy, PositionError, TimestampMs, VehiclePosition};
pub use prediction::{
    DemandPrediction, DemandPredictor, HistoricalSample, HistorySource, NEUTRAL_CONFIDENCE,
    NEUTRAL_OCCUPANCY, NoHistory, PredictorError, RouteHistory, TrafficCondition,
    TrafficPrediction, TrafficPredictor,
};
pub use route::{
    Recommendation, RouteError, RouteInsight, RouteOption, RoutePreferences, RouteSegment,
    RouteSource, RouteSourceError, ScoredRoute, TransitMode,
};
