//! Facade crate for the ridewise transit engine.
//!
//! This crate re-exports the core domain types and exposes the tracking,
//! scoring, notification and service layers behind feature flags.

#![forbid(unsafe_code)]

pub use ridewise_core::{
    Clock, CoordinateError, LatLng, Occupancy, PositionError, RouteId, StopId, SystemClock,
    TimestampMs, TripId, VehicleId, VehiclePosition,
};

#[cfg(feature = "test-support")]
pub use ridewise_core::test_support;

#[cfg(feature = "tracking")]
pub use ridewise_tracking::{PositionStore, SubscriptionBroker};

#[cfg(feature = "scorer")]
pub use ridewise_scorer::RouteScorer;

#[cfg(feature = "notify")]
pub use ridewise_notify::NotificationScheduler;

#[cfg(feature = "service")]
pub use ridewise_service::{Engine, EngineBuilder, EngineConfig};

/// Core domain types, geospatial index and collaborator traits.
pub mod domain {
    pub use ridewise_core::*;
}

/// Live position store, subscriptions and transports.
#[cfg(feature = "tracking")]
pub mod tracking {
    pub use ridewise_tracking::*;
}

/// Route scoring and prediction heuristics.
#[cfg(feature = "scorer")]
pub mod scorer {
    pub use ridewise_scorer::*;
}

/// Per-trip notification scheduling.
#[cfg(feature = "notify")]
pub mod notify {
    pub use ridewise_notify::*;
}

/// Engine instance, cache and background tasks.
#[cfg(feature = "service")]
pub mod service {
    pub use ridewise_service::*;
}
