//! Live vehicle tracking for ridewise.
//!
//! [`PositionStore`] owns the latest position of every vehicle together with
//! the geohash index, and pushes route snapshots to a
//! [`SubscriptionBroker`]. Transports feed the store from external sources.

mod broker;
mod store;
mod transport;

pub use broker::{
    ListenerError, PublishReport, RouteSnapshot, Subscription, SubscriptionBroker, SubscriptionId,
};
pub use store::{ApplyOutcome, EvictionReport, NearbyPosition, PositionStore};
pub use transport::{
    ChannelTransport, NdjsonTransport, PositionMessage, PositionTransport, PumpReport,
    TransportError, pump,
};
