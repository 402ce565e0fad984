//! Authoritative latest-position store.
//!
//! The position map, the per-route membership and the geohash index live
//! behind one `RwLock`, so radius queries run concurrently with each other but
//! never alongside a write. Snapshots for the broker are copied while the
//! write lock is held and published after it is released.

use std::collections::{BTreeSet, HashMap};
use std::sync::{PoisonError, RwLock};

use log::{debug, info};
use ridewise_core::{
    GeoIndex, GeoIndexEntry, LatLng, PositionError, RouteId, TimestampMs, VehicleId,
    VehiclePosition,
};

use crate::{RouteSnapshot, SubscriptionBroker};

/// Result of applying a position update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// First report from this vehicle.
    Inserted,
    /// Replaced an older or equally old report.
    Updated,
    /// Older than the stored report; nothing changed.
    OutOfOrder {
        /// Timestamp currently stored.
        stored_ms: TimestampMs,
        /// Timestamp of the rejected update.
        rejected_ms: TimestampMs,
    },
}

impl ApplyOutcome {
    /// Report whether the update changed stored state.
    pub const fn is_applied(self) -> bool {
        !matches!(self, Self::OutOfOrder { .. })
    }
}

/// Vehicles removed by [`PositionStore::evict_stale`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionReport {
    /// Evicted vehicles, sorted.
    pub evicted: Vec<VehicleId>,
    /// Routes whose snapshot changed.
    pub routes: Vec<RouteId>,
}

impl EvictionReport {
    /// Number of vehicles evicted.
    pub fn len(&self) -> usize {
        self.evicted.len()
    }

    /// Report whether nothing was evicted.
    pub fn is_empty(&self) -> bool {
        self.evicted.is_empty()
    }
}

/// A stored position returned by a radius query.
#[derive(Debug, Clone, PartialEq)]
pub struct NearbyPosition {
    /// Latest stored report.
    pub position: VehiclePosition,
    /// Great-circle distance from the query centre, in kilometres.
    pub distance_km: f64,
}

#[derive(Debug, Default)]
struct StoreState {
    positions: HashMap<VehicleId, VehiclePosition>,
    by_route: HashMap<RouteId, BTreeSet<VehicleId>>,
    index: GeoIndex,
    version: u64,
}

impl StoreState {
    fn snapshot(&self, route_id: &RouteId) -> RouteSnapshot {
        let positions = self
            .by_route
            .get(route_id)
            .into_iter()
            .flatten()
            .filter_map(|vehicle_id| self.positions.get(vehicle_id).cloned())
            .collect();
        RouteSnapshot {
            route_id: route_id.clone(),
            version: self.version,
            positions,
        }
    }

    fn leave_route(&mut self, route_id: &RouteId, vehicle_id: &VehicleId) {
        if let Some(members) = self.by_route.get_mut(route_id) {
            members.remove(vehicle_id);
            if members.is_empty() {
                self.by_route.remove(route_id);
            }
        }
    }
}

/// Keyed store of the latest position per vehicle.
///
/// # Examples
///
/// ```
/// use ridewise_core::{LatLng, VehicleId, VehiclePosition};
/// use ridewise_tracking::{ApplyOutcome, PositionStore};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let store = PositionStore::new();
/// store.apply(VehiclePosition::new("V1", "R1", 9.0054, 38.7636, 1_000)?)?;
/// let late = store.apply(VehiclePosition::new("V1", "R1", 9.1, 38.8, 999)?)?;
/// assert!(matches!(late, ApplyOutcome::OutOfOrder { .. }));
///
/// let nearby = store.query_nearby(LatLng::new(9.0060, 38.7640)?, 1.0);
/// assert_eq!(nearby[0].position.vehicle_id, VehicleId::from("V1"));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct PositionStore {
    state: RwLock<StoreState>,
    broker: SubscriptionBroker,
}

impl PositionStore {
    /// Create an empty store with its own broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store publishing through `broker`.
    pub fn with_broker(broker: SubscriptionBroker) -> Self {
        Self {
            state: RwLock::default(),
            broker,
        }
    }

    /// Broker receiving this store's route snapshots.
    pub const fn broker(&self) -> &SubscriptionBroker {
        &self.broker
    }

    /// Validate and store `position`, then notify the route's listeners.
    ///
    /// An update older than the stored one is reported as
    /// [`ApplyOutcome::OutOfOrder`] and changes nothing. A vehicle that
    /// switches route produces a snapshot for both routes.
    ///
    /// # Errors
    ///
    /// Returns [`PositionError`] when the update is malformed; nothing is
    /// stored in that case.
    pub fn apply(&self, position: VehiclePosition) -> Result<ApplyOutcome, PositionError> {
        position.validate()?;
        let (outcome, snapshots) = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            let previous = state
                .positions
                .get(&position.vehicle_id)
                .map(|stored| (stored.timestamp_ms, stored.route_id.clone()));
            if let Some((stored_ms, _)) = &previous
                && position.timestamp_ms < *stored_ms
            {
                debug!(
                    "rejecting out-of-order update for vehicle {} ({} < {stored_ms})",
                    position.vehicle_id, position.timestamp_ms
                );
                return Ok(ApplyOutcome::OutOfOrder {
                    stored_ms: *stored_ms,
                    rejected_ms: position.timestamp_ms,
                });
            }

            state.version += 1;
            let vehicle_id = position.vehicle_id.clone();
            let route_id = position.route_id.clone();
            state.index.upsert(&vehicle_id, position.location);
            let mut touched = vec![route_id.clone()];
            if let Some((_, old_route)) = &previous
                && *old_route != route_id
            {
                state.leave_route(old_route, &vehicle_id);
                touched.push(old_route.clone());
            }
            state
                .by_route
                .entry(route_id)
                .or_default()
                .insert(vehicle_id.clone());
            state.positions.insert(vehicle_id, position);

            let outcome = if previous.is_some() {
                ApplyOutcome::Updated
            } else {
                ApplyOutcome::Inserted
            };
            let snapshots: Vec<RouteSnapshot> =
                touched.iter().map(|route| state.snapshot(route)).collect();
            (outcome, snapshots)
        };
        for snapshot in snapshots {
            self.broker.publish(snapshot);
        }
        Ok(outcome)
    }

    /// Remove every vehicle whose last report is more than `stale_after_ms`
    /// older than `now_ms`.
    ///
    /// Candidates are gathered under the read lock; the write lock is then
    /// taken briefly to remove those that have not reported in the meantime.
    pub fn evict_stale(&self, now_ms: TimestampMs, stale_after_ms: u64) -> EvictionReport {
        let candidates: Vec<(VehicleId, TimestampMs)> = {
            let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
            state
                .positions
                .values()
                .filter(|p| now_ms.saturating_sub(p.timestamp_ms) > stale_after_ms)
                .map(|p| (p.vehicle_id.clone(), p.timestamp_ms))
                .collect()
        };
        if candidates.is_empty() {
            return EvictionReport::default();
        }

        let (mut evicted, snapshots) = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            let mut evicted = Vec::new();
            let mut routes = BTreeSet::new();
            for (vehicle_id, seen_ms) in candidates {
                let unchanged = state
                    .positions
                    .get(&vehicle_id)
                    .is_some_and(|p| p.timestamp_ms == seen_ms);
                if !unchanged {
                    continue;
                }
                if let Some(position) = state.positions.remove(&vehicle_id) {
                    state.index.remove(&vehicle_id);
                    state.leave_route(&position.route_id, &vehicle_id);
                    routes.insert(position.route_id);
                    evicted.push(vehicle_id);
                }
            }
            if !evicted.is_empty() {
                state.version += 1;
            }
            let snapshots: Vec<RouteSnapshot> =
                routes.iter().map(|route| state.snapshot(route)).collect();
            (evicted, snapshots)
        };

        evicted.sort();
        if !evicted.is_empty() {
            info!("evicted {} stale vehicle(s)", evicted.len());
        }
        let routes = snapshots.iter().map(|s| s.route_id.clone()).collect();
        for snapshot in snapshots {
            self.broker.publish(snapshot);
        }
        EvictionReport { evicted, routes }
    }

    /// Latest report for a vehicle.
    pub fn get(&self, vehicle_id: &VehicleId) -> Option<VehiclePosition> {
        self.read().positions.get(vehicle_id).cloned()
    }

    /// Live positions on a route, sorted by vehicle id.
    pub fn positions_for_route(&self, route_id: &RouteId) -> Vec<VehiclePosition> {
        self.read().snapshot(route_id).positions
    }

    /// Current snapshot of a route.
    pub fn snapshot(&self, route_id: &RouteId) -> RouteSnapshot {
        self.read().snapshot(route_id)
    }

    /// Latest-value stream for a route, seeded with its current snapshot.
    ///
    /// The read lock is held while registering so no write can slip between
    /// the seed and the first published update.
    pub fn watch(
        &self,
        route_id: &RouteId,
    ) -> tokio::sync::watch::Receiver<std::sync::Arc<RouteSnapshot>> {
        let state = self.read();
        self.broker.watch_from(state.snapshot(route_id))
    }

    /// Stored positions within `radius_km` of `center`, nearest first.
    pub fn query_nearby(&self, center: LatLng, radius_km: f64) -> Vec<NearbyPosition> {
        let state = self.read();
        state
            .index
            .query_radius(center, radius_km)
            .into_iter()
            .filter_map(|hit| {
                state
                    .positions
                    .get(&hit.vehicle_id)
                    .map(|position| NearbyPosition {
                        position: position.clone(),
                        distance_km: hit.distance_km,
                    })
            })
            .collect()
    }

    /// Geohash index entries, ordered by hash.
    pub fn index_entries(&self) -> Vec<GeoIndexEntry> {
        self.read().index.entries()
    }

    /// Number of live vehicles.
    pub fn len(&self) -> usize {
        self.read().positions.len()
    }

    /// Report whether no vehicle is live.
    pub fn is_empty(&self) -> bool {
        self.read().positions.is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }
}
