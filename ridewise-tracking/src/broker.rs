//! Per-route fan-out of position snapshots.
//!
//! Listeners always receive the full, latest snapshot of a route rather than
//! a backlog of deltas. Delivery happens on the publishing thread after the
//! broker's own lock has been released, so a slow or failing listener never
//! blocks registration or other routes. A listener that returns an error or
//! panics is logged and skipped; the remaining listeners still run.

use std::collections::{BTreeMap, HashMap};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use log::{debug, warn};
use ridewise_core::{RouteId, VehiclePosition};
use thiserror::Error;
use tokio::sync::watch;

/// Identifier of one registered listener.
pub type SubscriptionId = u64;

/// The live vehicles of one route at a point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteSnapshot {
    /// Route the snapshot describes.
    pub route_id: RouteId,
    /// Store version that produced the snapshot; newer snapshots have larger
    /// versions.
    pub version: u64,
    /// Live positions sorted by vehicle id.
    pub positions: Vec<VehiclePosition>,
}

impl RouteSnapshot {
    /// A snapshot with no vehicles.
    pub fn empty(route_id: RouteId) -> Self {
        Self {
            route_id,
            version: 0,
            positions: Vec::new(),
        }
    }
}

/// Failure reported by a listener.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("listener failed: {0}")]
pub struct ListenerError(pub String);

type Listener = Arc<dyn Fn(&RouteSnapshot) -> Result<(), ListenerError> + Send + Sync>;

/// Outcome of a [`SubscriptionBroker::publish`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Listeners that accepted the snapshot.
    pub delivered: usize,
    /// Listeners that returned an error or panicked.
    pub failed: usize,
    /// The snapshot was older than one already published and was dropped.
    pub superseded: bool,
}

#[derive(Default)]
struct RouteChannel {
    listeners: BTreeMap<SubscriptionId, Listener>,
    watch: Option<watch::Sender<Arc<RouteSnapshot>>>,
    last_version: u64,
}

impl RouteChannel {
    fn watchers(&self) -> usize {
        self.watch.as_ref().map_or(0, watch::Sender::receiver_count)
    }

    fn is_idle(&self) -> bool {
        self.listeners.is_empty() && self.watchers() == 0
    }
}

#[derive(Default)]
struct BrokerInner {
    routes: RwLock<HashMap<RouteId, RouteChannel>>,
    next_id: AtomicU64,
}

impl BrokerInner {
    fn remove(&self, route_id: &RouteId, id: SubscriptionId) -> bool {
        let mut routes = self.routes.write().unwrap_or_else(PoisonError::into_inner);
        let Some(channel) = routes.get_mut(route_id) else {
            return false;
        };
        let removed = channel.listeners.remove(&id).is_some();
        if channel.is_idle() {
            routes.remove(route_id);
        }
        removed
    }
}

/// Fan-out hub keyed by route.
///
/// Cloning is cheap and every clone shares the same registrations.
///
/// # Examples
///
/// ```
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
/// use ridewise_core::RouteId;
/// use ridewise_tracking::{RouteSnapshot, SubscriptionBroker};
///
/// let broker = SubscriptionBroker::new();
/// let seen = Arc::new(AtomicUsize::new(0));
/// let counter = Arc::clone(&seen);
/// let subscription = broker.subscribe(RouteId::from("R1"), move |snapshot| {
///     counter.fetch_add(snapshot.positions.len() + 1, Ordering::SeqCst);
///     Ok(())
/// });
/// broker.publish(RouteSnapshot::empty(RouteId::from("R1")));
/// assert_eq!(seen.load(Ordering::SeqCst), 1);
///
/// drop(subscription);
/// assert_eq!(broker.live_subscriptions(), 0);
/// ```
#[derive(Clone, Default)]
pub struct SubscriptionBroker {
    inner: Arc<BrokerInner>,
}

impl std::fmt::Debug for SubscriptionBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionBroker")
            .field("live_subscriptions", &self.live_subscriptions())
            .finish()
    }
}

impl SubscriptionBroker {
    /// Create a broker with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for every future snapshot of `route_id`.
    ///
    /// The returned handle deregisters the handler when dropped or when
    /// [`Subscription::unsubscribe`] is called, whichever happens first.
    pub fn subscribe<F>(&self, route_id: RouteId, handler: F) -> Subscription
    where
        F: Fn(&RouteSnapshot) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut routes = self
                .inner
                .routes
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            routes
                .entry(route_id.clone())
                .or_default()
                .listeners
                .insert(id, Arc::new(handler));
        }
        debug!("subscription {id} registered for route {route_id}");
        Subscription {
            id,
            route_id,
            broker: Arc::downgrade(&self.inner),
            active: AtomicBool::new(true),
        }
    }

    /// Latest-value stream of snapshots for `route_id`.
    ///
    /// A new receiver starts from the most recent snapshot published while
    /// anyone was watching the route, or an empty snapshot.
    pub fn watch(&self, route_id: RouteId) -> watch::Receiver<Arc<RouteSnapshot>> {
        self.watch_from(RouteSnapshot::empty(route_id))
    }

    /// Latest-value stream seeded with `initial` unless a newer snapshot is
    /// already held.
    pub fn watch_from(&self, initial: RouteSnapshot) -> watch::Receiver<Arc<RouteSnapshot>> {
        let mut routes = self
            .inner
            .routes
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let channel = routes.entry(initial.route_id.clone()).or_default();
        match &channel.watch {
            Some(sender) => {
                if initial.version > channel.last_version {
                    channel.last_version = initial.version;
                    sender.send_replace(Arc::new(initial));
                }
                sender.subscribe()
            }
            None => {
                channel.last_version = channel.last_version.max(initial.version);
                let (sender, receiver) = watch::channel(Arc::new(initial));
                channel.watch = Some(sender);
                receiver
            }
        }
    }

    /// Deliver `snapshot` to every listener of its route.
    ///
    /// Snapshots older than the last one published for the route are
    /// dropped so a late publisher cannot roll watchers back.
    pub fn publish(&self, snapshot: RouteSnapshot) -> PublishReport {
        let route_id = snapshot.route_id.clone();
        let snapshot = Arc::new(snapshot);
        let listeners: Vec<(SubscriptionId, Listener)> = {
            let mut routes = self
                .inner
                .routes
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let Some(channel) = routes.get_mut(&route_id) else {
                return PublishReport::default();
            };
            if snapshot.version < channel.last_version {
                debug!(
                    "dropping superseded snapshot v{} for route {route_id}",
                    snapshot.version
                );
                return PublishReport {
                    superseded: true,
                    ..PublishReport::default()
                };
            }
            channel.last_version = snapshot.version;
            let unwatched = channel.watch.as_ref().is_some_and(|sender| {
                sender.send_replace(Arc::clone(&snapshot));
                sender.receiver_count() == 0
            });
            if unwatched {
                channel.watch = None;
            }
            let listeners = channel
                .listeners
                .iter()
                .map(|(id, listener)| (*id, Arc::clone(listener)))
                .collect();
            if channel.is_idle() {
                routes.remove(&route_id);
            }
            listeners
        };

        let mut report = PublishReport::default();
        for (id, listener) in listeners {
            match catch_unwind(AssertUnwindSafe(|| listener(&snapshot))) {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(err)) => {
                    report.failed += 1;
                    warn!("subscription {id} on route {route_id} failed: {err}");
                }
                Err(_) => {
                    report.failed += 1;
                    warn!("subscription {id} on route {route_id} panicked");
                }
            }
        }
        report
    }

    /// Registered listeners plus open watch receivers, across all routes.
    pub fn live_subscriptions(&self) -> usize {
        self.inner
            .routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|channel| channel.listeners.len() + channel.watchers())
            .sum()
    }

    /// Registered listeners plus open watch receivers for one route.
    pub fn subscriptions_for(&self, route_id: &RouteId) -> usize {
        self.inner
            .routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(route_id)
            .map_or(0, |channel| channel.listeners.len() + channel.watchers())
    }
}

/// Handle to a registered listener.
///
/// Dropping the handle unsubscribes.
#[derive(Debug)]
#[must_use = "dropping a subscription unsubscribes immediately"]
pub struct Subscription {
    id: SubscriptionId,
    route_id: RouteId,
    broker: Weak<BrokerInner>,
    active: AtomicBool,
}

impl Subscription {
    /// Listener identifier.
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Route the listener is registered on.
    pub const fn route_id(&self) -> &RouteId {
        &self.route_id
    }

    /// Report whether the listener is still registered.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Deregister the listener.
    ///
    /// Returns `true` only for the call that actually removed it; repeated
    /// calls are no-ops.
    pub fn unsubscribe(&self) -> bool {
        if !self.active.swap(false, Ordering::AcqRel) {
            return false;
        }
        let removed = self
            .broker
            .upgrade()
            .is_some_and(|broker| broker.remove(&self.route_id, self.id));
        if removed {
            debug!(
                "subscription {} unregistered from route {}",
                self.id, self.route_id
            );
        }
        removed
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
