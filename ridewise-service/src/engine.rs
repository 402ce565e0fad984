//! The engine instance and its builder.

use std::fmt;
use std::sync::Arc;

use log::{debug, info};
use ridewise_core::{
    Clock, DemandPredictor, HistorySource, LatLng, NoHistory, PositionError, Recommendation,
    RouteId, RouteOption, RoutePreferences, RouteSource, RouteSourceError, StopId, SystemClock,
    TimestampMs, TrafficPredictor, TripId, VehiclePosition,
};
use ridewise_notify::{
    DispatchReport, LogSink, NotificationKey, NotificationPayload, NotificationScheduler,
    NotificationSink, ScheduleOutcome,
};
use ridewise_scorer::{
    HeuristicDemandPredictor, HeuristicTrafficPredictor, PredictionInputs, RouteScorer, TimeBoxed,
};
use ridewise_tracking::{
    ApplyOutcome, EvictionReport, ListenerError, NearbyPosition, PositionStore, PositionTransport,
    PumpReport, RouteSnapshot, Subscription, SubscriptionBroker, TransportError, pump,
};
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::tasks::{BackgroundTasks, spawn_periodic};
use crate::{CacheKey, ConfigError, EngineConfig, RecommendationCache};

/// Errors returned by [`Engine::query_nearby`].
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum QueryError {
    /// The radius was negative or not a number.
    #[error("radius must be a non-negative number of kilometres, got {radius_km}")]
    InvalidRadius {
        /// Offending radius.
        radius_km: f64,
    },
}

/// Errors returned by [`Engine::recommend`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecommendError {
    /// Candidate routes could not be fetched.
    #[error(transparent)]
    Source(#[from] RouteSourceError),
}

/// Route source with no candidates, used when none is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRoutes;

impl RouteSource for NoRoutes {
    fn candidates(
        &self,
        _origin: LatLng,
        _destination: LatLng,
        _departure_ms: TimestampMs,
    ) -> Result<Vec<RouteOption>, RouteSourceError> {
        Ok(Vec::new())
    }
}

/// Collects an engine's collaborators.
///
/// Anything left unset gets a working default: the system clock, no route
/// candidates, heuristic predictors, no history and a logging
/// notification sink.
#[derive(Default)]
pub struct EngineBuilder {
    config: EngineConfig,
    clock: Option<Arc<dyn Clock>>,
    routes: Option<Arc<dyn RouteSource>>,
    traffic: Option<Arc<dyn TrafficPredictor>>,
    demand: Option<Arc<dyn DemandPredictor>>,
    history: Option<Arc<dyn HistorySource>>,
    sink: Option<Arc<dyn NotificationSink>>,
    broker: Option<SubscriptionBroker>,
}

impl EngineBuilder {
    /// Builder with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `config`.
    #[must_use]
    pub const fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Read the time from `clock`.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Fetch candidate routes from `routes`.
    #[must_use]
    pub fn route_source(mut self, routes: Arc<dyn RouteSource>) -> Self {
        self.routes = Some(routes);
        self
    }

    /// Predict travel times with `traffic`.
    #[must_use]
    pub fn traffic_predictor(mut self, traffic: Arc<dyn TrafficPredictor>) -> Self {
        self.traffic = Some(traffic);
        self
    }

    /// Predict crowding with `demand`.
    #[must_use]
    pub fn demand_predictor(mut self, demand: Arc<dyn DemandPredictor>) -> Self {
        self.demand = Some(demand);
        self
    }

    /// Feed predictors from `history`.
    #[must_use]
    pub fn history(mut self, history: Arc<dyn HistorySource>) -> Self {
        self.history = Some(history);
        self
    }

    /// Deliver due notifications to `sink`.
    #[must_use]
    pub fn notification_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Publish route snapshots through `broker`.
    #[must_use]
    pub fn broker(mut self, broker: SubscriptionBroker) -> Self {
        self.broker = Some(broker);
        self
    }

    /// Validate the configuration and assemble the engine.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the configuration is unusable.
    pub fn build(self) -> Result<Engine, ConfigError> {
        self.config.validate()?;
        let table = self.config.peak_hours()?;
        let budget = self.config.predictor_budget();

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let traffic = self
            .traffic
            .unwrap_or_else(|| Arc::new(HeuristicTrafficPredictor::new(table)));
        let demand = self
            .demand
            .unwrap_or_else(|| Arc::new(HeuristicDemandPredictor::new(table)));

        let inner = EngineInner {
            config: self.config,
            store: PositionStore::with_broker(self.broker.unwrap_or_default()),
            routes: self.routes.unwrap_or_else(|| Arc::new(NoRoutes)),
            traffic: TimeBoxed::new("traffic", traffic, budget),
            demand: TimeBoxed::new("demand", demand, budget),
            history: self.history.unwrap_or_else(|| Arc::new(NoHistory)),
            cache: RecommendationCache::new(Arc::clone(&clock), self.config.cache_ttl_ms),
            notifications: NotificationScheduler::new(Arc::clone(&clock)),
            sink: self.sink.unwrap_or_else(|| Arc::new(LogSink)),
            clock,
            shutdown: CancellationToken::new(),
        };
        Ok(Engine {
            inner: Arc::new(inner),
        })
    }
}

impl fmt::Debug for EngineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineBuilder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

struct EngineInner {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    store: PositionStore,
    routes: Arc<dyn RouteSource>,
    traffic: TimeBoxed<dyn TrafficPredictor>,
    demand: TimeBoxed<dyn DemandPredictor>,
    history: Arc<dyn HistorySource>,
    cache: RecommendationCache<Arc<dyn Clock>>,
    notifications: NotificationScheduler<Arc<dyn Clock>>,
    sink: Arc<dyn NotificationSink>,
    shutdown: CancellationToken,
}

/// Tracking, recommendation and notification engine.
///
/// An explicit instance holding its collaborators; clones share state.
/// Background sweeps run only between [`start`](Self::start) and
/// [`shutdown`](Self::shutdown).
///
/// # Examples
///
/// ```
/// use ridewise_core::{LatLng, VehiclePosition};
/// use ridewise_service::Engine;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let engine = Engine::builder().build()?;
/// engine.apply_position(VehiclePosition::new("V1", "R1", 9.0054, 38.7636, 1_000)?)?;
/// let nearby = engine.query_nearby(LatLng::new(9.0060, 38.7640)?, 1.0)?;
/// assert_eq!(nearby.len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.inner.config)
            .field("vehicles", &self.inner.store.len())
            .field("cached_queries", &self.inner.cache.len())
            .field("notifications", &self.inner.notifications.len())
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Start assembling an engine.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Active configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Underlying position store.
    pub fn store(&self) -> &PositionStore {
        &self.inner.store
    }

    /// Recommendation cache.
    pub fn cache(&self) -> &RecommendationCache<Arc<dyn Clock>> {
        &self.inner.cache
    }

    /// Notification scheduler.
    pub fn notifications(&self) -> &NotificationScheduler<Arc<dyn Clock>> {
        &self.inner.notifications
    }

    /// Store a position report.
    ///
    /// # Errors
    ///
    /// Returns [`PositionError`] for malformed reports.
    pub fn apply_position(&self, position: VehiclePosition) -> Result<ApplyOutcome, PositionError> {
        self.inner.store.apply(position)
    }

    /// Drain `transport` into the store.
    ///
    /// # Errors
    ///
    /// Returns the first unrecoverable [`TransportError`].
    pub async fn ingest<T>(&self, transport: &mut T) -> Result<PumpReport, TransportError>
    where
        T: PositionTransport + ?Sized,
    {
        let report = pump(transport, &self.inner.store).await?;
        info!(
            "ingested {} message(s): {} applied, {} out of order, {} invalid, {} malformed",
            report.received, report.applied, report.out_of_order, report.invalid, report.malformed
        );
        Ok(report)
    }

    /// Vehicles within `radius_km` of `center`, nearest first.
    ///
    /// A zero radius matches nothing.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidRadius`] for a negative or NaN radius.
    pub fn query_nearby(&self, center: LatLng, radius_km: f64) -> Result<Vec<NearbyPosition>, QueryError> {
        if radius_km.is_nan() || radius_km < 0.0 {
            return Err(QueryError::InvalidRadius { radius_km });
        }
        Ok(self.inner.store.query_nearby(center, radius_km))
    }

    /// Call `handler` with every new snapshot of `route_id`.
    pub fn subscribe<F>(&self, route_id: RouteId, handler: F) -> Subscription
    where
        F: Fn(&RouteSnapshot) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        self.inner.store.broker().subscribe(route_id, handler)
    }

    /// Latest-value stream of `route_id`, seeded with its current state.
    pub fn watch(&self, route_id: &RouteId) -> watch::Receiver<Arc<RouteSnapshot>> {
        self.inner.store.watch(route_id)
    }

    /// Number of registered route listeners and open watchers.
    pub fn live_subscriptions(&self) -> usize {
        self.inner.store.broker().live_subscriptions()
    }

    /// Evict vehicles that have been silent past the staleness window.
    pub fn evict_stale(&self) -> EvictionReport {
        self.inner
            .store
            .evict_stale(self.inner.clock.now_ms(), self.inner.config.stale_after_ms)
    }

    /// Ranked routes from `origin` to `destination`.
    ///
    /// Identical queries within the cache TTL are answered from the cache
    /// without consulting the route source or predictors. Predictor failures
    /// and timeouts degrade to neutral predictions.
    ///
    /// # Errors
    ///
    /// Returns [`RecommendError::Source`] when candidates cannot be fetched.
    pub fn recommend(
        &self,
        origin: LatLng,
        destination: LatLng,
        departure_ms: TimestampMs,
        preferences: &RoutePreferences,
    ) -> Result<Recommendation, RecommendError> {
        let inner = &*self.inner;
        let key = CacheKey::new(origin, destination, preferences);
        let max_primary = inner.config.max_primary_routes;
        if let Some(routes) = inner.cache.get(&key) {
            return Ok(Recommendation::split(routes, max_primary, true));
        }

        let candidates = inner.routes.candidates(origin, destination, departure_ms)?;
        let offered = candidates.len();
        let ranked = RouteScorer.evaluate(
            candidates,
            departure_ms,
            preferences,
            PredictionInputs {
                traffic: &inner.traffic,
                demand: &inner.demand,
                history: inner.history.as_ref(),
            },
        );
        debug!("ranked {} of {offered} candidate route(s) for {key}", ranked.len());
        inner.cache.put(key, ranked.clone());
        Ok(Recommendation::split(ranked, max_primary, false))
    }

    /// Remind the rider `minutes_before` the vehicle reaches `stop_id`.
    pub fn schedule_arrival(
        &self,
        trip_id: TripId,
        stop_id: StopId,
        scheduled_time_ms: TimestampMs,
        minutes_before: u32,
        payload: NotificationPayload,
    ) -> ScheduleOutcome {
        self.inner
            .notifications
            .schedule_arrival(trip_id, stop_id, scheduled_time_ms, minutes_before, payload)
    }

    /// Alert the rider that the trip is delayed, on the next dispatch.
    pub fn schedule_delay(
        &self,
        trip_id: TripId,
        stop_id: StopId,
        payload: NotificationPayload,
    ) -> ScheduleOutcome {
        self.inner.notifications.schedule_delay(trip_id, stop_id, payload)
    }

    /// Move a scheduled notification; `None` when `key` is not scheduled.
    pub fn reschedule(&self, key: &NotificationKey, fire_at_ms: TimestampMs) -> Option<ScheduleOutcome> {
        self.inner.notifications.reschedule(key, fire_at_ms)
    }

    /// Cancel one notification; returns `false` when it was not scheduled.
    pub fn cancel_notification(&self, key: &NotificationKey) -> bool {
        self.inner.notifications.cancel(key)
    }

    /// Cancel every notification for `trip_id`.
    pub fn cancel_all_for_trip(&self, trip_id: &TripId) -> usize {
        self.inner.notifications.cancel_all_for_trip(trip_id)
    }

    /// Deliver every due notification to the configured sink.
    pub fn dispatch_notifications(&self) -> DispatchReport {
        self.inner.notifications.dispatch_due(self.inner.sink.as_ref())
    }

    /// Spawn the stale-vehicle sweep, cache reaper and notification
    /// dispatcher on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn start(&self) -> BackgroundTasks {
        let token = self.inner.shutdown.child_token();
        let config = self.inner.config;

        let sweeper = self.clone();
        let reaper = self.clone();
        let dispatcher = self.clone();
        let handles = vec![
            spawn_periodic("stale-sweep", config.eviction_interval(), token.clone(), move || {
                sweeper.evict_stale();
            }),
            spawn_periodic("cache-reaper", config.cache_reap_interval(), token.clone(), move || {
                let purged = reaper.inner.cache.purge_expired();
                if purged > 0 {
                    debug!("purged {purged} expired recommendation(s)");
                }
            }),
            spawn_periodic("dispatcher", config.dispatch_interval(), token.clone(), move || {
                dispatcher.dispatch_notifications();
            }),
        ];
        BackgroundTasks::new(token, handles)
    }

    /// Stop `tasks` and every task started later, waiting for them to
    /// finish.
    pub async fn shutdown(&self, tasks: BackgroundTasks) {
        info!("engine shutting down");
        self.inner.shutdown.cancel();
        tasks.join().await;
    }

    /// Report whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }
}
