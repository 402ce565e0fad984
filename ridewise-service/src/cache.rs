//! TTL cache of scored route sets.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::debug;
use ridewise_core::{Clock, LatLng, RoutePreferences, ScoredRoute, SystemClock, TimestampMs};

/// Coordinates are rounded to this many steps per degree before keying,
/// roughly 110 m of latitude.
const KEY_STEPS_PER_DEGREE: f64 = 1_000.0;

/// Fingerprint of a route query.
///
/// Origin and destination are rounded to three decimal places so
/// near-identical queries share an entry. Departure time is not part of the
/// key; the TTL bounds how stale a shared answer can be.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    origin: (i64, i64),
    destination: (i64, i64),
    preferences: RoutePreferences,
}

impl CacheKey {
    /// Key for a query.
    pub fn new(origin: LatLng, destination: LatLng, preferences: &RoutePreferences) -> Self {
        Self {
            origin: quantise(origin),
            destination: quantise(destination),
            preferences: preferences.clone(),
        }
    }
}

fn quantise(point: LatLng) -> (i64, i64) {
    // Validated coordinates are within ±180, so the cast cannot saturate.
    let step = |degrees: f64| (degrees * KEY_STEPS_PER_DEGREE).round() as i64;
    (step(point.lat()), step(point.lng()))
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({},{})->({},{})",
            self.origin.0, self.origin.1, self.destination.0, self.destination.1
        )
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    routes: Vec<ScoredRoute>,
    created_at_ms: TimestampMs,
    ttl_ms: u64,
}

impl CacheEntry {
    const fn is_fresh(&self, now_ms: TimestampMs) -> bool {
        now_ms.saturating_sub(self.created_at_ms) < self.ttl_ms
    }
}

/// Memoises ranked routes for a short validity window.
///
/// Reads past an entry's TTL are misses and evict the entry.
/// [`purge_expired`](Self::purge_expired) reaps entries nobody reads again.
///
/// # Examples
///
/// ```
/// use ridewise_core::test_support::{ManualClock, scored_routes};
/// use ridewise_core::{LatLng, RoutePreferences};
/// use ridewise_service::{CacheKey, RecommendationCache};
///
/// let cache = RecommendationCache::new(ManualClock::at(0), 1_000);
/// let key = CacheKey::new(
///     LatLng::new(9.0054, 38.7636).unwrap(),
///     LatLng::new(9.0300, 38.7500).unwrap(),
///     &RoutePreferences::default(),
/// );
/// cache.put(key.clone(), scored_routes(2));
/// assert_eq!(cache.get(&key).map(|routes| routes.len()), Some(2));
/// ```
#[derive(Debug)]
pub struct RecommendationCache<C = SystemClock> {
    clock: C,
    ttl_ms: u64,
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
}

impl<C: Clock> RecommendationCache<C> {
    /// Empty cache whose entries live for `ttl_ms` by default.
    pub fn new(clock: C, ttl_ms: u64) -> Self {
        Self {
            clock,
            ttl_ms,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<CacheKey, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Default TTL.
    pub const fn ttl_ms(&self) -> u64 {
        self.ttl_ms
    }

    /// Cached routes for `key`, evicting the entry if it has expired.
    pub fn get(&self, key: &CacheKey) -> Option<Vec<ScoredRoute>> {
        let now_ms = self.clock.now_ms();
        let mut entries = self.entries();
        match entries.get(key) {
            Some(entry) if entry.is_fresh(now_ms) => {
                debug!("recommendation cache hit for {key}");
                Some(entry.routes.clone())
            }
            Some(_) => {
                entries.remove(key);
                debug!("recommendation cache entry for {key} expired");
                None
            }
            None => {
                debug!("recommendation cache miss for {key}");
                None
            }
        }
    }

    /// Store `routes` under `key` with the default TTL.
    pub fn put(&self, key: CacheKey, routes: Vec<ScoredRoute>) {
        self.put_with_ttl(key, routes, self.ttl_ms);
    }

    /// Store `routes` under `key`, replacing any existing entry.
    pub fn put_with_ttl(&self, key: CacheKey, routes: Vec<ScoredRoute>, ttl_ms: u64) {
        let entry = CacheEntry {
            routes,
            created_at_ms: self.clock.now_ms(),
            ttl_ms,
        };
        self.entries().insert(key, entry);
    }

    /// Remove every expired entry, returning how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now_ms = self.clock.now_ms();
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_fresh(now_ms));
        before - entries.len()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries().clear();
    }

    /// Number of stored entries, fresh or not.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    /// Report whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ridewise_core::test_support::{ManualClock, scored_routes};
    use rstest::{fixture, rstest};
    use std::sync::Arc;

    const TTL: u64 = 300_000;

    struct Harness {
        clock: Arc<ManualClock>,
        cache: RecommendationCache<Arc<ManualClock>>,
    }

    #[fixture]
    fn harness() -> Harness {
        let clock = Arc::new(ManualClock::at(10_000));
        let cache = RecommendationCache::new(Arc::clone(&clock), TTL);
        Harness { clock, cache }
    }

    fn point(lat: f64, lng: f64) -> LatLng {
        LatLng::new(lat, lng).expect("valid coordinate")
    }

    fn key() -> CacheKey {
        CacheKey::new(point(9.0054, 38.7636), point(9.03, 38.75), &RoutePreferences::default())
    }

    #[rstest]
    fn jittered_coordinates_share_a_key() {
        let prefs = RoutePreferences::default();
        let a = CacheKey::new(point(9.00541, 38.76362), point(9.03, 38.75), &prefs);
        let b = CacheKey::new(point(9.00538, 38.76358), point(9.03, 38.75), &prefs);
        assert_eq!(a, b);
    }

    #[rstest]
    fn preferences_are_part_of_the_key() {
        let origin = point(9.0054, 38.7636);
        let destination = point(9.03, 38.75);
        let crowd_averse = RoutePreferences {
            avoid_crowds: true,
            ..RoutePreferences::default()
        };
        assert_ne!(
            CacheKey::new(origin, destination, &RoutePreferences::default()),
            CacheKey::new(origin, destination, &crowd_averse)
        );
    }

    #[rstest]
    #[case(0, true)]
    #[case(TTL - 1, true)]
    #[case(TTL, false)]
    #[case(TTL + 1, false)]
    fn hits_only_within_ttl(harness: Harness, #[case] elapsed: u64, #[case] hit: bool) {
        harness.cache.put(key(), scored_routes(1));
        harness.clock.advance(elapsed);
        assert_eq!(harness.cache.get(&key()).is_some(), hit);
    }

    #[rstest]
    fn expired_read_evicts(harness: Harness) {
        harness.cache.put(key(), scored_routes(1));
        harness.clock.advance(TTL);
        assert!(harness.cache.get(&key()).is_none());
        assert!(harness.cache.is_empty());
        harness.clock.set(10_000);
        assert!(harness.cache.get(&key()).is_none());
    }

    #[rstest]
    fn put_overwrites(harness: Harness) {
        harness.cache.put(key(), scored_routes(1));
        harness.cache.put(key(), scored_routes(3));
        assert_eq!(harness.cache.get(&key()).map(|r| r.len()), Some(3));
        assert_eq!(harness.cache.len(), 1);
    }

    #[rstest]
    fn purge_drops_only_expired(harness: Harness) {
        harness.cache.put_with_ttl(key(), scored_routes(1), 1_000);
        let other = CacheKey::new(point(1.0, 1.0), point(2.0, 2.0), &RoutePreferences::default());
        harness.cache.put(other.clone(), scored_routes(1));
        harness.clock.advance(5_000);

        assert_eq!(harness.cache.purge_expired(), 1);
        assert!(harness.cache.get(&other).is_some());
    }
}
