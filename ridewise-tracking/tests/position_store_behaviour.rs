//! Behavioural tests for position ingestion, proximity and subscriptions.

use std::cell::RefCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use ridewise_core::{LatLng, VehicleId, VehiclePosition};
use ridewise_tracking::{ApplyOutcome, PositionStore, Subscription};
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

#[derive(Default)]
struct TrackingWorld {
    store: RefCell<Option<PositionStore>>,
    last_outcome: RefCell<Option<ApplyOutcome>>,
    nearby: RefCell<Vec<String>>,
    subscription: RefCell<Option<Subscription>>,
    snapshots_seen: Arc<AtomicUsize>,
}

impl TrackingWorld {
    fn with_store<T>(&self, f: impl FnOnce(&PositionStore) -> T) -> T {
        let store = self.store.borrow();
        f(store.as_ref().expect("store initialised"))
    }

    fn report(&self, lat: f64, lng: f64, timestamp_ms: u64) {
        let position =
            VehiclePosition::new("V1", "R1", lat, lng, timestamp_ms).expect("valid position");
        let outcome = self.with_store(|store| store.apply(position).expect("accepted"));
        self.last_outcome.replace(Some(outcome));
    }

    fn query_rider(&self) {
        let rider = LatLng::new(9.0060, 38.7640).expect("valid coordinate");
        let ids = self.with_store(|store| {
            store
                .query_nearby(rider, 1.0)
                .into_iter()
                .map(|hit| hit.position.vehicle_id.to_string())
                .collect()
        });
        self.nearby.replace(ids);
    }
}

#[fixture]
fn world() -> TrackingWorld {
    TrackingWorld::default()
}

#[given("an empty position store")]
fn given_store(world: &TrackingWorld) {
    world.store.replace(Some(PositionStore::new()));
}

#[given("a subscriber on route R1")]
fn given_subscriber(world: &TrackingWorld) {
    let seen = Arc::clone(&world.snapshots_seen);
    let subscription = world.with_store(|store| {
        store.broker().subscribe("R1".into(), move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    });
    world.subscription.replace(Some(subscription));
}

#[when("vehicle V1 on route R1 reports from Meskel Square at 1000")]
fn when_report_first(world: &TrackingWorld) {
    world.report(9.0054, 38.7636, 1_000);
}

#[when("vehicle V1 on route R1 reports from Meskel Square at 2000")]
fn when_report_later(world: &TrackingWorld) {
    world.report(9.0054, 38.7636, 2_000);
}

#[when("vehicle V1 on route R1 reports from the outskirts at 999")]
fn when_report_late(world: &TrackingWorld) {
    world.report(8.9000, 38.6000, 999);
}

#[when("I ask for vehicles within one kilometre of the rider")]
fn when_query(world: &TrackingWorld) {
    world.query_rider();
}

#[when("the stale sweep runs at 200000")]
fn when_sweep(world: &TrackingWorld) {
    world.with_store(|store| store.evict_stale(200_000, 120_000));
}

#[when("the subscriber unsubscribes twice")]
fn when_unsubscribe(world: &TrackingWorld) {
    let subscription = world.subscription.borrow();
    let subscription = subscription.as_ref().expect("subscribed");
    assert!(subscription.unsubscribe());
    assert!(!subscription.unsubscribe());
}

#[then("the nearby vehicles are V1")]
fn then_v1_nearby(world: &TrackingWorld) {
    assert_eq!(*world.nearby.borrow(), vec!["V1".to_owned()]);
}

#[then("no vehicles are near the rider")]
fn then_none_nearby(world: &TrackingWorld) {
    world.query_rider();
    assert!(world.nearby.borrow().is_empty());
}

#[then("the update is rejected as out of order")]
fn then_out_of_order(world: &TrackingWorld) {
    assert!(matches!(
        *world.last_outcome.borrow(),
        Some(ApplyOutcome::OutOfOrder { stored_ms: 1_000, .. })
    ));
}

#[then("the stored position of V1 is still the one from 1000")]
fn then_still_first(world: &TrackingWorld) {
    let stored = world
        .with_store(|store| store.get(&VehicleId::from("V1")))
        .expect("V1 stored");
    assert_eq!(stored.timestamp_ms, 1_000);
    assert_eq!(stored.location.lat(), 9.0054);
}

#[then("the subscriber has seen 1 snapshot")]
fn then_one_snapshot(world: &TrackingWorld) {
    assert_eq!(world.snapshots_seen.load(Ordering::SeqCst), 1);
}

#[then("no subscriptions remain")]
fn then_no_subscriptions(world: &TrackingWorld) {
    assert_eq!(world.with_store(|store| store.broker().live_subscriptions()), 0);
}

#[scenario(path = "tests/features/position_store.feature", index = 0)]
fn nearby_and_out_of_order(world: TrackingWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/position_store.feature", index = 1)]
fn subscribers_follow_route(world: TrackingWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/position_store.feature", index = 2)]
fn stale_vehicles_evicted(world: TrackingWorld) {
    let _ = world;
}
