//! Behavioural tests for the engine's query paths.

use std::cell::RefCell;
use std::sync::Arc;

use ridewise_core::test_support::{
    FixedDemandPredictor, FixedTrafficPredictor, ManualClock, MemoryRouteSource, route,
};
use ridewise_core::{Clock, LatLng, Recommendation, RoutePreferences, VehiclePosition};
use ridewise_service::Engine;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

struct Collaborators {
    clock: Arc<ManualClock>,
    traffic: Arc<FixedTrafficPredictor>,
    demand: Arc<FixedDemandPredictor>,
    engine: Engine,
}

#[derive(Default)]
struct EngineWorld {
    parts: RefCell<Option<Collaborators>>,
    answers: RefCell<Vec<Recommendation>>,
}

impl EngineWorld {
    fn with<T>(&self, f: impl FnOnce(&Collaborators) -> T) -> T {
        let parts = self.parts.borrow();
        f(parts.as_ref().expect("engine initialised"))
    }

    fn report(&self, lat: f64, lng: f64, timestamp_ms: u64) {
        let position = VehiclePosition::new("V1", "R1", lat, lng, timestamp_ms).expect("valid position");
        self.with(|parts| parts.engine.apply_position(position).expect("well formed"));
    }

    fn ask(&self) {
        let answer = self.with(|parts| {
            parts
                .engine
                .recommend(
                    point(9.0054, 38.7636),
                    point(9.0358, 38.7524),
                    parts.clock.now_ms(),
                    &RoutePreferences::default(),
                )
                .expect("memory source never fails")
        });
        self.answers.borrow_mut().push(answer);
    }

    fn second_answer_cached(&self) -> bool {
        self.answers
            .borrow()
            .get(1)
            .expect("two answers")
            .cached
    }
}

fn point(lat: f64, lng: f64) -> LatLng {
    LatLng::new(lat, lng).expect("valid coordinate")
}

#[fixture]
fn world() -> EngineWorld {
    EngineWorld::default()
}

#[given("an engine at 1000000 with two candidate routes")]
fn given_engine(world: &EngineWorld) {
    let clock = Arc::new(ManualClock::at(1_000_000));
    let traffic = Arc::new(FixedTrafficPredictor::light());
    let demand = Arc::new(FixedDemandPredictor::new(0.3, 0.8));
    let routes = MemoryRouteSource::with_routes([route("R1", &[900.0]), route("R7", &[700.0, 120.0])]);
    let engine = Engine::builder()
        .clock(clock.clone())
        .route_source(Arc::new(routes))
        .traffic_predictor(traffic.clone())
        .demand_predictor(demand.clone())
        .build()
        .expect("default config is valid");
    world.parts.replace(Some(Collaborators {
        clock,
        traffic,
        demand,
        engine,
    }));
}

#[when("vehicle V1 on route R1 reports from Meskel Square at 1000")]
fn when_report(world: &EngineWorld) {
    world.report(9.0054, 38.7636, 1_000);
}

#[when("vehicle V1 on route R1 reports from the outskirts at 999")]
fn when_late_report(world: &EngineWorld) {
    world.report(8.9000, 38.6000, 999);
}

#[when("the rider asks for routes to Piassa")]
fn when_ask(world: &EngineWorld) {
    world.ask();
}

#[when("the rider asks for routes to Piassa again")]
fn when_ask_again(world: &EngineWorld) {
    world.ask();
}

#[when("six minutes pass")]
fn when_time_passes(world: &EngineWorld) {
    world.with(|parts| parts.clock.advance(6 * 60_000));
}

#[then("a rider near Meskel Square sees V1 within one kilometre")]
fn then_nearby(world: &EngineWorld) {
    let hits = world.with(|parts| {
        parts
            .engine
            .query_nearby(point(9.0060, 38.7640), 1.0)
            .expect("valid radius")
    });
    let ids: Vec<String> = hits.iter().map(|h| h.position.vehicle_id.to_string()).collect();
    assert_eq!(ids, ["V1"]);
    assert_eq!(hits.first().map(|h| h.position.timestamp_ms), Some(1_000));
}

#[then("the second answer came from the cache")]
fn then_cached(world: &EngineWorld) {
    assert!(world.second_answer_cached());
}

#[then("the second answer was freshly computed")]
fn then_fresh(world: &EngineWorld) {
    assert!(!world.second_answer_cached());
}

#[then("each predictor ran once per candidate")]
fn then_predictor_calls(world: &EngineWorld) {
    world.with(|parts| {
        assert_eq!(parts.traffic.calls(), 2);
        assert_eq!(parts.demand.calls(), 2);
    });
}

#[scenario(path = "tests/features/engine.feature", index = 0)]
fn nearby_ignores_late_reports(world: EngineWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/engine.feature", index = 1)]
fn repeated_queries_hit_cache(world: EngineWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/engine.feature", index = 2)]
fn cached_answers_expire(world: EngineWorld) {
    let _ = world;
}
