//! Behavioural tests for radius queries over the geohash index.

use std::cell::RefCell;

use ridewise_core::{GeoIndex, LatLng, NearbyVehicle, VehicleId};
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

#[derive(Default)]
struct IndexWorld {
    index: RefCell<GeoIndex>,
    results: RefCell<Vec<NearbyVehicle>>,
}

#[fixture]
fn world() -> IndexWorld {
    IndexWorld::default()
}

fn at(lat: f64, lng: f64) -> LatLng {
    LatLng::new(lat, lng).expect("valid coordinate")
}

fn rider() -> LatLng {
    at(9.0060, 38.7640)
}

fn result_ids(world: &IndexWorld) -> Vec<String> {
    world
        .results
        .borrow()
        .iter()
        .map(|hit| hit.vehicle_id.to_string())
        .collect()
}

#[given("vehicle V1 near Meskel Square")]
fn given_v1(world: &IndexWorld) {
    world
        .index
        .borrow_mut()
        .upsert(&VehicleId::from("V1"), at(9.0054, 38.7636));
}

#[given("vehicle V1 moves to the outskirts")]
fn given_v1_moves(world: &IndexWorld) {
    world
        .index
        .borrow_mut()
        .upsert(&VehicleId::from("V1"), at(8.9000, 38.6000));
}

#[given("vehicle V7 just east of the antimeridian")]
fn given_v7(world: &IndexWorld) {
    world
        .index
        .borrow_mut()
        .upsert(&VehicleId::from("V7"), at(0.0, -179.999));
}

#[when("I query one kilometre around the rider")]
fn when_query_rider(world: &IndexWorld) {
    let hits = world.index.borrow().query_radius(rider(), 1.0);
    world.results.replace(hits);
}

#[when("I query zero kilometres around the rider")]
fn when_query_zero(world: &IndexWorld) {
    let hits = world.index.borrow().query_radius(rider(), 0.0);
    world.results.replace(hits);
}

#[when("I query one kilometre just west of the antimeridian")]
fn when_query_meridian(world: &IndexWorld) {
    let hits = world.index.borrow().query_radius(at(0.0, 179.999), 1.0);
    world.results.replace(hits);
}

#[then("only V1 is returned")]
fn then_only_v1(world: &IndexWorld) {
    assert_eq!(result_ids(world), vec!["V1".to_owned()]);
}

#[then("only V7 is returned")]
fn then_only_v7(world: &IndexWorld) {
    assert_eq!(result_ids(world), vec!["V7".to_owned()]);
}

#[then("no vehicles are returned")]
fn then_none(world: &IndexWorld) {
    assert!(world.results.borrow().is_empty(), "expected no results");
}

#[then("the index holds exactly one entry for V1")]
fn then_single_entry(world: &IndexWorld) {
    let index = world.index.borrow();
    let entries: Vec<_> = index
        .entries()
        .into_iter()
        .filter(|entry| entry.vehicle_id.as_str() == "V1")
        .collect();
    assert_eq!(entries.len(), 1, "vehicle must appear under one geohash");
}

#[scenario(path = "tests/features/geo_index.feature", index = 0)]
fn nearby_vehicle_found(world: IndexWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/geo_index.feature", index = 1)]
fn moved_vehicle_not_found(world: IndexWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/geo_index.feature", index = 2)]
fn antimeridian_neighbour_found(world: IndexWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/geo_index.feature", index = 3)]
fn zero_radius_is_empty(world: IndexWorld) {
    let _ = world;
}
