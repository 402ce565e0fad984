//! Property-based tests for the position store.
//!
//! # Invariants tested
//!
//! - **Out-of-order rejection:** an update older than the stored one leaves
//!   the stored position untouched.
//! - **Index sync:** after any sequence of updates and evictions the index
//!   holds exactly one entry per live vehicle.

use proptest::prelude::*;
use ridewise_core::{VehicleId, VehiclePosition};
use ridewise_tracking::PositionStore;

#[derive(Debug, Clone)]
enum Op {
    Report {
        vehicle: usize,
        lat: f64,
        lng: f64,
        timestamp_ms: u64,
    },
    Sweep {
        now_ms: u64,
    },
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0_usize..6, -80.0_f64..80.0, -180.0_f64..=180.0, 0_u64..10_000).prop_map(
            |(vehicle, lat, lng, timestamp_ms)| Op::Report { vehicle, lat, lng, timestamp_ms }
        ),
        1 => (0_u64..20_000).prop_map(|now_ms| Op::Sweep { now_ms }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: stale timestamps never change stored state.
    #[test]
    fn older_updates_are_rejected(
        stored_ms in 1_u64..1_000_000,
        age in 1_u64..1_000,
        lat in -80.0_f64..80.0,
        lng in -180.0_f64..180.0,
    ) {
        let store = PositionStore::new();
        let first = VehiclePosition::new("V1", "R1", 0.0, 0.0, stored_ms).expect("valid");
        store.apply(first.clone()).expect("accepted");

        let late = VehiclePosition::new("V1", "R1", lat, lng, stored_ms.saturating_sub(age))
            .expect("valid");
        let outcome = store.apply(late).expect("accepted");

        prop_assert!(!outcome.is_applied(), "late update applied: {:?}", outcome);
        prop_assert_eq!(store.get(&VehicleId::from("V1")), Some(first));
    }

    /// Property: the index mirrors the set of live vehicles.
    #[test]
    fn index_tracks_live_vehicles(ops in prop::collection::vec(op(), 1..80)) {
        let store = PositionStore::new();
        for op in ops {
            match op {
                Op::Report { vehicle, lat, lng, timestamp_ms } => {
                    let position = VehiclePosition::new(
                        format!("v{vehicle}"),
                        format!("r{}", vehicle % 2),
                        lat,
                        lng,
                        timestamp_ms,
                    )
                    .expect("valid");
                    store.apply(position).expect("accepted");
                }
                Op::Sweep { now_ms } => {
                    store.evict_stale(now_ms, 5_000);
                }
            }
        }

        let entries = store.index_entries();
        prop_assert_eq!(entries.len(), store.len());
        for entry in entries {
            prop_assert!(store.get(&entry.vehicle_id).is_some());
        }
    }
}
