//! Geohash-bucketed proximity index over live vehicles.
//!
//! The index keeps one entry per vehicle in a sorted map keyed by geohash.
//! Radius queries run in two phases: [`cover_circle`] picks the geohash
//! ranges overlapping the circle's bounding box, only vehicles inside those
//! ranges are visited, and each candidate is then checked with the exact
//! haversine distance.
//!
//! The index is not synchronised; the owning store guards it with a lock.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use geo::{Distance, Haversine};

use crate::{GeoHash, LatLng, VehicleId, cover_circle};

/// Great-circle distance between two coordinates, in kilometres.
///
/// # Examples
///
/// ```
/// use ridewise_core::{LatLng, haversine_km};
///
/// let a = LatLng::new(0.0, 0.0).unwrap();
/// let b = LatLng::new(0.0, 1.0).unwrap();
/// assert!((haversine_km(a, b) - 111.19).abs() < 0.01);
/// ```
pub fn haversine_km(a: LatLng, b: LatLng) -> f64 {
    Haversine.distance(a.to_point(), b.to_point()) / 1_000.0
}

/// The geohash currently recorded for a vehicle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeoIndexEntry {
    /// Base-32 geohash of the vehicle's latest position.
    pub geohash: String,
    /// Indexed vehicle.
    pub vehicle_id: VehicleId,
}

/// A radius query hit.
#[derive(Debug, Clone, PartialEq)]
pub struct NearbyVehicle {
    /// Matching vehicle.
    pub vehicle_id: VehicleId,
    /// Great-circle distance from the query centre, in kilometres.
    pub distance_km: f64,
}

#[derive(Debug, Clone, Copy)]
struct Indexed {
    hash: GeoHash,
    location: LatLng,
}

/// Spatial index answering "which vehicles are within R km of P".
#[derive(Debug, Default)]
pub struct GeoIndex {
    buckets: BTreeMap<GeoHash, BTreeSet<VehicleId>>,
    vehicles: HashMap<VehicleId, Indexed>,
}

impl GeoIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or move a vehicle.
    ///
    /// Any previous entry for the vehicle is removed first, so a vehicle is
    /// never present under two hashes.
    pub fn upsert(&mut self, vehicle_id: &VehicleId, location: LatLng) -> GeoHash {
        let hash = GeoHash::encode(location);
        if let Some(previous) = self.vehicles.get(vehicle_id).copied() {
            if previous.hash == hash {
                self.vehicles
                    .insert(vehicle_id.clone(), Indexed { hash, location });
                return hash;
            }
            self.detach(vehicle_id, previous.hash);
        }
        self.buckets
            .entry(hash)
            .or_default()
            .insert(vehicle_id.clone());
        self.vehicles
            .insert(vehicle_id.clone(), Indexed { hash, location });
        hash
    }

    /// Remove a vehicle; returns `false` when it was not indexed.
    pub fn remove(&mut self, vehicle_id: &VehicleId) -> bool {
        match self.vehicles.remove(vehicle_id) {
            Some(previous) => {
                self.detach(vehicle_id, previous.hash);
                true
            }
            None => false,
        }
    }

    fn detach(&mut self, vehicle_id: &VehicleId, hash: GeoHash) {
        if let Some(bucket) = self.buckets.get_mut(&hash) {
            bucket.remove(vehicle_id);
            if bucket.is_empty() {
                self.buckets.remove(&hash);
            }
        }
    }

    /// Vehicles within `radius_km` of `center`, nearest first.
    ///
    /// A radius that is zero, negative, or NaN yields no results. Ties in
    /// distance are broken by vehicle id so the output is deterministic.
    pub fn query_radius(&self, center: LatLng, radius_km: f64) -> Vec<NearbyVehicle> {
        if radius_km.is_nan() || radius_km <= 0.0 {
            return Vec::new();
        }
        let cover = cover_circle(center, radius_km);
        let mut hits: Vec<NearbyVehicle> = cover
            .ranges
            .iter()
            .flat_map(|range| {
                self.buckets
                    .range(GeoHash::from_bits(range.start)..GeoHash::from_bits(range.end))
            })
            .flat_map(|(_, bucket)| bucket.iter())
            .filter_map(|vehicle_id| {
                let indexed = self.vehicles.get(vehicle_id)?;
                let distance_km = haversine_km(center, indexed.location);
                (distance_km <= radius_km).then(|| NearbyVehicle {
                    vehicle_id: vehicle_id.clone(),
                    distance_km,
                })
            })
            .collect();
        hits.sort_by(|a, b| {
            a.distance_km
                .total_cmp(&b.distance_km)
                .then_with(|| a.vehicle_id.cmp(&b.vehicle_id))
        });
        hits
    }

    /// The entry recorded for a vehicle, if any.
    pub fn entry(&self, vehicle_id: &VehicleId) -> Option<GeoIndexEntry> {
        self.vehicles.get(vehicle_id).map(|indexed| GeoIndexEntry {
            geohash: indexed.hash.to_base32(),
            vehicle_id: vehicle_id.clone(),
        })
    }

    /// Every entry, ordered by geohash.
    pub fn entries(&self) -> Vec<GeoIndexEntry> {
        self.buckets
            .iter()
            .flat_map(|(hash, bucket)| {
                bucket.iter().map(|vehicle_id| GeoIndexEntry {
                    geohash: hash.to_base32(),
                    vehicle_id: vehicle_id.clone(),
                })
            })
            .collect()
    }

    /// Number of indexed vehicles.
    pub fn len(&self) -> usize {
        self.vehicles.len()
    }

    /// Report whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }
}
