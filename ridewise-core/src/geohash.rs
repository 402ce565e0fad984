//! Fixed-precision geohash encoding and circle covers.
//!
//! A [`GeoHash`] interleaves 30 longitude bits with 30 latitude bits,
//! longitude first, exactly like the textual geohash alphabet. Because the
//! bits are interleaved, every cell at a coarser precision maps to one
//! contiguous range of full-precision hashes, so a sorted map of hashes can be
//! scanned cell by cell.

use std::f64::consts::PI;
use std::ops::Range;

use crate::LatLng;

/// Bits stored per axis in a full-precision hash.
pub const BITS_PER_AXIS: u8 = 30;

/// Characters in the base-32 text form of a full-precision hash.
pub const TEXT_LEN: usize = 12;

/// Mean Earth radius used for angular distances, in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6_371.008_8;

/// Upper bound on cells enumerated by [`cover_circle`].
pub const MAX_COVER_CELLS: u64 = 16;

const HASH_BITS: u8 = BITS_PER_AXIS * 2;
const BASE32: &[u8; 32] = b"0123456789bcdefghjkmnpqrstuvwxyz";

// Over-cover slightly so rounding in the bounding box never drops a point
// that the exact haversine check would keep.
const ANGULAR_PAD: f64 = 1.001;
const DEGREE_PAD: f64 = 1e-7;

/// A full-precision geohash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GeoHash(u64);

impl GeoHash {
    /// Encode a coordinate at full precision.
    ///
    /// # Examples
    ///
    /// ```
    /// use ridewise_core::{GeoHash, LatLng};
    ///
    /// let hash = GeoHash::encode(LatLng::new(57.64911, 10.40744).unwrap());
    /// assert!(hash.to_base32().starts_with("u4pruydqqv"));
    /// ```
    pub fn encode(point: LatLng) -> Self {
        let lat = axis_index(point.lat(), -90.0, 180.0, BITS_PER_AXIS);
        let lng = axis_index(point.lng(), -180.0, 360.0, BITS_PER_AXIS);
        Self(interleave(lng, lat))
    }

    /// Raw interleaved bits.
    pub const fn bits(self) -> u64 {
        self.0
    }

    pub(crate) const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Render the standard 12-character base-32 form.
    pub fn to_base32(self) -> String {
        (0..TEXT_LEN)
            .map(|i| {
                let shift = 55 - 5 * i;
                let symbol = (self.0 >> shift) & 0x1f;
                char::from(BASE32[usize::try_from(symbol).unwrap_or_default()])
            })
            .collect()
    }

    /// Bounding box of the full-precision cell containing this hash.
    pub fn cell(self) -> CellBounds {
        CellBounds::of_prefix(self.0, BITS_PER_AXIS)
    }
}

impl std::fmt::Display for GeoHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_base32())
    }
}

/// Latitude/longitude extent of a geohash cell, in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellBounds {
    /// Southern edge.
    pub min_lat: f64,
    /// Northern edge.
    pub max_lat: f64,
    /// Western edge.
    pub min_lng: f64,
    /// Eastern edge.
    pub max_lng: f64,
}

impl CellBounds {
    fn of_prefix(prefix: u64, step: u8) -> Self {
        let shift = HASH_BITS - 2 * step;
        let cell = prefix >> shift;
        let lng = squash(cell >> 1);
        let lat = squash(cell);
        let cells = axis_cells(step);
        let lat_size = 180.0 / cells;
        let lng_size = 360.0 / cells;
        let lat_min = -90.0 + index_to_f64(lat) * lat_size;
        let lng_min = -180.0 + index_to_f64(lng) * lng_size;
        Self {
            min_lat: lat_min,
            max_lat: lat_min + lat_size,
            min_lng: lng_min,
            max_lng: lng_min + lng_size,
        }
    }

    /// Report whether the point lies inside the cell (edges inclusive).
    pub fn contains(&self, point: LatLng) -> bool {
        (self.min_lat..=self.max_lat).contains(&point.lat())
            && (self.min_lng..=self.max_lng).contains(&point.lng())
    }
}

/// Hash ranges that together cover a circle on the sphere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellCover {
    /// Bits per axis of the cells that were enumerated.
    pub step: u8,
    /// Sorted, non-overlapping half-open ranges of full-precision hashes.
    pub ranges: Vec<Range<u64>>,
}

impl CellCover {
    fn whole_world() -> Self {
        Self {
            step: 0,
            ranges: vec![0..(1_u64 << HASH_BITS)],
        }
    }

    /// Report whether `hash` falls inside any covered range.
    pub fn contains(&self, hash: GeoHash) -> bool {
        self.ranges.iter().any(|range| range.contains(&hash.0))
    }
}

/// Cover the circle of `radius_km` around `center` with geohash cells.
///
/// The cover is built from the circle's bounding box on the sphere. When the
/// circle reaches a pole the box spans every longitude; when it crosses the
/// antimeridian the longitude cell indices wrap around. The finest precision
/// whose box needs at most [`MAX_COVER_CELLS`] cells is chosen, and adjacent
/// cells are merged into single ranges.
///
/// # Examples
///
/// ```
/// use ridewise_core::{LatLng, cover_circle};
///
/// let cover = cover_circle(LatLng::new(0.0, 179.999).unwrap(), 2.0);
/// assert!(cover.ranges.len() >= 2, "cover wraps across the antimeridian");
/// ```
pub fn cover_circle(center: LatLng, radius_km: f64) -> CellCover {
    let angular = radius_km / EARTH_RADIUS_KM * ANGULAR_PAD;
    if !angular.is_finite() || angular >= PI {
        return CellCover::whole_world();
    }
    let bbox = SphericalBox::around(center, angular);
    let step = (0..=BITS_PER_AXIS)
        .rev()
        .find(|&step| bbox.cell_count(step) <= MAX_COVER_CELLS)
        .unwrap_or(0);
    CellCover {
        step,
        ranges: bbox.ranges(step),
    }
}

/// Bounding box of a spherical cap, with longitude possibly unwrapped.
struct SphericalBox {
    min_lat: f64,
    max_lat: f64,
    /// `None` when every longitude is covered.
    lng: Option<(f64, f64)>,
}

impl SphericalBox {
    fn around(center: LatLng, angular: f64) -> Self {
        let dlat = angular.to_degrees() + DEGREE_PAD;
        let reaches_pole = center.lat() + dlat >= 90.0 || center.lat() - dlat <= -90.0;
        let min_lat = (center.lat() - dlat).max(-90.0);
        let max_lat = (center.lat() + dlat).min(90.0);

        let lat_cos = center.lat().to_radians().cos();
        let sin_angular = angular.sin();
        let lng = if reaches_pole || sin_angular >= lat_cos {
            None
        } else {
            let dlng = (sin_angular / lat_cos).asin().to_degrees() + DEGREE_PAD;
            (dlng < 180.0).then(|| (center.lng() - dlng, center.lng() + dlng))
        };
        Self {
            min_lat,
            max_lat,
            lng,
        }
    }

    fn lat_cells(&self, step: u8) -> (u64, u64) {
        (
            axis_index(self.min_lat, -90.0, 180.0, step),
            axis_index(self.max_lat, -90.0, 180.0, step),
        )
    }

    /// Longitude cell indices, unwrapped, or `None` for a full band.
    fn lng_cells(&self, step: u8) -> Option<(i64, i64)> {
        let (west, east) = self.lng?;
        let lo = unclamped_index(west, -180.0, 360.0, step);
        let hi = unclamped_index(east, -180.0, 360.0, step);
        let span = u64::try_from(hi - lo + 1).unwrap_or(u64::MAX);
        (span < 1_u64 << step).then_some((lo, hi))
    }

    fn cell_count(&self, step: u8) -> u64 {
        let (lat_lo, lat_hi) = self.lat_cells(step);
        let lat_count = lat_hi - lat_lo + 1;
        let lng_count = self.lng_cells(step).map_or(1_u64 << step, |(lo, hi)| {
            u64::try_from(hi - lo + 1).unwrap_or(u64::MAX)
        });
        lat_count.saturating_mul(lng_count)
    }

    fn ranges(&self, step: u8) -> Vec<Range<u64>> {
        let (lat_lo, lat_hi) = self.lat_cells(step);
        let axis = 1_i64 << step;
        let lng_indices: Vec<u64> = match self.lng_cells(step) {
            Some((lo, hi)) => (lo..=hi)
                .map(|i| u64::try_from(i.rem_euclid(axis)).unwrap_or_default())
                .collect(),
            None => (0..(1_u64 << step)).collect(),
        };
        let shift = HASH_BITS - 2 * step;
        let mut ranges: Vec<Range<u64>> = (lat_lo..=lat_hi)
            .flat_map(|lat| {
                lng_indices.iter().map(move |&lng| {
                    let prefix = interleave(lng, lat);
                    (prefix << shift)..((prefix + 1) << shift)
                })
            })
            .collect();
        ranges.sort_unstable_by_key(|range| range.start);
        merge_ranges(ranges)
    }
}

fn merge_ranges(sorted: Vec<Range<u64>>) -> Vec<Range<u64>> {
    let mut merged: Vec<Range<u64>> = Vec::with_capacity(sorted.len());
    for range in sorted {
        match merged.last_mut() {
            Some(last) if last.end >= range.start => last.end = last.end.max(range.end),
            _ => merged.push(range),
        }
    }
    merged
}

fn axis_cells(step: u8) -> f64 {
    index_to_f64(1_u64 << step)
}

// Cell indices never exceed 2^30, so the conversion is exact.
fn index_to_f64(index: u64) -> f64 {
    index as f64
}

/// Cell index of `value` along an axis starting at `min` with length `span`.
fn axis_index(value: f64, min: f64, span: f64, step: u8) -> u64 {
    let max_index = (1_i64 << step) - 1;
    let index = unclamped_index(value, min, span, step).clamp(0, max_index);
    u64::try_from(index).unwrap_or_default()
}

// Float to int casts saturate; callers clamp or wrap the result.
fn unclamped_index(value: f64, min: f64, span: f64, step: u8) -> i64 {
    ((value - min) / span * axis_cells(step)).floor() as i64
}

/// Spread the low 32 bits of `v` onto the even bit positions.
const fn spread(v: u64) -> u64 {
    let mut x = v & 0xFFFF_FFFF;
    x = (x | (x << 16)) & 0x0000_FFFF_0000_FFFF;
    x = (x | (x << 8)) & 0x00FF_00FF_00FF_00FF;
    x = (x | (x << 4)) & 0x0F0F_0F0F_0F0F_0F0F;
    x = (x | (x << 2)) & 0x3333_3333_3333_3333;
    (x | (x << 1)) & 0x5555_5555_5555_5555
}

/// Inverse of [`spread`].
const fn squash(v: u64) -> u64 {
    let mut x = v & 0x5555_5555_5555_5555;
    x = (x | (x >> 1)) & 0x3333_3333_3333_3333;
    x = (x | (x >> 2)) & 0x0F0F_0F0F_0F0F_0F0F;
    x = (x | (x >> 4)) & 0x00FF_00FF_00FF_00FF;
    x = (x | (x >> 8)) & 0x0000_FFFF_0000_FFFF;
    (x | (x >> 16)) & 0x0000_0000_FFFF_FFFF
}

const fn interleave(lng: u64, lat: u64) -> u64 {
    (spread(lng) << 1) | spread(lat)
}
