//! Peak-hour heuristic predictors.
//!
//! A fixed table maps the local hour and day type to a traffic multiplier and
//! a load factor. Historical samples from the same local hour are blended in,
//! and confidence grows with the number of samples. Only transit legs are
//! slowed by traffic; walking legs keep their timetabled duration.

use ridewise_core::{
    DemandPrediction, DemandPredictor, HistoricalSample, PredictorError, RouteHistory,
    RouteOption, TimestampMs, TrafficCondition, TrafficPrediction, TrafficPredictor,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const MS_PER_HOUR: i64 = 3_600_000;
const MS_PER_DAY: i64 = 24 * MS_PER_HOUR;
const MS_PER_MINUTE: i64 = 60_000;
/// 1970-01-01 was a Thursday; with Monday as 0 that is index 3.
const EPOCH_WEEKDAY: i64 = 3;
const MAX_OFFSET_MINUTES: i32 = 14 * 60;

/// Confidence of a table-only estimate.
pub const BASE_CONFIDENCE: f64 = 0.4;

/// Extra confidence available from history.
pub const HISTORY_CONFIDENCE: f64 = 0.5;

/// Samples at which history and table carry equal weight.
pub const HISTORY_HALF_WEIGHT: f64 = 5.0;

/// Load bucket for a local hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DemandBucket {
    /// Commuter peak.
    Peak,
    /// Hours either side of a peak, and weekend middays.
    Shoulder,
    /// Daytime outside the peaks.
    OffPeak,
    /// Late evening and early morning.
    Night,
}

impl DemandBucket {
    /// Bucket for a local hour (`0..24`) on a weekday or weekend.
    #[must_use]
    pub const fn for_hour(hour: u8, weekend: bool) -> Self {
        if weekend {
            match hour {
                11..=16 => Self::Shoulder,
                8..=10 | 17..=20 => Self::OffPeak,
                _ => Self::Night,
            }
        } else {
            match hour {
                7..=9 | 16..=19 => Self::Peak,
                6 | 10 | 15 | 20 => Self::Shoulder,
                11..=14 => Self::OffPeak,
                _ => Self::Night,
            }
        }
    }

    /// Travel-time multiplier for transit legs.
    #[must_use]
    pub const fn traffic_multiplier(self) -> f64 {
        match self {
            Self::Peak => 1.45,
            Self::Shoulder => 1.2,
            Self::OffPeak => 1.05,
            Self::Night => 0.95,
        }
    }

    /// Expected load factor.
    #[must_use]
    pub const fn occupancy(self) -> f64 {
        match self {
            Self::Peak => 0.85,
            Self::Shoulder => 0.6,
            Self::OffPeak => 0.4,
            Self::Night => 0.15,
        }
    }
}

/// Errors returned by [`PeakHourTable::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PeakHourError {
    /// The UTC offset was beyond ±14 hours.
    #[error("UTC offset of {0} minutes is outside -840..=840")]
    OffsetOutOfRange(i32),
}

/// Local-time lookup shared by both heuristic predictors.
///
/// # Examples
///
/// ```
/// use ridewise_scorer::{DemandBucket, PeakHourTable};
///
/// // Monday 2024-01-08 05:30 UTC is 08:30 in Addis Ababa (UTC+3).
/// let table = PeakHourTable::new(180).unwrap();
/// assert_eq!(table.bucket(1_704_691_800_000), DemandBucket::Peak);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeakHourTable {
    utc_offset_minutes: i32,
}

impl PeakHourTable {
    /// Table for a fixed UTC offset in minutes.
    ///
    /// # Errors
    ///
    /// Returns [`PeakHourError::OffsetOutOfRange`] beyond ±14 hours.
    pub const fn new(utc_offset_minutes: i32) -> Result<Self, PeakHourError> {
        if utc_offset_minutes.abs() > MAX_OFFSET_MINUTES {
            return Err(PeakHourError::OffsetOutOfRange(utc_offset_minutes));
        }
        Ok(Self { utc_offset_minutes })
    }

    /// Configured offset in minutes.
    #[must_use]
    pub const fn utc_offset_minutes(self) -> i32 {
        self.utc_offset_minutes
    }

    /// Local hour and weekend flag for an instant.
    #[must_use]
    pub fn local_hour(self, at_ms: TimestampMs) -> (u8, bool) {
        let local = i64::try_from(at_ms)
            .unwrap_or(i64::MAX)
            .saturating_add(i64::from(self.utc_offset_minutes) * MS_PER_MINUTE);
        let day = local.div_euclid(MS_PER_DAY);
        let weekday = (day + EPOCH_WEEKDAY).rem_euclid(7);
        let hour = local.rem_euclid(MS_PER_DAY).div_euclid(MS_PER_HOUR);
        (u8::try_from(hour).unwrap_or_default(), weekday >= 5)
    }

    /// Demand bucket for an instant.
    #[must_use]
    pub fn bucket(self, at_ms: TimestampMs) -> DemandBucket {
        let (hour, weekend) = self.local_hour(at_ms);
        DemandBucket::for_hour(hour, weekend)
    }

    fn same_hour<'a>(
        self,
        history: &'a RouteHistory,
        departure_ms: TimestampMs,
    ) -> impl Iterator<Item = &'a HistoricalSample> {
        let target = self.local_hour(departure_ms);
        history
            .samples
            .iter()
            .filter(move |sample| self.local_hour(sample.departure_ms) == target)
    }
}

/// Weight given to history when `samples` observations are available.
#[must_use]
#[expect(
    clippy::float_arithmetic,
    reason = "history weight is a saturating ratio"
)]
pub fn history_weight(samples: usize) -> f64 {
    let n = f64::from(u32::try_from(samples).unwrap_or(u32::MAX));
    n / (n + HISTORY_HALF_WEIGHT)
}

#[expect(
    clippy::float_arithmetic,
    reason = "blending table and history estimates"
)]
fn blend(table: f64, observed: Option<(f64, usize)>) -> (f64, f64) {
    observed.map_or((table, BASE_CONFIDENCE), |(average, count)| {
        let weight = history_weight(count);
        (
            table * (1.0 - weight) + average * weight,
            BASE_CONFIDENCE + HISTORY_CONFIDENCE * weight,
        )
    })
}

#[expect(clippy::float_arithmetic, reason = "arithmetic mean of samples")]
fn mean(values: impl Iterator<Item = f64>) -> Option<(f64, usize)> {
    let (sum, count) = values.fold((0.0, 0_usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| (sum / f64::from(u32::try_from(count).unwrap_or(u32::MAX)), count))
}

/// Traffic predictor driven by [`PeakHourTable`] and history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeuristicTrafficPredictor {
    table: PeakHourTable,
}

impl HeuristicTrafficPredictor {
    /// Predictor using `table`.
    #[must_use]
    pub const fn new(table: PeakHourTable) -> Self {
        Self { table }
    }
}

impl TrafficPredictor for HeuristicTrafficPredictor {
    #[expect(
        clippy::float_arithmetic,
        reason = "durations scale with the traffic multiplier"
    )]
    fn predict(
        &self,
        route: &RouteOption,
        departure_ms: TimestampMs,
        history: &RouteHistory,
    ) -> Result<TrafficPrediction, PredictorError> {
        let table = self.table.bucket(departure_ms).traffic_multiplier();
        let observed = mean(
            self.table
                .same_hour(history, departure_ms)
                .filter(|s| s.scheduled_duration_sec > 0.0 && s.observed_duration_sec.is_finite())
                .map(|s| s.observed_duration_sec / s.scheduled_duration_sec),
        );
        let (multiplier, confidence) = blend(table, observed);

        let (transit, walking) = route.segments.iter().fold((0.0, 0.0), |(t, w), s| {
            if s.mode.is_transit() {
                (t + s.duration_sec, w)
            } else {
                (t, w + s.duration_sec)
            }
        });
        let predicted = walking + transit * multiplier;
        let scheduled = route.scheduled_duration_sec();
        Ok(TrafficPrediction {
            predicted_duration_sec: predicted,
            expected_delay_sec: (predicted - scheduled).max(0.0),
            condition: TrafficCondition::from_ratio(multiplier),
            confidence,
            computed_at: departure_ms,
        })
    }
}

/// Demand predictor driven by [`PeakHourTable`] and history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeuristicDemandPredictor {
    table: PeakHourTable,
}

impl HeuristicDemandPredictor {
    /// Predictor using `table`.
    #[must_use]
    pub const fn new(table: PeakHourTable) -> Self {
        Self { table }
    }
}

impl DemandPredictor for HeuristicDemandPredictor {
    fn predict(
        &self,
        _route: &RouteOption,
        departure_ms: TimestampMs,
        history: &RouteHistory,
    ) -> Result<DemandPrediction, PredictorError> {
        let table = self.table.bucket(departure_ms).occupancy();
        let observed = mean(
            self.table
                .same_hour(history, departure_ms)
                .filter_map(|s| s.observed_occupancy)
                .filter(|o| o.is_finite()),
        );
        let (occupancy, confidence) = blend(table, observed);
        Ok(DemandPrediction {
            predicted_occupancy: occupancy.clamp(0.0, 1.0),
            confidence,
            computed_at: departure_ms,
        })
    }
}
