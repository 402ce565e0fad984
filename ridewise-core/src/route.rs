//! Candidate routes, rider preferences, and scored recommendations.

use thiserror::Error;

use crate::{DemandPrediction, LatLng, RouteId, StopId, TimestampMs, TrafficPrediction};

/// How a segment is travelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum TransitMode {
    /// On foot between stops or to/from the endpoints.
    Walk,
    /// Bus line.
    Bus,
    /// Light rail or tram line.
    Rail,
    /// Shared minibus taxi.
    Minibus,
}

impl TransitMode {
    /// Report whether the mode rides a vehicle rather than walking.
    pub const fn is_transit(self) -> bool {
        !matches!(self, Self::Walk)
    }
}

/// One leg of a route option.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct RouteSegment {
    /// Travel mode.
    pub mode: TransitMode,
    /// Line served, for transit legs.
    pub route_id: Option<RouteId>,
    /// Boarding stop, for transit legs.
    pub from_stop: Option<StopId>,
    /// Alighting stop, for transit legs.
    pub to_stop: Option<StopId>,
    /// Scheduled duration in seconds.
    pub duration_sec: f64,
    /// Whether the leg is step-free.
    pub wheelchair_accessible: bool,
}

impl RouteSegment {
    /// A step-free walking leg.
    pub const fn walk(duration_sec: f64) -> Self {
        Self {
            mode: TransitMode::Walk,
            route_id: None,
            from_stop: None,
            to_stop: None,
            duration_sec,
            wheelchair_accessible: true,
        }
    }

    /// An accessible transit leg on `route_id`.
    pub fn ride(mode: TransitMode, route_id: impl Into<RouteId>, duration_sec: f64) -> Self {
        Self {
            mode,
            route_id: Some(route_id.into()),
            from_stop: None,
            to_stop: None,
            duration_sec,
            wheelchair_accessible: true,
        }
    }

    /// Set the boarding and alighting stops.
    #[must_use]
    pub fn between(mut self, from: impl Into<StopId>, to: impl Into<StopId>) -> Self {
        self.from_stop = Some(from.into());
        self.to_stop = Some(to.into());
        self
    }

    /// Mark the leg as not step-free.
    #[must_use]
    pub const fn inaccessible(mut self) -> Self {
        self.wheelchair_accessible = false;
        self
    }
}

/// Errors returned by [`RouteOption::new`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RouteError {
    /// The option had no segments.
    #[error("route option {id} has no segments")]
    Empty {
        /// Option identifier.
        id: String,
    },
    /// A segment duration was negative, NaN, or infinite.
    #[error("route option {id} segment {index} has invalid duration {duration_sec}")]
    InvalidDuration {
        /// Option identifier.
        id: String,
        /// Zero-based segment index.
        index: usize,
        /// Offending value.
        duration_sec: f64,
    },
}

/// A candidate itinerary from origin to destination.
///
/// # Examples
///
/// ```
/// use ridewise_core::{RouteOption, RouteSegment, TransitMode};
///
/// # fn main() -> Result<(), ridewise_core::RouteError> {
/// let option = RouteOption::new(
///     "a",
///     vec![
///         RouteSegment::walk(120.0),
///         RouteSegment::ride(TransitMode::Bus, "R1", 900.0),
///         RouteSegment::ride(TransitMode::Rail, "L2", 600.0),
///     ],
/// )?;
/// assert_eq!(option.scheduled_duration_sec(), 1_620.0);
/// assert_eq!(option.transfers(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct RouteOption {
    /// Identifier unique within one query's candidates.
    pub id: String,
    /// Ordered legs.
    pub segments: Vec<RouteSegment>,
}

impl RouteOption {
    /// Validate and construct a route option.
    pub fn new(id: impl Into<String>, segments: Vec<RouteSegment>) -> Result<Self, RouteError> {
        let id = id.into();
        if segments.is_empty() {
            return Err(RouteError::Empty { id });
        }
        if let Some((index, segment)) = segments
            .iter()
            .enumerate()
            .find(|(_, s)| !s.duration_sec.is_finite() || s.duration_sec < 0.0)
        {
            return Err(RouteError::InvalidDuration {
                duration_sec: segment.duration_sec,
                id,
                index,
            });
        }
        Ok(Self { id, segments })
    }

    /// Sum of segment durations, in seconds.
    pub fn scheduled_duration_sec(&self) -> f64 {
        self.segments.iter().map(|s| s.duration_sec).sum()
    }

    /// Number of vehicle changes.
    pub fn transfers(&self) -> usize {
        self.transit_segments().count().saturating_sub(1)
    }

    /// Report whether every leg is step-free.
    pub fn is_wheelchair_accessible(&self) -> bool {
        self.segments.iter().all(|s| s.wheelchair_accessible)
    }

    /// Lines ridden, in order.
    pub fn route_ids(&self) -> impl Iterator<Item = &RouteId> {
        self.transit_segments().filter_map(|s| s.route_id.as_ref())
    }

    /// The first line ridden, used to look up history.
    pub fn primary_route_id(&self) -> Option<&RouteId> {
        self.route_ids().next()
    }

    fn transit_segments(&self) -> impl Iterator<Item = &RouteSegment> {
        self.segments.iter().filter(|s| s.mode.is_transit())
    }
}

/// Rider preferences applied when ranking.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase", default))]
pub struct RoutePreferences {
    /// Penalise crowded routes.
    pub avoid_crowds: bool,
    /// Rank by predicted duration only.
    pub prioritize_speed: bool,
    /// Drop candidates with more transfers than this.
    pub max_transfers: Option<usize>,
    /// Drop candidates with any inaccessible leg.
    pub wheelchair_accessible: bool,
}

impl RoutePreferences {
    /// Report whether a candidate passes the hard filters.
    pub fn admits(&self, route: &RouteOption) -> bool {
        let transfers_ok = self
            .max_transfers
            .is_none_or(|limit| route.transfers() <= limit);
        let access_ok = !self.wheelchair_accessible || route.is_wheelchair_accessible();
        transfers_ok && access_ok
    }
}

/// A rider-facing note attached to a scored route.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")
)]
pub enum RouteInsight {
    /// Traffic is slower than light.
    Traffic {
        /// Congestion level.
        condition: crate::TrafficCondition,
        /// Expected delay in seconds.
        expected_delay_sec: f64,
    },
    /// Vehicles are expected to be crowded.
    Crowded {
        /// Expected load factor.
        occupancy: f64,
    },
    /// One of the predictions is weak.
    LowConfidence {
        /// The lower of the two confidences.
        confidence: f64,
    },
}

/// A route option with predictions and its comfort score.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct ScoredRoute {
    /// The underlying itinerary.
    pub route: RouteOption,
    /// Traffic prediction used.
    pub traffic: TrafficPrediction,
    /// Demand prediction used.
    pub demand: DemandPrediction,
    /// Predicted duration in seconds.
    pub predicted_duration_sec: f64,
    /// Predicted load factor.
    pub predicted_crowding: f64,
    /// Comfort score; lower is better.
    pub comfort_score: f64,
    /// Rider-facing notes.
    pub insights: Vec<RouteInsight>,
}

/// A ranked answer to a route query.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct Recommendation {
    /// Best routes.
    pub primary: Vec<ScoredRoute>,
    /// Remaining ranked routes.
    pub alternatives: Vec<ScoredRoute>,
    /// Whether the answer was served from the cache.
    pub cached: bool,
}

impl Recommendation {
    /// Split a ranked list after the first `max_primary` routes.
    pub fn split(mut ranked: Vec<ScoredRoute>, max_primary: usize, cached: bool) -> Self {
        let alternatives = ranked.split_off(max_primary.min(ranked.len()));
        Self {
            primary: ranked,
            alternatives,
            cached,
        }
    }

    /// Every route, primary first.
    pub fn all(&self) -> impl Iterator<Item = &ScoredRoute> {
        self.primary.iter().chain(&self.alternatives)
    }
}

/// Errors returned by a [`RouteSource`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteSourceError {
    /// The journey planner could not be reached.
    #[error("route source is unavailable: {0}")]
    Unavailable(String),
}

/// Supplies candidate itineraries for an origin/destination pair.
///
/// Journey planning is external to the engine; implementations adapt
/// whichever planner the deployment uses.
pub trait RouteSource: Send + Sync {
    /// Candidate routes departing at `departure_ms`.
    fn candidates(
        &self,
        origin: LatLng,
        destination: LatLng,
        departure_ms: TimestampMs,
    ) -> Result<Vec<RouteOption>, RouteSourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn option(segments: Vec<RouteSegment>) -> RouteOption {
        RouteOption::new("t", segments).expect("valid route")
    }

    #[rstest]
    fn rejects_empty_and_negative() {
        assert!(matches!(
            RouteOption::new("a", Vec::new()),
            Err(RouteError::Empty { .. })
        ));
        assert!(matches!(
            RouteOption::new("a", vec![RouteSegment::walk(-1.0)]),
            Err(RouteError::InvalidDuration { index: 0, .. })
        ));
    }

    #[rstest]
    #[case(vec![RouteSegment::walk(60.0)], 0)]
    #[case(vec![RouteSegment::ride(TransitMode::Bus, "R1", 60.0)], 0)]
    #[case(vec![
        RouteSegment::ride(TransitMode::Bus, "R1", 60.0),
        RouteSegment::walk(30.0),
        RouteSegment::ride(TransitMode::Minibus, "M4", 60.0),
    ], 1)]
    fn counts_transfers(#[case] segments: Vec<RouteSegment>, #[case] expected: usize) {
        assert_eq!(option(segments).transfers(), expected);
    }

    #[rstest]
    #[case(RoutePreferences::default(), true)]
    #[case(RoutePreferences { max_transfers: Some(0), ..Default::default() }, false)]
    #[case(RoutePreferences { max_transfers: Some(1), ..Default::default() }, true)]
    #[case(RoutePreferences { wheelchair_accessible: true, ..Default::default() }, false)]
    fn preferences_filter_candidates(#[case] prefs: RoutePreferences, #[case] admitted: bool) {
        let route = option(vec![
            RouteSegment::ride(TransitMode::Bus, "R1", 600.0),
            RouteSegment::ride(TransitMode::Rail, "L1", 300.0).inaccessible(),
        ]);
        assert_eq!(prefs.admits(&route), admitted);
    }

    #[rstest]
    #[case(0, 0, 3)]
    #[case(1, 1, 2)]
    #[case(5, 3, 0)]
    fn split_respects_primary_limit(
        #[case] max_primary: usize,
        #[case] primary: usize,
        #[case] alternatives: usize,
    ) {
        let scored = crate::test_support::scored_routes(3);
        let recommendation = Recommendation::split(scored, max_primary, false);
        assert_eq!(recommendation.primary.len(), primary);
        assert_eq!(recommendation.alternatives.len(), alternatives);
        assert_eq!(recommendation.all().count(), 3);
    }
}
