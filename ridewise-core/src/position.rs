//! Validated coordinates and live vehicle positions.
//!
//! Constructors return `Result` so malformed input is rejected at the
//! boundary and never reaches the spatial index.

use geo::Point;
use thiserror::Error;

use crate::{RouteId, VehicleId};

/// Milliseconds since the Unix epoch.
pub type TimestampMs = u64;

/// A WGS84 latitude/longitude pair in degrees.
///
/// # Examples
///
/// ```
/// use ridewise_core::LatLng;
///
/// # fn main() -> Result<(), ridewise_core::CoordinateError> {
/// let stop = LatLng::new(9.0054, 38.7636)?;
/// assert_eq!(stop.lat(), 9.0054);
/// assert!(LatLng::new(f64::NAN, 0.0).is_err());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LatLng {
    lat: f64,
    lng: f64,
}

/// Errors returned by [`LatLng::new`].
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum CoordinateError {
    /// Latitude was NaN or infinite.
    #[error("latitude must be a finite number")]
    NonFiniteLatitude,
    /// Longitude was NaN or infinite.
    #[error("longitude must be a finite number")]
    NonFiniteLongitude,
    /// Latitude fell outside `-90.0..=90.0`.
    #[error("latitude {0} is outside -90..=90")]
    LatitudeOutOfRange(f64),
    /// Longitude fell outside `-180.0..=180.0`.
    #[error("longitude {0} is outside -180..=180")]
    LongitudeOutOfRange(f64),
}

impl LatLng {
    /// Validate and construct a coordinate pair.
    pub fn new(lat: f64, lng: f64) -> Result<Self, CoordinateError> {
        if !lat.is_finite() {
            return Err(CoordinateError::NonFiniteLatitude);
        }
        if !lng.is_finite() {
            return Err(CoordinateError::NonFiniteLongitude);
        }
        if !(-90.0..=90.0).contains(&lat) {
            return Err(CoordinateError::LatitudeOutOfRange(lat));
        }
        if !(-180.0..=180.0).contains(&lng) {
            return Err(CoordinateError::LongitudeOutOfRange(lng));
        }
        Ok(Self { lat, lng })
    }

    /// Latitude in degrees.
    pub const fn lat(self) -> f64 {
        self.lat
    }

    /// Longitude in degrees.
    pub const fn lng(self) -> f64 {
        self.lng
    }

    /// Convert to a `geo` point (`x = longitude`, `y = latitude`).
    pub fn to_point(self) -> Point<f64> {
        Point::new(self.lng, self.lat)
    }
}

/// Coarse passenger load reported by a vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Occupancy {
    /// Plenty of seats.
    Low,
    /// Standing room.
    Medium,
    /// Crowded.
    High,
}

/// Latest reported state of a single vehicle.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct VehiclePosition {
    /// Reporting vehicle.
    pub vehicle_id: VehicleId,
    /// Route the vehicle is serving.
    pub route_id: RouteId,
    /// Reported location.
    pub location: LatLng,
    /// Heading in degrees clockwise from north, if known.
    pub bearing: Option<f64>,
    /// Ground speed in km/h, if known.
    pub speed_kmh: Option<f64>,
    /// Passenger load, if reported.
    pub occupancy: Option<Occupancy>,
    /// Time the position was sampled.
    pub timestamp_ms: TimestampMs,
}

/// Validation failures for a position update.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PositionError {
    /// The update carried no vehicle identifier.
    #[error("position update is missing a vehicle id")]
    MissingVehicleId,
    /// The update carried no route identifier.
    #[error("position update for vehicle {vehicle_id} is missing a route id")]
    MissingRouteId {
        /// Vehicle that sent the update.
        vehicle_id: VehicleId,
    },
    /// The coordinates were unusable.
    #[error("position update for vehicle {vehicle_id} has invalid coordinates: {source}")]
    InvalidCoordinates {
        /// Vehicle that sent the update.
        vehicle_id: VehicleId,
        /// Reason the coordinates were rejected.
        #[source]
        source: CoordinateError,
    },
    /// Bearing or speed was NaN, infinite, or negative.
    #[error("position update for vehicle {vehicle_id} has an invalid {field}")]
    InvalidMotion {
        /// Vehicle that sent the update.
        vehicle_id: VehicleId,
        /// Offending field name.
        field: &'static str,
    },
}

impl VehiclePosition {
    /// Validate raw fields and build a position without optional telemetry.
    ///
    /// # Examples
    ///
    /// ```
    /// use ridewise_core::VehiclePosition;
    ///
    /// let position = VehiclePosition::new("V1", "R1", 9.0054, 38.7636, 1_000).unwrap();
    /// assert_eq!(position.vehicle_id.as_str(), "V1");
    /// assert!(VehiclePosition::new("", "R1", 9.0, 38.0, 1_000).is_err());
    /// ```
    pub fn new(
        vehicle_id: impl Into<VehicleId>,
        route_id: impl Into<RouteId>,
        lat: f64,
        lng: f64,
        timestamp_ms: TimestampMs,
    ) -> Result<Self, PositionError> {
        let vehicle_id = vehicle_id.into();
        if vehicle_id.is_blank() {
            return Err(PositionError::MissingVehicleId);
        }
        let route_id = route_id.into();
        if route_id.is_blank() {
            return Err(PositionError::MissingRouteId { vehicle_id });
        }
        let location = LatLng::new(lat, lng).map_err(|source| {
            PositionError::InvalidCoordinates {
                vehicle_id: vehicle_id.clone(),
                source,
            }
        })?;
        Ok(Self {
            vehicle_id,
            route_id,
            location,
            bearing: None,
            speed_kmh: None,
            occupancy: None,
            timestamp_ms,
        })
    }

    /// Attach a bearing in degrees.
    #[must_use]
    pub fn with_bearing(mut self, bearing: f64) -> Self {
        self.bearing = Some(bearing);
        self
    }

    /// Attach a speed in km/h.
    #[must_use]
    pub fn with_speed_kmh(mut self, speed_kmh: f64) -> Self {
        self.speed_kmh = Some(speed_kmh);
        self
    }

    /// Attach an occupancy level.
    #[must_use]
    pub fn with_occupancy(mut self, occupancy: Occupancy) -> Self {
        self.occupancy = Some(occupancy);
        self
    }

    /// Re-check every field.
    ///
    /// Positions built through public fields can bypass [`VehiclePosition::new`],
    /// so the store calls this before accepting an update.
    pub fn validate(&self) -> Result<(), PositionError> {
        if self.vehicle_id.is_blank() {
            return Err(PositionError::MissingVehicleId);
        }
        if self.route_id.is_blank() {
            return Err(PositionError::MissingRouteId {
                vehicle_id: self.vehicle_id.clone(),
            });
        }
        LatLng::new(self.location.lat(), self.location.lng()).map_err(|source| {
            PositionError::InvalidCoordinates {
                vehicle_id: self.vehicle_id.clone(),
                source,
            }
        })?;
        if self.bearing.is_some_and(|b| !b.is_finite()) {
            return Err(self.motion_error("bearing"));
        }
        if self.speed_kmh.is_some_and(|s| !s.is_finite() || s < 0.0) {
            return Err(self.motion_error("speed"));
        }
        Ok(())
    }

    fn motion_error(&self, field: &'static str) -> PositionError {
        PositionError::InvalidMotion {
            vehicle_id: self.vehicle_id.clone(),
            field,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(90.0, 180.0)]
    #[case(-90.0, -180.0)]
    #[case(0.0, 0.0)]
    fn accepts_boundary_coordinates(#[case] lat: f64, #[case] lng: f64) {
        assert!(LatLng::new(lat, lng).is_ok());
    }

    #[rstest]
    #[case(f64::NAN, 0.0, CoordinateError::NonFiniteLatitude)]
    #[case(0.0, f64::NAN, CoordinateError::NonFiniteLongitude)]
    #[case(f64::INFINITY, 0.0, CoordinateError::NonFiniteLatitude)]
    #[case(90.5, 0.0, CoordinateError::LatitudeOutOfRange(90.5))]
    #[case(0.0, -180.5, CoordinateError::LongitudeOutOfRange(-180.5))]
    fn rejects_bad_coordinates(
        #[case] lat: f64,
        #[case] lng: f64,
        #[case] expected: CoordinateError,
    ) {
        let err = LatLng::new(lat, lng).expect_err("coordinate should be rejected");
        assert_eq!(err, expected);
    }

    #[rstest]
    fn rejects_missing_route() {
        let err = VehiclePosition::new("V1", " ", 0.0, 0.0, 1).expect_err("blank route");
        assert!(matches!(err, PositionError::MissingRouteId { .. }));
    }

    #[rstest]
    fn validate_catches_tampered_fields() {
        let mut position = VehiclePosition::new("V1", "R1", 0.0, 0.0, 1).expect("valid position");
        position.speed_kmh = Some(-3.0);
        let err = position.validate().expect_err("negative speed");
        assert!(matches!(
            err,
            PositionError::InvalidMotion { field: "speed", .. }
        ));
    }

    #[rstest]
    fn telemetry_builders_attach_fields() {
        let position = VehiclePosition::new("V1", "R1", 0.0, 0.0, 1)
            .expect("valid position")
            .with_bearing(90.0)
            .with_speed_kmh(32.5)
            .with_occupancy(Occupancy::High);
        assert!(position.validate().is_ok());
        assert_eq!(position.occupancy, Some(Occupancy::High));
    }
}
