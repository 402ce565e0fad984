//! Notification identity and payload types.

use std::collections::BTreeMap;
use std::fmt;

use ridewise_core::{StopId, TimestampMs, TripId};
use serde::{Deserialize, Serialize};

/// What a notification tells the rider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    /// The vehicle will reach the stop soon.
    Arrival,
    /// The trip is running late.
    Delay,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Arrival => "arrival",
            Self::Delay => "delay",
        })
    }
}

/// Identity of a notification; at most one live entry exists per key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationKey {
    /// Notification kind.
    pub kind: NotificationKind,
    /// Booked trip.
    pub trip_id: TripId,
    /// Stop the alert refers to.
    pub stop_id: StopId,
    /// Lead time for arrival alerts; lets one trip carry several reminders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minutes_before: Option<u32>,
}

impl NotificationKey {
    /// Key for an arrival reminder `minutes_before` the scheduled time.
    pub fn arrival(trip_id: impl Into<TripId>, stop_id: impl Into<StopId>, minutes_before: u32) -> Self {
        Self {
            kind: NotificationKind::Arrival,
            trip_id: trip_id.into(),
            stop_id: stop_id.into(),
            minutes_before: Some(minutes_before),
        }
    }

    /// Key for a delay alert.
    pub fn delay(trip_id: impl Into<TripId>, stop_id: impl Into<StopId>) -> Self {
        Self {
            kind: NotificationKind::Delay,
            trip_id: trip_id.into(),
            stop_id: stop_id.into(),
            minutes_before: None,
        }
    }
}

impl fmt::Display for NotificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.kind, self.trip_id, self.stop_id)?;
        if let Some(minutes) = self.minutes_before {
            write!(f, ":{minutes}m")?;
        }
        Ok(())
    }
}

/// Content handed to the push transport.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    /// Short headline.
    pub title: String,
    /// Message text.
    pub body: String,
    /// Extra key/value pairs for the client.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, String>,
}

impl NotificationPayload {
    /// Payload with a title and body.
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            data: BTreeMap::new(),
        }
    }

    /// Attach a data field.
    #[must_use]
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

/// Unique id of one scheduled instance of a key.
pub type NotificationId = u64;

/// A notification armed for delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledNotification {
    /// Instance id; a reschedule produces a new id.
    pub id: NotificationId,
    /// Identity key.
    pub key: NotificationKey,
    /// Absolute fire time in epoch milliseconds.
    pub fire_at_ms: TimestampMs,
    /// Content to deliver.
    pub payload: NotificationPayload,
}
