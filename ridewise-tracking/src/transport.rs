//! Position ingestion transports.
//!
//! A [`PositionTransport`] yields wire messages from one backend. The backend
//! is chosen when the transport is constructed; [`pump`] drains any transport
//! into a [`PositionStore`].

use async_trait::async_trait;
use log::{debug, warn};
use ridewise_core::{Occupancy, PositionError, TimestampMs, VehiclePosition};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tokio::sync::mpsc;

use crate::{ApplyOutcome, PositionStore};

/// Position update as sent by vehicle clients.
///
/// Field names are camelCase on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionMessage {
    /// Reporting vehicle.
    pub vehicle_id: String,
    /// Route being served.
    pub route_id: String,
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
    /// Heading in degrees.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearing: Option<f64>,
    /// Speed in km/h.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed_kmh: Option<f64>,
    /// Passenger load.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occupancy: Option<Occupancy>,
    /// Sample time in epoch milliseconds.
    pub timestamp_ms: TimestampMs,
}

impl PositionMessage {
    /// Validate the message into a stored position.
    ///
    /// # Errors
    ///
    /// Returns [`PositionError`] for empty identifiers or bad coordinates.
    pub fn into_position(self) -> Result<VehiclePosition, PositionError> {
        let mut position =
            VehiclePosition::new(self.vehicle_id, self.route_id, self.lat, self.lng, self.timestamp_ms)?;
        position.bearing = self.bearing;
        position.speed_kmh = self.speed_kmh;
        position.occupancy = self.occupancy;
        position.validate()?;
        Ok(position)
    }
}

impl From<&VehiclePosition> for PositionMessage {
    fn from(position: &VehiclePosition) -> Self {
        Self {
            vehicle_id: position.vehicle_id.to_string(),
            route_id: position.route_id.to_string(),
            lat: position.location.lat(),
            lng: position.location.lng(),
            bearing: position.bearing,
            speed_kmh: position.speed_kmh,
            occupancy: position.occupancy,
            timestamp_ms: position.timestamp_ms,
        }
    }
}

/// Errors raised while receiving messages.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The underlying stream failed.
    #[error("transport I/O failed: {0}")]
    Io(#[from] std::io::Error),
    /// A message could not be decoded.
    #[error("line {line}: malformed position message: {source}")]
    Decode {
        /// One-based line number in the feed.
        line: usize,
        /// Decoder error.
        #[source]
        source: serde_json::Error,
    },
}

impl TransportError {
    /// Report whether receiving may continue after this error.
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Decode { .. })
    }
}

/// Source of position messages.
#[async_trait]
pub trait PositionTransport: Send {
    /// Next message, or `None` once the source is exhausted.
    async fn next_message(&mut self) -> Result<Option<PositionMessage>, TransportError>;
}

/// In-process transport fed through a bounded tokio channel.
#[derive(Debug)]
pub struct ChannelTransport {
    receiver: mpsc::Receiver<PositionMessage>,
}

impl ChannelTransport {
    /// Create a transport and the sender that feeds it.
    pub fn bounded(capacity: usize) -> (mpsc::Sender<PositionMessage>, Self) {
        let (sender, receiver) = mpsc::channel(capacity);
        (sender, Self { receiver })
    }
}

#[async_trait]
impl PositionTransport for ChannelTransport {
    async fn next_message(&mut self) -> Result<Option<PositionMessage>, TransportError> {
        Ok(self.receiver.recv().await)
    }
}

/// Newline-delimited JSON feed, one [`PositionMessage`] per line.
///
/// Blank lines are skipped.
#[derive(Debug)]
pub struct NdjsonTransport<R> {
    lines: Lines<R>,
    line: usize,
}

impl<R: AsyncBufRead + Unpin + Send> NdjsonTransport<R> {
    /// Read messages from `reader`.
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line: 0,
        }
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> PositionTransport for NdjsonTransport<R> {
    async fn next_message(&mut self) -> Result<Option<PositionMessage>, TransportError> {
        while let Some(text) = self.lines.next_line().await? {
            self.line += 1;
            let trimmed = text.trim();
            if trimmed.is_empty() {
                continue;
            }
            return serde_json::from_str(trimmed)
                .map(Some)
                .map_err(|source| TransportError::Decode {
                    line: self.line,
                    source,
                });
        }
        Ok(None)
    }
}

/// Counters produced by [`pump`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpReport {
    /// Messages read from the transport, including undecodable ones.
    pub received: usize,
    /// Updates that changed the store.
    pub applied: usize,
    /// Updates older than the stored position.
    pub out_of_order: usize,
    /// Decoded messages that failed validation.
    pub invalid: usize,
    /// Messages that could not be decoded.
    pub malformed: usize,
}

/// Drain `transport` into `store` until the source is exhausted.
///
/// Malformed and invalid messages are counted and skipped.
///
/// # Errors
///
/// Returns the first unrecoverable [`TransportError`].
pub async fn pump<T>(transport: &mut T, store: &PositionStore) -> Result<PumpReport, TransportError>
where
    T: PositionTransport + ?Sized,
{
    let mut report = PumpReport::default();
    loop {
        let message = match transport.next_message().await {
            Ok(Some(message)) => message,
            Ok(None) => break,
            Err(err) if err.is_recoverable() => {
                report.received += 1;
                report.malformed += 1;
                warn!("skipping position message: {err}");
                continue;
            }
            Err(err) => return Err(err),
        };
        report.received += 1;
        match message.into_position().and_then(|p| store.apply(p)) {
            Ok(ApplyOutcome::OutOfOrder { .. }) => report.out_of_order += 1,
            Ok(_) => report.applied += 1,
            Err(err) => {
                report.invalid += 1;
                debug!("rejected position update: {err}");
            }
        }
    }
    Ok(report)
}
