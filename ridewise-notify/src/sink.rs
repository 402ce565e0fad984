//! Delivery seam between the scheduler and a push transport.

use log::info;
use thiserror::Error;

use crate::ScheduledNotification;

/// Error returned by a [`NotificationSink`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("notification delivery failed: {0}")]
pub struct DeliveryError(pub String);

/// Receives notifications once they are due.
///
/// Implementations wrap the push transport; the scheduler only decides when
/// to fire and what to attach.
pub trait NotificationSink: Send + Sync {
    /// Deliver one notification.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError`] when the transport rejects the message.
    fn deliver(&self, notification: &ScheduledNotification) -> Result<(), DeliveryError>;
}

impl<T: NotificationSink + ?Sized> NotificationSink for std::sync::Arc<T> {
    fn deliver(&self, notification: &ScheduledNotification) -> Result<(), DeliveryError> {
        (**self).deliver(notification)
    }
}

/// Sink that writes each notification to the log.
///
/// Stands in for a push transport when none is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn deliver(&self, notification: &ScheduledNotification) -> Result<(), DeliveryError> {
        info!(
            "notification {} (#{}): {}",
            notification.key, notification.id, notification.payload.title
        );
        Ok(())
    }
}

/// Sink that records every delivery in memory.
#[cfg(any(test, feature = "test-support"))]
#[derive(Debug, Default)]
pub struct RecordingSink {
    delivered: std::sync::Mutex<Vec<ScheduledNotification>>,
}

#[cfg(any(test, feature = "test-support"))]
impl RecordingSink {
    /// Notifications delivered so far, in delivery order.
    pub fn delivered(&self) -> Vec<ScheduledNotification> {
        self.delivered
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[cfg(any(test, feature = "test-support"))]
impl NotificationSink for RecordingSink {
    fn deliver(&self, notification: &ScheduledNotification) -> Result<(), DeliveryError> {
        self.delivered
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(notification.clone());
        Ok(())
    }
}
