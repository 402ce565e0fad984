//! Trip notification scheduling for ridewise.
//!
//! [`NotificationScheduler`] computes absolute fire times for arrival and
//! delay alerts and guarantees at most one live entry per
//! [`NotificationKey`]. Delivery goes through a [`NotificationSink`]; the push
//! transport behind it lives outside the engine.

mod key;
mod scheduler;
mod sink;

pub use key::{
    NotificationId, NotificationKey, NotificationKind, NotificationPayload, ScheduledNotification,
};
pub use scheduler::{DispatchReport, NotificationScheduler, ScheduleOutcome};
#[cfg(any(test, feature = "test-support"))]
pub use sink::RecordingSink;
pub use sink::{DeliveryError, LogSink, NotificationSink};
