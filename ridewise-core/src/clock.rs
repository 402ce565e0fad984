//! Wall-clock abstraction so time-dependent components can be tested.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::TimestampMs;

/// Source of the current time in epoch milliseconds.
pub trait Clock: Send + Sync {
    /// Current time.
    fn now_ms(&self) -> TimestampMs;
}

/// Clock backed by [`SystemTime`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> TimestampMs {
        // A clock set before 1970 reads as the epoch.
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| {
                TimestampMs::try_from(elapsed.as_millis()).unwrap_or(TimestampMs::MAX)
            })
    }
}

impl<T: Clock + ?Sized> Clock for std::sync::Arc<T> {
    fn now_ms(&self) -> TimestampMs {
        (**self).now_ms()
    }
}
