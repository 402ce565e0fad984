//! Arrival and delay notification scheduling.
//!
//! Each [`NotificationKey`] moves through a small state machine:
//! unscheduled, scheduled, and fired. Scheduling a key that is already live
//! replaces the old instance, so a stale timer can never coexist with a new
//! one. Firing is driven by [`NotificationScheduler::take_due`], which
//! removes due entries in one critical section: a concurrent cancel either
//! happens before (nothing fires) or after (the delivered instance is gone
//! and a rescheduled one is unaffected).

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, warn};
use ridewise_core::{Clock, StopId, SystemClock, TimestampMs, TripId};

use crate::{NotificationId, NotificationKey, NotificationPayload, NotificationSink, ScheduledNotification};

const MS_PER_MINUTE: u64 = 60_000;

/// Result of a scheduling call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// The key was unscheduled and is now armed.
    Scheduled {
        /// New instance id.
        id: NotificationId,
    },
    /// A live instance was cancelled and replaced.
    Replaced {
        /// New instance id.
        id: NotificationId,
        /// Cancelled instance id.
        previous: NotificationId,
    },
    /// The fire time was not in the future; nothing was armed.
    InPast {
        /// Requested fire time.
        fire_at_ms: TimestampMs,
        /// Clock reading at the call.
        now_ms: TimestampMs,
    },
}

impl ScheduleOutcome {
    /// Instance id of the armed notification, if any.
    pub const fn id(self) -> Option<NotificationId> {
        match self {
            Self::Scheduled { id } | Self::Replaced { id, .. } => Some(id),
            Self::InPast { .. } => None,
        }
    }

    /// Report whether a notification is now armed.
    pub const fn is_armed(self) -> bool {
        self.id().is_some()
    }
}

/// Counters produced by [`NotificationScheduler::dispatch_due`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Notifications the sink accepted.
    pub delivered: usize,
    /// Notifications the sink rejected.
    pub failed: usize,
}

#[derive(Debug, Default)]
struct SchedulerState {
    entries: HashMap<NotificationKey, ScheduledNotification>,
    next_id: NotificationId,
}

impl SchedulerState {
    fn arm(
        &mut self,
        key: NotificationKey,
        fire_at_ms: TimestampMs,
        payload: NotificationPayload,
    ) -> ScheduleOutcome {
        self.next_id += 1;
        let id = self.next_id;
        let notification = ScheduledNotification {
            id,
            key: key.clone(),
            fire_at_ms,
            payload,
        };
        debug!("armed notification {key} (#{id}) for {fire_at_ms}");
        match self.entries.insert(key, notification) {
            Some(previous) => ScheduleOutcome::Replaced {
                id,
                previous: previous.id,
            },
            None => ScheduleOutcome::Scheduled { id },
        }
    }
}

/// Holds fire times for trip notifications.
///
/// # Examples
///
/// ```
/// use ridewise_core::test_support::ManualClock;
/// use ridewise_notify::{NotificationPayload, NotificationScheduler};
///
/// let scheduler = NotificationScheduler::new(ManualClock::at(0));
/// let outcome = scheduler.schedule_arrival(
///     "T1".into(),
///     "S4".into(),
///     900_000,
///     5,
///     NotificationPayload::new("Bus 4", "Arriving in 5 minutes"),
/// );
/// assert!(outcome.is_armed());
/// assert_eq!(scheduler.take_due(600_000).len(), 1);
/// ```
#[derive(Debug)]
pub struct NotificationScheduler<C = SystemClock> {
    clock: C,
    state: Mutex<SchedulerState>,
}

impl Default for NotificationScheduler {
    fn default() -> Self {
        Self::new(SystemClock)
    }
}

impl<C: Clock> NotificationScheduler<C> {
    /// Scheduler reading the current time from `clock`.
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            state: Mutex::new(SchedulerState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Arm `key` to fire at `fire_at_ms`.
    ///
    /// A fire time at or before now is a no-op and leaves any live instance
    /// untouched. A live instance of the same key is replaced.
    pub fn schedule(
        &self,
        key: NotificationKey,
        fire_at_ms: TimestampMs,
        payload: NotificationPayload,
    ) -> ScheduleOutcome {
        let now_ms = self.clock.now_ms();
        if fire_at_ms <= now_ms {
            debug!("not scheduling {key}: fire time {fire_at_ms} is not after {now_ms}");
            return ScheduleOutcome::InPast { fire_at_ms, now_ms };
        }
        self.state().arm(key, fire_at_ms, payload)
    }

    /// Arm an arrival reminder `minutes_before` the scheduled stop time.
    pub fn schedule_arrival(
        &self,
        trip_id: TripId,
        stop_id: StopId,
        scheduled_time_ms: TimestampMs,
        minutes_before: u32,
        payload: NotificationPayload,
    ) -> ScheduleOutcome {
        let lead_ms = u64::from(minutes_before) * MS_PER_MINUTE;
        self.schedule(
            NotificationKey::arrival(trip_id, stop_id, minutes_before),
            scheduled_time_ms.saturating_sub(lead_ms),
            payload,
        )
    }

    /// Arm a delay alert to fire immediately.
    ///
    /// The alert is due at the current time and goes out on the next
    /// dispatch.
    pub fn schedule_delay(
        &self,
        trip_id: TripId,
        stop_id: StopId,
        payload: NotificationPayload,
    ) -> ScheduleOutcome {
        let now_ms = self.clock.now_ms();
        self.state()
            .arm(NotificationKey::delay(trip_id, stop_id), now_ms, payload)
    }

    /// Move a live key to a new fire time, keeping its payload.
    ///
    /// Cancels the current instance and schedules a new one, so a fire
    /// time in the past leaves the key unscheduled. Returns `None` when the
    /// key is not live.
    pub fn reschedule(&self, key: &NotificationKey, fire_at_ms: TimestampMs) -> Option<ScheduleOutcome> {
        let now_ms = self.clock.now_ms();
        let mut state = self.state();
        let previous = state.entries.remove(key)?;
        if fire_at_ms <= now_ms {
            debug!("cancelled {key}: rescheduled fire time {fire_at_ms} is not after {now_ms}");
            return Some(ScheduleOutcome::InPast { fire_at_ms, now_ms });
        }
        let outcome = state.arm(key.clone(), fire_at_ms, previous.payload);
        Some(match outcome {
            ScheduleOutcome::Scheduled { id } => ScheduleOutcome::Replaced {
                id,
                previous: previous.id,
            },
            other => other,
        })
    }

    /// Cancel a live key; returns `false` when it was not scheduled.
    pub fn cancel(&self, key: &NotificationKey) -> bool {
        let removed = self.state().entries.remove(key).is_some();
        if removed {
            debug!("cancelled notification {key}");
        }
        removed
    }

    /// Cancel every live key for `trip_id`, returning how many were removed.
    pub fn cancel_all_for_trip(&self, trip_id: &TripId) -> usize {
        let mut state = self.state();
        let before = state.entries.len();
        state.entries.retain(|key, _| &key.trip_id != trip_id);
        let removed = before - state.entries.len();
        debug!("cancelled {removed} notification(s) for trip {trip_id}");
        removed
    }

    /// Remove and return every entry due at `now_ms`, earliest first.
    ///
    /// Returned entries are fired; scheduling the same key again starts a
    /// fresh instance.
    pub fn take_due(&self, now_ms: TimestampMs) -> Vec<ScheduledNotification> {
        let mut due: Vec<ScheduledNotification> = self
            .state()
            .entries
            .extract_if(|_, notification| notification.fire_at_ms <= now_ms)
            .map(|(_, notification)| notification)
            .collect();
        due.sort_by_key(|notification| (notification.fire_at_ms, notification.id));
        due
    }

    /// Deliver every due entry to `sink`.
    ///
    /// Delivery happens outside the scheduler lock. A failed delivery is
    /// logged and not retried.
    pub fn dispatch_due<S>(&self, sink: &S) -> DispatchReport
    where
        S: NotificationSink + ?Sized,
    {
        let mut report = DispatchReport::default();
        for notification in self.take_due(self.clock.now_ms()) {
            match sink.deliver(&notification) {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    report.failed += 1;
                    warn!("notification {} (#{}): {err}", notification.key, notification.id);
                }
            }
        }
        report
    }

    /// Live entries for `trip_id`, earliest first.
    pub fn pending_for_trip(&self, trip_id: &TripId) -> Vec<ScheduledNotification> {
        let mut pending: Vec<ScheduledNotification> = self
            .state()
            .entries
            .values()
            .filter(|notification| &notification.key.trip_id == trip_id)
            .cloned()
            .collect();
        pending.sort_by_key(|notification| (notification.fire_at_ms, notification.id));
        pending
    }

    /// Live entry for `key`.
    pub fn get(&self, key: &NotificationKey) -> Option<ScheduledNotification> {
        self.state().entries.get(key).cloned()
    }

    /// Earliest pending fire time.
    pub fn next_fire_at(&self) -> Option<TimestampMs> {
        self.state()
            .entries
            .values()
            .map(|notification| notification.fire_at_ms)
            .min()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    /// Report whether nothing is scheduled.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
