//! Engine configuration.

use std::time::Duration;

use ridewise_scorer::{PeakHourError, PeakHourTable};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tunables for an [`Engine`](crate::Engine).
///
/// Every field has a default, so a partial document deserialises.
///
/// # Examples
///
/// ```
/// use ridewise_service::EngineConfig;
///
/// let config: EngineConfig = serde_json::from_str(r#"{"cacheTtlMs": 60000}"#).unwrap();
/// assert_eq!(config.cache_ttl_ms, 60_000);
/// assert_eq!(config.stale_after_ms, 120_000);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Vehicles silent for longer than this are evicted.
    pub stale_after_ms: u64,
    /// Period of the stale-vehicle sweep.
    pub eviction_interval_ms: u64,
    /// Lifetime of a cached recommendation.
    pub cache_ttl_ms: u64,
    /// Period of the expired-cache sweep.
    pub cache_reap_interval_ms: u64,
    /// Period of the notification dispatcher.
    pub dispatch_interval_ms: u64,
    /// Time budget for a single predictor call.
    pub predictor_budget_ms: u64,
    /// Routes returned as primary; the rest are alternatives.
    pub max_primary_routes: usize,
    /// Offset of local time from UTC, used for peak hours.
    pub utc_offset_minutes: i32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stale_after_ms: 120_000,
            eviction_interval_ms: 15_000,
            cache_ttl_ms: 300_000,
            cache_reap_interval_ms: 60_000,
            dispatch_interval_ms: 1_000,
            predictor_budget_ms: 250,
            max_primary_routes: 1,
            utc_offset_minutes: 0,
        }
    }
}

/// Errors returned by [`EngineConfig::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A duration, interval or count was zero.
    #[error("{field} must be greater than zero")]
    Zero {
        /// Offending field.
        field: &'static str,
    },
    /// The UTC offset was out of range.
    #[error(transparent)]
    UtcOffset(#[from] PeakHourError),
}

impl EngineConfig {
    /// Check that every interval and limit is usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let non_zero = [
            ("stale_after_ms", self.stale_after_ms),
            ("eviction_interval_ms", self.eviction_interval_ms),
            ("cache_ttl_ms", self.cache_ttl_ms),
            ("cache_reap_interval_ms", self.cache_reap_interval_ms),
            ("dispatch_interval_ms", self.dispatch_interval_ms),
            ("predictor_budget_ms", self.predictor_budget_ms),
            (
                "max_primary_routes",
                u64::try_from(self.max_primary_routes).unwrap_or(u64::MAX),
            ),
        ];
        if let Some(&(field, _)) = non_zero.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Zero { field });
        }
        self.peak_hours()?;
        Ok(())
    }

    /// Peak-hour table for the configured offset.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UtcOffset`] for offsets beyond ±14 hours.
    pub fn peak_hours(&self) -> Result<PeakHourTable, ConfigError> {
        Ok(PeakHourTable::new(self.utc_offset_minutes)?)
    }

    /// Predictor budget as a [`Duration`].
    pub const fn predictor_budget(&self) -> Duration {
        Duration::from_millis(self.predictor_budget_ms)
    }

    /// Eviction period as a [`Duration`].
    pub const fn eviction_interval(&self) -> Duration {
        Duration::from_millis(self.eviction_interval_ms)
    }

    /// Cache sweep period as a [`Duration`].
    pub const fn cache_reap_interval(&self) -> Duration {
        Duration::from_millis(self.cache_reap_interval_ms)
    }

    /// Dispatch period as a [`Duration`].
    pub const fn dispatch_interval(&self) -> Duration {
        Duration::from_millis(self.dispatch_interval_ms)
    }
}
