//! Query cache configuration.
//!
//! Controls capacity and the default fetch policy via the `[cache]` table.

use std::{num::NonZeroUsize, time::Duration};

use serde::Deserialize;

const DEFAULT_MAX_ENTRIES: usize = 256;
const DEFAULT_RETRY: u32 = 1;
const DEFAULT_RETRY_DELAY_MS: u64 = 1000;
const DEFAULT_DASHBOARD_REFRESH_SECONDS: u64 = 30;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Unobserved entries beyond this count are evicted least-recently-used.
    pub max_entries: usize,
    /// Automatic retries for retryable fetch failures.
    pub retry: u32,
    /// Pause between a failed attempt and its retry.
    pub retry_delay_ms: u64,
    /// Whether observed queries refetch on window refocus unless a query opts out.
    pub refetch_on_focus: bool,
    /// Polling cadence of the admin dashboard counters.
    pub dashboard_refresh_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            retry: DEFAULT_RETRY,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            refetch_on_focus: true,
            dashboard_refresh_seconds: DEFAULT_DASHBOARD_REFRESH_SECONDS,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            max_entries: settings.max_entries.get(),
            retry: settings.retry,
            retry_delay_ms: settings.retry_delay.as_millis() as u64,
            refetch_on_focus: settings.refetch_on_focus,
            dashboard_refresh_seconds: settings.dashboard_refresh.as_secs(),
        }
    }
}

impl CacheConfig {
    /// Returns the entry limit as NonZeroUsize, clamping to 1 if zero.
    pub fn max_entries_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.max_entries).unwrap_or(NonZeroUsize::MIN)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Dashboard polling interval; never shorter than one second.
    pub fn dashboard_refresh(&self) -> Duration {
        Duration::from_secs(self.dashboard_refresh_seconds.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert_eq!(config.max_entries, 256);
        assert_eq!(config.retry, 1);
        assert_eq!(config.retry_delay(), Duration::from_secs(1));
        assert!(config.refetch_on_focus);
        assert_eq!(config.dashboard_refresh(), Duration::from_secs(30));
    }

    #[test]
    fn non_zero_clamps_to_min() {
        let config = CacheConfig {
            max_entries: 0,
            ..Default::default()
        };
        assert_eq!(config.max_entries_non_zero().get(), 1);
    }

    #[test]
    fn dashboard_refresh_never_spins() {
        let config = CacheConfig {
            dashboard_refresh_seconds: 0,
            ..Default::default()
        };
        assert_eq!(config.dashboard_refresh(), Duration::from_secs(1));
    }
}
