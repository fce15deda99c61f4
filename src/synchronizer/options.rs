use std::time::Duration;

use crate::config::{WatchConfig, DEFAULT_FRESHNESS_WINDOW, DEFAULT_REFRESH_INTERVAL};

/// Per-session behaviour of the synchronizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// Fetch the comprehensive twin instead of the base one.
    pub comprehensive: bool,
    /// Poll every `refresh_interval`.
    pub auto_refresh: bool,
    pub refresh_interval: Duration,
    /// Refetch on realtime events for the active patient.
    pub enable_realtime: bool,
    /// Age after which a twin's `lastUpdated` is considered stale.
    pub freshness_window: Duration,
    /// When set, a burst of realtime events triggers one refetch once the
    /// channel has been quiet for this long. `None` refetches per event.
    pub realtime_coalesce: Option<Duration>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            comprehensive: false,
            auto_refresh: false,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            enable_realtime: true,
            freshness_window: DEFAULT_FRESHNESS_WINDOW,
            realtime_coalesce: None,
        }
    }
}

impl SyncOptions {
    pub(crate) fn polling_changed(&self, other: &Self) -> bool {
        self.auto_refresh != other.auto_refresh || self.refresh_interval != other.refresh_interval
    }

    pub(crate) fn realtime_changed(&self, other: &Self) -> bool {
        self.enable_realtime != other.enable_realtime
            || self.realtime_coalesce != other.realtime_coalesce
    }
}

impl From<&WatchConfig> for SyncOptions {
    fn from(config: &WatchConfig) -> Self {
        Self {
            comprehensive: config.comprehensive,
            auto_refresh: config.auto_refresh,
            refresh_interval: config.refresh_interval,
            enable_realtime: config.enable_realtime,
            ..Self::default()
        }
    }
}
