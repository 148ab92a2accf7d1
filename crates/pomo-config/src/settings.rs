//! Loaded configuration and the live settings handle

use crate::schema::{RawConfig, RawServiceConfig, RawTimerConfig};
use pomo_util::{UserId, default_data_dir};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;

/// Default tick period
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Allowed tick period range in milliseconds
pub const MIN_TICK_INTERVAL_MS: u64 = 100;
pub const MAX_TICK_INTERVAL_MS: u64 = 5000;

/// Loaded configuration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub service: ServiceConfig,
    pub timer: TimerSettings,
}

impl Config {
    pub fn from_raw(raw: RawConfig) -> Self {
        Self {
            service: ServiceConfig::from_raw(raw.service),
            timer: TimerSettings::from_raw(raw.timer),
        }
    }
}

/// Service-level configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub user: UserId,
    pub data_dir: PathBuf,
    pub tick_interval: Duration,
}

impl ServiceConfig {
    fn from_raw(raw: RawServiceConfig) -> Self {
        let tick_interval = raw
            .tick_interval_ms
            .map(|ms| Duration::from_millis(ms.clamp(MIN_TICK_INTERVAL_MS, MAX_TICK_INTERVAL_MS)))
            .unwrap_or(DEFAULT_TICK_INTERVAL);

        Self {
            user: raw.user.map(UserId::new).unwrap_or_default(),
            data_dir: raw.data_dir.unwrap_or_else(default_data_dir),
            tick_interval,
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::from_raw(RawServiceConfig::default())
    }
}

/// User timer settings.
///
/// Phase lengths are kept exactly as configured. Defaulting and clamping
/// happen at the point a phase length is resolved, so a nonsense value here
/// never reaches the timer unchecked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimerSettings {
    pub focus_minutes: Option<i64>,
    pub short_break_minutes: Option<i64>,
    pub long_break_minutes: Option<i64>,
    pub long_break_interval: Option<i64>,
    pub auto_start_break: bool,
    pub auto_start_next_focus: bool,
}

impl TimerSettings {
    pub fn from_raw(raw: RawTimerConfig) -> Self {
        Self {
            focus_minutes: raw.focus_minutes,
            short_break_minutes: raw.short_break_minutes,
            long_break_minutes: raw.long_break_minutes,
            long_break_interval: raw.long_break_interval,
            auto_start_break: raw.auto_start_break,
            auto_start_next_focus: raw.auto_start_next_focus,
        }
    }
}

/// Shared, observable view of the current timer settings.
///
/// Readers take a snapshot whenever they need one; writers replace the whole
/// value. Cloning the handle shares the same underlying settings.
#[derive(Debug, Clone)]
pub struct SettingsHandle {
    tx: watch::Sender<TimerSettings>,
}

impl SettingsHandle {
    pub fn new(initial: TimerSettings) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Current settings
    pub fn snapshot(&self) -> TimerSettings {
        self.tx.borrow().clone()
    }

    /// Replace the settings and notify subscribers
    pub fn replace(&self, settings: TimerSettings) {
        tracing::debug!(?settings, "Timer settings replaced");
        self.tx.send_replace(settings);
    }

    /// Receiver that wakes on every replacement
    pub fn subscribe(&self) -> watch::Receiver<TimerSettings> {
        self.tx.subscribe()
    }
}

impl Default for SettingsHandle {
    fn default() -> Self {
        Self::new(TimerSettings::default())
    }
}
