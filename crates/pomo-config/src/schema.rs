//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    #[serde(default = "default_config_version")]
    pub config_version: u32,

    #[serde(default)]
    pub service: RawServiceConfig,

    #[serde(default)]
    pub timer: RawTimerConfig,
}

fn default_config_version() -> u32 {
    crate::CURRENT_CONFIG_VERSION
}

/// Service-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawServiceConfig {
    /// User whose sessions are stored
    pub user: Option<String>,

    /// Data directory for the session store
    pub data_dir: Option<PathBuf>,

    /// Tick period in milliseconds
    pub tick_interval_ms: Option<u64>,
}

/// Timer settings. Durations are signed so that nonsense values parse and
/// can be defaulted rather than rejected.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawTimerConfig {
    pub focus_minutes: Option<i64>,
    pub short_break_minutes: Option<i64>,
    pub long_break_minutes: Option<i64>,

    /// Focus sessions per long break
    pub long_break_interval: Option<i64>,

    #[serde(default)]
    pub auto_start_break: bool,

    #[serde(default)]
    pub auto_start_next_focus: bool,
}
