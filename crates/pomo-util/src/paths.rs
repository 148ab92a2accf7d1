//! Default paths for pomod components
//!
//! Paths are user-writable:
//! - Config: `$XDG_CONFIG_HOME/pomo/config.toml` or `~/.config/pomo/config.toml`
//! - Data: `$XDG_DATA_HOME/pomo` or `~/.local/share/pomo`

use std::path::PathBuf;

/// Environment variable for overriding the config file
pub const POMO_CONFIG_ENV: &str = "POMO_CONFIG";

/// Environment variable for overriding the data directory
pub const POMO_DATA_DIR_ENV: &str = "POMO_DATA_DIR";

/// Application subdirectory name
const APP_DIR: &str = "pomo";

const CONFIG_FILENAME: &str = "config.toml";

/// SQLite database filename within the data directory
pub const DATABASE_FILENAME: &str = "pomo.db";

/// Get the default config file path.
///
/// Order of precedence:
/// 1. `$XDG_CONFIG_HOME/pomo/config.toml`
/// 2. `~/.config/pomo/config.toml`
/// 3. `/tmp/pomo/config.toml`
pub fn default_config_path() -> PathBuf {
    if let Ok(config_home) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(config_home).join(APP_DIR).join(CONFIG_FILENAME);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join(APP_DIR)
            .join(CONFIG_FILENAME);
    }

    PathBuf::from("/tmp").join(APP_DIR).join(CONFIG_FILENAME)
}

/// Get the default data directory.
///
/// Order of precedence:
/// 1. `$POMO_DATA_DIR`
/// 2. `$XDG_DATA_HOME/pomo`
/// 3. `~/.local/share/pomo`
pub fn default_data_dir() -> PathBuf {
    if let Ok(path) = std::env::var(POMO_DATA_DIR_ENV) {
        return PathBuf::from(path);
    }

    data_dir_without_env()
}

/// Get the data directory without checking `POMO_DATA_DIR`.
pub fn data_dir_without_env() -> PathBuf {
    if let Ok(data_home) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(data_home).join(APP_DIR);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".local")
            .join("share")
            .join(APP_DIR);
    }

    PathBuf::from("/tmp").join(APP_DIR).join("data")
}
