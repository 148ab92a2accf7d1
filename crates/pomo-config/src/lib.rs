//! Configuration parsing and validation for pomod
//!
//! Supports TOML configuration with:
//! - Versioned schema
//! - Timer settings (phase lengths, long-break interval, auto-start)
//! - Service settings (user, data directory, tick period)
//! - Validation that warns instead of failing: bad durations are clamped later

mod schema;
mod settings;
mod validation;

pub use schema::*;
pub use settings::*;
pub use validation::*;

use std::path::Path;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Unsupported config version: {0}")]
    UnsupportedVersion(u32),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Load configuration from a TOML file
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse configuration from a TOML string.
///
/// Out-of-range values are kept as written; see [`validate_config`] for the
/// warnings they produce.
pub fn parse_config(content: &str) -> ConfigResult<Config> {
    parse_config_checked(content).map(|(config, _)| config)
}

/// Load configuration and report values that will be clamped or defaulted
pub fn load_config_checked(
    path: impl AsRef<Path>,
) -> ConfigResult<(Config, Vec<ValidationWarning>)> {
    let content = std::fs::read_to_string(path)?;
    parse_config_checked(&content)
}

/// Parse configuration and report values that will be clamped or defaulted
pub fn parse_config_checked(content: &str) -> ConfigResult<(Config, Vec<ValidationWarning>)> {
    let raw: RawConfig = toml::from_str(content)?;

    if raw.config_version != CURRENT_CONFIG_VERSION {
        return Err(ConfigError::UnsupportedVersion(raw.config_version));
    }

    let warnings = validate_config(&raw);
    Ok((Config::from_raw(raw), warnings))
}

/// Current supported config version
pub const CURRENT_CONFIG_VERSION: u32 = 1;
