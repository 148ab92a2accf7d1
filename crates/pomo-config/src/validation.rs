//! Configuration validation
//!
//! Nothing here rejects a config. Values outside the supported ranges are
//! reported so the user can fix them; the timer clamps or defaults them.

use crate::schema::RawConfig;
use crate::settings::{MAX_TICK_INTERVAL_MS, MIN_TICK_INTERVAL_MS};
use thiserror::Error;

/// Supported phase lengths in minutes, inclusive
pub const FOCUS_MINUTES_RANGE: (i64, i64) = (15, 60);
pub const SHORT_BREAK_MINUTES_RANGE: (i64, i64) = (1, 15);
pub const LONG_BREAK_MINUTES_RANGE: (i64, i64) = (10, 30);

/// Supported focus sessions per long break, inclusive
pub const LONG_BREAK_INTERVAL_RANGE: (i64, i64) = (2, 8);

/// Validation warning
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationWarning {
    #[error("{field} = {value} is not positive; the default will be used")]
    NonPositive { field: &'static str, value: i64 },

    #[error("{field} = {value} is outside {min}..={max}; it will be clamped")]
    OutOfRange {
        field: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },

    #[error("tick_interval_ms = {0} is outside 100..=5000; it will be clamped")]
    TickInterval(u64),

    #[error("service.user is empty")]
    EmptyUser,
}

/// Validate a raw configuration
pub fn validate_config(config: &RawConfig) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();
    let timer = &config.timer;

    check_range(
        &mut warnings,
        "focus_minutes",
        timer.focus_minutes,
        FOCUS_MINUTES_RANGE,
    );
    check_range(
        &mut warnings,
        "short_break_minutes",
        timer.short_break_minutes,
        SHORT_BREAK_MINUTES_RANGE,
    );
    check_range(
        &mut warnings,
        "long_break_minutes",
        timer.long_break_minutes,
        LONG_BREAK_MINUTES_RANGE,
    );
    check_range(
        &mut warnings,
        "long_break_interval",
        timer.long_break_interval,
        LONG_BREAK_INTERVAL_RANGE,
    );

    if let Some(ms) = config.service.tick_interval_ms {
        if !(MIN_TICK_INTERVAL_MS..=MAX_TICK_INTERVAL_MS).contains(&ms) {
            warnings.push(ValidationWarning::TickInterval(ms));
        }
    }

    if config
        .service
        .user
        .as_deref()
        .is_some_and(|u| u.trim().is_empty())
    {
        warnings.push(ValidationWarning::EmptyUser);
    }

    warnings
}

fn check_range(
    warnings: &mut Vec<ValidationWarning>,
    field: &'static str,
    value: Option<i64>,
    (min, max): (i64, i64),
) {
    let Some(value) = value else {
        return;
    };

    if value <= 0 {
        warnings.push(ValidationWarning::NonPositive { field, value });
    } else if value < min || value > max {
        warnings.push(ValidationWarning::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
}
