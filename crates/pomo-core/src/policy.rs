//! Duration and auto-start policy

use pomo_api::Phase;
use pomo_config::{
    FOCUS_MINUTES_RANGE, LONG_BREAK_MINUTES_RANGE, SHORT_BREAK_MINUTES_RANGE, TimerSettings,
};

pub const DEFAULT_FOCUS_MINUTES: u32 = 25;
pub const DEFAULT_SHORT_BREAK_MINUTES: u32 = 5;
pub const DEFAULT_LONG_BREAK_MINUTES: u32 = 15;

/// Built-in length of a phase
pub fn default_minutes(phase: Phase) -> u32 {
    match phase {
        Phase::Focus => DEFAULT_FOCUS_MINUTES,
        Phase::ShortBreak => DEFAULT_SHORT_BREAK_MINUTES,
        Phase::LongBreak => DEFAULT_LONG_BREAK_MINUTES,
    }
}

/// Resolve the length of a phase in minutes.
///
/// Absent or non-positive settings fall back to the default; anything else
/// is clamped into the supported range for that phase. Never fails.
pub fn resolve_minutes(phase: Phase, settings: &TimerSettings) -> u32 {
    let (configured, (min, max)) = match phase {
        Phase::Focus => (settings.focus_minutes, FOCUS_MINUTES_RANGE),
        Phase::ShortBreak => (settings.short_break_minutes, SHORT_BREAK_MINUTES_RANGE),
        Phase::LongBreak => (settings.long_break_minutes, LONG_BREAK_MINUTES_RANGE),
    };

    match configured {
        Some(minutes) if minutes > 0 => minutes.clamp(min, max) as u32,
        _ => default_minutes(phase),
    }
}

/// Whether finishing `completed` should start the next phase without a command
pub fn should_auto_start(completed: Phase, settings: &TimerSettings) -> bool {
    match completed {
        Phase::Focus => settings.auto_start_break,
        Phase::ShortBreak | Phase::LongBreak => settings.auto_start_next_focus,
    }
}
