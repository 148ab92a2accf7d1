//! Phase sequencing

use pomo_api::Phase;
use pomo_config::{LONG_BREAK_INTERVAL_RANGE, TimerSettings};

/// Focus sessions per long break when not configured
pub const DEFAULT_LONG_BREAK_EVERY: u32 = 4;

/// Next phase under the default four-focus cycle.
///
/// `prior_focus_count` includes the focus phase that just completed.
pub fn next_phase(completed: Phase, prior_focus_count: u32) -> Phase {
    PhaseSequencer::default().next(completed, prior_focus_count)
}

/// Maps a completed phase to the one that follows it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseSequencer {
    long_break_every: u32,
}

impl PhaseSequencer {
    pub fn new(long_break_every: u32) -> Self {
        Self {
            long_break_every: long_break_every.max(1),
        }
    }

    pub fn from_settings(settings: &TimerSettings) -> Self {
        let (min, max) = LONG_BREAK_INTERVAL_RANGE;
        match settings.long_break_interval {
            Some(every) if every > 0 => Self::new(every.clamp(min, max) as u32),
            _ => Self::default(),
        }
    }

    pub fn long_break_every(&self) -> u32 {
        self.long_break_every
    }

    pub fn next(&self, completed: Phase, prior_focus_count: u32) -> Phase {
        match completed {
            Phase::Focus
                if prior_focus_count > 0 && prior_focus_count % self.long_break_every == 0 =>
            {
                Phase::LongBreak
            }
            Phase::Focus => Phase::ShortBreak,
            Phase::ShortBreak | Phase::LongBreak => Phase::Focus,
        }
    }
}

impl Default for PhaseSequencer {
    fn default() -> Self {
        Self::new(DEFAULT_LONG_BREAK_EVERY)
    }
}
