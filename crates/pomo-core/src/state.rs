//! Engine state and per-phase elapsed accounting

use chrono::{DateTime, Utc};
use pomo_api::{Phase, SessionRecord, TimerStatus};
use pomo_util::wall_elapsed;
use std::cell::Cell;
use std::time::Duration;

/// Remaining time at or below which a running phase counts as finished
pub const COMPLETION_EPSILON: Duration = Duration::from_millis(250);

/// The phase instance currently owned by the engine
#[derive(Debug, Clone)]
pub struct ActivePhase {
    /// Record as last handed to the store
    pub record: SessionRecord,

    total: Duration,

    /// Elapsed time banked from earlier running intervals
    accumulated: Duration,

    /// Largest elapsed value ever reported; keeps the countdown from moving
    /// backwards when the wall clock does
    high_water: Cell<Duration>,
}

impl ActivePhase {
    /// Fresh phase with nothing elapsed
    pub fn new(record: SessionRecord) -> Self {
        Self::with_elapsed(record, Duration::ZERO)
    }

    /// Phase that has already run for `elapsed`, e.g. after recovery
    pub fn with_elapsed(record: SessionRecord, elapsed: Duration) -> Self {
        Self {
            total: record.total_duration(),
            record,
            accumulated: elapsed,
            high_water: Cell::new(elapsed),
        }
    }

    pub fn phase(&self) -> Phase {
        self.record.phase
    }

    pub fn total(&self) -> Duration {
        self.total
    }

    /// Elapsed time at `now`. `running_since` is the instant counting last
    /// resumed, or `None` while paused.
    pub fn elapsed(&self, running_since: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Duration {
        let live = running_since
            .map(|since| wall_elapsed(since, now))
            .unwrap_or_default();
        let elapsed = (self.accumulated + live).max(self.high_water.get());
        self.high_water.set(elapsed);
        elapsed
    }

    pub fn remaining(&self, running_since: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Duration {
        self.total.saturating_sub(self.elapsed(running_since, now))
    }

    /// Fold the running interval that started at `since` into the bank
    pub fn bank(&mut self, since: DateTime<Utc>, now: DateTime<Utc>) {
        self.accumulated = self.elapsed(Some(since), now);
    }

    /// Replace the record with one whose `updated_at` is `now`
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.record = self.record.clone().touched(now);
    }
}

/// What the engine is doing.
///
/// The completed state is transient and never stored: finishing a phase
/// moves straight to `Idle` or to `Running` for the next phase.
#[derive(Debug, Clone)]
pub enum EngineState {
    Idle {
        /// Phase a plain start will begin
        phase: Phase,
    },
    Running {
        active: ActivePhase,
        resumed_at: DateTime<Utc>,
    },
    Paused {
        active: ActivePhase,
    },
}

impl EngineState {
    pub fn phase(&self) -> Phase {
        match self {
            EngineState::Idle { phase } => *phase,
            EngineState::Running { active, .. } | EngineState::Paused { active } => active.phase(),
        }
    }

    pub fn status(&self) -> TimerStatus {
        match self {
            EngineState::Idle { .. } => TimerStatus::Idle,
            EngineState::Running { .. } => TimerStatus::Running,
            EngineState::Paused { .. } => TimerStatus::Paused,
        }
    }

    pub fn active(&self) -> Option<&ActivePhase> {
        match self {
            EngineState::Idle { .. } => None,
            EngineState::Running { active, .. } | EngineState::Paused { active } => Some(active),
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, EngineState::Idle { .. })
    }

    /// Remaining time and total of the active phase at `now`
    pub fn countdown(&self, now: DateTime<Utc>) -> Option<(Duration, Duration)> {
        match self {
            EngineState::Idle { .. } => None,
            EngineState::Running { active, resumed_at } => {
                Some((active.remaining(Some(*resumed_at), now), active.total()))
            }
            EngineState::Paused { active } => Some((active.remaining(None, now), active.total())),
        }
    }
}

/// Whole seconds left, rounded up so a countdown reaches zero only when done
pub fn remaining_secs(remaining: Duration) -> u64 {
    remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0)
}
