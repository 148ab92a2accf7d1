//! Shared types for the timer API

use chrono::{DateTime, Utc};
use pomo_util::{SessionId, TaskId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// One kind of timed interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Focus,
    ShortBreak,
    LongBreak,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::Focus, Phase::ShortBreak, Phase::LongBreak];

    pub fn is_break(&self) -> bool {
        !matches!(self, Phase::Focus)
    }

    /// Stable storage key
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Focus => "focus",
            Phase::ShortBreak => "short_break",
            Phase::LongBreak => "long_break",
        }
    }

    /// Human-facing label
    pub fn label(&self) -> &'static str {
        match self {
            Phase::Focus => "Focus",
            Phase::ShortBreak => "Short Break",
            Phase::LongBreak => "Long Break",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown phase: {0}")]
pub struct UnknownPhase(pub String);

impl FromStr for Phase {
    type Err = UnknownPhase;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "focus" | "work" | "pomodoro" => Ok(Phase::Focus),
            "short_break" | "short-break" | "short" | "break" => Ok(Phase::ShortBreak),
            "long_break" | "long-break" | "long" => Ok(Phase::LongBreak),
            other => Err(UnknownPhase(other.to_string())),
        }
    }
}

/// Durable representation of one phase instance.
///
/// Records are replaced rather than mutated: the `touched`/`finalized`
/// helpers consume the record and return its successor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: SessionId,
    pub phase: Phase,
    pub start_time: DateTime<Utc>,
    /// Absent while in progress
    pub end_time: Option<DateTime<Utc>>,
    /// Resolved once at creation; later settings changes never alter it
    pub duration_minutes: u32,
    pub completed: bool,
    pub linked_task_id: Option<TaskId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Create a fresh in-progress record
    pub fn begin(
        phase: Phase,
        duration_minutes: u32,
        linked_task_id: Option<TaskId>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: SessionId::new(),
            phase,
            start_time: now,
            end_time: None,
            duration_minutes,
            completed: false,
            linked_task_id,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn total_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.duration_minutes) * 60)
    }

    pub fn is_in_progress(&self) -> bool {
        !self.completed && self.end_time.is_none()
    }

    /// Successor with a refreshed `updated_at`
    pub fn touched(self, now: DateTime<Utc>) -> Self {
        Self {
            updated_at: now,
            ..self
        }
    }

    /// Successor marked completed at `end_time`
    pub fn finalized(self, end_time: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            end_time: Some(end_time),
            completed: true,
            updated_at: now,
            ..self
        }
    }
}

/// Coarse engine status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerStatus {
    Idle,
    Running,
    Paused,
}

/// Immutable view of the engine pushed to observers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerSnapshot {
    /// Phase in progress, or the phase that will start next when idle
    pub phase: Phase,
    pub status: TimerStatus,
    pub time_remaining_secs: u64,
    pub total_secs: u64,
    /// 0.0 ..= 1.0 within the current phase
    pub progress: f64,
    pub current_session: Option<SessionRecord>,
    /// Focus phases completed during this process lifetime
    pub completed_focus_count: u32,
    pub linked_task_id: Option<TaskId>,
}

impl TimerSnapshot {
    /// True while a phase is in progress, paused or not
    pub fn is_running(&self) -> bool {
        self.status != TimerStatus::Idle
    }

    pub fn is_paused(&self) -> bool {
        self.status == TimerStatus::Paused
    }
}

/// Compute progress through a phase, clamped to 0.0 ..= 1.0
pub fn progress_fraction(remaining: Duration, total: Duration) -> f64 {
    if total.is_zero() {
        return 0.0;
    }
    (1.0 - remaining.as_secs_f64() / total.as_secs_f64()).clamp(0.0, 1.0)
}
