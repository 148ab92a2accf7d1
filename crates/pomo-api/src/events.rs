//! Event types pushed from the engine to observers

use chrono::{DateTime, Utc};
use pomo_util::{SessionId, TaskId};
use serde::{Deserialize, Serialize};

use crate::{API_VERSION, Phase, SessionRecord, TimerSnapshot};

/// Event envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub api_version: u32,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(payload: EventPayload) -> Self {
        Self::at(payload, pomo_util::now())
    }

    /// Event stamped with an explicit time
    pub fn at(payload: EventPayload, timestamp: DateTime<Utc>) -> Self {
        Self {
            api_version: API_VERSION,
            timestamp,
            payload,
        }
    }
}

/// What happened to an interrupted session found at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryOutcome {
    /// Time remained, the phase is running again
    Resumed,
    /// Its time ran out while the process was away; stored as completed
    Finalized,
    /// Implausible or stale record, deleted
    Discarded,
}

/// All possible events from the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// Full state snapshot, sent after every mutation and every tick
    StateChanged(TimerSnapshot),

    PhaseStarted {
        session_id: SessionId,
        phase: Phase,
        total_secs: u64,
        linked_task_id: Option<TaskId>,
    },

    PhasePaused {
        session_id: SessionId,
        remaining_secs: u64,
    },

    PhaseResumed {
        session_id: SessionId,
        remaining_secs: u64,
    },

    /// A phase was finalized, either naturally or by skip
    PhaseCompleted {
        record: SessionRecord,
        next_phase: Phase,
        skipped: bool,
        auto_started: bool,
    },

    /// An in-progress record was reset away
    SessionDiscarded {
        session_id: SessionId,
        phase: Phase,
    },

    SessionRecovered {
        session_id: SessionId,
        outcome: RecoveryOutcome,
    },

    /// New settings took effect for the idle preview
    SettingsApplied {
        preview_phase: Phase,
        preview_secs: u64,
    },

    /// A background store write failed; engine state is unaffected
    PersistenceFailed {
        operation: String,
        session_id: Option<SessionId>,
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = Event::new(EventPayload::PhaseStarted {
            session_id: SessionId::new(),
            phase: Phase::Focus,
            total_secs: 1500,
            linked_task_id: None,
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"phase_started\""));

        let parsed: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.api_version, API_VERSION);
        assert!(matches!(
            parsed.payload,
            EventPayload::PhaseStarted { phase: Phase::Focus, total_secs: 1500, .. }
        ));
    }

    #[test]
    fn test_recovery_outcome_is_snake_case() {
        let json = serde_json::to_string(&RecoveryOutcome::Finalized).unwrap();
        assert_eq!(json, "\"finalized\"");
    }
}
