//! Command results returned by the engine

/// Result of a timer command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Applied,
    Ignored(IgnoredReason),
}

impl CommandOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, CommandOutcome::Applied)
    }
}

/// Why a command was a no-op
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoredReason {
    /// Nothing is in progress
    Idle,
    /// A phase is already in progress and no phase was named
    AlreadyActive,
    AlreadyRunning,
    AlreadyPaused,
}

impl std::fmt::Display for IgnoredReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            IgnoredReason::Idle => "timer is idle",
            IgnoredReason::AlreadyActive => "a phase is already in progress",
            IgnoredReason::AlreadyRunning => "timer is already running",
            IgnoredReason::AlreadyPaused => "timer is already paused",
        })
    }
}
