//! Port traits

use pomo_api::Phase;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Errors from port operations
#[derive(Debug, Error)]
pub enum PortError {
    #[error("Port unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type PortResult<T> = Result<T, PortError>;

/// Ongoing status surface (notification, widget, status line).
///
/// Calls are made on the engine's task right after the matching state
/// change. Errors are logged by the caller and otherwise ignored.
pub trait LiveStatusPort: Send + Sync {
    /// A phase began running
    fn on_phase_start(&self, phase: Phase, total_secs: u64) -> PortResult<()>;

    /// Countdown refresh; `is_running` is false while paused
    fn on_tick(
        &self,
        phase: Phase,
        remaining_secs: u64,
        progress: f64,
        is_running: bool,
    ) -> PortResult<()>;

    /// The phase ended (completed, skipped, reset, or shut down)
    fn on_phase_end(&self) -> PortResult<()>;
}

/// Kinds of short feedback pulse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackKind {
    PhaseStarted,
    PhaseCompleted,
    Paused,
    Resumed,
}

/// Haptic or audible feedback
pub trait FeedbackPort: Send + Sync {
    fn pulse(&self, kind: FeedbackKind) -> PortResult<()>;
}

/// The side-effect sinks handed to the engine at construction
#[derive(Clone)]
pub struct Ports {
    pub live: Arc<dyn LiveStatusPort>,
    pub feedback: Arc<dyn FeedbackPort>,
}

impl Ports {
    pub fn new(live: Arc<dyn LiveStatusPort>, feedback: Arc<dyn FeedbackPort>) -> Self {
        Self { live, feedback }
    }

    /// Use one value for both sinks
    pub fn shared<P>(port: Arc<P>) -> Self
    where
        P: LiveStatusPort + FeedbackPort + 'static,
    {
        Self {
            live: port.clone(),
            feedback: port,
        }
    }

    /// Ports that accept everything and do nothing
    pub fn noop() -> Self {
        Self::shared(Arc::new(NoopPorts))
    }
}

impl Default for Ports {
    fn default() -> Self {
        Self::noop()
    }
}

impl std::fmt::Debug for Ports {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ports").finish_non_exhaustive()
    }
}

/// Port implementation that discards every call
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPorts;

impl LiveStatusPort for NoopPorts {
    fn on_phase_start(&self, _phase: Phase, _total_secs: u64) -> PortResult<()> {
        Ok(())
    }

    fn on_tick(
        &self,
        _phase: Phase,
        _remaining_secs: u64,
        _progress: f64,
        _is_running: bool,
    ) -> PortResult<()> {
        Ok(())
    }

    fn on_phase_end(&self) -> PortResult<()> {
        Ok(())
    }
}

impl FeedbackPort for NoopPorts {
    fn pulse(&self, _kind: FeedbackKind) -> PortResult<()> {
        Ok(())
    }
}
