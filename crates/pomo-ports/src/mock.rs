//! Recording ports for testing

use pomo_api::Phase;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::{FeedbackKind, FeedbackPort, LiveStatusPort, PortError, PortResult, Ports};

/// One recorded port invocation
#[derive(Debug, Clone, PartialEq)]
pub enum PortCall {
    PhaseStart {
        phase: Phase,
        total_secs: u64,
    },
    Tick {
        phase: Phase,
        remaining_secs: u64,
        progress: f64,
        is_running: bool,
    },
    PhaseEnd,
    Pulse(FeedbackKind),
}

/// Ports that remember every call, for unit/integration testing
#[derive(Debug, Default)]
pub struct RecordingPorts {
    calls: Mutex<Vec<PortCall>>,
    fail: AtomicBool,
}

impl RecordingPorts {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Ports bundle backed by this recorder
    pub fn ports(self: &Arc<Self>) -> Ports {
        Ports::shared(self.clone())
    }

    /// Make every call fail after recording it
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<PortCall> {
        self.calls.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap_or_else(|p| p.into_inner()).clear();
    }

    /// Number of phase starts seen
    pub fn phase_starts(&self) -> usize {
        self.count(|c| matches!(c, PortCall::PhaseStart { .. }))
    }

    /// Number of phase ends seen
    pub fn phase_ends(&self) -> usize {
        self.count(|c| matches!(c, PortCall::PhaseEnd))
    }

    pub fn pulses(&self) -> Vec<FeedbackKind> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                PortCall::Pulse(kind) => Some(kind),
                _ => None,
            })
            .collect()
    }

    fn count(&self, pred: impl Fn(&PortCall) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    fn record(&self, call: PortCall) -> PortResult<()> {
        self.calls
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(call);

        if self.fail.load(Ordering::SeqCst) {
            return Err(PortError::Unavailable("Recording port failure".into()));
        }
        Ok(())
    }
}

impl LiveStatusPort for RecordingPorts {
    fn on_phase_start(&self, phase: Phase, total_secs: u64) -> PortResult<()> {
        self.record(PortCall::PhaseStart { phase, total_secs })
    }

    fn on_tick(
        &self,
        phase: Phase,
        remaining_secs: u64,
        progress: f64,
        is_running: bool,
    ) -> PortResult<()> {
        self.record(PortCall::Tick {
            phase,
            remaining_secs,
            progress,
            is_running,
        })
    }

    fn on_phase_end(&self) -> PortResult<()> {
        self.record(PortCall::PhaseEnd)
    }
}

impl FeedbackPort for RecordingPorts {
    fn pulse(&self, kind: FeedbackKind) -> PortResult<()> {
        self.record(PortCall::Pulse(kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_calls_in_order() {
        let recorder = RecordingPorts::new();
        let ports = recorder.ports();

        ports.live.on_phase_start(Phase::Focus, 1500).unwrap();
        ports.feedback.pulse(FeedbackKind::PhaseStarted).unwrap();
        ports.live.on_phase_end().unwrap();

        assert_eq!(
            recorder.calls(),
            vec![
                PortCall::PhaseStart {
                    phase: Phase::Focus,
                    total_secs: 1500
                },
                PortCall::Pulse(FeedbackKind::PhaseStarted),
                PortCall::PhaseEnd,
            ]
        );
        assert_eq!(recorder.phase_starts(), 1);
        assert_eq!(recorder.phase_ends(), 1);
    }

    #[test]
    fn test_failing_ports_still_record() {
        let recorder = RecordingPorts::new();
        recorder.set_fail(true);

        assert!(recorder.on_phase_end().is_err());
        assert_eq!(recorder.calls(), vec![PortCall::PhaseEnd]);
    }
}
