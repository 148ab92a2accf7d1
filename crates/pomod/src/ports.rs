//! Terminal side-effect ports

use pomo_api::Phase;
use pomo_ports::{FeedbackKind, FeedbackPort, LiveStatusPort, PortResult};
use pomo_util::format_countdown;
use std::io::Write;
use tracing::{debug, info};

/// Live status through the log, feedback through the terminal bell
pub struct TerminalPorts {
    bell: bool,
}

impl TerminalPorts {
    pub fn new(bell: bool) -> Self {
        Self { bell }
    }
}

impl LiveStatusPort for TerminalPorts {
    fn on_phase_start(&self, phase: Phase, total_secs: u64) -> PortResult<()> {
        info!(
            phase = ?phase,
            total = %format_countdown(total_secs),
            "Live status started"
        );
        Ok(())
    }

    fn on_tick(
        &self,
        phase: Phase,
        remaining_secs: u64,
        progress: f64,
        is_running: bool,
    ) -> PortResult<()> {
        debug!(
            phase = ?phase,
            remaining = %format_countdown(remaining_secs),
            progress = %format!("{:.0}%", progress * 100.0),
            is_running,
            "Live status"
        );
        Ok(())
    }

    fn on_phase_end(&self) -> PortResult<()> {
        info!("Live status ended");
        Ok(())
    }
}

impl FeedbackPort for TerminalPorts {
    fn pulse(&self, kind: FeedbackKind) -> PortResult<()> {
        debug!(kind = ?kind, "Feedback pulse");
        if self.bell && kind == FeedbackKind::PhaseCompleted {
            let mut stderr = std::io::stderr();
            stderr.write_all(b"\x07")?;
            stderr.flush()?;
        }
        Ok(())
    }
}
