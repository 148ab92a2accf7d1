//! Session timer engine

use chrono::{DateTime, Utc};
use pomo_api::{
    Event, EventPayload, Phase, RecoveryOutcome, SessionRecord, TimerSnapshot, progress_fraction,
};
use pomo_config::TimerSettings;
use pomo_ports::{FeedbackKind, PortResult, Ports};
use pomo_util::{SessionId, TaskId, UserId, to_chrono, wall_elapsed};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::{
    ActivePhase, COMPLETION_EPSILON, CommandOutcome, EngineState, IgnoredReason,
    ObserverRegistry, PersistFailure, PersistQueue, PhaseSequencer, QuickStats, Subscription,
    TickCallback, TickSource, remaining_secs, resolve_minutes, should_auto_start,
};

/// Interrupted sessions older than this are not resumed
pub const RECOVERY_MAX_AGE: Duration = Duration::from_secs(60 * 60);

/// The session timer engine.
///
/// Every method takes the current wall-clock time and must be called from a
/// single owner; the engine does no locking of its own. Store writes are
/// queued and never awaited, and side-effect port failures are logged and
/// otherwise ignored.
pub struct SessionEngine {
    user: UserId,
    settings: TimerSettings,
    sequencer: PhaseSequencer,
    state: EngineState,
    completed_focus_count: u32,
    linked_task: Option<TaskId>,
    completed: Vec<SessionRecord>,
    skipped: HashSet<SessionId>,
    persist: PersistQueue,
    ports: Ports,
    ticker: Box<dyn TickSource>,
    on_tick: TickCallback,
    observers: ObserverRegistry,
}

impl SessionEngine {
    pub fn new(
        user: UserId,
        settings: TimerSettings,
        persist: PersistQueue,
        ports: Ports,
        ticker: Box<dyn TickSource>,
        on_tick: TickCallback,
    ) -> Self {
        info!(
            user = %user,
            focus_minutes = resolve_minutes(Phase::Focus, &settings),
            "Session engine initialized"
        );

        Self {
            user,
            sequencer: PhaseSequencer::from_settings(&settings),
            settings,
            state: EngineState::Idle {
                phase: Phase::Focus,
            },
            completed_focus_count: 0,
            linked_task: None,
            completed: Vec::new(),
            skipped: HashSet::new(),
            persist,
            ports,
            ticker,
            on_tick,
            observers: ObserverRegistry::new(),
        }
    }

    pub fn user(&self) -> &UserId {
        &self.user
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn settings(&self) -> &TimerSettings {
        &self.settings
    }

    pub fn linked_task(&self) -> Option<&TaskId> {
        self.linked_task.as_ref()
    }

    /// Register a listener for every subsequent event
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.observers.subscribe(listener)
    }

    /// Records finalized during this process lifetime, oldest first
    pub fn completed_sessions(&self) -> &[SessionRecord] {
        &self.completed
    }

    pub fn quick_stats(&self) -> QuickStats {
        QuickStats::from_records(&self.completed, &self.skipped)
    }

    /// Observable state at `now`
    pub fn snapshot(&self, now: DateTime<Utc>) -> TimerSnapshot {
        let (remaining, total) = match self.state.countdown(now) {
            Some(countdown) => countdown,
            None => {
                let total = self.phase_length(self.state.phase());
                (total, total)
            }
        };

        TimerSnapshot {
            phase: self.state.phase(),
            status: self.state.status(),
            time_remaining_secs: remaining_secs(remaining),
            total_secs: total.as_secs(),
            progress: progress_fraction(remaining, total),
            current_session: self.state.active().map(|a| a.record.clone()),
            completed_focus_count: self.completed_focus_count,
            linked_task_id: self.linked_task.clone(),
        }
    }

    // Commands

    /// Start a phase.
    ///
    /// With no phase named, starts the phase shown while idle and is a no-op
    /// if something is already in progress. Naming a phase while one is in
    /// progress discards the current record first, exactly as `reset` does.
    pub fn start(&mut self, phase: Option<Phase>, now: DateTime<Utc>) -> CommandOutcome {
        if !self.state.is_idle() {
            if phase.is_none() {
                return CommandOutcome::Ignored(IgnoredReason::AlreadyActive);
            }
            self.ticker.cancel();
            self.discard_current(now);
        }

        let phase = phase.unwrap_or_else(|| self.state.phase());
        self.begin_phase(phase, now);
        CommandOutcome::Applied
    }

    pub fn pause(&mut self, now: DateTime<Utc>) -> CommandOutcome {
        let (mut active, resumed_at) = match self.take_state() {
            EngineState::Running { active, resumed_at } => (active, resumed_at),
            other => {
                let reason = match &other {
                    EngineState::Paused { .. } => IgnoredReason::AlreadyPaused,
                    _ => IgnoredReason::Idle,
                };
                self.state = other;
                return CommandOutcome::Ignored(reason);
            }
        };

        self.ticker.cancel();
        active.bank(resumed_at, now);
        active.touch(now);
        self.queue_upsert(active.record.clone(), now);

        let remaining = active.remaining(None, now);
        let session_id = active.record.id.clone();
        let phase = active.phase();
        let progress = progress_fraction(remaining, active.total());
        self.state = EngineState::Paused { active };

        info!(
            session_id = %session_id,
            phase = ?phase,
            remaining_secs = remaining_secs(remaining),
            "Phase paused"
        );

        port_call(
            "live.on_tick",
            self.ports
                .live
                .on_tick(phase, remaining_secs(remaining), progress, false),
        );
        port_call("feedback.pulse", self.ports.feedback.pulse(FeedbackKind::Paused));

        self.emit(
            EventPayload::PhasePaused {
                session_id,
                remaining_secs: remaining_secs(remaining),
            },
            now,
        );
        self.emit_state(now);
        CommandOutcome::Applied
    }

    pub fn resume(&mut self, now: DateTime<Utc>) -> CommandOutcome {
        let mut active = match self.take_state() {
            EngineState::Paused { active } => active,
            other => {
                let reason = match &other {
                    EngineState::Running { .. } => IgnoredReason::AlreadyRunning,
                    _ => IgnoredReason::Idle,
                };
                self.state = other;
                return CommandOutcome::Ignored(reason);
            }
        };

        active.touch(now);
        self.queue_upsert(active.record.clone(), now);

        let remaining = active.remaining(None, now);
        let session_id = active.record.id.clone();
        let phase = active.phase();
        let progress = progress_fraction(remaining, active.total());
        self.state = EngineState::Running {
            active,
            resumed_at: now,
        };
        self.ticker.start(self.on_tick.clone());

        info!(
            session_id = %session_id,
            phase = ?phase,
            remaining_secs = remaining_secs(remaining),
            "Phase resumed"
        );

        port_call(
            "live.on_tick",
            self.ports
                .live
                .on_tick(phase, remaining_secs(remaining), progress, true),
        );
        port_call("feedback.pulse", self.ports.feedback.pulse(FeedbackKind::Resumed));

        self.emit(
            EventPayload::PhaseResumed {
                session_id,
                remaining_secs: remaining_secs(remaining),
            },
            now,
        );
        self.emit_state(now);
        CommandOutcome::Applied
    }

    /// Abandon the phase in progress and delete its record.
    ///
    /// Always cancels the tick source, so it is safe during teardown even
    /// when idle.
    pub fn reset(&mut self, now: DateTime<Utc>) -> CommandOutcome {
        self.ticker.cancel();

        if self.state.is_idle() {
            return CommandOutcome::Ignored(IgnoredReason::Idle);
        }

        self.discard_current(now);
        self.emit_state(now);
        CommandOutcome::Applied
    }

    /// Finish the phase in progress early and start the next one.
    ///
    /// The skipped record is stored as completed with its planned duration.
    pub fn skip(&mut self, now: DateTime<Utc>) -> CommandOutcome {
        let active = match self.take_state() {
            EngineState::Running { active, .. } | EngineState::Paused { active } => active,
            idle => {
                self.state = idle;
                return CommandOutcome::Ignored(IgnoredReason::Idle);
            }
        };

        self.ticker.cancel();
        self.finish(active, now, true);
        CommandOutcome::Applied
    }

    /// Tick handler: refresh observers and live status, complete when due.
    ///
    /// Ticks that arrive while idle or paused are ignored.
    pub fn tick(&mut self, now: DateTime<Utc>) {
        let (remaining, total, phase) = match &self.state {
            EngineState::Running { active, resumed_at } => (
                active.remaining(Some(*resumed_at), now),
                active.total(),
                active.phase(),
            ),
            _ => {
                debug!("Tick ignored while not running");
                return;
            }
        };

        debug!(
            phase = ?phase,
            remaining_secs = remaining_secs(remaining),
            "Tick"
        );

        self.emit_state(now);
        port_call(
            "live.on_tick",
            self.ports.live.on_tick(
                phase,
                remaining_secs(remaining),
                progress_fraction(remaining, total),
                true,
            ),
        );

        if remaining <= COMPLETION_EPSILON {
            if let EngineState::Running { active, .. } = self.take_state() {
                self.ticker.cancel();
                self.finish(active, now, false);
            }
        }
    }

    // Settings and task linking

    /// Take new settings.
    ///
    /// The phase in progress keeps the duration it started with; only the
    /// idle preview and future phases see the change.
    pub fn apply_settings(&mut self, settings: TimerSettings, now: DateTime<Utc>) {
        self.sequencer = PhaseSequencer::from_settings(&settings);
        self.settings = settings;

        match &self.state {
            EngineState::Idle { phase } => {
                let phase = *phase;
                let preview_secs = self.phase_length(phase).as_secs();
                info!(phase = ?phase, preview_secs, "Settings applied");
                self.emit(
                    EventPayload::SettingsApplied {
                        preview_phase: phase,
                        preview_secs,
                    },
                    now,
                );
                self.emit_state(now);
            }
            _ => debug!("Settings stored; phase in progress keeps its duration"),
        }
    }

    /// Set the task attached to focus records started from now on
    pub fn link_task(&mut self, task: Option<TaskId>, now: DateTime<Utc>) {
        match &task {
            Some(task) => info!(task_id = %task, "Task linked"),
            None => info!("Task unlinked"),
        }
        self.linked_task = task;
        self.emit_state(now);
    }

    // Lifecycle

    /// Adopt an in-progress record left behind by an earlier process.
    ///
    /// A record whose time remains and that is under an hour old is resumed
    /// with its wall-clock age counted as elapsed. One whose time ran out is
    /// finalized as completed at its planned end. Anything else, including a
    /// start time in the future, is deleted. The engine stays idle in every
    /// case but the first.
    pub fn recover(&mut self, record: SessionRecord, now: DateTime<Utc>) -> RecoveryOutcome {
        if !self.state.is_idle() {
            warn!(
                session_id = %record.id,
                "Recovery skipped; a phase is already in progress"
            );
            return RecoveryOutcome::Discarded;
        }

        let session_id = record.id.clone();
        let outcome = if record.start_time > now {
            warn!(
                session_id = %session_id,
                start_time = %record.start_time,
                "Stored session starts in the future; discarding"
            );
            self.queue_delete(session_id.clone(), now);
            RecoveryOutcome::Discarded
        } else {
            let age = wall_elapsed(record.start_time, now);
            let total = record.total_duration();
            let remaining = total.saturating_sub(age);

            if remaining > COMPLETION_EPSILON && age < RECOVERY_MAX_AGE {
                self.resume_recovered(record, age, now);
                RecoveryOutcome::Resumed
            } else if remaining <= COMPLETION_EPSILON {
                let end_time = record.start_time + to_chrono(total);
                let record = record.finalized(end_time, now);
                self.record_completion(&record, false);
                self.queue_upsert(record.clone(), now);

                let next = self.sequencer.next(record.phase, self.completed_focus_count);
                self.state = EngineState::Idle { phase: next };
                info!(session_id = %session_id, next_phase = ?next, "Interrupted session finalized");

                self.emit(
                    EventPayload::PhaseCompleted {
                        record,
                        next_phase: next,
                        skipped: false,
                        auto_started: false,
                    },
                    now,
                );
                RecoveryOutcome::Finalized
            } else {
                info!(
                    session_id = %session_id,
                    age_secs = age.as_secs(),
                    "Interrupted session too old to resume; discarding"
                );
                self.queue_delete(session_id.clone(), now);
                RecoveryOutcome::Discarded
            }
        };

        self.emit(
            EventPayload::SessionRecovered {
                session_id,
                outcome,
            },
            now,
        );
        self.emit_state(now);
        outcome
    }

    /// Surface a failed background write to observers. Engine state is
    /// untouched.
    pub fn report_persistence_failure(&self, failure: &PersistFailure, now: DateTime<Utc>) {
        warn!(
            session_id = %failure.session_id,
            op = %failure.operation,
            error = %failure.error,
            "Persistence failure reported"
        );
        self.emit(
            EventPayload::PersistenceFailed {
                operation: failure.operation.to_string(),
                session_id: Some(failure.session_id.clone()),
                message: failure.error.to_string(),
            },
            now,
        );
    }

    /// Stop ticking and leave any phase in progress stored as in progress,
    /// so the next start can recover it.
    pub fn shutdown(&mut self, now: DateTime<Utc>) {
        self.ticker.cancel();

        let record = match &mut self.state {
            EngineState::Running { active, .. } | EngineState::Paused { active } => {
                active.touch(now);
                active.record.clone()
            }
            EngineState::Idle { .. } => {
                info!("Engine shut down while idle");
                return;
            }
        };

        info!(session_id = %record.id, phase = ?record.phase, "Engine shut down mid-phase");
        self.queue_upsert(record, now);
        port_call("live.on_phase_end", self.ports.live.on_phase_end());
    }

    // Internals

    fn begin_phase(&mut self, phase: Phase, now: DateTime<Utc>) {
        let minutes = resolve_minutes(phase, &self.settings);
        let task = match phase {
            Phase::Focus => self.linked_task.clone(),
            Phase::ShortBreak | Phase::LongBreak => None,
        };
        let record = SessionRecord::begin(phase, minutes, task.clone(), now);
        let session_id = record.id.clone();
        let total_secs = record.total_duration().as_secs();

        self.queue_upsert(record.clone(), now);
        self.state = EngineState::Running {
            active: ActivePhase::new(record),
            resumed_at: now,
        };
        self.ticker.start(self.on_tick.clone());

        info!(
            session_id = %session_id,
            phase = ?phase,
            duration_minutes = minutes,
            "Phase started"
        );

        port_call(
            "live.on_phase_start",
            self.ports.live.on_phase_start(phase, total_secs),
        );
        port_call(
            "feedback.pulse",
            self.ports.feedback.pulse(FeedbackKind::PhaseStarted),
        );

        self.emit(
            EventPayload::PhaseStarted {
                session_id,
                phase,
                total_secs,
                linked_task_id: task,
            },
            now,
        );
        self.emit_state(now);
    }

    fn resume_recovered(&mut self, record: SessionRecord, age: Duration, now: DateTime<Utc>) {
        let mut active = ActivePhase::with_elapsed(record, age);
        active.touch(now);
        self.queue_upsert(active.record.clone(), now);

        let phase = active.phase();
        let total_secs = active.total().as_secs();
        let remaining = active.remaining(None, now);
        info!(
            session_id = %active.record.id,
            phase = ?phase,
            remaining_secs = remaining_secs(remaining),
            "Interrupted session resumed"
        );

        self.state = EngineState::Running {
            active,
            resumed_at: now,
        };
        self.ticker.start(self.on_tick.clone());
        port_call(
            "live.on_phase_start",
            self.ports.live.on_phase_start(phase, total_secs),
        );
    }

    /// Finalize `active` as completed and move on to the next phase
    fn finish(&mut self, active: ActivePhase, now: DateTime<Utc>, skipped: bool) {
        let record = active.record.finalized(now, now);
        self.record_completion(&record, skipped);
        self.queue_upsert(record.clone(), now);

        port_call("live.on_phase_end", self.ports.live.on_phase_end());
        port_call(
            "feedback.pulse",
            self.ports.feedback.pulse(FeedbackKind::PhaseCompleted),
        );

        let next = self.sequencer.next(record.phase, self.completed_focus_count);
        let auto_start = skipped || should_auto_start(record.phase, &self.settings);

        info!(
            session_id = %record.id,
            phase = ?record.phase,
            next_phase = ?next,
            skipped,
            auto_start,
            "Phase completed"
        );

        self.emit(
            EventPayload::PhaseCompleted {
                record,
                next_phase: next,
                skipped,
                auto_started: auto_start,
            },
            now,
        );

        if auto_start {
            self.begin_phase(next, now);
        } else {
            self.state = EngineState::Idle { phase: next };
            self.emit_state(now);
        }
    }

    fn record_completion(&mut self, record: &SessionRecord, skipped: bool) {
        if record.phase == Phase::Focus {
            self.completed_focus_count += 1;
        }
        if skipped {
            self.skipped.insert(record.id.clone());
        }
        self.completed.push(record.clone());
    }

    /// Drop the active record and go idle on the same phase
    fn discard_current(&mut self, now: DateTime<Utc>) {
        let phase = self.state.phase();
        let active = match self.take_state() {
            EngineState::Running { active, .. } | EngineState::Paused { active } => active,
            idle => {
                self.state = idle;
                return;
            }
        };

        let session_id = active.record.id;
        self.queue_delete(session_id.clone(), now);
        self.state = EngineState::Idle { phase };

        info!(session_id = %session_id, phase = ?phase, "Phase discarded");
        port_call("live.on_phase_end", self.ports.live.on_phase_end());
        self.emit(EventPayload::SessionDiscarded { session_id, phase }, now);
    }

    fn take_state(&mut self) -> EngineState {
        let phase = self.state.phase();
        std::mem::replace(&mut self.state, EngineState::Idle { phase })
    }

    fn phase_length(&self, phase: Phase) -> Duration {
        Duration::from_secs(u64::from(resolve_minutes(phase, &self.settings)) * 60)
    }

    fn queue_upsert(&self, record: SessionRecord, now: DateTime<Utc>) {
        let session_id = record.id.clone();
        if !self.persist.upsert(record) {
            self.writer_gone("upsert", session_id, now);
        }
    }

    fn queue_delete(&self, session_id: SessionId, now: DateTime<Utc>) {
        if !self.persist.delete(session_id.clone()) {
            self.writer_gone("delete", session_id, now);
        }
    }

    fn writer_gone(&self, operation: &str, session_id: SessionId, now: DateTime<Utc>) {
        warn!(session_id = %session_id, op = operation, "Persistence writer unavailable");
        self.emit(
            EventPayload::PersistenceFailed {
                operation: operation.to_string(),
                session_id: Some(session_id),
                message: "persistence writer is not running".into(),
            },
            now,
        );
    }

    fn emit(&self, payload: EventPayload, now: DateTime<Utc>) {
        self.observers.notify(&Event::at(payload, now));
    }

    fn emit_state(&self, now: DateTime<Utc>) {
        self.emit(EventPayload::StateChanged(self.snapshot(now)), now);
    }
}

fn port_call(port: &str, result: PortResult<()>) {
    if let Err(e) = result {
        warn!(port, error = %e, "Side-effect port failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ManualTicker, StoreOp};
    use chrono::TimeZone;
    use pomo_api::TimerStatus;
    use pomo_ports::{PortCall, RecordingPorts};
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
    }

    fn secs(n: i64) -> chrono::Duration {
        chrono::Duration::seconds(n)
    }

    struct Harness {
        engine: SessionEngine,
        ops: mpsc::UnboundedReceiver<StoreOp>,
        ticker: ManualTicker,
        ports: Arc<RecordingPorts>,
        events: Arc<Mutex<Vec<Event>>>,
    }

    impl Harness {
        fn new(settings: TimerSettings) -> Self {
            let (queue, ops) = PersistQueue::channel();
            let ticker = ManualTicker::new();
            let ports = RecordingPorts::new();
            let engine = SessionEngine::new(
                UserId::default(),
                settings,
                queue,
                ports.ports(),
                Box::new(ticker.clone()),
                Arc::new(|| {}),
            );

            let events = Arc::new(Mutex::new(Vec::new()));
            let sink = events.clone();
            engine.subscribe(move |e| sink.lock().unwrap().push(e.clone()));

            Self {
                engine,
                ops,
                ticker,
                ports,
                events,
            }
        }

        fn ops(&mut self) -> Vec<StoreOp> {
            let mut ops = Vec::new();
            while let Ok(op) = self.ops.try_recv() {
                ops.push(op);
            }
            ops
        }

        fn payloads(&self) -> Vec<EventPayload> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .map(|e| e.payload.clone())
                .collect()
        }

        fn completed_events(&self) -> Vec<(Phase, Phase, bool)> {
            self.payloads()
                .into_iter()
                .filter_map(|p| match p {
                    EventPayload::PhaseCompleted {
                        record,
                        next_phase,
                        skipped,
                        ..
                    } => Some((record.phase, next_phase, skipped)),
                    _ => None,
                })
                .collect()
        }
    }

    fn defaults() -> Harness {
        Harness::new(TimerSettings::default())
    }

    #[test]
    fn test_idle_snapshot_previews_focus() {
        let h = defaults();
        let snap = h.engine.snapshot(t0());

        assert_eq!(snap.phase, Phase::Focus);
        assert_eq!(snap.status, TimerStatus::Idle);
        assert_eq!(snap.time_remaining_secs, 25 * 60);
        assert_eq!(snap.progress, 0.0);
        assert!(snap.current_session.is_none());
    }

    #[test]
    fn test_start_creates_record_and_starts_ticker() {
        let mut h = defaults();
        assert!(h.engine.start(None, t0()).is_applied());

        let snap = h.engine.snapshot(t0());
        assert_eq!(snap.status, TimerStatus::Running);
        let record = snap.current_session.unwrap();
        assert_eq!(record.duration_minutes, 25);
        assert!(record.is_in_progress());

        assert!(h.ticker.is_active());
        assert!(matches!(h.ops().as_slice(), [StoreOp::Upsert(r)] if r.id == record.id));
        assert_eq!(
            h.ports.calls()[0],
            PortCall::PhaseStart {
                phase: Phase::Focus,
                total_secs: 1500
            }
        );
    }

    #[test]
    fn test_suspension_uses_wall_clock() {
        let mut h = defaults();
        h.engine.start(Some(Phase::Focus), t0());

        // No ticks delivered for ten minutes
        let snap = h.engine.snapshot(t0() + secs(600));
        assert_eq!(snap.time_remaining_secs, 15 * 60);
        assert!((snap.progress - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_countdown_is_monotonic_and_frozen_while_paused() {
        let mut h = defaults();
        h.engine.start(None, t0());

        let mut last = u64::MAX;
        for s in [1, 2, 5, 30, 31, 90] {
            let now = t0() + secs(s);
            h.engine.tick(now);
            let remaining = h.engine.snapshot(now).time_remaining_secs;
            assert!(remaining <= last);
            last = remaining;
        }

        h.engine.pause(t0() + secs(100));
        let frozen = h.engine.snapshot(t0() + secs(100)).time_remaining_secs;
        assert_eq!(h.engine.snapshot(t0() + secs(900)).time_remaining_secs, frozen);
        assert_eq!(frozen, 1500 - 100);
    }

    #[test]
    fn test_pause_and_resume_are_idempotent() {
        let mut h = defaults();
        h.engine.start(None, t0());

        assert!(h.engine.pause(t0() + secs(60)).is_applied());
        let after_one = h.engine.snapshot(t0() + secs(60));
        assert_eq!(
            h.engine.pause(t0() + secs(61)),
            CommandOutcome::Ignored(IgnoredReason::AlreadyPaused)
        );
        assert_eq!(h.engine.snapshot(t0() + secs(60)), after_one);
        assert!(!h.ticker.is_active());

        assert!(h.engine.resume(t0() + secs(120)).is_applied());
        assert_eq!(
            h.engine.resume(t0() + secs(121)),
            CommandOutcome::Ignored(IgnoredReason::AlreadyRunning)
        );
        assert!(h.ticker.is_active());

        // 60s before pause + 30s after resume
        let snap = h.engine.snapshot(t0() + secs(150));
        assert_eq!(snap.time_remaining_secs, 1500 - 90);
    }

    #[test]
    fn test_commands_while_idle_are_noops() {
        let mut h = defaults();
        assert_eq!(
            h.engine.pause(t0()),
            CommandOutcome::Ignored(IgnoredReason::Idle)
        );
        assert_eq!(
            h.engine.resume(t0()),
            CommandOutcome::Ignored(IgnoredReason::Idle)
        );
        assert_eq!(
            h.engine.skip(t0()),
            CommandOutcome::Ignored(IgnoredReason::Idle)
        );
        assert_eq!(
            h.engine.reset(t0()),
            CommandOutcome::Ignored(IgnoredReason::Idle)
        );
        assert!(h.ops().is_empty());
        assert!(h.payloads().is_empty());
    }

    #[test]
    fn test_pause_touches_record_without_changing_duration() {
        let mut h = defaults();
        h.engine.start(None, t0());
        h.ops();

        h.engine.pause(t0() + secs(42));
        let ops = h.ops();
        let [StoreOp::Upsert(record)] = ops.as_slice() else {
            panic!("expected one upsert, got {ops:?}");
        };
        assert_eq!(record.updated_at, t0() + secs(42));
        assert_eq!(record.start_time, t0());
        assert_eq!(record.duration_minutes, 25);
        assert!(record.is_in_progress());
    }

    #[test]
    fn test_reset_deletes_record() {
        let mut h = defaults();
        h.engine.start(None, t0());
        let id = h.engine.snapshot(t0()).current_session.unwrap().id;
        h.ops();

        assert!(h.engine.reset(t0() + secs(5)).is_applied());

        assert!(matches!(h.ops().as_slice(), [StoreOp::Delete(deleted)] if *deleted == id));
        assert!(!h.ticker.is_active());
        assert!(h.engine.completed_sessions().is_empty());

        let snap = h.engine.snapshot(t0() + secs(5));
        assert_eq!(snap.status, TimerStatus::Idle);
        assert_eq!(snap.phase, Phase::Focus);
        assert_eq!(snap.time_remaining_secs, 1500);
        assert_eq!(h.ports.phase_ends(), 1);
    }

    #[test]
    fn test_skip_completes_and_starts_next() {
        let mut h = defaults();
        h.engine.start(None, t0());
        h.ops();

        assert!(h.engine.skip(t0() + secs(1)).is_applied());

        let completed = h.engine.completed_sessions();
        assert_eq!(completed.len(), 1);
        assert!(completed[0].completed);
        assert_eq!(completed[0].duration_minutes, 25);
        assert_eq!(completed[0].end_time, Some(t0() + secs(1)));

        let snap = h.engine.snapshot(t0() + secs(1));
        assert_eq!(snap.phase, Phase::ShortBreak);
        assert_eq!(snap.status, TimerStatus::Running);
        assert_eq!(snap.completed_focus_count, 1);

        let ops = h.ops();
        assert_eq!(ops.len(), 2);
        assert!(matches!(&ops[0], StoreOp::Upsert(r) if r.completed && r.phase == Phase::Focus));
        assert!(matches!(&ops[1], StoreOp::Upsert(r) if !r.completed && r.phase == Phase::ShortBreak));

        assert_eq!(
            h.completed_events(),
            vec![(Phase::Focus, Phase::ShortBreak, true)]
        );
        assert_eq!(h.engine.quick_stats().skipped, 1);
    }

    #[test]
    fn test_skip_while_paused() {
        let mut h = defaults();
        h.engine.start(None, t0());
        h.engine.pause(t0() + secs(10));

        assert!(h.engine.skip(t0() + secs(20)).is_applied());
        assert_eq!(h.engine.state().status(), TimerStatus::Running);
        assert_eq!(h.engine.state().phase(), Phase::ShortBreak);
    }

    #[test]
    fn test_natural_completion_without_auto_start_goes_idle() {
        let mut h = defaults();
        h.engine.start(None, t0());

        h.engine.tick(t0() + secs(1500));

        let snap = h.engine.snapshot(t0() + secs(1500));
        assert_eq!(snap.status, TimerStatus::Idle);
        assert_eq!(snap.phase, Phase::ShortBreak);
        assert_eq!(snap.time_remaining_secs, 5 * 60);
        assert!(!h.ticker.is_active());
        assert_eq!(h.engine.completed_sessions().len(), 1);
        assert_eq!(
            h.completed_events(),
            vec![(Phase::Focus, Phase::ShortBreak, false)]
        );
        assert_eq!(
            h.ports.pulses().last(),
            Some(&FeedbackKind::PhaseCompleted)
        );
    }

    #[test]
    fn test_completion_within_epsilon() {
        let mut h = defaults();
        h.engine.start(None, t0());

        let almost = t0() + secs(1499) + chrono::Duration::milliseconds(900);
        h.engine.tick(almost);
        assert!(h.engine.state().is_idle());
    }

    #[test]
    fn test_auto_start_break() {
        let mut h = Harness::new(TimerSettings {
            auto_start_break: true,
            ..Default::default()
        });
        h.engine.start(None, t0());
        h.engine.tick(t0() + secs(1500));

        let snap = h.engine.snapshot(t0() + secs(1500));
        assert_eq!(snap.status, TimerStatus::Running);
        assert_eq!(snap.phase, Phase::ShortBreak);
        assert_eq!(snap.total_secs, 300);

        // Break finishes; focus does not auto-start
        h.engine.tick(t0() + secs(1800));
        let snap = h.engine.snapshot(t0() + secs(1800));
        assert_eq!(snap.status, TimerStatus::Idle);
        assert_eq!(snap.phase, Phase::Focus);
    }

    #[test]
    fn test_tick_while_paused_is_ignored() {
        let mut h = defaults();
        h.engine.start(None, t0());
        h.engine.pause(t0() + secs(10));
        let before = h.events.lock().unwrap().len();

        h.engine.tick(t0() + secs(5000));
        assert_eq!(h.events.lock().unwrap().len(), before);
        assert_eq!(h.engine.state().status(), TimerStatus::Paused);
    }

    #[test]
    fn test_tick_updates_live_status() {
        let mut h = defaults();
        h.engine.start(None, t0());
        h.ports.clear();

        h.engine.tick(t0() + secs(300));
        let calls = h.ports.calls();
        let [
            PortCall::Tick {
                phase: Phase::Focus,
                remaining_secs: 1200,
                progress,
                is_running: true,
            },
        ] = calls.as_slice()
        else {
            panic!("unexpected port calls: {calls:?}");
        };
        assert!((progress - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_start_without_phase_while_active_is_ignored() {
        let mut h = defaults();
        h.engine.start(None, t0());
        assert_eq!(
            h.engine.start(None, t0() + secs(1)),
            CommandOutcome::Ignored(IgnoredReason::AlreadyActive)
        );
    }

    #[test]
    fn test_start_named_phase_while_active_discards_current() {
        let mut h = defaults();
        h.engine.start(None, t0());
        let first = h.engine.snapshot(t0()).current_session.unwrap().id;
        h.ops();

        assert!(h.engine.start(Some(Phase::LongBreak), t0() + secs(5)).is_applied());

        let ops = h.ops();
        assert!(matches!(&ops[0], StoreOp::Delete(id) if *id == first));
        assert!(matches!(&ops[1], StoreOp::Upsert(r) if r.phase == Phase::LongBreak));
        assert_eq!(h.engine.state().phase(), Phase::LongBreak);
        assert!(h.engine.completed_sessions().is_empty());
    }

    #[test]
    fn test_settings_change_only_affects_preview() {
        let mut h = defaults();
        h.engine.start(None, t0());

        let longer = TimerSettings {
            focus_minutes: Some(50),
            ..Default::default()
        };
        h.engine.apply_settings(longer, t0() + secs(60));

        let snap = h.engine.snapshot(t0() + secs(60));
        assert_eq!(snap.total_secs, 1500);
        assert_eq!(snap.current_session.unwrap().duration_minutes, 25);

        h.engine.reset(t0() + secs(61));
        assert_eq!(h.engine.snapshot(t0() + secs(61)).time_remaining_secs, 50 * 60);
    }

    #[test]
    fn test_settings_applied_while_idle_emits_preview() {
        let mut h = defaults();
        h.engine.apply_settings(
            TimerSettings {
                focus_minutes: Some(200),
                ..Default::default()
            },
            t0(),
        );

        assert!(h.payloads().iter().any(|p| matches!(
            p,
            EventPayload::SettingsApplied {
                preview_phase: Phase::Focus,
                preview_secs: 3600
            }
        )));
    }

    #[test]
    fn test_linked_task_attaches_to_focus_only() {
        let mut h = Harness::new(TimerSettings {
            auto_start_break: true,
            ..Default::default()
        });
        h.engine.link_task(Some(TaskId::new("essay")), t0());
        h.engine.start(None, t0());
        h.engine.tick(t0() + secs(1500));

        let completed = &h.engine.completed_sessions()[0];
        assert_eq!(completed.linked_task_id, Some(TaskId::new("essay")));

        let running_break = h.engine.snapshot(t0() + secs(1500)).current_session.unwrap();
        assert_eq!(running_break.phase, Phase::ShortBreak);
        assert!(running_break.linked_task_id.is_none());
        assert_eq!(
            h.engine.quick_stats().focus_by_task.get(&TaskId::new("essay")),
            Some(&1)
        );
    }

    #[test]
    fn test_failing_ports_and_panicking_listener_do_not_break_engine() {
        let mut h = defaults();
        h.ports.set_fail(true);
        h.engine.subscribe(|_| panic!("observer failure"));

        h.engine.start(None, t0());
        h.engine.pause(t0() + secs(10));
        h.engine.resume(t0() + secs(20));
        h.engine.skip(t0() + secs(30));

        assert_eq!(h.engine.completed_sessions().len(), 1);
        assert_eq!(h.engine.state().phase(), Phase::ShortBreak);
    }

    #[test]
    fn test_unsubscribe_stops_events() {
        let mut h = defaults();
        let count = Arc::new(Mutex::new(0));
        let c = count.clone();
        let sub = h.engine.subscribe(move |_| *c.lock().unwrap() += 1);

        h.engine.start(None, t0());
        let seen = *count.lock().unwrap();
        assert!(seen > 0);

        sub.unsubscribe();
        h.engine.pause(t0() + secs(1));
        assert_eq!(*count.lock().unwrap(), seen);
    }

    #[test]
    fn test_writer_gone_reports_failure_but_keeps_state() {
        let mut h = defaults();
        h.ops.close();

        h.engine.start(None, t0());

        assert_eq!(h.engine.state().status(), TimerStatus::Running);
        let events = h.events.lock().unwrap();
        let failed = events
            .iter()
            .find(|e| matches!(e.payload, EventPayload::PersistenceFailed { .. }))
            .unwrap();
        assert_eq!(failed.timestamp, t0());
    }

    #[test]
    fn test_report_persistence_failure_emits_event() {
        let mut h = defaults();
        h.engine.start(None, t0());
        let before = h.engine.snapshot(t0());

        let failure = PersistFailure {
            operation: crate::PersistOperation::Upsert,
            session_id: before.current_session.clone().unwrap().id,
            error: pomo_store::StoreError::Unavailable("disk full".into()),
        };
        h.engine.report_persistence_failure(&failure, t0() + secs(2));

        assert_eq!(h.engine.snapshot(t0()), before);
        let events = h.events.lock().unwrap();
        let failed = events.last().unwrap();
        assert!(matches!(
            &failed.payload,
            EventPayload::PersistenceFailed { message, .. } if message.contains("disk full")
        ));
        assert_eq!(failed.timestamp, t0() + secs(2));
    }

    #[test]
    fn test_recover_resumes_recent_session() {
        let mut h = defaults();
        let record = SessionRecord::begin(Phase::Focus, 25, None, t0());

        let outcome = h.engine.recover(record.clone(), t0() + secs(600));

        assert_eq!(outcome, RecoveryOutcome::Resumed);
        let snap = h.engine.snapshot(t0() + secs(600));
        assert_eq!(snap.status, TimerStatus::Running);
        assert_eq!(snap.time_remaining_secs, 900);
        assert_eq!(snap.current_session.unwrap().id, record.id);
        assert!(h.ticker.is_active());
    }

    #[test]
    fn test_recover_finalizes_exhausted_session() {
        let mut h = defaults();
        let record = SessionRecord::begin(Phase::Focus, 25, None, t0());

        let outcome = h.engine.recover(record, t0() + secs(40 * 60));

        assert_eq!(outcome, RecoveryOutcome::Finalized);
        assert!(h.engine.state().is_idle());
        assert_eq!(h.engine.state().phase(), Phase::ShortBreak);

        let ops = h.ops();
        let [StoreOp::Upsert(stored)] = ops.as_slice() else {
            panic!("expected one upsert, got {ops:?}");
        };
        assert!(stored.completed);
        assert_eq!(stored.end_time, Some(t0() + secs(25 * 60)));

        // Event consumers see the finalized record like any other completion
        let completed: Vec<_> = h
            .payloads()
            .into_iter()
            .filter_map(|p| match p {
                EventPayload::PhaseCompleted {
                    record,
                    next_phase,
                    skipped,
                    auto_started,
                } => Some((record, next_phase, skipped, auto_started)),
                _ => None,
            })
            .collect();
        assert_eq!(completed.len(), 1);
        let (record, next_phase, skipped, auto_started) = &completed[0];
        assert_eq!(record.id, stored.id);
        assert_eq!(*next_phase, Phase::ShortBreak);
        assert!(!skipped);
        assert!(!auto_started);
        assert_eq!(h.engine.completed_sessions().len(), 1);
    }

    #[test]
    fn test_recover_discards_future_and_stale_records() {
        let mut h = defaults();
        let future = SessionRecord::begin(Phase::Focus, 25, None, t0() + secs(3600));
        assert_eq!(
            h.engine.recover(future.clone(), t0()),
            RecoveryOutcome::Discarded
        );
        assert!(matches!(h.ops().as_slice(), [StoreOp::Delete(id)] if *id == future.id));
        assert!(h.engine.state().is_idle());

        // Long phase still has time left but is over an hour old
        let stale = SessionRecord::begin(Phase::Focus, 90, None, t0());
        assert_eq!(
            h.engine.recover(stale, t0() + secs(61 * 60)),
            RecoveryOutcome::Discarded
        );
        assert!(h.engine.state().is_idle());
    }

    #[test]
    fn test_shutdown_keeps_record_in_progress() {
        let mut h = defaults();
        h.engine.start(None, t0());
        h.ops();

        h.engine.shutdown(t0() + secs(30));

        assert!(!h.ticker.is_active());
        let ops = h.ops();
        assert!(matches!(ops.as_slice(), [StoreOp::Upsert(r)] if r.is_in_progress()));
        assert_eq!(h.ports.phase_ends(), 1);
    }
}
