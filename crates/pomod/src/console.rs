//! Human-readable rendering of events, snapshots, and stats

use chrono::{DateTime, Local, Utc};
use pomo_api::{Event, EventPayload, RecoveryOutcome, SessionRecord, TimerSnapshot, TimerStatus};
use pomo_core::{CommandOutcome, QuickStats};
use pomo_util::format_countdown;

/// One line for an event, or `None` for events too frequent to print
pub fn describe_event(event: &Event) -> Option<String> {
    let line = match &event.payload {
        EventPayload::StateChanged(_) => return None,
        EventPayload::PhaseStarted {
            phase,
            total_secs,
            linked_task_id,
            ..
        } => match linked_task_id {
            Some(task) => format!(
                "▶ {} started ({}) for task {}",
                phase,
                format_countdown(*total_secs),
                task
            ),
            None => format!("▶ {} started ({})", phase, format_countdown(*total_secs)),
        },
        EventPayload::PhasePaused { remaining_secs, .. } => {
            format!("⏸ Paused with {} left", format_countdown(*remaining_secs))
        }
        EventPayload::PhaseResumed { remaining_secs, .. } => {
            format!("▶ Resumed with {} left", format_countdown(*remaining_secs))
        }
        EventPayload::PhaseCompleted {
            record,
            next_phase,
            skipped,
            auto_started,
        } => {
            let verb = if *skipped { "skipped" } else { "complete" };
            let next = if *auto_started {
                format!("{} starting", next_phase)
            } else {
                format!("{} is next", next_phase)
            };
            format!("✓ {} {}; {}", record.phase, verb, next)
        }
        EventPayload::SessionDiscarded { phase, .. } => format!("✗ {} discarded", phase),
        EventPayload::SessionRecovered { outcome, .. } => match outcome {
            RecoveryOutcome::Resumed => "↻ Resumed the interrupted session".to_string(),
            RecoveryOutcome::Finalized => "↻ Interrupted session had finished; recorded".to_string(),
            RecoveryOutcome::Discarded => "↻ Interrupted session discarded".to_string(),
        },
        EventPayload::SettingsApplied {
            preview_phase,
            preview_secs,
        } => format!(
            "⚙ Settings applied; {} will run {}",
            preview_phase,
            format_countdown(*preview_secs)
        ),
        EventPayload::PersistenceFailed { message, .. } => {
            format!("! Could not save session: {}", message)
        }
    };
    Some(line)
}

pub fn describe_snapshot(snapshot: &TimerSnapshot) -> String {
    let status = match snapshot.status {
        TimerStatus::Idle => "idle",
        TimerStatus::Running => "running",
        TimerStatus::Paused => "paused",
    };
    let mut line = format!(
        "{} {} {} / {} ({:.0}%), {} focus done",
        snapshot.phase,
        status,
        format_countdown(snapshot.time_remaining_secs),
        format_countdown(snapshot.total_secs),
        snapshot.progress * 100.0,
        snapshot.completed_focus_count
    );
    if let Some(task) = &snapshot.linked_task_id {
        line.push_str(&format!(", task {}", task));
    }
    line
}

pub fn describe_stats(stats: &QuickStats) -> String {
    let mut line = format!(
        "{} focus ({} min), {} breaks, {} skipped",
        stats.completed_focus, stats.focus_minutes, stats.breaks, stats.skipped
    );

    let mut tasks: Vec<_> = stats.focus_by_task.iter().collect();
    tasks.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.as_str().cmp(b.0.as_str())));
    for (task, count) in tasks {
        line.push_str(&format!("\n  {}: {}", task, count));
    }
    line
}

pub fn describe_history(records: &[SessionRecord]) -> String {
    if records.is_empty() {
        return "No completed sessions today".to_string();
    }

    records
        .iter()
        .map(|r| {
            let start = r.start_time.with_timezone(&Local).format("%H:%M");
            let task = r
                .linked_task_id
                .as_ref()
                .map(|t| format!(" [{}]", t))
                .unwrap_or_default();
            format!("{} {} {} min{}", start, r.phase, r.duration_minutes, task)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn describe_outcome(outcome: CommandOutcome) -> Option<String> {
    match outcome {
        CommandOutcome::Applied => None,
        CommandOutcome::Ignored(reason) => Some(format!("Ignored: {}", reason)),
    }
}

/// Local midnight of the day containing `now`
pub fn start_of_local_day(now: DateTime<Utc>) -> DateTime<Utc> {
    let local = now.with_timezone(&Local);
    local
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .and_then(|midnight| midnight.and_local_timezone(Local).earliest())
        .map(|midnight| midnight.with_timezone(&Utc))
        .unwrap_or(now)
}
