//! Same-process quick statistics

use pomo_api::{Phase, SessionRecord};
use pomo_util::{SessionId, TaskId};
use std::collections::{HashMap, HashSet};

/// Summary of the completed-session feed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuickStats {
    /// Focus records marked completed, skipped ones included
    pub completed_focus: u32,
    /// Planned minutes of focus phases that ran to the end
    pub focus_minutes: u32,
    pub breaks: u32,
    pub skipped: u32,
    pub focus_by_task: HashMap<TaskId, u32>,
}

impl QuickStats {
    pub fn from_records(records: &[SessionRecord], skipped: &HashSet<SessionId>) -> Self {
        let mut stats = Self::default();

        for record in records {
            let was_skipped = skipped.contains(&record.id);
            if was_skipped {
                stats.skipped += 1;
            }

            match record.phase {
                Phase::Focus => {
                    stats.completed_focus += 1;
                    if !was_skipped {
                        stats.focus_minutes += record.duration_minutes;
                    }
                    if let Some(task) = &record.linked_task_id {
                        *stats.focus_by_task.entry(task.clone()).or_default() += 1;
                    }
                }
                Phase::ShortBreak | Phase::LongBreak => stats.breaks += 1,
            }
        }

        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn done(phase: Phase, minutes: u32, task: Option<&str>) -> SessionRecord {
        let now = Utc::now();
        SessionRecord::begin(phase, minutes, task.map(TaskId::from), now).finalized(now, now)
    }

    #[test]
    fn test_empty_feed() {
        assert_eq!(
            QuickStats::from_records(&[], &HashSet::new()),
            QuickStats::default()
        );
    }

    #[test]
    fn test_counts_focus_breaks_and_tasks() {
        let records = vec![
            done(Phase::Focus, 25, Some("write")),
            done(Phase::ShortBreak, 5, None),
            done(Phase::Focus, 25, Some("write")),
            done(Phase::LongBreak, 15, None),
            done(Phase::Focus, 30, None),
        ];
        let stats = QuickStats::from_records(&records, &HashSet::new());

        assert_eq!(stats.completed_focus, 3);
        assert_eq!(stats.focus_minutes, 80);
        assert_eq!(stats.breaks, 2);
        assert_eq!(stats.skipped, 0);
        assert_eq!(stats.focus_by_task.get(&TaskId::new("write")), Some(&2));
    }

    #[test]
    fn test_skipped_focus_counts_but_adds_no_minutes() {
        let records = vec![done(Phase::Focus, 25, None)];
        let skipped: HashSet<_> = records.iter().map(|r| r.id.clone()).collect();
        let stats = QuickStats::from_records(&records, &skipped);

        assert_eq!(stats.completed_focus, 1);
        assert_eq!(stats.focus_minutes, 0);
        assert_eq!(stats.skipped, 1);
    }
}
