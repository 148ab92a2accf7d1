//! Command surface for driving the timer
//!
//! Commands arrive either as plain text lines (`start focus`, `pause`, ...)
//! or as JSON objects (`{"command":"start","phase":"long_break"}`).

use pomo_util::TaskId;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

use crate::{Phase, UnknownPhase};

/// Commands accepted by the timer service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum TimerCommand {
    /// Start the given phase, or the queued one
    Start {
        #[serde(default)]
        phase: Option<Phase>,
    },
    Pause,
    Resume,
    Reset,
    Skip,
    /// Link focus phases to a task, or clear the link
    Task {
        #[serde(default)]
        task_id: Option<TaskId>,
    },
    Status,
    /// Quick stats for this process lifetime
    Stats,
    /// Completed sessions stored today
    History,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandParseError {
    #[error("Empty command")]
    Empty,

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error(transparent)]
    UnknownPhase(#[from] UnknownPhase),

    #[error("Unexpected argument for {command}: {argument}")]
    UnexpectedArgument { command: String, argument: String },

    #[error("Invalid JSON command: {0}")]
    Json(String),
}

impl FromStr for TimerCommand {
    type Err = CommandParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        if line.starts_with('{') {
            return serde_json::from_str(line).map_err(|e| CommandParseError::Json(e.to_string()));
        }

        let mut words = line.split_whitespace();
        let command = words.next().ok_or(CommandParseError::Empty)?.to_lowercase();
        let argument = words.next();

        let parsed = match command.as_str() {
            "start" | "s" => TimerCommand::Start {
                phase: argument.map(str::parse::<Phase>).transpose()?,
            },
            "task" | "t" => TimerCommand::Task {
                task_id: argument
                    .filter(|a| !a.eq_ignore_ascii_case("none"))
                    .map(TaskId::from),
            },
            other => {
                let simple = match other {
                    "pause" | "p" => TimerCommand::Pause,
                    "resume" | "r" => TimerCommand::Resume,
                    "reset" => TimerCommand::Reset,
                    "skip" | "n" => TimerCommand::Skip,
                    "status" | "st" => TimerCommand::Status,
                    "stats" => TimerCommand::Stats,
                    "history" => TimerCommand::History,
                    "help" | "?" => TimerCommand::Help,
                    "quit" | "exit" | "q" => TimerCommand::Quit,
                    _ => return Err(CommandParseError::UnknownCommand(other.to_string())),
                };
                if let Some(arg) = argument {
                    return Err(CommandParseError::UnexpectedArgument {
                        command: other.to_string(),
                        argument: arg.to_string(),
                    });
                }
                simple
            }
        };

        Ok(parsed)
    }
}

/// One-line usage summary for the text surface
pub const COMMAND_HELP: &str = "\
commands: start [focus|short|long], pause, resume, reset, skip, \
task <id|none>, status, stats, history, help, quit";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_start_variants() {
        assert_eq!(
            "start".parse::<TimerCommand>().unwrap(),
            TimerCommand::Start { phase: None }
        );
        assert_eq!(
            "start long".parse::<TimerCommand>().unwrap(),
            TimerCommand::Start {
                phase: Some(Phase::LongBreak)
            }
        );
        assert!(matches!(
            "start nap".parse::<TimerCommand>(),
            Err(CommandParseError::UnknownPhase(_))
        ));
    }

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!("pause".parse::<TimerCommand>().unwrap(), TimerCommand::Pause);
        assert_eq!("  RESUME ".parse::<TimerCommand>().unwrap(), TimerCommand::Resume);
        assert_eq!("skip".parse::<TimerCommand>().unwrap(), TimerCommand::Skip);
        assert!(matches!(
            "pause now".parse::<TimerCommand>(),
            Err(CommandParseError::UnexpectedArgument { .. })
        ));
        assert_eq!("".parse::<TimerCommand>(), Err(CommandParseError::Empty));
    }

    #[test]
    fn test_parse_task_link_and_clear() {
        assert_eq!(
            "task write-report".parse::<TimerCommand>().unwrap(),
            TimerCommand::Task {
                task_id: Some(TaskId::new("write-report"))
            }
        );
        assert_eq!(
            "task none".parse::<TimerCommand>().unwrap(),
            TimerCommand::Task { task_id: None }
        );
    }

    #[test]
    fn test_parse_json_command() {
        let cmd: TimerCommand = r#"{"command":"start","phase":"short_break"}"#.parse().unwrap();
        assert_eq!(
            cmd,
            TimerCommand::Start {
                phase: Some(Phase::ShortBreak)
            }
        );
        assert!(matches!(
            "{not json".parse::<TimerCommand>(),
            Err(CommandParseError::Json(_))
        ));
    }
}
