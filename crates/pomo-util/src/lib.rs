//! Shared utilities for pomod
//!
//! This crate provides:
//! - ID types (SessionId, TaskId, UserId)
//! - Wall-clock time with a debug-only mock override, countdown formatting
//! - Default paths for config and data directories

mod ids;
mod paths;
mod time;

pub use ids::*;
pub use paths::*;
pub use time::*;
