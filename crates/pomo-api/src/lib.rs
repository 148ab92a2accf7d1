//! Shared types for the pomod timer
//!
//! This crate defines the stable model between the engine and its consumers:
//! - Phases and session records
//! - Observable timer snapshots
//! - Events (engine -> observers)
//! - The textual command surface

mod commands;
mod events;
mod types;

pub use commands::*;
pub use events::*;
pub use types::*;

/// Current API version
pub const API_VERSION: u32 = 1;
