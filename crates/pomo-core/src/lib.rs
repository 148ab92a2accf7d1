//! Session timer engine and phase state machine for pomod
//!
//! This crate is the heart of pomod, containing:
//! - The session state machine (Idle -> Running <-> Paused -> Idle/next phase)
//! - Wall-clock elapsed accounting that survives missed ticks and suspension
//! - Phase sequencing, duration resolution, and auto-start policy
//! - The tick source abstraction
//! - Observer registration and the asynchronous persistence queue

mod engine;
mod events;
mod observers;
mod persist;
mod policy;
mod sequencer;
mod state;
mod stats;
mod tick;

pub use engine::*;
pub use events::*;
pub use observers::*;
pub use persist::*;
pub use policy::*;
pub use sequencer::*;
pub use state::*;
pub use stats::*;
pub use tick::*;
