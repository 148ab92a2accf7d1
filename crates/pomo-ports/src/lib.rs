//! Side-effect port interfaces for pomod
//!
//! This crate defines the sinks the timer engine notifies on phase
//! transitions: a live status surface and a feedback pulse. It contains no
//! platform code itself.

mod mock;
mod traits;

pub use mock::*;
pub use traits::*;
