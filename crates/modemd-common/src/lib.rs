//! # modemd-common
//!
//! Shared infrastructure for the modemd cellular middleware:
//!
//! - [`Event`] and the bounded event channel consumed by the connection
//!   automaton task
//! - The published [`StateStore`] (lifecycle-tagged key→record store) used to
//!   expose cellular state to the rest of the device application
//! - The [`TimerService`] that posts [`Event::Timer`] on one-shot or periodic
//!   expiry
//! - Small domain types (SIM status, registration state, signal quality)
//!   shared between the protocol engine and the automaton

mod events;
mod store;
mod timer;
mod types;

pub use events::*;
pub use store::*;
pub use timer::*;
pub use types::*;
