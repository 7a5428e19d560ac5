//! # modemd-engine
//!
//! The cellular connection engine: a command sequencer that expands logical
//! service requests into branching AT command programs, a locked cellular
//! service front-end, and the 18-state connection automaton that powers on,
//! unlocks, registers, attaches and brings up a data connection with
//! per-cause retry ceilings and NFMC backoff.
//!
//! The engine is vendor-agnostic: it is wired up with a
//! [`modemd_at::VendorPlugin`] and its [`modemd_at::CommandSet`] at spawn
//! time (see [`spawn_engine`]).

pub mod automaton;
pub mod config;
pub mod error;
pub mod facts;
pub mod nfmc;
pub mod sequencer;
pub mod service;
pub mod task;

pub use automaton::{Automaton, AutomatonContext, CellState, FailCause, FatalFault, RetryCounters};
pub use config::{EngineConfig, NfmcConfig, RetryCeilings, SimSlot};
pub use error::{EngineError, EngineResult};
pub use facts::ModemFacts;
pub use nfmc::{modulo_u64, NfmcTempos, TEMPO_SLOTS};
pub use sequencer::{run_sid, ServiceId, SidFailure, SidInputs, SidReport};
pub use service::{CellularService, RECEIVE_CAPACITY};
pub use task::{spawn_engine, EngineHandle};
