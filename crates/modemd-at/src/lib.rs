//! # modemd-at
//!
//! AT command protocol engine for cellular modems.
//!
//! A modem speaks a textual, semi-structured protocol: commands are sent as
//! `AT<cmd><params>\r` and the modem answers with echo lines, data lines,
//! unsolicited result codes (URCs) and a final `OK`/`ERROR`. This crate turns
//! that asynchronous byte stream into typed completions:
//!
//! - [`FrameScanner`]: byte-at-a-time framing, including the nested binary
//!   payload mode used by socket receive responses
//! - [`ParseCursor`]: comma/colon field extraction over a captured line
//! - [`CommandTable`] / [`CommandDescriptor`]: ordered prefix-match dispatch
//!   with per-command builder, analyzer and timeout
//! - [`classify_line`]: final/intermediate/unsolicited/error classification
//! - [`AtExchanger`]: the blocking send-and-await-completion engine over a
//!   [`ModemTransport`]
//!
//! Per-modem-variant command tables are supplied through the
//! [`VendorPlugin`] trait; the engine itself is vendor-agnostic.

mod classify;
mod error;
mod exchange;
mod fields;
mod scanner;
mod set;
mod table;
mod transaction;

pub use classify::*;
pub use error::*;
pub use exchange::*;
pub use fields::*;
pub use scanner::*;
pub use set::*;
pub use table::*;
pub use transaction::*;
