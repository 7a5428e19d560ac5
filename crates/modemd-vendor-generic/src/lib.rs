//! # modemd-vendor-generic
//!
//! Reference vendor plugin for the modemd protocol engine: a generic 3GPP
//! command table with per-command builders, analyzers and timeouts, the
//! socket-receive payload marker, and the known unsolicited set.
//!
//! Real modem variants ship their own plugin crate implementing
//! [`VendorPlugin`](modemd_at::VendorPlugin) the same way; the engine never
//! hardcodes a command vocabulary.

mod handlers;
mod table;

pub use table::{GenericCommand, GenericVendor, PAYLOAD_MARKER};
