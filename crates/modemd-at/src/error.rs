//! Error types for the AT protocol engine.

use std::fmt;

use thiserror::Error;

/// Errors produced by the frame scanner.
///
/// Framing errors are always fatal to the current transaction; the payload
/// wait is aborted and the scanner resets to line scanning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FrameError {
    /// A non-digit byte appeared inside a binary payload length field.
    #[error("malformed payload length field: unexpected byte {byte:#04x}")]
    MalformedLength {
        /// The offending byte.
        byte: u8,
    },

    /// A response line exceeded the scanner's buffer capacity.
    #[error("response line exceeds buffer capacity of {capacity} bytes")]
    LineOverflow {
        /// Scanner capacity in bytes.
        capacity: usize,
    },
}

/// Numeric/textual sub-cause carried by a protocol error line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolCause {
    /// Plain `ERROR` with no sub-cause.
    Generic,
    /// `+CME ERROR: <n>` mobile-equipment cause.
    Cme(u32),
    /// `+CMS ERROR: <n>` message-service cause.
    Cms(u32),
}

impl ProtocolCause {
    /// CME cause 10: SIM not inserted. Has a defined fallback path (cycle
    /// to the next SIM slot) rather than failing the whole request.
    pub fn is_sim_not_inserted(self) -> bool {
        matches!(self, ProtocolCause::Cme(10))
    }

    /// CME cause 14: SIM busy (still initializing).
    pub fn is_sim_busy(self) -> bool {
        matches!(self, ProtocolCause::Cme(14))
    }
}

impl fmt::Display for ProtocolCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolCause::Generic => write!(f, "ERROR"),
            ProtocolCause::Cme(n) => write!(f, "+CME ERROR: {}", n),
            ProtocolCause::Cms(n) => write!(f, "+CMS ERROR: {}", n),
        }
    }
}

/// Why a command exchange came back without success.
///
/// Timeout is deliberately the same shape as a protocol error: both surface
/// to the sequencer as a failed completion, never as a separate code path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCause {
    /// The modem answered `ERROR`/`+CME ERROR`/`+CMS ERROR`.
    Protocol(ProtocolCause),
    /// No final response arrived within the command's timeout.
    Timeout,
    /// A recognized line arrived that belongs to neither the pending command
    /// nor the known unsolicited set (protocol desynchronization).
    Desync,
}

/// Errors produced by the protocol engine.
#[derive(Debug, Error)]
pub enum AtError {
    /// Framing failure in the scanner.
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// The underlying byte transport failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// A command builder could not produce parameters.
    #[error("cannot build command parameters: {0}")]
    Build(String),

    /// Lookup of an unknown command id.
    #[error("unknown command id {0}")]
    UnknownCommand(u16),
}

/// Result type alias for protocol operations.
pub type AtResult<T> = Result<T, AtError>;
