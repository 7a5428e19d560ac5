//! Error types for the engine.

use thiserror::Error;

use modemd_at::AtError;

/// Errors that can occur when driving the cellular service.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Protocol engine failure (framing, transport, build).
    #[error(transparent)]
    At(#[from] AtError),

    /// A service request failed after exhausting its defined paths.
    #[error("service request {request} failed: {reason}")]
    RequestFailed {
        /// Human-readable request tag.
        request: &'static str,
        /// Why it failed.
        reason: String,
    },

    /// The service is not in a state that can satisfy the call.
    #[error("cellular service unavailable: {0}")]
    Unavailable(&'static str),
}

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
