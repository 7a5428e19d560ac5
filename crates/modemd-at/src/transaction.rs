//! Transaction context.
//!
//! One [`TransactionContext`] exists if and only if a request is
//! outstanding. It is owned exclusively by the caller driving the exchange
//! (the sequencer), reset at transaction start and end, and carries both the
//! parameters command builders read and the typed scratch analyzers fill.

use modemd_common::{Bearer, PdnConfig, RegistrationState, SignalQuality, SimStatus};

use crate::error::ProtocolCause;
use crate::table::CommandId;

/// Parameters read by command builders.
#[derive(Debug, Clone, Default)]
pub struct CommandParams {
    /// SIM PIN for unlock commands.
    pub pin: Option<String>,
    /// PDN context being defined or activated.
    pub pdn: Option<PdnConfig>,
    /// Functionality level for power commands (+CFUN).
    pub cfun_level: Option<u8>,
    /// URC reporting mode for registration commands (+CEREG=).
    pub reporting_mode: Option<u8>,
    /// Attach/detach flag (+CGATT=).
    pub attach: Option<bool>,
    /// Activate/deactivate flag for PDN commands (+CGACT=).
    pub activate: Option<bool>,
    /// Socket handle for data-relay requests.
    pub socket: Option<u8>,
    /// Requested receive length, already clamped to the receive buffer.
    pub recv_len: Option<usize>,
}

/// Typed scratch filled by response analyzers during an exchange.
#[derive(Debug, Clone, Default)]
pub struct ParsedResponse {
    /// SIM status from +CPIN.
    pub sim: Option<SimStatus>,
    /// Registration state from +CEREG and friends.
    pub registration: Option<(Bearer, RegistrationState)>,
    /// Signal quality from +CSQ.
    pub signal: Option<SignalQuality>,
    /// Attach status from +CGATT.
    pub attached: Option<bool>,
    /// Plain text data lines (identity strings and similar).
    pub text: Vec<String>,
    /// Error sub-cause if the final response was an error.
    pub cause: Option<ProtocolCause>,
    /// Binary payload captured in socket-receive mode.
    pub payload: Option<Vec<u8>>,
    /// Whether a captured payload was truncated to the buffer capacity.
    pub payload_truncated: bool,
}

/// Per-request exchange state.
#[derive(Debug, Clone, Default)]
pub struct TransactionContext {
    /// Human-readable tag of the service request being executed.
    pub request: &'static str,
    /// Command currently awaiting its final response.
    pub current_command: Option<CommandId>,
    /// Whether the current step is the final step of the request.
    pub is_final_step: bool,
    /// Whether the modem echoes commands (echo lines are then filtered).
    pub echo_enabled: bool,
    /// Best-effort transactions ignore desynchronized lines instead of
    /// failing on them.
    pub best_effort: bool,
    /// Builder parameters.
    pub params: CommandParams,
    /// Analyzer output.
    pub parsed: ParsedResponse,
}

impl TransactionContext {
    /// Fresh context for a new request.
    pub fn begin(request: &'static str) -> Self {
        TransactionContext {
            request,
            ..Default::default()
        }
    }

    /// Clear per-command analyzer scratch while keeping request parameters.
    pub fn reset_parsed(&mut self) {
        self.parsed = ParsedResponse::default();
    }
}
