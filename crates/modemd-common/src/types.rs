//! Domain types shared between the protocol engine and the automaton.

use serde::{Deserialize, Serialize};

/// SIM card status as reported by the modem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimStatus {
    /// Status has not been read yet.
    Unknown,
    /// SIM is ready for use.
    Ready,
    /// SIM requires the PIN code.
    PinRequired,
    /// SIM requires the PUK code.
    PukRequired,
    /// No SIM detected in the active slot.
    NotInserted,
    /// SIM is initializing and not yet usable.
    Busy,
    /// SIM reported an unrecoverable error.
    Error,
}

/// Network bearer a registration state applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Bearer {
    /// Circuit-switched (CS) domain.
    Circuit,
    /// Packet-switched (GPRS) domain.
    Packet,
    /// EPS (LTE) domain.
    Eps,
}

/// Network registration state (3GPP +CREG/+CGREG/+CEREG encoding).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistrationState {
    /// Not registered, not searching.
    NotRegistered,
    /// Registered on the home network.
    Home,
    /// Not registered, searching for a network.
    Searching,
    /// Registration was denied by the network.
    Denied,
    /// State unknown.
    Unknown,
    /// Registered, roaming.
    Roaming,
}

impl RegistrationState {
    /// Decode the numeric `<stat>` field of a registration response.
    pub fn from_stat(stat: u32) -> RegistrationState {
        match stat {
            1 => RegistrationState::Home,
            2 => RegistrationState::Searching,
            3 => RegistrationState::Denied,
            5 => RegistrationState::Roaming,
            0 => RegistrationState::NotRegistered,
            _ => RegistrationState::Unknown,
        }
    }

    /// Whether this state counts as registered for service purposes.
    pub fn is_registered(self) -> bool {
        matches!(self, RegistrationState::Home | RegistrationState::Roaming)
    }
}

/// Signal quality as reported by the modem (+CSQ encoding).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalQuality {
    /// Received signal strength indicator, 0-31, 99 = unknown.
    pub rssi: u8,
    /// Channel bit error rate, 0-7, 99 = unknown.
    pub ber: u8,
}

impl SignalQuality {
    /// Value meaning "not known or not detectable".
    pub const UNKNOWN: SignalQuality = SignalQuality { rssi: 99, ber: 99 };

    /// Whether the modem reported a usable signal level.
    pub fn is_known(&self) -> bool {
        self.rssi != 99
    }
}

/// Packet data network (APN) configuration for one PDN context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdnConfig {
    /// Context identifier (CID) used on the wire.
    pub cid: u8,
    /// Access point name.
    pub apn: String,
    /// PDP type, e.g. "IP" or "IPV4V6".
    pub pdp_type: String,
}

impl Default for PdnConfig {
    fn default() -> Self {
        PdnConfig {
            cid: 1,
            apn: String::new(),
            pdp_type: "IP".to_string(),
        }
    }
}
