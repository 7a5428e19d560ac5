//! ModemFacts: the shared, published view of the modem.
//!
//! Read by many callers, mutated only under the service lock as responses
//! are analyzed. Lives for the process lifetime.

use std::collections::HashMap;

use modemd_common::{
    Bearer, DeviceIdentity, PdnConfig, RegistrationState, SignalQuality, SimStatus,
};

use crate::nfmc::identity_from_digits;

/// Normalized modem state derived from protocol exchanges.
#[derive(Debug, Clone)]
pub struct ModemFacts {
    /// SIM status of the active slot.
    pub sim: SimStatus,
    /// Registration state per bearer.
    pub registration: HashMap<Bearer, RegistrationState>,
    /// Last signal quality reading.
    pub signal: SignalQuality,
    /// Device identity strings.
    pub identity: DeviceIdentity,
    /// Defined PDN contexts.
    pub pdn_contexts: Vec<PdnConfig>,
    /// Packet-service attach status.
    pub attached: bool,
    /// Whether a data connection is currently up.
    pub data_ready: bool,
}

impl Default for ModemFacts {
    fn default() -> Self {
        ModemFacts {
            sim: SimStatus::Unknown,
            registration: HashMap::new(),
            signal: SignalQuality::UNKNOWN,
            identity: DeviceIdentity::default(),
            pdn_contexts: Vec::new(),
            attached: false,
            data_ready: false,
        }
    }
}

impl ModemFacts {
    /// Registration state for a bearer, `Unknown` if never reported.
    pub fn registration(&self, bearer: Bearer) -> RegistrationState {
        self.registration
            .get(&bearer)
            .copied()
            .unwrap_or(RegistrationState::Unknown)
    }

    /// Whether any bearer reports a registered state.
    pub fn is_registered(&self) -> bool {
        self.registration.values().any(|s| s.is_registered())
    }

    /// The 64-bit SIM identity used to seed NFMC tempos, derived from the
    /// ICCID digits. Zero until the identity has been read.
    pub fn sim_identity(&self) -> u64 {
        identity_from_digits(&self.identity.iccid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_unknown() {
        let facts = ModemFacts::default();
        assert_eq!(facts.sim, SimStatus::Unknown);
        assert_eq!(facts.registration(Bearer::Eps), RegistrationState::Unknown);
        assert!(!facts.is_registered());
        assert_eq!(facts.sim_identity(), 0);
    }

    #[test]
    fn test_is_registered_any_bearer() {
        let mut facts = ModemFacts::default();
        facts
            .registration
            .insert(Bearer::Packet, RegistrationState::Searching);
        assert!(!facts.is_registered());
        facts
            .registration
            .insert(Bearer::Eps, RegistrationState::Roaming);
        assert!(facts.is_registered());
    }

    #[test]
    fn test_sim_identity_from_iccid() {
        let mut facts = ModemFacts::default();
        facts.identity.iccid = "8988211234".to_string();
        assert_eq!(facts.sim_identity(), 8_988_211_234);
    }
}
