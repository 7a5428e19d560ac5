//! Engine configuration.
//!
//! Delivered once at init and updated at runtime through the published state
//! store (APN and power-config keys translate into automaton events).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use modemd_common::{PdnConfig, TargetState};

use crate::nfmc::TEMPO_SLOTS;

/// One configured SIM slot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimSlot {
    /// PIN code, if the SIM in this slot is locked.
    pub pin: Option<String>,
}

/// NFMC (network-friendly congestion mitigation) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NfmcConfig {
    /// Whether NFMC tempos are applied to delayed retries.
    pub enabled: bool,
    /// Operator-configured base values, in seconds, one per tempo slot.
    pub bases: [u64; TEMPO_SLOTS],
}

impl Default for NfmcConfig {
    fn default() -> Self {
        NfmcConfig {
            enabled: true,
            // Spread retries over minutes to hours.
            bases: [60, 120, 240, 480, 960, 1920, 3840],
        }
    }
}

/// Retry ceilings, per failure cause plus one global ceiling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryCeilings {
    pub power_on: u32,
    pub reset: u32,
    pub sim: u32,
    pub network: u32,
    pub attach: u32,
    pub pdn: u32,
    /// Ceiling on the total failure count within one power cycle.
    pub global: u32,
}

impl Default for RetryCeilings {
    fn default() -> Self {
        RetryCeilings {
            power_on: 3,
            reset: 3,
            sim: 3,
            network: 3,
            attach: 3,
            pdn: 5,
            global: 10,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Configured SIM slots, tried in order.
    pub sim_slots: Vec<SimSlot>,
    /// PDN context to define and activate.
    pub pdn: PdnConfig,
    /// NFMC backoff configuration.
    pub nfmc: NfmcConfig,
    /// Retry ceilings.
    pub ceilings: RetryCeilings,
    /// Requested state at boot.
    pub target: TargetState,
    /// Whether the low-power side branch is enabled.
    pub low_power_enabled: bool,
    /// Registration watchdog, seconds.
    pub network_status_timeout_secs: u64,
    /// Signal-quality polling period, seconds.
    pub polling_period_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            sim_slots: vec![SimSlot::default()],
            pdn: PdnConfig::default(),
            nfmc: NfmcConfig::default(),
            ceilings: RetryCeilings::default(),
            target: TargetState::Full,
            low_power_enabled: false,
            network_status_timeout_secs: 180,
            polling_period_secs: 30,
        }
    }
}

impl EngineConfig {
    /// Registration watchdog as a duration.
    pub fn network_status_timeout(&self) -> Duration {
        Duration::from_secs(self.network_status_timeout_secs)
    }

    /// Polling period as a duration.
    pub fn polling_period(&self) -> Duration {
        Duration::from_secs(self.polling_period_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_roundtrips_through_json() {
        let config = EngineConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.sim_slots.len(), 1);
        assert_eq!(back.nfmc.bases, config.nfmc.bases);
        assert_eq!(back.ceilings.global, 10);
    }
}
