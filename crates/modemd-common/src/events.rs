//! Events carried to the connection automaton task.
//!
//! All coordination with the automaton goes through a single bounded
//! multi-producer/single-consumer channel. Producers (timer service, URC
//! sink, state store subscriptions, external callers) only ever post events;
//! they never touch automaton state directly.

use crossbeam_channel::{Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};

use crate::types::{Bearer, RegistrationState, SignalQuality};
use crate::StoreKey;

/// Default capacity of the automaton event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 16;

// ============================================================================
// Event Types
// ============================================================================

/// Timer identifiers used by the automaton.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerId {
    /// Periodic signal-quality polling.
    Polling,
    /// Network registration watchdog (armed in the waiting-network state).
    NetworkStatus,
    /// Delayed registration retry scheduled from an NFMC tempo.
    Register,
    /// Delayed PDN activation retry scheduled from an NFMC tempo.
    Pdn,
}

/// Requested top-level service state, set by the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetState {
    /// Modem powered off.
    Off,
    /// Modem on, SIM usable, no network registration.
    SimOnly,
    /// Fully attached with an active data connection.
    Full,
}

/// Commands posted by external collaborators (CLI, low-power glue, setup).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalCommand {
    /// Bring the radio up and run the full connection sequence.
    RadioOn,
    /// Power the modem on without registering (firmware update, SIM access).
    PowerOnModemOnly,
    /// Change the requested target state.
    SetTargetState(TargetState),
    /// Low-power entry request.
    SleepRequest,
    /// Low-power exit request.
    WakeRequest,
    /// Modem firmware update started (`true`) or finished (`false`).
    FirmwareUpdate(bool),
}

/// Normalized modem notification derived from an unsolicited result code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModemNotification {
    /// Registration state changed on a bearer.
    RegistrationChanged(Bearer, RegistrationState),
    /// Modem signalled it (re)booted.
    ModemReady,
    /// SIM was removed from the active slot.
    SimRemoved,
    /// Signal quality report.
    SignalChanged(SignalQuality),
    /// PDN context was deactivated by the network.
    PdnDeactivated(u8),
}

/// An event consumed (exactly once) by the automaton task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Unsolicited modem notification, forwarded by the protocol engine.
    Modem(ModemNotification),
    /// A subscribed state-store key changed.
    StoreChange(StoreKey),
    /// A timer fired.
    Timer(TimerId),
    /// External command from a collaborator.
    Command(ExternalCommand),
}

// ============================================================================
// Event Channel
// ============================================================================

/// Sending half of the automaton event channel.
pub type EventSender = Sender<Event>;

/// Receiving half of the automaton event channel.
pub type EventReceiver = Receiver<Event>;

/// Create the bounded automaton event channel.
pub fn event_channel() -> (EventSender, EventReceiver) {
    crossbeam_channel::bounded(EVENT_CHANNEL_CAPACITY)
}

/// Post an event without blocking.
///
/// Returns `false` if the channel is full or disconnected. Producers must not
/// block (some run in timer or completion contexts), so a full channel drops
/// the event and the condition is logged by the caller.
pub fn post_event(tx: &EventSender, event: Event) -> bool {
    match tx.try_send(event) {
        Ok(()) => true,
        Err(TrySendError::Full(e)) => {
            log::warn!("event channel full, dropping {:?}", e);
            false
        }
        Err(TrySendError::Disconnected(_)) => false,
    }
}
