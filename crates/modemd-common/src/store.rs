//! Published state store.
//!
//! A small typed key→record store through which the automaton publishes
//! cellular state to the rest of the device application, and through which
//! the application requests configuration changes. Every record carries a
//! lifecycle tag so readers can distinguish "no data yet" from "failed".
//!
//! Subscribers register an event sender plus the set of keys they care
//! about; a write to a subscribed key posts [`Event::StoreChange`] to each
//! subscriber without blocking.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::events::{post_event, Event, EventSender, TargetState};
use crate::types::{Bearer, PdnConfig, RegistrationState, SignalQuality, SimStatus};

// ============================================================================
// Keys and Lifecycle
// ============================================================================

/// Keys of the published state store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKey {
    /// Overall cellular service state and device identity.
    CellularInfo,
    /// Latest signal quality reading.
    SignalInfo,
    /// Requested target state (written by the application).
    TargetState,
    /// APN / PDN configuration (written by the application).
    ApnConfig,
    /// Low-power configuration (written by the application).
    PowerConfig,
    /// Network registration status per bearer.
    NetworkStatus,
}

/// Lifecycle tag attached to every record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Lifecycle {
    /// No producer has written this key yet.
    Unavailable,
    /// The producing service is off.
    Off,
    /// The producing service is starting or transitioning.
    Running,
    /// The record is live and trustworthy.
    On,
    /// The producing service failed; the record is stale.
    Failed,
    /// The producing service is shutting down.
    ShuttingDown,
}

// ============================================================================
// Record Payloads
// ============================================================================

/// Device identity strings read from the modem.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// Manufacturer name (+CGMI).
    pub manufacturer: String,
    /// Model name (+CGMM).
    pub model: String,
    /// Firmware revision (+CGMR).
    pub revision: String,
    /// Serial number / IMEI (+CGSN).
    pub serial: String,
    /// SIM ICCID (+CCID).
    pub iccid: String,
}

/// Payload stored under a [`StoreKey`].
#[derive(Debug, Clone, PartialEq)]
pub enum RecordPayload {
    /// Overall cellular info.
    CellularInfo {
        /// Current SIM status.
        sim: SimStatus,
        /// Device identity strings.
        identity: DeviceIdentity,
        /// Whether a data connection is up.
        data_ready: bool,
    },
    /// Signal quality reading.
    SignalInfo(SignalQuality),
    /// Requested target state.
    TargetState(TargetState),
    /// APN configuration.
    ApnConfig(PdnConfig),
    /// Low-power configuration.
    PowerConfig {
        /// Whether low-power (PowerIdle) is permitted.
        low_power_enabled: bool,
    },
    /// Registration status per bearer.
    NetworkStatus {
        /// Circuit-switched registration.
        cs: RegistrationState,
        /// Packet-switched registration.
        ps: RegistrationState,
        /// EPS registration.
        eps: RegistrationState,
    },
}

impl RecordPayload {
    /// The registration state for a given bearer, if this is a
    /// `NetworkStatus` payload.
    pub fn registration(&self, bearer: Bearer) -> Option<RegistrationState> {
        match self {
            RecordPayload::NetworkStatus { cs, ps, eps } => Some(match bearer {
                Bearer::Circuit => *cs,
                Bearer::Packet => *ps,
                Bearer::Eps => *eps,
            }),
            _ => None,
        }
    }
}

/// A stored record: payload plus lifecycle tag.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Lifecycle of the producing service when this was written.
    pub lifecycle: Lifecycle,
    /// The record payload.
    pub payload: RecordPayload,
}

// ============================================================================
// Store
// ============================================================================

struct Subscriber {
    keys: Vec<StoreKey>,
    tx: EventSender,
}

#[derive(Default)]
struct StoreInner {
    records: HashMap<StoreKey, Record>,
    subscribers: Vec<Subscriber>,
}

/// The published state store.
///
/// Thread-safe; writers and readers may be on any task. Change notifications
/// are posted with a non-blocking send so a slow subscriber can never stall
/// a writer.
#[derive(Default)]
pub struct StateStore {
    inner: Mutex<StoreInner>,
}

impl StateStore {
    /// Create an empty store.
    pub fn new() -> Self {
        StateStore::default()
    }

    /// Write a record and notify subscribers of the key.
    pub fn publish(&self, key: StoreKey, lifecycle: Lifecycle, payload: RecordPayload) {
        let mut inner = self.inner.lock();
        inner.records.insert(key, Record { lifecycle, payload });
        for sub in &inner.subscribers {
            if sub.keys.contains(&key) {
                post_event(&sub.tx, Event::StoreChange(key));
            }
        }
    }

    /// Update only the lifecycle tag of an existing record.
    ///
    /// Does nothing if the key has never been written.
    pub fn set_lifecycle(&self, key: StoreKey, lifecycle: Lifecycle) {
        let mut inner = self.inner.lock();
        let changed = match inner.records.get_mut(&key) {
            Some(record) if record.lifecycle != lifecycle => {
                record.lifecycle = lifecycle;
                true
            }
            _ => false,
        };
        if changed {
            for sub in &inner.subscribers {
                if sub.keys.contains(&key) {
                    post_event(&sub.tx, Event::StoreChange(key));
                }
            }
        }
    }

    /// Read a record.
    pub fn read(&self, key: StoreKey) -> Option<Record> {
        self.inner.lock().records.get(&key).cloned()
    }

    /// Lifecycle of a key, `Unavailable` if never written.
    pub fn lifecycle(&self, key: StoreKey) -> Lifecycle {
        self.inner
            .lock()
            .records
            .get(&key)
            .map(|r| r.lifecycle)
            .unwrap_or(Lifecycle::Unavailable)
    }

    /// Subscribe to change notifications for a set of keys.
    pub fn subscribe(&self, keys: &[StoreKey], tx: EventSender) {
        self.inner.lock().subscribers.push(Subscriber {
            keys: keys.to_vec(),
            tx,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::event_channel;

    #[test]
    fn test_publish_and_read() {
        let store = StateStore::new();
        store.publish(
            StoreKey::SignalInfo,
            Lifecycle::On,
            RecordPayload::SignalInfo(SignalQuality { rssi: 20, ber: 1 }),
        );

        let record = store.read(StoreKey::SignalInfo).unwrap();
        assert_eq!(record.lifecycle, Lifecycle::On);
        assert_eq!(
            record.payload,
            RecordPayload::SignalInfo(SignalQuality { rssi: 20, ber: 1 })
        );
    }

    #[test]
    fn test_unwritten_key_is_unavailable() {
        let store = StateStore::new();
        assert_eq!(store.lifecycle(StoreKey::CellularInfo), Lifecycle::Unavailable);
        assert!(store.read(StoreKey::CellularInfo).is_none());
    }

    #[test]
    fn test_subscription_notifies_on_publish() {
        let store = StateStore::new();
        let (tx, rx) = event_channel();
        store.subscribe(&[StoreKey::TargetState], tx);

        store.publish(
            StoreKey::TargetState,
            Lifecycle::On,
            RecordPayload::TargetState(TargetState::Full),
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            Event::StoreChange(StoreKey::TargetState)
        );

        // Writes to other keys do not notify
        store.publish(
            StoreKey::SignalInfo,
            Lifecycle::On,
            RecordPayload::SignalInfo(SignalQuality::UNKNOWN),
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_set_lifecycle_notifies_once() {
        let store = StateStore::new();
        let (tx, rx) = event_channel();
        store.subscribe(&[StoreKey::SignalInfo], tx);

        store.publish(
            StoreKey::SignalInfo,
            Lifecycle::Running,
            RecordPayload::SignalInfo(SignalQuality::UNKNOWN),
        );
        let _ = rx.try_recv();

        store.set_lifecycle(StoreKey::SignalInfo, Lifecycle::Failed);
        assert_eq!(
            rx.try_recv().unwrap(),
            Event::StoreChange(StoreKey::SignalInfo)
        );

        // Same lifecycle again: no extra notification
        store.set_lifecycle(StoreKey::SignalInfo, Lifecycle::Failed);
        assert!(rx.try_recv().is_err());
    }
}
