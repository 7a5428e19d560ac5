//! Cellular service: the locked front door to the modem.
//!
//! All exchanges funnel through one coarse mutex around the exchanger and
//! the facts it feeds, so at most one transaction is in flight and the facts
//! can never be observed mid-update. A second, separate mutex provides the
//! resource window: callers that need several requests to run back-to-back
//! without interleaving take the window for the whole sequence.

use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, warn};

use modemd_at::{AtExchanger, AtResult, CommandSet};
use modemd_common::{DeviceIdentity, SignalQuality};

use crate::error::{EngineError, EngineResult};
use crate::facts::ModemFacts;
use crate::sequencer::{run_sid, ServiceId, SidInputs, SidReport};

/// Largest payload one socket-receive request may ask for. Requests beyond
/// this are clamped, matching the scanner's capture buffer.
pub const RECEIVE_CAPACITY: usize = 1500;

struct ModemCore {
    exchanger: AtExchanger,
    facts: ModemFacts,
}

/// Shared handle to the modem.
pub struct CellularService {
    core: Mutex<ModemCore>,
    window: Mutex<()>,
    set: CommandSet,
}

impl CellularService {
    /// Wrap an exchanger with its vendor command set.
    pub fn new(exchanger: AtExchanger, set: CommandSet) -> Self {
        CellularService {
            core: Mutex::new(ModemCore {
                exchanger,
                facts: ModemFacts::default(),
            }),
            window: Mutex::new(()),
            set,
        }
    }

    /// Run one service request and fold its results into the facts.
    pub fn run_sid(&self, sid: ServiceId, inputs: &SidInputs) -> AtResult<SidReport> {
        let mut core = self.core.lock();
        let report = run_sid(&mut core.exchanger, &self.set, sid, inputs)?;
        if report.is_success() {
            Self::apply_report(&mut core.facts, sid, &report);
        } else {
            debug!(request = sid.request_tag(), failure = ?report.failure, "request failed");
        }
        Ok(report)
    }

    /// Run `f` with exclusive use of the modem across multiple requests.
    ///
    /// Only the window is held here; each inner request still takes the core
    /// lock itself, so URC polling from other threads stays impossible while
    /// a request runs but the window owner can interleave its own logic.
    pub fn with_window<R>(&self, f: impl FnOnce(&Self) -> R) -> R {
        let _window = self.window.lock();
        f(self)
    }

    /// Snapshot of the current facts.
    pub fn facts(&self) -> ModemFacts {
        self.core.lock().facts.clone()
    }

    /// Mark the data connection up or down.
    pub fn set_data_ready(&self, ready: bool) {
        self.core.lock().facts.data_ready = ready;
    }

    /// Fold an unsolicited registration report into the facts.
    pub fn note_registration(
        &self,
        bearer: modemd_common::Bearer,
        state: modemd_common::RegistrationState,
    ) {
        self.core.lock().facts.registration.insert(bearer, state);
    }

    /// Read and return signal quality.
    pub fn read_signal_quality(&self) -> EngineResult<SignalQuality> {
        let report = self.run_sid(ServiceId::SignalQuality, &SidInputs::default())?;
        report
            .parsed
            .signal
            .ok_or(EngineError::Unavailable("no signal reading"))
    }

    /// Read and return the device identity strings.
    pub fn read_device_identity(&self) -> EngineResult<DeviceIdentity> {
        let report = self.run_sid(ServiceId::DeviceInfo, &SidInputs::default())?;
        if !report.is_success() {
            return Err(EngineError::RequestFailed {
                request: ServiceId::DeviceInfo.request_tag(),
                reason: format!("{:?}", report.failure),
            });
        }
        Ok(self.core.lock().facts.identity.clone())
    }

    /// Receive pending payload bytes from a socket.
    ///
    /// The requested length is clamped to [`RECEIVE_CAPACITY`] before it
    /// reaches the wire, so the modem is never asked for more than the
    /// capture buffer holds.
    pub fn socket_receive(&self, socket: u8, len: usize) -> EngineResult<Vec<u8>> {
        let clamped = len.min(RECEIVE_CAPACITY);
        if clamped < len {
            debug!(socket, len, clamped, "receive length clamped");
        }
        let inputs = SidInputs {
            socket: Some(socket),
            recv_len: Some(clamped),
            ..Default::default()
        };
        let report = self.run_sid(ServiceId::SocketReceive, &inputs)?;
        if !report.is_success() {
            return Err(EngineError::RequestFailed {
                request: ServiceId::SocketReceive.request_tag(),
                reason: format!("{:?}", report.failure),
            });
        }
        if report.parsed.payload_truncated {
            warn!(socket, "socket payload truncated to capture capacity");
        }
        report
            .parsed
            .payload
            .ok_or(EngineError::Unavailable("no payload in response"))
    }

    /// Drain unsolicited traffic for up to `window`.
    pub fn poll_unsolicited(&self, window: Duration) -> AtResult<()> {
        self.core.lock().exchanger.poll_unsolicited(window)
    }

    fn apply_report(facts: &mut ModemFacts, sid: ServiceId, report: &SidReport) {
        if let Some(sim) = report.parsed.sim {
            facts.sim = sim;
        }
        if let Some((bearer, state)) = report.parsed.registration {
            facts.registration.insert(bearer, state);
        }
        if let Some(signal) = report.parsed.signal {
            facts.signal = signal;
        }
        if let Some(attached) = report.parsed.attached {
            facts.attached = attached;
        }
        match sid {
            ServiceId::Attach => {
                // Success means attached, whether the query already said so
                // or the explicit attach step just ran.
                facts.attached = true;
            }
            ServiceId::DeviceInfo => {
                // Text lines arrive in step order.
                let mut lines = report.parsed.text.iter();
                let mut next = || lines.next().cloned().unwrap_or_default();
                facts.identity = DeviceIdentity {
                    manufacturer: next(),
                    model: next(),
                    revision: next(),
                    serial: next(),
                    iccid: next(),
                };
            }
            _ => {}
        }
    }
}
