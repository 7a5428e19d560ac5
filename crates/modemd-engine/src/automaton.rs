//! Cellular connection automaton.
//!
//! The top-level state machine. It consumes events from the bounded channel
//! (one dedicated task, see [`crate::task`]), drives the command sequencer
//! through the [`CellularService`], and owns the retry counters and NFMC
//! tempo table.
//!
//! Transition policy: every state accepts an explicit set of events; any
//! other event is logged and leaves the state unchanged. Each failure path
//! increments a cause-specific counter and the global counter; below both
//! ceilings the automaton recovers through `Reset`, at either ceiling it
//! enters the terminal `Fail` state and reports a fatal fault.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use modemd_common::{
    Event, ExternalCommand, Lifecycle, ModemNotification, PdnConfig, RecordPayload, SignalQuality,
    StateStore, StoreKey, TargetState, TimerId, TimerService,
};

use crate::config::EngineConfig;
use crate::nfmc::{NfmcTempos, TEMPO_SLOTS};
use crate::sequencer::{ServiceId, SidFailure, SidInputs};
use crate::service::CellularService;

/// Re-poll interval while waiting for a usable signal level.
const SIGNAL_POLL: Duration = Duration::from_secs(5);
/// How often the transport is drained for URCs while waiting for network
/// registration. Between exchanges nothing else reads the transport, so a
/// registration URC would otherwise sit unread until the watchdog fires.
const URC_POLL: Duration = Duration::from_secs(2);
/// How long one unsolicited drain may hold the modem lock.
const URC_WINDOW: Duration = Duration::from_millis(100);
/// Delayed-retry fallback when NFMC is disabled or unseeded.
const RETRY_FALLBACK: Duration = Duration::from_secs(60);

// ============================================================================
// State and Context
// ============================================================================

/// Automaton states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellState {
    /// Created, nothing started yet.
    Boot,
    /// Probing the modem and configuring the link.
    Init,
    /// Recovering from a failure: power off, then re-init.
    Reset,
    /// Modem alive, checking the SIM.
    On,
    /// Modem powered without SIM/network bring-up (firmware update, SIM
    /// provisioning).
    PowerOnOnly,
    /// SIM ready; branching on the requested target state.
    PoweredOn,
    /// Radio on, waiting for a usable signal level.
    WaitingSignal,
    /// Waiting for network registration under a watchdog.
    WaitingNetwork,
    /// Registered; ensuring packet attach.
    NetworkOk,
    /// Attached; defining the PDN context.
    Registered,
    /// Activating the PDN context.
    PdnActivating,
    /// Data connection up. Steady state.
    DataReady,
    /// Modem powered off on request.
    Off,
    /// Modem and SIM usable, network deliberately not brought up.
    SimOnly,
    /// Modem firmware update in progress.
    Reprogramming,
    /// Registration watchdog expired; delayed retry scheduled.
    NetworkStatusFail,
    /// Low-power idle (only if enabled).
    PowerIdle,
    /// Terminal: retry ceilings exhausted.
    Fail,
}

/// Failure causes tracked by per-cause retry counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailCause {
    PowerOn,
    Reset,
    Sim,
    Network,
    Attach,
    Pdn,
}

/// Retry counters. Monotonic within a power cycle; reset only on entering
/// `DataReady`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryCounters {
    pub power_on: u32,
    pub reset: u32,
    pub sim: u32,
    pub network: u32,
    pub attach: u32,
    pub pdn: u32,
    pub global: u32,
}

/// The automaton's mutable state. Exactly one instance, touched only on the
/// automaton task.
#[derive(Debug, Clone)]
pub struct AutomatonContext {
    pub state: CellState,
    pub last_fail_cause: Option<FailCause>,
    pub counters: RetryCounters,
    /// NFMC tempos, computed once the SIM identity is known.
    pub nfmc: Option<NfmcTempos>,
    /// Next tempo slot for delayed registration retries.
    pub register_tempo_index: usize,
    /// Next tempo slot for delayed PDN activation retries.
    pub pdn_tempo_index: usize,
    /// SIM slot currently in use.
    pub active_sim_slot: usize,
    /// Slots tried since the last successful SIM check.
    pub sim_slots_tried: usize,
    pub target: TargetState,
    pub low_power_enabled: bool,
}

impl AutomatonContext {
    fn new(config: &EngineConfig) -> Self {
        AutomatonContext {
            state: CellState::Boot,
            last_fail_cause: None,
            counters: RetryCounters::default(),
            nfmc: None,
            register_tempo_index: 0,
            pdn_tempo_index: 0,
            active_sim_slot: 0,
            sim_slots_tried: 0,
            target: config.target,
            low_power_enabled: config.low_power_enabled,
        }
    }
}

/// Fatal fault reported when the automaton enters `Fail`.
#[derive(Debug, Clone, Copy)]
pub struct FatalFault {
    pub cause: Option<FailCause>,
    pub counters: RetryCounters,
}

/// Sink invoked exactly once per entry into `Fail`.
pub type FatalSink = Box<dyn Fn(&FatalFault) + Send>;

// ============================================================================
// Automaton
// ============================================================================

pub struct Automaton {
    ctx: AutomatonContext,
    config: EngineConfig,
    service: Arc<CellularService>,
    store: Arc<StateStore>,
    timers: TimerService,
    fatal: Option<FatalSink>,
}

impl Automaton {
    pub fn new(
        config: EngineConfig,
        service: Arc<CellularService>,
        store: Arc<StateStore>,
        timers: TimerService,
    ) -> Self {
        let ctx = AutomatonContext::new(&config);
        Automaton {
            ctx,
            config,
            service,
            store,
            timers,
            fatal: None,
        }
    }

    /// Install the fatal-fault sink.
    pub fn set_fatal_sink(&mut self, sink: FatalSink) {
        self.fatal = Some(sink);
    }

    pub fn state(&self) -> CellState {
        self.ctx.state
    }

    pub fn context(&self) -> &AutomatonContext {
        &self.ctx
    }

    /// Kick off the connection sequence according to the configured target.
    pub fn start(&mut self) {
        match self.ctx.target {
            TargetState::Off => self.goto(CellState::Off),
            TargetState::SimOnly | TargetState::Full => self.goto(CellState::Init),
        }
    }

    /// Consume one event. Events outside the current state's accepted set
    /// are logged and leave the state unchanged.
    pub fn handle_event(&mut self, event: Event) {
        use CellState as S;
        use ExternalCommand as X;
        use ModemNotification as N;

        // Firmware updates preempt everything except the terminal state.
        if event == Event::Command(X::FirmwareUpdate(true)) {
            if !matches!(self.ctx.state, S::Fail | S::Reprogramming) {
                self.goto(S::Reprogramming);
            }
            return;
        }

        match (self.ctx.state, event) {
            // --- lifecycle commands ---
            (S::Boot | S::Off, Event::Command(X::RadioOn)) => self.goto(S::Init),
            (S::Boot | S::Off, Event::Command(X::PowerOnModemOnly)) => self.goto(S::PowerOnOnly),
            (_, Event::Command(X::SetTargetState(target))) => self.apply_target(target),
            (_, Event::StoreChange(StoreKey::TargetState)) => {
                if let Some(record) = self.store.read(StoreKey::TargetState) {
                    if let RecordPayload::TargetState(target) = record.payload {
                        self.apply_target(target);
                    }
                }
            }
            (_, Event::StoreChange(StoreKey::ApnConfig)) => {
                if let Some(record) = self.store.read(StoreKey::ApnConfig) {
                    if let RecordPayload::ApnConfig(pdn) = record.payload {
                        self.apply_apn(pdn);
                    }
                }
            }
            (_, Event::StoreChange(StoreKey::PowerConfig)) => {
                if let Some(record) = self.store.read(StoreKey::PowerConfig) {
                    if let RecordPayload::PowerConfig { low_power_enabled } = record.payload {
                        self.ctx.low_power_enabled = low_power_enabled;
                    }
                }
            }

            // --- signal polling ---
            (S::WaitingSignal, Event::Timer(TimerId::Polling)) => {
                self.timers.acknowledge(TimerId::Polling);
                self.goto(S::WaitingSignal);
            }
            (S::DataReady, Event::Timer(TimerId::Polling)) => {
                self.refresh_signal();
                self.timers.acknowledge(TimerId::Polling);
            }
            (S::WaitingNetwork, Event::Timer(TimerId::Polling)) => {
                if let Err(e) = self.service.poll_unsolicited(URC_WINDOW) {
                    warn!(error = %e, "unsolicited drain failed");
                }
                self.timers.acknowledge(TimerId::Polling);
            }

            // --- registration ---
            (S::WaitingNetwork, Event::Modem(N::RegistrationChanged(bearer, state))) => {
                self.service.note_registration(bearer, state);
                self.publish_network_status();
                if state.is_registered() {
                    self.timers.cancel(TimerId::NetworkStatus);
                    self.timers.cancel(TimerId::Polling);
                    self.goto(S::NetworkOk);
                }
            }
            (S::WaitingNetwork, Event::Timer(TimerId::NetworkStatus)) => {
                self.goto(S::NetworkStatusFail);
            }
            (S::NetworkStatusFail, Event::Timer(TimerId::Register)) => self.goto(S::Reset),
            (S::DataReady, Event::Modem(N::RegistrationChanged(bearer, state))) => {
                self.service.note_registration(bearer, state);
                self.publish_network_status();
                if !state.is_registered() {
                    warn!(?bearer, ?state, "registration lost");
                    self.goto(S::WaitingNetwork);
                }
            }

            // --- PDN ---
            (S::PdnActivating, Event::Timer(TimerId::Pdn)) => self.goto(S::PdnActivating),
            (S::DataReady, Event::Modem(N::PdnDeactivated(cid))) => {
                warn!(cid, "PDN deactivated by network");
                self.goto(S::PdnActivating);
            }

            // --- modem-level notifications ---
            (
                S::On
                | S::PoweredOn
                | S::WaitingSignal
                | S::WaitingNetwork
                | S::NetworkOk
                | S::Registered
                | S::PdnActivating
                | S::DataReady
                | S::SimOnly,
                Event::Modem(N::SimRemoved),
            ) => {
                warn!("SIM removed");
                if let Some(next) = self.fail_with(FailCause::Sim) {
                    self.goto(next);
                }
            }
            (
                S::PoweredOn
                | S::WaitingSignal
                | S::WaitingNetwork
                | S::NetworkOk
                | S::Registered
                | S::PdnActivating
                | S::DataReady,
                Event::Modem(N::ModemReady),
            ) => {
                // Unsolicited boot banner mid-session means the modem
                // restarted under us.
                warn!("unexpected modem reboot");
                self.goto(S::Reset);
            }
            (_, Event::Modem(N::SignalChanged(quality))) => self.publish_signal(quality),

            // --- low power ---
            (S::DataReady, Event::Command(X::SleepRequest)) if self.ctx.low_power_enabled => {
                self.goto(S::PowerIdle);
            }
            (S::PowerIdle, Event::Command(X::WakeRequest)) => self.goto(S::DataReady),

            // --- firmware update done ---
            (S::Reprogramming, Event::Command(X::FirmwareUpdate(false))) => self.goto(S::Reset),

            // Everything else is outside the accepted set: log, stay put.
            (state, event) => {
                debug!(?state, ?event, "event not accepted in state, ignored");
            }
        }
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    fn goto(&mut self, mut next: CellState) {
        loop {
            let prev = self.ctx.state;
            if prev == CellState::DataReady && next != CellState::DataReady {
                self.timers.cancel(TimerId::Polling);
                self.service.set_data_ready(false);
            }
            info!(from = ?prev, to = ?next, "state transition");
            self.ctx.state = next;
            self.publish_cellular_info();
            match self.on_enter(next) {
                Some(further) => next = further,
                None => return,
            }
        }
    }

    /// Entry action of a state. Returns the state to chain into, if the
    /// entry action decided one synchronously.
    fn on_enter(&mut self, state: CellState) -> Option<CellState> {
        use CellState as S;
        match state {
            S::Boot => None,
            S::Init => self.enter_init(FailCause::PowerOn),
            S::Reset => self.enter_reset(),
            S::On => self.enter_on(),
            S::PowerOnOnly => self.enter_power_on_only(),
            S::PoweredOn => self.enter_powered_on(),
            S::WaitingSignal => self.enter_waiting_signal(),
            S::WaitingNetwork => self.enter_waiting_network(),
            S::NetworkOk => self.enter_network_ok(),
            S::Registered => self.enter_registered(),
            S::PdnActivating => self.enter_pdn_activating(),
            S::NetworkStatusFail => self.enter_network_status_fail(),
            S::DataReady => self.enter_data_ready(),
            S::Off => self.enter_off(),
            S::SimOnly => None,
            S::Reprogramming => {
                self.cancel_retry_timers();
                None
            }
            S::PowerIdle => {
                self.timers.cancel(TimerId::Polling);
                None
            }
            S::Fail => self.enter_fail(),
        }
    }

    fn enter_init(&mut self, cause: FailCause) -> Option<CellState> {
        match self.run(ServiceId::InitModem, SidInputs::default()) {
            Ok(()) => Some(CellState::On),
            Err(_) => self.fail_with(cause),
        }
    }

    fn enter_reset(&mut self) -> Option<CellState> {
        self.cancel_retry_timers();
        // Abort-and-retry-from-scratch: power down whatever state the modem
        // is in, then re-run init.
        let _ = self.run(ServiceId::PowerOff, SidInputs::default());
        self.enter_init(FailCause::Reset)
    }

    fn enter_on(&mut self) -> Option<CellState> {
        let pin = self
            .config
            .sim_slots
            .get(self.ctx.active_sim_slot)
            .and_then(|slot| slot.pin.clone());
        let inputs = SidInputs {
            pin,
            ..Default::default()
        };
        match self.run(ServiceId::CheckSim, inputs) {
            Ok(()) => {
                self.ctx.sim_slots_tried = 0;
                Some(CellState::PoweredOn)
            }
            Err(Some(SidFailure::SimNotInserted)) => {
                self.ctx.sim_slots_tried += 1;
                if self.ctx.sim_slots_tried < self.config.sim_slots.len() {
                    let next_slot = (self.ctx.active_sim_slot + 1) % self.config.sim_slots.len();
                    info!(
                        from = self.ctx.active_sim_slot,
                        to = next_slot,
                        "no SIM, switching slot"
                    );
                    self.ctx.active_sim_slot = next_slot;
                    Some(CellState::On)
                } else {
                    self.ctx.sim_slots_tried = 0;
                    self.fail_with(FailCause::Sim)
                }
            }
            Err(_) => self.fail_with(FailCause::Sim),
        }
    }

    fn enter_power_on_only(&mut self) -> Option<CellState> {
        match self.run(ServiceId::InitModem, SidInputs::default()) {
            Ok(()) => None,
            Err(_) => self.fail_with(FailCause::PowerOn),
        }
    }

    fn enter_powered_on(&mut self) -> Option<CellState> {
        match self.ctx.target {
            TargetState::Off => Some(CellState::Off),
            TargetState::SimOnly => Some(CellState::SimOnly),
            TargetState::Full => {
                // Identity read seeds NFMC; a failure here degrades the
                // backoff, not the connection.
                if self.run(ServiceId::DeviceInfo, SidInputs::default()).is_err() {
                    warn!("device identity read failed, NFMC unseeded");
                }
                if self.config.nfmc.enabled {
                    let identity = self.service.facts().sim_identity();
                    self.ctx.nfmc = Some(NfmcTempos::compute(identity, &self.config.nfmc.bases));
                }
                match self.run(ServiceId::RadioOn, SidInputs::default()) {
                    Ok(()) => Some(CellState::WaitingSignal),
                    Err(_) => self.fail_with(FailCause::PowerOn),
                }
            }
        }
    }

    fn enter_waiting_signal(&mut self) -> Option<CellState> {
        match self.service.read_signal_quality() {
            Ok(quality) if quality.is_known() => {
                self.publish_signal(quality);
                Some(CellState::WaitingNetwork)
            }
            Ok(_) => {
                self.timers.start_oneshot(TimerId::Polling, SIGNAL_POLL);
                None
            }
            Err(_) => self.fail_with(FailCause::PowerOn),
        }
    }

    fn enter_waiting_network(&mut self) -> Option<CellState> {
        match self.run(ServiceId::Register, SidInputs::default()) {
            Ok(()) => {
                self.publish_network_status();
                if self.service.facts().is_registered() {
                    Some(CellState::NetworkOk)
                } else {
                    self.timers
                        .start_oneshot(TimerId::NetworkStatus, self.config.network_status_timeout());
                    // Keep the transport drained so the registration URC can
                    // reach us before the watchdog does.
                    self.timers.start_periodic(TimerId::Polling, URC_POLL);
                    None
                }
            }
            Err(_) => self.fail_with(FailCause::Network),
        }
    }

    fn enter_network_ok(&mut self) -> Option<CellState> {
        match self.run(ServiceId::Attach, SidInputs::default()) {
            Ok(()) => Some(CellState::Registered),
            Err(_) => self.fail_with(FailCause::Attach),
        }
    }

    fn enter_registered(&mut self) -> Option<CellState> {
        let inputs = SidInputs {
            pdn: Some(self.config.pdn.clone()),
            ..Default::default()
        };
        match self.run(ServiceId::PdnDefine, inputs) {
            Ok(()) => Some(CellState::PdnActivating),
            Err(_) => self.fail_with(FailCause::Pdn),
        }
    }

    fn enter_pdn_activating(&mut self) -> Option<CellState> {
        let inputs = SidInputs {
            pdn: Some(self.config.pdn.clone()),
            ..Default::default()
        };
        match self.run(ServiceId::PdnActivate, inputs) {
            Ok(()) => Some(CellState::DataReady),
            Err(_) => self.pdn_failure(),
        }
    }

    fn enter_data_ready(&mut self) -> Option<CellState> {
        // The only point where retry counters reset.
        self.ctx.counters = RetryCounters::default();
        self.ctx.last_fail_cause = None;
        self.service.set_data_ready(true);
        self.publish_cellular_info();
        self.publish_network_status();
        self.timers
            .start_periodic(TimerId::Polling, self.config.polling_period());
        None
    }

    fn enter_off(&mut self) -> Option<CellState> {
        self.cancel_retry_timers();
        let _ = self.run(ServiceId::PowerOff, SidInputs::default());
        self.publish_cellular_info();
        None
    }

    fn enter_fail(&mut self) -> Option<CellState> {
        self.cancel_retry_timers();
        self.service.set_data_ready(false);
        self.publish_cellular_info();
        let fault = FatalFault {
            cause: self.ctx.last_fail_cause,
            counters: self.ctx.counters,
        };
        warn!(?fault, "retry ceilings exhausted");
        if let Some(sink) = &self.fatal {
            sink(&fault);
        }
        None
    }

    /// Registration watchdog expired: power down and schedule a delayed
    /// retry on an NFMC tempo instead of retrying immediately.
    fn enter_network_status_fail(&mut self) -> Option<CellState> {
        self.timers.cancel(TimerId::Polling);
        self.ctx.last_fail_cause = Some(FailCause::Network);
        self.ctx.counters.network += 1;
        self.ctx.counters.global += 1;
        if self.ctx.counters.network >= self.config.ceilings.network
            || self.ctx.counters.global >= self.config.ceilings.global
        {
            return Some(CellState::Fail);
        }
        let _ = self.run(ServiceId::PowerOff, SidInputs::default());
        let delay = self.next_register_tempo();
        info!(delay_secs = delay.as_secs(), "registration retry scheduled");
        self.timers.start_oneshot(TimerId::Register, delay);
        None
    }

    // ------------------------------------------------------------------
    // Failure accounting
    // ------------------------------------------------------------------

    /// Account one failure. Below both ceilings the automaton recovers via
    /// `Reset`; at either ceiling it is done.
    fn fail_with(&mut self, cause: FailCause) -> Option<CellState> {
        self.ctx.last_fail_cause = Some(cause);
        let ceilings = &self.config.ceilings;
        let counters = &mut self.ctx.counters;
        counters.global += 1;
        let (count, ceiling) = match cause {
            FailCause::PowerOn => {
                counters.power_on += 1;
                (counters.power_on, ceilings.power_on)
            }
            FailCause::Reset => {
                counters.reset += 1;
                (counters.reset, ceilings.reset)
            }
            FailCause::Sim => {
                counters.sim += 1;
                (counters.sim, ceilings.sim)
            }
            FailCause::Network => {
                counters.network += 1;
                (counters.network, ceilings.network)
            }
            FailCause::Attach => {
                counters.attach += 1;
                (counters.attach, ceilings.attach)
            }
            FailCause::Pdn => {
                counters.pdn += 1;
                (counters.pdn, ceilings.pdn)
            }
        };
        warn!(?cause, count, ceiling, global = counters.global, "failure");
        if count < ceiling && counters.global < ceilings.global {
            Some(CellState::Reset)
        } else {
            Some(CellState::Fail)
        }
    }

    /// PDN activation failure: delayed in-place retry through the NFMC
    /// tempos rather than a full reset. Reaching either ceiling ends the
    /// power cycle like any other failure cause.
    fn pdn_failure(&mut self) -> Option<CellState> {
        self.ctx.last_fail_cause = Some(FailCause::Pdn);
        self.ctx.counters.pdn += 1;
        self.ctx.counters.global += 1;
        if self.ctx.counters.pdn >= self.config.ceilings.pdn
            || self.ctx.counters.global >= self.config.ceilings.global
        {
            return Some(CellState::Fail);
        }
        let delay = self.next_pdn_tempo();
        info!(delay_secs = delay.as_secs(), "PDN retry scheduled");
        self.timers.start_oneshot(TimerId::Pdn, delay);
        None
    }

    fn next_register_tempo(&mut self) -> Duration {
        match self.ctx.nfmc {
            Some(tempos) if self.config.nfmc.enabled => {
                let delay = tempos.slot(self.ctx.register_tempo_index);
                self.ctx.register_tempo_index = (self.ctx.register_tempo_index + 1) % TEMPO_SLOTS;
                Duration::from_secs(delay)
            }
            _ => RETRY_FALLBACK,
        }
    }

    fn next_pdn_tempo(&mut self) -> Duration {
        match self.ctx.nfmc {
            Some(tempos) if self.config.nfmc.enabled => {
                let delay = tempos.slot(self.ctx.pdn_tempo_index);
                self.ctx.pdn_tempo_index = (self.ctx.pdn_tempo_index + 1) % TEMPO_SLOTS;
                Duration::from_secs(delay)
            }
            _ => RETRY_FALLBACK,
        }
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    /// Run one service request; `Err` carries the typed failure, `Err(None)`
    /// a transport-level abort.
    fn run(&mut self, sid: ServiceId, inputs: SidInputs) -> Result<(), Option<SidFailure>> {
        match self.service.run_sid(sid, &inputs) {
            Ok(report) => match report.failure {
                None => Ok(()),
                Some(failure) => Err(Some(failure)),
            },
            Err(e) => {
                warn!(request = sid.request_tag(), error = %e, "transport failure");
                Err(None)
            }
        }
    }

    fn refresh_signal(&mut self) {
        match self.service.read_signal_quality() {
            Ok(quality) => self.publish_signal(quality),
            Err(e) => warn!(error = %e, "signal refresh failed"),
        }
    }

    fn apply_target(&mut self, target: TargetState) {
        use CellState as S;
        if target == self.ctx.target && !matches!(self.ctx.state, S::Boot) {
            return;
        }
        info!(?target, "target state changed");
        self.ctx.target = target;
        match (self.ctx.state, target) {
            (S::Fail | S::Reprogramming, _) => {}
            (S::Off | S::Boot, TargetState::Off) => {}
            (S::Off | S::Boot, _) => self.goto(S::Init),
            (_, TargetState::Off) => self.goto(S::Off),
            (S::SimOnly, TargetState::Full) => self.goto(S::PoweredOn),
            (_, TargetState::SimOnly) => self.goto(S::Reset),
            _ => {}
        }
    }

    fn apply_apn(&mut self, pdn: PdnConfig) {
        if pdn == self.config.pdn {
            return;
        }
        info!(apn = %pdn.apn, cid = pdn.cid, "APN reconfigured");
        self.config.pdn = pdn;
        if matches!(
            self.ctx.state,
            CellState::Registered | CellState::PdnActivating | CellState::DataReady
        ) {
            // Re-define and re-activate with the new context.
            self.goto(CellState::Registered);
        }
    }

    fn cancel_retry_timers(&mut self) {
        for id in [
            TimerId::Polling,
            TimerId::NetworkStatus,
            TimerId::Register,
            TimerId::Pdn,
        ] {
            self.timers.cancel(id);
        }
    }

    // ------------------------------------------------------------------
    // Publishing
    // ------------------------------------------------------------------

    fn lifecycle(&self) -> Lifecycle {
        use CellState as S;
        match self.ctx.state {
            S::Boot => Lifecycle::Unavailable,
            S::Off | S::PowerIdle => Lifecycle::Off,
            S::Fail => Lifecycle::Failed,
            S::DataReady | S::SimOnly => Lifecycle::On,
            _ => Lifecycle::Running,
        }
    }

    fn publish_cellular_info(&self) {
        let facts = self.service.facts();
        self.store.publish(
            StoreKey::CellularInfo,
            self.lifecycle(),
            RecordPayload::CellularInfo {
                sim: facts.sim,
                identity: facts.identity,
                data_ready: facts.data_ready,
            },
        );
    }

    fn publish_signal(&self, quality: SignalQuality) {
        self.store.publish(
            StoreKey::SignalInfo,
            self.lifecycle(),
            RecordPayload::SignalInfo(quality),
        );
    }

    fn publish_network_status(&self) {
        let facts = self.service.facts();
        self.store.publish(
            StoreKey::NetworkStatus,
            self.lifecycle(),
            RecordPayload::NetworkStatus {
                cs: facts.registration(modemd_common::Bearer::Circuit),
                ps: facts.registration(modemd_common::Bearer::Packet),
                eps: facts.registration(modemd_common::Bearer::Eps),
            },
        );
    }
}
