//! End-to-end connection automaton tests over a scripted transport.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use modemd_at::{AtExchanger, AtResult, ModemTransport};
use modemd_common::{
    event_channel, Bearer, Event, EventReceiver, ExternalCommand, Lifecycle, ModemNotification,
    PdnConfig, RegistrationState, StateStore, StoreKey, TargetState, TimerId, TimerService,
};
use modemd_engine::{
    Automaton, CellState, CellularService, EngineConfig, FatalFault, NfmcTempos, RetryCeilings,
    SimSlot,
};
use modemd_vendor_generic::GenericVendor;

// ============================================================================
// Scripted transport
// ============================================================================

/// Bytes waiting to be read from the fake modem. Shared so tests can push
/// unsolicited traffic that no command write produced.
type RxQueue = Arc<Mutex<VecDeque<u8>>>;

struct ScriptTransport {
    script: VecDeque<(String, Vec<u8>)>,
    rx: RxQueue,
}

impl ScriptTransport {
    fn new(script: Vec<(String, Vec<u8>)>) -> Self {
        ScriptTransport {
            script: script.into(),
            rx: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    fn rx_queue(&self) -> RxQueue {
        Arc::clone(&self.rx)
    }
}

impl ModemTransport for ScriptTransport {
    fn write(&mut self, data: &[u8]) -> AtResult<()> {
        let (expected, response) = self
            .script
            .pop_front()
            .unwrap_or_else(|| panic!("unexpected write {:?}", String::from_utf8_lossy(data)));
        assert_eq!(
            String::from_utf8_lossy(data),
            expected,
            "wire mismatch at {:?}",
            expected
        );
        self.rx.lock().extend(response);
        Ok(())
    }

    fn read_byte(&mut self, _timeout: Duration) -> AtResult<Option<u8>> {
        Ok(self.rx.lock().pop_front())
    }
}

fn step(write: &str, response: &[u8]) -> (String, Vec<u8>) {
    (write.to_string(), response.to_vec())
}

// ============================================================================
// Harness
// ============================================================================

const ICCID: &str = "89882112345";

fn test_pdn() -> PdnConfig {
    PdnConfig {
        cid: 1,
        apn: "internet".to_string(),
        pdp_type: "IP".to_string(),
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn build(
    config: EngineConfig,
    script: Vec<(String, Vec<u8>)>,
) -> (Automaton, EventReceiver, Arc<StateStore>) {
    let (automaton, rx, store, _queue) = build_with_rx_queue(config, script);
    (automaton, rx, store)
}

fn build_with_rx_queue(
    config: EngineConfig,
    script: Vec<(String, Vec<u8>)>,
) -> (Automaton, EventReceiver, Arc<StateStore>, RxQueue) {
    init_tracing();
    let (tx, rx) = event_channel();
    let transport = ScriptTransport::new(script);
    let queue = transport.rx_queue();
    let mut exchanger = AtExchanger::new(Box::new(transport), Arc::new(GenericVendor::new()));
    exchanger.set_urc_sink(tx.clone());
    let service = Arc::new(CellularService::new(exchanger, GenericVendor::command_set()));
    let store = Arc::new(StateStore::new());
    let timers = TimerService::spawn(tx);
    let automaton = Automaton::new(config, service, Arc::clone(&store), timers);
    (automaton, rx, store, queue)
}

/// The command exchanges from modem init through SIM ready, identity read
/// and radio-on, assuming the SIM in the active slot answers READY.
fn bring_up_steps() -> Vec<(String, Vec<u8>)> {
    vec![
        step("AT\r", b"\r\nOK\r\n"),
        step("ATE0\r", b"\r\nOK\r\n"),
        step("AT+CPIN?\r", b"\r\n+CPIN: READY\r\n\r\nOK\r\n"),
        step("AT+CGMI\r", b"\r\nAcme Wireless\r\n\r\nOK\r\n"),
        step("AT+CGMM\r", b"\r\nAW-100\r\n\r\nOK\r\n"),
        step("AT+CGMR\r", b"\r\n01.204\r\n\r\nOK\r\n"),
        step("AT+CGSN\r", b"\r\n490154203237518\r\n\r\nOK\r\n"),
        step(
            "AT+CCID\r",
            format!("\r\n+CCID: {}\r\n\r\nOK\r\n", ICCID).as_bytes(),
        ),
        step("AT+CFUN=1\r", b"\r\nOK\r\n"),
    ]
}

/// Signal, registration and attach exchanges up to the PDN definition.
fn network_steps() -> Vec<(String, Vec<u8>)> {
    vec![
        step("AT+CSQ\r", b"\r\n+CSQ: 18,0\r\n\r\nOK\r\n"),
        step("AT+CEREG=2\r", b"\r\nOK\r\n"),
        step("AT+CEREG?\r", b"\r\n+CEREG: 2,1\r\n\r\nOK\r\n"),
        step("AT+CGATT?\r", b"\r\n+CGATT: 1\r\n\r\nOK\r\n"),
        step("AT+CGDCONT=1,\"IP\",\"internet\"\r", b"\r\nOK\r\n"),
    ]
}

/// Feed events that no state below accepts and check the state holds.
fn assert_ignored(automaton: &mut Automaton, state: CellState, events: &[Event]) {
    assert_eq!(automaton.state(), state);
    for &event in events {
        automaton.handle_event(event);
        assert_eq!(automaton.state(), state, "after {:?}", event);
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_happy_path_reaches_data_ready() {
    let mut script = bring_up_steps();
    script.extend(network_steps());
    script.push(step("AT+CGACT=1,1\r", b"\r\nOK\r\n"));

    let config = EngineConfig {
        pdn: test_pdn(),
        ..Default::default()
    };
    let (mut automaton, _rx, store) = build(config, script);
    automaton.start();

    assert_eq!(automaton.state(), CellState::DataReady);
    assert_eq!(automaton.context().counters.global, 0);

    let record = store.read(StoreKey::CellularInfo).unwrap();
    assert_eq!(record.lifecycle, Lifecycle::On);
}

#[test]
fn test_sim_absent_on_slot_zero_cycles_to_slot_one() {
    // Slot 0 reports no SIM; slot 1 carries the working card.
    let mut script = vec![
        step("AT\r", b"\r\nOK\r\n"),
        step("ATE0\r", b"\r\nOK\r\n"),
        step("AT+CPIN?\r", b"\r\n+CME ERROR: 10\r\n"),
        step("AT+CPIN?\r", b"\r\n+CPIN: READY\r\n\r\nOK\r\n"),
    ];
    script.extend(bring_up_steps().into_iter().skip(3)); // identity + radio
    script.extend(network_steps());
    script.push(step("AT+CGACT=1,1\r", b"\r\nOK\r\n"));

    let config = EngineConfig {
        sim_slots: vec![SimSlot::default(), SimSlot::default()],
        pdn: test_pdn(),
        ..Default::default()
    };
    let (mut automaton, _rx, _store) = build(config, script);
    automaton.start();

    assert_eq!(automaton.context().active_sim_slot, 1);
    assert_eq!(automaton.state(), CellState::DataReady);
}

#[test]
fn test_registration_watchdog_schedules_nfmc_retry() {
    let mut script = bring_up_steps();
    // Searching, never registered.
    script.push(step("AT+CSQ\r", b"\r\n+CSQ: 18,0\r\n\r\nOK\r\n"));
    script.push(step("AT+CEREG=2\r", b"\r\nOK\r\n"));
    script.push(step("AT+CEREG?\r", b"\r\n+CEREG: 2,2\r\n\r\nOK\r\n"));
    // NetworkStatusFail powers the modem off before scheduling the retry.
    script.push(step("AT+CPOF\r", b"\r\nOK\r\n"));

    let config = EngineConfig {
        pdn: test_pdn(),
        ..Default::default()
    };
    let bases = config.nfmc.bases;
    let (mut automaton, _rx, _store) = build(config, script);
    automaton.start();
    assert_eq!(automaton.state(), CellState::WaitingNetwork);

    automaton.handle_event(Event::Timer(TimerId::NetworkStatus));

    let ctx = automaton.context();
    assert_eq!(ctx.state, CellState::NetworkStatusFail);
    assert_eq!(ctx.counters.network, 1);
    assert_eq!(ctx.counters.global, 1);
    // Tempo slot 0 was consumed; the index advanced modulo 7.
    assert_eq!(ctx.register_tempo_index, 1);
    let identity: u64 = ICCID.parse().unwrap();
    assert_eq!(ctx.nfmc, Some(NfmcTempos::compute(identity, &bases)));
}

#[test]
fn test_unsolicited_registration_completes_waiting_network() {
    let mut script = bring_up_steps();
    script.push(step("AT+CSQ\r", b"\r\n+CSQ: 18,0\r\n\r\nOK\r\n"));
    script.push(step("AT+CEREG=2\r", b"\r\nOK\r\n"));
    // Still searching at query time; registration completes later via URC.
    script.push(step("AT+CEREG?\r", b"\r\n+CEREG: 2,2\r\n\r\nOK\r\n"));
    script.push(step("AT+CGATT?\r", b"\r\n+CGATT: 1\r\n\r\nOK\r\n"));
    script.push(step("AT+CGDCONT=1,\"IP\",\"internet\"\r", b"\r\nOK\r\n"));
    script.push(step("AT+CGACT=1,1\r", b"\r\nOK\r\n"));

    let config = EngineConfig {
        pdn: test_pdn(),
        ..Default::default()
    };
    let (mut automaton, rx, _store, queue) = build_with_rx_queue(config, script);
    automaton.start();
    assert_eq!(automaton.state(), CellState::WaitingNetwork);

    // The network registers while no command is in flight; the modem pushes
    // the report on its own and the periodic drain picks it up.
    queue.lock().extend(b"\r\n+CEREG: 1\r\n".iter());
    automaton.handle_event(Event::Timer(TimerId::Polling));

    let event = rx.try_recv().expect("registration report not posted");
    assert_eq!(
        event,
        Event::Modem(ModemNotification::RegistrationChanged(
            Bearer::Eps,
            RegistrationState::Home
        ))
    );
    automaton.handle_event(event);
    assert_eq!(automaton.state(), CellState::DataReady);
}

#[test]
fn test_pdn_retries_walk_tempo_slots_round_robin() {
    let mut script = bring_up_steps();
    script.extend(network_steps());
    // Three activation failures, then success after the third retry.
    script.push(step("AT+CGACT=1,1\r", b"\r\n+CME ERROR: 148\r\n"));
    script.push(step("AT+CGACT=1,1\r", b"\r\n+CME ERROR: 148\r\n"));
    script.push(step("AT+CGACT=1,1\r", b"\r\n+CME ERROR: 148\r\n"));
    script.push(step("AT+CGACT=1,1\r", b"\r\nOK\r\n"));

    let config = EngineConfig {
        pdn: test_pdn(),
        ..Default::default()
    };
    let (mut automaton, _rx, _store) = build(config, script);
    automaton.start();

    // First failure happened during start; slots 1 and 2 follow on each
    // retry timer, giving the 0,1,2 round-robin.
    assert_eq!(automaton.state(), CellState::PdnActivating);
    assert_eq!(automaton.context().pdn_tempo_index, 1);

    automaton.handle_event(Event::Timer(TimerId::Pdn));
    assert_eq!(automaton.context().pdn_tempo_index, 2);
    assert_eq!(automaton.context().counters.pdn, 2);

    automaton.handle_event(Event::Timer(TimerId::Pdn));
    assert_eq!(automaton.context().pdn_tempo_index, 3);
    assert_eq!(automaton.context().counters.pdn, 3);

    // Counters stayed monotonic until DataReady, which resets them.
    automaton.handle_event(Event::Timer(TimerId::Pdn));
    assert_eq!(automaton.state(), CellState::DataReady);
    assert_eq!(automaton.context().counters.pdn, 0);
    assert_eq!(automaton.context().counters.global, 0);
}

#[test]
fn test_pdn_ceiling_escalates_to_fail() {
    let mut script = bring_up_steps();
    script.extend(network_steps());
    script.push(step("AT+CGACT=1,1\r", b"\r\n+CME ERROR: 148\r\n"));
    script.push(step("AT+CGACT=1,1\r", b"\r\n+CME ERROR: 148\r\n"));

    let config = EngineConfig {
        pdn: test_pdn(),
        ceilings: RetryCeilings {
            pdn: 2,
            ..Default::default()
        },
        ..Default::default()
    };
    let (mut automaton, _rx, store) = build(config, script);
    let fault: Arc<Mutex<Option<FatalFault>>> = Arc::new(Mutex::new(None));
    let sink_fault = Arc::clone(&fault);
    automaton.set_fatal_sink(Box::new(move |f| {
        *sink_fault.lock() = Some(*f);
    }));

    automaton.start();
    assert_eq!(automaton.state(), CellState::PdnActivating);

    // The second failure reaches the PDN ceiling: Fail, not another retry.
    automaton.handle_event(Event::Timer(TimerId::Pdn));
    assert_eq!(automaton.state(), CellState::Fail);
    let fault = fault.lock().take().expect("fatal sink not invoked");
    assert_eq!(fault.counters.pdn, 2);
    assert_eq!(
        store.read(StoreKey::CellularInfo).unwrap().lifecycle,
        Lifecycle::Failed
    );
}

#[test]
fn test_unaccepted_events_leave_state_unchanged() {
    let mut script = bring_up_steps();
    script.extend(network_steps());
    script.push(step("AT+CGACT=1,1\r", b"\r\nOK\r\n"));

    let config = EngineConfig {
        pdn: test_pdn(),
        ..Default::default()
    };
    let (mut automaton, _rx, _store) = build(config, script);
    automaton.start();
    assert_eq!(automaton.state(), CellState::DataReady);

    // None of these belong to DataReady's accepted set (low power is
    // disabled in this config).
    for event in [
        Event::Timer(TimerId::NetworkStatus),
        Event::Timer(TimerId::Register),
        Event::Timer(TimerId::Pdn),
        Event::Command(ExternalCommand::WakeRequest),
        Event::Command(ExternalCommand::SleepRequest),
        Event::Command(ExternalCommand::RadioOn),
    ] {
        automaton.handle_event(event);
        assert_eq!(automaton.state(), CellState::DataReady, "after {:?}", event);
    }
}

#[test]
fn test_unaccepted_events_ignored_in_side_branch_states() {
    // Off: powered down on request at boot.
    let config = EngineConfig {
        target: TargetState::Off,
        ..Default::default()
    };
    let (mut automaton, _rx, _store) = build(config, vec![step("AT+CPOF\r", b"\r\nOK\r\n")]);
    automaton.start();
    assert_ignored(
        &mut automaton,
        CellState::Off,
        &[
            Event::Timer(TimerId::Polling),
            Event::Timer(TimerId::NetworkStatus),
            Event::Command(ExternalCommand::WakeRequest),
            Event::Modem(ModemNotification::PdnDeactivated(1)),
            Event::Modem(ModemNotification::SimRemoved),
        ],
    );

    // SimOnly: SIM usable, network deliberately down.
    let config = EngineConfig {
        target: TargetState::SimOnly,
        ..Default::default()
    };
    let script = vec![
        step("AT\r", b"\r\nOK\r\n"),
        step("ATE0\r", b"\r\nOK\r\n"),
        step("AT+CPIN?\r", b"\r\n+CPIN: READY\r\n\r\nOK\r\n"),
    ];
    let (mut automaton, _rx, _store) = build(config, script);
    automaton.start();
    assert_ignored(
        &mut automaton,
        CellState::SimOnly,
        &[
            Event::Timer(TimerId::Polling),
            Event::Timer(TimerId::Pdn),
            Event::Command(ExternalCommand::RadioOn),
            Event::Command(ExternalCommand::WakeRequest),
            Event::Modem(ModemNotification::PdnDeactivated(1)),
        ],
    );

    // NetworkStatusFail: watchdog expired, delayed retry armed.
    let mut script = bring_up_steps();
    script.push(step("AT+CSQ\r", b"\r\n+CSQ: 18,0\r\n\r\nOK\r\n"));
    script.push(step("AT+CEREG=2\r", b"\r\nOK\r\n"));
    script.push(step("AT+CEREG?\r", b"\r\n+CEREG: 2,2\r\n\r\nOK\r\n"));
    script.push(step("AT+CPOF\r", b"\r\nOK\r\n"));
    let config = EngineConfig {
        pdn: test_pdn(),
        ..Default::default()
    };
    let (mut automaton, _rx, _store) = build(config, script);
    automaton.start();
    automaton.handle_event(Event::Timer(TimerId::NetworkStatus));
    assert_ignored(
        &mut automaton,
        CellState::NetworkStatusFail,
        &[
            Event::Timer(TimerId::Polling),
            Event::Timer(TimerId::NetworkStatus),
            Event::Command(ExternalCommand::SleepRequest),
            Event::Modem(ModemNotification::PdnDeactivated(1)),
        ],
    );

    // Reprogramming: firmware update preempts; only its end event moves on.
    let config = EngineConfig {
        target: TargetState::Off,
        ..Default::default()
    };
    let (mut automaton, _rx, _store) = build(config, vec![step("AT+CPOF\r", b"\r\nOK\r\n")]);
    automaton.start();
    automaton.handle_event(Event::Command(ExternalCommand::FirmwareUpdate(true)));
    assert_ignored(
        &mut automaton,
        CellState::Reprogramming,
        &[
            Event::Command(ExternalCommand::RadioOn),
            Event::Timer(TimerId::Register),
            Event::Modem(ModemNotification::ModemReady),
            Event::Command(ExternalCommand::SleepRequest),
        ],
    );

    // Fail: terminal, nothing moves it.
    let ping_errors = |script: &mut Vec<(String, Vec<u8>)>| {
        for _ in 0..4 {
            script.push(step("AT\r", b"\r\nERROR\r\n"));
        }
    };
    let mut script = Vec::new();
    ping_errors(&mut script);
    for _ in 0..3 {
        script.push(step("AT+CPOF\r", b"\r\nOK\r\n"));
        ping_errors(&mut script);
    }
    let (mut automaton, _rx, _store) = build(EngineConfig::default(), script);
    automaton.start();
    assert_ignored(
        &mut automaton,
        CellState::Fail,
        &[
            Event::Command(ExternalCommand::RadioOn),
            Event::Command(ExternalCommand::FirmwareUpdate(true)),
            Event::Timer(TimerId::Register),
            Event::Modem(ModemNotification::ModemReady),
        ],
    );
}

#[test]
fn test_retry_ceilings_escalate_to_fail() {
    // Modem answers ERROR to every probe: init fails, every reset fails.
    let ping_errors =
        |script: &mut Vec<(String, Vec<u8>)>| {
            for _ in 0..4 {
                script.push(step("AT\r", b"\r\nERROR\r\n"));
            }
        };
    let mut script = Vec::new();
    ping_errors(&mut script);
    for _ in 0..3 {
        script.push(step("AT+CPOF\r", b"\r\nOK\r\n"));
        ping_errors(&mut script);
    }

    let (mut automaton, _rx, store) = build(EngineConfig::default(), script);
    let fault: Arc<Mutex<Option<FatalFault>>> = Arc::new(Mutex::new(None));
    let sink_fault = Arc::clone(&fault);
    automaton.set_fatal_sink(Box::new(move |f| {
        *sink_fault.lock() = Some(*f);
    }));

    automaton.start();

    assert_eq!(automaton.state(), CellState::Fail);
    let fault = fault.lock().take().expect("fatal sink not invoked");
    let counters = fault.counters;
    assert_eq!(counters.power_on, 1);
    assert_eq!(counters.reset, 3);
    assert_eq!(counters.global, 4);
    assert_eq!(
        store.read(StoreKey::CellularInfo).unwrap().lifecycle,
        Lifecycle::Failed
    );
}

#[test]
fn test_socket_receive_request_is_clamped() {
    let mut script = bring_up_steps();
    script.extend(network_steps());
    script.push(step("AT+CGACT=1,1\r", b"\r\nOK\r\n"));
    // The oversized request goes out clamped to the capture capacity.
    script.push(step("AT+RCVD=0,1500\r", b"\r\n+RCVD: 5\r\nhello\r\nOK\r\n"));

    let config = EngineConfig {
        pdn: test_pdn(),
        ..Default::default()
    };
    let (tx, _rx) = event_channel();
    let mut exchanger = AtExchanger::new(
        Box::new(ScriptTransport::new(script)),
        Arc::new(GenericVendor::new()),
    );
    exchanger.set_urc_sink(tx.clone());
    let service = Arc::new(CellularService::new(exchanger, GenericVendor::command_set()));
    let store = Arc::new(StateStore::new());
    let timers = TimerService::spawn(tx);
    let mut automaton = Automaton::new(config, Arc::clone(&service), store, timers);
    automaton.start();
    assert_eq!(automaton.state(), CellState::DataReady);

    let payload = service.socket_receive(0, 4000).unwrap();
    assert_eq!(payload, b"hello");
}
