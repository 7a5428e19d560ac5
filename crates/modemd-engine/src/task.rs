//! The automaton task.
//!
//! One dedicated thread consumes the bounded event channel in a blocking
//! loop; all state transitions happen on it, so the automaton needs no
//! internal locking. Everything else (timer thread, URC sink, store
//! subscribers, external callers) only posts events.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{select, Receiver, Sender};
use tracing::info;

use modemd_at::{AtExchanger, CommandSet, ModemTransport, VendorPlugin};
use modemd_common::{
    event_channel, EventReceiver, EventSender, StateStore, StoreKey, TimerService,
};

use crate::automaton::{Automaton, FatalSink};
use crate::config::EngineConfig;
use crate::service::CellularService;

/// Store keys whose changes the automaton reacts to.
const SUBSCRIBED_KEYS: &[StoreKey] = &[
    StoreKey::TargetState,
    StoreKey::ApnConfig,
    StoreKey::PowerConfig,
];

/// Running engine: the automaton thread plus the shared handles callers use
/// to talk to it.
pub struct EngineHandle {
    /// Post external commands and notifications here.
    pub events: EventSender,
    /// The published state store.
    pub store: Arc<StateStore>,
    /// Direct service access for synchronous reads (signal, identity,
    /// socket receive).
    pub service: Arc<CellularService>,
    shutdown: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl EngineHandle {
    /// Stop the automaton thread and wait for it to exit.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        let _ = self.shutdown.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Assemble and start the engine over a transport and vendor plugin.
pub fn spawn_engine(
    config: EngineConfig,
    transport: Box<dyn ModemTransport>,
    vendor: Arc<dyn VendorPlugin>,
    set: CommandSet,
    fatal: Option<FatalSink>,
) -> EngineHandle {
    let (events, rx) = event_channel();

    let mut exchanger = AtExchanger::new(transport, vendor);
    exchanger.set_urc_sink(events.clone());
    let service = Arc::new(CellularService::new(exchanger, set));

    let store = Arc::new(StateStore::new());
    store.subscribe(SUBSCRIBED_KEYS, events.clone());

    let timers = TimerService::spawn(events.clone());
    let mut automaton = Automaton::new(config, Arc::clone(&service), Arc::clone(&store), timers);
    if let Some(sink) = fatal {
        automaton.set_fatal_sink(sink);
    }

    let (shutdown, shutdown_rx) = crossbeam_channel::bounded(1);
    let handle = thread::Builder::new()
        .name("modemd-automaton".to_string())
        .spawn(move || automaton_loop(automaton, rx, shutdown_rx))
        .expect("failed to spawn automaton thread");

    EngineHandle {
        events,
        store,
        service,
        shutdown,
        handle: Some(handle),
    }
}

fn automaton_loop(mut automaton: Automaton, events: EventReceiver, shutdown: Receiver<()>) {
    automaton.start();
    loop {
        select! {
            recv(events) -> event => match event {
                Ok(event) => automaton.handle_event(event),
                Err(_) => break,
            },
            recv(shutdown) -> _ => break,
        }
    }
    info!(state = ?automaton.state(), "automaton task exiting");
}
