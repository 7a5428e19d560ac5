//! Blocking command exchange over a byte transport.
//!
//! [`AtExchanger`] owns the transport, the frame scanner and the vendor
//! plugin. One call to [`AtExchanger::run_command`] sends a command and
//! blocks the calling task until the final/error classification or the
//! command's timeout, whichever comes first. A timeout surfaces as a failed
//! completion exactly like a protocol error, never as a separate code path.
//!
//! The transport cannot multiplex, so at most one exchange may be in flight;
//! callers serialize through the service lock.

use std::sync::Arc;
use std::time::{Duration, Instant};

use modemd_common::{post_event, Event, EventSender, ModemNotification};

use crate::classify::{classify_line, Classification};
use crate::error::{AtError, AtResult, FailureCause, FrameError};
use crate::fields::ParseCursor;
use crate::scanner::{FrameScanner, FrameSignal};
use crate::table::{CommandId, CommandTable};
use crate::transaction::{ParsedResponse, TransactionContext};

/// Granularity of transport reads while waiting for a response.
const POLL_SLICE: Duration = Duration::from_millis(50);

// ============================================================================
// Traits
// ============================================================================

/// A byte-in/byte-out modem transport (UART or equivalent).
pub trait ModemTransport: Send {
    /// Send raw bytes to the modem.
    fn write(&mut self, data: &[u8]) -> AtResult<()>;

    /// Receive one byte, waiting at most `timeout`. `Ok(None)` means no byte
    /// arrived within the window.
    fn read_byte(&mut self, timeout: Duration) -> AtResult<Option<u8>>;
}

/// Per-modem-variant plugin: the command table plus framing and URC hooks.
pub trait VendorPlugin: Send + Sync {
    /// The vendor's command table.
    fn table(&self) -> &CommandTable;

    /// Line prefixes that switch the scanner into binary payload mode.
    fn payload_markers(&self) -> &[&'static str] {
        &[]
    }

    /// Whether `id` belongs to the known unsolicited set.
    fn is_unsolicited(&self, id: CommandId) -> bool;

    /// Feed one byte to the scanner. The default delegates directly; vendors
    /// with framing quirks intercept here.
    fn check_frame_byte(
        &self,
        scanner: &mut FrameScanner,
        byte: u8,
    ) -> Result<FrameSignal, FrameError> {
        scanner.feed(byte)
    }

    /// Map a parsed unsolicited line to a normalized notification, if it
    /// carries one.
    fn notification(&self, _id: CommandId, _parsed: &ParsedResponse) -> Option<ModemNotification> {
        None
    }
}

// ============================================================================
// Outcome
// ============================================================================

/// Completion of one command exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The final success response arrived.
    Success,
    /// The command failed (protocol error, timeout or desynchronization).
    Failed(FailureCause),
}

impl CommandOutcome {
    /// Whether the exchange succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, CommandOutcome::Success)
    }
}

// ============================================================================
// Exchanger
// ============================================================================

/// The blocking exchange engine.
pub struct AtExchanger {
    transport: Box<dyn ModemTransport>,
    vendor: Arc<dyn VendorPlugin>,
    scanner: FrameScanner,
    urc_sink: Option<EventSender>,
}

impl AtExchanger {
    /// Create an exchanger over a transport with a vendor plugin.
    pub fn new(transport: Box<dyn ModemTransport>, vendor: Arc<dyn VendorPlugin>) -> Self {
        let mut scanner = FrameScanner::default();
        for marker in vendor.payload_markers() {
            scanner.register_marker(marker);
        }
        AtExchanger {
            transport,
            vendor,
            scanner,
            urc_sink: None,
        }
    }

    /// Route normalized unsolicited notifications to an event channel.
    pub fn set_urc_sink(&mut self, sink: EventSender) {
        self.urc_sink = Some(sink);
    }

    /// The vendor plugin in use.
    pub fn vendor(&self) -> &Arc<dyn VendorPlugin> {
        &self.vendor
    }

    /// Send one command and block until its completion or timeout.
    ///
    /// Framing and transport failures are hard errors; protocol errors and
    /// timeouts are reported as [`CommandOutcome::Failed`].
    pub fn run_command(
        &mut self,
        id: CommandId,
        timeout_override: Option<Duration>,
        ctx: &mut TransactionContext,
    ) -> AtResult<CommandOutcome> {
        let (wire_text, timeout) = {
            let entry = self.vendor.table().by_id(id)?;
            (entry.wire_text, timeout_override.unwrap_or(entry.timeout))
        };

        ctx.current_command = Some(id);
        ctx.parsed.cause = None;

        let params = self.vendor.table().by_id(id)?.handler.build(ctx)?;
        let mut wire = String::with_capacity(2 + wire_text.len() + params.len() + 1);
        wire.push_str("AT");
        wire.push_str(wire_text);
        wire.push_str(&params);
        wire.push('\r');

        log::trace!("[{}] send {:?}", ctx.request, wire);
        self.transport.write(wire.as_bytes())?;

        let outcome = self.await_completion(timeout, ctx);
        ctx.current_command = None;
        outcome
    }

    /// Read bytes for at most `window`, dispatching any unsolicited lines.
    ///
    /// Used between transactions to keep URCs flowing while the automaton is
    /// idle.
    pub fn poll_unsolicited(&mut self, window: Duration) -> AtResult<()> {
        let deadline = Instant::now() + window;
        let mut ctx = TransactionContext::begin("urc-poll");
        ctx.best_effort = true;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            let slice = (deadline - now).min(POLL_SLICE);
            let Some(byte) = self.transport.read_byte(slice)? else {
                continue;
            };
            let signal = self.vendor.check_frame_byte(&mut self.scanner, byte)?;
            if signal == FrameSignal::LineComplete {
                let line = self.scanner.line().to_vec();
                let vendor = Arc::clone(&self.vendor);
                if let Classification::Unsolicited(urc_id) = classify_line(
                    vendor.table(),
                    &|id| vendor.is_unsolicited(id),
                    &mut ctx,
                    &line,
                ) {
                    self.dispatch_urc(urc_id, &line);
                }
            }
        }
    }

    fn await_completion(
        &mut self,
        timeout: Duration,
        ctx: &mut TransactionContext,
    ) -> AtResult<CommandOutcome> {
        let deadline = Instant::now() + timeout;
        loop {
            let now = Instant::now();
            if now >= deadline {
                log::warn!("[{}] timeout awaiting {:?}", ctx.request, ctx.current_command);
                return Ok(CommandOutcome::Failed(FailureCause::Timeout));
            }

            let slice = (deadline - now).min(POLL_SLICE);
            let Some(byte) = self.transport.read_byte(slice)? else {
                continue;
            };

            let signal = match self.vendor.check_frame_byte(&mut self.scanner, byte) {
                Ok(signal) => signal,
                Err(e) => {
                    // Framing errors are fatal to the transaction, never
                    // silently truncated.
                    log::warn!("[{}] framing error: {}", ctx.request, e);
                    return Err(AtError::Frame(e));
                }
            };

            match signal {
                FrameSignal::None => {}
                FrameSignal::PayloadComplete => {
                    if self.scanner.truncated() {
                        log::warn!(
                            "[{}] payload declared {} bytes, buffer holds {}",
                            ctx.request,
                            self.scanner.declared_len(),
                            self.scanner.payload().len()
                        );
                    }
                    ctx.parsed.payload = Some(self.scanner.payload().to_vec());
                    ctx.parsed.payload_truncated = self.scanner.truncated();
                }
                FrameSignal::LineComplete => {
                    let line = self.scanner.line().to_vec();
                    let vendor = Arc::clone(&self.vendor);
                    let classification = classify_line(
                        vendor.table(),
                        &|id| vendor.is_unsolicited(id),
                        ctx,
                        &line,
                    );
                    log::trace!(
                        "[{}] line {:?} -> {:?}",
                        ctx.request,
                        String::from_utf8_lossy(&line),
                        classification
                    );
                    match classification {
                        Classification::Final => return Ok(CommandOutcome::Success),
                        Classification::Error(cause) => {
                            return Ok(CommandOutcome::Failed(cause))
                        }
                        Classification::Unsolicited(urc_id) => self.dispatch_urc(urc_id, &line),
                        Classification::Intermediate | Classification::Ignored => {}
                    }
                }
            }
        }
    }

    /// Parse an unsolicited line into a scratch context and post the
    /// normalized notification, keeping URC data out of the pending
    /// transaction.
    fn dispatch_urc(&mut self, id: CommandId, line: &[u8]) {
        let Ok(entry) = self.vendor.table().by_id(id) else {
            return;
        };
        let mut scratch = TransactionContext::begin("urc");
        scratch.current_command = Some(id);
        let mut cursor = ParseCursor::new(line);
        let _ = entry.handler.analyze(&mut scratch, &mut cursor);

        if let Some(notification) = self.vendor.notification(id, &scratch.parsed) {
            log::debug!("urc {:?} -> {:?}", String::from_utf8_lossy(line), notification);
            if let Some(sink) = &self.urc_sink {
                post_event(sink, Event::Modem(notification));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProtocolCause;
    use crate::table::{
        CommandDescriptor, CommandHandler, CommandTable, DefaultHandler, EntryKind, LineVerdict,
    };
    use modemd_common::{event_channel, RegistrationState, SignalQuality};
    use std::collections::VecDeque;

    // ------------------------------------------------------------------
    // Scripted transport
    // ------------------------------------------------------------------

    struct ScriptedTransport {
        /// Expected writes paired with the bytes the modem answers.
        script: VecDeque<(Vec<u8>, Vec<u8>)>,
        rx: VecDeque<u8>,
    }

    impl ScriptedTransport {
        fn new(script: Vec<(&str, &[u8])>) -> Self {
            ScriptedTransport {
                script: script
                    .into_iter()
                    .map(|(w, r)| (w.as_bytes().to_vec(), r.to_vec()))
                    .collect(),
                rx: VecDeque::new(),
            }
        }
    }

    impl ModemTransport for ScriptedTransport {
        fn write(&mut self, data: &[u8]) -> AtResult<()> {
            let (expected, response) = self
                .script
                .pop_front()
                .unwrap_or_else(|| panic!("unexpected write {:?}", String::from_utf8_lossy(data)));
            assert_eq!(
                data,
                &expected[..],
                "wire mismatch: {:?}",
                String::from_utf8_lossy(data)
            );
            self.rx.extend(response);
            Ok(())
        }

        fn read_byte(&mut self, _timeout: Duration) -> AtResult<Option<u8>> {
            Ok(self.rx.pop_front())
        }
    }

    // ------------------------------------------------------------------
    // Minimal vendor plugin
    // ------------------------------------------------------------------

    const ID_OK: CommandId = CommandId(1);
    const ID_CME: CommandId = CommandId(2);
    const ID_ERROR: CommandId = CommandId(3);
    const ID_CSQ: CommandId = CommandId(10);
    const ID_CEREG: CommandId = CommandId(11);

    struct CsqHandler;
    impl CommandHandler for CsqHandler {
        fn analyze(&self, ctx: &mut TransactionContext, cursor: &mut ParseCursor) -> LineVerdict {
            cursor.next_field();
            cursor.next_field();
            let rssi = cursor.field_u32().unwrap_or(99) as u8;
            cursor.next_field();
            let ber = cursor.field_u32().unwrap_or(99) as u8;
            ctx.parsed.signal = Some(SignalQuality { rssi, ber });
            LineVerdict::Intermediate
        }
    }

    struct CeregHandler;
    impl CommandHandler for CeregHandler {
        fn analyze(&self, ctx: &mut TransactionContext, cursor: &mut ParseCursor) -> LineVerdict {
            cursor.next_field();
            cursor.next_field();
            let stat = cursor.field_u32().unwrap_or(4);
            ctx.parsed.registration = Some((
                modemd_common::Bearer::Eps,
                RegistrationState::from_stat(stat),
            ));
            LineVerdict::Intermediate
        }
    }

    struct CmeErrorHandler;
    impl CommandHandler for CmeErrorHandler {
        fn analyze(&self, _ctx: &mut TransactionContext, cursor: &mut ParseCursor) -> LineVerdict {
            cursor.next_field();
            cursor.next_field();
            LineVerdict::Error(ProtocolCause::Cme(cursor.field_u32().unwrap_or(0)))
        }
    }

    static DEFAULT: DefaultHandler = DefaultHandler;
    static CSQ: CsqHandler = CsqHandler;
    static CEREG: CeregHandler = CeregHandler;
    static CME: CmeErrorHandler = CmeErrorHandler;

    struct TestVendor {
        table: CommandTable,
    }

    impl TestVendor {
        fn new() -> Self {
            let mut table = CommandTable::new();
            let rows: Vec<(CommandId, &'static str, EntryKind, &'static dyn CommandHandler)> = vec![
                (ID_CME, "+CME ERROR", EntryKind::FinalError, &CME),
                (ID_ERROR, "ERROR", EntryKind::FinalError, &DEFAULT),
                (ID_OK, "OK", EntryKind::FinalOk, &DEFAULT),
                (ID_CSQ, "+CSQ", EntryKind::Command, &CSQ),
                (ID_CEREG, "+CEREG", EntryKind::Command, &CEREG),
            ];
            for (id, wire_text, kind, handler) in rows {
                table.push(CommandDescriptor {
                    id,
                    wire_text,
                    timeout: Duration::from_millis(200),
                    kind,
                    handler,
                });
            }
            TestVendor { table }
        }
    }

    impl VendorPlugin for TestVendor {
        fn table(&self) -> &CommandTable {
            &self.table
        }

        fn is_unsolicited(&self, id: CommandId) -> bool {
            id == ID_CEREG
        }

        fn notification(
            &self,
            id: CommandId,
            parsed: &ParsedResponse,
        ) -> Option<ModemNotification> {
            if id == ID_CEREG {
                let (bearer, state) = parsed.registration?;
                return Some(ModemNotification::RegistrationChanged(bearer, state));
            }
            None
        }
    }

    fn exchanger(script: Vec<(&str, &[u8])>) -> AtExchanger {
        AtExchanger::new(
            Box::new(ScriptedTransport::new(script)),
            Arc::new(TestVendor::new()),
        )
    }

    #[test]
    fn test_data_line_then_ok() {
        let mut ex = exchanger(vec![("AT+CSQ\r", b"\r\n+CSQ: 18,0\r\n\r\nOK\r\n")]);
        let mut ctx = TransactionContext::begin("csq");
        let outcome = ex.run_command(ID_CSQ, None, &mut ctx).unwrap();
        assert_eq!(outcome, CommandOutcome::Success);
        assert_eq!(ctx.parsed.signal, Some(SignalQuality { rssi: 18, ber: 0 }));
        assert!(ctx.current_command.is_none());
    }

    #[test]
    fn test_cme_error_is_failed_completion() {
        let mut ex = exchanger(vec![("AT+CSQ\r", b"\r\n+CME ERROR: 10\r\n")]);
        let mut ctx = TransactionContext::begin("csq");
        let outcome = ex.run_command(ID_CSQ, None, &mut ctx).unwrap();
        assert_eq!(
            outcome,
            CommandOutcome::Failed(FailureCause::Protocol(ProtocolCause::Cme(10)))
        );
        assert_eq!(ctx.parsed.cause, Some(ProtocolCause::Cme(10)));
    }

    #[test]
    fn test_timeout_is_failed_completion() {
        let mut ex = exchanger(vec![("AT+CSQ\r", b"")]);
        let mut ctx = TransactionContext::begin("csq");
        let outcome = ex.run_command(ID_CSQ, None, &mut ctx).unwrap();
        assert_eq!(outcome, CommandOutcome::Failed(FailureCause::Timeout));
    }

    #[test]
    fn test_urc_during_exchange_posts_notification() {
        let (tx, rx) = event_channel();
        let mut ex = exchanger(vec![(
            "AT+CSQ\r",
            b"\r\n+CEREG: 1\r\n\r\n+CSQ: 20,1\r\n\r\nOK\r\n",
        )]);
        ex.set_urc_sink(tx);

        let mut ctx = TransactionContext::begin("csq");
        let outcome = ex.run_command(ID_CSQ, None, &mut ctx).unwrap();
        assert_eq!(outcome, CommandOutcome::Success);
        assert_eq!(ctx.parsed.signal, Some(SignalQuality { rssi: 20, ber: 1 }));

        // The URC landed on the sink, not in the transaction.
        assert_eq!(
            rx.try_recv().unwrap(),
            Event::Modem(ModemNotification::RegistrationChanged(
                modemd_common::Bearer::Eps,
                RegistrationState::Home
            ))
        );
        assert!(ctx.parsed.registration.is_none());
    }

    #[test]
    fn test_poll_unsolicited_between_exchanges() {
        let (tx, rx) = event_channel();
        // No command sent; the modem pushes a registration URC on its own.
        let mut transport = ScriptedTransport::new(vec![]);
        transport.rx.extend(b"\r\n+CEREG: 5\r\n".iter());
        let mut ex = AtExchanger::new(Box::new(transport), Arc::new(TestVendor::new()));
        ex.set_urc_sink(tx);

        ex.poll_unsolicited(Duration::from_millis(20)).unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            Event::Modem(ModemNotification::RegistrationChanged(
                modemd_common::Bearer::Eps,
                RegistrationState::Roaming
            ))
        );
    }
}
