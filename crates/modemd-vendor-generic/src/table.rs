//! The generic command table and plugin.

use std::time::Duration;

use modemd_at::{
    CommandDescriptor, CommandId, CommandTable, EntryKind, ParsedResponse, ProtocolCause,
    VendorPlugin,
};
use modemd_common::ModemNotification;

use crate::handlers;

/// Scanner marker that opens binary payload mode for socket receive.
pub const PAYLOAD_MARKER: &str = "+RCVD: ";

// ============================================================================
// Command Identifiers
// ============================================================================

/// Symbolic identifiers of the generic command set.
///
/// The discriminant doubles as the wire-level [`CommandId`], keeping id
/// lookup O(1) while the enum keeps match arms exhaustive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum GenericCommand {
    /// Bare `AT` liveness probe.
    At = 0,
    /// `ATE0` echo off.
    EchoOff,
    /// `+CPIN` SIM status / PIN submit.
    Cpin,
    /// `+CFUN` functionality level.
    Cfun,
    /// `+CSQ` signal quality.
    Csq,
    /// `+CEREG` EPS registration.
    Cereg,
    /// `+CGATT` packet attach.
    Cgatt,
    /// `+CGDCONT` PDN definition.
    Cgdcont,
    /// `+CGACT` PDN activation.
    Cgact,
    /// `+CGMI` manufacturer.
    Cgmi,
    /// `+CGMM` model.
    Cgmm,
    /// `+CGMR` revision.
    Cgmr,
    /// `+CGSN` serial number.
    Cgsn,
    /// `+CCID` SIM ICCID.
    Ccid,
    /// `+CPOF` modem power off.
    Cpof,
    /// `+RCVD` socket receive with binary payload.
    Rcvd,
    /// Final `OK`.
    Ok,
    /// `+CME ERROR` with cause.
    CmeError,
    /// `+CMS ERROR` with cause.
    CmsError,
    /// Final `ERROR`.
    Error,
    /// `RDY` boot notification.
    Rdy,
    /// `+SIMREMOVED` SIM removal notification.
    SimRemoved,
}

impl GenericCommand {
    /// The table-level command id of this command.
    pub const fn id(self) -> CommandId {
        CommandId(self as u16)
    }
}

// ============================================================================
// Handler Instances
// ============================================================================

static PLAIN: handlers::Plain = handlers::Plain;
static CME: handlers::NumericError = handlers::NumericError {
    wrap: ProtocolCause::Cme,
};
static CMS: handlers::NumericError = handlers::NumericError {
    wrap: ProtocolCause::Cms,
};
static CPIN: handlers::Cpin = handlers::Cpin;
static CFUN: handlers::Cfun = handlers::Cfun;
static CSQ: handlers::Csq = handlers::Csq;
static CEREG: handlers::Cereg = handlers::Cereg;
static CGATT: handlers::Cgatt = handlers::Cgatt;
static CGDCONT: handlers::Cgdcont = handlers::Cgdcont;
static CGACT: handlers::Cgact = handlers::Cgact;
static TEXT: handlers::TextLine = handlers::TextLine;
static RCVD: handlers::Rcvd = handlers::Rcvd;

const fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

// ============================================================================
// Plugin
// ============================================================================

/// The generic 3GPP vendor plugin.
pub struct GenericVendor {
    table: CommandTable,
}

impl Default for GenericVendor {
    fn default() -> Self {
        GenericVendor::new()
    }
}

impl GenericVendor {
    /// Build the plugin with its command table.
    pub fn new() -> Self {
        use GenericCommand as C;

        let mut table = CommandTable::new();
        // Order encodes prefix-match priority: specific error keywords
        // must precede the generic ERROR entry; response keywords precede
        // commands sharing a prefix.
        let rows: &[(C, &'static str, Duration, EntryKind, &'static dyn modemd_at::CommandHandler)] = &[
            (C::CmeError, "+CME ERROR", secs(1), EntryKind::FinalError, &CME),
            (C::CmsError, "+CMS ERROR", secs(1), EntryKind::FinalError, &CMS),
            (C::Error, "ERROR", secs(1), EntryKind::FinalError, &PLAIN),
            (C::Ok, "OK", secs(1), EntryKind::FinalOk, &PLAIN),
            (C::Rdy, "RDY", secs(1), EntryKind::Notification, &PLAIN),
            (C::SimRemoved, "+SIMREMOVED", secs(1), EntryKind::Notification, &PLAIN),
            (C::At, "", secs(1), EntryKind::Command, &PLAIN),
            (C::EchoOff, "E0", secs(1), EntryKind::Command, &PLAIN),
            (C::Cpin, "+CPIN", secs(5), EntryKind::Command, &CPIN),
            (C::Cfun, "+CFUN", secs(30), EntryKind::Command, &CFUN),
            (C::Csq, "+CSQ", secs(5), EntryKind::Command, &CSQ),
            (C::Cereg, "+CEREG", secs(5), EntryKind::Command, &CEREG),
            (C::Cgatt, "+CGATT", secs(30), EntryKind::Command, &CGATT),
            (C::Cgdcont, "+CGDCONT", secs(5), EntryKind::Command, &CGDCONT),
            (C::Cgact, "+CGACT", secs(150), EntryKind::Command, &CGACT),
            (C::Cgmi, "+CGMI", secs(5), EntryKind::Command, &TEXT),
            (C::Cgmm, "+CGMM", secs(5), EntryKind::Command, &TEXT),
            (C::Cgmr, "+CGMR", secs(5), EntryKind::Command, &TEXT),
            (C::Cgsn, "+CGSN", secs(5), EntryKind::Command, &TEXT),
            (C::Ccid, "+CCID", secs(5), EntryKind::Command, &TEXT),
            (C::Cpof, "+CPOF", secs(30), EntryKind::Command, &PLAIN),
            (C::Rcvd, "+RCVD", secs(10), EntryKind::Command, &RCVD),
        ];
        for &(cmd, wire_text, timeout, kind, handler) in rows {
            table.push(CommandDescriptor {
                id: cmd.id(),
                wire_text,
                timeout,
                kind,
                handler,
            });
        }
        GenericVendor { table }
    }

    /// The logical command set mapping for this vendor.
    pub fn command_set() -> modemd_at::CommandSet {
        use GenericCommand as C;
        modemd_at::CommandSet {
            ping: C::At.id(),
            echo_off: C::EchoOff.id(),
            sim: C::Cpin.id(),
            radio_fun: C::Cfun.id(),
            signal: C::Csq.id(),
            registration: C::Cereg.id(),
            attach: C::Cgatt.id(),
            pdn_define: C::Cgdcont.id(),
            pdn_activate: C::Cgact.id(),
            manufacturer: C::Cgmi.id(),
            model: C::Cgmm.id(),
            revision: C::Cgmr.id(),
            serial: C::Cgsn.id(),
            iccid: C::Ccid.id(),
            power_off: C::Cpof.id(),
            socket_receive: C::Rcvd.id(),
        }
    }
}

impl VendorPlugin for GenericVendor {
    fn table(&self) -> &CommandTable {
        &self.table
    }

    fn payload_markers(&self) -> &[&'static str] {
        &[PAYLOAD_MARKER]
    }

    fn is_unsolicited(&self, id: CommandId) -> bool {
        id == GenericCommand::Cereg.id()
            || id == GenericCommand::Rdy.id()
            || id == GenericCommand::SimRemoved.id()
    }

    fn notification(&self, id: CommandId, parsed: &ParsedResponse) -> Option<ModemNotification> {
        if id == GenericCommand::Rdy.id() {
            return Some(ModemNotification::ModemReady);
        }
        if id == GenericCommand::SimRemoved.id() {
            return Some(ModemNotification::SimRemoved);
        }
        if id == GenericCommand::Cereg.id() {
            let (bearer, state) = parsed.registration?;
            return Some(ModemNotification::RegistrationChanged(bearer, state));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modemd_at::{
        classify_line, AtExchanger, Classification, CommandOutcome, ModemTransport,
        TransactionContext,
    };
    use modemd_common::{Bearer, PdnConfig, RegistrationState, SignalQuality, SimStatus};
    use std::collections::VecDeque;
    use std::sync::Arc;

    struct CannedTransport {
        written: Vec<Vec<u8>>,
        rx: VecDeque<u8>,
    }

    impl CannedTransport {
        fn new(response: &[u8]) -> Self {
            CannedTransport {
                written: Vec::new(),
                rx: response.to_vec().into(),
            }
        }
    }

    impl ModemTransport for CannedTransport {
        fn write(&mut self, data: &[u8]) -> modemd_at::AtResult<()> {
            self.written.push(data.to_vec());
            Ok(())
        }

        fn read_byte(&mut self, _timeout: Duration) -> modemd_at::AtResult<Option<u8>> {
            Ok(self.rx.pop_front())
        }
    }

    fn urc(v: &GenericVendor) -> impl Fn(CommandId) -> bool + '_ {
        move |id| v.is_unsolicited(id)
    }

    #[test]
    fn test_cme_before_generic_error() {
        let vendor = GenericVendor::new();
        let hit = vendor.table().lookup_prefix(b"+CME ERROR: 14").unwrap();
        assert_eq!(hit.id, GenericCommand::CmeError.id());
    }

    #[test]
    fn test_cpin_query_roundtrip() {
        let vendor = GenericVendor::new();
        let mut ctx = TransactionContext::begin("sim");
        ctx.current_command = Some(GenericCommand::Cpin.id());

        let classification = classify_line(
            vendor.table(),
            &urc(&vendor),
            &mut ctx,
            b"+CPIN: SIM PIN",
        );
        assert_eq!(classification, Classification::Intermediate);
        assert_eq!(ctx.parsed.sim, Some(SimStatus::PinRequired));
    }

    #[test]
    fn test_cereg_solicited_and_urc_forms() {
        let vendor = GenericVendor::new();

        let mut ctx = TransactionContext::begin("reg");
        ctx.current_command = Some(GenericCommand::Cereg.id());
        classify_line(vendor.table(), &urc(&vendor), &mut ctx, b"+CEREG: 2,1");
        assert_eq!(
            ctx.parsed.registration,
            Some((Bearer::Eps, RegistrationState::Home))
        );

        let mut ctx = TransactionContext::begin("reg");
        ctx.current_command = Some(GenericCommand::Cereg.id());
        classify_line(
            vendor.table(),
            &urc(&vendor),
            &mut ctx,
            b"+CEREG: 5,\"1A2B\",\"01020304\",7",
        );
        assert_eq!(
            ctx.parsed.registration,
            Some((Bearer::Eps, RegistrationState::Roaming))
        );
    }

    #[test]
    fn test_full_exchange_signal_quality() {
        let vendor = Arc::new(GenericVendor::new());
        let transport = CannedTransport::new(b"\r\n+CSQ: 23,0\r\n\r\nOK\r\n");
        let mut ex = AtExchanger::new(Box::new(transport), vendor);

        let mut ctx = TransactionContext::begin("csq");
        let outcome = ex
            .run_command(GenericCommand::Csq.id(), None, &mut ctx)
            .unwrap();
        assert_eq!(outcome, CommandOutcome::Success);
        assert_eq!(ctx.parsed.signal, Some(SignalQuality { rssi: 23, ber: 0 }));
    }

    #[test]
    fn test_cgdcont_wire_format() {
        let vendor = GenericVendor::new();
        let entry = vendor.table().by_id(GenericCommand::Cgdcont.id()).unwrap();
        let mut ctx = TransactionContext::begin("pdn");
        ctx.params.pdn = Some(PdnConfig {
            cid: 1,
            apn: "internet".to_string(),
            pdp_type: "IP".to_string(),
        });
        assert_eq!(
            entry.handler.build(&ctx).unwrap(),
            "=1,\"IP\",\"internet\""
        );
    }

    #[test]
    fn test_identity_plain_text_fallback() {
        let vendor = Arc::new(GenericVendor::new());
        let transport = CannedTransport::new(b"\r\nExample Industries\r\n\r\nOK\r\n");
        let mut ex = AtExchanger::new(Box::new(transport), vendor);

        let mut ctx = TransactionContext::begin("identity");
        let outcome = ex
            .run_command(GenericCommand::Cgmi.id(), None, &mut ctx)
            .unwrap();
        assert_eq!(outcome, CommandOutcome::Success);
        assert_eq!(ctx.parsed.text, vec!["Example Industries".to_string()]);
    }

    #[test]
    fn test_socket_receive_payload() {
        let vendor = Arc::new(GenericVendor::new());
        let transport = CannedTransport::new(b"\r\n+RCVD: 6\r\nhe\r\nlo\r\nOK\r\n");
        let mut ex = AtExchanger::new(Box::new(transport), vendor);

        let mut ctx = TransactionContext::begin("recv");
        ctx.params.socket = Some(0);
        ctx.params.recv_len = Some(6);
        let outcome = ex
            .run_command(GenericCommand::Rcvd.id(), None, &mut ctx)
            .unwrap();
        assert_eq!(outcome, CommandOutcome::Success);
        assert_eq!(ctx.parsed.payload.as_deref(), Some(&b"he\r\nlo"[..]));
        assert!(!ctx.parsed.payload_truncated);
    }

    #[test]
    fn test_rdy_notification() {
        let vendor = GenericVendor::new();
        assert_eq!(
            vendor.notification(GenericCommand::Rdy.id(), &ParsedResponse::default()),
            Some(ModemNotification::ModemReady)
        );
    }
}
