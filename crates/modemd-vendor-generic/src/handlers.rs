//! Builders and analyzers for the generic 3GPP command set.

use modemd_at::{
    AtError, AtResult, CommandHandler, LineVerdict, ParseCursor, ProtocolCause,
    TransactionContext,
};
use modemd_common::{Bearer, RegistrationState, SignalQuality, SimStatus};

// ============================================================================
// Generic final responses
// ============================================================================

/// `OK` / `ERROR`: nothing to build or parse.
pub struct Plain;
impl CommandHandler for Plain {}

/// `+CME ERROR: <n>` / `+CMS ERROR: <n>`: extract the numeric sub-cause.
pub struct NumericError {
    /// Wraps the parsed number into the right cause variant.
    pub wrap: fn(u32) -> ProtocolCause,
}

impl CommandHandler for NumericError {
    fn analyze(&self, _ctx: &mut TransactionContext, cursor: &mut ParseCursor) -> LineVerdict {
        cursor.next_field(); // "+CME ERROR" keyword
        cursor.next_field();
        LineVerdict::Error((self.wrap)(cursor.field_u32().unwrap_or(0)))
    }
}

// ============================================================================
// SIM
// ============================================================================

/// `+CPIN`: query SIM status or submit the PIN.
pub struct Cpin;

impl CommandHandler for Cpin {
    fn build(&self, ctx: &TransactionContext) -> AtResult<String> {
        match &ctx.params.pin {
            Some(pin) => Ok(format!("=\"{}\"", pin)),
            None => Ok("?".to_string()),
        }
    }

    fn analyze(&self, ctx: &mut TransactionContext, cursor: &mut ParseCursor) -> LineVerdict {
        cursor.next_field(); // "+CPIN"
        cursor.next_field();
        ctx.parsed.sim = Some(match cursor.field_str() {
            "READY" => SimStatus::Ready,
            "SIM PIN" => SimStatus::PinRequired,
            "SIM PUK" => SimStatus::PukRequired,
            "NOT INSERTED" => SimStatus::NotInserted,
            "SIM BUSY" => SimStatus::Busy,
            _ => SimStatus::Unknown,
        });
        LineVerdict::Intermediate
    }
}

// ============================================================================
// Power / functionality
// ============================================================================

/// `+CFUN=<level>`: set modem functionality.
pub struct Cfun;

impl CommandHandler for Cfun {
    fn build(&self, ctx: &TransactionContext) -> AtResult<String> {
        let level = ctx
            .params
            .cfun_level
            .ok_or_else(|| AtError::Build("missing +CFUN level".to_string()))?;
        Ok(format!("={}", level))
    }
}

// ============================================================================
// Signal and registration
// ============================================================================

/// `+CSQ`: read signal quality.
pub struct Csq;

impl CommandHandler for Csq {
    fn analyze(&self, ctx: &mut TransactionContext, cursor: &mut ParseCursor) -> LineVerdict {
        cursor.next_field(); // "+CSQ"
        cursor.next_field();
        let rssi = cursor.field_u32().unwrap_or(99) as u8;
        cursor.next_field();
        let ber = cursor.field_u32().unwrap_or(99) as u8;
        ctx.parsed.signal = Some(SignalQuality { rssi, ber });
        LineVerdict::Intermediate
    }
}

/// `+CEREG`: configure registration reporting, query registration, and parse
/// both the solicited answer and the unsolicited report.
pub struct Cereg;

impl CommandHandler for Cereg {
    fn build(&self, ctx: &TransactionContext) -> AtResult<String> {
        match ctx.params.reporting_mode {
            Some(mode) => Ok(format!("={}", mode)),
            None => Ok("?".to_string()),
        }
    }

    fn analyze(&self, ctx: &mut TransactionContext, cursor: &mut ParseCursor) -> LineVerdict {
        cursor.next_field(); // "+CEREG"

        // Solicited answer is "+CEREG: <mode>,<stat>,..."; the URC form
        // omits the mode: "+CEREG: <stat>[,"<tac>",...]". When the field
        // after the first number is also numeric it is the stat; otherwise
        // the first number already was.
        cursor.next_field();
        let first = cursor.field_u32();
        cursor.next_field();
        let second = cursor.field_u32();
        let stat = second.or(first).unwrap_or(4);
        ctx.parsed.registration = Some((Bearer::Eps, RegistrationState::from_stat(stat)));
        LineVerdict::Intermediate
    }
}

// ============================================================================
// Attach and PDN
// ============================================================================

/// `+CGATT`: query or set packet-service attach.
pub struct Cgatt;

impl CommandHandler for Cgatt {
    fn build(&self, ctx: &TransactionContext) -> AtResult<String> {
        match ctx.params.attach {
            Some(true) => Ok("=1".to_string()),
            Some(false) => Ok("=0".to_string()),
            None => Ok("?".to_string()),
        }
    }

    fn analyze(&self, ctx: &mut TransactionContext, cursor: &mut ParseCursor) -> LineVerdict {
        cursor.next_field(); // "+CGATT"
        cursor.next_field();
        ctx.parsed.attached = Some(cursor.field_u32() == Some(1));
        LineVerdict::Intermediate
    }
}

/// `+CGDCONT=<cid>,"<type>","<apn>"`: define a PDN context.
pub struct Cgdcont;

impl CommandHandler for Cgdcont {
    fn build(&self, ctx: &TransactionContext) -> AtResult<String> {
        let pdn = ctx
            .params
            .pdn
            .as_ref()
            .ok_or_else(|| AtError::Build("missing PDN config".to_string()))?;
        Ok(format!("={},\"{}\",\"{}\"", pdn.cid, pdn.pdp_type, pdn.apn))
    }
}

/// `+CGACT=<state>,<cid>`: activate or deactivate a PDN context.
pub struct Cgact;

impl CommandHandler for Cgact {
    fn build(&self, ctx: &TransactionContext) -> AtResult<String> {
        let pdn = ctx
            .params
            .pdn
            .as_ref()
            .ok_or_else(|| AtError::Build("missing PDN config".to_string()))?;
        let state = u8::from(ctx.params.activate.unwrap_or(true));
        Ok(format!("={},{}", state, pdn.cid))
    }
}

// ============================================================================
// Identity and plain text
// ============================================================================

/// Identity reads (`+CGMI`, `+CGMM`, `+CGMR`, `+CGSN`, `+CCID`): the answer
/// is a plain text line, sometimes prefixed with the command keyword.
pub struct TextLine;

impl CommandHandler for TextLine {
    fn analyze(&self, ctx: &mut TransactionContext, cursor: &mut ParseCursor) -> LineVerdict {
        cursor.next_field();
        let mut text = cursor.field_str().to_string();
        // Prefixed form: "+CCID: 8988..." — keep the value, drop the keyword.
        if text.starts_with('+') {
            cursor.next_field();
            text = cursor.field_str().to_string();
        }
        if !text.is_empty() {
            ctx.parsed.text.push(text);
        }
        LineVerdict::Intermediate
    }
}

// ============================================================================
// Socket receive
// ============================================================================

/// `+RCVD=<socket>,<len>`: request socket payload bytes. The response header
/// re-uses the `+RCVD: ` marker and is consumed by the scanner's binary
/// payload mode; the payload lands in the transaction, the final `OK`
/// completes the command.
pub struct Rcvd;

impl CommandHandler for Rcvd {
    fn build(&self, ctx: &TransactionContext) -> AtResult<String> {
        let socket = ctx
            .params
            .socket
            .ok_or_else(|| AtError::Build("missing socket handle".to_string()))?;
        let len = ctx
            .params
            .recv_len
            .ok_or_else(|| AtError::Build("missing receive length".to_string()))?;
        Ok(format!("={},{}", socket, len))
    }
}
