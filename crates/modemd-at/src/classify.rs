//! Response classification.
//!
//! Matches one captured line against the command table and decides what it
//! means for the pending exchange: the final response, an intermediate data
//! line, an unsolicited result code, a protocol error, or noise to ignore.
//!
//! The desynchronization rule: a recognized command line whose id differs
//! from the pending command and is not in the vendor's unsolicited set is a
//! protocol error, not something to skip silently. Only transactions marked
//! best-effort downgrade that to `Ignored`.

use crate::error::FailureCause;
use crate::fields::ParseCursor;
use crate::table::{CommandId, CommandTable, EntryKind, LineVerdict};
use crate::transaction::TransactionContext;

/// Classification of one response line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Final successful response of the pending command.
    Final,
    /// Data line of the pending command; keep waiting.
    Intermediate,
    /// Unsolicited result code; forward to the URC sink.
    Unsolicited(CommandId),
    /// The pending command failed (protocol error or desynchronization).
    Error(FailureCause),
    /// Filtered noise (echo, best-effort mismatch, unknown idle line).
    Ignored,
}

fn verdict_to_classification(verdict: LineVerdict) -> Classification {
    match verdict {
        LineVerdict::Final => Classification::Final,
        LineVerdict::Intermediate => Classification::Intermediate,
        LineVerdict::Error(cause) => Classification::Error(FailureCause::Protocol(cause)),
    }
}

/// Classify one line against the table.
///
/// `is_unsolicited` is the vendor's known-URC predicate. Analyzers of the
/// pending command run against `ctx`; unsolicited entries are *not* analyzed
/// here (the caller parses them into a scratch context so URC data cannot
/// pollute the pending transaction).
pub fn classify_line(
    table: &CommandTable,
    is_unsolicited: &dyn Fn(CommandId) -> bool,
    ctx: &mut TransactionContext,
    line: &[u8],
) -> Classification {
    // Command echo comes back verbatim when echo is on; every command we
    // send starts with "AT".
    if ctx.echo_enabled && line.starts_with(b"AT") {
        return Classification::Ignored;
    }

    match table.lookup_prefix(line) {
        Some(entry) => match entry.kind {
            EntryKind::FinalOk => Classification::Final,
            EntryKind::FinalError => {
                let mut cursor = ParseCursor::new(line);
                match entry.handler.analyze(ctx, &mut cursor) {
                    LineVerdict::Error(cause) => {
                        ctx.parsed.cause = Some(cause);
                        Classification::Error(FailureCause::Protocol(cause))
                    }
                    // An error entry that does not produce a cause still
                    // fails the command.
                    _ => Classification::Error(FailureCause::Protocol(
                        crate::error::ProtocolCause::Generic,
                    )),
                }
            }
            EntryKind::Notification => Classification::Unsolicited(entry.id),
            EntryKind::Command => {
                if ctx.current_command == Some(entry.id) {
                    let mut cursor = ParseCursor::new(line);
                    verdict_to_classification(entry.handler.analyze(ctx, &mut cursor))
                } else if is_unsolicited(entry.id) {
                    Classification::Unsolicited(entry.id)
                } else if ctx.best_effort {
                    log::debug!(
                        "ignoring mismatched line {:?} in best-effort request {}",
                        String::from_utf8_lossy(line),
                        ctx.request
                    );
                    Classification::Ignored
                } else {
                    log::warn!(
                        "protocol desync: got {:?} while awaiting {:?}",
                        String::from_utf8_lossy(line),
                        ctx.current_command
                    );
                    Classification::Error(FailureCause::Desync)
                }
            }
        },
        None => {
            // Plain-text fallback: commands whose answer has no echoed
            // prefix (identity reads, bare AT) analyze the raw line.
            if let Some(pending) = ctx.current_command {
                if let Ok(entry) = table.by_id(pending) {
                    let mut cursor = ParseCursor::new(line);
                    return verdict_to_classification(entry.handler.analyze(ctx, &mut cursor));
                }
            }
            log::debug!(
                "unrecognized idle line {:?}",
                String::from_utf8_lossy(line)
            );
            Classification::Ignored
        }
    }
}
