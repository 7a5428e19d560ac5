//! Command table and dispatch.
//!
//! A command table is an ordered set of [`CommandDescriptor`]s supplied per
//! modem variant. Each entry carries the wire text, a timeout, and a handler
//! exposing `build` (compose parameters to send) and `analyze` (interpret a
//! response line). Incoming lines are matched by prefix against the table in
//! order, so table order encodes priority: `+CME ERROR` must sit before the
//! generic `ERROR` entry.

use std::collections::HashMap;
use std::time::Duration;

use crate::error::{AtError, AtResult, ProtocolCause};
use crate::fields::ParseCursor;
use crate::transaction::TransactionContext;

/// Opaque per-vendor command identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandId(pub u16);

/// Analyzer verdict for one response line of the pending command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineVerdict {
    /// The line completes the command successfully.
    Final,
    /// The line carried data; the final response is still to come.
    Intermediate,
    /// The line reports a command failure with the given cause.
    Error(ProtocolCause),
}

/// How the classifier treats lines matching an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// A sendable command; its wire text also prefixes its data responses
    /// (3GPP convention: `AT+CSQ` answers with `+CSQ: ...`).
    Command,
    /// Generic final success line (`OK`).
    FinalOk,
    /// Generic final error line (`ERROR`, `+CME ERROR`, `+CMS ERROR`).
    FinalError,
    /// Response-only unsolicited line (`RDY` and similar); never pending.
    Notification,
}

/// Per-command behavior supplied by the vendor plugin.
pub trait CommandHandler: Send + Sync {
    /// Compose the parameter string appended after the wire text. The
    /// default sends the wire text alone.
    fn build(&self, _ctx: &TransactionContext) -> AtResult<String> {
        Ok(String::new())
    }

    /// Interpret one response line matched to this command. The default
    /// treats the line as data and keeps waiting for the final response.
    fn analyze(&self, _ctx: &mut TransactionContext, _cursor: &mut ParseCursor) -> LineVerdict {
        LineVerdict::Intermediate
    }
}

/// A handler with entirely default behavior.
pub struct DefaultHandler;

impl CommandHandler for DefaultHandler {}

/// One entry of a vendor command table.
pub struct CommandDescriptor {
    /// Symbolic identifier, unique within the table.
    pub id: CommandId,
    /// Wire text, e.g. `"+CSQ"`. Sent as `AT+CSQ<params>\r`; also the prefix
    /// matched against incoming lines. Empty for commands whose answer has
    /// no echoed prefix (plain `AT`, identity reads).
    pub wire_text: &'static str,
    /// Default timeout for the final response.
    pub timeout: Duration,
    /// Classification behavior of this entry.
    pub kind: EntryKind,
    /// Builder/analyzer implementation.
    pub handler: &'static (dyn CommandHandler),
}

impl std::fmt::Debug for CommandDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandDescriptor")
            .field("id", &self.id)
            .field("wire_text", &self.wire_text)
            .field("timeout", &self.timeout)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Ordered command table with O(1) id lookup.
#[derive(Debug, Default)]
pub struct CommandTable {
    entries: Vec<CommandDescriptor>,
    by_id: HashMap<CommandId, usize>,
}

impl CommandTable {
    /// Create an empty table.
    pub fn new() -> Self {
        CommandTable::default()
    }

    /// Append an entry. Order matters: earlier entries win prefix matches.
    pub fn push(&mut self, descriptor: CommandDescriptor) {
        self.by_id.insert(descriptor.id, self.entries.len());
        self.entries.push(descriptor);
    }

    /// Look up an entry by id.
    pub fn by_id(&self, id: CommandId) -> AtResult<&CommandDescriptor> {
        self.by_id
            .get(&id)
            .map(|&i| &self.entries[i])
            .ok_or(AtError::UnknownCommand(id.0))
    }

    /// First entry whose wire text prefixes `line`. Entries with empty wire
    /// text never match; their answers are handled by the plain-text
    /// fallback of the classifier.
    pub fn lookup_prefix(&self, line: &[u8]) -> Option<&CommandDescriptor> {
        self.entries
            .iter()
            .find(|e| !e.wire_text.is_empty() && line.starts_with(e.wire_text.as_bytes()))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
