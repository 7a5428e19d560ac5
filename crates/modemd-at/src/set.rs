//! Logical command set.
//!
//! The sequencer plans steps in terms of logical operations; each vendor
//! plugin maps those to its own table ids. This keeps the engine free of any
//! command vocabulary while preserving O(1) dispatch.

use crate::table::CommandId;

/// Vendor-independent operations the sequencer can schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalCommand {
    /// Liveness probe (bare `AT`).
    Ping,
    /// Disable command echo.
    EchoOff,
    /// SIM status query / PIN submit.
    Sim,
    /// Set radio functionality level.
    RadioFun,
    /// Read signal quality.
    Signal,
    /// Configure/query network registration.
    Registration,
    /// Query/set packet attach.
    Attach,
    /// Define a PDN context.
    PdnDefine,
    /// Activate a PDN context.
    PdnActivate,
    /// Read manufacturer string.
    Manufacturer,
    /// Read model string.
    Model,
    /// Read firmware revision string.
    Revision,
    /// Read serial number.
    Serial,
    /// Read SIM ICCID.
    Iccid,
    /// Power the modem off.
    PowerOff,
    /// Socket receive with binary payload.
    SocketReceive,
}

/// Mapping from logical operations to a vendor's table ids.
#[derive(Debug, Clone, Copy)]
pub struct CommandSet {
    pub ping: CommandId,
    pub echo_off: CommandId,
    pub sim: CommandId,
    pub radio_fun: CommandId,
    pub signal: CommandId,
    pub registration: CommandId,
    pub attach: CommandId,
    pub pdn_define: CommandId,
    pub pdn_activate: CommandId,
    pub manufacturer: CommandId,
    pub model: CommandId,
    pub revision: CommandId,
    pub serial: CommandId,
    pub iccid: CommandId,
    pub power_off: CommandId,
    pub socket_receive: CommandId,
}

impl CommandSet {
    /// Resolve a logical operation to the vendor's command id.
    pub fn resolve(&self, command: LogicalCommand) -> CommandId {
        match command {
            LogicalCommand::Ping => self.ping,
            LogicalCommand::EchoOff => self.echo_off,
            LogicalCommand::Sim => self.sim,
            LogicalCommand::RadioFun => self.radio_fun,
            LogicalCommand::Signal => self.signal,
            LogicalCommand::Registration => self.registration,
            LogicalCommand::Attach => self.attach,
            LogicalCommand::PdnDefine => self.pdn_define,
            LogicalCommand::PdnActivate => self.pdn_activate,
            LogicalCommand::Manufacturer => self.manufacturer,
            LogicalCommand::Model => self.model,
            LogicalCommand::Revision => self.revision,
            LogicalCommand::Serial => self.serial,
            LogicalCommand::Iccid => self.iccid,
            LogicalCommand::PowerOff => self.power_off,
            LogicalCommand::SocketReceive => self.socket_receive,
        }
    }
}
