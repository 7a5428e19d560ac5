//! Command sequencer.
//!
//! Every service request (SID) is a short program of command steps. The
//! planner ([`first_step`]/[`next_step`]) is pure: given the current step,
//! its completion and the parsed scratch, it returns the next step, success,
//! or a typed failure. [`run_sid`] is the only driver; it stages builder
//! parameters, runs each step through the exchanger and feeds completions
//! back into the planner.

use std::thread;
use std::time::Duration;

use modemd_at::{
    AtExchanger, AtResult, CommandOutcome, CommandSet, FailureCause, LogicalCommand,
    ParsedResponse, TransactionContext,
};
use modemd_common::{PdnConfig, SimStatus};

/// Liveness probe attempts before InitModem gives up.
const PING_ATTEMPTS: u32 = 4;
/// Bounded SIM-busy re-polls before CheckSim gives up.
const SIM_BUSY_POLLS: u32 = 5;
/// Pause between SIM-busy re-polls.
const SIM_BUSY_POLL_DELAY: Duration = Duration::from_secs(1);

// ============================================================================
// Service Identifiers
// ============================================================================

/// The service requests the automaton can schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceId {
    /// Probe the modem and disable echo.
    InitModem,
    /// Query SIM status, unlocking with the configured PIN if required.
    CheckSim,
    /// Bring the radio to full functionality.
    RadioOn,
    /// Read signal quality.
    SignalQuality,
    /// Configure registration reporting and query registration.
    Register,
    /// Ensure packet-service attach.
    Attach,
    /// Define the PDN context.
    PdnDefine,
    /// Activate the PDN context.
    PdnActivate,
    /// Read the device identity strings.
    DeviceInfo,
    /// Power the modem off (best effort).
    PowerOff,
    /// Receive pending socket payload bytes.
    SocketReceive,
}

impl ServiceId {
    /// Tag used in transaction logging.
    pub fn request_tag(self) -> &'static str {
        match self {
            ServiceId::InitModem => "init-modem",
            ServiceId::CheckSim => "check-sim",
            ServiceId::RadioOn => "radio-on",
            ServiceId::SignalQuality => "signal-quality",
            ServiceId::Register => "register",
            ServiceId::Attach => "attach",
            ServiceId::PdnDefine => "pdn-define",
            ServiceId::PdnActivate => "pdn-activate",
            ServiceId::DeviceInfo => "device-info",
            ServiceId::PowerOff => "power-off",
            ServiceId::SocketReceive => "socket-receive",
        }
    }
}

// ============================================================================
// Steps and Plans
// ============================================================================

/// One step within a service request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SidStep {
    /// Liveness probe, bounded retries.
    Ping { attempts: u32 },
    /// Disable command echo.
    EchoOff,
    /// SIM status query. `unlocked` marks the post-PIN confirmation query.
    SimQuery { polls: u32, unlocked: bool },
    /// Submit the configured PIN.
    SimUnlock,
    /// Set radio functionality to full.
    RadioFun,
    /// Read +CSQ.
    ReadCsq,
    /// Enable unsolicited registration reporting.
    ConfigureReporting,
    /// Query current registration.
    QueryRegistration,
    /// Query packet attach.
    QueryAttach,
    /// Request packet attach.
    DoAttach,
    /// Define the PDN context.
    DefineContext,
    /// Activate the PDN context.
    ActivateContext,
    Manufacturer,
    Model,
    Revision,
    Serial,
    Iccid,
    /// Functionality off, best effort.
    FunOff,
    /// Socket receive.
    Receive,
}

/// A staged step: which command to run and how.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepProgram {
    pub step: SidStep,
    pub command: LogicalCommand,
    /// Whether this step completes the request on success.
    pub is_final: bool,
    /// Failures of this step do not fail the request.
    pub best_effort: bool,
    pub timeout_override: Option<Duration>,
    /// Pause before sending (SIM-busy re-polls).
    pub delay_before: Option<Duration>,
}

impl StepProgram {
    fn new(step: SidStep, command: LogicalCommand) -> Self {
        StepProgram {
            step,
            command,
            is_final: false,
            best_effort: false,
            timeout_override: None,
            delay_before: None,
        }
    }

    fn finality(mut self) -> Self {
        self.is_final = true;
        self
    }

    fn best_effort(mut self) -> Self {
        self.best_effort = true;
        self
    }

    fn after(mut self, delay: Duration) -> Self {
        self.delay_before = Some(delay);
        self
    }
}

/// Planner output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqAction {
    /// Run another step.
    Run(StepProgram),
    /// The request completed successfully.
    Done,
    /// The request failed.
    Failed(SidFailure),
}

/// Typed request failures the automaton branches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SidFailure {
    /// No SIM in the active slot.
    SimNotInserted,
    /// PIN or PUK required and not satisfiable.
    SimLocked,
    /// SIM still initializing after bounded re-polls.
    SimBusy,
    /// SIM reported an unrecognized state.
    SimError,
    /// A command step failed.
    Command(FailureCause),
}

/// Inputs a request may need beyond its command table defaults.
#[derive(Debug, Clone, Default)]
pub struct SidInputs {
    /// PIN of the active SIM slot, if configured.
    pub pin: Option<String>,
    /// PDN context for define/activate requests.
    pub pdn: Option<PdnConfig>,
    /// Socket handle for receive requests.
    pub socket: Option<u8>,
    /// Receive length, already clamped by the caller.
    pub recv_len: Option<usize>,
}

/// Completion of one service request, with the accumulated parse scratch.
#[derive(Debug, Clone)]
pub struct SidReport {
    pub failure: Option<SidFailure>,
    pub parsed: ParsedResponse,
}

impl SidReport {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

// ============================================================================
// Planner
// ============================================================================

/// The first step of a request.
pub fn first_step(sid: ServiceId) -> StepProgram {
    use LogicalCommand as L;
    use SidStep as S;
    match sid {
        ServiceId::InitModem => StepProgram::new(S::Ping { attempts: 1 }, L::Ping),
        ServiceId::CheckSim => StepProgram::new(
            S::SimQuery {
                polls: 0,
                unlocked: false,
            },
            L::Sim,
        ),
        ServiceId::RadioOn => StepProgram::new(S::RadioFun, L::RadioFun).finality(),
        ServiceId::SignalQuality => StepProgram::new(S::ReadCsq, L::Signal).finality(),
        ServiceId::Register => StepProgram::new(S::ConfigureReporting, L::Registration),
        ServiceId::Attach => StepProgram::new(S::QueryAttach, L::Attach),
        ServiceId::PdnDefine => StepProgram::new(S::DefineContext, L::PdnDefine).finality(),
        ServiceId::PdnActivate => StepProgram::new(S::ActivateContext, L::PdnActivate).finality(),
        ServiceId::DeviceInfo => StepProgram::new(S::Manufacturer, L::Manufacturer),
        ServiceId::PowerOff => StepProgram::new(S::FunOff, L::PowerOff)
            .finality()
            .best_effort(),
        ServiceId::SocketReceive => StepProgram::new(S::Receive, L::SocketReceive).finality(),
    }
}

/// Plan the step after `step` completed with `outcome`.
///
/// Pure: reads only its arguments. The parsed scratch carries the analyzer
/// output the branch decisions depend on.
pub fn next_step(
    step: SidStep,
    outcome: CommandOutcome,
    parsed: &ParsedResponse,
    inputs: &SidInputs,
) -> SeqAction {
    use LogicalCommand as L;
    use SidStep as S;

    // Best-effort steps complete the plan no matter how they ended.
    if matches!(step, S::FunOff) {
        return SeqAction::Done;
    }

    match (step, outcome) {
        // --- InitModem ---
        (S::Ping { .. }, CommandOutcome::Success) => {
            SeqAction::Run(StepProgram::new(S::EchoOff, L::EchoOff).finality())
        }
        (S::Ping { attempts }, CommandOutcome::Failed(cause)) => {
            if attempts < PING_ATTEMPTS {
                SeqAction::Run(StepProgram::new(
                    S::Ping {
                        attempts: attempts + 1,
                    },
                    L::Ping,
                ))
            } else {
                SeqAction::Failed(SidFailure::Command(cause))
            }
        }

        // --- CheckSim ---
        (S::SimQuery { polls, unlocked }, CommandOutcome::Success) => {
            match parsed.sim {
                Some(SimStatus::Ready) => SeqAction::Done,
                Some(SimStatus::PinRequired) if !unlocked && inputs.pin.is_some() => {
                    SeqAction::Run(StepProgram::new(S::SimUnlock, L::Sim))
                }
                Some(SimStatus::PinRequired) | Some(SimStatus::PukRequired) => {
                    SeqAction::Failed(SidFailure::SimLocked)
                }
                Some(SimStatus::NotInserted) => SeqAction::Failed(SidFailure::SimNotInserted),
                Some(SimStatus::Busy) => sim_busy_retry(polls, unlocked),
                _ => SeqAction::Failed(SidFailure::SimError),
            }
        }
        (S::SimQuery { polls, unlocked }, CommandOutcome::Failed(cause)) => match cause {
            FailureCause::Protocol(p) if p.is_sim_not_inserted() => {
                SeqAction::Failed(SidFailure::SimNotInserted)
            }
            FailureCause::Protocol(p) if p.is_sim_busy() => sim_busy_retry(polls, unlocked),
            other => SeqAction::Failed(SidFailure::Command(other)),
        },
        (S::SimUnlock, CommandOutcome::Success) => SeqAction::Run(StepProgram::new(
            S::SimQuery {
                polls: 0,
                unlocked: true,
            },
            L::Sim,
        )),
        // Wrong PIN surfaces as a protocol error; report a lock, not a
        // generic command failure, so the automaton does not retry it.
        (S::SimUnlock, CommandOutcome::Failed(_)) => SeqAction::Failed(SidFailure::SimLocked),

        // --- Register ---
        (S::ConfigureReporting, CommandOutcome::Success) => SeqAction::Run(
            StepProgram::new(S::QueryRegistration, L::Registration).finality(),
        ),

        // --- Attach ---
        (S::QueryAttach, CommandOutcome::Success) => {
            if parsed.attached == Some(true) {
                SeqAction::Done
            } else {
                SeqAction::Run(StepProgram::new(S::DoAttach, L::Attach).finality())
            }
        }

        // --- DeviceInfo ---
        (S::Manufacturer, CommandOutcome::Success) => {
            SeqAction::Run(StepProgram::new(S::Model, L::Model))
        }
        (S::Model, CommandOutcome::Success) => {
            SeqAction::Run(StepProgram::new(S::Revision, L::Revision))
        }
        (S::Revision, CommandOutcome::Success) => {
            SeqAction::Run(StepProgram::new(S::Serial, L::Serial))
        }
        (S::Serial, CommandOutcome::Success) => {
            SeqAction::Run(StepProgram::new(S::Iccid, L::Iccid).finality())
        }

        // --- Single-step and final steps ---
        (_, CommandOutcome::Success) => SeqAction::Done,
        (_, CommandOutcome::Failed(cause)) => SeqAction::Failed(SidFailure::Command(cause)),
    }
}

fn sim_busy_retry(polls: u32, unlocked: bool) -> SeqAction {
    if polls < SIM_BUSY_POLLS {
        SeqAction::Run(
            StepProgram::new(
                SidStep::SimQuery {
                    polls: polls + 1,
                    unlocked,
                },
                LogicalCommand::Sim,
            )
            .after(SIM_BUSY_POLL_DELAY),
        )
    } else {
        SeqAction::Failed(SidFailure::SimBusy)
    }
}

// ============================================================================
// Driver
// ============================================================================

/// Stage the builder parameters a step reads.
fn stage(step: SidStep, inputs: &SidInputs, ctx: &mut TransactionContext) {
    use SidStep as S;
    match step {
        S::SimQuery { .. } => ctx.params.pin = None,
        S::SimUnlock => ctx.params.pin = inputs.pin.clone(),
        S::RadioFun => ctx.params.cfun_level = Some(1),
        S::ConfigureReporting => ctx.params.reporting_mode = Some(2),
        S::QueryRegistration => ctx.params.reporting_mode = None,
        S::QueryAttach => ctx.params.attach = None,
        S::DoAttach => ctx.params.attach = Some(true),
        S::DefineContext | S::ActivateContext => {
            ctx.params.pdn = inputs.pdn.clone();
            ctx.params.activate = Some(true);
        }
        S::Receive => {
            ctx.params.socket = inputs.socket;
            ctx.params.recv_len = inputs.recv_len;
        }
        S::Ping { .. } | S::EchoOff | S::ReadCsq | S::FunOff => {}
        S::Manufacturer | S::Model | S::Revision | S::Serial | S::Iccid => {}
    }
}

/// Execute one service request to completion.
///
/// Transport and framing failures abort with `Err`; everything the planner
/// can reason about lands in the report.
pub fn run_sid(
    exchanger: &mut AtExchanger,
    set: &CommandSet,
    sid: ServiceId,
    inputs: &SidInputs,
) -> AtResult<SidReport> {
    let mut ctx = TransactionContext::begin(sid.request_tag());
    // Echo may still be on until InitModem's E0 lands.
    ctx.echo_enabled = sid == ServiceId::InitModem;

    let mut program = first_step(sid);
    loop {
        if let Some(delay) = program.delay_before {
            thread::sleep(delay);
        }
        stage(program.step, inputs, &mut ctx);
        ctx.is_final_step = program.is_final;
        ctx.best_effort = program.best_effort;

        let outcome =
            exchanger.run_command(set.resolve(program.command), program.timeout_override, &mut ctx)?;

        if program.step == SidStep::EchoOff && outcome.is_success() {
            ctx.echo_enabled = false;
        }

        match next_step(program.step, outcome, &ctx.parsed, inputs) {
            SeqAction::Run(next) => program = next,
            SeqAction::Done => {
                return Ok(SidReport {
                    failure: None,
                    parsed: ctx.parsed,
                })
            }
            SeqAction::Failed(failure) => {
                return Ok(SidReport {
                    failure: Some(failure),
                    parsed: ctx.parsed,
                })
            }
        }
    }
}
