//! Box sequencer: function-pointer phase table over a production run.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │  PhaseTable                                                    │
//! │  ┌────────────────────┬──────────┬──────────┬────────────────┐ │
//! │  │ PhaseId            │ on_enter │ on_exit  │ on_update      │ │
//! │  ├────────────────────┼──────────┼──────────┼────────────────┤ │
//! │  │ WaitingForConveyor │ -        │ fn(ctx)  │ fn(ctx)->Opt<> │ │
//! │  │ AwaitingProximity1 │ -        │ -        │ fn(ctx)->Opt<> │ │
//! │  │ AwaitingProximity2 │ -        │ -        │ fn(ctx)->Opt<> │ │
//! │  │ AwaitingScan       │ fn(ctx)  │ fn(ctx)  │ fn(ctx)->Opt<> │ │
//! │  │ Stopped            │ fn(ctx)  │ fn(ctx)  │ fn(ctx)->Opt<> │ │
//! │  │ Completed          │ fn(ctx)  │ -        │ fn(ctx)->Opt<> │ │
//! │  └────────────────────┴──────────┴──────────┴────────────────┘ │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The phase is derived from the run itself (status plus box sub-state),
//! so the sequencer holds no state of its own.  [`BoxSequencer::step`] is a
//! pure function of (run, sampled signals, time): it works on a clone of
//! the run and returns the next run together with the register writes and
//! side effects the orchestrator must apply.  At most one transition
//! happens per step.

pub mod context;
pub mod states;

use chrono::{DateTime, Utc};
use log::info;

use crate::app::events::LineEvent;
use crate::config::LineConfig;
use crate::error::ValidationError;
use crate::production::{BoxSubState, GeneratedCode, ProductionRun, RunStatus};
use crate::signals::Signal;
use context::{SignalSample, StepContext, Transition};

// ---------------------------------------------------------------------------
// Phase identity
// ---------------------------------------------------------------------------

/// Every phase a run can be in.
/// Must stay in sync with the table built in [`states::build_phase_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PhaseId {
    WaitingForConveyor = 0,
    AwaitingProximity1 = 1,
    AwaitingProximity2 = 2,
    AwaitingScan = 3,
    Stopped = 4,
    Completed = 5,
}

impl PhaseId {
    pub const COUNT: usize = 6;

    /// Phase a run is in.
    pub fn of(run: &ProductionRun) -> Self {
        match run.status {
            RunStatus::WaitingForConveyor => Self::WaitingForConveyor,
            RunStatus::Stopped => Self::Stopped,
            RunStatus::Completed => Self::Completed,
            RunStatus::Running => match run.sub_state {
                BoxSubState::AwaitingProximity1 => Self::AwaitingProximity1,
                BoxSubState::AwaitingProximity2 => Self::AwaitingProximity2,
                BoxSubState::AwaitingScan => Self::AwaitingScan,
            },
        }
    }

    /// Record this phase on the run.
    fn apply(self, run: &mut ProductionRun) {
        let (status, sub_state) = match self {
            Self::WaitingForConveyor => (RunStatus::WaitingForConveyor, run.sub_state),
            Self::AwaitingProximity1 => (RunStatus::Running, BoxSubState::AwaitingProximity1),
            Self::AwaitingProximity2 => (RunStatus::Running, BoxSubState::AwaitingProximity2),
            Self::AwaitingScan => (RunStatus::Running, BoxSubState::AwaitingScan),
            Self::Stopped => (RunStatus::Stopped, run.sub_state),
            Self::Completed => (RunStatus::Completed, run.sub_state),
        };
        run.status = status;
        run.sub_state = sub_state;
    }

    /// Registers to read before stepping this phase.  Nothing else is
    /// sampled, so a stale level on an unrelated sensor cannot be observed.
    pub fn sampled_signals(self, overlap_latched: bool) -> &'static [Signal] {
        match self {
            Self::WaitingForConveyor => &[Signal::ConveyorControl],
            Self::AwaitingProximity1 => &[Signal::Proximity1],
            Self::AwaitingProximity2 => &[Signal::Proximity2],
            Self::AwaitingScan if overlap_latched => &[Signal::Scanner, Signal::AcceptedCount],
            Self::AwaitingScan => &[Signal::Scanner, Signal::AcceptedCount, Signal::Proximity1],
            Self::Stopped | Self::Completed => &[],
        }
    }
}

// ---------------------------------------------------------------------------
// Function-pointer type aliases
// ---------------------------------------------------------------------------

/// Signature for `on_enter` and `on_exit` actions.
pub type PhaseActionFn = fn(&mut StepContext);

/// Signature for the per-step update handler.
/// Returns `Some(next)` to trigger a transition, or `None` to stay.
pub type PhaseUpdateFn = fn(&mut StepContext) -> Option<PhaseId>;

// ---------------------------------------------------------------------------
// Phase descriptor (one row in the table)
// ---------------------------------------------------------------------------

pub struct PhaseDescriptor {
    pub id: PhaseId,
    pub name: &'static str,
    pub on_enter: Option<PhaseActionFn>,
    pub on_exit: Option<PhaseActionFn>,
    pub on_update: PhaseUpdateFn,
}

// ---------------------------------------------------------------------------
// Sequencer engine
// ---------------------------------------------------------------------------

pub struct BoxSequencer {
    /// Fixed-size table indexed by `PhaseId as usize`.
    table: [PhaseDescriptor; PhaseId::COUNT],
    config: LineConfig,
}

impl BoxSequencer {
    pub fn new(config: LineConfig) -> Self {
        Self {
            table: states::build_phase_table(),
            config,
        }
    }

    pub fn config(&self) -> &LineConfig {
        &self.config
    }

    /// Advance `run` by one step.
    ///
    /// 1. Validate the run; an invalid run yields a `Discard` effect.
    /// 2. Call `on_update` for the current phase.
    /// 3. If it returns `Some(next)`: `on_exit(current)` → record phase →
    ///    `on_enter(next)`.
    pub fn step(&self, run: &ProductionRun, sample: &SignalSample, now: DateTime<Utc>) -> Transition {
        if let Err(reason) = run.validate() {
            return Transition::discard(run.clone(), reason);
        }

        let mut ctx = StepContext::new(run.clone(), *sample, now, &self.config);
        let current = PhaseId::of(&ctx.run);
        if let Some(next) = (self.table[current as usize].on_update)(&mut ctx) {
            self.transition(current, next, &mut ctx);
        }
        ctx.into_transition()
    }

    /// Resume a stopped run.  The rejected record is archived and the
    /// current slot receives `code`.
    pub fn restart(
        &self,
        run: &ProductionRun,
        code: GeneratedCode,
        now: DateTime<Utc>,
    ) -> Result<Transition, ValidationError> {
        if run.status != RunStatus::Stopped {
            return Err(ValidationError::NotStopped(run.status));
        }
        if let Err(reason) = run.validate() {
            return Ok(Transition::discard(run.clone(), reason));
        }

        let mut ctx = StepContext::new(run.clone(), SignalSample::default(), now, &self.config);
        ctx.run.replace_current_code(code);
        let ordinal = ctx.run.current_ordinal().unwrap_or_default();
        ctx.emit(LineEvent::RunRestarted { ordinal });
        self.transition(PhaseId::Stopped, PhaseId::AwaitingProximity1, &mut ctx);
        Ok(ctx.into_transition())
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn transition(&self, from: PhaseId, to: PhaseId, ctx: &mut StepContext) {
        info!(
            "Sequencer transition: {} -> {}",
            self.table[from as usize].name, self.table[to as usize].name
        );

        if let Some(exit) = self.table[from as usize].on_exit {
            exit(ctx);
        }

        to.apply(&mut ctx.run);

        if let Some(enter) = self.table[to as usize].on_enter {
            enter(ctx);
        }
    }
}
