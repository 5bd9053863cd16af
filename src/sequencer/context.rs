//! Working context threaded through every phase handler.
//!
//! `StepContext` is the blackboard a handler reads the sampled signals
//! from and records its decisions on: the working copy of the run, the
//! register writes to issue, and the side effects the orchestrator must
//! perform before any of those writes.  Handlers never touch the bus.

use chrono::{DateTime, Utc};
use log::error;

use crate::app::events::LineEvent;
use crate::config::LineConfig;
use crate::error::ConsistencyError;
use crate::production::ProductionRun;
use crate::signals::Signal;

/// Upper bound on register writes produced by one step.
pub const MAX_WRITES: usize = 8;
/// Upper bound on side effects produced by one step.
pub const MAX_EFFECTS: usize = 2;

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Registers read for one step.  `None` means the register was not part of
/// the sampling plan for the current phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignalSample {
    pub conveyor: Option<u16>,
    pub proximity_1: Option<bool>,
    pub proximity_2: Option<bool>,
    pub scanner: Option<bool>,
    pub accepted_register: Option<u16>,
}

impl SignalSample {
    pub fn proximity_1_active(&self) -> bool {
        self.proximity_1 == Some(true)
    }

    pub fn proximity_2_active(&self) -> bool {
        self.proximity_2 == Some(true)
    }

    pub fn scanner_active(&self) -> bool {
        self.scanner == Some(true)
    }
}

// ---------------------------------------------------------------------------
// Outputs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterWrite {
    pub signal: Signal,
    pub value: u16,
}

/// Work the orchestrator performs outside the register file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SideEffect {
    /// Print the label of box `ordinal`.
    Print { ordinal: u32, artifact: String },
    /// The run failed validation; drop it and restore idle registers.
    Discard(ConsistencyError),
}

/// Result of one sequencer step.
#[derive(Debug, Clone)]
pub struct Transition {
    pub run: ProductionRun,
    pub writes: heapless::Vec<RegisterWrite, MAX_WRITES>,
    pub effects: heapless::Vec<SideEffect, MAX_EFFECTS>,
    pub events: Vec<LineEvent>,
}

impl Transition {
    pub(crate) fn discard(run: ProductionRun, reason: ConsistencyError) -> Self {
        let mut effects = heapless::Vec::new();
        // Capacity is at least one.
        let _ = effects.push(SideEffect::Discard(reason));
        Self {
            run,
            writes: heapless::Vec::new(),
            effects,
            events: Vec::new(),
        }
    }

    pub fn discarded(&self) -> Option<ConsistencyError> {
        self.effects.iter().find_map(|e| match e {
            SideEffect::Discard(reason) => Some(*reason),
            SideEffect::Print { .. } => None,
        })
    }

    pub fn prints(&self) -> impl Iterator<Item = (u32, &str)> {
        self.effects.iter().filter_map(|e| match e {
            SideEffect::Print { ordinal, artifact } => Some((*ordinal, artifact.as_str())),
            SideEffect::Discard(_) => None,
        })
    }
}

// ---------------------------------------------------------------------------
// StepContext
// ---------------------------------------------------------------------------

pub struct StepContext<'a> {
    /// Working copy; committed only if every write succeeds.
    pub run: ProductionRun,
    pub sample: SignalSample,
    pub now: DateTime<Utc>,
    pub config: &'a LineConfig,
    pub writes: heapless::Vec<RegisterWrite, MAX_WRITES>,
    pub effects: heapless::Vec<SideEffect, MAX_EFFECTS>,
    pub events: Vec<LineEvent>,
}

impl<'a> StepContext<'a> {
    pub fn new(
        run: ProductionRun,
        sample: SignalSample,
        now: DateTime<Utc>,
        config: &'a LineConfig,
    ) -> Self {
        Self {
            run,
            sample,
            now,
            config,
            writes: heapless::Vec::new(),
            effects: heapless::Vec::new(),
            events: Vec::new(),
        }
    }

    /// Queue a register write.
    pub fn write(&mut self, signal: Signal, value: u16) {
        if self.writes.push(RegisterWrite { signal, value }).is_err() {
            error!("step write list full, dropping {} <- {}", signal.name(), value);
        }
    }

    /// Queue a register clear.
    pub fn clear(&mut self, signal: Signal) {
        self.write(signal, crate::signals::CLEARED);
    }

    /// Request a label print for box `ordinal`.
    pub fn request_print(&mut self, ordinal: u32) {
        let Some(record) = self.run.boxes.get(ordinal.saturating_sub(1) as usize) else {
            error!("print requested for unknown box {ordinal}");
            return;
        };
        let artifact = record.code.artifact.clone();
        if self
            .effects
            .push(SideEffect::Print { ordinal, artifact })
            .is_err()
        {
            error!("step effect list full, dropping print of box {ordinal}");
            return;
        }
        self.events.push(LineEvent::PrintRequested { ordinal });
    }

    pub fn emit(&mut self, event: LineEvent) {
        self.events.push(event);
    }

    pub fn into_transition(self) -> Transition {
        Transition {
            run: self.run,
            writes: self.writes,
            effects: self.effects,
            events: self.events,
        }
    }
}
