//! Production run aggregate.
//!
//! [`ProductionRun`] is the single authoritative record of one batch: what
//! is being produced, the pre-generated code for every box, where the line
//! is in the batch and how every box ended.  [`ProductionState`] owns at
//! most one run and guards the lifecycle rules around it.
//!
//! ```text
//!  start ──▶ WaitingForConveyor ──[line ack]──▶ Running ──[last accept]──▶ Completed
//!                                                │   ▲
//!                                       [timeout]│   │[restart]
//!                                                ▼   │
//!                                               Stopped
//!
//!  reset: any status ──▶ (no run)
//! ```
//!
//! Only the sequencer mutates a run after `start`; it works on a clone and
//! the orchestrator commits the clone once every bus write has succeeded.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ConsistencyError, LabelError, ValidationError};

// ---------------------------------------------------------------------------
// Descriptor and codes
// ---------------------------------------------------------------------------

/// Free-form labels describing what the batch produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunDescriptor {
    pub product: String,
    pub brand: String,
    pub production_type: String,
}

impl RunDescriptor {
    pub fn new(
        product: impl Into<String>,
        brand: impl Into<String>,
        production_type: impl Into<String>,
    ) -> Self {
        Self {
            product: product.into(),
            brand: brand.into(),
            production_type: production_type.into(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.product.trim().is_empty() {
            return Err(ValidationError::MissingDescriptor("product"));
        }
        if self.brand.trim().is_empty() {
            return Err(ValidationError::MissingDescriptor("brand"));
        }
        if self.production_type.trim().is_empty() {
            return Err(ValidationError::MissingDescriptor("production_type"));
        }
        Ok(())
    }
}

/// A unique box code and the label artifact that carries it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedCode {
    /// Globally unique token printed on the box.
    pub token: String,
    /// Reference handed to the printer.
    pub artifact: String,
    /// Label payload encoded into the artifact.
    pub payload: String,
}

// ---------------------------------------------------------------------------
// Boxes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoxOutcome {
    Pending,
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxRecord {
    /// 1-based position in the batch.
    pub ordinal: u32,
    pub code: GeneratedCode,
    pub outcome: BoxOutcome,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl BoxRecord {
    pub fn new(ordinal: u32, code: GeneratedCode) -> Self {
        Self {
            ordinal,
            code,
            outcome: BoxOutcome::Pending,
            resolved_at: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    WaitingForConveyor,
    Running,
    Stopped,
    Completed,
}

impl RunStatus {
    /// A run in an active status blocks a new `start`.
    pub fn is_active(self) -> bool {
        !matches!(self, Self::Completed)
    }
}

/// Where the current box is between the two presence sensors and the
/// scanner.  Only meaningful while the run is `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoxSubState {
    AwaitingProximity1,
    AwaitingProximity2,
    AwaitingScan,
}

// ---------------------------------------------------------------------------
// ProductionRun
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionRun {
    pub descriptor: RunDescriptor,
    pub requested_quantity: u32,
    /// One record per box, indexed by `ordinal - 1`.
    pub boxes: Vec<BoxRecord>,
    /// Rejected attempts replaced by a restart, oldest first.
    pub rejected_history: Vec<BoxRecord>,
    pub current_index: u32,
    pub accepted_count: u32,
    pub rejected_count: u32,
    pub status: RunStatus,
    pub sub_state: BoxSubState,
    /// Set on entering `AwaitingScan`, cleared when the box resolves.
    pub scan_deadline: Option<DateTime<Utc>>,
    /// Ordinal of the next box whose proximity-1 fired early.
    pub pending_overlap: Option<u32>,
    pub started_at: DateTime<Utc>,
    pub line_started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl ProductionRun {
    /// Build a fresh run.  The quantity is the number of codes supplied.
    pub fn new(
        descriptor: RunDescriptor,
        codes: Vec<GeneratedCode>,
        now: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        descriptor.validate()?;
        if codes.is_empty() {
            return Err(ValidationError::ZeroQuantity);
        }
        let boxes: Vec<BoxRecord> = codes
            .into_iter()
            .enumerate()
            .map(|(i, code)| BoxRecord::new(i as u32 + 1, code))
            .collect();

        Ok(Self {
            descriptor,
            requested_quantity: boxes.len() as u32,
            boxes,
            rejected_history: Vec::new(),
            current_index: 0,
            accepted_count: 0,
            rejected_count: 0,
            status: RunStatus::WaitingForConveyor,
            sub_state: BoxSubState::AwaitingProximity1,
            scan_deadline: None,
            pending_overlap: None,
            started_at: now,
            line_started_at: None,
            ended_at: None,
        })
    }

    /// The box the line is currently working on.
    pub fn current(&self) -> Option<&BoxRecord> {
        self.boxes.get(self.current_index as usize)
    }

    pub fn current_ordinal(&self) -> Option<u32> {
        self.current().map(|b| b.ordinal)
    }

    /// Ordinal of the box queued behind the current one, if the batch has one.
    pub fn next_ordinal(&self) -> Option<u32> {
        let next = self.current_index + 1;
        (next < self.requested_quantity).then_some(next + 1)
    }

    pub fn remaining(&self) -> u32 {
        self.requested_quantity.saturating_sub(self.current_index)
    }

    pub fn is_finished(&self) -> bool {
        self.current_index >= self.requested_quantity
    }

    /// Time left in the scan window, zero once it has elapsed.
    pub fn scan_time_remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.scan_deadline
            .map(|deadline| (deadline - now).max(Duration::zero()))
    }

    /// Every resolved or pending record, rejected attempts first.
    pub fn all_records(&self) -> impl Iterator<Item = &BoxRecord> {
        self.rejected_history.iter().chain(self.boxes.iter())
    }

    // ── Mutators (sequencer only) ─────────────────────────────

    /// Mark the current box accepted and advance to the next one.
    pub(crate) fn accept_current(&mut self, now: DateTime<Utc>) {
        if let Some(record) = self.boxes.get_mut(self.current_index as usize) {
            record.outcome = BoxOutcome::Accepted;
            record.resolved_at = Some(now);
            self.accepted_count += 1;
            self.current_index += 1;
        }
    }

    /// Record a failed attempt on the current box.  The box itself stays
    /// Pending and the index does not move; the attempt is kept in
    /// `rejected_history`.
    pub(crate) fn reject_current(&mut self, now: DateTime<Utc>) {
        if let Some(record) = self.boxes.get(self.current_index as usize) {
            let mut attempt = record.clone();
            attempt.outcome = BoxOutcome::Rejected;
            attempt.resolved_at = Some(now);
            self.rejected_history.push(attempt);
            self.rejected_count += 1;
        }
    }

    /// Give the current slot a fresh Pending record with a new code.
    pub(crate) fn replace_current_code(&mut self, code: GeneratedCode) {
        if let Some(slot) = self.boxes.get_mut(self.current_index as usize) {
            *slot = BoxRecord::new(slot.ordinal, code);
        }
    }

    // ── Structural validation ─────────────────────────────────

    /// Check every structural rule of the aggregate.
    pub fn validate(&self) -> Result<(), ConsistencyError> {
        use ConsistencyError::Invalid;

        let q = self.requested_quantity;
        if q == 0 {
            return Err(Invalid("requested quantity is zero"));
        }
        if self.boxes.len() != q as usize {
            return Err(Invalid("box count differs from requested quantity"));
        }
        if self.current_index > q {
            return Err(Invalid("current index beyond quantity"));
        }
        if self.accepted_count != self.current_index {
            return Err(Invalid("accepted count differs from current index"));
        }

        for (i, record) in self.boxes.iter().enumerate() {
            if record.ordinal != i as u32 + 1 {
                return Err(Invalid("box ordinals out of sequence"));
            }
            let i = i as u32;
            let expected = if i < self.current_index {
                BoxOutcome::Accepted
            } else {
                BoxOutcome::Pending
            };
            if record.outcome != expected {
                return Err(Invalid("box outcome inconsistent with position"));
            }
        }

        if self
            .rejected_history
            .iter()
            .any(|r| r.outcome != BoxOutcome::Rejected || r.ordinal == 0 || r.ordinal > q)
        {
            return Err(Invalid("rejected history holds a non-rejected record"));
        }
        if self.rejected_count as usize != self.rejected_history.len() {
            return Err(Invalid("rejected count differs from rejected records"));
        }

        // A stopped run's last attempt still shares its code with the
        // current box until restart issues a new one.
        let stopped = self.status == RunStatus::Stopped;
        let mut history = self.rejected_history.as_slice();
        if stopped {
            let current = self.boxes.get(self.current_index as usize);
            match (history.split_last(), current) {
                (Some((last, rest)), Some(current))
                    if last.ordinal == current.ordinal && last.code == current.code =>
                {
                    history = rest;
                }
                _ => return Err(Invalid("stopped run has no matching rejected attempt")),
            }
        }
        let mut tokens = BTreeSet::new();
        if !history
            .iter()
            .chain(self.boxes.iter())
            .all(|r| tokens.insert(r.code.token.as_str()))
        {
            return Err(Invalid("duplicate box code"));
        }

        match self.status {
            RunStatus::WaitingForConveyor if self.current_index != 0 => {
                return Err(Invalid("waiting run has already processed boxes"));
            }
            RunStatus::Completed if self.current_index != q => {
                return Err(Invalid("completed run has unresolved boxes"));
            }
            RunStatus::Stopped | RunStatus::WaitingForConveyor if self.current_index >= q => {
                return Err(Invalid("run has no current box"));
            }
            _ => {}
        }
        if (self.status == RunStatus::Completed) != self.ended_at.is_some() {
            return Err(Invalid("end time set on an unfinished run"));
        }

        let scanning =
            self.status == RunStatus::Running && self.sub_state == BoxSubState::AwaitingScan;
        if scanning != self.scan_deadline.is_some() {
            return Err(Invalid("scan deadline outside AwaitingScan"));
        }
        if let Some(queued) = self.pending_overlap {
            if !scanning || Some(queued) != self.next_ordinal() {
                return Err(Invalid("overlap latch does not reference the next box"));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ProductionState
// ---------------------------------------------------------------------------

/// Holder of the single production run.
#[derive(Debug, Default)]
pub struct ProductionState {
    run: Option<ProductionRun>,
}

impl ProductionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_run(run: ProductionRun) -> Self {
        Self { run: Some(run) }
    }

    pub fn run(&self) -> Option<&ProductionRun> {
        self.run.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.run.as_ref().is_some_and(|r| r.status.is_active())
    }

    /// Validate a start request and build the run, generating every box
    /// code up front.  Nothing is installed: the caller installs the run
    /// with [`install`](Self::install) once the line has been commanded,
    /// so a failure anywhere leaves the state untouched.
    pub fn start(
        &self,
        descriptor: RunDescriptor,
        quantity: u32,
        max_quantity: u32,
        now: DateTime<Utc>,
        mut generate: impl FnMut(&RunDescriptor, u32, u32) -> Result<GeneratedCode, LabelError>,
    ) -> Result<ProductionRun, crate::error::Error> {
        if self.is_active() {
            return Err(ValidationError::RunAlreadyActive.into());
        }
        descriptor.validate()?;
        if quantity == 0 {
            return Err(ValidationError::ZeroQuantity.into());
        }
        if quantity > max_quantity {
            return Err(ValidationError::QuantityTooLarge {
                requested: quantity,
                max: max_quantity,
            }
            .into());
        }

        let codes = (1..=quantity)
            .map(|ordinal| generate(&descriptor, ordinal, quantity))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ProductionRun::new(descriptor, codes, now)?)
    }

    /// Install a run built by [`start`](Self::start), replacing any
    /// completed one.
    pub fn install(&mut self, run: ProductionRun) {
        self.run = Some(run);
    }

    /// Replace the run with the sequencer's output.
    pub fn commit(&mut self, run: ProductionRun) {
        self.run = Some(run);
    }

    /// Drop the run, whatever its status.
    pub fn reset(&mut self) -> Option<ProductionRun> {
        self.run.take()
    }
}
