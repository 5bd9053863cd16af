//! Outbound line events and control-surface views.
//!
//! The [`LineService`](super::service::LineService) emits [`LineEvent`]s
//! through the [`EventSink`](super::ports::EventSink) port.  Adapters on
//! the other side decide what to do with them: log them, publish them or
//! push them to an operator screen.
//!
//! [`LineSnapshot`] and [`RunSummary`] are the values returned by `poll`
//! and `summary`; both serialize to JSON for whatever transport fronts
//! the service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ConsistencyError;
use crate::production::{BoxRecord, BoxSubState, ProductionRun, RunDescriptor, RunStatus};
use crate::signals::Signal;

/// Structured events emitted by the line core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    /// A run was created and the conveyor commanded.
    RunStarted { quantity: u32 },
    /// The line acknowledged the conveyor command.
    ConveyorAcknowledged,
    /// A label print was requested for a box.
    PrintRequested { ordinal: u32 },
    /// A box scanned inside its window.
    BoxAccepted { ordinal: u32, accepted: u32 },
    /// A box missed its scan window; the line is halted.
    BoxRejected { ordinal: u32, rejected: u32 },
    /// The next box reached the print station while the current one is
    /// still being scanned.
    OverlapDetected { ordinal: u32 },
    /// Every requested box was accepted.
    RunCompleted { accepted: u32, rejected: u32 },
    /// A stopped run resumed with a fresh code for the rejected box.
    RunRestarted { ordinal: u32 },
    /// The run was discarded on operator request.
    RunReset,
    /// The label printer failed; the box stays at the print station.
    PrintFailed { ordinal: u32 },
    /// Structurally invalid state was dropped.
    StateDiscarded(ConsistencyError),
    /// The accepted-count register disagreed with the run and was rewritten.
    CounterDrift { register: u16, expected: u32 },
}

/// Status reported by the control surface.  `Idle` means no run exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineStatus {
    Idle,
    WaitingForConveyor,
    Running,
    Stopped,
    Completed,
}

impl From<RunStatus> for LineStatus {
    fn from(status: RunStatus) -> Self {
        match status {
            RunStatus::WaitingForConveyor => Self::WaitingForConveyor,
            RunStatus::Running => Self::Running,
            RunStatus::Stopped => Self::Stopped,
            RunStatus::Completed => Self::Completed,
        }
    }
}

/// Poll result: what an operator screen needs to render the line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineSnapshot {
    pub status: LineStatus,
    /// Present only while running.
    pub sub_state: Option<BoxSubState>,
    pub current_code: Option<String>,
    pub current_ordinal: Option<u32>,
    pub scan_time_remaining_secs: Option<f64>,
    pub overlap_pending: bool,
    pub accepted: u32,
    pub rejected: u32,
    pub requested: u32,
    pub remaining: u32,
    pub can_restart: bool,
}

impl LineSnapshot {
    pub fn idle() -> Self {
        Self {
            status: LineStatus::Idle,
            sub_state: None,
            current_code: None,
            current_ordinal: None,
            scan_time_remaining_secs: None,
            overlap_pending: false,
            accepted: 0,
            rejected: 0,
            requested: 0,
            remaining: 0,
            can_restart: false,
        }
    }

    pub fn of(run: Option<&ProductionRun>, now: DateTime<Utc>) -> Self {
        let Some(run) = run else {
            return Self::idle();
        };
        let running = run.status == RunStatus::Running;
        Self {
            status: run.status.into(),
            sub_state: running.then_some(run.sub_state),
            current_code: run.current().map(|b| b.code.token.clone()),
            current_ordinal: run.current_ordinal(),
            scan_time_remaining_secs: run
                .scan_time_remaining(now)
                .map(|d| d.num_milliseconds() as f64 / 1000.0),
            overlap_pending: run.pending_overlap.is_some(),
            accepted: run.accepted_count,
            rejected: run.rejected_count,
            requested: run.requested_quantity,
            remaining: run.remaining(),
            can_restart: run.status == RunStatus::Stopped,
        }
    }
}

/// One register as read for the summary view.  `value` is `None` when the
/// read failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterReading {
    pub signal: Signal,
    pub address: u32,
    pub value: Option<u16>,
}

/// Full state plus a live register snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub snapshot: LineSnapshot,
    pub descriptor: Option<RunDescriptor>,
    pub started_at: Option<DateTime<Utc>>,
    pub line_started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub scan_deadline: Option<DateTime<Utc>>,
    /// One record per box slot, in ordinal order.
    pub boxes: Vec<BoxRecord>,
    /// Every rejected attempt, oldest first.
    pub rejected_history: Vec<BoxRecord>,
    pub registers: Vec<RegisterReading>,
}
