//! Concrete phase handler functions and table builder.
//!
//! Each phase is defined by three plain `fn` pointers.  Handlers record
//! register writes and side effects on the [`StepContext`]; a clear is
//! always queued before the phase that consumed the signal is left.
//!
//! ```text
//!  WAITING ──[line ack]──▶ PROX1 ──[prox1: print]──▶ PROX2 ──[prox2]──▶ SCAN
//!                            ▲                         ▲                  │
//!                            │                         └──[scan, overlap]─┤
//!                            ├────────────[scan]──────────────────────────┤
//!                            │                                            │
//!                            └──[restart]── STOPPED ◀──[window elapsed]───┤
//!                                                                         │
//!  any running phase ──[index = quantity]──▶ COMPLETED ◀──[last scan]─────┘
//! ```

use chrono::Duration;
use log::{info, warn};

use super::context::StepContext;
use super::{PhaseDescriptor, PhaseId};
use crate::app::events::LineEvent;
use crate::signals::{
    COMPLETE, CONVEYOR_STOP, INDICATOR_ACCEPTED, INDICATOR_REJECTED, Signal,
};

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

/// Build the static phase table.  Called once per sequencer.
pub fn build_phase_table() -> [PhaseDescriptor; PhaseId::COUNT] {
    [
        // Index 0: WaitingForConveyor
        PhaseDescriptor {
            id: PhaseId::WaitingForConveyor,
            name: "WaitingForConveyor",
            on_enter: None,
            on_exit: Some(waiting_exit),
            on_update: waiting_update,
        },
        // Index 1: AwaitingProximity1
        PhaseDescriptor {
            id: PhaseId::AwaitingProximity1,
            name: "AwaitingProximity1",
            on_enter: None,
            on_exit: None,
            on_update: proximity_1_update,
        },
        // Index 2: AwaitingProximity2
        PhaseDescriptor {
            id: PhaseId::AwaitingProximity2,
            name: "AwaitingProximity2",
            on_enter: None,
            on_exit: None,
            on_update: proximity_2_update,
        },
        // Index 3: AwaitingScan
        PhaseDescriptor {
            id: PhaseId::AwaitingScan,
            name: "AwaitingScan",
            on_enter: Some(scan_enter),
            on_exit: Some(scan_exit),
            on_update: scan_update,
        },
        // Index 4: Stopped
        PhaseDescriptor {
            id: PhaseId::Stopped,
            name: "Stopped",
            on_enter: Some(stopped_enter),
            on_exit: Some(stopped_exit),
            on_update: hold,
        },
        // Index 5: Completed
        PhaseDescriptor {
            id: PhaseId::Completed,
            name: "Completed",
            on_enter: Some(completed_enter),
            on_exit: None,
            on_update: hold,
        },
    ]
}

/// Phases that only leave on an explicit command.
fn hold(_ctx: &mut StepContext) -> Option<PhaseId> {
    None
}

/// Shared guard for every running phase.
fn batch_finished(ctx: &StepContext) -> bool {
    ctx.run.is_finished()
}

// ═══════════════════════════════════════════════════════════════════════════
//  WAITING: conveyor commanded, line not yet moving
// ═══════════════════════════════════════════════════════════════════════════

fn waiting_update(ctx: &mut StepContext) -> Option<PhaseId> {
    (ctx.sample.conveyor == Some(ctx.config.line_ack_value)).then_some(PhaseId::AwaitingProximity1)
}

fn waiting_exit(ctx: &mut StepContext) {
    for signal in Signal::TRANSIENT {
        ctx.clear(signal);
    }
    ctx.run.line_started_at = Some(ctx.now);
    ctx.emit(LineEvent::ConveyorAcknowledged);
    info!("WAITING: line acknowledged, {} boxes to go", ctx.run.remaining());
}

// ═══════════════════════════════════════════════════════════════════════════
//  PROXIMITY 1: box arriving at the print station
// ═══════════════════════════════════════════════════════════════════════════

fn proximity_1_update(ctx: &mut StepContext) -> Option<PhaseId> {
    if batch_finished(ctx) {
        return Some(PhaseId::Completed);
    }
    if !ctx.sample.proximity_1_active() {
        return None;
    }
    let ordinal = ctx.run.current_ordinal()?;
    ctx.request_print(ordinal);
    ctx.clear(Signal::Proximity1);
    Some(PhaseId::AwaitingProximity2)
}

// ═══════════════════════════════════════════════════════════════════════════
//  PROXIMITY 2: labelled box arriving at the scanner
// ═══════════════════════════════════════════════════════════════════════════

fn proximity_2_update(ctx: &mut StepContext) -> Option<PhaseId> {
    if batch_finished(ctx) {
        return Some(PhaseId::Completed);
    }
    if !ctx.sample.proximity_2_active() {
        return None;
    }
    ctx.clear(Signal::Proximity2);
    Some(PhaseId::AwaitingScan)
}

// ═══════════════════════════════════════════════════════════════════════════
//  SCAN: waiting for the code inside the accept window
// ═══════════════════════════════════════════════════════════════════════════

fn scan_enter(ctx: &mut StepContext) {
    let window = Duration::seconds(i64::from(ctx.config.accept_window_secs));
    ctx.run.scan_deadline = Some(ctx.now + window);
}

fn scan_exit(ctx: &mut StepContext) {
    ctx.run.scan_deadline = None;
}

fn scan_update(ctx: &mut StepContext) -> Option<PhaseId> {
    if batch_finished(ctx) {
        return Some(PhaseId::Completed);
    }

    // Scan success wins over an elapsed window in the same step.
    if ctx.sample.scanner_active() {
        return Some(accept(ctx));
    }

    correct_counter_drift(ctx);

    let expired = ctx.run.scan_deadline.is_some_and(|deadline| ctx.now >= deadline);
    if expired {
        return Some(reject(ctx));
    }

    if ctx.run.pending_overlap.is_none() && ctx.sample.proximity_1_active() {
        latch_overlap(ctx);
    }
    None
}

fn accept(ctx: &mut StepContext) -> PhaseId {
    let ordinal = ctx.run.current_ordinal().unwrap_or_default();
    ctx.run.accept_current(ctx.now);
    let accepted = ctx.run.accepted_count;

    ctx.write(Signal::AcceptedCount, accepted as u16);
    ctx.write(Signal::Indicator, INDICATOR_ACCEPTED);
    ctx.clear(Signal::Scanner);
    ctx.emit(LineEvent::BoxAccepted { ordinal, accepted });
    info!("SCAN: box {ordinal} accepted ({accepted}/{})", ctx.run.requested_quantity);

    if ctx.run.is_finished() {
        if let Some(queued) = ctx.run.pending_overlap.take() {
            warn!("SCAN: batch complete, dropping queued box {queued}");
        }
        return PhaseId::Completed;
    }

    match ctx.run.pending_overlap.take() {
        Some(queued) => {
            // Its proximity-1 already fired: print now and skip that phase.
            ctx.clear(Signal::Proximity1);
            ctx.request_print(queued);
            PhaseId::AwaitingProximity2
        }
        None => PhaseId::AwaitingProximity1,
    }
}

fn reject(ctx: &mut StepContext) -> PhaseId {
    let ordinal = ctx.run.current_ordinal().unwrap_or_default();
    ctx.run.reject_current(ctx.now);
    if let Some(queued) = ctx.run.pending_overlap.take() {
        warn!("SCAN: box {ordinal} rejected, queued box {queued} released");
    }
    let rejected = ctx.run.rejected_count;
    ctx.emit(LineEvent::BoxRejected { ordinal, rejected });
    warn!("SCAN: box {ordinal} not scanned within window, halting line");
    PhaseId::Stopped
}

fn latch_overlap(ctx: &mut StepContext) {
    match ctx.run.next_ordinal() {
        Some(queued) => {
            ctx.run.pending_overlap = Some(queued);
            ctx.emit(LineEvent::OverlapDetected { ordinal: queued });
            info!("SCAN: box {queued} reached the print station early, queued");
        }
        None => warn!("SCAN: proximity-1 active on the last box of the batch, ignored"),
    }
}

/// The in-memory count is authoritative; rewrite a register that drifted.
fn correct_counter_drift(ctx: &mut StepContext) {
    let Some(register) = ctx.sample.accepted_register else {
        return;
    };
    let expected = ctx.run.accepted_count;
    if u32::from(register) != expected {
        warn!("SCAN: accepted register reads {register}, expected {expected}, rewriting");
        ctx.write(Signal::AcceptedCount, expected as u16);
        ctx.emit(LineEvent::CounterDrift { register, expected });
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  STOPPED: rejected box holds the line until restart
// ═══════════════════════════════════════════════════════════════════════════

fn stopped_enter(ctx: &mut StepContext) {
    ctx.write(Signal::Indicator, INDICATOR_REJECTED);
    ctx.write(Signal::ConveyorControl, CONVEYOR_STOP);
}

fn stopped_exit(ctx: &mut StepContext) {
    for signal in Signal::TRANSIENT {
        ctx.clear(signal);
    }
    ctx.write(Signal::ConveyorControl, ctx.config.conveyor_run_value);
    info!("STOPPED: restarting line at box {:?}", ctx.run.current_ordinal());
}

// ═══════════════════════════════════════════════════════════════════════════
//  COMPLETED: terminal
// ═══════════════════════════════════════════════════════════════════════════

fn completed_enter(ctx: &mut StepContext) {
    ctx.write(Signal::CompleteFlag, COMPLETE);
    ctx.write(Signal::ConveyorControl, CONVEYOR_STOP);
    ctx.run.ended_at = Some(ctx.now);
    ctx.emit(LineEvent::RunCompleted {
        accepted: ctx.run.accepted_count,
        rejected: ctx.run.rejected_count,
    });
    info!(
        "COMPLETED: {} accepted, {} rejected",
        ctx.run.accepted_count, ctx.run.rejected_count
    );
}
