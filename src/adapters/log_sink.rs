//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured line events to the `log`
//! facade.  A message-queue or operator-screen adapter would implement the
//! same trait.

use log::{info, warn};

use crate::app::events::LineEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`LineEvent`].
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &LineEvent) {
        match event {
            LineEvent::RunStarted { quantity } => info!("RUN   | started, {} boxes", quantity),
            LineEvent::ConveyorAcknowledged => info!("LINE  | conveyor running"),
            LineEvent::PrintRequested { ordinal } => info!("PRINT | box {}", ordinal),
            LineEvent::BoxAccepted { ordinal, accepted } => {
                info!("BOX   | {} accepted (total {})", ordinal, accepted);
            }
            LineEvent::BoxRejected { ordinal, rejected } => {
                warn!("BOX   | {} rejected (total {})", ordinal, rejected);
            }
            LineEvent::OverlapDetected { ordinal } => info!("BOX   | {} queued early", ordinal),
            LineEvent::RunCompleted { accepted, rejected } => {
                info!("RUN   | complete, accepted={} rejected={}", accepted, rejected);
            }
            LineEvent::RunRestarted { ordinal } => info!("RUN   | restarted at box {}", ordinal),
            LineEvent::RunReset => info!("RUN   | reset"),
            LineEvent::PrintFailed { ordinal } => warn!("PRINT | box {} failed", ordinal),
            LineEvent::StateDiscarded(reason) => warn!("STATE | discarded: {}", reason),
            LineEvent::CounterDrift { register, expected } => {
                warn!("COUNT | register {} rewritten to {}", register, expected);
            }
        }
    }
}
