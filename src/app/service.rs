//! Line service: the hexagonal core.
//!
//! [`LineService`] owns the production state, the box sequencer and every
//! port.  It exposes the control surface (`start`, `poll`, `restart`,
//! `reset`, `summary`, `report`) as plain methods taking `&self`, so one
//! service can be shared between request handlers behind an `Arc`.
//!
//! ```text
//!  RegisterBus ◀──▶ ┌──────────────────────────┐ ──▶ EventSink
//!  CodeGenerator ──▶│       LineService        │ ──▶ Printer
//!  Clock ──────────▶│  ProductionState · Seq   │ ◀─▶ StoragePort
//!                   └──────────────────────────┘ ──▶ ReportAssembler
//! ```
//!
//! Run mutations are serialized by one mutex.  The bus is never locked by
//! the service: each register access is its own short transaction.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use log::{info, warn};

use crate::config::LineConfig;
use crate::error::{BusError, ConsistencyError, Result, ValidationError};
use crate::persistence::RunStore;
use crate::production::{ProductionState, RunDescriptor, RunStatus};
use crate::sequencer::context::{SignalSample, Transition};
use crate::sequencer::{BoxSequencer, PhaseId};
use crate::signals::{Signal, SignalBus};

use super::commands::LineCommand;
use super::events::{LineEvent, LineSnapshot, RegisterReading, RunSummary};
use super::ports::{
    Clock, CodeGenerator, EventSink, Printer, RegisterBus, ReportAssembler, StoragePort,
};

// ───────────────────────────────────────────────────────────────
// Wiring
// ───────────────────────────────────────────────────────────────

/// Every adapter the service needs.
pub struct LinePorts {
    pub bus: Arc<dyn RegisterBus>,
    pub clock: Arc<dyn Clock>,
    pub codes: Box<dyn CodeGenerator>,
    pub printer: Box<dyn Printer>,
    pub reports: Box<dyn ReportAssembler>,
    pub storage: Box<dyn StoragePort>,
    pub sink: Box<dyn EventSink>,
}

/// State guarded by the run mutex.
struct Inner {
    state: ProductionState,
    codes: Box<dyn CodeGenerator>,
    printer: Box<dyn Printer>,
    reports: Box<dyn ReportAssembler>,
    storage: Box<dyn StoragePort>,
    sink: Box<dyn EventSink>,
}

impl Inner {
    fn emit(&mut self, event: &LineEvent) {
        self.sink.emit(event);
    }
}

// ───────────────────────────────────────────────────────────────
// LineService
// ───────────────────────────────────────────────────────────────

pub struct LineService {
    sequencer: BoxSequencer,
    bus: Arc<dyn RegisterBus>,
    clock: Arc<dyn Clock>,
    store: RunStore,
    inner: Mutex<Inner>,
}

impl LineService {
    /// Build the service and restore any persisted run.
    ///
    /// A stored run that fails validation is discarded: storage is cleared,
    /// registers are restored to idle and a `StateDiscarded` event is
    /// emitted.  Construction itself never fails.
    pub fn new(config: LineConfig, ports: LinePorts) -> Self {
        let LinePorts {
            bus,
            clock,
            codes,
            printer,
            reports,
            storage,
            sink,
        } = ports;

        let service = Self {
            sequencer: BoxSequencer::new(config),
            bus,
            clock,
            store: RunStore,
            inner: Mutex::new(Inner {
                state: ProductionState::new(),
                codes,
                printer,
                reports,
                storage,
                sink,
            }),
        };
        service.restore();
        service
    }

    fn restore(&self) {
        let mut inner = self.lock();
        match self.store.load(inner.storage.as_ref()) {
            Ok(Some(run)) => {
                info!(
                    "LineService: restored run at box {}/{} ({:?})",
                    run.current_index, run.requested_quantity, run.status
                );
                inner.state = ProductionState::with_run(run);
            }
            Ok(None) => info!("LineService: no stored run, idle"),
            Err(reason) => self.discard(&mut inner, reason),
        }
    }

    // ── Control surface ───────────────────────────────────────

    /// Create a run of `quantity` boxes and command the conveyor.
    ///
    /// Every box code is generated before anything is written.  The run is
    /// installed only after the registers were reset, the accepted counter
    /// zeroed and the conveyor commanded.
    pub fn start(&self, descriptor: RunDescriptor, quantity: u32) -> Result<LineSnapshot> {
        let mut inner = self.lock();
        let now = self.clock.now();
        let config = self.sequencer.config();

        let Inner { state, codes, .. } = &mut *inner;
        let run = state.start(descriptor, quantity, config.max_quantity, now, |d, ordinal, q| {
            codes.generate(d, ordinal, q)
        })?;

        let signals = self.signals();
        signals.restore_defaults()?;
        signals.write(Signal::AcceptedCount, 0)?;
        signals.write(Signal::ConveyorControl, config.conveyor_run_value)?;

        info!(
            "LineService: started {} x {} ({})",
            run.requested_quantity, run.descriptor.product, run.descriptor.production_type
        );
        inner.state.install(run);
        self.persist(&mut inner);
        inner.emit(&LineEvent::RunStarted { quantity });
        Ok(LineSnapshot::of(inner.state.run(), now))
    }

    /// Start with the quantity preset for the descriptor's production type.
    pub fn start_preset(&self, descriptor: RunDescriptor) -> Result<LineSnapshot> {
        let quantity = self
            .sequencer
            .config()
            .preset_quantity(&descriptor.production_type)
            .ok_or_else(|| ValidationError::UnknownPreset(descriptor.production_type.clone()))?;
        self.start(descriptor, quantity)
    }

    /// One tick: sample, step, print, write, commit, persist, report.
    ///
    /// A bus failure or printer failure aborts the tick before anything is
    /// committed; the same poll can simply be repeated.
    pub fn poll(&self) -> Result<LineSnapshot> {
        let mut inner = self.lock();
        let now = self.clock.now();

        let Some(run) = inner.state.run() else {
            return Ok(LineSnapshot::idle());
        };
        let phase = PhaseId::of(run);
        let sample = self.sample(phase, run.pending_overlap.is_some())?;
        let transition = self.sequencer.step(run, &sample, now);
        self.apply(&mut inner, transition, now)
    }

    /// Resume a stopped run with a fresh code for the rejected box.
    pub fn restart(&self) -> Result<LineSnapshot> {
        let mut inner = self.lock();
        let now = self.clock.now();

        let Inner { state, codes, .. } = &mut *inner;
        let run = state.run().ok_or(ValidationError::NoActiveRun)?;
        if run.status != RunStatus::Stopped {
            return Err(ValidationError::NotStopped(run.status).into());
        }
        let ordinal = run.current_ordinal().ok_or(ValidationError::NoActiveRun)?;
        let code = codes.generate(&run.descriptor, ordinal, run.requested_quantity)?;
        let transition = self.sequencer.restart(run, code, now)?;
        self.apply(&mut inner, transition, now)
    }

    /// Restore every register to idle and drop the run.
    ///
    /// Valid in any state.  If the registers cannot be written the run is
    /// kept and the error is returned for a retry.
    pub fn reset(&self) -> Result<LineSnapshot> {
        let mut inner = self.lock();
        self.signals().restore_defaults()?;
        if inner.state.reset().is_some() {
            info!("LineService: run reset");
        }
        if let Err(e) = self.store.clear(inner.storage.as_mut()) {
            warn!("LineService: clearing stored run failed: {}", e);
        }
        inner.emit(&LineEvent::RunReset);
        Ok(LineSnapshot::idle())
    }

    /// Dispatch a message-style command.
    pub fn handle_command(&self, cmd: LineCommand) -> Result<LineSnapshot> {
        match cmd {
            LineCommand::Start {
                descriptor,
                quantity: Some(quantity),
            } => self.start(descriptor, quantity),
            LineCommand::Start {
                descriptor,
                quantity: None,
            } => self.start_preset(descriptor),
            LineCommand::Restart => self.restart(),
            LineCommand::Reset => self.reset(),
        }
    }

    // ── Queries ───────────────────────────────────────────────

    /// Current view without touching the bus.
    pub fn snapshot(&self) -> LineSnapshot {
        let inner = self.lock();
        LineSnapshot::of(inner.state.run(), self.clock.now())
    }

    /// Full run state plus a live read of every register.  A register that
    /// cannot be read is reported as `None`.
    pub fn summary(&self) -> RunSummary {
        let inner = self.lock();
        let now = self.clock.now();
        let run = inner.state.run();
        let signals = self.signals();
        let map = &self.sequencer.config().signals;

        RunSummary {
            snapshot: LineSnapshot::of(run, now),
            descriptor: run.map(|r| r.descriptor.clone()),
            started_at: run.map(|r| r.started_at),
            line_started_at: run.and_then(|r| r.line_started_at),
            ended_at: run.and_then(|r| r.ended_at),
            scan_deadline: run.and_then(|r| r.scan_deadline),
            boxes: run.map(|r| r.boxes.clone()).unwrap_or_default(),
            rejected_history: run.map(|r| r.rejected_history.clone()).unwrap_or_default(),
            registers: Signal::ALL
                .iter()
                .map(|&signal| RegisterReading {
                    signal,
                    address: map.address(signal),
                    value: signals.read(signal).ok(),
                })
                .collect(),
        }
    }

    /// Render the summary document for the current run.
    pub fn report(&self) -> Result<Vec<u8>> {
        let inner = self.lock();
        let run = inner.state.run().ok_or(ValidationError::NoActiveRun)?;
        Ok(inner.reports.assemble(run, self.clock.now())?)
    }

    pub fn config(&self) -> &LineConfig {
        self.sequencer.config()
    }

    // ── Internal ──────────────────────────────────────────────

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn signals(&self) -> SignalBus<'_> {
        SignalBus::new(self.bus.as_ref(), &self.sequencer.config().signals)
    }

    /// Read only the registers the current phase looks at.
    fn sample(&self, phase: PhaseId, overlap_latched: bool) -> core::result::Result<SignalSample, BusError> {
        let signals = self.signals();
        let mut sample = SignalSample::default();
        for &signal in phase.sampled_signals(overlap_latched) {
            match signal {
                Signal::ConveyorControl => sample.conveyor = Some(signals.read(signal)?),
                Signal::Proximity1 => sample.proximity_1 = Some(signals.read_active(signal)?),
                Signal::Proximity2 => sample.proximity_2 = Some(signals.read_active(signal)?),
                Signal::Scanner => sample.scanner = Some(signals.read_active(signal)?),
                Signal::AcceptedCount => sample.accepted_register = Some(signals.read(signal)?),
                Signal::Indicator | Signal::CompleteFlag => {}
            }
        }
        Ok(sample)
    }

    /// Carry out a sequencer transition: prints first, then register writes
    /// in order, and only then commit.
    fn apply(
        &self,
        inner: &mut Inner,
        transition: Transition,
        now: DateTime<Utc>,
    ) -> Result<LineSnapshot> {
        if let Some(reason) = transition.discarded() {
            self.discard(inner, reason);
            return Err(reason.into());
        }

        for (ordinal, artifact) in transition.prints() {
            if let Err(e) = inner.printer.print(artifact) {
                warn!("LineService: print of box {} failed: {}", ordinal, e);
                inner.emit(&LineEvent::PrintFailed { ordinal });
                return Err(e.into());
            }
        }

        let signals = self.signals();
        for write in &transition.writes {
            signals.write(write.signal, write.value)?;
        }

        let Transition { run, events, .. } = transition;
        let changed = inner.state.run() != Some(&run);
        inner.state.commit(run);
        if changed {
            self.persist(inner);
        }
        for event in &events {
            inner.emit(event);
        }
        Ok(LineSnapshot::of(inner.state.run(), now))
    }

    fn persist(&self, inner: &mut Inner) {
        if let Some(run) = inner.state.run() {
            if let Err(e) = self.store.save(inner.storage.as_mut(), run) {
                warn!("LineService: persisting run failed: {}", e);
            }
        }
    }

    /// Drop an invalid run and return the line to idle.
    fn discard(&self, inner: &mut Inner, reason: ConsistencyError) {
        warn!("LineService: discarding run: {}", reason);
        inner.state.reset();
        if let Err(e) = self.store.clear(inner.storage.as_mut()) {
            warn!("LineService: clearing stored run failed: {}", e);
        }
        if let Err(e) = self.signals().restore_defaults() {
            warn!("LineService: restoring registers failed: {}", e);
        }
        inner.emit(&LineEvent::StateDiscarded(reason));
    }
}
