//! Physical line simulation.
//!
//! Writes the signals a real line raises (the conveyor acknowledgment,
//! the two presence sensors and the scanner) so the core can be driven
//! end to end without hardware.  Used by the demo binary and tests.

use std::sync::Arc;

use log::debug;

use crate::app::ports::RegisterBus;
use crate::config::LineConfig;
use crate::error::BusError;
use crate::signals::{SENSOR_ACTIVE, Signal, SignalBus, SignalMap};

pub struct LineSimulator {
    bus: Arc<dyn RegisterBus>,
    map: SignalMap,
    ack_value: u16,
}

impl LineSimulator {
    pub fn new(bus: Arc<dyn RegisterBus>, config: &LineConfig) -> Self {
        Self {
            bus,
            map: config.signals.clone(),
            ack_value: config.line_ack_value,
        }
    }

    fn raise(&self, signal: Signal, value: u16) -> Result<(), BusError> {
        debug!("LineSimulator: {} <- {}", signal.name(), value);
        SignalBus::new(self.bus.as_ref(), &self.map).write(signal, value)
    }

    /// The conveyor is moving.
    pub fn acknowledge_conveyor(&self) -> Result<(), BusError> {
        self.raise(Signal::ConveyorControl, self.ack_value)
    }

    /// A box reached the print station.
    pub fn box_at_print_station(&self) -> Result<(), BusError> {
        self.raise(Signal::Proximity1, SENSOR_ACTIVE)
    }

    /// A box reached the scanner.
    pub fn box_at_scan_station(&self) -> Result<(), BusError> {
        self.raise(Signal::Proximity2, SENSOR_ACTIVE)
    }

    /// The scanner read a code.
    pub fn scan(&self) -> Result<(), BusError> {
        self.raise(Signal::Scanner, SENSOR_ACTIVE)
    }
}
