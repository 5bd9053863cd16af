//! Logical line signals and their register addresses.
//!
//! The controller exposes every signal as one 16-bit holding register.
//! Addresses use the conventional `4xxxxx` notation; the protocol offset is
//! `address - 400001`.
//!
//! ```text
//!  Signal            default   written by
//!  ───────────────── ───────── ─────────────────────────────
//!  ConveyorControl   400001    core (0/1), line (ack = 5)
//!  Proximity1        400002    line (1), core clears
//!  Proximity2        400003    line (1), core clears
//!  Scanner           400004    line (1), core clears
//!  AcceptedCount     400005    core
//!  CompleteFlag      400006    core
//!  Indicator         400007    core (1/2), sweeper clears
//! ```

use serde::{Deserialize, Serialize};

use crate::app::ports::RegisterBus;
use crate::error::BusError;

/// First holding register address.
pub const HOLDING_REGISTER_BASE: u32 = 400_001;
/// Last holding register address.
pub const HOLDING_REGISTER_LAST: u32 = HOLDING_REGISTER_BASE + u16::MAX as u32;

/// Level a sensor register holds while the sensor is triggered.
pub const SENSOR_ACTIVE: u16 = 1;
/// Cleared level for sensors, flags and the indicator.
pub const CLEARED: u16 = 0;

/// Conveyor command: halt.
pub const CONVEYOR_STOP: u16 = 0;

/// Indicator value for an accepted box.
pub const INDICATOR_ACCEPTED: u16 = 1;
/// Indicator value for a rejected box.
pub const INDICATOR_REJECTED: u16 = 2;

/// Value of the complete flag once the batch is done.
pub const COMPLETE: u16 = 1;

/// Every logical signal on the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Signal {
    ConveyorControl,
    Proximity1,
    Proximity2,
    Scanner,
    AcceptedCount,
    Indicator,
    CompleteFlag,
}

impl Signal {
    pub const COUNT: usize = 7;

    pub const ALL: [Signal; Self::COUNT] = [
        Signal::ConveyorControl,
        Signal::Proximity1,
        Signal::Proximity2,
        Signal::Scanner,
        Signal::AcceptedCount,
        Signal::Indicator,
        Signal::CompleteFlag,
    ];

    /// Signals the line raises and the core clears once consumed.
    pub const TRANSIENT: [Signal; 4] = [
        Signal::Proximity1,
        Signal::Proximity2,
        Signal::Scanner,
        Signal::Indicator,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::ConveyorControl => "conveyor",
            Self::Proximity1 => "proximity_1",
            Self::Proximity2 => "proximity_2",
            Self::Scanner => "scanner",
            Self::AcceptedCount => "accepted_boxes",
            Self::Indicator => "box_status",
            Self::CompleteFlag => "production_complete",
        }
    }
}

/// Static signal → register address table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalMap {
    pub conveyor_control: u32,
    pub proximity_1: u32,
    pub proximity_2: u32,
    pub scanner: u32,
    pub accepted_count: u32,
    pub complete_flag: u32,
    pub indicator: u32,
}

impl Default for SignalMap {
    fn default() -> Self {
        Self {
            conveyor_control: 400_001,
            proximity_1: 400_002,
            proximity_2: 400_003,
            scanner: 400_004,
            accepted_count: 400_005,
            complete_flag: 400_006,
            indicator: 400_007,
        }
    }
}

impl SignalMap {
    pub fn address(&self, signal: Signal) -> u32 {
        match signal {
            Signal::ConveyorControl => self.conveyor_control,
            Signal::Proximity1 => self.proximity_1,
            Signal::Proximity2 => self.proximity_2,
            Signal::Scanner => self.scanner,
            Signal::AcceptedCount => self.accepted_count,
            Signal::Indicator => self.indicator,
            Signal::CompleteFlag => self.complete_flag,
        }
    }

    /// Check every address is a holding register and no two signals share one.
    pub fn validate(&self) -> Result<(), &'static str> {
        let mut seen = [0u32; Signal::COUNT];
        for (i, signal) in Signal::ALL.iter().enumerate() {
            let addr = self.address(*signal);
            if !(HOLDING_REGISTER_BASE..=HOLDING_REGISTER_LAST).contains(&addr) {
                return Err("signal address outside 400001–465536");
            }
            if seen[..i].contains(&addr) {
                return Err("two signals share one register address");
            }
            seen[i] = addr;
        }
        Ok(())
    }
}

/// Protocol offset of a holding register address.
pub fn register_offset(address: u32) -> Option<u16> {
    address
        .checked_sub(HOLDING_REGISTER_BASE)
        .and_then(|off| u16::try_from(off).ok())
}

// ---------------------------------------------------------------------------
// Signal-level view of the bus
// ---------------------------------------------------------------------------

/// Addresses a [`RegisterBus`] by logical signal.
///
/// Every call is one bus transaction; nothing here holds the bus between
/// calls.
pub struct SignalBus<'a> {
    bus: &'a dyn RegisterBus,
    map: &'a SignalMap,
}

impl<'a> SignalBus<'a> {
    pub fn new(bus: &'a dyn RegisterBus, map: &'a SignalMap) -> Self {
        Self { bus, map }
    }

    pub fn read(&self, signal: Signal) -> Result<u16, BusError> {
        self.bus.get(self.map.address(signal))
    }

    /// Read a sensor register as a level.
    pub fn read_active(&self, signal: Signal) -> Result<bool, BusError> {
        Ok(self.read(signal)? == SENSOR_ACTIVE)
    }

    pub fn write(&self, signal: Signal, value: u16) -> Result<(), BusError> {
        self.bus.set(self.map.address(signal), value)
    }

    /// Write every register back to its idle value.
    pub fn restore_defaults(&self) -> Result<(), BusError> {
        for signal in Signal::ALL {
            self.write(signal, CLEARED)?;
        }
        Ok(())
    }
}
