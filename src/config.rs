//! Line configuration parameters
//!
//! All tunable parameters for one inspection line.
//! Values can be overridden from a JSON file (see `adapters::config_file`).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::signals::SignalMap;

/// Core line configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineConfig {
    // --- Registers ---
    /// Signal → holding register address table
    pub signals: SignalMap,
    /// Value the core writes to start the conveyor
    pub conveyor_run_value: u16,
    /// Value the line writes to the conveyor register once it is moving
    pub line_ack_value: u16,

    // --- Timing ---
    /// Seconds a box may spend at the scanner before it is rejected
    pub accept_window_secs: u32,
    /// Per-transaction bus timeout (milliseconds)
    pub bus_timeout_ms: u32,
    /// How long the indicator stays lit before the sweeper clears it (milliseconds)
    pub indicator_hold_ms: u32,
    /// Indicator sweeper polling interval (milliseconds)
    pub indicator_sweep_interval_ms: u32,
    /// Poll interval used by the demo driver (milliseconds)
    pub poll_interval_ms: u32,

    // --- Production ---
    /// Quantity per production type, used when a start omits the quantity
    pub presets: BTreeMap<String, u32>,
    /// Largest accepted batch
    pub max_quantity: u32,
    /// Directory label artifacts are referenced from
    pub artifact_dir: String,
}

impl Default for LineConfig {
    fn default() -> Self {
        let mut presets = BTreeMap::new();
        presets.insert("P1".to_string(), 10);
        presets.insert("P2".to_string(), 20);

        Self {
            // Registers
            signals: SignalMap::default(),
            conveyor_run_value: 1,
            line_ack_value: 5,

            // Timing
            accept_window_secs: 5,
            bus_timeout_ms: 2000,
            indicator_hold_ms: 1000,
            indicator_sweep_interval_ms: 100, // 10 Hz
            poll_interval_ms: 250,

            // Production
            presets,
            max_quantity: 10_000,
            artifact_dir: "static/qr_codes".to_string(),
        }
    }
}

impl LineConfig {
    /// Range-check every field.  Invalid values are rejected, never clamped.
    pub fn validate(&self) -> Result<(), &'static str> {
        self.signals.validate()?;
        if self.conveyor_run_value == 0 {
            return Err("conveyor_run_value must be non-zero");
        }
        if self.line_ack_value == 0 || self.line_ack_value == self.conveyor_run_value {
            return Err("line_ack_value must be non-zero and differ from conveyor_run_value");
        }
        if !(1..=3600).contains(&self.accept_window_secs) {
            return Err("accept_window_secs must be 1–3600");
        }
        if !(10..=10_000).contains(&self.bus_timeout_ms) {
            return Err("bus_timeout_ms must be 10–10000");
        }
        if self.indicator_hold_ms == 0 {
            return Err("indicator_hold_ms must be positive");
        }
        if self.indicator_sweep_interval_ms == 0
            || self.indicator_sweep_interval_ms > self.indicator_hold_ms
        {
            return Err("indicator_sweep_interval_ms must be 1..=indicator_hold_ms");
        }
        if self.poll_interval_ms == 0 {
            return Err("poll_interval_ms must be positive");
        }
        if self.max_quantity == 0 || self.max_quantity > u32::from(u16::MAX) {
            return Err("max_quantity must be 1–65535");
        }
        if self
            .presets
            .values()
            .any(|q| *q == 0 || *q > self.max_quantity)
        {
            return Err("preset quantities must be 1..=max_quantity");
        }
        Ok(())
    }

    /// Quantity for a production type preset.
    pub fn preset_quantity(&self, production_type: &str) -> Option<u32> {
        self.presets.get(production_type).copied()
    }
}
