//! InspectLine library.
//!
//! Coordinates an inspection line (conveyor, two presence sensors, a code
//! scanner and an accept/reject indicator) exposed as holding registers on
//! a field-bus controller.  The pure sequencing logic lives in
//! [`sequencer`]; [`app::service::LineService`] drives it one tick per
//! poll through the port traits in [`app::ports`].

#![deny(unused_must_use)]

pub mod app;
pub mod config;
pub mod error;
pub mod indicator;
pub mod persistence;
pub mod production;
pub mod sequencer;
pub mod signals;
pub mod simulator;

pub mod adapters;

pub use app::service::{LinePorts, LineService};
pub use error::{Error, ErrorClass, Result};
