//! Application core.
//!
//! This module contains the orchestration of one inspection line: the
//! [`service::LineService`] control surface, the commands it accepts and
//! the events and views it produces.  All interaction with the register
//! bus, printer, label generator, storage and clock happens through the
//! **port traits** defined in [`ports`], keeping this layer fully testable
//! with in-process adapters.

pub mod commands;
pub mod events;
pub mod ports;
pub mod service;
