//! Inbound commands to the line service.
//!
//! These represent operator actions arriving over whatever transport fronts
//! the core (HTTP form, serial console, message queue).  The
//! [`LineService`](super::service::LineService) interprets them in
//! [`handle_command`](super::service::LineService::handle_command).

use serde::{Deserialize, Serialize};

use crate::production::RunDescriptor;

/// Commands that external adapters can send into the line core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineCommand {
    /// Begin a batch.  Without a quantity the production type preset is used.
    Start {
        descriptor: RunDescriptor,
        quantity: Option<u32>,
    },

    /// Resume a stopped run with a fresh code for the rejected box.
    Restart,

    /// Discard the run and restore every register to its idle value.
    Reset,
}
