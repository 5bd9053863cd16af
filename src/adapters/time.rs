//! Wall-clock adapter.
//!
//! Scan deadlines and run timestamps are wall-clock UTC, so the host clock
//! is the only backend.  Tests substitute a fake [`Clock`].

use chrono::{DateTime, Utc};

use crate::app::ports::Clock;

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
