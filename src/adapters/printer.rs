//! Logging printer adapter.
//!
//! Implements [`Printer`] by logging the artifact reference.  Stands in for
//! a spooler-backed printer on hosts without one.

use log::info;

use crate::app::ports::Printer;
use crate::error::PrintError;

#[derive(Debug, Default)]
pub struct LogPrinter {
    jobs: u64,
}

impl LogPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Jobs accepted so far.
    pub fn jobs(&self) -> u64 {
        self.jobs
    }
}

impl Printer for LogPrinter {
    fn print(&mut self, artifact: &str) -> Result<(), PrintError> {
        if artifact.trim().is_empty() {
            return Err(PrintError::ArtifactMissing);
        }
        self.jobs += 1;
        info!("LogPrinter: job {} -> {}", self.jobs, artifact);
        Ok(())
    }
}
