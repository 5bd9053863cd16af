//! Plain-text summary report.
//!
//! Implements [`ReportAssembler`] as a UTF-8 document: descriptor, timing,
//! counters, success rate and one line per box attempt (replaced rejections
//! included, oldest first).

use std::fmt::Write as _;

use chrono::{DateTime, Duration, Utc};

use crate::app::ports::ReportAssembler;
use crate::error::ReportError;
use crate::production::{BoxOutcome, ProductionRun, RunStatus};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Default, Clone, Copy)]
pub struct TextReportAssembler;

impl TextReportAssembler {
    pub fn new() -> Self {
        Self
    }
}

fn format_duration(d: Duration) -> String {
    let total = d.num_seconds().max(0);
    format!("{}:{:02}:{:02}", total / 3600, (total / 60) % 60, total % 60)
}

fn outcome_label(outcome: BoxOutcome) -> &'static str {
    match outcome {
        BoxOutcome::Pending => "Pending",
        BoxOutcome::Accepted => "Accepted",
        BoxOutcome::Rejected => "Rejected",
    }
}

/// Accepted boxes as a share of the requested quantity.
pub fn success_rate(run: &ProductionRun) -> f64 {
    if run.requested_quantity == 0 {
        return 0.0;
    }
    f64::from(run.accepted_count) / f64::from(run.requested_quantity) * 100.0
}

impl ReportAssembler for TextReportAssembler {
    fn assemble(
        &self,
        run: &ProductionRun,
        generated_at: DateTime<Utc>,
    ) -> Result<Vec<u8>, ReportError> {
        let end = run.ended_at.unwrap_or(generated_at);
        let mut doc = String::new();
        render(&mut doc, run, end, generated_at).map_err(|_| ReportError::RenderFailed)?;
        Ok(doc.into_bytes())
    }
}

fn render(
    doc: &mut String,
    run: &ProductionRun,
    end: DateTime<Utc>,
    generated_at: DateTime<Utc>,
) -> std::fmt::Result {
    let d = &run.descriptor;
    writeln!(doc, "Production Summary Report")?;
    writeln!(doc, "=========================")?;
    writeln!(doc, "Product:          {}", d.product)?;
    writeln!(doc, "Brand:            {}", d.brand)?;
    writeln!(doc, "Production type:  {}", d.production_type)?;
    writeln!(doc, "Quantity:         {} boxes", run.requested_quantity)?;
    writeln!(doc, "Status:           {:?}", run.status)?;
    writeln!(doc)?;
    writeln!(doc, "Start time:       {}", run.started_at.format(TIME_FORMAT))?;
    match run.line_started_at {
        Some(t) => writeln!(doc, "Line started:     {}", t.format(TIME_FORMAT))?,
        None => writeln!(doc, "Line started:     -")?,
    }
    let end_note = if run.status == RunStatus::Completed { "" } else { " (in progress)" };
    writeln!(doc, "End time:         {}{}", end.format(TIME_FORMAT), end_note)?;
    writeln!(doc, "Duration:         {}", format_duration(end - run.started_at))?;
    writeln!(doc)?;
    writeln!(doc, "Accepted boxes:   {}", run.accepted_count)?;
    writeln!(doc, "Rejected boxes:   {}", run.rejected_count)?;
    writeln!(doc, "Success rate:     {:.2}%", success_rate(run))?;
    writeln!(doc)?;
    writeln!(doc, "Generated codes:")?;
    for record in run.all_records() {
        let resolved = record
            .resolved_at
            .map(|t| t.format(TIME_FORMAT).to_string())
            .unwrap_or_else(|| "-".to_string());
        writeln!(
            doc,
            "  #{:<5} {:<32} {:<9} {}",
            record.ordinal,
            record.code.token,
            outcome_label(record.outcome),
            resolved
        )?;
    }
    writeln!(doc)?;
    writeln!(doc, "Generated at {}", generated_at.format(TIME_FORMAT))
}
