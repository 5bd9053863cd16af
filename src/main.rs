//! InspectLine: demo entry point.
//!
//! Wires the in-process adapters around the line service and drives one
//! simulated batch, including a box that misses its scan window and is
//! restarted, then prints the summary report.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Adapters (outer ring)                     │
//! │                                                              │
//! │  InMemoryRegisterBank  LabelCodeGenerator  LogPrinter        │
//! │  (RegisterBus)         (CodeGenerator)     (Printer)         │
//! │  TextReportAssembler   MemoryStorage       SystemClock       │
//! │  (ReportAssembler)     (StoragePort)       (Clock)           │
//! │                                                              │
//! │  ──────────────── Port Trait Boundary ───────────────────    │
//! │                                                              │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │           LineService (ProductionState · Sequencer)    │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! │                                                              │
//! │  IndicatorSweeper (own thread) · LineSimulator (demo input)  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Usage: `inspectline [config.json]`

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use log::{info, warn};

use inspectline::adapters::code_gen::LabelCodeGenerator;
use inspectline::adapters::config_file::JsonConfigFile;
use inspectline::adapters::log_sink::LogEventSink;
use inspectline::adapters::printer::LogPrinter;
use inspectline::adapters::register_bank::InMemoryRegisterBank;
use inspectline::adapters::report_text::TextReportAssembler;
use inspectline::adapters::storage::MemoryStorage;
use inspectline::adapters::time::SystemClock;
use inspectline::app::events::{LineSnapshot, LineStatus};
use inspectline::app::ports::Clock;
use inspectline::config::LineConfig;
use inspectline::indicator::IndicatorSweeper;
use inspectline::production::{BoxSubState, RunDescriptor};
use inspectline::simulator::LineSimulator;
use inspectline::{LinePorts, LineService};

/// Longest the demo waits for any single line step.
const STEP_TIMEOUT: Duration = Duration::from_secs(15);

/// Box that is left unscanned once to exercise reject and restart.
const MISSED_BOX: u32 = 2;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = load_config()?;
    let bank = Arc::new(InMemoryRegisterBank::from_config(&config));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());

    let mut sweeper =
        IndicatorSweeper::from_config(bank.clone(), &config).context("spawning indicator sweeper")?;
    let ports = LinePorts {
        bus: sweeper.tracked_bus(),
        clock: clock.clone(),
        codes: Box::new(LabelCodeGenerator::new(config.artifact_dir.clone(), clock)),
        printer: Box::new(LogPrinter::new()),
        reports: Box::new(TextReportAssembler::new()),
        storage: Box::new(MemoryStorage::new()),
        sink: Box::new(LogEventSink::new()),
    };
    let service = LineService::new(config.clone(), ports);
    let sim = LineSimulator::new(bank, &config);

    run_batch(&service, &sim, &config)?;

    let report = service.report().context("assembling report")?;
    println!("{}", String::from_utf8_lossy(&report));

    sweeper.stop();
    service.reset().context("resetting line")?;
    info!("demo finished");
    Ok(())
}

fn load_config() -> Result<LineConfig> {
    match std::env::args().nth(1) {
        Some(path) => JsonConfigFile::new(&path)
            .load_or_default()
            .with_context(|| format!("loading config from {path}")),
        None => {
            warn!("no config file given, using defaults");
            Ok(LineConfig::default())
        }
    }
}

fn run_batch(service: &LineService, sim: &LineSimulator, config: &LineConfig) -> Result<()> {
    let interval = Duration::from_millis(u64::from(config.poll_interval_ms));
    let quantity = 3;

    service
        .start(RunDescriptor::new("Marie", "Acme", "custom"), quantity)
        .context("starting run")?;
    sim.acknowledge_conveyor()?;
    poll_until(service, interval, "conveyor", |s| s.status == LineStatus::Running)?;

    let mut missed_once = false;
    while service.snapshot().status == LineStatus::Running {
        let ordinal = service.snapshot().current_ordinal.unwrap_or_default();

        sim.box_at_print_station()?;
        poll_until(service, interval, "print station", |s| {
            s.sub_state == Some(BoxSubState::AwaitingProximity2)
        })?;
        sim.box_at_scan_station()?;
        poll_until(service, interval, "scan station", |s| {
            s.sub_state == Some(BoxSubState::AwaitingScan)
        })?;

        if ordinal == MISSED_BOX && !missed_once {
            missed_once = true;
            info!("leaving box {ordinal} unscanned");
            poll_until(service, interval, "reject", |s| s.status == LineStatus::Stopped)?;
            service.restart().context("restarting line")?;
            continue;
        }

        sim.scan()?;
        poll_until(service, interval, "scan", |s| {
            s.status == LineStatus::Completed || s.current_ordinal != Some(ordinal)
        })?;
    }
    Ok(())
}

/// Poll until `done` holds, retrying retryable failures.
fn poll_until(
    service: &LineService,
    interval: Duration,
    what: &str,
    done: impl Fn(&LineSnapshot) -> bool,
) -> Result<LineSnapshot> {
    let deadline = Instant::now() + STEP_TIMEOUT;
    loop {
        match service.poll() {
            Ok(snapshot) if done(&snapshot) => return Ok(snapshot),
            Ok(_) => {}
            Err(e) if e.is_retryable() => warn!("poll failed, retrying: {e}"),
            Err(e) => return Err(e).with_context(|| format!("waiting for {what}")),
        }
        if Instant::now() >= deadline {
            bail!("timed out waiting for {what}");
        }
        thread::sleep(interval);
    }
}
