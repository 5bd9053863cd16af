//! Mock adapters for integration tests.
//!
//! Records every bus transaction, print job and event so tests can assert on
//! the full history without a controller, a printer or a wall clock.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};

use inspectline::app::events::LineEvent;
use inspectline::app::ports::{
    Clock, CodeGenerator, EventSink, Printer, RegisterBus, StorageError, StoragePort,
};
use inspectline::adapters::report_text::TextReportAssembler;
use inspectline::config::LineConfig;
use inspectline::error::{BusError, LabelError, PrintError};
use inspectline::production::{GeneratedCode, RunDescriptor};
use inspectline::{LinePorts, LineService};

pub const CONVEYOR: u32 = 400_001;
pub const PROXIMITY_1: u32 = 400_002;
pub const PROXIMITY_2: u32 = 400_003;
pub const SCANNER: u32 = 400_004;
pub const ACCEPTED: u32 = 400_005;
pub const COMPLETE: u32 = 400_006;
pub const INDICATOR: u32 = 400_007;

// ── Bus transaction record ────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusCall {
    Get(u32),
    Set(u32, u16),
}

// ── MockBus ───────────────────────────────────────────────────

#[derive(Default)]
pub struct MockBus {
    registers: Mutex<BTreeMap<u32, u16>>,
    calls: Mutex<Vec<BusCall>>,
    /// Every transaction fails while set.
    offline: AtomicBool,
    /// Writes to this address fail while non-zero.
    failing_write: AtomicU32,
}

#[allow(dead_code)]
impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a register without recording a transaction (the line side).
    pub fn poke(&self, address: u32, value: u16) {
        self.registers.lock().unwrap().insert(address, value);
    }

    pub fn peek(&self, address: u32) -> u16 {
        self.registers.lock().unwrap().get(&address).copied().unwrap_or(0)
    }

    pub fn calls(&self) -> Vec<BusCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn reads(&self) -> Vec<u32> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                BusCall::Get(addr) => Some(addr),
                BusCall::Set(..) => None,
            })
            .collect()
    }

    pub fn writes(&self) -> Vec<(u32, u16)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                BusCall::Set(addr, v) => Some((addr, v)),
                BusCall::Get(_) => None,
            })
            .collect()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn fail_writes_to(&self, address: u32) {
        self.failing_write.store(address, Ordering::SeqCst);
    }

    pub fn heal(&self) {
        self.set_offline(false);
        self.failing_write.store(0, Ordering::SeqCst);
    }
}

impl RegisterBus for MockBus {
    fn get(&self, address: u32) -> Result<u16, BusError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(BusError::Unreachable { address });
        }
        self.calls.lock().unwrap().push(BusCall::Get(address));
        Ok(self.peek(address))
    }

    fn set(&self, address: u32, value: u16) -> Result<(), BusError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(BusError::Unreachable { address });
        }
        if self.failing_write.load(Ordering::SeqCst) == address {
            return Err(BusError::Timeout { address });
        }
        self.calls.lock().unwrap().push(BusCall::Set(address, value));
        self.poke(address, value);
        Ok(())
    }
}

// ── FakeClock ─────────────────────────────────────────────────

pub struct FakeClock {
    now: Mutex<DateTime<Utc>>,
}

#[allow(dead_code)]
impl FakeClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(DateTime::from_timestamp(1_700_000_000, 0).unwrap()),
        }
    }

    pub fn advance_ms(&self, ms: i64) {
        *self.now.lock().unwrap() += Duration::milliseconds(ms);
    }

    pub fn advance_secs(&self, secs: i64) {
        self.advance_ms(secs * 1000);
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

// ── Codes ─────────────────────────────────────────────────────

/// Deterministic codes: `CODE-1`, `CODE-2`, ...
#[derive(Default)]
pub struct SequentialCodes {
    next: u32,
    pub fail: Arc<AtomicBool>,
}

impl CodeGenerator for SequentialCodes {
    fn generate(
        &mut self,
        _descriptor: &RunDescriptor,
        _ordinal: u32,
        _quantity: u32,
    ) -> Result<GeneratedCode, LabelError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(LabelError::Exhausted);
        }
        self.next += 1;
        let token = format!("CODE-{}", self.next);
        Ok(GeneratedCode {
            artifact: format!("labels/{token}.png"),
            payload: String::new(),
            token,
        })
    }
}

// ── Printer ───────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct RecordingPrinter {
    pub jobs: Arc<Mutex<Vec<String>>>,
    pub offline: Arc<AtomicBool>,
}

#[allow(dead_code)]
impl RecordingPrinter {
    pub fn jobs(&self) -> Vec<String> {
        self.jobs.lock().unwrap().clone()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

impl Printer for RecordingPrinter {
    fn print(&mut self, artifact: &str) -> Result<(), PrintError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(PrintError::Offline);
        }
        self.jobs.lock().unwrap().push(artifact.to_string());
        Ok(())
    }
}

// ── Event sink ────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct RecordingSink {
    pub events: Arc<Mutex<Vec<LineEvent>>>,
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &LineEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

// ── Storage ───────────────────────────────────────────────────

/// Storage whose contents stay visible to the test after the service
/// took ownership of its handle.
#[derive(Clone, Default)]
pub struct SharedStorage {
    pub map: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    pub read_only: Arc<AtomicBool>,
}

fn composite(namespace: &str, key: &str) -> String {
    format!("{namespace}::{key}")
}

#[allow(dead_code)]
impl SharedStorage {
    pub fn raw(&self, namespace: &str, key: &str) -> Option<Vec<u8>> {
        self.map.lock().unwrap().get(&composite(namespace, key)).cloned()
    }

    pub fn put_raw(&self, namespace: &str, key: &str, bytes: &[u8]) {
        self.map
            .lock()
            .unwrap()
            .insert(composite(namespace, key), bytes.to_vec());
    }
}

impl StoragePort for SharedStorage {
    fn read(&self, namespace: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        self.raw(namespace, key).ok_or(StorageError::NotFound)
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        if self.read_only.load(Ordering::SeqCst) {
            return Err(StorageError::Full);
        }
        self.put_raw(namespace, key, data);
        Ok(())
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        self.map.lock().unwrap().remove(&composite(namespace, key));
        Ok(())
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        self.map.lock().unwrap().contains_key(&composite(namespace, key))
    }
}

// ── Assembled line ────────────────────────────────────────────

pub struct TestLine {
    pub service: LineService,
    pub bus: Arc<MockBus>,
    pub clock: Arc<FakeClock>,
    pub printer: RecordingPrinter,
    pub sink: RecordingSink,
    pub storage: SharedStorage,
    pub code_failure: Arc<AtomicBool>,
}

#[allow(dead_code)]
impl TestLine {
    pub fn new() -> Self {
        Self::with_storage(SharedStorage::default())
    }

    pub fn with_storage(storage: SharedStorage) -> Self {
        Self::with_parts(Arc::new(MockBus::new()), storage)
    }

    pub fn with_parts(bus: Arc<MockBus>, storage: SharedStorage) -> Self {
        let clock = Arc::new(FakeClock::new());
        let printer = RecordingPrinter::default();
        let sink = RecordingSink::default();
        let codes = SequentialCodes::default();
        let code_failure = codes.fail.clone();

        let ports = LinePorts {
            bus: bus.clone(),
            clock: clock.clone(),
            codes: Box::new(codes),
            printer: Box::new(printer.clone()),
            reports: Box::new(TextReportAssembler::new()),
            storage: Box::new(storage.clone()),
            sink: Box::new(sink.clone()),
        };
        Self {
            service: LineService::new(LineConfig::default(), ports),
            bus,
            clock,
            printer,
            sink,
            storage,
            code_failure,
        }
    }

    pub fn events(&self) -> Vec<LineEvent> {
        self.sink.events.lock().unwrap().clone()
    }

    pub fn descriptor() -> RunDescriptor {
        RunDescriptor::new("Marie", "Acme", "custom")
    }

    /// Start a run and let the line acknowledge it.
    pub fn running(quantity: u32) -> Self {
        let line = Self::new();
        line.service.start(Self::descriptor(), quantity).unwrap();
        line.bus.poke(CONVEYOR, LineConfig::default().line_ack_value);
        line.service.poll().unwrap();
        line
    }

    /// Drive the current box from the print station into its scan window.
    pub fn box_to_scanner(&self) {
        self.bus.poke(PROXIMITY_1, 1);
        self.service.poll().unwrap();
        self.bus.poke(PROXIMITY_2, 1);
        self.service.poll().unwrap();
    }

    /// Drive the current box all the way through an accepted scan.
    pub fn pass_box(&self) {
        self.box_to_scanner();
        self.bus.poke(SCANNER, 1);
        self.service.poll().unwrap();
    }
}
