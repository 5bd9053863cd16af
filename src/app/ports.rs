//! Port traits: the hexagonal boundary between the line core and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ LineService (domain)
//! ```
//!
//! Driven adapters (register bus, label generator, printer, report backend,
//! storage, clock, event sinks) implement these traits.  The
//! [`LineService`](super::service::LineService) owns them as trait objects,
//! so the core never touches a transport, a file or a printer directly.
//!
//! ## Notes
//!
//! - **RegisterBus** implementations own their own per-transaction lock.
//!   A lock is never held across more than one `get` or `set`.
//! - **ConfigPort** implementations MUST validate before persisting.
//! - All port errors are typed; callers must handle every variant explicitly.

use chrono::{DateTime, Utc};

use crate::config::LineConfig;
use crate::error::{BusError, LabelError, PrintError, ReportError};
use crate::production::{GeneratedCode, ProductionRun, RunDescriptor};

// ───────────────────────────────────────────────────────────────
// Register bus (driven adapter: domain ↔ field-bus controller)
// ───────────────────────────────────────────────────────────────

/// Addressable 16-bit holding-register file.
///
/// Each call is one complete transaction: open the session, read or write
/// one register, close it.  Calls are mutually exclusive with each other
/// and carry the bus timeout; a transaction that cannot complete in time
/// reports [`BusError::Timeout`].
pub trait RegisterBus: Send + Sync {
    /// Read one holding register.
    fn get(&self, address: u32) -> Result<u16, BusError>;

    /// Write one holding register.
    fn set(&self, address: u32, value: u16) -> Result<(), BusError>;
}

// ───────────────────────────────────────────────────────────────
// Code / label generator (driven adapter: domain → label backend)
// ───────────────────────────────────────────────────────────────

/// Produces the unique code and label artifact for one box.
///
/// Tokens MUST be unique across every call made through one generator,
/// including rapid repeated calls within the same second.
pub trait CodeGenerator: Send {
    fn generate(
        &mut self,
        descriptor: &RunDescriptor,
        ordinal: u32,
        quantity: u32,
    ) -> Result<GeneratedCode, LabelError>;
}

// ───────────────────────────────────────────────────────────────
// Printer (driven adapter: domain → label printer)
// ───────────────────────────────────────────────────────────────

pub trait Printer: Send {
    /// Print the label artifact.  Returns once the job has been accepted.
    fn print(&mut self, artifact: &str) -> Result<(), PrintError>;
}

// ───────────────────────────────────────────────────────────────
// Report assembler (driven adapter: domain → document backend)
// ───────────────────────────────────────────────────────────────

/// Renders the summary document for a run.
pub trait ReportAssembler: Send {
    /// `generated_at` is stamped into the document; runs that have not
    /// ended use it as the provisional end time.
    fn assemble(
        &self,
        run: &ProductionRun,
        generated_at: DateTime<Utc>,
    ) -> Result<Vec<u8>, ReportError>;
}

// ───────────────────────────────────────────────────────────────
// Clock
// ───────────────────────────────────────────────────────────────

/// Wall-clock source.  Scan deadlines are evaluated against this.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The core emits structured [`LineEvent`](super::events::LineEvent)s
/// through this port.  Adapters decide where they go.
pub trait EventSink: Send {
    fn emit(&mut self, event: &super::events::LineEvent);
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists line configuration.
///
/// Implementations MUST validate config values before persisting.
/// Invalid ranges are rejected with [`ConfigError::ValidationFailed`],
/// not silently clamped.
pub trait ConfigPort {
    /// Load configuration.  Returns [`ConfigError::NotFound`] if none is stored.
    fn load(&self) -> Result<LineConfig, ConfigError>;

    /// Validate and persist configuration.
    fn save(&self, config: &LineConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain ↔ key/value store)
// ───────────────────────────────────────────────────────────────

/// Key-value byte storage for the persisted run.
///
/// - Keys are namespaced to prevent collisions between subsystems.
/// - Write operations MUST be atomic: a reader sees the old value or the
///   new one, never a mix.
pub trait StoragePort: Send {
    fn read(&self, namespace: &str, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Write a value atomically.
    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Delete a key.  Returns `Ok(())` even if the key didn't exist.
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError>;

    /// Check whether a key exists without reading it.
    fn exists(&self, namespace: &str, key: &str) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigPort`] operations.
#[derive(Debug)]
pub enum ConfigError {
    /// No config file found.
    NotFound,
    /// Stored config failed deserialization.
    Corrupted,
    /// A config field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
    /// Generic I/O error from the storage backend.
    IoError,
}

/// Errors from [`StoragePort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested key does not exist.
    NotFound,
    /// Storage is full.
    Full,
    /// Generic I/O error.
    IoError,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "config not found"),
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}
