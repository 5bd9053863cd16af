//! Unified error types for the inspection line.
//!
//! Every fallible control-surface operation funnels into [`Error`].  Callers
//! never need to match on the variant to decide what to do next: each error
//! carries an [`ErrorClass`] telling whether the request can simply be
//! retried, must be changed, or has already been self-healed by the core.

use core::fmt;

use crate::production::RunStatus;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible operation of the line service funnels into this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The request was malformed or not allowed in the current run state.
    Validation(ValidationError),
    /// A register bus transaction failed.
    Bus(BusError),
    /// Stored state failed structural validation and was discarded.
    Consistency(ConsistencyError),
    /// The printer could not produce the label for the current box.
    Print(PrintError),
    /// No unique code could be generated for a box.
    Label(LabelError),
    /// The summary document could not be assembled.
    Report(ReportError),
}

/// How a caller should treat an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Nothing was mutated; the same request may succeed on the next poll.
    Retryable,
    /// Nothing was mutated; the request itself must change.
    Terminal,
    /// The core discarded invalid state and is back to idle.
    SelfHealed,
}

impl Error {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Validation(_) => ErrorClass::Terminal,
            Self::Bus(_) | Self::Print(_) | Self::Label(_) | Self::Report(_) => {
                ErrorClass::Retryable
            }
            Self::Consistency(_) => ErrorClass::SelfHealed,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Retryable
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(e) => write!(f, "validation: {e}"),
            Self::Bus(e) => write!(f, "bus: {e}"),
            Self::Consistency(e) => write!(f, "consistency: {e}"),
            Self::Print(e) => write!(f, "print: {e}"),
            Self::Label(e) => write!(f, "label: {e}"),
            Self::Report(e) => write!(f, "report: {e}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Validation errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Requested quantity was zero.
    ZeroQuantity,
    /// Requested quantity exceeds the configured maximum.
    QuantityTooLarge { requested: u32, max: u32 },
    /// A descriptor label is empty.
    MissingDescriptor(&'static str),
    /// No quantity was given and the production type is not a known preset.
    UnknownPreset(String),
    /// `start` while another run is still active.
    RunAlreadyActive,
    /// The operation needs a run and there is none.
    NoActiveRun,
    /// `restart` outside the `Stopped` status.
    NotStopped(RunStatus),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroQuantity => write!(f, "quantity must be positive"),
            Self::QuantityTooLarge { requested, max } => {
                write!(f, "quantity {requested} exceeds maximum {max}")
            }
            Self::MissingDescriptor(field) => write!(f, "missing descriptor field '{field}'"),
            Self::UnknownPreset(kind) => {
                write!(f, "production type '{kind}' has no preset quantity")
            }
            Self::RunAlreadyActive => write!(f, "a production run is already active"),
            Self::NoActiveRun => write!(f, "no production run"),
            Self::NotStopped(status) => {
                write!(f, "production is {status:?}, restart requires Stopped")
            }
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationError> for Error {
    fn from(e: ValidationError) -> Self {
        Self::Validation(e)
    }
}

// ---------------------------------------------------------------------------
// Bus errors
// ---------------------------------------------------------------------------

/// Failure of a single register transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusError {
    /// The transport session could not be established.
    Unreachable { address: u32 },
    /// The transaction did not complete within the bus timeout.
    Timeout { address: u32 },
    /// The controller answered with an exception code.
    Exception { address: u32, code: u8 },
    /// The address is outside the holding-register range.
    IllegalAddress { address: u32 },
}

impl BusError {
    pub fn address(&self) -> u32 {
        match *self {
            Self::Unreachable { address }
            | Self::Timeout { address }
            | Self::Exception { address, .. }
            | Self::IllegalAddress { address } => address,
        }
    }
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unreachable { address } => write!(f, "controller unreachable ({address})"),
            Self::Timeout { address } => write!(f, "transaction timed out ({address})"),
            Self::Exception { address, code } => {
                write!(f, "controller exception 0x{code:02x} ({address})")
            }
            Self::IllegalAddress { address } => write!(f, "illegal register address {address}"),
        }
    }
}

impl std::error::Error for BusError {}

impl From<BusError> for Error {
    fn from(e: BusError) -> Self {
        Self::Bus(e)
    }
}

// ---------------------------------------------------------------------------
// Consistency errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsistencyError {
    /// Stored bytes could not be decoded.
    Undecodable,
    /// Decoded state violates a structural rule.
    Invalid(&'static str),
}

impl fmt::Display for ConsistencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undecodable => write!(f, "stored run could not be decoded"),
            Self::Invalid(why) => write!(f, "stored run invalid: {why}"),
        }
    }
}

impl std::error::Error for ConsistencyError {}

impl From<ConsistencyError> for Error {
    fn from(e: ConsistencyError) -> Self {
        Self::Consistency(e)
    }
}

// ---------------------------------------------------------------------------
// Side-effect collaborator errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrintError {
    /// The printer is not available.
    Offline,
    /// The artifact to print does not exist.
    ArtifactMissing,
    /// The print job was accepted and then failed.
    JobFailed,
}

impl fmt::Display for PrintError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Offline => write!(f, "printer offline"),
            Self::ArtifactMissing => write!(f, "label artifact missing"),
            Self::JobFailed => write!(f, "print job failed"),
        }
    }
}

impl std::error::Error for PrintError {}

impl From<PrintError> for Error {
    fn from(e: PrintError) -> Self {
        Self::Print(e)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelError {
    /// Every candidate token collided with one already issued.
    Exhausted,
    /// The label payload could not be encoded.
    Encoding,
}

impl fmt::Display for LabelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted => write!(f, "no unique code available"),
            Self::Encoding => write!(f, "label payload encoding failed"),
        }
    }
}

impl std::error::Error for LabelError {}

impl From<LabelError> for Error {
    fn from(e: LabelError) -> Self {
        Self::Label(e)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportError {
    /// The document backend failed to render.
    RenderFailed,
}

impl fmt::Display for ReportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RenderFailed => write!(f, "report rendering failed"),
        }
    }
}

impl std::error::Error for ReportError {}

impl From<ReportError> for Error {
    fn from(e: ReportError) -> Self {
        Self::Report(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
