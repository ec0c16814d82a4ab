// error.rs

#[cfg(feature = "cli")]
use indicatif::style::TemplateError;
use std::num::ParseIntError;
use thiserror::Error;

/// Errors produced by the core, grouped in the precedence order a caller
/// should expect to encounter them in: configuration mistakes are caught
/// before an index is ever touched, I/O failures happen while reading it,
/// resource/unsupported errors are programming-level invariant violations,
/// and arithmetic errors are local to a single partition. See
/// [`PiqueError::class`].
#[derive(Error, Debug)]
pub enum PiqueError {
    // --- Configuration ---
    #[error("unknown region encoding: {0}")]
    UnknownRegionEncoding(String),

    #[error("unknown index encoding: {0}")]
    UnknownIndexEncoding(String),

    #[error("domain size mismatch: {left} != {right}")]
    DomainSizeMismatch { left: u64, right: u64 },

    #[error("unknown variable: {0}")]
    UnknownVariable(String),

    #[error("malformed query: {0}")]
    MalformedQuery(String),

    #[error("partitions for variable '{0}' do not agree on domain extents")]
    IncompatiblePartitioning(String),

    #[error("invalid interval: end ({end}) must be greater than start ({start})")]
    InvalidInterval { start: u32, end: u32 },

    #[error("parse integer error: {0}")]
    ParseIntError(#[from] ParseIntError),

    #[error("dataset '{0}' has an undefined datatype")]
    UndefinedDatatype(String),

    // --- I/O ---
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("missing index file: {0}")]
    MissingIndexFile(std::path::PathBuf),

    #[error("failed to cache dataset metadata for '{0}'")]
    FailedToCacheMetadata(String),

    #[error("unknown dataset format token: {0}")]
    UnknownDatasetFormat(String),

    #[error("truncated region payload: expected {expected} bytes, got {got}")]
    TruncatedRegion { expected: usize, got: usize },

    #[error("serialization version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("bincode error: {0}")]
    Bincode(#[from] Box<bincode::ErrorKind>),

    // --- Resource (fatal) ---
    #[error("cache invariant violation: {0}")]
    CacheInvariantViolation(String),

    // --- Unsupported (fatal) ---
    #[error("unsupported operand combination: {0}")]
    UnsupportedOperandCombination(String),

    // --- Arithmetic (fatal for the affected partition) ---
    #[error("quantizer overflow: {0}")]
    QuantizerOverflow(String),

    #[error("empty bin array")]
    EmptyBinArray,

    #[error("{0}")]
    StringError(String),

    #[cfg(feature = "cli")]
    #[error("template error: {0}")]
    TemplateError(#[from] TemplateError),
}

/// Coarse error class, used to decide whether a `QueryCursor` can report and
/// skip a partition, or must stop iterating entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Configuration,
    Io,
    Resource,
    Unsupported,
    Arithmetic,
}

impl PiqueError {
    pub fn class(&self) -> ErrorClass {
        use PiqueError::*;
        match self {
            UnknownRegionEncoding(_)
            | UnknownIndexEncoding(_)
            | DomainSizeMismatch { .. }
            | UnknownVariable(_)
            | MalformedQuery(_)
            | IncompatiblePartitioning(_)
            | InvalidInterval { .. }
            | ParseIntError(_)
            | UndefinedDatatype(_)
            | UnknownDatasetFormat(_)
            | StringError(_) => ErrorClass::Configuration,

            Io(_) | MissingIndexFile(_) | TruncatedRegion { .. } | VersionMismatch { .. }
            | Bincode(_) | FailedToCacheMetadata(_) => ErrorClass::Io,

            CacheInvariantViolation(_) => ErrorClass::Resource,

            UnsupportedOperandCombination(_) => ErrorClass::Unsupported,

            QuantizerOverflow(_) | EmptyBinArray => ErrorClass::Arithmetic,

            #[cfg(feature = "cli")]
            TemplateError(_) => ErrorClass::Configuration,
        }
    }

    /// Resource and unsupported errors are programming-level invariant
    /// violations: the engine never tries to recover from them.
    pub fn is_fatal(&self) -> bool {
        matches!(self.class(), ErrorClass::Resource | ErrorClass::Unsupported)
    }
}

impl From<&str> for PiqueError {
    fn from(error: &str) -> Self {
        PiqueError::StringError(error.to_string())
    }
}

impl From<String> for PiqueError {
    fn from(error: String) -> Self {
        PiqueError::StringError(error)
    }
}
