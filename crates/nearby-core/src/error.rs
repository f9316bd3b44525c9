//! Error types for nearby core library.
//!
//! Infrastructure failures are grouped per backend so callers can tell a bad
//! request from a retryable outage.

use crate::records::RecordId;
use thiserror::Error;

/// Result type alias for nearby operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for nearby.
#[derive(Error, Debug)]
pub enum Error {
    /// Caller supplied an invalid argument
    #[error("Invalid argument: {0}")]
    Validation(#[from] ValidationError),

    /// Record absent or no longer active
    #[error("Record not found: {0}")]
    NotFound(RecordId),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Spatial index error
    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    /// Change log error
    #[error("Change log error: {0}")]
    ChangeLog(#[from] ChangeLogError),

    /// Record store error
    #[error("Record store error: {0}")]
    RecordStore(String),

    /// Hot-zone source error
    #[error("Hot zone source error: {0}")]
    HotZone(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// True for errors caused by the request itself (never retried).
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::Validation(_) | Error::NotFound(_))
    }

    /// True for backend failures that a later retry may clear.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Index(_)
                | Error::ChangeLog(_)
                | Error::RecordStore(_)
                | Error::HotZone(_)
                | Error::Io(_)
        )
    }
}

/// Request validation errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Latitude outside [-90, 90]
    #[error("latitude must be between -90 and 90, got {0}")]
    Latitude(f64),

    /// Longitude outside [-180, 180]
    #[error("longitude must be between -180 and 180, got {0}")]
    Longitude(f64),

    /// Radius outside the configured bounds
    #[error("radius must be between {min} and {max} meters, got {actual}")]
    Radius { min: u32, max: u32, actual: u32 },

    /// Page size outside the configured bounds
    #[error("limit must be between 1 and {max}, got {actual}")]
    Limit { max: u32, actual: u32 },

    /// Cursor could not be decoded
    #[error("invalid cursor")]
    Cursor,

    /// A required text field was blank
    #[error("{0} must not be blank")]
    Blank(&'static str),
}

/// Spatial index errors.
#[derive(Error, Debug)]
pub enum IndexError {
    /// Partition backend unreachable
    #[error("Partition {partition} unavailable: {message}")]
    Unavailable { partition: String, message: String },
}

/// Change log errors.
#[derive(Error, Debug)]
pub enum ChangeLogError {
    /// Journal corrupted
    #[error("Journal corrupted at line {line}: {message}")]
    Corrupted { line: u64, message: String },

    /// Checksum mismatch
    #[error("Checksum mismatch at line {line}: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch { line: u64, expected: u32, actual: u32 },

    /// Entry write failed
    #[error("Entry write failed: {0}")]
    WriteFailed(String),

    /// Marked an event id that was never appended
    #[error("Unknown event id: {0}")]
    UnknownEvent(u64),
}

// Foreign errors

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<prometheus::Error> for Error {
    fn from(err: prometheus::Error) -> Self {
        Error::Config(format!("metrics registration: {}", err))
    }
}
