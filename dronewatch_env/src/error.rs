//! Error types for the DroneWatch boundary layer.

use thiserror::Error;

/// Errors raised at the boundary between the core and its collaborators.
#[derive(Debug, Error)]
pub enum EnvError {
    /// A record sink rejected a write (store closed, I/O failure, etc.)
    #[error("Storage error: {0}")]
    StorageError(String),

    /// The downstream emitter could not accept a tuple
    #[error("Emit error: {0}")]
    EmitError(String),

    /// An inbound payload mentioned no `uid` and is not a drone report
    #[error("Payload is not a drone report")]
    NotAReport,

    /// An inbound payload looked like a report but could not be decoded
    #[error("Malformed report: {0}")]
    MalformedReport(String),

    /// An argument to a boundary component was out of range
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl EnvError {
    /// Creates a storage error.
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::StorageError(msg.into())
    }

    /// Creates an emit error.
    pub fn emit(msg: impl Into<String>) -> Self {
        Self::EmitError(msg.into())
    }

    /// Creates a malformed-report error.
    pub fn malformed(msg: impl std::fmt::Display) -> Self {
        Self::MalformedReport(msg.to_string())
    }
}
