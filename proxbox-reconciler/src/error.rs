//! Error types for the reconciliation engine.

use thiserror::Error;

/// Errors that can occur while reading or writing hypervisor and registry state.
#[derive(Error, Debug)]
pub enum ReconcileError {
    /// The request never produced a response (connection, TLS, timeout).
    #[error("Transport error: {0}")]
    Transport(String),

    /// The registry answered a write with a non-success status.
    #[error("Registry rejected write: {0}")]
    WriteRejected(String),

    /// The requested object does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A response body could not be decoded.
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// The hypervisor API reported an error.
    #[error("Hypervisor error: {0}")]
    Hypervisor(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for reconciliation operations.
pub type Result<T> = std::result::Result<T, ReconcileError>;
