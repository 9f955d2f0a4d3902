//! Status taxonomy shared by every Tessera crate.
//!
//! The master's catalog path and the client session surface the same status
//! vocabulary, so the enum lives here rather than per-crate. Statuses carry a
//! human-readable message; callers that need a cause fold it into the message
//! with the `*_prepend` helpers.

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used across the Tessera crates.
pub type Result<T> = std::result::Result<T, TesseraError>;

/// Status codes for Tessera operations.
///
/// The same taxonomy is used server-side (catalog, consensus metadata,
/// tablet writes) and client-side (sessions, meta cache), and it travels
/// inside [`crate::rpc::WriteResponse`] for per-row errors.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize, Encode, Decode)]
pub enum TesseraError {
    /// Resource does not exist (table, tablet, row, file).
    #[error("Not found: {0}")]
    NotFound(String),

    /// Insert of a row or entity that already exists.
    #[error("Already present: {0}")]
    AlreadyPresent(String),

    /// Persisted or transmitted data failed validation.
    #[error("Corruption: {0}")]
    Corruption(String),

    /// Caller supplied a malformed argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Local I/O failure.
    #[error("IO error: {0}")]
    IoError(String),

    /// Remote peer unreachable or connection-level failure.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Operation did not complete within its deadline.
    #[error("Timed out: {0}")]
    TimedOut(String),

    /// Resource is temporarily exhausted (full queue, full buffer).
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Operation is not legal in the current state.
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// Operation was abandoned before completion.
    #[error("Aborted: {0}")]
    Aborted(String),
}

impl TesseraError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        TesseraError::NotFound(msg.into())
    }

    pub fn already_present(msg: impl Into<String>) -> Self {
        TesseraError::AlreadyPresent(msg.into())
    }

    pub fn corruption(msg: impl Into<String>) -> Self {
        TesseraError::Corruption(msg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        TesseraError::InvalidArgument(msg.into())
    }

    pub fn io_error(msg: impl Into<String>) -> Self {
        TesseraError::IoError(msg.into())
    }

    pub fn network_error(msg: impl Into<String>) -> Self {
        TesseraError::NetworkError(msg.into())
    }

    pub fn timed_out(msg: impl Into<String>) -> Self {
        TesseraError::TimedOut(msg.into())
    }

    pub fn service_unavailable(msg: impl Into<String>) -> Self {
        TesseraError::ServiceUnavailable(msg.into())
    }

    pub fn illegal_state(msg: impl Into<String>) -> Self {
        TesseraError::IllegalState(msg.into())
    }

    pub fn aborted(msg: impl Into<String>) -> Self {
        TesseraError::Aborted(msg.into())
    }

    /// Returns a copy of this status with `context` prepended to the message.
    ///
    /// Mirrors the common "Unable to load X: <cause>" pattern used on the
    /// bootstrap paths.
    pub fn prepend(&self, context: impl AsRef<str>) -> Self {
        let wrap = |msg: &String| format!("{}: {}", context.as_ref(), msg);
        match self {
            TesseraError::NotFound(m) => TesseraError::NotFound(wrap(m)),
            TesseraError::AlreadyPresent(m) => TesseraError::AlreadyPresent(wrap(m)),
            TesseraError::Corruption(m) => TesseraError::Corruption(wrap(m)),
            TesseraError::InvalidArgument(m) => TesseraError::InvalidArgument(wrap(m)),
            TesseraError::IoError(m) => TesseraError::IoError(wrap(m)),
            TesseraError::NetworkError(m) => TesseraError::NetworkError(wrap(m)),
            TesseraError::TimedOut(m) => TesseraError::TimedOut(wrap(m)),
            TesseraError::ServiceUnavailable(m) => TesseraError::ServiceUnavailable(wrap(m)),
            TesseraError::IllegalState(m) => TesseraError::IllegalState(wrap(m)),
            TesseraError::Aborted(m) => TesseraError::Aborted(wrap(m)),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, TesseraError::NotFound(_))
    }

    pub fn is_already_present(&self) -> bool {
        matches!(self, TesseraError::AlreadyPresent(_))
    }

    pub fn is_corruption(&self) -> bool {
        matches!(self, TesseraError::Corruption(_))
    }

    pub fn is_timed_out(&self) -> bool {
        matches!(self, TesseraError::TimedOut(_))
    }

    pub fn is_service_unavailable(&self) -> bool {
        matches!(self, TesseraError::ServiceUnavailable(_))
    }

    pub fn is_illegal_state(&self) -> bool {
        matches!(self, TesseraError::IllegalState(_))
    }

    /// Returns true if retrying the operation might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TesseraError::TimedOut(_)
                | TesseraError::NetworkError(_)
                | TesseraError::ServiceUnavailable(_)
        )
    }
}

impl From<std::io::Error> for TesseraError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            TesseraError::NotFound(err.to_string())
        } else {
            TesseraError::IoError(err.to_string())
        }
    }
}

impl From<bincode::error::EncodeError> for TesseraError {
    fn from(err: bincode::error::EncodeError) -> Self {
        TesseraError::Corruption(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for TesseraError {
    fn from(err: bincode::error::DecodeError) -> Self {
        TesseraError::Corruption(err.to_string())
    }
}
