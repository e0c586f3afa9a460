//! Common error types for nivelver.
//!
//! Local failures are fatal and always reach the caller of an operation.
//! Remote failures are advisory: the sync layer logs and counts them but
//! never lets them change the outcome of a user-facing operation.

use thiserror::Error;

/// Top-level error type for nivelver operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A required field was blank or otherwise invalid.
    ///
    /// Raised before any store is touched.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The local store failed to read or write.
    #[error("Local storage error: {0}")]
    LocalStorage(String),

    /// A record with the same key already exists in the local store.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// The remote store could not be reached.
    #[error("Remote unavailable: {0}")]
    RemoteUnavailable(String),

    /// The remote store rejected or failed a write.
    #[error("Remote write failed: {0}")]
    RemoteWrite(String),

    /// A remote document could not be decoded into a record.
    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    /// Credential hashing failed.
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A background task could not be joined.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error originated on the remote side.
    ///
    /// Remote errors never escalate past the sync coordinator.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            Error::RemoteUnavailable(_) | Error::RemoteWrite(_) | Error::MalformedRecord(_)
        )
    }

    /// Whether this error must be surfaced to the caller of an operation.
    pub fn is_fatal(&self) -> bool {
        !self.is_remote()
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
