//! Error types for matchbook

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Source error: {0}")]
    Source(String),

    /// The external store reported throughput exhaustion. Recovered by the
    /// rate-limited writer; callers outside the writer should not see this.
    #[error("Store throughput exceeded")]
    Throttled,

    /// A retryable store failure (the internal-server-error class).
    #[error("Transient store error: {0}")]
    Transient(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Store not found: {0}")]
    StoreMissing(String),

    #[error("Writer shut down")]
    Shutdown,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    pub fn source(msg: impl Into<String>) -> Self {
        Error::Source(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Error::Store(msg.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Error::Transient(msg.into())
    }

    pub fn encoding(msg: impl Into<String>) -> Self {
        Error::Encoding(msg.into())
    }

    /// True for errors that indicate a bad deployment rather than a bad call.
    pub fn is_config(&self) -> bool {
        matches!(self, Error::Config(_))
    }
}
