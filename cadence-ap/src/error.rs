//! Error types for cadence-ap
//!
//! Failure classes and how the engine treats them:
//! - `Resolution`: nothing playable came back for a track. Non-fatal, the engine
//!   moves on to the next queue item.
//! - `Pipeline`: a decode/fetch process failed to start or died while expected to
//!   run. Non-fatal, triggers an advance.
//! - `Transport`: the voice connection dropped. Retried with backoff, then the
//!   session is torn down.
//! - `InvalidOperation`: a command was rejected before anything was mutated. The
//!   message is the reason shown to the user.

use thiserror::Error;

/// Main error type for cadence-ap
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Resolver or direct-stream lookup returned nothing playable
    #[error("Resolution error: {0}")]
    Resolution(String),

    /// Decode/fetch process chain failure
    #[error("Pipeline error: {0}")]
    Pipeline(String),

    /// Voice transport failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Command rejected, state unchanged
    #[error("{0}")]
    InvalidOperation(String),

    /// I/O errors (process spawn, sink writes)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors from the shared library (config loading, parsing)
    #[error(transparent)]
    Common(#[from] cadence_common::Error),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Build an InvalidOperation rejection
    pub fn invalid(reason: impl Into<String>) -> Self {
        Error::InvalidOperation(reason.into())
    }
}

/// Convenience Result type using cadence-ap Error
pub type Result<T> = std::result::Result<T, Error>;
