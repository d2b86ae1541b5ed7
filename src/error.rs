//! Error types
//!
//! All cross-context failures in this crate travel as values through
//! callbacks and continuations; nothing in the core panics or throws
//! across an execution-context boundary.

use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for room client operations
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// The signaling transport failed to connect or dropped the link
    #[error("signaling transport: {0}")]
    Transport(String),

    /// An operation required a live signaling connection
    #[error("signaling is not connected")]
    NotConnected,

    /// The server answered a transaction with `ok: false`
    #[error("transaction failed: code {code}, {reason}")]
    Transaction {
        /// Server-reported error code
        code: i32,
        /// Server-reported error reason
        reason: String,
    },

    /// A signaling payload was missing a required field or had the wrong shape
    #[error("malformed signaling payload: {0}")]
    Payload(String),

    /// The media engine rejected an operation
    #[error("media engine: {0}")]
    Engine(String),

    /// A named execution context does not exist in the pool
    #[error("no such execution context: {0}")]
    NoSuchContext(String),

    /// The owning session was torn down before the operation completed
    #[error("session closed")]
    SessionClosed,
}

impl Error {
    /// Build a transaction failure from a server error response
    pub fn transaction(code: i32, reason: impl Into<String>) -> Self {
        Error::Transaction {
            code,
            reason: reason.into(),
        }
    }
}
