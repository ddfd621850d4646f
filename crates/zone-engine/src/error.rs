//! Engine error types

use thiserror::Error;

use crate::session::SessionState;

/// Errors reported by an audio-server backend
///
/// These never reach the realtime thread. Queued requests log them with
/// the request description and move on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Server not reachable, or the client could not be created
    #[error("Failed to open client '{name}': {reason}")]
    Open { name: String, reason: String },

    #[error("Failed to register port '{name}': {reason}")]
    Register { name: String, reason: String },

    #[error("Failed to unregister port '{name}': {reason}")]
    Unregister { name: String, reason: String },

    #[error("Failed to connect '{from}' to '{to}': {reason}")]
    Connect {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Failed to activate client: {0}")]
    Activate(String),

    #[error("Failed to close client: {0}")]
    Close(String),

    /// The client was closed or shut down by the server
    #[error("Client '{0}' is closed")]
    Closed(String),
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Errors in the client session lifecycle
#[derive(Error, Debug)]
pub enum SessionError {
    /// A state transition was attempted from the wrong state
    #[error("Session '{name}' is {actual:?}, expected {expected:?}")]
    InvalidState {
        name: String,
        expected: SessionState,
        actual: SessionState,
    },

    /// The session has no live client handle
    #[error("Session '{0}' has no client")]
    NoClient(String),

    #[error("Failed to spawn thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors from the engine facade's synchronous calls
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Result type for engine facade operations
pub type EngineResult<T> = Result<T, EngineError>;
