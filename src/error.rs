//! Error types for the bridge

use std::io;

use thiserror::Error;

use crate::types::SessionState;

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors surfaced to callers of the bridge
///
/// Protocol decode errors and correlation misses never appear here; they are
/// logged at the transport boundary and the offending line is dropped.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The server process could not be spawned
    #[error("failed to spawn analysis server process: {0}")]
    Spawn(#[source] io::Error),

    /// The server never emitted its readiness event
    #[error("analysis server did not signal readiness within {timeout_ms} ms")]
    StartTimeout {
        /// The configured handshake timeout
        timeout_ms: u64,
    },

    /// The server process exited before signalling readiness
    #[error("analysis server process exited during startup")]
    ProcessExited,

    /// An operation required a session state the session is not in
    #[error("session is not ready (state: {state:?})")]
    NotReady {
        /// The state the session was actually in
        state: SessionState,
    },

    /// The server answered with `Success: false`
    #[error("server rejected {command}: {message}")]
    RequestFailed {
        /// Command the request carried
        command: String,
        /// The server's message, or its body rendered as text
        message: String,
    },

    /// The request was cancelled before a response arrived
    #[error("request was cancelled")]
    Cancelled,

    /// The transport closed while requests were outstanding
    #[error("connection to the analysis server was lost")]
    TransportClosed,

    /// Server options could not be loaded or failed validation
    #[error("invalid server options: {0}")]
    Config(String),

    /// I/O failure on the transport streams
    #[error("transport I/O error: {0}")]
    Io(#[from] io::Error),
}
