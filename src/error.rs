//! Error types for dbxbridge
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// All error types that can occur while talking to the daemon
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Socket creation, connect or connect timeout failed during the handshake
    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    /// Read/write error or timeout in the middle of a transaction
    #[error("Transaction I/O error: {0}")]
    TransactionIo(String),

    /// The peer sent something the protocol does not allow
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// start() called twice
    #[error("Already started")]
    AlreadyStarted,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for dbxbridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;
