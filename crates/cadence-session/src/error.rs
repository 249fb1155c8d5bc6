//! Error types for cadence-session

use thiserror::Error;

/// Session error type
#[derive(Debug, Error)]
pub enum Error {
    /// Session used before initialization
    #[error("Session not initialized")]
    NotInitialized,

    /// Host-only operation attempted by a non-host peer
    #[error("Operation requires the session host")]
    NotHost,

    /// Wire message could not be decoded
    #[error("Message decode failed: {0}")]
    Decode(#[from] bincode::Error),

    /// The injected simulation rejected a snapshot
    #[error("Snapshot apply failed: {0}")]
    SnapshotApply(String),

    /// Transport-level failure reported by the injected broadcast
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Result type for session operations
pub type Result<T> = std::result::Result<T, Error>;
