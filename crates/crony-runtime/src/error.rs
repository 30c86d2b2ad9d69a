//! Error types for the crony-runtime crate.

use thiserror::Error;

/// All errors that can originate from runtime operations.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The runtime client process could not be spawned.
    #[error("spawn error: {0}")]
    Spawn(String),

    /// The runtime rejected the request.
    #[error("`{command}` exited with status {status}: {stderr}")]
    Command {
        command: String,
        status: i32,
        stderr: String,
    },

    /// Output of the runtime could not be understood.
    #[error("decode error: {0}")]
    Decode(String),

    /// Underlying I/O failure (pipe read, wait).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, RuntimeError>;
