use std::io;
use thiserror::Error;

/// Result type for session operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for session operations
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Failed to bind a transport channel
    #[error("Bind error: {0}")]
    Bind(String),

    /// Transport send/close error
    #[error("Transport error: {0}")]
    Transport(String),

    /// Packet encode/decode error
    #[error("Codec error: {0}")]
    Codec(String),

    /// Operation not valid in the current session state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

impl From<&str> for Error {
    fn from(err: &str) -> Self {
        Error::Transport(err.to_string())
    }
}
