//! Error types for colloquy-hub

use crate::ChannelId;
use colloquy_core::SessionId;
use thiserror::Error;

/// Result type for colloquy-hub operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in colloquy-hub
#[derive(Debug, Error)]
pub enum Error {
    /// No channel with this name is configured
    #[error("unknown channel {0:?}")]
    UnknownChannel(String),

    /// Channel id not issued by this arbiter
    #[error("invalid channel {0}")]
    InvalidChannel(ChannelId),

    /// Two channels share a name
    #[error("channel {0:?} configured twice")]
    DuplicateChannel(String),

    /// Session not owned by the hub
    #[error("session {0} not found")]
    UnknownSession(SessionId),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("RON parse error: {0}")]
    Ron(#[from] ron::error::SpannedError),

    /// Core error
    #[error("core error: {0}")]
    Core(#[from] colloquy_core::Error),
}

// Fails to compile if Error stops being Send + Sync.
fn _assert_error_send_sync<T: Send + Sync>() {}
fn _error_is_send_sync() {
    _assert_error_send_sync::<Error>();
}
