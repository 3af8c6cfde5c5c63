//! Error types for colloquy-core

use crate::ActorRole;
use thiserror::Error;

/// Core error type
///
/// Only setup, registration and configuration paths return errors. Failures
/// during a tick are reported as an [`AbortReason`](crate::AbortReason) on the
/// affected context instead.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("RON parse error: {0}")]
    Ron(#[from] ron::error::SpannedError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Actor not found in session: {0}")]
    UnknownActor(ActorRole),

    #[error("Actor already bound to session: {0}")]
    DuplicateActor(ActorRole),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
