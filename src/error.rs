//! Crate error types

use crate::config::ConfigError;

/// Harness errors
///
/// Only startup-time problems reach callers. Failures inside running
/// workers (accept errors, peer disconnects, failed poll ticks) are logged
/// where they happen.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Server already started")]
    AlreadyStarted,

    #[error("Server is shut down")]
    ShutDown,
}

/// Result type for harness operations
pub type Result<T> = std::result::Result<T, Error>;
