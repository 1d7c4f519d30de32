//! Errors raised by the shared crate: bootstrap, model decoding and
//! fingerprint derivation

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Unreadable root folder or media file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML bootstrap file unreadable or malformed
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unknown platform or status string, oversized input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Blocking hash task failed to join
    #[error("Internal error: {0}")]
    Internal(String),
}
