//! Error types for repost-engine
//!
//! Collaborator failures and trigger-count failures are degraded at their
//! call sites and never surface through these variants to the daemon loop.

use repost_common::QueueStatus;
use thiserror::Error;
use uuid::Uuid;

/// Main error type for the engine
#[derive(Error, Debug)]
pub enum Error {
    /// Database connection or query errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Errors raised by the common crate (model decoding, bootstrap)
    #[error(transparent)]
    Common(#[from] repost_common::Error),

    /// Setting missing or unparseable
    #[error("Configuration error: {0}")]
    Config(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Queue entry was not in the state the transition requires
    #[error("Queue entry {entry_id} cannot move from {from} to {to}")]
    InvalidTransition {
        entry_id: Uuid,
        from: QueueStatus,
        to: QueueStatus,
    },

    /// External collaborator (caption, posting time, publisher) failed
    #[error("Collaborator error: {0}")]
    Collaborator(String),

    /// External collaborator did not answer in time
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// SQLite reports writer contention as "database is locked"
    pub fn is_lock_contention(&self) -> bool {
        match self {
            Error::Database(e) => e.to_string().contains("database is locked"),
            Error::Common(repost_common::Error::Database(e)) => {
                e.to_string().contains("database is locked")
            }
            _ => false,
        }
    }
}

/// Convenience Result type using the engine Error
pub type Result<T> = std::result::Result<T, Error>;
