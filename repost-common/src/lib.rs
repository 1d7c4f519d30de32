//! # Repost Common Library
//!
//! Shared code for the repost engine including:
//! - Database bootstrap, schema and persisted models
//! - Event types (RepostEvent enum) and the EventBus
//! - Configuration loading and root folder resolution
//! - Fingerprint derivation (SHA-256 content hash)
//! - Timestamp helpers

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod fingerprint;
pub mod time;

pub use db::models::{
    ContentItem, ContentStatus, Fingerprint, Platform, QueueStatus, RepostQueueEntry, TriggerState,
};
pub use error::{Error, Result};
