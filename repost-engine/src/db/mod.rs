//! Database access layer
//!
//! Query functions grouped by table. Schema creation lives in
//! `repost_common::db`.

pub mod content_items;
pub mod fingerprints;
pub mod queue;
pub mod settings;
pub mod trigger_state;
