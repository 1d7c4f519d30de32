//! Database bootstrap and persisted models

pub mod init;
pub mod migrations;
pub mod models;

pub use init::{create_tables, ensure_setting, init_database, DEFAULT_SETTINGS};
pub use migrations::{run_migrations, CURRENT_SCHEMA_VERSION};
pub use models::*;
