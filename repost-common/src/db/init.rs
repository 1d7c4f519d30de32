//! Database initialization
//!
//! Creates the database on first run, builds every table idempotently, runs
//! versioned migrations and fills in default settings.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::{info, warn};

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Publication workers claim queue entries concurrently; keep enough
    // connections that a claim never waits on a cycle holding the pool.
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

    // WAL allows concurrent readers with one writer
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;

    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    create_tables(&pool).await?;

    crate::db::migrations::run_migrations(&pool).await?;

    init_default_settings(&pool).await?;

    Ok(pool)
}

/// Create every table and index (idempotent)
///
/// Exposed separately so tests can build the schema on an in-memory pool.
pub async fn create_tables(pool: &SqlitePool) -> Result<()> {
    create_schema_version_table(pool).await?;
    create_settings_table(pool).await?;
    create_content_items_table(pool).await?;
    create_fingerprints_table(pool).await?;
    create_trigger_state_table(pool).await?;
    create_repost_queue_table(pool).await?;
    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the settings table
///
/// Stores engine tunables as key-value pairs.
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the content catalog table
///
/// Rows are never deleted. The composite selection index on
/// `(platform, repost_eligible, reposted, performance_score)` serves the
/// candidate filter, the status index serves the trigger count.
pub async fn create_content_items_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS content_items (
            id TEXT PRIMARY KEY,
            platform TEXT NOT NULL CHECK (platform IN ('youtube', 'instagram')),
            external_id TEXT NOT NULL,
            caption TEXT,
            status TEXT NOT NULL DEFAULT 'published'
                CHECK (status IN ('draft', 'published', 'live', 'removed')),
            views INTEGER NOT NULL DEFAULT 0,
            likes INTEGER NOT NULL DEFAULT 0,
            comments INTEGER NOT NULL DEFAULT 0,
            performance_score REAL NOT NULL DEFAULT 0,
            published_at INTEGER NOT NULL,
            repost_eligible INTEGER NOT NULL DEFAULT 1,
            reposted INTEGER NOT NULL DEFAULT 0,
            reposted_at INTEGER,
            repost_count INTEGER NOT NULL DEFAULT 0,
            fingerprint_hash TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            UNIQUE (platform, external_id),
            CHECK (reposted = 0 OR reposted_at IS NOT NULL),
            CHECK (repost_count >= 0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_content_items_selection \
         ON content_items(platform, repost_eligible, reposted, performance_score)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_content_items_published \
         ON content_items(platform, status, published_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the fingerprint store
pub async fn create_fingerprints_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS fingerprints (
            content_hash TEXT PRIMARY KEY,
            content_item_id TEXT NOT NULL REFERENCES content_items(id),
            byte_size INTEGER NOT NULL CHECK (byte_size >= 0),
            duration_seconds REAL CHECK (duration_seconds IS NULL OR duration_seconds >= 0),
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_fingerprints_size ON fingerprints(byte_size)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_fingerprints_duration ON fingerprints(duration_seconds)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the per-platform trigger state table
pub async fn create_trigger_state_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS trigger_state (
            platform TEXT PRIMARY KEY CHECK (platform IN ('youtube', 'instagram')),
            last_trigger_at INTEGER NOT NULL,
            new_qualifying_count INTEGER NOT NULL DEFAULT 0,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the repost queue
///
/// The unique index is the storage-level guarantee that no two entries share
/// a `(platform, scheduled_for)` instant.
pub async fn create_repost_queue_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS repost_queue (
            id TEXT PRIMARY KEY,
            source_content_item_id TEXT NOT NULL REFERENCES content_items(id),
            target_platform TEXT NOT NULL CHECK (target_platform IN ('youtube', 'instagram')),
            status TEXT NOT NULL DEFAULT 'queued'
                CHECK (status IN ('queued', 'processing', 'completed', 'failed')),
            priority INTEGER NOT NULL DEFAULT 0,
            scheduled_for INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            claimed_at INTEGER,
            completed_at INTEGER,
            generated_caption TEXT,
            error_message TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_repost_queue_slot \
         ON repost_queue(target_platform, scheduled_for)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_repost_queue_status \
         ON repost_queue(target_platform, status, scheduled_for)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Default engine settings, `(key, value)`
///
/// Kept in sync with `EngineConfig::default()` in the engine crate.
pub const DEFAULT_SETTINGS: &[(&str, &str)] = &[
    // Trigger gate
    ("trigger_threshold", "20"),
    ("trigger_lookback_days", "30"),
    // Eligibility selector
    ("selector_min_score", "70"),
    ("selector_cooldown_days", "30"),
    ("selector_fetch_limit", "10"),
    ("repost_high_tier_score", "80"),
    ("repost_mid_tier_score", "60"),
    // Slot allocator
    ("max_reposts_per_day_youtube", "3"),
    ("max_reposts_per_day_instagram", "3"),
    ("slot_first_hour", "9"),
    ("slot_interval_hours", "3"),
    ("slot_utc_offset_minutes", "0"),
    ("preferred_slot_count", "5"),
    // Fingerprint matcher
    ("match_confidence_threshold", "75"),
    ("match_similarity_tolerance", "0.2"),
    ("match_candidate_cap", "20"),
    // Orchestration
    ("collaborator_timeout_ms", "10000"),
    ("trigger_check_interval_secs", "3600"),
    ("daily_pass_interval_secs", "86400"),
    ("db_max_lock_wait_ms", "5000"),
];

/// Initialize or repair default settings
///
/// Missing settings are created; settings holding NULL are reset.
async fn init_default_settings(pool: &SqlitePool) -> Result<()> {
    for (key, value) in DEFAULT_SETTINGS {
        ensure_setting(pool, key, value).await?;
    }

    info!("Default settings initialized");
    Ok(())
}

/// Ensure a setting exists with the specified default value
///
/// If the setting doesn't exist, it will be created with the default.
/// If the setting exists but has a NULL value, it will be reset to the default.
pub async fn ensure_setting(pool: &SqlitePool, key: &str, default_value: &str) -> Result<()> {
    // INSERT OR IGNORE tolerates two processes initializing the same file
    let inserted = sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
        .bind(key)
        .bind(default_value)
        .execute(pool)
        .await?
        .rows_affected();

    if inserted > 0 {
        info!("Initialized setting '{}' with default value: {}", key, default_value);
        return Ok(());
    }

    let reset = sqlx::query("UPDATE settings SET value = ? WHERE key = ? AND value IS NULL")
        .bind(default_value)
        .bind(key)
        .execute(pool)
        .await?
        .rows_affected();

    if reset > 0 {
        warn!("Setting '{}' was NULL, reset to default: {}", key, default_value);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_test_db() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_tables_is_idempotent() {
        let pool = setup_test_db().await;
        create_tables(&pool).await.unwrap();
        create_tables(&pool).await.unwrap();

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();

        for expected in [
            "content_items",
            "fingerprints",
            "repost_queue",
            "schema_version",
            "settings",
            "trigger_state",
        ] {
            assert!(tables.iter().any(|t| t == expected), "missing table {}", expected);
        }
    }

    #[tokio::test]
    async fn test_reposted_requires_reposted_at() {
        let pool = setup_test_db().await;
        create_tables(&pool).await.unwrap();

        let result = sqlx::query(
            r#"
            INSERT INTO content_items
                (id, platform, external_id, published_at, reposted, reposted_at, created_at, updated_at)
            VALUES ('a', 'youtube', 'x1', 0, 1, NULL, 0, 0)
            "#,
        )
        .execute(&pool)
        .await;

        assert!(result.is_err(), "CHECK constraint should reject reposted without reposted_at");
    }

    #[tokio::test]
    async fn test_ensure_setting_inserts_and_repairs_null() {
        let pool = setup_test_db().await;
        create_settings_table(&pool).await.unwrap();

        ensure_setting(&pool, "trigger_threshold", "20").await.unwrap();
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM settings WHERE key = 'trigger_threshold'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(value.as_deref(), Some("20"));

        sqlx::query("UPDATE settings SET value = NULL WHERE key = 'trigger_threshold'")
            .execute(&pool)
            .await
            .unwrap();
        ensure_setting(&pool, "trigger_threshold", "20").await.unwrap();
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM settings WHERE key = 'trigger_threshold'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(value.as_deref(), Some("20"));
    }

    #[tokio::test]
    async fn test_ensure_setting_keeps_operator_value() {
        let pool = setup_test_db().await;
        create_settings_table(&pool).await.unwrap();

        sqlx::query("INSERT INTO settings (key, value) VALUES ('trigger_threshold', '5')")
            .execute(&pool)
            .await
            .unwrap();
        ensure_setting(&pool, "trigger_threshold", "20").await.unwrap();

        let value: String =
            sqlx::query_scalar("SELECT value FROM settings WHERE key = 'trigger_threshold'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(value, "5");
    }
}
