//! Settings database access
//!
//! Read/write engine tunables in the settings table (key-value store).

use crate::error::{Error, Result};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;

/// Generic setting getter
///
/// Returns `Ok(None)` when the key is absent or holds NULL.
pub async fn get_setting<T: FromStr>(db: &Pool<Sqlite>, key: &str) -> Result<Option<T>> {
    let value: Option<Option<String>> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(db)
            .await?;

    match value.flatten() {
        Some(s) => match s.trim().parse::<T>() {
            Ok(parsed) => Ok(Some(parsed)),
            Err(_) => Err(Error::Config(format!(
                "Failed to parse setting '{}' value: {}",
                key, s
            ))),
        },
        None => Ok(None),
    }
}

/// Generic setting setter
///
/// Inserts or updates setting in database.
pub async fn set_setting<T: ToString>(db: &Pool<Sqlite>, key: &str, value: T) -> Result<()> {
    let value_str = value.to_string();

    sqlx::query(
        r#"
        INSERT INTO settings (key, value)
        VALUES (?, ?)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(key)
    .bind(value_str)
    .execute(db)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_test_db() -> Pool<Sqlite> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        repost_common::db::init::create_settings_table(&pool)
            .await
            .unwrap();
        pool
    }

    #[tokio::test]
    async fn test_missing_setting_is_none() {
        let pool = setup_test_db().await;
        let value: Option<i64> = get_setting(&pool, "nope").await.unwrap();
        assert_eq!(value, None);
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let pool = setup_test_db().await;
        set_setting(&pool, "selector_min_score", 72.5).await.unwrap();
        let value: Option<f64> = get_setting(&pool, "selector_min_score").await.unwrap();
        assert_eq!(value, Some(72.5));

        set_setting(&pool, "selector_min_score", 60).await.unwrap();
        let value: Option<f64> = get_setting(&pool, "selector_min_score").await.unwrap();
        assert_eq!(value, Some(60.0));
    }

    #[tokio::test]
    async fn test_unparseable_setting_is_config_error() {
        let pool = setup_test_db().await;
        set_setting(&pool, "trigger_threshold", "twenty").await.unwrap();
        let result: Result<Option<i64>> = get_setting(&pool, "trigger_threshold").await;
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
