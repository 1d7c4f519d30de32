//! Trigger state database access

use crate::error::Result;
use chrono::{DateTime, Utc};
use repost_common::db::models::TriggerStateRow;
use repost_common::time::to_millis;
use repost_common::{Platform, TriggerState};
use sqlx::{Pool, Sqlite};

pub async fn get_state(db: &Pool<Sqlite>, platform: Platform) -> Result<Option<TriggerState>> {
    let row: Option<TriggerStateRow> = sqlx::query_as(
        "SELECT platform, last_trigger_at, new_qualifying_count FROM trigger_state WHERE platform = ?",
    )
    .bind(platform.as_str())
    .fetch_optional(db)
    .await?;

    row.map(|r| TriggerState::try_from(r).map_err(Into::into))
        .transpose()
}

/// Load the platform's state, creating it at `initial_last_trigger_at` on
/// first use
pub async fn get_or_create(
    db: &Pool<Sqlite>,
    platform: Platform,
    initial_last_trigger_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<TriggerState> {
    sqlx::query(
        r#"
        INSERT OR IGNORE INTO trigger_state (platform, last_trigger_at, new_qualifying_count, updated_at)
        VALUES (?, ?, 0, ?)
        "#,
    )
    .bind(platform.as_str())
    .bind(to_millis(initial_last_trigger_at))
    .bind(to_millis(now))
    .execute(db)
    .await?;

    get_state(db, platform).await?.ok_or_else(|| {
        crate::error::Error::Internal(format!("Trigger state for {} not readable", platform))
    })
}

/// Remember the latest qualifying count (for status reporting)
pub async fn record_count(
    db: &Pool<Sqlite>,
    platform: Platform,
    count: i64,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query("UPDATE trigger_state SET new_qualifying_count = ?, updated_at = ? WHERE platform = ?")
        .bind(count)
        .bind(to_millis(now))
        .bind(platform.as_str())
        .execute(db)
        .await?;

    Ok(())
}

/// Close the trigger window at `at` and reset the count
///
/// Upserts so a forced cycle on a platform never evaluated before still
/// leaves a state row behind.
pub async fn advance(db: &Pool<Sqlite>, platform: Platform, at: DateTime<Utc>) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO trigger_state (platform, last_trigger_at, new_qualifying_count, updated_at)
        VALUES (?, ?, 0, ?)
        ON CONFLICT(platform) DO UPDATE SET
            last_trigger_at = excluded.last_trigger_at,
            new_qualifying_count = 0,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(platform.as_str())
    .bind(to_millis(at))
    .bind(to_millis(at))
    .execute(db)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{setup_test_db, ts};

    #[tokio::test]
    async fn test_lazy_creation_keeps_first_value() {
        let pool = setup_test_db().await;
        let now = ts(2026, 10, 17, 12);

        assert!(get_state(&pool, Platform::YouTube).await.unwrap().is_none());

        let first = get_or_create(&pool, Platform::YouTube, ts(2026, 9, 17, 12), now)
            .await
            .unwrap();
        assert_eq!(first.last_trigger_at, ts(2026, 9, 17, 12));
        assert_eq!(first.new_qualifying_count, 0);

        let second = get_or_create(&pool, Platform::YouTube, ts(2026, 10, 1, 0), now)
            .await
            .unwrap();
        assert_eq!(second.last_trigger_at, ts(2026, 9, 17, 12));
    }

    #[tokio::test]
    async fn test_advance_resets_count() {
        let pool = setup_test_db().await;
        let now = ts(2026, 10, 17, 12);

        get_or_create(&pool, Platform::Instagram, ts(2026, 9, 17, 12), now)
            .await
            .unwrap();
        record_count(&pool, Platform::Instagram, 7, now).await.unwrap();
        assert_eq!(
            get_state(&pool, Platform::Instagram).await.unwrap().unwrap().new_qualifying_count,
            7
        );

        advance(&pool, Platform::Instagram, now).await.unwrap();
        let state = get_state(&pool, Platform::Instagram).await.unwrap().unwrap();
        assert_eq!(state.last_trigger_at, now);
        assert_eq!(state.new_qualifying_count, 0);
    }

    #[tokio::test]
    async fn test_advance_creates_missing_state() {
        let pool = setup_test_db().await;
        let now = ts(2026, 10, 17, 12);
        advance(&pool, Platform::YouTube, now).await.unwrap();
        assert_eq!(
            get_state(&pool, Platform::YouTube).await.unwrap().unwrap().last_trigger_at,
            now
        );
    }
}
