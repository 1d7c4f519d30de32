//! Content catalog database access
//!
//! The catalog exclusively owns `content_items`. Ingestion writes rows through
//! `upsert_item`; the engine reads them for triggering and selection and flips
//! repost state only through `mark_reposted` (called inside the queue
//! completion transaction). Rows are never deleted.

use crate::error::Result;
use chrono::{DateTime, Utc};
use repost_common::db::models::ContentItemRow;
use repost_common::time::to_millis;
use repost_common::{ContentItem, ContentStatus, Platform};
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite, SqliteConnection};
use uuid::Uuid;

/// Column list shared by every catalog read (joined with the fingerprint store)
const ITEM_SELECT: &str = r#"
    SELECT c.id, c.platform, c.external_id, c.caption, c.status,
           c.views, c.likes, c.comments, c.performance_score, c.published_at,
           c.repost_eligible, c.reposted, c.reposted_at, c.repost_count,
           f.content_hash AS fingerprint_hash,
           f.byte_size AS fingerprint_byte_size,
           f.duration_seconds AS fingerprint_duration_seconds
    FROM content_items c
    LEFT JOIN fingerprints f ON f.content_hash = c.fingerprint_hash
"#;

/// Ingestion payload for one publication
///
/// `performance_score` is computed upstream from the raw counters; the engine
/// never derives it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewContentItem {
    pub platform: Platform,
    pub external_id: String,
    pub caption: Option<String>,
    pub status: ContentStatus,
    pub views: i64,
    pub likes: i64,
    pub comments: i64,
    pub performance_score: f64,
    pub published_at: DateTime<Utc>,
    pub repost_eligible: bool,
}

fn decode(rows: Vec<ContentItemRow>) -> Result<Vec<ContentItem>> {
    rows.into_iter()
        .map(|row| ContentItem::try_from(row).map_err(Into::into))
        .collect()
}

/// Create an item on first ingestion, refresh counters and score afterwards
///
/// A re-scrape never touches eligibility or repost state, and never moves
/// `published_at`.
pub async fn upsert_item(
    db: &Pool<Sqlite>,
    item: &NewContentItem,
    now: DateTime<Utc>,
) -> Result<ContentItem> {
    sqlx::query(
        r#"
        INSERT INTO content_items (
            id, platform, external_id, caption, status, views, likes, comments,
            performance_score, published_at, repost_eligible, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(platform, external_id) DO UPDATE SET
            caption = excluded.caption,
            status = excluded.status,
            views = excluded.views,
            likes = excluded.likes,
            comments = excluded.comments,
            performance_score = excluded.performance_score,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(item.platform.as_str())
    .bind(&item.external_id)
    .bind(&item.caption)
    .bind(item.status.as_str())
    .bind(item.views)
    .bind(item.likes)
    .bind(item.comments)
    .bind(item.performance_score)
    .bind(to_millis(item.published_at))
    .bind(item.repost_eligible)
    .bind(to_millis(now))
    .bind(to_millis(now))
    .execute(db)
    .await?;

    find_by_external_id(db, item.platform, &item.external_id)
        .await?
        .ok_or_else(|| {
            crate::error::Error::Internal(format!(
                "Upserted item {}/{} not readable",
                item.platform, item.external_id
            ))
        })
}

/// Load one item by id
pub async fn get_item(db: &Pool<Sqlite>, id: Uuid) -> Result<Option<ContentItem>> {
    let sql = format!("{} WHERE c.id = ?", ITEM_SELECT);
    let row: Option<ContentItemRow> = sqlx::query_as(&sql)
        .bind(id.to_string())
        .fetch_optional(db)
        .await?;

    row.map(|r| ContentItem::try_from(r).map_err(Into::into))
        .transpose()
}

/// Load one item by its platform-side identifier
pub async fn find_by_external_id(
    db: &Pool<Sqlite>,
    platform: Platform,
    external_id: &str,
) -> Result<Option<ContentItem>> {
    let sql = format!("{} WHERE c.platform = ? AND c.external_id = ?", ITEM_SELECT);
    let row: Option<ContentItemRow> = sqlx::query_as(&sql)
        .bind(platform.as_str())
        .bind(external_id)
        .fetch_optional(db)
        .await?;

    row.map(|r| ContentItem::try_from(r).map_err(Into::into))
        .transpose()
}

/// Manually flip repost eligibility; returns false if the item does not exist
pub async fn set_repost_eligible(
    db: &Pool<Sqlite>,
    id: Uuid,
    eligible: bool,
    now: DateTime<Utc>,
) -> Result<bool> {
    let result =
        sqlx::query("UPDATE content_items SET repost_eligible = ?, updated_at = ? WHERE id = ?")
            .bind(eligible)
            .bind(to_millis(now))
            .bind(id.to_string())
            .execute(db)
            .await?;

    Ok(result.rows_affected() > 0)
}

/// Count published/live items for a platform published strictly after `since`
pub async fn count_qualifying_since(
    db: &Pool<Sqlite>,
    platform: Platform,
    since: DateTime<Utc>,
) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM content_items
        WHERE platform = ?
          AND status IN ('published', 'live')
          AND published_at > ?
        "#,
    )
    .bind(platform.as_str())
    .bind(to_millis(since))
    .fetch_one(db)
    .await?;

    Ok(count)
}

/// Fetch repost candidates, evaluated fresh on every call
///
/// Filter: eligible, not yet reposted, score >= `min_score`, published at or
/// before `published_before`, and no queued or processing repost entry
/// already pending for the item. Order: score descending, older first, then id
/// so the output is stable for an unchanged catalog.
pub async fn select_eligible(
    db: &Pool<Sqlite>,
    platform: Platform,
    min_score: f64,
    published_before: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<ContentItem>> {
    let sql = format!(
        r#"{}
        WHERE c.platform = ?
          AND c.repost_eligible = 1
          AND c.reposted = 0
          AND c.performance_score >= ?
          AND c.published_at <= ?
          AND NOT EXISTS (
              SELECT 1 FROM repost_queue q
              WHERE q.source_content_item_id = c.id
                AND q.status IN ('queued', 'processing')
          )
        ORDER BY c.performance_score DESC, c.published_at ASC, c.id ASC
        LIMIT ?
        "#,
        ITEM_SELECT
    );

    let rows: Vec<ContentItemRow> = sqlx::query_as(&sql)
        .bind(platform.as_str())
        .bind(min_score)
        .bind(to_millis(published_before))
        .bind(limit.max(0))
        .fetch_all(db)
        .await?;

    decode(rows)
}

/// Record a completed repost on the source item
///
/// Runs on the caller's connection so it commits atomically with the queue
/// transition.
pub async fn mark_reposted(
    conn: &mut SqliteConnection,
    id: Uuid,
    now: DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE content_items
        SET reposted = 1, reposted_at = ?, repost_count = repost_count + 1, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(to_millis(now))
    .bind(to_millis(now))
    .bind(id.to_string())
    .execute(conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{item, setup_test_db, ts};

    #[tokio::test]
    async fn test_upsert_creates_then_refreshes() {
        let pool = setup_test_db().await;
        let now = ts(2026, 10, 1, 12);

        let mut new = item(Platform::YouTube, "vid-1", 50.0, ts(2026, 8, 1, 12));
        let created = upsert_item(&pool, &new, now).await.unwrap();
        assert_eq!(created.performance_score, 50.0);
        assert!(created.repost_eligible);
        assert!(!created.reposted);

        new.performance_score = 88.0;
        new.views = 1200;
        new.published_at = ts(2026, 9, 1, 12);
        let refreshed = upsert_item(&pool, &new, now).await.unwrap();

        assert_eq!(refreshed.id, created.id);
        assert_eq!(refreshed.performance_score, 88.0);
        assert_eq!(refreshed.views, 1200);
        // published_at is fixed at first ingestion
        assert_eq!(refreshed.published_at, ts(2026, 8, 1, 12));
    }

    #[tokio::test]
    async fn test_upsert_keeps_manual_eligibility_flip() {
        let pool = setup_test_db().await;
        let now = ts(2026, 10, 1, 12);
        let new = item(Platform::Instagram, "post-1", 90.0, ts(2026, 8, 1, 12));

        let created = upsert_item(&pool, &new, now).await.unwrap();
        assert!(set_repost_eligible(&pool, created.id, false, now).await.unwrap());

        let refreshed = upsert_item(&pool, &new, now).await.unwrap();
        assert!(!refreshed.repost_eligible);
    }

    #[tokio::test]
    async fn test_set_eligible_unknown_item() {
        let pool = setup_test_db().await;
        let flipped = set_repost_eligible(&pool, Uuid::new_v4(), false, ts(2026, 10, 1, 12))
            .await
            .unwrap();
        assert!(!flipped);
    }

    #[tokio::test]
    async fn test_count_qualifying_since_ignores_drafts_and_old_items() {
        let pool = setup_test_db().await;
        let now = ts(2026, 10, 17, 12);
        let since = ts(2026, 10, 1, 0);

        upsert_item(&pool, &item(Platform::YouTube, "old", 10.0, ts(2026, 9, 30, 0)), now)
            .await
            .unwrap();
        upsert_item(&pool, &item(Platform::YouTube, "new", 10.0, ts(2026, 10, 2, 0)), now)
            .await
            .unwrap();
        let mut live = item(Platform::YouTube, "live", 10.0, ts(2026, 10, 3, 0));
        live.status = ContentStatus::Live;
        upsert_item(&pool, &live, now).await.unwrap();
        let mut draft = item(Platform::YouTube, "draft", 10.0, ts(2026, 10, 4, 0));
        draft.status = ContentStatus::Draft;
        upsert_item(&pool, &draft, now).await.unwrap();
        upsert_item(&pool, &item(Platform::Instagram, "other", 10.0, ts(2026, 10, 5, 0)), now)
            .await
            .unwrap();

        let count = count_qualifying_since(&pool, Platform::YouTube, since).await.unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn test_mark_reposted_increments_count() {
        let pool = setup_test_db().await;
        let now = ts(2026, 10, 17, 12);
        let created = upsert_item(&pool, &item(Platform::YouTube, "v", 90.0, ts(2026, 1, 1, 0)), now)
            .await
            .unwrap();

        let mut conn = pool.acquire().await.unwrap();
        assert!(mark_reposted(&mut conn, created.id, now).await.unwrap());
        drop(conn);

        let after = get_item(&pool, created.id).await.unwrap().unwrap();
        assert!(after.reposted);
        assert_eq!(after.reposted_at, Some(now));
        assert_eq!(after.repost_count, 1);
    }

    #[tokio::test]
    async fn test_select_skips_items_with_pending_entries() {
        use repost_common::{QueueStatus, RepostQueueEntry};

        let pool = setup_test_db().await;
        let now = ts(2026, 10, 17, 12);
        let pending = upsert_item(&pool, &item(Platform::YouTube, "pending", 95.0, ts(2026, 1, 1, 0)), now)
            .await
            .unwrap();
        let failed = upsert_item(&pool, &item(Platform::YouTube, "failed", 85.0, ts(2026, 1, 1, 0)), now)
            .await
            .unwrap();

        for (source, status, hour) in [(&pending, QueueStatus::Queued, 9), (&failed, QueueStatus::Failed, 12)] {
            crate::db::queue::insert_entry(
                &pool,
                &RepostQueueEntry {
                    id: Uuid::new_v4(),
                    source_content_item_id: source.id,
                    target_platform: Platform::YouTube,
                    status,
                    priority: 90,
                    scheduled_for: ts(2026, 10, 18, hour),
                    created_at: now,
                    generated_caption: None,
                    error_message: None,
                },
            )
            .await
            .unwrap();
        }

        let selected = select_eligible(&pool, Platform::YouTube, 70.0, now, 10).await.unwrap();
        let ids: Vec<_> = selected.iter().map(|i| i.external_id.as_str()).collect();
        assert_eq!(ids, vec!["failed"]);
    }
}
