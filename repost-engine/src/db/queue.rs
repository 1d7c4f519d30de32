//! Repost queue database access
//!
//! Every status change is a conditional UPDATE on the expected current
//! status, so concurrent workers resolve races in SQLite instead of in
//! application locks.

use crate::error::Result;
use chrono::{DateTime, Utc};
use repost_common::db::models::RepostQueueRow;
use repost_common::time::to_millis;
use repost_common::{Platform, QueueStatus, RepostQueueEntry};
use sqlx::{Pool, Sqlite, SqliteConnection};
use uuid::Uuid;

const QUEUE_COLUMNS: &str = "id, source_content_item_id, target_platform, status, priority, \
     scheduled_for, created_at, generated_caption, error_message";

fn decode(rows: Vec<RepostQueueRow>) -> Result<Vec<RepostQueueEntry>> {
    rows.into_iter()
        .map(|row| RepostQueueEntry::try_from(row).map_err(Into::into))
        .collect()
}

/// Persist a freshly allocated entry
pub async fn insert_entry(db: &Pool<Sqlite>, entry: &RepostQueueEntry) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO repost_queue (
            id, source_content_item_id, target_platform, status, priority,
            scheduled_for, created_at, generated_caption, error_message
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(entry.id.to_string())
    .bind(entry.source_content_item_id.to_string())
    .bind(entry.target_platform.as_str())
    .bind(entry.status.as_str())
    .bind(entry.priority)
    .bind(to_millis(entry.scheduled_for))
    .bind(to_millis(entry.created_at))
    .bind(&entry.generated_caption)
    .bind(&entry.error_message)
    .execute(db)
    .await?;

    Ok(())
}

pub async fn get_entry(db: &Pool<Sqlite>, id: Uuid) -> Result<Option<RepostQueueEntry>> {
    let sql = format!("SELECT {} FROM repost_queue WHERE id = ?", QUEUE_COLUMNS);
    let row: Option<RepostQueueRow> = sqlx::query_as(&sql)
        .bind(id.to_string())
        .fetch_optional(db)
        .await?;

    row.map(|r| RepostQueueEntry::try_from(r).map_err(Into::into))
        .transpose()
}

/// Current status of an entry, read on the caller's connection
pub async fn status_of(conn: &mut SqliteConnection, id: Uuid) -> Result<Option<QueueStatus>> {
    let status: Option<String> = sqlx::query_scalar("SELECT status FROM repost_queue WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(conn)
        .await?;

    status
        .map(|s| s.parse::<QueueStatus>().map_err(Into::into))
        .transpose()
}

/// Instants already taken for a platform at or after `from`, in any status
///
/// The slot uniqueness index spans every status, so completed and failed
/// entries still occupy their instant.
pub async fn occupied_slots(
    db: &Pool<Sqlite>,
    platform: Platform,
    from: DateTime<Utc>,
) -> Result<Vec<DateTime<Utc>>> {
    let millis: Vec<i64> = sqlx::query_scalar(
        r#"
        SELECT scheduled_for FROM repost_queue
        WHERE target_platform = ? AND scheduled_for >= ?
        ORDER BY scheduled_for
        "#,
    )
    .bind(platform.as_str())
    .bind(to_millis(from))
    .fetch_all(db)
    .await?;

    Ok(millis.into_iter().map(repost_common::time::from_millis).collect())
}

/// `queued -> processing` for one entry; returns false if it was not queued
pub async fn claim(db: &Pool<Sqlite>, id: Uuid, now: DateTime<Utc>) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE repost_queue SET status = 'processing', claimed_at = ? WHERE id = ? AND status = 'queued'",
    )
    .bind(to_millis(now))
    .bind(id.to_string())
    .execute(db)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Claim the earliest due entry of a platform, if any
///
/// Highest priority first among entries due at the same instant.
pub async fn claim_next_due(
    db: &Pool<Sqlite>,
    platform: Platform,
    now: DateTime<Utc>,
) -> Result<Option<RepostQueueEntry>> {
    let sql = format!(
        r#"
        UPDATE repost_queue
        SET status = 'processing', claimed_at = ?
        WHERE status = 'queued'
          AND id = (
              SELECT id FROM repost_queue
              WHERE target_platform = ? AND status = 'queued' AND scheduled_for <= ?
              ORDER BY scheduled_for ASC, priority DESC, id ASC
              LIMIT 1
          )
        RETURNING {}
        "#,
        QUEUE_COLUMNS
    );

    let row: Option<RepostQueueRow> = sqlx::query_as(&sql)
        .bind(to_millis(now))
        .bind(platform.as_str())
        .bind(to_millis(now))
        .fetch_optional(db)
        .await?;

    row.map(|r| RepostQueueEntry::try_from(r).map_err(Into::into))
        .transpose()
}

/// `processing -> completed`, returning the source item id when the
/// transition applied
pub async fn mark_completed(
    conn: &mut SqliteConnection,
    id: Uuid,
    now: DateTime<Utc>,
) -> Result<Option<Uuid>> {
    let source: Option<String> = sqlx::query_scalar(
        r#"
        UPDATE repost_queue
        SET status = 'completed', completed_at = ?, error_message = NULL
        WHERE id = ? AND status = 'processing'
        RETURNING source_content_item_id
        "#,
    )
    .bind(to_millis(now))
    .bind(id.to_string())
    .fetch_optional(conn)
    .await?;

    source
        .map(|s| {
            Uuid::parse_str(&s).map_err(|e| {
                crate::error::Error::Internal(format!(
                    "Invalid source_content_item_id on entry {}: {}",
                    id, e
                ))
            })
        })
        .transpose()
}

/// `processing -> failed` with the publisher's message
pub async fn mark_failed(
    db: &Pool<Sqlite>,
    id: Uuid,
    error_message: &str,
    now: DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE repost_queue
        SET status = 'failed', completed_at = ?, error_message = ?
        WHERE id = ? AND status = 'processing'
        "#,
    )
    .bind(to_millis(now))
    .bind(error_message)
    .bind(id.to_string())
    .execute(db)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Entry count per status for one platform (statuses with zero rows omitted)
pub async fn count_by_status(
    db: &Pool<Sqlite>,
    platform: Platform,
) -> Result<Vec<(QueueStatus, i64)>> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        r#"
        SELECT status, COUNT(*) FROM repost_queue
        WHERE target_platform = ?
        GROUP BY status
        "#,
    )
    .bind(platform.as_str())
    .fetch_all(db)
    .await?;

    rows.into_iter()
        .map(|(status, count)| Ok((status.parse::<QueueStatus>()?, count)))
        .collect()
}

/// Earliest `scheduled_for` among queued entries
pub async fn next_due(db: &Pool<Sqlite>, platform: Platform) -> Result<Option<DateTime<Utc>>> {
    let millis: Option<i64> = sqlx::query_scalar(
        "SELECT MIN(scheduled_for) FROM repost_queue WHERE target_platform = ? AND status = 'queued'",
    )
    .bind(platform.as_str())
    .fetch_one(db)
    .await?;

    Ok(millis.map(repost_common::time::from_millis))
}

/// Most recently failed entry of a platform
pub async fn last_failed(db: &Pool<Sqlite>, platform: Platform) -> Result<Option<RepostQueueEntry>> {
    let sql = format!(
        r#"
        SELECT {} FROM repost_queue
        WHERE target_platform = ? AND status = 'failed'
        ORDER BY completed_at DESC, created_at DESC
        LIMIT 1
        "#,
        QUEUE_COLUMNS
    );

    let row: Option<RepostQueueRow> = sqlx::query_as(&sql)
        .bind(platform.as_str())
        .fetch_optional(db)
        .await?;

    row.map(|r| RepostQueueEntry::try_from(r).map_err(Into::into))
        .transpose()
}

/// Entries of a platform in schedule order, optionally filtered by status
pub async fn list_entries(
    db: &Pool<Sqlite>,
    platform: Platform,
    status: Option<QueueStatus>,
) -> Result<Vec<RepostQueueEntry>> {
    let sql = format!(
        r#"
        SELECT {} FROM repost_queue
        WHERE target_platform = ? AND (? IS NULL OR status = ?)
        ORDER BY scheduled_for ASC
        "#,
        QUEUE_COLUMNS
    );

    let status = status.map(|s| s.as_str());
    let rows: Vec<RepostQueueRow> = sqlx::query_as(&sql)
        .bind(platform.as_str())
        .bind(status)
        .bind(status)
        .fetch_all(db)
        .await?;

    decode(rows)
}

/// Delete every entry not currently held by a worker
pub async fn clear(db: &Pool<Sqlite>) -> Result<u64> {
    let result = sqlx::query("DELETE FROM repost_queue WHERE status != 'processing'")
        .execute(db)
        .await?;

    Ok(result.rows_affected())
}
