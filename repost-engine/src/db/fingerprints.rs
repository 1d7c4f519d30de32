//! Fingerprint store database access
//!
//! Fingerprint rows are immutable: the content hash is the primary key and a
//! second insert of the same hash is ignored.

use crate::error::Result;
use chrono::{DateTime, Utc};
use repost_common::time::to_millis;
use repost_common::Fingerprint;
use sqlx::{Pool, Sqlite};
use uuid::Uuid;

/// Stored fingerprint with the catalog item it identifies
#[derive(Debug, Clone, PartialEq)]
pub struct StoredFingerprint {
    pub fingerprint: Fingerprint,
    pub content_item_id: Uuid,
}

#[derive(Debug, sqlx::FromRow)]
struct FingerprintRow {
    content_hash: String,
    content_item_id: String,
    byte_size: i64,
    duration_seconds: Option<f64>,
}

impl TryFrom<FingerprintRow> for StoredFingerprint {
    type Error = crate::error::Error;

    fn try_from(row: FingerprintRow) -> Result<Self> {
        let content_item_id = Uuid::parse_str(&row.content_item_id).map_err(|e| {
            crate::error::Error::Internal(format!(
                "Invalid content_item_id for fingerprint {}: {}",
                row.content_hash, e
            ))
        })?;

        Ok(StoredFingerprint {
            fingerprint: Fingerprint::new(row.content_hash, row.byte_size, row.duration_seconds),
            content_item_id,
        })
    }
}

/// Store a fingerprint for an item and link the item to it
///
/// Returns `false` when the hash was already stored (the existing row wins).
/// The item link is only set if the item has none yet.
pub async fn attach_fingerprint(
    db: &Pool<Sqlite>,
    content_item_id: Uuid,
    fingerprint: &Fingerprint,
    now: DateTime<Utc>,
) -> Result<bool> {
    let mut tx = db.begin().await?;

    let inserted = sqlx::query(
        r#"
        INSERT OR IGNORE INTO fingerprints
            (content_hash, content_item_id, byte_size, duration_seconds, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&fingerprint.content_hash)
    .bind(content_item_id.to_string())
    .bind(fingerprint.byte_size)
    .bind(fingerprint.duration_seconds)
    .bind(to_millis(now))
    .execute(&mut *tx)
    .await?
    .rows_affected()
        > 0;

    sqlx::query(
        r#"
        UPDATE content_items
        SET fingerprint_hash = ?, updated_at = ?
        WHERE id = ? AND fingerprint_hash IS NULL
        "#,
    )
    .bind(&fingerprint.content_hash)
    .bind(to_millis(now))
    .bind(content_item_id.to_string())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(inserted)
}

/// Exact identity lookup
pub async fn find_by_hash(db: &Pool<Sqlite>, content_hash: &str) -> Result<Option<StoredFingerprint>> {
    let row: Option<FingerprintRow> = sqlx::query_as(
        r#"
        SELECT content_hash, content_item_id, byte_size, duration_seconds
        FROM fingerprints
        WHERE content_hash = ?
        "#,
    )
    .bind(content_hash)
    .fetch_optional(db)
    .await?;

    row.map(StoredFingerprint::try_from).transpose()
}

/// Fingerprints whose size falls in `size_range`, or whose duration falls in
/// `duration_range` when one is given
///
/// Closest sizes first, at most `cap` rows.
pub async fn find_similar(
    db: &Pool<Sqlite>,
    target_size: i64,
    size_range: (i64, i64),
    duration_range: Option<(f64, f64)>,
    cap: i64,
) -> Result<Vec<StoredFingerprint>> {
    let (dur_low, dur_high) = match duration_range {
        Some((low, high)) => (Some(low), Some(high)),
        None => (None, None),
    };

    let rows: Vec<FingerprintRow> = sqlx::query_as(
        r#"
        SELECT content_hash, content_item_id, byte_size, duration_seconds
        FROM fingerprints
        WHERE byte_size BETWEEN ? AND ?
           OR (? IS NOT NULL
               AND duration_seconds IS NOT NULL
               AND duration_seconds BETWEEN ? AND ?)
        ORDER BY ABS(byte_size - ?) ASC, content_hash ASC
        LIMIT ?
        "#,
    )
    .bind(size_range.0)
    .bind(size_range.1)
    .bind(dur_low)
    .bind(dur_low)
    .bind(dur_high)
    .bind(target_size)
    .bind(cap.max(0))
    .fetch_all(db)
    .await?;

    rows.into_iter().map(StoredFingerprint::try_from).collect()
}
