//! Database models
//!
//! Domain types persisted by the repost engine, plus the raw row shapes they
//! are decoded from. Rows keep timestamps as unix milliseconds and enums as
//! text; conversion into the domain types validates both.

use crate::time::from_millis;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Publishing platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    YouTube,
    Instagram,
}

impl Platform {
    pub const ALL: [Platform; 2] = [Platform::YouTube, Platform::Instagram];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::YouTube => "youtube",
            Platform::Instagram => "instagram",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "youtube" | "yt" => Ok(Platform::YouTube),
            "instagram" | "ig" => Ok(Platform::Instagram),
            other => Err(Error::InvalidInput(format!("Unknown platform: {}", other))),
        }
    }
}

/// Publication status reported by ingestion
///
/// Only `Published` and `Live` count toward the trigger threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentStatus {
    Draft,
    Published,
    Live,
    Removed,
}

impl ContentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentStatus::Draft => "draft",
            ContentStatus::Published => "published",
            ContentStatus::Live => "live",
            ContentStatus::Removed => "removed",
        }
    }

    pub fn is_qualifying(&self) -> bool {
        matches!(self, ContentStatus::Published | ContentStatus::Live)
    }
}

impl FromStr for ContentStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "draft" => Ok(ContentStatus::Draft),
            "published" => Ok(ContentStatus::Published),
            "live" => Ok(ContentStatus::Live),
            "removed" => Ok(ContentStatus::Removed),
            other => Err(Error::InvalidInput(format!("Unknown content status: {}", other))),
        }
    }
}

/// Repost queue entry status
///
/// `queued -> processing -> {completed, failed}`; the last two are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl QueueStatus {
    pub const ALL: [QueueStatus; 4] = [
        QueueStatus::Queued,
        QueueStatus::Processing,
        QueueStatus::Completed,
        QueueStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Queued => "queued",
            QueueStatus::Processing => "processing",
            QueueStatus::Completed => "completed",
            QueueStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, QueueStatus::Completed | QueueStatus::Failed)
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "queued" => Ok(QueueStatus::Queued),
            "processing" => Ok(QueueStatus::Processing),
            "completed" => Ok(QueueStatus::Completed),
            "failed" => Ok(QueueStatus::Failed),
            other => Err(Error::InvalidInput(format!("Unknown queue status: {}", other))),
        }
    }
}

/// Content-identity signature of a media item
///
/// `content_hash` is the identity key; size and duration are only used as
/// similarity features when no exact hash exists. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub content_hash: String,
    pub byte_size: i64,
    pub duration_seconds: Option<f64>,
}

impl Fingerprint {
    pub fn new(content_hash: impl Into<String>, byte_size: i64, duration_seconds: Option<f64>) -> Self {
        Self {
            content_hash: content_hash.into(),
            byte_size,
            duration_seconds,
        }
    }

    /// A fingerprint with no usable hash cannot take part in identity matching
    pub fn has_hash(&self) -> bool {
        !self.content_hash.trim().is_empty()
    }
}

/// Catalog row: one published item with its performance and repost state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: Uuid,
    pub platform: Platform,
    pub external_id: String,
    pub caption: Option<String>,
    pub status: ContentStatus,
    pub views: i64,
    pub likes: i64,
    pub comments: i64,
    pub fingerprint: Option<Fingerprint>,
    pub performance_score: f64,
    pub published_at: DateTime<Utc>,
    pub repost_eligible: bool,
    pub reposted: bool,
    pub reposted_at: Option<DateTime<Utc>>,
    pub repost_count: i64,
}

/// Per-platform trigger bookkeeping, owned by the trigger gate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerState {
    pub platform: Platform,
    pub last_trigger_at: DateTime<Utc>,
    pub new_qualifying_count: i64,
}

/// Allocated repost job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepostQueueEntry {
    pub id: Uuid,
    pub source_content_item_id: Uuid,
    pub target_platform: Platform,
    pub status: QueueStatus,
    pub priority: i64,
    pub scheduled_for: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub generated_caption: Option<String>,
    pub error_message: Option<String>,
}

fn parse_uuid(field: &str, value: &str) -> Result<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| Error::InvalidInput(format!("Invalid UUID in {}: {}", field, e)))
}

/// Raw `content_items` row, optionally joined with its fingerprint
#[derive(Debug, sqlx::FromRow)]
pub struct ContentItemRow {
    pub id: String,
    pub platform: String,
    pub external_id: String,
    pub caption: Option<String>,
    pub status: String,
    pub views: i64,
    pub likes: i64,
    pub comments: i64,
    pub performance_score: f64,
    pub published_at: i64,
    pub repost_eligible: bool,
    pub reposted: bool,
    pub reposted_at: Option<i64>,
    pub repost_count: i64,
    pub fingerprint_hash: Option<String>,
    pub fingerprint_byte_size: Option<i64>,
    pub fingerprint_duration_seconds: Option<f64>,
}

impl TryFrom<ContentItemRow> for ContentItem {
    type Error = Error;

    fn try_from(row: ContentItemRow) -> Result<Self> {
        let fingerprint = match (row.fingerprint_hash, row.fingerprint_byte_size) {
            (Some(hash), Some(size)) => Some(Fingerprint::new(
                hash,
                size,
                row.fingerprint_duration_seconds,
            )),
            _ => None,
        };

        Ok(ContentItem {
            id: parse_uuid("content_items.id", &row.id)?,
            platform: row.platform.parse()?,
            external_id: row.external_id,
            caption: row.caption,
            status: row.status.parse()?,
            views: row.views,
            likes: row.likes,
            comments: row.comments,
            fingerprint,
            performance_score: row.performance_score,
            published_at: from_millis(row.published_at),
            repost_eligible: row.repost_eligible,
            reposted: row.reposted,
            reposted_at: row.reposted_at.map(from_millis),
            repost_count: row.repost_count,
        })
    }
}

/// Raw `trigger_state` row
#[derive(Debug, sqlx::FromRow)]
pub struct TriggerStateRow {
    pub platform: String,
    pub last_trigger_at: i64,
    pub new_qualifying_count: i64,
}

impl TryFrom<TriggerStateRow> for TriggerState {
    type Error = Error;

    fn try_from(row: TriggerStateRow) -> Result<Self> {
        Ok(TriggerState {
            platform: row.platform.parse()?,
            last_trigger_at: from_millis(row.last_trigger_at),
            new_qualifying_count: row.new_qualifying_count,
        })
    }
}

/// Raw `repost_queue` row
#[derive(Debug, sqlx::FromRow)]
pub struct RepostQueueRow {
    pub id: String,
    pub source_content_item_id: String,
    pub target_platform: String,
    pub status: String,
    pub priority: i64,
    pub scheduled_for: i64,
    pub created_at: i64,
    pub generated_caption: Option<String>,
    pub error_message: Option<String>,
}

impl TryFrom<RepostQueueRow> for RepostQueueEntry {
    type Error = Error;

    fn try_from(row: RepostQueueRow) -> Result<Self> {
        Ok(RepostQueueEntry {
            id: parse_uuid("repost_queue.id", &row.id)?,
            source_content_item_id: parse_uuid(
                "repost_queue.source_content_item_id",
                &row.source_content_item_id,
            )?,
            target_platform: row.target_platform.parse()?,
            status: row.status.parse()?,
            priority: row.priority,
            scheduled_for: from_millis(row.scheduled_for),
            created_at: from_millis(row.created_at),
            generated_caption: row.generated_caption,
            error_message: row.error_message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_round_trip_and_aliases() {
        for platform in Platform::ALL {
            assert_eq!(platform.as_str().parse::<Platform>().unwrap(), platform);
        }
        assert_eq!("YT".parse::<Platform>().unwrap(), Platform::YouTube);
        assert_eq!(" Instagram ".parse::<Platform>().unwrap(), Platform::Instagram);
        assert!("tiktok".parse::<Platform>().is_err());
    }

    #[test]
    fn test_qualifying_statuses() {
        assert!(ContentStatus::Published.is_qualifying());
        assert!(ContentStatus::Live.is_qualifying());
        assert!(!ContentStatus::Draft.is_qualifying());
        assert!(!ContentStatus::Removed.is_qualifying());
    }

    #[test]
    fn test_terminal_queue_statuses() {
        assert!(!QueueStatus::Queued.is_terminal());
        assert!(!QueueStatus::Processing.is_terminal());
        assert!(QueueStatus::Completed.is_terminal());
        assert!(QueueStatus::Failed.is_terminal());
    }

    #[test]
    fn test_fingerprint_without_hash() {
        assert!(!Fingerprint::new("  ", 10, None).has_hash());
        assert!(Fingerprint::new("abc", 10, None).has_hash());
    }

    #[test]
    fn test_row_with_unknown_platform_is_rejected() {
        let row = TriggerStateRow {
            platform: "myspace".to_string(),
            last_trigger_at: 0,
            new_qualifying_count: 0,
        };
        assert!(TriggerState::try_from(row).is_err());
    }
}
