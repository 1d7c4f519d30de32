//! Repost Queue
//!
//! Durable work list of allocated repost jobs.
//!
//! **State machine:** `queued -> processing -> {completed, failed}`
//! - Claims are conditional updates; losing a race is `ClaimOutcome::NotQueued`
//! - Completion marks the source item reposted in the same transaction
//! - Failure records the message and leaves the source item untouched
//! - Nothing leaves `failed`; a later cycle selects the item again if it is
//!   still eligible
//!
//! Writes that can meet concurrent workers are retried on SQLite lock
//! contention.

use crate::db::{content_items, queue};
use crate::error::{Error, Result};
use crate::types::ClaimOutcome;
use crate::utils::retry_on_lock;
use chrono::{DateTime, Utc};
use repost_common::{Platform, QueueStatus, RepostQueueEntry};
use sqlx::{Pool, Sqlite};
use uuid::Uuid;

fn transition_error(id: Uuid, current: Option<QueueStatus>, to: QueueStatus) -> Error {
    match current {
        Some(from) => Error::InvalidTransition {
            entry_id: id,
            from,
            to,
        },
        None => Error::NotFound(format!("Queue entry {}", id)),
    }
}

#[derive(Clone)]
pub struct RepostQueue {
    db: Pool<Sqlite>,
    max_lock_wait_ms: u64,
}

impl RepostQueue {
    pub fn new(db: Pool<Sqlite>, max_lock_wait_ms: u64) -> Self {
        Self {
            db,
            max_lock_wait_ms,
        }
    }

    /// Persist one allocated entry
    pub async fn enqueue(&self, entry: &RepostQueueEntry) -> Result<()> {
        retry_on_lock("enqueue", self.max_lock_wait_ms, || {
            queue::insert_entry(&self.db, entry)
        })
        .await?;

        tracing::debug!(
            entry_id = %entry.id,
            platform = %entry.target_platform,
            scheduled_for = %entry.scheduled_for,
            "Queued repost"
        );
        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<RepostQueueEntry>> {
        queue::get_entry(&self.db, id).await
    }

    /// Instants already used on a platform from `from` onward
    pub async fn occupied_slots(
        &self,
        platform: Platform,
        from: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>> {
        queue::occupied_slots(&self.db, platform, from).await
    }

    /// Exclusive `queued -> processing` claim of a specific entry
    pub async fn claim(&self, id: Uuid, now: DateTime<Utc>) -> Result<ClaimOutcome> {
        let won = retry_on_lock("claim", self.max_lock_wait_ms, || {
            queue::claim(&self.db, id, now)
        })
        .await?;

        if !won {
            tracing::debug!(entry_id = %id, "Claim lost: entry not queued");
            return Ok(ClaimOutcome::NotQueued);
        }

        match queue::get_entry(&self.db, id).await? {
            Some(entry) => Ok(ClaimOutcome::Claimed(entry)),
            None => Err(Error::NotFound(format!("Queue entry {} vanished after claim", id))),
        }
    }

    /// Claim the earliest due entry of a platform
    pub async fn claim_next_due(
        &self,
        platform: Platform,
        now: DateTime<Utc>,
    ) -> Result<Option<RepostQueueEntry>> {
        retry_on_lock("claim_next_due", self.max_lock_wait_ms, || {
            queue::claim_next_due(&self.db, platform, now)
        })
        .await
    }

    /// `processing -> completed`; marks the source item reposted atomically
    pub async fn complete(&self, id: Uuid, now: DateTime<Utc>) -> Result<()> {
        retry_on_lock("complete", self.max_lock_wait_ms, || self.complete_once(id, now)).await
    }

    async fn complete_once(&self, id: Uuid, now: DateTime<Utc>) -> Result<()> {
        let mut tx = self.db.begin().await?;

        let Some(source_id) = queue::mark_completed(&mut *tx, id, now).await? else {
            let current = queue::status_of(&mut *tx, id).await?;
            tx.rollback().await?;
            return Err(transition_error(id, current, QueueStatus::Completed));
        };

        if !content_items::mark_reposted(&mut *tx, source_id, now).await? {
            tx.rollback().await?;
            return Err(Error::NotFound(format!(
                "Source item {} of entry {} not found",
                source_id, id
            )));
        }

        tx.commit().await?;

        tracing::info!(entry_id = %id, content_item_id = %source_id, "Repost completed");
        Ok(())
    }

    /// `processing -> failed` with the publisher's error message
    pub async fn fail(&self, id: Uuid, error_message: &str, now: DateTime<Utc>) -> Result<()> {
        let applied = retry_on_lock("fail", self.max_lock_wait_ms, || {
            queue::mark_failed(&self.db, id, error_message, now)
        })
        .await?;

        if !applied {
            let mut conn = self.db.acquire().await?;
            let current = queue::status_of(&mut *conn, id).await?;
            return Err(transition_error(id, current, QueueStatus::Failed));
        }

        tracing::warn!(entry_id = %id, error = error_message, "Repost failed");
        Ok(())
    }

    pub async fn count_by_status(&self, platform: Platform) -> Result<Vec<(QueueStatus, i64)>> {
        queue::count_by_status(&self.db, platform).await
    }

    pub async fn next_due(&self, platform: Platform) -> Result<Option<DateTime<Utc>>> {
        queue::next_due(&self.db, platform).await
    }

    pub async fn last_failed(&self, platform: Platform) -> Result<Option<RepostQueueEntry>> {
        queue::last_failed(&self.db, platform).await
    }

    pub async fn list(
        &self,
        platform: Platform,
        status: Option<QueueStatus>,
    ) -> Result<Vec<RepostQueueEntry>> {
        queue::list_entries(&self.db, platform, status).await
    }

    /// Remove every entry not currently being processed
    pub async fn clear(&self) -> Result<u64> {
        let removed = queue::clear(&self.db).await?;
        tracing::info!(removed, "Repost queue cleared");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::content_items::{get_item, upsert_item};
    use crate::test_support::{item, setup_test_db, ts};

    async fn queued_entry(pool: &Pool<Sqlite>, at: DateTime<Utc>) -> RepostQueueEntry {
        let now = ts(2026, 10, 17, 0);
        let source = upsert_item(
            pool,
            &item(Platform::YouTube, &format!("src-{}", at.timestamp()), 90.0, ts(2026, 6, 1, 0)),
            now,
        )
        .await
        .unwrap();

        let entry = RepostQueueEntry {
            id: Uuid::new_v4(),
            source_content_item_id: source.id,
            target_platform: Platform::YouTube,
            status: QueueStatus::Queued,
            priority: 90,
            scheduled_for: at,
            created_at: now,
            generated_caption: Some("caption".to_string()),
            error_message: None,
        };
        RepostQueue::new(pool.clone(), 1000).enqueue(&entry).await.unwrap();
        entry
    }

    #[tokio::test]
    async fn test_claim_is_exclusive() {
        let pool = setup_test_db().await;
        let q = RepostQueue::new(pool.clone(), 1000);
        let entry = queued_entry(&pool, ts(2026, 10, 17, 9)).await;
        let now = ts(2026, 10, 17, 10);

        let first = q.claim(entry.id, now).await.unwrap();
        assert!(first.is_claimed());
        if let ClaimOutcome::Claimed(claimed) = first {
            assert_eq!(claimed.status, QueueStatus::Processing);
        }

        assert_eq!(q.claim(entry.id, now).await.unwrap(), ClaimOutcome::NotQueued);
        assert_eq!(q.claim(Uuid::new_v4(), now).await.unwrap(), ClaimOutcome::NotQueued);
    }

    #[tokio::test]
    async fn test_complete_marks_source_reposted() {
        let pool = setup_test_db().await;
        let q = RepostQueue::new(pool.clone(), 1000);
        let entry = queued_entry(&pool, ts(2026, 10, 17, 9)).await;
        let now = ts(2026, 10, 17, 10);

        q.claim(entry.id, now).await.unwrap();
        q.complete(entry.id, now).await.unwrap();

        let stored = q.get(entry.id).await.unwrap().unwrap();
        assert_eq!(stored.status, QueueStatus::Completed);

        let source = get_item(&pool, entry.source_content_item_id).await.unwrap().unwrap();
        assert!(source.reposted);
        assert_eq!(source.repost_count, 1);
        assert_eq!(source.reposted_at, Some(now));
    }

    #[tokio::test]
    async fn test_fail_leaves_source_untouched() {
        let pool = setup_test_db().await;
        let q = RepostQueue::new(pool.clone(), 1000);
        let entry = queued_entry(&pool, ts(2026, 10, 17, 9)).await;
        let now = ts(2026, 10, 17, 10);

        q.claim(entry.id, now).await.unwrap();
        q.fail(entry.id, "upload rejected", now).await.unwrap();

        let stored = q.get(entry.id).await.unwrap().unwrap();
        assert_eq!(stored.status, QueueStatus::Failed);
        assert_eq!(stored.error_message.as_deref(), Some("upload rejected"));

        let source = get_item(&pool, entry.source_content_item_id).await.unwrap().unwrap();
        assert!(!source.reposted);
        assert_eq!(source.repost_count, 0);

        // Failed is terminal
        assert_eq!(q.claim(entry.id, now).await.unwrap(), ClaimOutcome::NotQueued);
    }

    #[tokio::test]
    async fn test_invalid_transitions() {
        let pool = setup_test_db().await;
        let q = RepostQueue::new(pool.clone(), 1000);
        let entry = queued_entry(&pool, ts(2026, 10, 17, 9)).await;
        let now = ts(2026, 10, 17, 10);

        // Not claimed yet
        match q.complete(entry.id, now).await {
            Err(Error::InvalidTransition { from, to, .. }) => {
                assert_eq!(from, QueueStatus::Queued);
                assert_eq!(to, QueueStatus::Completed);
            }
            other => panic!("expected InvalidTransition, got {:?}", other),
        }

        q.claim(entry.id, now).await.unwrap();
        q.complete(entry.id, now).await.unwrap();

        assert!(matches!(
            q.fail(entry.id, "late", now).await,
            Err(Error::InvalidTransition {
                from: QueueStatus::Completed,
                ..
            })
        ));
        assert!(matches!(
            q.complete(Uuid::new_v4(), now).await,
            Err(Error::NotFound(_))
        ));

        // Completion counted once
        let source = get_item(&pool, entry.source_content_item_id).await.unwrap().unwrap();
        assert_eq!(source.repost_count, 1);
    }

    #[tokio::test]
    async fn test_claim_next_due_respects_schedule() {
        let pool = setup_test_db().await;
        let q = RepostQueue::new(pool.clone(), 1000);
        let early = queued_entry(&pool, ts(2026, 10, 17, 9)).await;
        let late = queued_entry(&pool, ts(2026, 10, 17, 15)).await;

        let now = ts(2026, 10, 17, 10);
        let claimed = q.claim_next_due(Platform::YouTube, now).await.unwrap().unwrap();
        assert_eq!(claimed.id, early.id);
        assert_eq!(claimed.status, QueueStatus::Processing);

        assert!(q.claim_next_due(Platform::YouTube, now).await.unwrap().is_none());
        assert!(q.claim_next_due(Platform::Instagram, ts(2026, 10, 18, 0)).await.unwrap().is_none());

        let claimed = q
            .claim_next_due(Platform::YouTube, ts(2026, 10, 17, 16))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(claimed.id, late.id);
    }

    #[tokio::test]
    async fn test_status_queries_and_clear() {
        let pool = setup_test_db().await;
        let q = RepostQueue::new(pool.clone(), 1000);
        let a = queued_entry(&pool, ts(2026, 10, 17, 9)).await;
        let b = queued_entry(&pool, ts(2026, 10, 17, 12)).await;
        let c = queued_entry(&pool, ts(2026, 10, 17, 15)).await;
        let now = ts(2026, 10, 17, 8);

        q.claim(a.id, now).await.unwrap();
        q.claim(b.id, now).await.unwrap();
        q.fail(b.id, "quota", now).await.unwrap();

        let counts = q.count_by_status(Platform::YouTube).await.unwrap();
        assert!(counts.contains(&(QueueStatus::Processing, 1)));
        assert!(counts.contains(&(QueueStatus::Failed, 1)));
        assert!(counts.contains(&(QueueStatus::Queued, 1)));

        assert_eq!(q.next_due(Platform::YouTube).await.unwrap(), Some(c.scheduled_for));
        assert_eq!(q.last_failed(Platform::YouTube).await.unwrap().unwrap().id, b.id);
        assert_eq!(q.list(Platform::YouTube, None).await.unwrap().len(), 3);
        assert_eq!(
            q.list(Platform::YouTube, Some(QueueStatus::Queued)).await.unwrap()[0].id,
            c.id
        );

        // The processing entry survives
        assert_eq!(q.clear().await.unwrap(), 2);
        let left = q.list(Platform::YouTube, None).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id, a.id);
    }

    #[tokio::test]
    async fn test_duplicate_slot_rejected() {
        let pool = setup_test_db().await;
        let q = RepostQueue::new(pool.clone(), 1000);
        let existing = queued_entry(&pool, ts(2026, 10, 17, 9)).await;

        let mut clash = existing.clone();
        clash.id = Uuid::new_v4();
        assert!(q.enqueue(&clash).await.is_err());
    }
}
