//! Publication worker
//!
//! Drains due queue entries for a platform through a `Publisher`. Several
//! workers may drain the same platform at once; the queue's atomic claim
//! guarantees each entry is handed to exactly one of them.

use crate::db::content_items::get_item;
use crate::error::Result;
use crate::services::collaborators::Publisher;
use crate::services::repost_queue::RepostQueue;
use chrono::{DateTime, Utc};
use repost_common::events::{EventBus, RepostEvent};
use repost_common::{Platform, RepostQueueEntry};
use sqlx::{Pool, Sqlite};
use std::sync::Arc;

/// Counts from one `drain_due` pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub claimed: usize,
    pub completed: usize,
    pub failed: usize,
}

pub struct PublicationWorker {
    db: Pool<Sqlite>,
    queue: RepostQueue,
    publisher: Arc<dyn Publisher>,
    events: EventBus,
}

impl PublicationWorker {
    pub fn new(
        db: Pool<Sqlite>,
        queue: RepostQueue,
        publisher: Arc<dyn Publisher>,
        events: EventBus,
    ) -> Self {
        Self {
            db,
            queue,
            publisher,
            events,
        }
    }

    /// Claim and publish every entry of `platform` due at `now`
    ///
    /// Publisher errors mark the entry failed and the drain continues; only
    /// queue storage errors abort it.
    pub async fn drain_due(&self, platform: Platform, now: DateTime<Utc>) -> Result<DrainReport> {
        let mut report = DrainReport::default();

        while let Some(entry) = self.queue.claim_next_due(platform, now).await? {
            report.claimed += 1;
            self.events.emit_lossy(RepostEvent::EntryClaimed {
                entry_id: entry.id,
                platform,
                timestamp: now,
            });

            match self.publish_one(&entry).await {
                Ok(()) => {
                    self.queue.complete(entry.id, now).await?;
                    report.completed += 1;
                    self.events.emit_lossy(RepostEvent::EntryCompleted {
                        entry_id: entry.id,
                        content_item_id: entry.source_content_item_id,
                        platform,
                        timestamp: now,
                    });
                }
                Err(e) => {
                    let message = e.to_string();
                    self.queue.fail(entry.id, &message, now).await?;
                    report.failed += 1;
                    self.events.emit_lossy(RepostEvent::EntryFailed {
                        entry_id: entry.id,
                        platform,
                        error: message,
                        timestamp: now,
                    });
                }
            }
        }

        if report.claimed > 0 {
            tracing::info!(
                platform = %platform,
                claimed = report.claimed,
                completed = report.completed,
                failed = report.failed,
                "Drained due reposts"
            );
        }

        Ok(report)
    }

    async fn publish_one(&self, entry: &RepostQueueEntry) -> Result<()> {
        let item = get_item(&self.db, entry.source_content_item_id)
            .await?
            .ok_or_else(|| {
                crate::error::Error::NotFound(format!(
                    "Source item {}",
                    entry.source_content_item_id
                ))
            })?;

        self.publisher.publish(entry, &item).await
    }
}
