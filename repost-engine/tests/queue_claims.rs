//! Concurrent drain of a file-backed repost queue

use chrono::{DateTime, Duration, TimeZone, Utc};
use repost_common::db::init_database;
use repost_common::{ContentStatus, Platform, QueueStatus, RepostQueueEntry};
use repost_engine::db::content_items::{upsert_item, NewContentItem};
use repost_engine::{ClaimOutcome, RepostQueue};
use std::collections::HashSet;
use uuid::Uuid;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 17, 12, 0, 0).unwrap()
}

async fn seed_entries(pool: &sqlx::SqlitePool, queue: &RepostQueue, n: usize) -> Vec<Uuid> {
    let mut ids = Vec::with_capacity(n);
    for i in 0..n {
        let source = upsert_item(
            pool,
            &NewContentItem {
                platform: Platform::Instagram,
                external_id: format!("reel-{}", i),
                caption: None,
                status: ContentStatus::Live,
                views: 10,
                likes: 1,
                comments: 0,
                performance_score: 88.0,
                published_at: now() - Duration::days(90),
                repost_eligible: true,
            },
            now(),
        )
        .await
        .unwrap();

        let entry = RepostQueueEntry {
            id: Uuid::new_v4(),
            source_content_item_id: source.id,
            target_platform: Platform::Instagram,
            status: QueueStatus::Queued,
            priority: 88,
            scheduled_for: now() - Duration::hours(i as i64 + 1),
            created_at: now() - Duration::days(1),
            generated_caption: Some("From the archive".to_string()),
            error_message: None,
        };
        queue.enqueue(&entry).await.unwrap();
        ids.push(entry.id);
    }
    ids
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_claims_have_one_winner() {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_database(&dir.path().join("repost.db")).await.unwrap();
    let queue = RepostQueue::new(pool.clone(), 5000);
    let ids = seed_entries(&pool, &queue, 1).await;
    let id = ids[0];

    let mut handles = Vec::new();
    for _ in 0..8 {
        let queue = queue.clone();
        handles.push(tokio::spawn(async move { queue.claim(id, now()).await }));
    }

    let mut winners = 0;
    let mut losers = 0;
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            ClaimOutcome::Claimed(entry) => {
                assert_eq!(entry.status, QueueStatus::Processing);
                winners += 1;
            }
            ClaimOutcome::NotQueued => losers += 1,
        }
    }

    assert_eq!(winners, 1);
    assert_eq!(losers, 7);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_drain_claims_each_entry_once() {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_database(&dir.path().join("repost.db")).await.unwrap();
    let queue = RepostQueue::new(pool.clone(), 5000);
    let ids = seed_entries(&pool, &queue, 12).await;

    let mut handles = Vec::new();
    for _ in 0..4 {
        let queue = queue.clone();
        handles.push(tokio::spawn(async move {
            let mut claimed = Vec::new();
            while let Some(entry) = queue
                .claim_next_due(Platform::Instagram, now())
                .await
                .unwrap()
            {
                claimed.push(entry.id);
            }
            claimed
        }));
    }

    let mut all = Vec::new();
    for handle in handles {
        all.extend(handle.await.unwrap());
    }

    let unique: HashSet<_> = all.iter().copied().collect();
    assert_eq!(all.len(), ids.len(), "an entry was claimed twice or skipped");
    assert_eq!(unique, ids.into_iter().collect::<HashSet<_>>());

    let processing = queue
        .list(Platform::Instagram, Some(QueueStatus::Processing))
        .await
        .unwrap();
    assert_eq!(processing.len(), 12);
}
