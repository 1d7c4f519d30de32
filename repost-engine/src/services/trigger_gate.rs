//! Trigger Gate
//!
//! Per-platform `IDLE ⇄ READY` gate. A platform becomes READY once enough
//! qualifying publications appeared since its last trigger. The window is
//! closed by `advance`, which the orchestrator calls only after a cycle
//! reaches its terminal step (including cycles that found nothing to repost).
//!
//! Counting errors fail closed: the gate reports IDLE.

use crate::config::TriggerConfig;
use crate::db::content_items::count_qualifying_since;
use crate::db::trigger_state;
use crate::error::Result;
use chrono::{DateTime, Utc};
use repost_common::time::days_before;
use repost_common::Platform;
use sqlx::{Pool, Sqlite};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Ready { new_qualifying: i64 },
    Idle { new_qualifying: i64 },
}

impl GateDecision {
    pub fn is_ready(&self) -> bool {
        matches!(self, GateDecision::Ready { .. })
    }

    pub fn new_qualifying(&self) -> i64 {
        match self {
            GateDecision::Ready { new_qualifying } | GateDecision::Idle { new_qualifying } => {
                *new_qualifying
            }
        }
    }
}

pub struct TriggerGate {
    db: Pool<Sqlite>,
    config: TriggerConfig,
}

impl TriggerGate {
    pub fn new(db: Pool<Sqlite>, config: TriggerConfig) -> Self {
        Self { db, config }
    }

    /// Qualifying publications since the platform's last trigger
    ///
    /// Creates the trigger state on first use, `lookback_days` before `now`.
    pub async fn count_new(&self, platform: Platform, now: DateTime<Utc>) -> Result<i64> {
        let state = trigger_state::get_or_create(
            &self.db,
            platform,
            days_before(now, self.config.lookback_days),
            now,
        )
        .await?;

        let count = count_qualifying_since(&self.db, platform, state.last_trigger_at).await?;
        trigger_state::record_count(&self.db, platform, count, now).await?;

        Ok(count)
    }

    pub async fn evaluate(&self, platform: Platform, now: DateTime<Utc>) -> GateDecision {
        match self.count_new(platform, now).await {
            Ok(count) if count >= self.config.threshold => {
                tracing::info!(
                    platform = %platform,
                    new_qualifying = count,
                    threshold = self.config.threshold,
                    "Trigger gate ready"
                );
                GateDecision::Ready {
                    new_qualifying: count,
                }
            }
            Ok(count) => {
                tracing::debug!(
                    platform = %platform,
                    new_qualifying = count,
                    threshold = self.config.threshold,
                    "Trigger gate idle"
                );
                GateDecision::Idle {
                    new_qualifying: count,
                }
            }
            Err(e) => {
                tracing::warn!(
                    platform = %platform,
                    error = %e,
                    "Trigger count failed, treating gate as idle"
                );
                GateDecision::Idle { new_qualifying: 0 }
            }
        }
    }

    /// Close the current trigger window at `now`
    pub async fn advance(&self, platform: Platform, now: DateTime<Utc>) -> Result<()> {
        trigger_state::advance(&self.db, platform, now).await?;
        tracing::info!(platform = %platform, last_trigger_at = %now, "Trigger window advanced");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::content_items::upsert_item;
    use crate::test_support::{item, setup_test_db, ts};

    fn gate(pool: &Pool<Sqlite>, threshold: i64) -> TriggerGate {
        TriggerGate::new(
            pool.clone(),
            TriggerConfig {
                threshold,
                lookback_days: 30,
            },
        )
    }

    async fn publish_n(pool: &Pool<Sqlite>, platform: Platform, n: usize, at: DateTime<Utc>) {
        for i in 0..n {
            upsert_item(pool, &item(platform, &format!("p{}", i), 10.0, at), at)
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_ready_at_threshold() {
        let pool = setup_test_db().await;
        let now = ts(2026, 10, 17, 12);
        publish_n(&pool, Platform::YouTube, 3, ts(2026, 10, 10, 0)).await;

        assert_eq!(
            gate(&pool, 3).evaluate(Platform::YouTube, now).await,
            GateDecision::Ready { new_qualifying: 3 }
        );
        assert_eq!(
            gate(&pool, 4).evaluate(Platform::YouTube, now).await,
            GateDecision::Idle { new_qualifying: 3 }
        );
    }

    #[tokio::test]
    async fn test_lookback_excludes_old_items() {
        let pool = setup_test_db().await;
        let now = ts(2026, 10, 17, 12);
        // 40 days old: outside the initial 30-day window
        publish_n(&pool, Platform::Instagram, 5, ts(2026, 9, 7, 0)).await;

        let decision = gate(&pool, 1).evaluate(Platform::Instagram, now).await;
        assert_eq!(decision, GateDecision::Idle { new_qualifying: 0 });
    }

    #[tokio::test]
    async fn test_advance_closes_window() {
        let pool = setup_test_db().await;
        let now = ts(2026, 10, 17, 12);
        publish_n(&pool, Platform::YouTube, 2, ts(2026, 10, 10, 0)).await;

        let g = gate(&pool, 2);
        assert!(g.evaluate(Platform::YouTube, now).await.is_ready());
        g.advance(Platform::YouTube, now).await.unwrap();

        let later = ts(2026, 10, 17, 13);
        assert_eq!(
            g.evaluate(Platform::YouTube, later).await,
            GateDecision::Idle { new_qualifying: 0 }
        );
    }

    #[tokio::test]
    async fn test_count_failure_fails_closed() {
        let pool = setup_test_db().await;
        sqlx::query("DROP TABLE content_items")
            .execute(&pool)
            .await
            .unwrap();

        let decision = gate(&pool, 0).evaluate(Platform::YouTube, ts(2026, 10, 17, 12)).await;
        assert!(!decision.is_ready());
    }
}
