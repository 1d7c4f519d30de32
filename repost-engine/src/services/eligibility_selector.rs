//! Eligibility Selector
//!
//! Ranks and filters the catalog into repost candidates. The filter runs
//! against the database on every call, so score refreshes and manual
//! eligibility flips are visible immediately.

use crate::config::SelectorConfig;
use crate::db::content_items::select_eligible;
use crate::error::Result;
use crate::types::RepostCandidate;
use chrono::{DateTime, Utc};
use repost_common::time::days_before;
use repost_common::Platform;
use sqlx::{Pool, Sqlite};

/// Candidates fetched for a cycle and the prefix the cycle will use
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub fetched: usize,
    pub chosen: Vec<RepostCandidate>,
}

pub struct EligibilitySelector {
    db: Pool<Sqlite>,
    config: SelectorConfig,
}

impl EligibilitySelector {
    pub fn new(db: Pool<Sqlite>, config: SelectorConfig) -> Self {
        Self { db, config }
    }

    /// Eligible, not reposted, not already pending in the queue, score >=
    /// `min_score`, published at least `cooldown_days` before `now`
    ///
    /// Ordered by score descending, older publication first on ties.
    pub async fn select_candidates(
        &self,
        platform: Platform,
        min_score: f64,
        cooldown_days: i64,
        limit: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<RepostCandidate>> {
        let cutoff = days_before(now, cooldown_days.max(0));
        let items = select_eligible(&self.db, platform, min_score, cutoff, limit).await?;

        Ok(items
            .iter()
            .map(|item| RepostCandidate::from_item(item, now))
            .collect())
    }

    /// How many of the fetched candidates a cycle uses
    ///
    /// Average score at or above the high tier: up to 3. At or above the
    /// mid tier: up to 2. Otherwise 1. Never more than were fetched.
    pub fn repost_count(&self, candidates: &[RepostCandidate]) -> usize {
        if candidates.is_empty() {
            return 0;
        }

        let average = candidates.iter().map(|c| c.performance_score).sum::<f64>()
            / candidates.len() as f64;

        let wanted = if average >= self.config.high_tier_score {
            3
        } else if average >= self.config.mid_tier_score {
            2
        } else {
            1
        };

        wanted.min(candidates.len())
    }

    /// Fetch with the configured parameters and apply the repost-count policy
    pub async fn select_for_cycle(&self, platform: Platform, now: DateTime<Utc>) -> Result<Selection> {
        let fetched = self
            .select_candidates(
                platform,
                self.config.min_score,
                self.config.cooldown_days,
                self.config.fetch_limit,
                now,
            )
            .await?;

        let count = self.repost_count(&fetched);
        tracing::debug!(
            platform = %platform,
            fetched = fetched.len(),
            selected = count,
            "Selected repost candidates"
        );

        Ok(Selection {
            fetched: fetched.len(),
            chosen: fetched.into_iter().take(count).collect(),
        })
    }
}
