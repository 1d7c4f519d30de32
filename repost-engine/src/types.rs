//! Result types shared across the engine services
//!
//! Each pipeline stage returns a tagged type with fixed fields, so callers
//! branch on the variant instead of probing optional fields.

use chrono::{DateTime, Utc, Weekday};
use repost_common::{ContentItem, Platform, QueueStatus, RepostQueueEntry};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

// ============================================================================
// Fingerprint matching
// ============================================================================

/// How a match decision was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// Content hash found in the store
    Exact,
    /// Best size/duration candidate reached the confidence threshold
    Probable,
    /// No candidate reached the threshold
    NoMatch,
    /// Observed fingerprint had no usable hash
    Unhashable,
}

/// Outcome of `FingerprintMatcher::match_fingerprint`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub kind: MatchKind,
    /// 0-100
    pub confidence: f64,
    pub matched_item: Option<ContentItem>,
}

impl MatchResult {
    pub fn exact(item: Option<ContentItem>) -> Self {
        Self {
            kind: MatchKind::Exact,
            confidence: 100.0,
            matched_item: item,
        }
    }

    pub fn probable(confidence: f64, item: Option<ContentItem>) -> Self {
        Self {
            kind: MatchKind::Probable,
            confidence,
            matched_item: item,
        }
    }

    /// Not a match; `confidence` is the best score seen (0 if none)
    pub fn no_match(confidence: f64) -> Self {
        Self {
            kind: MatchKind::NoMatch,
            confidence,
            matched_item: None,
        }
    }

    pub fn unhashable() -> Self {
        Self {
            kind: MatchKind::Unhashable,
            confidence: 0.0,
            matched_item: None,
        }
    }

    pub fn is_match(&self) -> bool {
        matches!(self.kind, MatchKind::Exact | MatchKind::Probable)
    }
}

// ============================================================================
// Selection and allocation
// ============================================================================

/// Read-only projection of a catalog item chosen for reposting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepostCandidate {
    pub content_item_id: Uuid,
    pub platform: Platform,
    pub performance_score: f64,
    /// Whole days since original publication
    pub age_days: i64,
    pub published_at: DateTime<Utc>,
    /// Original caption, input to caption generation
    pub source_caption: Option<String>,
}

impl RepostCandidate {
    pub fn from_item(item: &ContentItem, now: DateTime<Utc>) -> Self {
        Self {
            content_item_id: item.id,
            platform: item.platform,
            performance_score: item.performance_score,
            age_days: repost_common::time::age_days(item.published_at, now),
            published_at: item.published_at,
            source_caption: item.caption.clone(),
        }
    }
}

/// Ranked time-of-day slot; `day_of_week = None` applies to every day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PreferredSlot {
    /// 0-23, in the configured local offset
    pub hour: u32,
    pub day_of_week: Option<Weekday>,
}

impl PreferredSlot {
    pub fn daily(hour: u32) -> Self {
        Self {
            hour,
            day_of_week: None,
        }
    }

    pub fn applies_to(&self, weekday: Weekday) -> bool {
        self.day_of_week.map_or(true, |d| d == weekday)
    }
}

/// Output of the slot allocator
///
/// `entries` are in candidate order; `deferred` lists candidates left for a
/// later cycle because the cap or the slot horizon was exhausted.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AllocationResult {
    pub entries: Vec<RepostQueueEntry>,
    pub deferred: Vec<Uuid>,
}

// ============================================================================
// Queue transitions
// ============================================================================

/// Outcome of an exclusive claim attempt
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    /// This caller now holds the entry in `processing`
    Claimed(RepostQueueEntry),
    /// Someone else holds or finished it, or it does not exist
    NotQueued,
}

impl ClaimOutcome {
    pub fn is_claimed(&self) -> bool {
        matches!(self, ClaimOutcome::Claimed(_))
    }
}

// ============================================================================
// Cycles
// ============================================================================

/// Whether a cycle consults the trigger gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleMode {
    /// Run only if the trigger threshold is met
    Gated,
    /// Skip the threshold check (operator trigger only)
    Forced,
}

/// Summary of a cycle that ran to its terminal step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub platform: Platform,
    pub new_qualifying: i64,
    pub fetched: usize,
    pub selected: usize,
    pub queued: Vec<RepostQueueEntry>,
    pub deferred: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CycleOutcome {
    /// Another cycle held the guard
    Skipped,
    /// Gate did not open; nothing changed
    Idle { new_qualifying: i64 },
    Completed(CycleReport),
}

// ============================================================================
// Status
// ============================================================================

/// Operator status for one platform
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlatformStatus {
    pub platform: Platform,
    pub queue_counts: BTreeMap<String, i64>,
    pub next_due: Option<DateTime<Utc>>,
    pub last_trigger_at: Option<DateTime<Utc>>,
    pub new_qualifying_count: Option<i64>,
    pub last_cycle_error: Option<String>,
    pub last_failed_entry: Option<FailedEntrySummary>,
}

impl PlatformStatus {
    pub fn count(&self, status: QueueStatus) -> i64 {
        self.queue_counts.get(status.as_str()).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedEntrySummary {
    pub entry_id: Uuid,
    pub error_message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_result_flags() {
        assert!(MatchResult::exact(None).is_match());
        assert_eq!(MatchResult::exact(None).confidence, 100.0);
        assert!(MatchResult::probable(80.0, None).is_match());
        assert!(!MatchResult::no_match(60.0).is_match());
        assert!(!MatchResult::unhashable().is_match());
        assert_eq!(MatchResult::unhashable().confidence, 0.0);
    }

    #[test]
    fn test_slot_day_filter() {
        assert!(PreferredSlot::daily(9).applies_to(Weekday::Sun));
        let monday = PreferredSlot {
            hour: 9,
            day_of_week: Some(Weekday::Mon),
        };
        assert!(monday.applies_to(Weekday::Mon));
        assert!(!monday.applies_to(Weekday::Tue));
    }

    #[test]
    fn test_cycle_outcome_serializes_tagged() {
        let json = serde_json::to_value(CycleOutcome::Idle { new_qualifying: 4 }).unwrap();
        assert_eq!(json["outcome"], "idle");
        assert_eq!(json["new_qualifying"], 4);
    }
}
