//! Slot Allocator
//!
//! Assigns each selected candidate a future publication instant.
//!
//! **Algorithm:**
//! 1. Use the ranked preferred slots, or the fixed grid when none are usable
//! 2. Walk candidates in priority order; for each, scan days starting today
//!    (in the configured local offset) and, within a day, slots in rank order
//! 3. Skip instants at or before `now`, instants already taken on the
//!    platform, and days already holding `max_per_day` entries
//! 4. Stop after `max_per_day` entries; the rest are deferred
//!
//! Allocation is pure and cannot fail: bad slot data degrades to the grid.

use crate::config::SlotConfig;
use crate::types::{AllocationResult, PreferredSlot, RepostCandidate};
use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, Offset, TimeZone, Utc};
use repost_common::{Platform, QueueStatus, RepostQueueEntry};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Days scanned ahead before a candidate is deferred
const SLOT_HORIZON_DAYS: i64 = 14;

/// Evenly spaced daily slots: `first_hour`, `first_hour + interval`, ... < 24
pub fn fallback_grid(config: &SlotConfig) -> Vec<PreferredSlot> {
    let step = config.interval_hours.max(1) as usize;
    (config.first_hour.min(23)..24)
        .step_by(step)
        .map(PreferredSlot::daily)
        .collect()
}

pub struct SlotAllocator {
    config: SlotConfig,
}

impl SlotAllocator {
    pub fn new(config: SlotConfig) -> Self {
        Self { config }
    }

    fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.config.utc_offset_minutes * 60)
            .unwrap_or_else(|| Utc.fix())
    }

    /// Valid preferred slots in rank order, or the fallback grid
    fn usable_slots(&self, preferred: &[PreferredSlot]) -> Vec<PreferredSlot> {
        let mut seen = HashSet::new();
        let slots: Vec<PreferredSlot> = preferred
            .iter()
            .copied()
            .filter(|slot| slot.hour < 24)
            .filter(|slot| seen.insert(*slot))
            .collect();

        if slots.is_empty() {
            if !preferred.is_empty() {
                tracing::warn!("No usable preferred slots, using fallback grid");
            }
            fallback_grid(&self.config)
        } else {
            slots
        }
    }

    fn slot_instant(&self, date: NaiveDate, hour: u32) -> Option<DateTime<Utc>> {
        let local = date.and_hms_opt(hour, 0, 0)?;
        self.offset()
            .from_local_datetime(&local)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
    }

    pub fn allocate(
        &self,
        candidates: &[RepostCandidate],
        platform: Platform,
        max_per_day: usize,
        preferred: &[PreferredSlot],
        occupied: &[DateTime<Utc>],
        now: DateTime<Utc>,
    ) -> AllocationResult {
        let slots = self.usable_slots(preferred);
        let offset = self.offset();
        let today = now.with_timezone(&offset).date_naive();

        let mut taken: HashSet<DateTime<Utc>> = occupied.iter().copied().collect();
        let mut per_day: HashMap<NaiveDate, usize> = HashMap::new();
        for instant in occupied {
            *per_day
                .entry(instant.with_timezone(&offset).date_naive())
                .or_insert(0) += 1;
        }

        let mut result = AllocationResult::default();

        for candidate in candidates {
            if result.entries.len() >= max_per_day {
                result.deferred.push(candidate.content_item_id);
                continue;
            }

            let Some(instant) = self.next_free(&slots, today, max_per_day, &taken, &per_day, now)
            else {
                tracing::debug!(
                    platform = %platform,
                    content_item_id = %candidate.content_item_id,
                    "No free slot within horizon"
                );
                result.deferred.push(candidate.content_item_id);
                continue;
            };

            taken.insert(instant);
            *per_day
                .entry(instant.with_timezone(&offset).date_naive())
                .or_insert(0) += 1;

            result.entries.push(RepostQueueEntry {
                id: Uuid::new_v4(),
                source_content_item_id: candidate.content_item_id,
                target_platform: platform,
                status: QueueStatus::Queued,
                priority: candidate.performance_score.round() as i64,
                scheduled_for: instant,
                created_at: now,
                generated_caption: None,
                error_message: None,
            });
        }

        result
    }

    fn next_free(
        &self,
        slots: &[PreferredSlot],
        today: NaiveDate,
        max_per_day: usize,
        taken: &HashSet<DateTime<Utc>>,
        per_day: &HashMap<NaiveDate, usize>,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        (0..SLOT_HORIZON_DAYS)
            .filter_map(|d| today.checked_add_signed(Duration::days(d)))
            .filter(|date| per_day.get(date).copied().unwrap_or(0) < max_per_day)
            .find_map(|date| {
                slots
                    .iter()
                    .filter(|slot| slot.applies_to(date.weekday()))
                    .filter_map(|slot| self.slot_instant(date, slot.hour))
                    .find(|instant| *instant > now && !taken.contains(instant))
            })
    }
}
