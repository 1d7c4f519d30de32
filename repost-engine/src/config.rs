//! Engine configuration
//!
//! Tunables are read from the database `settings` table, seeded with defaults
//! by `repost_common::db::init`. Missing or unparseable values fall back to
//! the compiled defaults below with a warning.

use crate::db::settings::get_setting;
use repost_common::Platform;
use sqlx::{Pool, Sqlite};
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Upper bound for day-count windows (cooldown, trigger lookback)
pub const MAX_WINDOW_DAYS: i64 = 3650;

/// Trigger gate parameters
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerConfig {
    /// New qualifying publications required before a cycle may run
    pub threshold: i64,
    /// Initial look-back for lazily created trigger state
    pub lookback_days: i64,
}

/// Eligibility selector parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SelectorConfig {
    pub min_score: f64,
    pub cooldown_days: i64,
    pub fetch_limit: i64,
    /// Average score at or above which up to 3 candidates are used
    pub high_tier_score: f64,
    /// Average score at or above which up to 2 candidates are used
    pub mid_tier_score: f64,
}

/// Fingerprint matcher parameters
#[derive(Debug, Clone, PartialEq)]
pub struct MatcherConfig {
    /// Minimum confidence (0-100) for a probable match
    pub confidence_threshold: f64,
    /// Relative window (0.2 = ±20%) for size/duration candidates
    pub similarity_tolerance: f64,
    pub candidate_cap: i64,
}

/// Slot allocator parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SlotConfig {
    /// First hour of the fallback grid
    pub first_hour: u32,
    /// Spacing of the fallback grid
    pub interval_hours: u32,
    /// Offset of "local" time from UTC used to place slots
    pub utc_offset_minutes: i32,
    /// Number of slots requested from the posting-time advisor
    pub preferred_slot_count: usize,
    pub max_per_day_youtube: usize,
    pub max_per_day_instagram: usize,
}

impl SlotConfig {
    pub fn max_per_day(&self, platform: Platform) -> usize {
        match platform {
            Platform::YouTube => self.max_per_day_youtube,
            Platform::Instagram => self.max_per_day_instagram,
        }
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub trigger: TriggerConfig,
    pub selector: SelectorConfig,
    pub matcher: MatcherConfig,
    pub slots: SlotConfig,
    pub collaborator_timeout: Duration,
    pub trigger_check_interval: Duration,
    pub daily_pass_interval: Duration,
    pub db_max_lock_wait_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            trigger: TriggerConfig {
                threshold: 20,
                lookback_days: 30,
            },
            selector: SelectorConfig {
                min_score: 70.0,
                cooldown_days: 30,
                fetch_limit: 10,
                high_tier_score: 80.0,
                mid_tier_score: 60.0,
            },
            matcher: MatcherConfig {
                confidence_threshold: 75.0,
                similarity_tolerance: 0.2,
                candidate_cap: 20,
            },
            slots: SlotConfig {
                first_hour: 9,
                interval_hours: 3,
                utc_offset_minutes: 0,
                preferred_slot_count: 5,
                max_per_day_youtube: 3,
                max_per_day_instagram: 3,
            },
            collaborator_timeout: Duration::from_millis(10_000),
            trigger_check_interval: Duration::from_secs(3600),
            daily_pass_interval: Duration::from_secs(86_400),
            db_max_lock_wait_ms: 5000,
        }
    }
}

/// Read one setting, keeping `current` when absent or broken
async fn load<T: FromStr>(db: &Pool<Sqlite>, key: &str, current: &mut T) {
    match get_setting::<T>(db, key).await {
        Ok(Some(value)) => *current = value,
        Ok(None) => {}
        Err(e) => warn!("Using default for setting '{}': {}", key, e),
    }
}

impl EngineConfig {
    /// Load configuration from database settings, falling back to defaults
    pub async fn from_database(db: &Pool<Sqlite>) -> Self {
        let mut config = Self::default();

        load(db, "trigger_threshold", &mut config.trigger.threshold).await;
        load(db, "trigger_lookback_days", &mut config.trigger.lookback_days).await;

        load(db, "selector_min_score", &mut config.selector.min_score).await;
        load(db, "selector_cooldown_days", &mut config.selector.cooldown_days).await;
        load(db, "selector_fetch_limit", &mut config.selector.fetch_limit).await;
        load(db, "repost_high_tier_score", &mut config.selector.high_tier_score).await;
        load(db, "repost_mid_tier_score", &mut config.selector.mid_tier_score).await;

        load(db, "match_confidence_threshold", &mut config.matcher.confidence_threshold).await;
        load(db, "match_similarity_tolerance", &mut config.matcher.similarity_tolerance).await;
        load(db, "match_candidate_cap", &mut config.matcher.candidate_cap).await;

        load(db, "slot_first_hour", &mut config.slots.first_hour).await;
        load(db, "slot_interval_hours", &mut config.slots.interval_hours).await;
        load(db, "slot_utc_offset_minutes", &mut config.slots.utc_offset_minutes).await;
        load(db, "preferred_slot_count", &mut config.slots.preferred_slot_count).await;
        load(db, "max_reposts_per_day_youtube", &mut config.slots.max_per_day_youtube).await;
        load(db, "max_reposts_per_day_instagram", &mut config.slots.max_per_day_instagram).await;

        let mut timeout_ms = config.collaborator_timeout.as_millis() as u64;
        load(db, "collaborator_timeout_ms", &mut timeout_ms).await;
        config.collaborator_timeout = Duration::from_millis(timeout_ms);

        let mut check_secs = config.trigger_check_interval.as_secs();
        load(db, "trigger_check_interval_secs", &mut check_secs).await;
        config.trigger_check_interval = Duration::from_secs(check_secs);

        let mut daily_secs = config.daily_pass_interval.as_secs();
        load(db, "daily_pass_interval_secs", &mut daily_secs).await;
        config.daily_pass_interval = Duration::from_secs(daily_secs);

        load(db, "db_max_lock_wait_ms", &mut config.db_max_lock_wait_ms).await;

        config.sanitized()
    }

    /// Clamp values that would make an algorithm degenerate
    pub fn sanitized(mut self) -> Self {
        let defaults = Self::default();

        if self.trigger.threshold < 1 {
            warn!("trigger_threshold must be >= 1, using 1");
            self.trigger.threshold = 1;
        }
        if self.slots.first_hour > 23 {
            warn!("slot_first_hour out of range, using {}", defaults.slots.first_hour);
            self.slots.first_hour = defaults.slots.first_hour;
        }
        if self.slots.interval_hours == 0 || self.slots.interval_hours > 24 {
            warn!("slot_interval_hours out of range, using {}", defaults.slots.interval_hours);
            self.slots.interval_hours = defaults.slots.interval_hours;
        }
        if self.slots.utc_offset_minutes.abs() >= 24 * 60 {
            warn!("slot_utc_offset_minutes out of range, using 0");
            self.slots.utc_offset_minutes = 0;
        }
        if !(0.0..=1.0).contains(&self.matcher.similarity_tolerance) {
            warn!(
                "match_similarity_tolerance out of range, using {}",
                defaults.matcher.similarity_tolerance
            );
            self.matcher.similarity_tolerance = defaults.matcher.similarity_tolerance;
        }
        if self.matcher.candidate_cap < 1 {
            self.matcher.candidate_cap = defaults.matcher.candidate_cap;
        }
        if self.selector.fetch_limit < 1 {
            self.selector.fetch_limit = defaults.selector.fetch_limit;
        }
        if !(0..=MAX_WINDOW_DAYS).contains(&self.selector.cooldown_days) {
            warn!(
                "selector_cooldown_days out of range, clamping to 0..={}",
                MAX_WINDOW_DAYS
            );
            self.selector.cooldown_days = self.selector.cooldown_days.clamp(0, MAX_WINDOW_DAYS);
        }
        if !(0..=MAX_WINDOW_DAYS).contains(&self.trigger.lookback_days) {
            warn!(
                "trigger_lookback_days out of range, clamping to 0..={}",
                MAX_WINDOW_DAYS
            );
            self.trigger.lookback_days = self.trigger.lookback_days.clamp(0, MAX_WINDOW_DAYS);
        }
        if self.trigger_check_interval.is_zero() {
            self.trigger_check_interval = defaults.trigger_check_interval;
        }
        if self.daily_pass_interval.is_zero() {
            self.daily_pass_interval = defaults.daily_pass_interval;
        }

        self
    }
}
