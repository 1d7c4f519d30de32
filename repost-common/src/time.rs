//! Timestamp utilities
//!
//! All persisted instants are stored as INTEGER unix milliseconds so that
//! range filters and ordering in SQL are plain integer comparisons.

use chrono::{DateTime, Duration, TimeZone, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Convert a timestamp to unix milliseconds for storage
pub fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

/// Convert stored unix milliseconds back to a timestamp
///
/// Out-of-range values clamp to the unix epoch rather than failing; they can
/// only appear if a row was written by hand.
pub fn from_millis(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Instant `days` before `now`
///
/// Negative counts are treated as 0. Saturates at the earliest representable
/// instant instead of overflowing.
pub fn days_before(now: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    Duration::try_days(days.max(0))
        .and_then(|span| now.checked_sub_signed(span))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Whole days elapsed between `earlier` and `now` (never negative)
pub fn age_days(earlier: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - earlier).num_days().max(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_returns_recent_timestamp() {
        let timestamp = now();
        assert!(timestamp.timestamp() > 946_684_800); // 2000-01-01 00:00:00 UTC
        assert!(timestamp.timestamp() < 4_102_444_800); // 2100-01-01 00:00:00 UTC
    }

    #[test]
    fn test_millis_conversion_is_exact() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 14, 15, 9, 26).unwrap()
            + Duration::milliseconds(535);
        assert_eq!(from_millis(to_millis(ts)), ts);
    }

    #[test]
    fn test_from_millis_zero_is_epoch() {
        assert_eq!(from_millis(0), DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn test_days_before() {
        let now = Utc.with_ymd_and_hms(2026, 10, 17, 12, 0, 0).unwrap();
        let then = days_before(now, 30);
        assert_eq!(then, Utc.with_ymd_and_hms(2026, 9, 17, 12, 0, 0).unwrap());
    }

    #[test]
    fn test_days_before_saturates() {
        let now = Utc.with_ymd_and_hms(2026, 10, 17, 12, 0, 0).unwrap();
        assert_eq!(days_before(now, 200_000_000), DateTime::<Utc>::MIN_UTC);
        assert_eq!(days_before(now, i64::MAX), DateTime::<Utc>::MIN_UTC);
        assert_eq!(days_before(now, -5), now);
    }

    #[test]
    fn test_age_days_never_negative() {
        let now = Utc.with_ymd_and_hms(2026, 10, 17, 12, 0, 0).unwrap();
        let future = now + Duration::days(2);
        assert_eq!(age_days(future, now), 0);
        assert_eq!(age_days(now - Duration::hours(49), now), 2);
    }
}
