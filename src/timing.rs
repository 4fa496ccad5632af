// src/timing.rs
//! Time-of-day fetch throttle.
//!
//! The minimum interval between paid fetches depends on the trading-day
//! bucket and on whether a user is actively watching the feed. Buckets are an
//! explicit ordered table, half-open `[start, end)` on minutes since
//! midnight, exchange-local wall clock. Everything here is a pure function of
//! its arguments so tests can inject any clock reading.

use chrono::{FixedOffset, Timelike, Utc};

const MINUTE_MS: u64 = 60 * 1000;

/// Minimum elapsed time that unlocks the critical-period override.
pub const CRITICAL_OVERRIDE_MS: u64 = 10 * MINUTE_MS;

#[derive(Debug, Clone, Copy)]
struct Bucket {
    name: &'static str,
    start_min: u32,
    end_min: u32,
    active_min: u64,
    inactive_min: u64,
    /// Open/close windows where an active user may bypass the base interval.
    critical: bool,
}

const BUCKETS: [Bucket; 8] = [
    Bucket { name: "pre-market", start_min: 7 * 60, end_min: 9 * 60, active_min: 45, inactive_min: 90, critical: false },
    Bucket { name: "open", start_min: 9 * 60, end_min: 10 * 60, active_min: 20, inactive_min: 40, critical: true },
    Bucket { name: "morning", start_min: 10 * 60, end_min: 12 * 60, active_min: 30, inactive_min: 60, critical: false },
    Bucket { name: "lunch", start_min: 12 * 60, end_min: 13 * 60, active_min: 60, inactive_min: 120, critical: false },
    Bucket { name: "afternoon", start_min: 13 * 60, end_min: 15 * 60 + 30, active_min: 25, inactive_min: 50, critical: false },
    Bucket { name: "close", start_min: 15 * 60 + 30, end_min: 16 * 60, active_min: 15, inactive_min: 30, critical: true },
    Bucket { name: "post-market", start_min: 16 * 60, end_min: 18 * 60, active_min: 60, inactive_min: 120, critical: false },
    Bucket { name: "evening", start_min: 18 * 60, end_min: 22 * 60, active_min: 90, inactive_min: 180, critical: false },
];

/// Overnight (22:00–07:00) ignores activity entirely.
const OVERNIGHT_MIN: u64 = 240;

fn bucket_for(minute_of_day: u32) -> Option<&'static Bucket> {
    BUCKETS
        .iter()
        .find(|b| minute_of_day >= b.start_min && minute_of_day < b.end_min)
}

fn minute_of_day(hour_of_day: f64) -> u32 {
    let m = (hour_of_day * 60.0).floor();
    (m.max(0.0) as u32).min(24 * 60 - 1)
}

/// Bucket name for diagnostics ("overnight" outside the table).
pub fn bucket_name(hour_of_day: f64) -> &'static str {
    bucket_for(minute_of_day(hour_of_day))
        .map(|b| b.name)
        .unwrap_or("overnight")
}

/// Minimum interval in milliseconds before the next external fetch.
pub fn interval_ms(hour_of_day: f64, user_active: bool) -> u64 {
    match bucket_for(minute_of_day(hour_of_day)) {
        Some(b) => {
            let mins = if user_active { b.active_min } else { b.inactive_min };
            mins * MINUTE_MS
        }
        None => OVERNIGHT_MIN * MINUTE_MS,
    }
}

/// During the open/close windows an active user may fetch after only 10
/// minutes, regardless of the bucket's base interval. This tightens the
/// throttle; it never touches the daily cap.
pub fn critical_override(hour_of_day: f64, user_active: bool, since_last_ms: u64) -> bool {
    if !user_active || since_last_ms < CRITICAL_OVERRIDE_MS {
        return false;
    }
    bucket_for(minute_of_day(hour_of_day)).is_some_and(|b| b.critical)
}

/// Soft throttle decision. `since_last_ms = None` means no fetch has happened
/// yet this process lifetime, which always allows one.
pub fn should_fetch(hour_of_day: f64, user_active: bool, since_last_ms: Option<u64>) -> bool {
    let Some(elapsed) = since_last_ms else {
        return true;
    };
    if elapsed >= interval_ms(hour_of_day, user_active) {
        return true;
    }
    critical_override(hour_of_day, user_active, elapsed)
}

/// Current hour-of-day on the exchange-local clock, as a fraction
/// (e.g. 15:30 → 15.5).
pub fn market_hour(tz_offset_minutes: i32) -> f64 {
    let offset = FixedOffset::east_opt(tz_offset_minutes * 60)
        .unwrap_or_else(|| FixedOffset::east_opt(0).expect("zero offset"));
    let now = Utc::now().with_timezone(&offset);
    now.hour() as f64 + now.minute() as f64 / 60.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_bucket_active_is_twenty_minutes() {
        assert_eq!(interval_ms(9.5, true), 20 * 60 * 1000);
        assert_eq!(interval_ms(9.5, false), 40 * 60 * 1000);
    }

    #[test]
    fn overnight_ignores_activity() {
        assert_eq!(interval_ms(23.0, true), 240 * 60 * 1000);
        assert_eq!(interval_ms(23.0, false), 240 * 60 * 1000);
        assert_eq!(interval_ms(3.0, true), 240 * 60 * 1000);
        assert_eq!(interval_ms(6.99, true), 240 * 60 * 1000);
    }

    #[test]
    fn bucket_boundaries_are_half_open() {
        // 9:00 belongs to open, not pre-market.
        assert_eq!(interval_ms(9.0, true), 20 * 60 * 1000);
        // 15:30 belongs to close, not afternoon.
        assert_eq!(interval_ms(15.5, true), 15 * 60 * 1000);
        // 15:29 is still afternoon.
        assert_eq!(interval_ms(15.0 + 29.0 / 60.0, true), 25 * 60 * 1000);
        // 22:00 rolls into overnight.
        assert_eq!(interval_ms(22.0, false), 240 * 60 * 1000);
        // 7:00 starts pre-market.
        assert_eq!(interval_ms(7.0, false), 90 * 60 * 1000);
    }

    #[test]
    fn full_table_matches_reference_pairs() {
        let cases: &[(f64, u64, u64)] = &[
            (8.0, 45, 90),    // pre-market
            (9.5, 20, 40),    // open
            (11.0, 30, 60),   // morning
            (12.5, 60, 120),  // lunch
            (14.0, 25, 50),   // afternoon
            (15.75, 15, 30),  // close
            (17.0, 60, 120),  // post-market
            (20.0, 90, 180),  // evening
        ];
        for &(hour, active, inactive) in cases {
            assert_eq!(interval_ms(hour, true), active * 60 * 1000, "active @ {hour}");
            assert_eq!(interval_ms(hour, false), inactive * 60 * 1000, "inactive @ {hour}");
        }
    }

    #[test]
    fn critical_override_requires_all_three_conditions() {
        let eleven_min = 11 * 60 * 1000;
        // Open bucket, active, 11 min elapsed: allowed.
        assert!(critical_override(9.5, true, eleven_min));
        // Close bucket too.
        assert!(critical_override(15.75, true, eleven_min));
        // Inactive user: no.
        assert!(!critical_override(9.5, false, eleven_min));
        // Only 9 minutes elapsed: no.
        assert!(!critical_override(9.5, true, 9 * 60 * 1000));
        // Non-critical bucket: no.
        assert!(!critical_override(11.0, true, eleven_min));
        // Overnight: no.
        assert!(!critical_override(23.0, true, eleven_min));
    }

    #[test]
    fn should_fetch_combines_interval_and_override() {
        // Never fetched: always allowed.
        assert!(should_fetch(11.0, false, None));
        // Morning active needs 30 min; 20 min is throttled.
        assert!(!should_fetch(11.0, true, Some(20 * 60 * 1000)));
        assert!(should_fetch(11.0, true, Some(31 * 60 * 1000)));
        // Open bucket: 12 min would normally throttle (base 20) but the
        // critical override lets an active user through.
        assert!(should_fetch(9.5, true, Some(12 * 60 * 1000)));
        assert!(!should_fetch(9.5, false, Some(12 * 60 * 1000)));
    }

    #[test]
    fn bucket_names_for_diagnostics() {
        assert_eq!(bucket_name(9.5), "open");
        assert_eq!(bucket_name(15.5), "close");
        assert_eq!(bucket_name(2.0), "overnight");
    }
}
