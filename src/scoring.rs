// src/scoring.rs
//! Priority scoring: pure functions mapping (impact magnitude, confidence,
//! age) to a ranking score and discrete labels.
//!
//! Two separate taxonomies live here. `label()` is the priority tier and
//! gates on confidence as well as magnitude; `strength()`/`direction()` are
//! display buckets of magnitude alone. They must not be conflated.

use crate::types::{Direction, PriorityLabel, Strength};
use chrono::{DateTime, Utc};

/// Ranking score. Strictly monotonic in |points_impact| for fixed confidence
/// and age; no hidden state.
pub fn score(
    points_impact: f64,
    confidence: u8,
    created_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> f64 {
    let magnitude = points_impact.abs();
    let base = magnitude * 10.0;

    // Tiers checked high-to-low; first match wins.
    let confidence_multiplier = if confidence >= 90 {
        1.5
    } else if confidence >= 80 {
        1.2
    } else if confidence >= 70 {
        1.0
    } else {
        0.8
    };

    let magnitude_bonus = if magnitude >= 2.0 {
        50.0
    } else if magnitude >= 1.5 {
        30.0
    } else if magnitude >= 1.0 {
        15.0
    } else {
        0.0
    };

    let age_hours = (now - created_at).num_seconds() as f64 / 3600.0;
    let recency_bonus = if age_hours < 1.0 {
        5.0
    } else if age_hours < 6.0 {
        2.0
    } else {
        0.0
    };

    base * confidence_multiplier + magnitude_bonus + recency_bonus
}

/// Priority tier. Confidence gates each tier independently of magnitude: a
/// |2.5| impact at confidence 70 is LOW, not CRITICAL.
pub fn label(points_impact: f64, confidence: u8) -> PriorityLabel {
    let magnitude = points_impact.abs();
    if magnitude >= 2.0 && confidence >= 90 {
        PriorityLabel::Critical
    } else if magnitude >= 1.5 && confidence >= 85 {
        PriorityLabel::High
    } else if magnitude >= 1.0 && confidence >= 80 {
        PriorityLabel::Medium
    } else {
        PriorityLabel::Low
    }
}

/// Display bucket for |value|.
pub fn strength(value: f64) -> Strength {
    let v = value.abs();
    if v >= 2.5 {
        Strength::Extreme
    } else if v >= 2.0 {
        Strength::VeryStrong
    } else if v >= 1.5 {
        Strength::Strong
    } else if v >= 1.0 {
        Strength::Moderate
    } else if v >= 0.5 {
        Strength::Weak
    } else {
        Strength::Minimal
    }
}

pub fn direction(value: f64) -> Direction {
    if value > 0.5 {
        Direction::Bullish
    } else if value < -0.5 {
        Direction::Bearish
    } else {
        Direction::Neutral
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn at(now: DateTime<Utc>, hours_ago: i64) -> DateTime<Utc> {
        now - Duration::hours(hours_ago)
    }

    #[test]
    fn score_applies_multiplier_bonus_and_recency() {
        let now = Utc::now();
        // |2.1| * 10 * 1.5 + 50 + 5 (fresh) = 86.5
        let s = score(2.1, 95, now, now);
        assert!((s - 86.5).abs() < 1e-9);
        // Negative impact scores identically on magnitude.
        assert!((score(-2.1, 95, now, now) - s).abs() < 1e-9);
    }

    #[test]
    fn confidence_multiplier_tiers_first_match_wins() {
        let now = Utc::now();
        let old = at(now, 12); // no recency bonus
        assert!((score(1.0, 90, old, now) - (10.0 * 1.5 + 15.0)).abs() < 1e-9);
        assert!((score(1.0, 80, old, now) - (10.0 * 1.2 + 15.0)).abs() < 1e-9);
        assert!((score(1.0, 70, old, now) - (10.0 * 1.0 + 15.0)).abs() < 1e-9);
        assert!((score(1.0, 69, old, now) - (10.0 * 0.8 + 15.0)).abs() < 1e-9);
    }

    #[test]
    fn recency_bonus_tiers() {
        let now = Utc::now();
        let base = score(0.4, 70, at(now, 12), now);
        assert!((score(0.4, 70, now, now) - base - 5.0).abs() < 1e-9);
        assert!((score(0.4, 70, at(now, 3), now) - base - 2.0).abs() < 1e-9);
    }

    #[test]
    fn score_is_monotonic_in_magnitude() {
        let now = Utc::now();
        let mut prev = f64::NEG_INFINITY;
        for i in 0..40 {
            let points = i as f64 * 0.1;
            let s = score(points, 85, now, now);
            assert!(
                s >= prev,
                "score must not decrease: {points} -> {s} < {prev}"
            );
            if points > 0.0 {
                assert!(s > score(points - 0.05, 85, now, now));
            }
            prev = s;
        }
    }

    #[test]
    fn score_is_pure() {
        let now = Utc::now();
        let created = at(now, 2);
        assert_eq!(score(1.7, 88, created, now), score(1.7, 88, created, now));
    }

    #[test]
    fn label_gates_on_confidence_independently_of_magnitude() {
        assert_eq!(label(2.1, 95), PriorityLabel::Critical);
        // Huge magnitude, weak confidence: LOW, not CRITICAL.
        assert_eq!(label(2.6, 70), PriorityLabel::Low);
        assert_eq!(label(1.6, 86), PriorityLabel::High);
        assert_eq!(label(1.2, 82), PriorityLabel::Medium);
        assert_eq!(label(0.4, 99), PriorityLabel::Low);
        // Negative magnitude uses the absolute value.
        assert_eq!(label(-2.0, 90), PriorityLabel::Critical);
    }

    #[test]
    fn label_checks_tiers_in_order() {
        // Qualifies for CRITICAL magnitude but only HIGH confidence: falls
        // through to HIGH (|2.2| >= 1.5, conf 87 >= 85).
        assert_eq!(label(2.2, 87), PriorityLabel::High);
        // Magnitude 1.9 at confidence 92: not CRITICAL (needs 2.0), HIGH.
        assert_eq!(label(1.9, 92), PriorityLabel::High);
    }

    #[test]
    fn strength_buckets() {
        assert_eq!(strength(2.5), Strength::Extreme);
        assert_eq!(strength(-2.3), Strength::VeryStrong);
        assert_eq!(strength(1.5), Strength::Strong);
        assert_eq!(strength(1.0), Strength::Moderate);
        assert_eq!(strength(-0.7), Strength::Weak);
        assert_eq!(strength(0.49), Strength::Minimal);
    }

    #[test]
    fn direction_buckets() {
        assert_eq!(direction(0.6), Direction::Bullish);
        assert_eq!(direction(-0.6), Direction::Bearish);
        assert_eq!(direction(0.5), Direction::Neutral);
        assert_eq!(direction(-0.5), Direction::Neutral);
        assert_eq!(direction(0.0), Direction::Neutral);
    }

    #[test]
    fn strength_and_direction_are_independent_of_priority() {
        // A strong-magnitude, low-confidence record: display says Extreme /
        // Bearish while priority says LOW.
        let v = -2.8;
        assert_eq!(strength(v), Strength::Extreme);
        assert_eq!(direction(v), Direction::Bearish);
        assert_eq!(label(v, 60), PriorityLabel::Low);
    }
}
