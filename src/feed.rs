// src/feed.rs
//! Feed assembler: separates event-driven intelligence from technical
//! commentary, orders it by priority score, and computes the aggregate
//! summary shown at the top of the feed.

use crate::scoring;
use crate::types::{Direction, ImpactAnalysis, PriorityLabel, Strength};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single substring hit on any of these excludes the record. Intentionally
/// coarse: the word "trend" appearing incidentally wrongly excludes a record.
/// That over-exclusion is a documented property of the filter, not a bug to
/// silently fix.
pub const TECHNICAL_PATTERNS: &[&str] = &[
    "breakout", "support level", "resistance level", "support zone",
    "resistance zone", "bullish", "bearish", "stop-loss", "stop loss",
    "rally", "trend", "signal", "indicator", "moving average", "rsi",
    "macd", "candlestick", "fibonacci", "chart pattern",
];

pub fn is_technical(text: &str) -> bool {
    let lowered = text.to_lowercase();
    TECHNICAL_PATTERNS.iter().any(|p| lowered.contains(p))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedItem {
    #[serde(flatten)]
    pub analysis: ImpactAnalysis,
    pub priority: PriorityLabel,
    pub strength: Strength,
    pub direction: Direction,
    pub priority_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSummary {
    /// Sum of expected_points_impact across the set.
    pub net_impact: f64,
    /// Records with impact > 1.
    pub bullish_signals: usize,
    /// Records with impact < -1.
    pub bearish_signals: usize,
    /// Records with |impact| >= 2.
    pub critical_events: usize,
    pub avg_confidence: f64,
    pub net_strength: Strength,
    pub net_direction: Direction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssembledFeed {
    pub items: Vec<FeedItem>,
    pub summary: FeedSummary,
    /// False when the fixed placeholder set was substituted. Consumers must
    /// never mistake synthetic fallback content for live intelligence.
    pub live: bool,
}

/// Fixed "aggressive mode" placeholder set shown while live data is still
/// being acquired. Always the same four records; content-agnostic. The texts
/// deliberately avoid every technical pattern so they survive their own
/// filter.
pub fn fallback_analyses(now: DateTime<Utc>) -> Vec<ImpactAnalysis> {
    let canned: [(&str, &str, &str, f64, u8); 4] = [
        (
            "Monitoring index heavyweights for opening moves",
            "Large-cap flows decide early direction while live coverage is sparse",
            "Watch banking and IT majors at the open",
            1.2,
            60,
        ),
        (
            "Tracking institutional activity in cash market",
            "Sustained FII buying or selling shifts the weekly balance",
            "Flow data arrives after the close; positioning ahead is a guess",
            0.8,
            55,
        ),
        (
            "Awaiting policy cues from the central bank calendar",
            "Rate expectations reprice quickly around official commentary",
            "Rate-sensitive sectors move first on any statement",
            -0.6,
            55,
        ),
        (
            "Scanning global markets for overnight spillover",
            "Weak global closes typically pressure the open",
            "A gap open either way is possible; sizing should stay small",
            -1.1,
            50,
        ),
    ];

    canned
        .iter()
        .map(|(what, why, impact, points, conf)| ImpactAnalysis {
            id: Uuid::new_v4().to_string(),
            news_article_id: None,
            what_happened: what.to_string(),
            why_matters: why.to_string(),
            market_impact_description: impact.to_string(),
            expected_points_impact: *points,
            confidence_score: *conf,
            created_at: now,
        })
        .collect()
}

/// Classify-and-exclude, substitute fallback if empty, order by score,
/// summarize.
pub fn assemble(raw: Vec<ImpactAnalysis>, now: DateTime<Utc>) -> AssembledFeed {
    let mut kept: Vec<ImpactAnalysis> = raw
        .into_iter()
        .filter(|a| {
            let text = format!(
                "{} {} {}",
                a.what_happened, a.why_matters, a.market_impact_description
            );
            !is_technical(&text)
        })
        .collect();

    let live = !kept.is_empty();
    if !live {
        kept = fallback_analyses(now);
    }

    let mut items: Vec<FeedItem> = kept
        .into_iter()
        .map(|analysis| {
            let priority = scoring::label(analysis.expected_points_impact, analysis.confidence_score);
            let strength = scoring::strength(analysis.expected_points_impact);
            let direction = scoring::direction(analysis.expected_points_impact);
            let priority_score = scoring::score(
                analysis.expected_points_impact,
                analysis.confidence_score,
                analysis.created_at,
                now,
            );
            FeedItem {
                analysis,
                priority,
                strength,
                direction,
                priority_score,
            }
        })
        .collect();

    // Stable sort: ties keep insertion order.
    items.sort_by(|a, b| {
        b.priority_score
            .partial_cmp(&a.priority_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let summary = summarize(&items);
    AssembledFeed { items, summary, live }
}

fn summarize(items: &[FeedItem]) -> FeedSummary {
    let net_impact: f64 = items
        .iter()
        .map(|i| i.analysis.expected_points_impact)
        .sum();
    let bullish_signals = items
        .iter()
        .filter(|i| i.analysis.expected_points_impact > 1.0)
        .count();
    let bearish_signals = items
        .iter()
        .filter(|i| i.analysis.expected_points_impact < -1.0)
        .count();
    let critical_events = items
        .iter()
        .filter(|i| i.analysis.expected_points_impact.abs() >= 2.0)
        .count();
    let avg_confidence = if items.is_empty() {
        0.0
    } else {
        items
            .iter()
            .map(|i| i.analysis.confidence_score as f64)
            .sum::<f64>()
            / items.len() as f64
    };

    FeedSummary {
        net_impact,
        bullish_signals,
        bearish_signals,
        critical_events,
        avg_confidence,
        net_strength: scoring::strength(net_impact),
        net_direction: scoring::direction(net_impact),
    }
}
