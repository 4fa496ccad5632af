// src/types.rs
//! Core data model: transient candidates, persisted rows, and the derived
//! display taxonomies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fetch-aggressiveness mode controlling query breadth and scoring bonuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Intensity {
    Standard,
    High,
    PreMarket,
    PostMarket,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    Policy,
    IndexMove,
    Earnings,
    InstitutionalFlows,
    Sector,
    Currency,
    General,
}

impl EventCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventCategory::Policy => "policy",
            EventCategory::IndexMove => "index_move",
            EventCategory::Earnings => "earnings",
            EventCategory::InstitutionalFlows => "institutional_flows",
            EventCategory::Sector => "sector",
            EventCategory::Currency => "currency",
            EventCategory::General => "general",
        }
    }
}

impl std::str::FromStr for EventCategory {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "policy" => EventCategory::Policy,
            "index_move" => EventCategory::IndexMove,
            "earnings" => EventCategory::Earnings,
            "institutional_flows" => EventCategory::InstitutionalFlows,
            "sector" => EventCategory::Sector,
            "currency" => EventCategory::Currency,
            _ => EventCategory::General,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Negative => "negative",
            Sentiment::Neutral => "neutral",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketImpact {
    High,
    Medium,
    Low,
}

impl MarketImpact {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketImpact::High => "high",
            MarketImpact::Medium => "medium",
            MarketImpact::Low => "low",
        }
    }
}

/// Priority tier derived from (impact magnitude, confidence). Never stored;
/// recomputed per render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PriorityLabel {
    Critical,
    High,
    Medium,
    Low,
}

/// Display bucket for |impact|. Independent of `PriorityLabel` — strength
/// describes magnitude only, priority gates on confidence too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strength {
    Extreme,
    VeryStrong,
    Strong,
    Moderate,
    Weak,
    Minimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Bullish,
    Bearish,
    Neutral,
}

/// A search result that passed relevance/freshness filtering but is not yet
/// persisted. Mutated only by the enhancer (AI fields + confidence bump),
/// then projected into a `NewsArticle` + `ImpactAnalysis` on write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketEvent {
    pub title: String,
    pub description: String,
    pub source: String,
    pub url: Option<String>,
    pub discovered_at: DateTime<Utc>,
    /// 0–100, additive freshness score from the relevance filter.
    pub freshness: u8,
    pub category: EventCategory,
    /// 0–100 self-reported certainty; bumped by successful enhancement.
    pub confidence: u8,
    pub ai_analysis: Option<String>,
    pub market_implications: Option<String>,
}

/// Persisted article row. Immutable once written except retention deletion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsArticle {
    pub id: String,
    pub title: String,
    pub content: String,
    pub summary: String,
    pub sentiment: Sentiment,
    pub market_impact: MarketImpact,
    pub category: EventCategory,
    pub source: String,
    pub url: Option<String>,
    pub companies: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub published_at: DateTime<Utc>,
}

/// Persisted analysis row. `expected_points_impact` and `confidence_score`
/// are the only physical drivers of every derived label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactAnalysis {
    pub id: String,
    pub news_article_id: Option<String>,
    pub what_happened: String,
    pub why_matters: String,
    pub market_impact_description: String,
    /// Signed, roughly in [-3, 3].
    pub expected_points_impact: f64,
    /// 0–100.
    pub confidence_score: u8,
    pub created_at: DateTime<Utc>,
}
