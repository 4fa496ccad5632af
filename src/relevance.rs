// src/relevance.rs
//! Relevance gate for raw search results: conjunctive keyword filter,
//! additive freshness scoring, and a first-match-wins category cascade.
//!
//! All matching is case-insensitive substring over the concatenated
//! title + description. The category cascade is an ordered data table, not an
//! if/else chain, so the precedence is visible and testable.

use crate::types::EventCategory;

/// Domain terms: indices, regulators, sectors, corporate actions.
const MARKET_TERMS: &[&str] = &[
    "nifty", "sensex", "bank nifty", "rbi", "sebi", "repo rate", "fii", "dii",
    "rupee", "ipo", "dividend", "buyback", "merger", "acquisition", "stake sale",
    "quarterly results", "earnings", "gdp", "inflation", "monetary policy",
    "banking", "pharma", "auto sector", "it sector", "fmcg", "metal stocks",
    "energy stocks", "bonus issue", "stock split", "fed rate",
];

/// Quality/urgency terms: a result must also read like news, not evergreen copy.
const QUALITY_TERMS: &[&str] = &[
    "breaking", "announced", "announces", "surge", "surges", "crash", "crashes",
    "record high", "record low", "hikes", "cuts", "jumps", "plunges", "rallies",
    "slumps", "alert", "just in", "hits", "beats", "misses", "approves",
    "launches", "today", "update",
];

/// Exclusion set: entertainment/lifestyle/sports noise that search engines
/// return for broad market queries.
const EXCLUDE_TERMS: &[&str] = &[
    "bollywood", "cricket", "celebrity", "movie", "film review", "recipe",
    "fashion", "lifestyle", "horoscope", "travel guide", "football", "tennis",
    "music award", "gossip", "box office",
];

// Recency tiers: only the single highest matching tier is scored.
const ULTRA_FRESH_TERMS: &[&str] = &["just in", "breaking", "minutes ago", "moments ago", "live updates"];
const FRESH_TERMS: &[&str] = &["today", "hours ago", "this morning", "intraday"];
const MODERATE_TERMS: &[&str] = &["yesterday", "this week", "recently"];

// Criticality tiers: all three are additive, not mutually exclusive.
const INDEX_REGULATOR_TERMS: &[&str] = &["nifty", "sensex", "bank nifty", "rbi", "sebi", "repo rate"];
const SECTOR_TERMS: &[&str] = &["banking", "pharma", "auto sector", "it sector", "fmcg", "metal stocks", "energy stocks"];
const VOLATILITY_TERMS: &[&str] = &["crash", "surge", "circuit", "plunge", "selloff", "volatility", "rout"];

const FRESHNESS_BASE: i32 = 50;

/// Ordered category cascade; the first group with a hit wins. "RBI cuts rates,
/// nifty rallies" is Policy because the policy group runs first.
const CATEGORY_RULES: &[(&[&str], EventCategory)] = &[
    (&["rbi", "sebi", "repo rate", "monetary policy", "fed rate", "budget", "gst"], EventCategory::Policy),
    (&["nifty", "sensex", "bank nifty", "index"], EventCategory::IndexMove),
    (&["earnings", "quarterly results", "profit", "revenue", "net loss"], EventCategory::Earnings),
    (&["fii", "dii", "institutional", "block deal", "stake sale"], EventCategory::InstitutionalFlows),
    (&["banking", "pharma", "auto sector", "it sector", "fmcg", "metal stocks", "energy stocks"], EventCategory::Sector),
    (&["rupee", "dollar", "forex", "currency"], EventCategory::Currency),
];

#[derive(Debug, Clone, Copy)]
pub struct RelevanceFilter {
    /// Events scoring at or below this freshness are discarded.
    cutoff: u8,
}

impl RelevanceFilter {
    pub fn new(cutoff: u8) -> Self {
        Self { cutoff }
    }

    pub fn cutoff(&self) -> u8 {
        self.cutoff
    }

    /// Conjunctive gate: at least one market term AND at least one quality
    /// term AND zero exclusion terms.
    pub fn is_relevant(&self, title: &str, description: &str) -> bool {
        let text = lower_joined(title, description);
        contains_any(&text, MARKET_TERMS)
            && contains_any(&text, QUALITY_TERMS)
            && !contains_any(&text, EXCLUDE_TERMS)
    }

    /// Monotonic additive freshness in 0..=100: base 50, plus the single
    /// highest recency tier, plus each matching criticality tier.
    pub fn freshness_score(&self, title: &str, description: &str) -> u8 {
        let text = lower_joined(title, description);
        let mut score = FRESHNESS_BASE;

        if contains_any(&text, ULTRA_FRESH_TERMS) {
            score += 25;
        } else if contains_any(&text, FRESH_TERMS) {
            score += 15;
        } else if contains_any(&text, MODERATE_TERMS) {
            score += 5;
        }

        if contains_any(&text, INDEX_REGULATOR_TERMS) {
            score += 15;
        }
        if contains_any(&text, SECTOR_TERMS) {
            score += 8;
        }
        if contains_any(&text, VOLATILITY_TERMS) {
            score += 10;
        }

        score.clamp(0, 100) as u8
    }

    pub fn categorize(&self, text: &str) -> EventCategory {
        let lowered = text.to_lowercase();
        for (terms, category) in CATEGORY_RULES {
            if contains_any(&lowered, terms) {
                return *category;
            }
        }
        EventCategory::General
    }

    /// Full gate applied by the searcher: relevant AND strictly above the
    /// freshness cutoff.
    pub fn passes(&self, title: &str, description: &str) -> bool {
        self.is_relevant(title, description) && self.freshness_score(title, description) > self.cutoff
    }
}

fn lower_joined(title: &str, description: &str) -> String {
    let mut s = String::with_capacity(title.len() + description.len() + 1);
    s.push_str(title);
    s.push(' ');
    s.push_str(description);
    s.to_lowercase()
}

fn contains_any(haystack: &str, terms: &[&str]) -> bool {
    terms.iter().any(|t| haystack.contains(t))
}
