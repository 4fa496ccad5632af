// src/search.rs
//! Event searcher: issues a bounded number of external queries, normalizes
//! and deduplicates the raw results, gates them through the relevance filter,
//! and ranks the survivors into a candidate pool.
//!
//! Search failure is never an error for the caller: a failed query is logged
//! and skipped, a total failure yields an empty pool and the orchestrator
//! treats that as "no events".

use crate::config::{DedupKind, SearchConfig};
use crate::error::ProviderError;
use crate::relevance::RelevanceFilter;
use crate::types::{Intensity, MarketEvent};
use async_trait::async_trait;
use chrono::Utc;
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Raw hit from the keyword-search provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawResult {
    pub title: String,
    pub snippet: String,
    pub url: Option<String>,
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<RawResult>, ProviderError>;
    fn name(&self) -> &'static str;
}

/// Serper-style JSON search API.
pub struct HttpSearchProvider {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpSearchProvider {
    pub fn new(cfg: &SearchConfig) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("market-pulse/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .expect("reqwest client");
        Self {
            http,
            endpoint: cfg.endpoint.clone(),
            api_key: cfg.api_key.clone(),
        }
    }
}

#[async_trait]
impl SearchProvider for HttpSearchProvider {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<RawResult>, ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::Disabled);
        }

        #[derive(Serialize)]
        struct Req<'a> {
            q: &'a str,
            num: usize,
        }
        #[derive(Deserialize)]
        struct Resp {
            #[serde(default)]
            organic: Vec<Organic>,
        }
        #[derive(Deserialize)]
        struct Organic {
            title: String,
            #[serde(default)]
            snippet: String,
            #[serde(default)]
            link: Option<String>,
        }

        let resp = self
            .http
            .post(&self.endpoint)
            .header("X-API-KEY", &self.api_key)
            .json(&Req { q: query, num: limit })
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(ProviderError::Status(resp.status().as_u16()));
        }
        let body: Resp = resp
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;

        Ok(body
            .organic
            .into_iter()
            .take(limit)
            .map(|o| RawResult {
                title: o.title,
                snippet: o.snippet,
                url: o.link,
            })
            .collect())
    }

    fn name(&self) -> &'static str {
        "http-search"
    }
}

/// Used when no API key is configured: the pipeline still runs, producing
/// empty cycles instead of failing at boot.
pub struct DisabledSearchProvider;

#[async_trait]
impl SearchProvider for DisabledSearchProvider {
    async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<RawResult>, ProviderError> {
        Err(ProviderError::Disabled)
    }
    fn name(&self) -> &'static str {
        "disabled"
    }
}

/// Deduplication key extractor. The default truncated-title key is a known
/// approximation: two distinct stories sharing the same leading 50 chars
/// collide. Acceptable for a noisy feed; swap in `ContentHashDedup` for
/// collision-free keys.
pub trait DedupStrategy: Send + Sync {
    fn key(&self, raw: &RawResult) -> String;
}

pub struct TitlePrefixDedup {
    pub prefix_len: usize,
}

impl DedupStrategy for TitlePrefixDedup {
    fn key(&self, raw: &RawResult) -> String {
        raw.title
            .to_lowercase()
            .chars()
            .take(self.prefix_len)
            .collect()
    }
}

pub struct ContentHashDedup;

impl DedupStrategy for ContentHashDedup {
    fn key(&self, raw: &RawResult) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(raw.title.to_lowercase().as_bytes());
        hasher.update(raw.snippet.to_lowercase().as_bytes());
        let digest = hasher.finalize();
        let mut out = String::with_capacity(32);
        for b in digest.iter().take(16) {
            use std::fmt::Write as _;
            let _ = write!(&mut out, "{:02x}", b);
        }
        out
    }
}

pub fn dedup_for(kind: DedupKind, prefix_len: usize) -> Box<dyn DedupStrategy> {
    match kind {
        DedupKind::TitlePrefix => Box::new(TitlePrefixDedup { prefix_len }),
        DedupKind::ContentHash => Box::new(ContentHashDedup),
    }
}

/// Normalize snippet text: decode HTML entities, strip tags, straighten
/// quotes, collapse whitespace, trim trailing punctuation, cap length.
pub fn normalize_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    static RE_WS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();
    out = out.trim().to_string();

    while let Some(last) = out.chars().last() {
        if matches!(last, '!' | '?' | '.' | ',') {
            out.pop();
        } else {
            break;
        }
    }

    if out.chars().count() > 1500 {
        out = out.chars().take(1500).collect();
    }

    out
}

// Query banks per intensity. At most `max_queries_per_cycle` are issued.
const STANDARD_QUERIES: &[&str] = &[
    "nifty sensex market news today",
    "indian stock market breaking news",
];
const HIGH_QUERIES: &[&str] = &[
    "nifty sensex breaking news market crash surge",
    "rbi sebi announcement market impact today",
];
const PRE_MARKET_QUERIES: &[&str] = &[
    "gift nifty sgx pre market indication today",
    "global markets overnight asian markets cues",
];
const POST_MARKET_QUERIES: &[&str] = &[
    "nifty sensex closing market wrap today",
    "after market corporate announcements results",
];

fn queries_for(intensity: Intensity) -> &'static [&'static str] {
    match intensity {
        Intensity::Standard => STANDARD_QUERIES,
        Intensity::High => HIGH_QUERIES,
        Intensity::PreMarket => PRE_MARKET_QUERIES,
        Intensity::PostMarket => POST_MARKET_QUERIES,
    }
}

const IMPACT_KEYWORDS: &[&str] = &[
    "crash", "surge", "record", "circuit", "plunge", "rally", "emergency",
    "rate cut", "rate hike", "downgrade", "upgrade",
];

const TIME_BONUS_CAP: f64 = 20.0;
const IMPACT_BONUS_CAP: f64 = 30.0;

pub struct EventSearcher {
    provider: Arc<dyn SearchProvider>,
    filter: RelevanceFilter,
    dedup: Box<dyn DedupStrategy>,
    results_per_query: usize,
    max_queries: usize,
    max_candidates: usize,
}

impl EventSearcher {
    pub fn new(
        provider: Arc<dyn SearchProvider>,
        filter: RelevanceFilter,
        dedup: Box<dyn DedupStrategy>,
        cfg: &SearchConfig,
        max_candidates: usize,
    ) -> Self {
        Self {
            provider,
            filter,
            dedup,
            results_per_query: cfg.results_per_query,
            // Bounded to avoid quota blowouts.
            max_queries: cfg.max_queries_per_cycle.min(2),
            max_candidates,
        }
    }

    /// Issue queries, merge, dedup, filter, rank; return the top candidates.
    /// Never errors: partial results on per-query failure, empty on total
    /// failure.
    pub async fn fetch_candidates(&self, intensity: Intensity, hour: f64) -> Vec<MarketEvent> {
        let mut raw = Vec::new();
        for query in queries_for(intensity).iter().take(self.max_queries) {
            match self.provider.search(query, self.results_per_query).await {
                Ok(mut hits) => raw.append(&mut hits),
                Err(e) => {
                    tracing::warn!(
                        target: "search",
                        provider = self.provider.name(),
                        query,
                        error = %e,
                        "search query failed; skipping"
                    );
                    counter!("search_query_errors_total").increment(1);
                }
            }
        }
        counter!("search_raw_results_total").increment(raw.len() as u64);

        // Dedup before filtering so colliding stories cost one relevance pass.
        let mut seen: HashSet<String> = HashSet::new();
        let mut candidates = Vec::with_capacity(raw.len());
        for mut hit in raw {
            hit.title = normalize_text(&hit.title);
            hit.snippet = normalize_text(&hit.snippet);
            if hit.title.is_empty() {
                continue;
            }
            if !seen.insert(self.dedup.key(&hit)) {
                counter!("search_dedup_total").increment(1);
                continue;
            }
            if !self.filter.passes(&hit.title, &hit.snippet) {
                counter!("search_filtered_total").increment(1);
                continue;
            }
            candidates.push(self.to_event(hit));
        }

        // Rank all survivors, then truncate. Stable sort keeps provider order
        // among ties.
        let mut scored: Vec<(f64, MarketEvent)> = candidates
            .into_iter()
            .map(|ev| (composite_score(&ev, intensity, hour), ev))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(self.max_candidates);

        counter!("search_candidates_total").increment(scored.len() as u64);
        scored.into_iter().map(|(_, ev)| ev).collect()
    }

    fn to_event(&self, hit: RawResult) -> MarketEvent {
        let freshness = self.filter.freshness_score(&hit.title, &hit.snippet);
        let category = self
            .filter
            .categorize(&format!("{} {}", hit.title, hit.snippet));
        MarketEvent {
            confidence: initial_confidence(freshness),
            title: hit.title,
            description: hit.snippet,
            source: "web-search".to_string(),
            url: hit.url,
            discovered_at: Utc::now(),
            freshness,
            category,
            ai_analysis: None,
            market_implications: None,
        }
    }
}

/// Search-derived confidence: scales with freshness, well below the 98
/// ceiling so enhancement has headroom.
pub fn initial_confidence(freshness: u8) -> u8 {
    (55 + freshness as u32 / 2).min(90) as u8
}

/// freshness + time-relevance bonus + impact-magnitude bonus, each sub-score
/// separately capped, multiplied by confidence/100.
pub fn composite_score(ev: &MarketEvent, intensity: Intensity, hour: f64) -> f64 {
    let freshness = ev.freshness as f64;
    let time_bonus = time_relevance_bonus(intensity, hour).min(TIME_BONUS_CAP);
    let text = format!("{} {}", ev.title, ev.description).to_lowercase();
    let impact_bonus = impact_magnitude_bonus(&text, intensity).min(IMPACT_BONUS_CAP);
    (freshness + time_bonus + impact_bonus) * (ev.confidence as f64 / 100.0)
}

fn time_relevance_bonus(intensity: Intensity, hour: f64) -> f64 {
    let trading_hours = (9.0..16.0).contains(&hour);
    match intensity {
        Intensity::High => {
            if trading_hours {
                20.0
            } else {
                10.0
            }
        }
        Intensity::PreMarket => {
            if (6.0..9.0).contains(&hour) {
                15.0
            } else {
                5.0
            }
        }
        Intensity::PostMarket => {
            if (16.0..19.0).contains(&hour) {
                15.0
            } else {
                5.0
            }
        }
        Intensity::Standard => {
            if trading_hours {
                10.0
            } else {
                5.0
            }
        }
    }
}

fn impact_magnitude_bonus(text: &str, intensity: Intensity) -> f64 {
    let hits = IMPACT_KEYWORDS.iter().filter(|k| text.contains(*k)).count() as f64;
    let per_hit = if intensity == Intensity::High { 10.0 } else { 7.0 };
    hits * per_hit
}
