// src/orchestrator.rs
//! Ingestion orchestrator: the top-level cycle controller.
//!
//! One cycle walks QUOTA_CHECK → (SKIPPED | FETCHING) → ENHANCING →
//! PERSISTING, with retention CLEANUP always running first and a FALLBACK
//! branch that synthesizes placeholder analyses when a forced run fetches
//! nothing. A single-flight guard keeps a force-refresh from running
//! concurrently with a scheduled cycle: the loser is rejected with a busy
//! error, so quota is never double-charged and rows are never double-written.

use crate::enhance::IntelligenceEnhancer;
use crate::error::IngestError;
use crate::feed;
use crate::quota::QuotaTracker;
use crate::search::EventSearcher;
use crate::store::Store;
use crate::timing;
use crate::types::{
    ImpactAnalysis, Intensity, MarketEvent, MarketImpact, NewsArticle, Sentiment,
};
use chrono::{DateTime, Duration, Utc};
use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

/// A feed read within this window counts as "user active" for the timing
/// strategy.
const ACTIVITY_WINDOW_SECS: i64 = 30 * 60;

/// Shared user-activity signal: an atomic last-seen unix timestamp refreshed
/// by feed reads. Explicit process-wide state, created at startup, no module
/// globals.
#[derive(Debug, Default)]
pub struct ActivitySignal(AtomicI64);

impl ActivitySignal {
    pub fn touch(&self) {
        self.0.store(Utc::now().timestamp(), Ordering::Relaxed);
    }

    pub fn active_within_secs(&self, window: i64) -> bool {
        let last = self.0.load(Ordering::Relaxed);
        last > 0 && Utc::now().timestamp() - last <= window
    }

    pub fn is_active(&self) -> bool {
        self.active_within_secs(ACTIVITY_WINDOW_SECS)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CycleRequest {
    pub intensity: Intensity,
    /// Hour 0–23 on the exchange clock; None derives it from wall clock.
    pub time_context: Option<u8>,
    pub force_refresh: bool,
}

/// Cycle result reported to callers and the UI. `mode` distinguishes live
/// data from fallback/placeholder output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CycleOutcome {
    pub success: bool,
    pub events_processed: usize,
    pub searches_used: u32,
    pub remaining_searches: u32,
    pub mode: String,
}

impl CycleOutcome {
    fn new(mode: &str, events: usize, used: u32, remaining: u32) -> Self {
        Self {
            success: true,
            events_processed: events,
            searches_used: used,
            remaining_searches: remaining,
            mode: mode.to_string(),
        }
    }
}

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_cycles_total", "Ingestion cycles started.");
        describe_counter!("ingest_busy_rejections_total", "Cycles rejected by the single-flight guard.");
        describe_counter!("ingest_quota_skips_total", "Cycles skipped because the daily cap was reached.");
        describe_counter!("ingest_throttled_total", "Cycles skipped by the timing strategy.");
        describe_counter!("ingest_events_persisted_total", "Articles persisted from live candidates.");
        describe_counter!("ingest_fallback_cycles_total", "Forced cycles that synthesized placeholder analyses.");
        describe_counter!("ingest_persist_errors_total", "Row writes that failed during persisting.");
        describe_gauge!("ingest_last_cycle_ts", "Unix ts when the last cycle finished.");
    });
}

pub struct IngestionOrchestrator {
    store: Arc<Store>,
    quota: QuotaTracker,
    searcher: EventSearcher,
    enhancer: IntelligenceEnhancer,
    activity: Arc<ActivitySignal>,
    cycle_quota_cost: u32,
    retention_days: i64,
    tz_offset_minutes: i32,
    in_flight: AtomicBool,
    last_fetch: Mutex<Option<DateTime<Utc>>>,
}

impl IngestionOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<Store>,
        quota: QuotaTracker,
        searcher: EventSearcher,
        enhancer: IntelligenceEnhancer,
        activity: Arc<ActivitySignal>,
        cycle_quota_cost: u32,
        retention_days: i64,
        tz_offset_minutes: i32,
    ) -> Self {
        Self {
            store,
            quota,
            searcher,
            enhancer,
            activity,
            cycle_quota_cost,
            retention_days,
            tz_offset_minutes,
            in_flight: AtomicBool::new(false),
            last_fetch: Mutex::new(None),
        }
    }

    pub fn activity(&self) -> Arc<ActivitySignal> {
        self.activity.clone()
    }

    /// Run one ingestion cycle. Quota exhaustion and timing throttles are
    /// successful zero-event outcomes; only store failures and single-flight
    /// rejection are errors.
    pub async fn run_cycle(&self, req: CycleRequest) -> Result<CycleOutcome, IngestError> {
        ensure_metrics_described();

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            counter!("ingest_busy_rejections_total").increment(1);
            return Err(IngestError::Busy);
        }
        let _guard = FlightGuard(&self.in_flight);
        counter!("ingest_cycles_total").increment(1);

        let now = Utc::now();

        // CLEANUP runs unconditionally at the start of every cycle.
        let cutoff = now - Duration::days(self.retention_days);
        let (articles_dropped, analyses_dropped) = self.store.delete_older_than(cutoff)?;
        if articles_dropped + analyses_dropped > 0 {
            tracing::info!(
                target: "ingest",
                articles = articles_dropped,
                analyses = analyses_dropped,
                "retention cleanup"
            );
        }

        // QUOTA_CHECK: hard ceiling. Force bypasses timing, never quota.
        let status = self.quota.check_daily_usage()?;
        if !status.can_proceed {
            counter!("ingest_quota_skips_total").increment(1);
            tracing::info!(target: "ingest", used = status.used, "daily quota exhausted; skipping");
            return Ok(CycleOutcome::new("quota_exceeded", 0, status.used, 0));
        }

        let hour = req
            .time_context
            .map(|h| h.min(23) as f64)
            .unwrap_or_else(|| timing::market_hour(self.tz_offset_minutes));
        let user_active = self.activity.is_active();

        // Soft throttle: skipped entirely on forced runs.
        if !req.force_refresh {
            let since_last_ms = {
                let last = self.last_fetch.lock().map_err(|_| {
                    IngestError::Store(crate::error::StoreError::Poisoned)
                })?;
                last.map(|t| (now - t).num_milliseconds().max(0) as u64)
            };
            if !timing::should_fetch(hour, user_active, since_last_ms) {
                counter!("ingest_throttled_total").increment(1);
                tracing::debug!(
                    target: "ingest",
                    bucket = timing::bucket_name(hour),
                    user_active,
                    "throttled by timing strategy"
                );
                return Ok(CycleOutcome::new(
                    "throttled",
                    0,
                    status.used,
                    status.remaining,
                ));
            }
        }

        // FETCHING.
        let candidates = self.searcher.fetch_candidates(req.intensity, hour).await;
        let used_after = status.used + self.cycle_quota_cost;
        let remaining_after = self.quota.daily_cap().saturating_sub(used_after);

        if candidates.is_empty() {
            // Forced runs synthesize placeholders instead of persisting
            // nothing; scheduled runs just report an empty cycle.
            if req.force_refresh {
                let placeholders = feed::fallback_analyses(now);
                let mut written = 0usize;
                for analysis in &placeholders {
                    match self.store.insert_analysis(analysis) {
                        Ok(()) => written += 1,
                        Err(e) => {
                            counter!("ingest_persist_errors_total").increment(1);
                            tracing::warn!(target: "ingest", error = %e, "placeholder write failed");
                        }
                    }
                }
                counter!("ingest_fallback_cycles_total").increment(1);
                self.charge_and_stamp(status.used, now)?;
                gauge!("ingest_last_cycle_ts").set(now.timestamp() as f64);
                return Ok(CycleOutcome::new(
                    "fallback",
                    written,
                    used_after,
                    remaining_after,
                ));
            }
            self.charge_and_stamp(status.used, now)?;
            gauge!("ingest_last_cycle_ts").set(now.timestamp() as f64);
            return Ok(CycleOutcome::new("empty", 0, used_after, remaining_after));
        }

        // ENHANCING: per-candidate success/failure is independent.
        let enhanced = self.enhancer.enhance(candidates).await;

        // PERSISTING: one article + one analysis per candidate. An analysis
        // write failure never rolls back its article.
        let mut persisted = 0usize;
        for event in &enhanced {
            let article = project_article(event, now);
            if let Err(e) = self.store.insert_article(&article) {
                counter!("ingest_persist_errors_total").increment(1);
                tracing::warn!(target: "ingest", title = %event.title, error = %e, "article write failed");
                continue;
            }
            persisted += 1;
            counter!("ingest_events_persisted_total").increment(1);

            let analysis = project_analysis(event, &article.id, now);
            if let Err(e) = self.store.insert_analysis(&analysis) {
                counter!("ingest_persist_errors_total").increment(1);
                tracing::warn!(target: "ingest", title = %event.title, error = %e, "analysis write failed; article kept");
            }
        }

        // Flat cost model: charged once per cycle that fetched, not per call.
        self.charge_and_stamp(status.used, now)?;
        gauge!("ingest_last_cycle_ts").set(now.timestamp() as f64);

        tracing::info!(
            target: "ingest",
            persisted,
            intensity = ?req.intensity,
            forced = req.force_refresh,
            "cycle complete"
        );
        Ok(CycleOutcome::new(
            "live",
            persisted,
            used_after,
            remaining_after,
        ))
    }

    fn charge_and_stamp(&self, used_before: u32, now: DateTime<Utc>) -> Result<(), IngestError> {
        self.quota.record_usage(used_before, self.cycle_quota_cost)?;
        if let Ok(mut last) = self.last_fetch.lock() {
            *last = Some(now);
        }
        Ok(())
    }
}

struct FlightGuard<'a>(&'a AtomicBool);

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// Ordered sentiment cascade; first group with a hit wins.
const SENTIMENT_RULES: &[(&[&str], Sentiment)] = &[
    (
        &["surge", "rally", "record high", "beats", "jumps", "rate cut", "approves", "upgrade", "gains"],
        Sentiment::Positive,
    ),
    (
        &["crash", "plunge", "record low", "misses", "slumps", "selloff", "downgrade", "falls", "rate hike"],
        Sentiment::Negative,
    ),
];

pub fn detect_sentiment(text: &str) -> Sentiment {
    let lowered = text.to_lowercase();
    for (terms, sentiment) in SENTIMENT_RULES {
        if terms.iter().any(|t| lowered.contains(t)) {
            return *sentiment;
        }
    }
    Sentiment::Neutral
}

/// Signed impact estimate for a candidate. Magnitude scales with freshness
/// into the feed's [-3, 3] band; neutral stories are damped toward zero.
pub fn estimate_points_impact(event: &MarketEvent) -> f64 {
    let text = format!("{} {}", event.title, event.description);
    let magnitude = (event.freshness as f64 / 33.0).clamp(0.4, 3.0);
    match detect_sentiment(&text) {
        Sentiment::Positive => magnitude,
        Sentiment::Negative => -magnitude,
        Sentiment::Neutral => magnitude * 0.25,
    }
}

const KNOWN_COMPANIES: &[&str] = &[
    "Reliance", "TCS", "HDFC Bank", "Infosys", "ICICI Bank", "SBI",
    "Tata Motors", "Adani", "Bharti Airtel", "Wipro", "L&T",
];

fn extract_companies(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    KNOWN_COMPANIES
        .iter()
        .filter(|c| lowered.contains(&c.to_lowercase()))
        .map(|c| c.to_string())
        .collect()
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Project a candidate into its persisted article row.
pub fn project_article(event: &MarketEvent, now: DateTime<Utc>) -> NewsArticle {
    let text = format!("{} {}", event.title, event.description);
    let points = estimate_points_impact(event);
    let market_impact = if points.abs() >= 2.0 {
        MarketImpact::High
    } else if points.abs() >= 1.0 {
        MarketImpact::Medium
    } else {
        MarketImpact::Low
    };

    NewsArticle {
        id: uuid::Uuid::new_v4().to_string(),
        title: event.title.clone(),
        content: event.description.clone(),
        summary: truncate_chars(&event.description, 160),
        sentiment: detect_sentiment(&text),
        market_impact,
        category: event.category,
        source: event.source.clone(),
        url: event.url.clone(),
        companies: extract_companies(&text),
        created_at: now,
        published_at: event.discovered_at,
    }
}

/// Project a candidate into its analysis row. AI sections are used when the
/// enhancer produced them; otherwise generic text derived from the candidate.
pub fn project_analysis(event: &MarketEvent, article_id: &str, now: DateTime<Utc>) -> ImpactAnalysis {
    let why = event
        .ai_analysis
        .clone()
        .unwrap_or_else(|| truncate_chars(&event.description, 200));
    let impact_desc = event.market_implications.clone().unwrap_or_else(|| {
        format!("Potential {} market reaction", event.category.as_str())
    });
    ImpactAnalysis {
        id: uuid::Uuid::new_v4().to_string(),
        news_article_id: Some(article_id.to_string()),
        what_happened: event.title.clone(),
        why_matters: why,
        market_impact_description: impact_desc,
        expected_points_impact: estimate_points_impact(event),
        confidence_score: event.confidence,
        created_at: now,
    }
}
