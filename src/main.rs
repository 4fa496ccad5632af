//! Market intelligence service — binary entrypoint.
//! Boots the Axum HTTP server, wiring the SQLite store, provider clients,
//! the background poll loop, and the Prometheus exporter.
//!
//! See `README.md` for quickstart.

use std::sync::Arc;

use market_pulse::api::{self, AppState};
use market_pulse::config::AppConfig;
use market_pulse::enhance::{
    AnalysisProvider, DisabledAnalysisProvider, IntelligenceEnhancer, OpenAiProvider,
};
use market_pulse::metrics::Metrics;
use market_pulse::orchestrator::{ActivitySignal, IngestionOrchestrator};
use market_pulse::quota::QuotaTracker;
use market_pulse::relevance::RelevanceFilter;
use market_pulse::scheduler;
use market_pulse::search::{
    dedup_for, DisabledSearchProvider, EventSearcher, HttpSearchProvider, SearchProvider,
};
use market_pulse::store::Store;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SEARCH_API_NAME: &str = "web-search";

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("market_pulse=info,ingest=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

fn build_search_provider(cfg: &AppConfig) -> Arc<dyn SearchProvider> {
    if cfg.search.api_key.trim().is_empty() {
        tracing::warn!("no search API key configured; search provider disabled");
        Arc::new(DisabledSearchProvider)
    } else {
        Arc::new(HttpSearchProvider::new(&cfg.search))
    }
}

fn build_analysis_provider(cfg: &AppConfig) -> Arc<dyn AnalysisProvider> {
    if !cfg.ai.enabled || cfg.ai.api_key.trim().is_empty() {
        tracing::warn!("AI analysis disabled; events keep heuristic confidence");
        Arc::new(DisabledAnalysisProvider)
    } else {
        Arc::new(OpenAiProvider::new(
            cfg.ai.api_key.clone(),
            cfg.ai.model.clone(),
            cfg.ai.timeout_secs,
        ))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = AppConfig::load()?;
    tracing::info!(
        cap = cfg.daily_search_cap,
        poll_secs = cfg.poll_interval_secs,
        db = %cfg.db_path,
        "configuration loaded"
    );

    let store = Arc::new(Store::open(&cfg.db_path)?);

    let metrics = Metrics::init(cfg.daily_search_cap, cfg.poll_interval_secs);

    let quota = Arc::new(QuotaTracker::new(
        store.clone(),
        SEARCH_API_NAME,
        cfg.daily_search_cap,
    ));
    let searcher = EventSearcher::new(
        build_search_provider(&cfg),
        RelevanceFilter::new(cfg.freshness_cutoff),
        dedup_for(cfg.search.dedup, cfg.search.dedup_prefix_len),
        &cfg.search,
        cfg.max_candidates,
    );
    let enhancer = IntelligenceEnhancer::new(
        build_analysis_provider(&cfg),
        cfg.enhance_top_n,
        cfg.ai.confidence_bump,
    );
    let activity = Arc::new(ActivitySignal::default());

    let orchestrator = Arc::new(IngestionOrchestrator::new(
        store.clone(),
        QuotaTracker::new(store.clone(), SEARCH_API_NAME, cfg.daily_search_cap),
        searcher,
        enhancer,
        activity.clone(),
        cfg.cycle_quota_cost,
        cfg.retention_days,
        cfg.market_tz_offset_minutes,
    ));

    scheduler::spawn_scheduler(
        orchestrator.clone(),
        cfg.poll_interval_secs,
        cfg.market_tz_offset_minutes,
    );

    let state = AppState {
        orchestrator,
        store,
        quota,
        activity,
    };
    let app = api::router(state).merge(metrics.router());

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    tracing::info!(addr = %cfg.bind_addr, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}
