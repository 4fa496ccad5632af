// src/api.rs
//! HTTP surface: ingest trigger, assembled feed, quota status, health.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::error::IngestError;
use crate::feed::{self, AssembledFeed};
use crate::orchestrator::{ActivitySignal, CycleRequest, IngestionOrchestrator};
use crate::quota::QuotaTracker;
use crate::store::Store;
use crate::types::Intensity;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<IngestionOrchestrator>,
    pub store: Arc<Store>,
    pub quota: Arc<QuotaTracker>,
    pub activity: Arc<ActivitySignal>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/ingest", post(trigger_ingest))
        .route("/api/feed", get(get_feed))
        .route("/api/quota", get(get_quota))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
struct IngestReq {
    #[serde(default)]
    intensity: Option<Intensity>,
    #[serde(default)]
    time_context: Option<u8>,
    #[serde(default)]
    force_refresh: bool,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(status: StatusCode, msg: impl Into<String>) -> Response {
    (status, Json(ErrorBody { error: msg.into() })).into_response()
}

async fn trigger_ingest(
    State(state): State<AppState>,
    body: Option<Json<IngestReq>>,
) -> Response {
    let req = body.map(|Json(b)| b).unwrap_or_default();
    let cycle = CycleRequest {
        intensity: req.intensity.unwrap_or(Intensity::Standard),
        time_context: req.time_context,
        force_refresh: req.force_refresh,
    };
    match state.orchestrator.run_cycle(cycle).await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(IngestError::Busy) => error_response(
            StatusCode::CONFLICT,
            "an ingestion cycle is already in flight",
        ),
        Err(e) => {
            tracing::error!(target: "api", error = %e, "ingest cycle failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

#[derive(Debug, Deserialize)]
struct FeedQuery {
    #[serde(default = "default_feed_limit")]
    limit: usize,
}

fn default_feed_limit() -> usize {
    20
}

/// Reading the feed is the user-activity signal: every hit refreshes the
/// timing strategy's active window.
async fn get_feed(
    State(state): State<AppState>,
    Query(q): Query<FeedQuery>,
) -> Result<Json<AssembledFeed>, Response> {
    state.activity.touch();
    let raw = state
        .store
        .recent_analyses(q.limit.clamp(1, 100))
        .map_err(|e| {
            tracing::error!(target: "api", error = %e, "feed read failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?;
    Ok(Json(feed::assemble(raw, Utc::now())))
}

#[derive(Serialize)]
struct QuotaOut {
    can_proceed: bool,
    used: u32,
    remaining: u32,
    daily_cap: u32,
}

async fn get_quota(State(state): State<AppState>) -> Result<Json<QuotaOut>, Response> {
    let status = state.quota.check_daily_usage().map_err(|e| {
        tracing::error!(target: "api", error = %e, "quota read failed");
        error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;
    Ok(Json(QuotaOut {
        can_proceed: status.can_proceed,
        used: status.used,
        remaining: status.remaining,
        daily_cap: state.quota.daily_cap(),
    }))
}
