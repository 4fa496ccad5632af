// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod api;
pub mod config;
pub mod enhance;
pub mod error;
pub mod feed;
pub mod metrics;
pub mod orchestrator;
pub mod quota;
pub mod relevance;
pub mod scheduler;
pub mod scoring;
pub mod search;
pub mod store;
pub mod timing;
pub mod types;

// ---- Re-exports for stable public API ----
pub use crate::api::{router, AppState};
pub use crate::error::{IngestError, ProviderError, StoreError};
pub use crate::orchestrator::{ActivitySignal, CycleOutcome, CycleRequest, IngestionOrchestrator};
pub use crate::types::{ImpactAnalysis, Intensity, MarketEvent, NewsArticle, PriorityLabel};
