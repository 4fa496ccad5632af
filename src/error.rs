// src/error.rs
//! Error taxonomy for the ingestion pipeline.
//!
//! Quota exhaustion is deliberately *not* an error: the orchestrator reports
//! it as a successful zero-event cycle. Provider failures are recovered
//! locally (empty candidates, un-enhanced passthrough) and never escape the
//! component that saw them. Only store failures abort a cycle.

use thiserror::Error;

/// Persistence failures. Fatal for the current cycle: the orchestrator
/// fails closed rather than running unmetered external calls.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("store lock poisoned")]
    Poisoned,
}

/// External collaborator failures (search or AI provider). Always recovered
/// locally; surfaced here so callers can log with the right shape.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned status {0}")]
    Status(u16),

    #[error("malformed provider response: {0}")]
    Malformed(String),

    #[error("provider disabled")]
    Disabled,
}

/// Failures that terminate an ingestion cycle.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("store unavailable: {0}")]
    Store(#[from] StoreError),

    /// Single-flight rejection: another cycle is already running.
    #[error("ingestion cycle already in progress")]
    Busy,
}
