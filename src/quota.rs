// src/quota.rs
//! Daily cap on paid external API calls.
//!
//! The tracker reads a single counter row keyed by (UTC calendar day, api
//! name) through the injected `UsageLedger` port, so tests run without a
//! database. An unreachable ledger fails the whole cycle (fail-closed) rather
//! than silently allowing unmetered calls.

use crate::error::StoreError;
use chrono::{NaiveDate, Utc};
use std::sync::Arc;

/// Persistence port for the usage counter. Implemented by `store::Store`
/// and by in-memory fakes in tests.
pub trait UsageLedger: Send + Sync {
    fn usage_for(&self, date: NaiveDate, api_name: &str) -> Result<u32, StoreError>;
    /// Upsert `search_count = used + delta`. Must never decrement.
    fn record_usage(
        &self,
        date: NaiveDate,
        api_name: &str,
        used: u32,
        delta: u32,
    ) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaStatus {
    pub can_proceed: bool,
    pub used: u32,
    pub remaining: u32,
}

pub struct QuotaTracker {
    ledger: Arc<dyn UsageLedger>,
    api_name: String,
    daily_cap: u32,
}

impl QuotaTracker {
    pub fn new(ledger: Arc<dyn UsageLedger>, api_name: impl Into<String>, daily_cap: u32) -> Self {
        Self {
            ledger,
            api_name: api_name.into(),
            daily_cap,
        }
    }

    pub fn daily_cap(&self) -> u32 {
        self.daily_cap
    }

    pub fn check_daily_usage(&self) -> Result<QuotaStatus, StoreError> {
        self.check_for_date(today_utc())
    }

    pub fn check_for_date(&self, date: NaiveDate) -> Result<QuotaStatus, StoreError> {
        let used = self.ledger.usage_for(date, &self.api_name)?;
        Ok(QuotaStatus {
            can_proceed: used < self.daily_cap,
            used,
            remaining: self.daily_cap.saturating_sub(used),
        })
    }

    pub fn record_usage(&self, used: u32, delta: u32) -> Result<(), StoreError> {
        self.record_for_date(today_utc(), used, delta)
    }

    pub fn record_for_date(&self, date: NaiveDate, used: u32, delta: u32) -> Result<(), StoreError> {
        self.ledger.record_usage(date, &self.api_name, used, delta)
    }
}

fn today_utc() -> NaiveDate {
    Utc::now().date_naive()
}
