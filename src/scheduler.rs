// src/scheduler.rs
//! Background poll loop. The loop ticks at a fixed cadence and lets the
//! orchestrator's timing strategy decide whether a tick actually fetches, so
//! interval changes across session buckets need no timer re-arming here.

use crate::orchestrator::{CycleRequest, IngestionOrchestrator};
use crate::timing;
use crate::types::Intensity;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Search intensity derived from the exchange clock. Pre/post market windows
/// get their own query banks; the open and close hours search aggressively.
pub fn intensity_for_hour(hour_of_day: f64) -> Intensity {
    if (7.0..9.0).contains(&hour_of_day) {
        Intensity::PreMarket
    } else if (9.0..10.0).contains(&hour_of_day) || (15.0..16.0).contains(&hour_of_day) {
        Intensity::High
    } else if (16.0..18.0).contains(&hour_of_day) {
        Intensity::PostMarket
    } else {
        Intensity::Standard
    }
}

pub fn spawn_scheduler(
    orchestrator: Arc<IngestionOrchestrator>,
    poll_interval_secs: u64,
    tz_offset_minutes: i32,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(poll_interval_secs.max(60)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let hour = timing::market_hour(tz_offset_minutes);
            let req = CycleRequest {
                intensity: intensity_for_hour(hour),
                time_context: None,
                force_refresh: false,
            };
            match orchestrator.run_cycle(req).await {
                Ok(outcome) => {
                    tracing::debug!(
                        target: "scheduler",
                        mode = %outcome.mode,
                        events = outcome.events_processed,
                        "scheduled cycle"
                    );
                }
                Err(crate::error::IngestError::Busy) => {
                    tracing::debug!(target: "scheduler", "cycle already in flight; tick skipped");
                }
                Err(e) => {
                    tracing::error!(target: "scheduler", error = %e, "scheduled cycle failed");
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intensity_tracks_session_windows() {
        assert_eq!(intensity_for_hour(7.5), Intensity::PreMarket);
        assert_eq!(intensity_for_hour(9.0), Intensity::High);
        assert_eq!(intensity_for_hour(15.5), Intensity::High);
        // Mid-session is standard; only open and close hours run hot.
        assert_eq!(intensity_for_hour(12.0), Intensity::Standard);
        assert_eq!(intensity_for_hour(16.5), Intensity::PostMarket);
        assert_eq!(intensity_for_hour(20.0), Intensity::Standard);
        assert_eq!(intensity_for_hour(2.0), Intensity::Standard);
    }

    #[test]
    fn window_edges_are_half_open() {
        assert_eq!(intensity_for_hour(6.99), Intensity::Standard);
        assert_eq!(intensity_for_hour(7.0), Intensity::PreMarket);
        assert_eq!(intensity_for_hour(8.99), Intensity::PreMarket);
        assert_eq!(intensity_for_hour(10.0), Intensity::Standard);
        assert_eq!(intensity_for_hour(16.0), Intensity::PostMarket);
        assert_eq!(intensity_for_hour(18.0), Intensity::Standard);
    }
}
