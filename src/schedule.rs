//! Daily scheduling for the `watch` command.
//!
//! A pass runs immediately on start, then once a day at the configured local
//! wall-clock time. A failed pass is logged and the loop keeps going.

use crate::errors::PersistenceError;
use crate::reconcile::PassOutcome;
use chrono::{Duration as ChronoDuration, Local, NaiveDateTime, NaiveTime};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info};

/// Time from `now` until the next occurrence of `at`.
///
/// Always strictly positive: when `now` is exactly `at`, the next run is a day later.
pub fn until_next(now: NaiveDateTime, at: NaiveTime) -> Duration {
    let mut next = now.date().and_time(at);
    if next <= now {
        next += ChronoDuration::days(1);
    }
    (next - now).to_std().unwrap_or(Duration::from_secs(24 * 60 * 60))
}

/// Parse an `HH:MM` (or `HH:MM:SS`) wall-clock time.
pub fn parse_time_of_day(s: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .map_err(|e| format!("invalid time of day {s:?} (expected HH:MM): {e}"))
}

/// Run `pass` now and then every day at `at`, forever.
pub async fn run_daily<F, Fut>(at: NaiveTime, mut pass: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<PassOutcome, PersistenceError>>,
{
    let mut count = 0u64;
    loop {
        count += 1;
        match pass().await {
            Ok(outcome) => info!(
                pass = count,
                new = outcome.delta.len(),
                skipped = outcome.skipped.len(),
                "Scheduled pass complete"
            ),
            Err(e) => error!(pass = count, error = %e, "Scheduled pass failed"),
        }

        let wait = until_next(Local::now().naive_local(), at);
        info!(next_in_secs = wait.as_secs(), at = %at, "Sleeping until next pass");
        sleep(wait).await;
    }
}
