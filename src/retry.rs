//! Fixed-delay retry around a [`ListingScanner`].
//!
//! Listing pages fail transiently (slow hydration, rate limiting, a WebDriver
//! hiccup), so each scan gets a bounded number of attempts with a fixed pause
//! between them. After the last attempt the error is returned and the caller
//! skips the subscription for this pass.
//!
//! # Retry Strategy
//!
//! - 3 attempts in total
//! - 5 seconds between attempts
//! - every failed attempt is logged with the subscription name and attempt number

use crate::errors::ScanError;
use crate::models::{ListingItem, Subscription};
use crate::scrapers::ListingScanner;
use std::fmt;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{error, instrument, warn};

pub const DEFAULT_SCAN_ATTEMPTS: usize = 3;
pub const DEFAULT_SCAN_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Wrapper that retries any [`ListingScanner`] with a fixed delay.
pub struct RetryScan<T> {
    /// The underlying scanner to wrap.
    inner: T,
    /// Total attempts, including the first.
    max_attempts: usize,
    /// Pause between consecutive attempts.
    delay: Duration,
}

impl<T> RetryScan<T>
where
    T: ListingScanner,
{
    /// Wrap `inner` with `max_attempts` total attempts (at least one).
    ///
    /// # Example
    ///
    /// ```ignore
    /// let scanner = RetryScan::new(site_scanner, 3, Duration::from_secs(5));
    /// ```
    pub fn new(inner: T, max_attempts: usize, delay: Duration) -> Self {
        Self {
            inner,
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn with_defaults(inner: T) -> Self {
        Self::new(inner, DEFAULT_SCAN_ATTEMPTS, DEFAULT_SCAN_RETRY_DELAY)
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

impl<T> fmt::Debug for RetryScan<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryScan")
            .field("max_attempts", &self.max_attempts)
            .field("delay", &self.delay)
            .finish()
    }
}

impl<T> ListingScanner for RetryScan<T>
where
    T: ListingScanner,
{
    #[instrument(level = "info", skip_all, fields(subscription = %subscription.name))]
    async fn scan(&self, subscription: &Subscription) -> Result<Vec<ListingItem>, ScanError> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            attempt += 1;
            let attempt_t0 = Instant::now();
            match self.inner.scan(subscription).await {
                Ok(items) => return Ok(items),
                Err(e) if attempt >= self.max_attempts => {
                    error!(
                        subscription = %subscription.name,
                        url = %subscription.source_url,
                        attempt,
                        max = self.max_attempts,
                        elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
                        error = %e,
                        "scan() exhausted retries"
                    );
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        subscription = %subscription.name,
                        url = %subscription.source_url,
                        attempt,
                        max = self.max_attempts,
                        elapsed_ms_attempt = attempt_t0.elapsed().as_millis() as u64,
                        delay = ?self.delay,
                        error = %e,
                        "scan() attempt failed; retrying"
                    );
                    sleep(self.delay).await;
                }
            }
        }
    }
}
