//! Scrapers for listing pages, feeds and model detail pages.
//!
//! Scraping follows a two-phase pattern:
//!
//! 1. **Scanning**: Discover `(title, link)` handles on a subscription's listing
//! 2. **Extraction**: Fetch and parse a single model page into structured fields
//!
//! # Submodules
//!
//! | Module | Kind | Method |
//! |--------|------|--------|
//! | [`listing`] | `html` subscriptions | WebDriver session, expands the listing, parses the rendered DOM |
//! | [`feed`] | `rss` subscriptions | Plain HTTP fetch of an RSS 2.0 or Atom feed |
//! | [`detail`] | model pages | Plain HTTP fetch, declarative field map, embedded JSON fallback |
//! | [`browser`] | | Scoped WebDriver session handle |
//!
//! The reconciler only sees the [`ListingScanner`] and [`DetailExtractor`]
//! traits, so tests drive it with in-memory fakes.

pub mod browser;
pub mod detail;
pub mod feed;
pub mod listing;

use crate::errors::ScanError;
use crate::models::{DetailResult, ListingItem, Subscription, SubscriptionKind};
use std::time::Duration;

pub use detail::HttpDetailExtractor;
pub use feed::FeedScanner;
pub use listing::BrowserScanner;

const USER_AGENT: &str = concat!("model_watch/", env!("CARGO_PKG_VERSION"));

/// Produces the items currently visible on a subscription's listing.
pub trait ListingScanner {
    /// Scan the listing once.
    ///
    /// # Errors
    ///
    /// [`ScanError`] when the page is unreachable or its item container never
    /// appears. Callers decide whether to retry.
    async fn scan(&self, subscription: &Subscription) -> Result<Vec<ListingItem>, ScanError>;
}

/// Turns one model page into structured fields.
pub trait DetailExtractor {
    /// Extract fields from the page at `item_url`.
    ///
    /// Never fails: fetch or parse problems are logged and reported through
    /// [`DetailResult::failed`]. With `want_full_detail == false` the free-text
    /// sections are skipped.
    async fn extract(&self, item_url: &str, want_full_detail: bool) -> DetailResult;
}

/// Routes each subscription to the scanner for its kind.
#[derive(Debug)]
pub struct SiteScanner {
    pub browser: BrowserScanner,
    pub feed: FeedScanner,
}

impl ListingScanner for SiteScanner {
    async fn scan(&self, subscription: &Subscription) -> Result<Vec<ListingItem>, ScanError> {
        match subscription.kind {
            SubscriptionKind::Html => self.browser.scan(subscription).await,
            SubscriptionKind::Rss => self.feed.scan(subscription).await,
        }
    }
}

/// Shared HTTP client for feed and detail fetches.
pub fn http_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(30))
        .build()
}
