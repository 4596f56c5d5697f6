//! Listing scanner for client-rendered subscription pages.
//!
//! Listing pages build their model cards in the browser and reveal the full
//! list only after an "Expand" / "Show more" control is clicked, so a static
//! fetch sees a partial list. The scanner therefore drives a WebDriver
//! session:
//!
//! 1. Navigate to the subscription URL
//! 2. Wait (bounded) for the item container
//! 3. Click the expand control if there is one, then wait for more cards
//! 4. Read the rendered DOM and collect `(title, link)` per card
//!
//! # Card Shape
//!
//! ```html
//! <main>
//!   <article>
//!     <a href="/Qwen/Qwen2.5-7B-Instruct">
//!       <h4>Qwen/Qwen2.5-7B-Instruct</h4>
//!       <time datetime="2024-09-25T12:00:00.000Z">Sep 25</time>
//!     </a>
//!   </article>
//! </main>
//! ```

use crate::config::BrowserSettings;
use crate::errors::ScanError;
use crate::models::{ListingItem, Subscription};
use crate::scrapers::ListingScanner;
use crate::scrapers::browser::{BrowserSession, with_session};
use crate::utils::{collapse_whitespace, parse_timestamp, resolve_link};
use fantoccini::{Client, Locator};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, instrument, warn};
use url::Url;

const CONTAINER_SELECTOR: &str = "main";
const ITEM_SELECTOR: &str = "main article";
const EXPAND_CONTROL_XPATH: &str = "//main//button[contains(normalize-space(.), 'Expand') or contains(normalize-space(.), 'Show more')]";
const EXPAND_POLL: Duration = Duration::from_millis(500);

static CONTAINER: Lazy<Selector> = Lazy::new(|| Selector::parse(CONTAINER_SELECTOR).unwrap());
static CARD: Lazy<Selector> = Lazy::new(|| Selector::parse("article").unwrap());
static CARD_LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());
static CARD_TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("h4, h3, h2").unwrap());
static CARD_TIME: Lazy<Selector> = Lazy::new(|| Selector::parse("time[datetime]").unwrap());

/// Scans `html` subscriptions through a WebDriver session.
#[derive(Debug, Clone)]
pub struct BrowserScanner {
    settings: BrowserSettings,
}

impl BrowserScanner {
    pub fn new(settings: BrowserSettings) -> Self {
        Self { settings }
    }

    fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.settings.wait_timeout_secs)
    }

    async fn scan_in(
        &self,
        session: &BrowserSession,
        subscription: &Subscription,
    ) -> Result<Vec<ListingItem>, ScanError> {
        let client = session.client();
        let url = subscription.source_url.as_str();
        let base = Url::parse(url).map_err(|e| ScanError::Navigation {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        client.goto(url).await.map_err(|e| ScanError::Navigation {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        let container_missing = || ScanError::ContainerMissing {
            url: url.to_string(),
            selector: CONTAINER_SELECTOR.to_string(),
            timeout_secs: self.settings.wait_timeout_secs,
        };
        client
            .wait()
            .at_most(self.wait_timeout())
            .for_element(Locator::Css(CONTAINER_SELECTOR))
            .await
            .map_err(|_| container_missing())?;

        self.expand(client, url).await?;

        let html = client.source().await.map_err(|e| ScanError::Source {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        parse_listing(&html, &base).ok_or_else(container_missing)
    }

    /// Click the expand control, if present, and wait for the card count to grow.
    ///
    /// A missing control is not an error: short listings render in full.
    async fn expand(&self, client: &Client, url: &str) -> Result<(), ScanError> {
        let expand_err = |e: fantoccini::error::CmdError| ScanError::Expand {
            url: url.to_string(),
            message: e.to_string(),
        };

        let controls = client
            .find_all(Locator::XPath(EXPAND_CONTROL_XPATH))
            .await
            .map_err(expand_err)?;
        let Some(control) = controls.into_iter().next() else {
            debug!("No expand control on listing");
            return Ok(());
        };

        let before = item_count(client).await.map_err(expand_err)?;
        control.click().await.map_err(expand_err)?;

        let deadline = Instant::now() + self.wait_timeout();
        loop {
            sleep(EXPAND_POLL).await;
            let after = item_count(client).await.map_err(expand_err)?;
            if after > before {
                info!(before, after, "Listing expanded");
                return Ok(());
            }
            if Instant::now() >= deadline {
                warn!(
                    before,
                    timeout_secs = self.settings.wait_timeout_secs,
                    "Listing did not grow after expand; keeping what rendered"
                );
                return Ok(());
            }
        }
    }
}

async fn item_count(client: &Client) -> Result<usize, fantoccini::error::CmdError> {
    Ok(client.find_all(Locator::Css(ITEM_SELECTOR)).await?.len())
}

impl ListingScanner for BrowserScanner {
    #[instrument(level = "info", skip_all, fields(subscription = %subscription.name, url = %subscription.source_url))]
    async fn scan(&self, subscription: &Subscription) -> Result<Vec<ListingItem>, ScanError> {
        let session = BrowserSession::open(&self.settings).await?;
        let result = with_session(session, async |session: &BrowserSession| {
            self.scan_in(session, subscription).await
        })
        .await;

        match &result {
            Ok(items) => info!(count = items.len(), "Scanned listing"),
            Err(e) => warn!(error = %e, "Listing scan failed"),
        }
        result
    }
}

/// Collect listing items from a rendered listing page.
///
/// # Returns
///
/// `None` when the page has no item container at all; an empty list when the
/// container is there but holds no usable cards. Cards without a title or a
/// resolvable link are skipped.
pub fn parse_listing(html: &str, base: &Url) -> Option<Vec<ListingItem>> {
    let document = Html::parse_document(html);
    let container = document.select(&CONTAINER).next()?;

    let items = container
        .select(&CARD)
        .filter_map(|card| parse_card(card, base))
        .collect::<Vec<_>>();
    debug!(count = items.len(), "Parsed listing cards");
    Some(items)
}

fn parse_card(card: ElementRef<'_>, base: &Url) -> Option<ListingItem> {
    let anchor = card.select(&CARD_LINK).next()?;
    let link = resolve_link(base, anchor.value().attr("href")?)?;

    let title = card
        .select(&CARD_TITLE)
        .next()
        .map(|h| collapse_whitespace(h.text()))
        .filter(|t| !t.is_empty())
        .or_else(|| anchor.value().attr("title").map(|t| t.trim().to_string()))
        .filter(|t| !t.is_empty())?;

    let published_at = card
        .select(&CARD_TIME)
        .next()
        .and_then(|t| t.value().attr("datetime"))
        .and_then(parse_timestamp);

    Some(ListingItem {
        title,
        link,
        published_at,
    })
}
