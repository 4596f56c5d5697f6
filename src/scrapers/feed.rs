//! Feed scanner for `rss` subscriptions.
//!
//! Reads RSS 2.0 (`<rss><channel><item>`) and Atom (`<feed><entry>`) documents
//! over plain HTTP. Feeds are server-rendered, so no browser is involved.

use crate::errors::ScanError;
use crate::models::{ListingItem, Subscription};
use crate::scrapers::ListingScanner;
use crate::utils::{collapse_whitespace, parse_timestamp, resolve_link};
use serde::Deserialize;
use tracing::{info, instrument, warn};
use url::Url;

#[derive(Debug, Default, Deserialize)]
struct TextNode {
    #[serde(rename = "$text", default)]
    value: String,
}

impl TextNode {
    fn cleaned(&self) -> Option<String> {
        Some(collapse_whitespace([self.value.as_str()])).filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct Rss {
    channel: RssChannel,
}

#[derive(Debug, Deserialize)]
struct RssChannel {
    #[serde(rename = "item", default)]
    items: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
struct RssItem {
    title: Option<TextNode>,
    /// Every `link` child. Feeds often add `<atom:link rel="self"/>` next to
    /// the plain `<link>`, and both arrive under the same field name.
    #[serde(rename = "link", default)]
    links: Vec<TextNode>,
    #[serde(rename = "pubDate")]
    pub_date: Option<TextNode>,
}

impl RssItem {
    /// The first `link` child with text content.
    fn page_link(&self) -> Option<String> {
        self.links.iter().find_map(TextNode::cleaned)
    }
}

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    title: Option<TextNode>,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
    published: Option<TextNode>,
    updated: Option<TextNode>,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: String,
    #[serde(rename = "@rel")]
    rel: Option<String>,
}

impl AtomEntry {
    fn page_link(&self) -> Option<&str> {
        self.links
            .iter()
            .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
            .or_else(|| self.links.first())
            .map(|l| l.href.as_str())
    }
}

/// Scans `rss` subscriptions over HTTP.
#[derive(Debug, Clone)]
pub struct FeedScanner {
    http: reqwest::Client,
}

impl FeedScanner {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

impl ListingScanner for FeedScanner {
    #[instrument(level = "info", skip_all, fields(subscription = %subscription.name, url = %subscription.source_url))]
    async fn scan(&self, subscription: &Subscription) -> Result<Vec<ListingItem>, ScanError> {
        let url = subscription.source_url.as_str();
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!(%status, "Feed request rejected");
            return Err(ScanError::HttpStatus {
                url: url.to_string(),
                status,
            });
        }
        let body = response.text().await?;

        let base = Url::parse(url).map_err(|e| ScanError::Feed {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        let items = parse_feed(&body, &base).map_err(|message| ScanError::Feed {
            url: url.to_string(),
            message,
        })?;
        info!(count = items.len(), "Scanned feed");
        Ok(items)
    }
}

/// Read listing items from an RSS 2.0 or Atom document.
///
/// Entries without a title or link are skipped.
pub fn parse_feed(xml: &str, base: &Url) -> Result<Vec<ListingItem>, String> {
    if let Ok(rss) = quick_xml::de::from_str::<Rss>(xml) {
        return Ok(rss
            .channel
            .items
            .into_iter()
            .filter_map(|item| {
                Some(ListingItem {
                    title: item.title.as_ref()?.cleaned()?,
                    link: resolve_link(base, &item.page_link()?)?,
                    published_at: item
                        .pub_date
                        .as_ref()
                        .and_then(|d| parse_timestamp(&d.value)),
                })
            })
            .collect());
    }

    let feed = quick_xml::de::from_str::<AtomFeed>(xml).map_err(|e| e.to_string())?;
    if !xml.contains("<feed") {
        return Err("document is neither RSS nor Atom".to_string());
    }
    Ok(feed
        .entries
        .into_iter()
        .filter_map(|entry| {
            let published_at = entry
                .published
                .as_ref()
                .or(entry.updated.as_ref())
                .and_then(|d| parse_timestamp(&d.value));
            Some(ListingItem {
                title: entry.title.as_ref()?.cleaned()?,
                link: resolve_link(base, entry.page_link()?)?,
                published_at,
            })
        })
        .collect())
}
