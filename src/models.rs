//! Data models for subscriptions, scanned listings and persisted model records.
//!
//! This module defines the core data structures used throughout the application:
//! - [`Subscription`]: A named listing page to monitor
//! - [`ListingItem`]: A raw `(title, link)` handle produced by a scan
//! - [`DetailResult`]: Fields pulled from one model page
//! - [`ModelRecord`]: The unit of persistence, keyed by `(subscription_name, title)`
//! - [`Snapshot`]: Every record ever observed, grouped by subscription
//!
//! Field names serialize in snake_case and match the on-disk snapshot file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// `introduction` value for a record whose detail page could not be fetched.
pub const FETCH_FAILED_MARKER: &str = "[detail fetch failed]";

/// `introduction` value for a record fetched without free-text sections.
pub const NOT_FETCHED_MARKER: &str = "[not fetched]";

/// How a subscription's listing is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionKind {
    /// Client-rendered listing page, scanned through a WebDriver session.
    #[default]
    Html,
    /// RSS 2.0 or Atom feed, fetched over plain HTTP.
    Rss,
}

impl fmt::Display for SubscriptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionKind::Html => f.write_str("html"),
            SubscriptionKind::Rss => f.write_str("rss"),
        }
    }
}

/// A named source listing page to monitor.
///
/// Declared in the configuration file as `{name, url, type}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Subscription {
    /// Unique key across the configuration.
    pub name: String,
    /// The listing page or feed URL.
    #[serde(rename = "url")]
    pub source_url: String,
    #[serde(rename = "type", default)]
    pub kind: SubscriptionKind,
}

/// One entry visible on a listing page after expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingItem {
    /// Key within the owning subscription.
    pub title: String,
    /// Absolute URL of the model page.
    pub link: String,
    /// Timestamp shown on the listing card or feed entry, when present.
    pub published_at: Option<DateTime<Utc>>,
}

/// Popularity counters, normalized from compact text like `"3.72k"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ModelStats {
    pub likes: Option<u64>,
    pub followers: Option<u64>,
}

impl ModelStats {
    pub fn is_empty(&self) -> bool {
        self.likes.is_none() && self.followers.is_none()
    }
}

/// Descriptive sections of a model page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ModelDetail {
    /// Opening paragraph of the model card, or one of the marker constants.
    pub introduction: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub size: Option<String>,
    pub license: Option<String>,
    pub downloads: Option<String>,
}

/// Everything the detail extractor could pull from one model page.
///
/// Produced even when the page fetch fails; see [`DetailResult::failed`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetailResult {
    pub published_at: Option<DateTime<Utc>>,
    pub stats: ModelStats,
    pub detail: ModelDetail,
}

impl DetailResult {
    /// The result returned when the page could not be fetched or parsed.
    pub fn failed() -> Self {
        Self {
            published_at: None,
            stats: ModelStats::default(),
            detail: ModelDetail {
                introduction: Some(FETCH_FAILED_MARKER.to_string()),
                ..ModelDetail::default()
            },
        }
    }

    pub fn is_failure(&self) -> bool {
        self.detail.introduction.as_deref() == Some(FETCH_FAILED_MARKER)
    }
}

/// A model as persisted in the snapshot file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ModelRecord {
    pub title: String,
    pub link: String,
    /// RFC 3339 timestamp on disk; `null` when neither the listing nor the page had one.
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub stats: ModelStats,
    #[serde(default)]
    pub detail: ModelDetail,
    pub subscription_name: String,
}

impl ModelRecord {
    /// Build a record for a newly discovered listing item.
    ///
    /// The page's own publication time wins over the listing card's hint.
    pub fn from_listing(subscription: &Subscription, item: ListingItem, detail: DetailResult) -> Self {
        Self {
            title: item.title,
            link: item.link,
            published_at: detail.published_at.or(item.published_at),
            stats: detail.stats,
            detail: detail.detail,
            subscription_name: subscription.name.clone(),
        }
    }
}

/// Records of one subscription, keyed by title.
pub type RecordCollection = BTreeMap<String, ModelRecord>;

/// The full persisted collection of previously observed records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Snapshot {
    #[serde(default)]
    pub subscriptions: BTreeMap<String, RecordCollection>,
}

impl Snapshot {
    pub fn records(&self, subscription_name: &str) -> Option<&RecordCollection> {
        self.subscriptions.get(subscription_name)
    }

    #[cfg(test)]
    pub fn contains(&self, subscription_name: &str, title: &str) -> bool {
        self.records(subscription_name)
            .is_some_and(|records| records.contains_key(title))
    }

    /// Total number of records across all subscriptions.
    pub fn len(&self) -> usize {
        self.subscriptions.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn alpha() -> Subscription {
        Subscription {
            name: "alpha".to_string(),
            source_url: "https://example.com/alpha".to_string(),
            kind: SubscriptionKind::Html,
        }
    }

    #[test]
    fn test_subscription_reads_config_shape() {
        let json = r#"{"name": "qwen", "url": "https://example.com/Qwen", "type": "rss"}"#;
        let sub: Subscription = serde_json::from_str(json).unwrap();
        assert_eq!(sub.source_url, "https://example.com/Qwen");
        assert_eq!(sub.kind, SubscriptionKind::Rss);
    }

    #[test]
    fn test_subscription_kind_defaults_to_html() {
        let json = r#"{"name": "qwen", "url": "https://example.com/Qwen"}"#;
        let sub: Subscription = serde_json::from_str(json).unwrap();
        assert_eq!(sub.kind, SubscriptionKind::Html);
    }

    #[test]
    fn test_failed_detail_result() {
        let result = DetailResult::failed();
        assert!(result.is_failure());
        assert!(result.stats.is_empty());
        assert!(!DetailResult::default().is_failure());
    }

    #[test]
    fn test_record_prefers_page_timestamp() {
        let card_time = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let page_time = Utc.with_ymd_and_hms(2025, 1, 2, 12, 30, 0).unwrap();
        let item = ListingItem {
            title: "M1".to_string(),
            link: "http://x/1".to_string(),
            published_at: Some(card_time),
        };
        let detail = DetailResult {
            published_at: Some(page_time),
            ..DetailResult::default()
        };

        let record = ModelRecord::from_listing(&alpha(), item.clone(), detail);
        assert_eq!(record.published_at, Some(page_time));
        assert_eq!(record.subscription_name, "alpha");

        let record = ModelRecord::from_listing(&alpha(), item, DetailResult::default());
        assert_eq!(record.published_at, Some(card_time));
    }

    #[test]
    fn test_record_serializes_timestamp_as_iso8601() {
        let record = ModelRecord {
            title: "M1".to_string(),
            link: "http://x/1".to_string(),
            published_at: Some(Utc.with_ymd_and_hms(2025, 5, 6, 14, 30, 0).unwrap()),
            stats: ModelStats {
                likes: Some(3720),
                followers: None,
            },
            detail: ModelDetail::default(),
            subscription_name: "alpha".to_string(),
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"published_at\":\"2025-05-06T14:30:00Z\""));
        assert!(json.contains("\"likes\":3720"));
    }

    #[test]
    fn test_snapshot_lookup() {
        let mut snapshot = Snapshot::default();
        assert!(snapshot.is_empty());
        snapshot
            .subscriptions
            .entry("alpha".to_string())
            .or_default()
            .insert(
                "M1".to_string(),
                ModelRecord::from_listing(
                    &alpha(),
                    ListingItem {
                        title: "M1".to_string(),
                        link: "http://x/1".to_string(),
                        published_at: None,
                    },
                    DetailResult::default(),
                ),
            );
        assert!(snapshot.contains("alpha", "M1"));
        assert!(!snapshot.contains("alpha", "M2"));
        assert!(!snapshot.contains("beta", "M1"));
        assert_eq!(snapshot.len(), 1);
    }
}
