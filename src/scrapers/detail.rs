//! Detail extractor for individual model pages.
//!
//! Model pages are server-rendered, so a plain HTTP fetch is enough. Fields are
//! pulled with a declarative map ([`FIELD_RULES`]): each rule names a field, the
//! CSS selectors that may hold it and how to read the matched element. Every
//! field is independent; a rule that matches nothing leaves its field unset.
//!
//! # Embedded Data
//!
//! Pages also carry hydration payloads as JSON in `data-props` attributes.
//! These are read with `serde_json` after the DOM pass and only fill fields
//! the DOM left unset. Payloads that are not valid JSON are ignored.
//!
//! # Failure Marking
//!
//! | Situation | `introduction` | `stats` |
//! |-----------|----------------|---------|
//! | page fetch failed | [`FETCH_FAILED_MARKER`](crate::models::FETCH_FAILED_MARKER) | empty |
//! | `want_full_detail == false` | [`NOT_FETCHED_MARKER`] | parsed |
//! | no introduction on the page | `None` | parsed |

use crate::errors::DetailFetchError;
use crate::models::{DetailResult, NOT_FETCHED_MARKER};
use crate::scrapers::DetailExtractor;
use crate::utils::{collapse_whitespace, parse_compact_number, parse_timestamp, truncate_for_log};
use itertools::Itertools;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    PublishedAt,
    Likes,
    Followers,
    Introduction,
    Tags,
    Size,
    License,
    Downloads,
}

#[derive(Debug, Clone, Copy)]
enum Extract {
    /// Collapsed text of the first match.
    Text,
    /// An attribute of the first match carrying it.
    Attr(&'static str),
    /// Collapsed text of every match, deduplicated.
    AllText,
}

#[derive(Debug)]
struct FieldRule {
    field: Field,
    selector: &'static str,
    extract: Extract,
    /// Skipped unless the caller asked for full detail.
    full_detail_only: bool,
}

const FIELD_RULES: &[FieldRule] = &[
    FieldRule {
        field: Field::PublishedAt,
        selector: "header time[datetime], time[datetime]",
        extract: Extract::Attr("datetime"),
        full_detail_only: false,
    },
    FieldRule {
        field: Field::Likes,
        selector: "[data-field='likes'], .model-likes, button[title='Like'] ~ span",
        extract: Extract::Text,
        full_detail_only: false,
    },
    FieldRule {
        field: Field::Followers,
        selector: "[data-field='followers'], .model-followers, a[href$='/followers'] span",
        extract: Extract::Text,
        full_detail_only: false,
    },
    FieldRule {
        field: Field::Introduction,
        selector: "[data-field='introduction'], .model-card-content p",
        extract: Extract::Text,
        full_detail_only: true,
    },
    FieldRule {
        field: Field::Tags,
        selector: "[data-field='tags'] a, .model-tags a, a.tag",
        extract: Extract::AllText,
        full_detail_only: true,
    },
    FieldRule {
        field: Field::Size,
        selector: "[data-field='model-size'], .model-size",
        extract: Extract::Text,
        full_detail_only: true,
    },
    FieldRule {
        field: Field::License,
        selector: "[data-field='license'], .model-license",
        extract: Extract::Text,
        full_detail_only: true,
    },
    FieldRule {
        field: Field::Downloads,
        selector: "[data-field='downloads'], .model-downloads",
        extract: Extract::Text,
        full_detail_only: false,
    },
];

static COMPILED_RULES: Lazy<Vec<(&'static FieldRule, Selector)>> = Lazy::new(|| {
    FIELD_RULES
        .iter()
        .map(|rule| (rule, Selector::parse(rule.selector).unwrap()))
        .collect()
});

static EMBEDDED_PROPS: Lazy<Selector> = Lazy::new(|| Selector::parse("[data-props]").unwrap());

/// Fetches model pages over HTTP and extracts their fields.
#[derive(Debug, Clone)]
pub struct HttpDetailExtractor {
    http: reqwest::Client,
}

impl HttpDetailExtractor {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    async fn fetch_page(&self, url: &str) -> Result<String, DetailFetchError> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DetailFetchError::HttpStatus { status });
        }
        Ok(response.text().await?)
    }
}

impl DetailExtractor for HttpDetailExtractor {
    #[instrument(level = "info", skip_all, fields(url = %item_url, full = want_full_detail))]
    async fn extract(&self, item_url: &str, want_full_detail: bool) -> DetailResult {
        match self.fetch_page(item_url).await {
            Ok(body) => {
                let result = parse_detail(&body, want_full_detail);
                info!(
                    bytes = body.len(),
                    likes = ?result.stats.likes,
                    tags = result.detail.tags.len(),
                    "Parsed model page"
                );
                result
            }
            Err(e) => {
                warn!(error = %e, "Model page fetch failed; keeping partial record");
                DetailResult::failed()
            }
        }
    }
}

/// Extract every field the page carries.
///
/// Never fails: malformed markup simply matches fewer rules.
pub fn parse_detail(html: &str, want_full_detail: bool) -> DetailResult {
    let document = Html::parse_document(html);
    let mut result = DetailResult::default();

    for (rule, selector) in COMPILED_RULES.iter() {
        if rule.full_detail_only && !want_full_detail {
            continue;
        }
        let values = extract_values(&document, selector, rule.extract);
        if !values.is_empty() {
            apply_field(&mut result, rule.field, values);
        }
    }

    for props in embedded_props(&document) {
        backfill_from_props(&mut result, &props, want_full_detail);
    }

    if !want_full_detail {
        result.detail.introduction = Some(NOT_FETCHED_MARKER.to_string());
    }
    result
}

fn extract_values(document: &Html, selector: &Selector, extract: Extract) -> Vec<String> {
    let mut matches = document.select(selector);
    match extract {
        Extract::Text => matches
            .map(|el| collapse_whitespace(el.text()))
            .find(|t| !t.is_empty())
            .into_iter()
            .collect(),
        Extract::Attr(name) => matches
            .find_map(|el| el.value().attr(name))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .into_iter()
            .collect(),
        Extract::AllText => matches
            .map(|el| collapse_whitespace(el.text()))
            .filter(|t| !t.is_empty())
            .unique()
            .collect(),
    }
}

fn apply_field(result: &mut DetailResult, field: Field, mut values: Vec<String>) {
    let first = values.first().cloned().unwrap_or_default();
    match field {
        Field::PublishedAt => result.published_at = parse_timestamp(&first),
        Field::Likes => result.stats.likes = parse_count(field, &first),
        Field::Followers => result.stats.followers = parse_count(field, &first),
        Field::Introduction => result.detail.introduction = Some(first),
        Field::Tags => result.detail.tags = std::mem::take(&mut values),
        Field::Size => result.detail.size = Some(first),
        Field::License => result.detail.license = Some(first),
        Field::Downloads => result.detail.downloads = Some(first),
    }
}

fn parse_count(field: Field, text: &str) -> Option<u64> {
    let parsed = parse_compact_number(text);
    if parsed.is_none() {
        debug!(?field, text = %truncate_for_log(text, 40), "Unparseable count; leaving unset");
    }
    parsed
}

/// Every `data-props` payload on the page that parses as JSON.
fn embedded_props(document: &Html) -> Vec<Value> {
    document
        .select(&EMBEDDED_PROPS)
        .filter_map(|el| el.value().attr("data-props"))
        .filter_map(|raw| match serde_json::from_str::<Value>(raw) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(error = %e, preview = %truncate_for_log(raw, 80), "Ignoring malformed embedded props");
                None
            }
        })
        .collect()
}

fn first_pointer<'a>(props: &'a Value, pointers: &[&str]) -> Option<&'a Value> {
    pointers
        .iter()
        .find_map(|p| props.pointer(p))
        .filter(|v| !v.is_null())
}

fn value_count(value: &Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(parse_compact_number))
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn backfill_from_props(result: &mut DetailResult, props: &Value, want_full_detail: bool) {
    if result.published_at.is_none() {
        result.published_at = first_pointer(
            props,
            &["/model/createdAt", "/model/lastModified", "/blog/publishedAt"],
        )
        .and_then(Value::as_str)
        .and_then(parse_timestamp);
    }
    if result.stats.likes.is_none() {
        result.stats.likes = first_pointer(props, &["/model/likes", "/likes"]).and_then(value_count);
    }
    if result.stats.followers.is_none() {
        result.stats.followers =
            first_pointer(props, &["/org/numFollowers", "/author/numFollowers"]).and_then(value_count);
    }
    if result.detail.downloads.is_none() {
        result.detail.downloads =
            first_pointer(props, &["/model/downloads", "/downloads"]).and_then(value_text);
    }

    if !want_full_detail {
        return;
    }
    if result.detail.license.is_none() {
        result.detail.license =
            first_pointer(props, &["/model/cardData/license", "/model/license"]).and_then(value_text);
    }
    if result.detail.tags.is_empty() {
        if let Some(tags) = first_pointer(props, &["/model/tags"]).and_then(Value::as_array) {
            result.detail.tags = tags
                .iter()
                .filter_map(value_text)
                .unique()
                .collect();
        }
    }
}
