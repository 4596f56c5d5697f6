//! Human-readable renderings of a delta.
//!
//! - [`render_summary`]: plain per-model block printed by the `run` command
//! - [`render_markdown`]: Markdown report grouped by subscription, used as the
//!   Slack message
//! - [`render_html`]: "LLM Updates" HTML list, used as the email body

use crate::models::{FETCH_FAILED_MARKER, ModelRecord, NOT_FETCHED_MARKER};
use crate::utils::truncate_for_log;
use itertools::Itertools;
use minijinja::{Environment, context};
use serde::Serialize;
use std::fmt::Write;

// The `.html` name turns on minijinja's HTML auto-escaping.
const HTML_TEMPLATE_NAME: &str = "updates.html";
const HTML_TEMPLATE: &str = r#"<h1>LLM Updates</h1>
<ul>
{%- for row in rows %}
  <li><a href="{{ row.link }}">{{ row.title }}</a> ({{ row.subscription }}): published {{ row.published }}, likes {{ row.likes }}, followers {{ row.followers }}</li>
{%- endfor %}
</ul>
"#;

#[derive(Serialize)]
struct HtmlRow<'a> {
    title: &'a str,
    link: &'a str,
    subscription: &'a str,
    published: String,
    likes: String,
    followers: String,
}

fn or_na<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "N/A".to_string())
}

fn published(record: &ModelRecord) -> String {
    record
        .published_at
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "unknown".to_string())
}

/// The introduction worth showing, skipping the marker values.
fn introduction(record: &ModelRecord) -> Option<&str> {
    record
        .detail
        .introduction
        .as_deref()
        .filter(|i| *i != FETCH_FAILED_MARKER && *i != NOT_FETCHED_MARKER)
}

/// Plain-text summary, one block per model.
///
/// # Output
///
/// ```text
/// === New Models Found (1) ===
///
/// Title: Qwen/Qwen2.5-7B
/// Subscription: qwen
/// Link: https://huggingface.co/Qwen/Qwen2.5-7B
/// Time: 2024-09-25T12:00:00+00:00
/// Likes: 3720
/// Followers: N/A
/// ```
pub fn render_summary(delta: &[ModelRecord]) -> String {
    if delta.is_empty() {
        return "No new models found.\n".to_string();
    }

    let mut out = String::new();
    writeln!(out, "=== New Models Found ({}) ===", delta.len()).unwrap();
    for record in delta {
        writeln!(out).unwrap();
        writeln!(out, "Title: {}", record.title).unwrap();
        writeln!(out, "Subscription: {}", record.subscription_name).unwrap();
        writeln!(out, "Link: {}", record.link).unwrap();
        writeln!(out, "Time: {}", published(record)).unwrap();
        writeln!(out, "Likes: {}", or_na(record.stats.likes)).unwrap();
        writeln!(out, "Followers: {}", or_na(record.stats.followers)).unwrap();
        if record.detail.introduction.as_deref() == Some(FETCH_FAILED_MARKER) {
            writeln!(out, "Detail: fetch failed").unwrap();
        }
    }
    out
}

/// Markdown report grouped by subscription, in delta order.
pub fn render_markdown(delta: &[ModelRecord]) -> String {
    let mut md = String::new();
    writeln!(md, "# New models ({})\n", delta.len()).unwrap();
    if delta.is_empty() {
        writeln!(md, "Nothing new since the last check.").unwrap();
        return md;
    }

    // chunk_by keeps delta order; the reconciler emits each subscription contiguously.
    for (subscription, records) in &delta.iter().chunk_by(|r| r.subscription_name.clone()) {
        writeln!(md, "## {}\n", subscription).unwrap();
        for record in records {
            writeln!(md, "- [{}]({})", record.title, record.link).unwrap();
            writeln!(
                md,
                "  - published: {} | likes: {} | followers: {}",
                published(record),
                or_na(record.stats.likes),
                or_na(record.stats.followers)
            )
            .unwrap();

            let facts = [
                ("size", record.detail.size.as_deref()),
                ("license", record.detail.license.as_deref()),
                ("downloads", record.detail.downloads.as_deref()),
            ]
            .into_iter()
            .filter_map(|(label, value)| value.map(|v| format!("{label}: {v}")))
            .join(" | ");
            if !facts.is_empty() {
                writeln!(md, "  - {}", facts).unwrap();
            }
            if !record.detail.tags.is_empty() {
                let tags = record.detail.tags.iter().map(|t| format!("`{t}`")).join(" ");
                writeln!(md, "  - tags: {}", tags).unwrap();
            }
            if let Some(intro) = introduction(record) {
                writeln!(md, "  > {}", truncate_for_log(intro, 400)).unwrap();
            }
        }
        writeln!(md).unwrap();
    }
    md
}

/// HTML list of the delta, one `<li>` per model. Field values are escaped.
pub fn render_html(delta: &[ModelRecord]) -> Result<String, minijinja::Error> {
    let mut env = Environment::new();
    env.add_template(HTML_TEMPLATE_NAME, HTML_TEMPLATE)?;
    let rows: Vec<HtmlRow> = delta
        .iter()
        .map(|record| HtmlRow {
            title: &record.title,
            link: &record.link,
            subscription: &record.subscription_name,
            published: published(record),
            likes: or_na(record.stats.likes),
            followers: or_na(record.stats.followers),
        })
        .collect();
    env.get_template(HTML_TEMPLATE_NAME)?
        .render(context! { rows => rows })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ModelDetail, ModelStats};
    use chrono::{TimeZone, Utc};

    fn record(sub: &str, title: &str) -> ModelRecord {
        ModelRecord {
            title: title.to_string(),
            link: format!("https://huggingface.co/{title}"),
            published_at: Some(Utc.with_ymd_and_hms(2024, 9, 25, 12, 0, 0).unwrap()),
            stats: ModelStats {
                likes: Some(3720),
                followers: None,
            },
            detail: ModelDetail {
                introduction: Some("An instruction-tuned model.".to_string()),
                tags: vec!["text-generation".to_string()],
                size: Some("7.62B params".to_string()),
                license: None,
                downloads: Some("1.2M".to_string()),
            },
            subscription_name: sub.to_string(),
        }
    }

    #[test]
    fn test_summary_empty() {
        assert_eq!(render_summary(&[]), "No new models found.\n");
    }

    #[test]
    fn test_summary_lists_each_model() {
        let out = render_summary(&[record("qwen", "Qwen/A"), record("qwen", "Qwen/B")]);
        assert!(out.starts_with("=== New Models Found (2) ==="));
        assert!(out.contains("Title: Qwen/A"));
        assert!(out.contains("Link: https://huggingface.co/Qwen/B"));
        assert!(out.contains("Time: 2024-09-25T12:00:00+00:00"));
        assert!(out.contains("Likes: 3720"));
        assert!(out.contains("Followers: N/A"));
    }

    #[test]
    fn test_summary_flags_failed_detail() {
        let mut failed = record("qwen", "Qwen/A");
        failed.detail.introduction = Some(FETCH_FAILED_MARKER.to_string());
        assert!(render_summary(&[failed]).contains("Detail: fetch failed"));
    }

    #[test]
    fn test_markdown_groups_by_subscription() {
        let md = render_markdown(&[
            record("qwen", "Qwen/A"),
            record("qwen", "Qwen/B"),
            record("meta", "meta/C"),
        ]);
        assert!(md.starts_with("# New models (3)"));
        let qwen = md.find("## qwen").unwrap();
        let meta = md.find("## meta").unwrap();
        assert!(qwen < meta);
        assert!(md.contains("- [Qwen/A](https://huggingface.co/Qwen/A)"));
        assert!(md.contains("size: 7.62B params | downloads: 1.2M"));
        assert!(md.contains("tags: `text-generation`"));
        assert!(md.contains("> An instruction-tuned model."));
    }

    #[test]
    fn test_markdown_hides_markers() {
        let mut r = record("qwen", "Qwen/A");
        r.detail.introduction = Some(NOT_FETCHED_MARKER.to_string());
        assert!(!render_markdown(&[r]).contains(NOT_FETCHED_MARKER));
    }

    #[test]
    fn test_html_lists_each_model() {
        let html = render_html(&[record("qwen", "Qwen/A"), record("meta", "meta/C")]).unwrap();
        assert!(html.starts_with("<h1>LLM Updates</h1>"));
        assert_eq!(html.matches("<li>").count(), 2);
        assert!(html.contains("</a> (qwen): published 2024-09-25T12:00:00+00:00"));
        assert!(html.contains("</a> (meta)"));
        assert!(html.contains("likes 3720, followers N/A"));
    }

    #[test]
    fn test_html_escapes_page_text() {
        let html = render_html(&[record("qwen", "<script>alert(1)</script>")]).unwrap();
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn test_html_empty_delta() {
        let html = render_html(&[]).unwrap();
        assert!(html.contains("<ul>"));
        assert!(!html.contains("<li>"));
    }
}
