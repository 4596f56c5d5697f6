//! Text helpers shared by the scrapers and the report renderer.
//!
//! - Compact number normalization (`"3.72k"` → `3720`)
//! - Whitespace collapsing for scraped element text
//! - Link resolution against a page URL
//! - Timestamp parsing for the formats listing pages and feeds use
//! - String truncation for log fields

use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

static COMPACT_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+(?:\.\d+)?)\s*([kKmM]?)$").unwrap());

/// Normalize a human-compact count to a plain number.
///
/// A trailing `k`/`K` multiplies by 1000 and `m`/`M` by 1 000 000; anything
/// else must be a plain decimal. Thousands separators and surrounding
/// whitespace are ignored. Fractions are rounded to the nearest integer.
///
/// # Returns
///
/// `None` for text that is not a count, so the caller can leave the field unset.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(parse_compact_number("3.72k"), Some(3720));
/// assert_eq!(parse_compact_number("50"), Some(50));
/// assert_eq!(parse_compact_number("abc"), None);
/// ```
pub fn parse_compact_number(text: &str) -> Option<u64> {
    let cleaned: String = text.trim().chars().filter(|c| *c != ',').collect();
    let caps = COMPACT_NUMBER.captures(&cleaned)?;
    let value: f64 = caps[1].parse().ok()?;
    let multiplier = match &caps[2] {
        "k" | "K" => 1_000.0,
        "m" | "M" => 1_000_000.0,
        _ => 1.0,
    };
    let scaled = (value * multiplier).round();
    if scaled.is_finite() && scaled <= u64::MAX as f64 {
        Some(scaled as u64)
    } else {
        None
    }
}

/// Join text fragments and collapse runs of whitespace to single spaces.
pub fn collapse_whitespace<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    parts
        .into_iter()
        .flat_map(|part| part.split_whitespace())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Resolve `href` against the page it was found on.
///
/// Fragment-only and `javascript:` links are not model pages and yield `None`.
pub fn resolve_link(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
        return None;
    }
    base.join(href).ok().map(|u| u.to_string())
}

/// Parse a timestamp as found in `datetime` attributes, feeds or embedded JSON.
///
/// Accepts RFC 3339 (`2024-09-25T12:00:00.000Z`), RFC 2822
/// (`Wed, 25 Sep 2024 12:00:00 GMT`) and bare dates (`2024-09-25`, read as
/// midnight UTC).
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Truncate a string for logging purposes.
///
/// Cuts on a char boundary at or below `max` bytes and appends the number of
/// bytes dropped.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_compact_number() {
        assert_eq!(parse_compact_number("3.72k"), Some(3720));
        assert_eq!(parse_compact_number("3.72K"), Some(3720));
        assert_eq!(parse_compact_number("50"), Some(50));
        assert_eq!(parse_compact_number(" 1,234 "), Some(1234));
        assert_eq!(parse_compact_number("1.2M"), Some(1_200_000));
        assert_eq!(parse_compact_number("0.5"), Some(1));
    }

    #[test]
    fn test_parse_compact_number_rejects_garbage() {
        assert_eq!(parse_compact_number("abc"), None);
        assert_eq!(parse_compact_number(""), None);
        assert_eq!(parse_compact_number("k"), None);
        assert_eq!(parse_compact_number("-5"), None);
        assert_eq!(parse_compact_number("12 likes"), None);
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(
            collapse_whitespace(["  Qwen2.5\n", "\t 7B  Instruct "]),
            "Qwen2.5 7B Instruct"
        );
        assert_eq!(collapse_whitespace(["   "]), "");
    }

    #[test]
    fn test_resolve_link() {
        let base = Url::parse("https://huggingface.co/Qwen").unwrap();
        assert_eq!(
            resolve_link(&base, "/Qwen/Qwen2.5-7B").as_deref(),
            Some("https://huggingface.co/Qwen/Qwen2.5-7B")
        );
        assert_eq!(
            resolve_link(&base, "https://other.example/m").as_deref(),
            Some("https://other.example/m")
        );
        assert_eq!(resolve_link(&base, "#top"), None);
        assert_eq!(resolve_link(&base, "javascript:void(0)"), None);
    }

    #[test]
    fn test_parse_timestamp() {
        use chrono::TimeZone;
        let expected = Utc.with_ymd_and_hms(2024, 9, 25, 12, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2024-09-25T12:00:00.000Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-09-25T14:00:00+02:00"), Some(expected));
        assert_eq!(parse_timestamp("Wed, 25 Sep 2024 12:00:00 GMT"), Some(expected));
        assert_eq!(
            parse_timestamp("2024-09-25"),
            Some(Utc.with_ymd_and_hms(2024, 9, 25, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_truncate_for_log() {
        assert_eq!(truncate_for_log("short", 100), "short");
        let s = "a".repeat(500);
        let out = truncate_for_log(&s, 100);
        assert!(out.starts_with(&"a".repeat(100)));
        assert!(out.ends_with("…(+400 bytes)"));
        // 'é' is two bytes; cutting at 1 must back off to 0.
        assert_eq!(truncate_for_log("éa", 1), "…(+3 bytes)");
    }
}
