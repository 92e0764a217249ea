// src/sources/mod.rs
pub mod rss;
pub mod search;
pub mod types;

use crate::sources::types::{RawItem, SourceProvider};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up if an exporter is wired).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("digest_items_total", "Total items parsed from providers.");
        describe_counter!(
            "digest_provider_errors_total",
            "Provider fetch/parse errors."
        );
        describe_histogram!("digest_parse_ms", "Provider parse time in milliseconds.");
        describe_gauge!(
            "digest_last_fetch_ts",
            "Unix ts when sources were last fetched."
        );
    });
}

/// Normalize text: decode entities, strip tags, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();
    out.trim().to_string()
}

/// Fetch from every provider, tolerating individual failures.
/// Items with an empty title or link are dropped at the boundary.
pub async fn collect(providers: &[Box<dyn SourceProvider>]) -> Vec<RawItem> {
    ensure_metrics_described();

    let mut raw = Vec::new();
    for p in providers {
        match p.fetch_latest().await {
            Ok(mut v) => raw.append(&mut v),
            Err(e) => {
                tracing::warn!(error = ?e, provider = p.name(), "provider error");
                counter!("digest_provider_errors_total").increment(1);
            }
        }
    }

    raw.retain(|it| !it.title.trim().is_empty() && !it.link.trim().is_empty());

    let now = chrono::Utc::now().timestamp().max(0) as u64;
    counter!("digest_items_total").increment(raw.len() as u64);
    gauge!("digest_last_fetch_ts").set(now as f64);

    raw
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_text_strips_tags_and_entities() {
        let s = "  <b>Hello&nbsp;&nbsp;world</b> &ldquo;ok&rdquo; ";
        let out = normalize_text(s);
        assert_eq!(out, "Hello world \"ok\"");
    }

    #[test]
    fn normalize_text_collapses_whitespace() {
        assert_eq!(normalize_text("a\n\t b   c"), "a b c");
    }
}
