// src/sources/search.rs
//! News-search provider for tracked subjects: builds a quoted OR query
//! against the Google News search RSS endpoint and parses it like any feed.

use anyhow::Result;
use async_trait::async_trait;

use crate::sources::rss::RssProvider;
use crate::sources::types::{RawItem, SourceProvider};

pub struct SearchProvider {
    inner: RssProvider,
    limit: usize,
}

impl SearchProvider {
    pub fn new(keywords: &[String], limit: usize) -> Self {
        let query = keywords
            .iter()
            .map(|k| format!("\"{k}\""))
            .collect::<Vec<_>>()
            .join(" OR ");
        let url = format!(
            "https://news.google.com/rss/search?q={}&hl=ko&gl=KR&ceid=KR:ko",
            urlencode(&query)
        );
        Self {
            inner: RssProvider::from_url("news-search", url),
            limit,
        }
    }

    /// Parse from an in-memory document; used by tests and offline runs.
    pub fn from_fixture(xml: &str, limit: usize) -> Self {
        Self {
            inner: RssProvider::from_fixture("news-search", xml),
            limit,
        }
    }
}

#[async_trait]
impl SourceProvider for SearchProvider {
    async fn fetch_latest(&self) -> Result<Vec<RawItem>> {
        let mut items = self.inner.fetch_latest().await?;
        // Newest first, capped; a search feed has no editorial ordering worth keeping.
        items.sort_by_key(|it| std::cmp::Reverse(it.published_at));
        items.truncate(self.limit);
        Ok(items)
    }

    fn name(&self) -> &'static str {
        "news-search"
    }
}

/// Percent-encode everything outside the unreserved set.
fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len() * 3);
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_is_percent_encoded() {
        assert_eq!(urlencode("\"a b\" OR \"c\""), "%22a%20b%22%20OR%20%22c%22");
    }
}
