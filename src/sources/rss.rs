// src/sources/rss.rs
//! Generic RSS provider: one instance per configured feed URL.

use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::{counter, histogram};
use quick_xml::de::from_str;
use serde::Deserialize;
use std::time::Duration;
use time::{format_description::well_known::Rfc2822, OffsetDateTime, UtcOffset};

use crate::sources::types::{RawItem, SourceProvider};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}
#[derive(Debug, Deserialize)]
struct Channel {
    title: Option<String>,
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}
#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    enclosure: Option<Enclosure>,
}
#[derive(Debug, Deserialize)]
struct Enclosure {
    #[serde(rename = "@url")]
    url: Option<String>,
}

fn parse_rfc2822_to_unix(ts: &str) -> u64 {
    OffsetDateTime::parse(ts, &Rfc2822)
        .ok()
        .map(|dt| dt.to_offset(UtcOffset::UTC).unix_timestamp())
        .and_then(|x| u64::try_from(x).ok())
        .unwrap_or(0)
}

/// Fall back to the link host when the channel carries no usable title.
fn source_from_link(link: &str) -> String {
    link.trim_start_matches("https://")
        .trim_start_matches("http://")
        .split('/')
        .next()
        .unwrap_or_default()
        .trim_start_matches("www.")
        .to_string()
}

pub struct RssProvider {
    label: &'static str,
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http { url: String, client: reqwest::Client },
}

impl RssProvider {
    pub fn from_url(label: &'static str, url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .user_agent("daily-news-digest/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_default();
        Self {
            label,
            mode: Mode::Http {
                url: url.into(),
                client,
            },
        }
    }

    /// Parse from an in-memory document; used by tests and offline runs.
    pub fn from_fixture(label: &'static str, xml: &str) -> Self {
        Self {
            label,
            mode: Mode::Fixture(xml.to_string()),
        }
    }

    fn parse_items_from_str(&self, s: &str) -> Result<Vec<RawItem>> {
        let t0 = std::time::Instant::now();
        let xml_clean = scrub_html_entities_for_xml(s);
        let rss: Rss = from_str(&xml_clean).context("parsing rss xml")?;

        let channel_title = rss
            .channel
            .title
            .as_deref()
            .map(crate::sources::normalize_text)
            .filter(|t| !t.is_empty());

        let mut out = Vec::with_capacity(rss.channel.item.len());
        for it in rss.channel.item {
            let title = crate::sources::normalize_text(it.title.as_deref().unwrap_or_default());
            let link = it.link.unwrap_or_default().trim().to_string();
            if title.is_empty() || link.is_empty() {
                continue;
            }

            let source = channel_title
                .clone()
                .unwrap_or_else(|| source_from_link(&link));

            out.push(RawItem {
                source,
                published_at: it
                    .pub_date
                    .as_deref()
                    .map(parse_rfc2822_to_unix)
                    .unwrap_or(0),
                title,
                link,
                snippet: crate::sources::normalize_text(
                    it.description.as_deref().unwrap_or_default(),
                ),
                image_url: it.enclosure.and_then(|e| e.url),
            });
        }

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("digest_parse_ms").record(ms);
        Ok(out)
    }
}

#[async_trait]
impl SourceProvider for RssProvider {
    async fn fetch_latest(&self) -> Result<Vec<RawItem>> {
        match &self.mode {
            Mode::Fixture(s) => self.parse_items_from_str(s),
            Mode::Http { url, client } => {
                let body = match client.get(url).send().await {
                    Ok(resp) => resp.text().await.context("rss http .text()")?,
                    Err(e) => {
                        tracing::warn!(error = ?e, provider = self.label, "provider http error");
                        counter!("digest_provider_errors_total").increment(1);
                        return Err(e).context("rss http get()");
                    }
                };
                self.parse_items_from_str(&body)
            }
        }
    }

    fn name(&self) -> &'static str {
        self.label
    }
}

/// Feeds routinely smuggle HTML entities into XML; scrub the common ones
/// before handing the document to the XML parser.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>Example Tech</title>
    <item>
      <title>Model X launched</title>
      <link>https://example.test/x</link>
      <pubDate>Mon, 24 Aug 2026 09:00:00 GMT</pubDate>
      <description>&lt;p&gt;A new model.&lt;/p&gt;</description>
    </item>
    <item>
      <title></title>
      <link>https://example.test/empty</link>
    </item>
  </channel>
</rss>"#;

    #[tokio::test]
    async fn fixture_parses_and_skips_empty_titles() {
        let p = RssProvider::from_fixture("example", FIXTURE);
        let items = p.fetch_latest().await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Model X launched");
        assert_eq!(items[0].source, "Example Tech");
        assert_eq!(items[0].snippet, "A new model.");
        assert!(items[0].published_at > 0);
    }

    #[test]
    fn missing_pub_date_maps_to_zero() {
        assert_eq!(parse_rfc2822_to_unix("not a date"), 0);
    }

    #[test]
    fn source_fallback_uses_host() {
        assert_eq!(source_from_link("https://www.example.test/a/b"), "example.test");
    }
}
