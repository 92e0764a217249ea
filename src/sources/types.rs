// src/sources/types.rs
use anyhow::Result;

/// One harvested item, reduced to a fixed shape at the source boundary.
/// Core logic never inspects provider-specific metadata.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct RawItem {
    pub source: String,   // e.g., "AI Times", "VentureBeat"
    pub published_at: u64, // unix seconds; 0 = unknown publish time
    pub title: String,
    pub link: String,
    pub snippet: String, // summary/description text from the feed
    pub image_url: Option<String>,
}

#[async_trait::async_trait]
pub trait SourceProvider: Send + Sync {
    async fn fetch_latest(&self) -> Result<Vec<RawItem>>;
    fn name(&self) -> &'static str;
}
