// src/summarize/providers/mod.rs
pub mod gemini;
pub mod groq;

use std::time::Duration;

/// Shared HTTP client settings for all remote providers.
pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent("daily-news-digest/0.1")
        .connect_timeout(Duration::from_secs(4))
        .timeout(Duration::from_secs(30))
        .build()
        .unwrap_or_default()
}
