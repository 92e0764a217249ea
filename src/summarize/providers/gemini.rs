// src/summarize/providers/gemini.rs
//! Gemini provider (generateContent API). Requires `GEMINI_API_KEY`.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::summarize::{ProviderFailure, TextProvider};

const DEFAULT_MODEL: &str = "gemini-2.5-flash-preview-09-2025";

pub struct GeminiProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeminiProvider {
    pub fn new(api_key: String, model_override: Option<&str>) -> Self {
        Self {
            http: super::http_client(),
            api_key,
            model: model_override.unwrap_or(DEFAULT_MODEL).to_string(),
        }
    }

    pub fn from_env() -> Self {
        let api_key = std::env::var("GEMINI_API_KEY").unwrap_or_default();
        let model = std::env::var("GEMINI_MODEL").ok();
        Self::new(api_key, model.as_deref())
    }

    async fn complete_impl(&self, prompt: &str) -> Result<String, ProviderFailure> {
        if self.api_key.is_empty() {
            return Err(ProviderFailure::MissingCredentials);
        }

        #[derive(Serialize)]
        struct Part<'a> {
            text: &'a str,
        }
        #[derive(Serialize)]
        struct Content<'a> {
            parts: Vec<Part<'a>>,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            contents: Vec<Content<'a>>,
        }
        #[derive(Deserialize)]
        struct Resp {
            #[serde(default)]
            candidates: Vec<Candidate>,
        }
        #[derive(Deserialize)]
        struct Candidate {
            content: RespContent,
        }
        #[derive(Deserialize)]
        struct RespContent {
            #[serde(default)]
            parts: Vec<RespPart>,
        }
        #[derive(Deserialize)]
        struct RespPart {
            #[serde(default)]
            text: String,
        }

        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.model, self.api_key
        );
        let req = Req {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
        };

        let resp = self
            .http
            .post(&url)
            .json(&req)
            .send()
            .await
            .map_err(|e| ProviderFailure::Transient(e.to_string()))?;

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            // Quota errors embed a suggested delay ("retry in Ns") in the body.
            let message = resp.text().await.unwrap_or_default();
            return Err(ProviderFailure::RateLimited { message });
        }
        if !status.is_success() {
            return Err(ProviderFailure::Transient(format!("http {status}")));
        }

        let body: Resp = resp
            .json()
            .await
            .map_err(|e| ProviderFailure::Malformed(e.to_string()))?;
        let text = body
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.trim().to_string())
            .unwrap_or_default();
        if text.is_empty() {
            return Err(ProviderFailure::Malformed("empty candidates".to_string()));
        }
        Ok(text)
    }
}

impl TextProvider for GeminiProvider {
    fn complete<'a>(
        &'a self,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, ProviderFailure>> + Send + 'a>> {
        Box::pin(self.complete_impl(prompt))
    }

    fn name(&self) -> &'static str {
        "gemini"
    }

    fn has_credentials(&self) -> bool {
        !self.api_key.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_key_fails_without_network() {
        let p = GeminiProvider::new(String::new(), None);
        assert!(!p.has_credentials());
        assert_eq!(
            p.complete("x").await,
            Err(ProviderFailure::MissingCredentials)
        );
    }
}
