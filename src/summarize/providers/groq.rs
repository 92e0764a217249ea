// src/summarize/providers/groq.rs
//! Groq provider (OpenAI-style Chat Completions API). Requires `GROQ_API_KEY`.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::summarize::{ProviderFailure, TextProvider};

const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";

pub struct GroqProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl GroqProvider {
    pub fn new(api_key: String, model_override: Option<&str>) -> Self {
        Self {
            http: super::http_client(),
            api_key,
            model: model_override.unwrap_or(DEFAULT_MODEL).to_string(),
        }
    }

    /// Reads `GROQ_API_KEY` and optional `GROQ_MODEL`. An absent key yields a
    /// provider that reports missing credentials instead of erroring at startup.
    pub fn from_env() -> Self {
        let api_key = std::env::var("GROQ_API_KEY").unwrap_or_default();
        let model = std::env::var("GROQ_MODEL").ok();
        Self::new(api_key, model.as_deref())
    }

    async fn complete_impl(&self, prompt: &str) -> Result<String, ProviderFailure> {
        if self.api_key.is_empty() {
            return Err(ProviderFailure::MissingCredentials);
        }

        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: String,
        }

        let req = Req {
            model: &self.model,
            messages: vec![Msg {
                role: "user",
                content: prompt,
            }],
        };

        let resp = self
            .http
            .post("https://api.groq.com/openai/v1/chat/completions")
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .map_err(|e| ProviderFailure::Transient(e.to_string()))?;

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
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
        let content = body
            .choices
            .first()
            .map(|c| c.message.content.trim().to_string())
            .unwrap_or_default();
        if content.is_empty() {
            return Err(ProviderFailure::Malformed("empty choices".to_string()));
        }
        Ok(content)
    }
}

impl TextProvider for GroqProvider {
    fn complete<'a>(
        &'a self,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, ProviderFailure>> + Send + 'a>> {
        Box::pin(self.complete_impl(prompt))
    }

    fn name(&self) -> &'static str {
        "groq"
    }

    fn has_credentials(&self) -> bool {
        !self.api_key.is_empty()
    }
}
