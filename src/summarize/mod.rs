// src/summarize/mod.rs
//! Remote text-model facade shared by summarization and ranking.
//!
//! Providers are tried in order. A rate-limited or transient failure retries
//! the same provider with backoff (bounded attempts) before falling through
//! to the next one; only when the whole chain is exhausted does the caller
//! see a terminal error. Callers substitute a placeholder instead of
//! aborting the batch.

pub mod providers;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use once_cell::sync::OnceCell;
use regex::Regex;

/// Enumerated failure reasons so the fallback chain is testable, instead of
/// catching opaque errors across provider boundaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderFailure {
    /// No API key configured; skip without a network call.
    MissingCredentials,
    /// Rate/quota exhaustion. The raw message may carry a suggested delay.
    RateLimited { message: String },
    /// Transient network/API failure; worth retrying.
    Transient(String),
    /// The provider answered, but the payload was unusable.
    Malformed(String),
}

impl std::fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderFailure::MissingCredentials => write!(f, "missing credentials"),
            ProviderFailure::RateLimited { message } => write!(f, "rate limited: {message}"),
            ProviderFailure::Transient(m) => write!(f, "transient failure: {m}"),
            ProviderFailure::Malformed(m) => write!(f, "malformed response: {m}"),
        }
    }
}

/// Terminal outcome of the whole chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainError {
    /// Nothing is credentialed; the chain short-circuits without I/O.
    NoProviderConfigured,
    /// Every provider failed after its retry budget.
    Exhausted,
}

impl std::fmt::Display for ChainError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChainError::NoProviderConfigured => write!(f, "no text provider configured"),
            ChainError::Exhausted => write!(f, "all text providers failed"),
        }
    }
}

impl std::error::Error for ChainError {}

/// Low-level provider: performs one remote call.
pub trait TextProvider: Send + Sync {
    fn complete<'a>(
        &'a self,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, ProviderFailure>> + Send + 'a>>;
    fn name(&self) -> &'static str;
    /// Presence of credentials is the only readiness signal the chain needs.
    fn has_credentials(&self) -> bool;
}

const MAX_ATTEMPTS_PER_PROVIDER: u32 = 3;
const MAX_RETRY_WAIT: Duration = Duration::from_secs(15);
const BACKOFF_STEP: Duration = Duration::from_secs(5);

pub struct ModelChain {
    providers: Vec<Box<dyn TextProvider>>,
}

impl ModelChain {
    pub fn new(providers: Vec<Box<dyn TextProvider>>) -> Self {
        Self { providers }
    }

    /// Production chain from the environment: Groq first, Gemini fallback.
    pub fn from_env() -> Self {
        Self::new(vec![
            Box::new(providers::groq::GroqProvider::from_env()),
            Box::new(providers::gemini::GeminiProvider::from_env()),
        ])
    }

    pub fn has_any_credentials(&self) -> bool {
        self.providers.iter().any(|p| p.has_credentials())
    }

    /// Run the prompt through the chain. Blocks (awaits) through retries.
    pub async fn complete(&self, prompt: &str) -> Result<String, ChainError> {
        if !self.has_any_credentials() {
            return Err(ChainError::NoProviderConfigured);
        }

        for provider in &self.providers {
            if !provider.has_credentials() {
                continue;
            }

            for attempt in 1..=MAX_ATTEMPTS_PER_PROVIDER {
                match provider.complete(prompt).await {
                    Ok(text) if !text.trim().is_empty() => return Ok(text.trim().to_string()),
                    Ok(_) => {
                        tracing::warn!(provider = provider.name(), "empty completion");
                        break; // next provider
                    }
                    Err(ProviderFailure::MissingCredentials) => break,
                    Err(ProviderFailure::Malformed(m)) => {
                        tracing::warn!(provider = provider.name(), detail = %m, "malformed completion");
                        break;
                    }
                    Err(failure @ (ProviderFailure::RateLimited { .. }
                    | ProviderFailure::Transient(_))) => {
                        if attempt == MAX_ATTEMPTS_PER_PROVIDER {
                            tracing::warn!(
                                provider = provider.name(),
                                error = %failure,
                                "provider retry budget exhausted"
                            );
                            break;
                        }
                        let delay = match &failure {
                            ProviderFailure::RateLimited { message } => {
                                extract_retry_delay(message)
                                    .unwrap_or(BACKOFF_STEP * attempt)
                                    .min(MAX_RETRY_WAIT)
                            }
                            _ => (BACKOFF_STEP * attempt).min(MAX_RETRY_WAIT),
                        };
                        tracing::info!(
                            provider = provider.name(),
                            attempt,
                            delay_secs = delay.as_secs_f64(),
                            "retrying provider"
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(ChainError::Exhausted)
    }
}

/// Parse a suggested delay like "retry in 7.5s" out of a provider message.
pub fn extract_retry_delay(message: &str) -> Option<Duration> {
    static RE: OnceCell<Regex> = OnceCell::new();
    let re = RE.get_or_init(|| Regex::new(r"retry in ([0-9]+(?:\.[0-9]+)?)s").unwrap());
    let lowered = message.to_lowercase();
    let caps = re.captures(&lowered)?;
    let secs: f64 = caps.get(1)?.as_str().parse().ok()?;
    Some(Duration::from_secs_f64(secs))
}

/// Shown to readers when the whole chain fails for one item.
pub const PLACEHOLDER_SUMMARY: &str = "Summary unavailable.";

const MAX_CONTENT_CHARS: usize = 2000;

/// Summarize one article. Terminal errors are returned for the caller to
/// substitute [`PLACEHOLDER_SUMMARY`]; they must not abort the batch.
pub async fn summarize(
    chain: &ModelChain,
    content: &str,
    title: &str,
    context: &str,
) -> Result<String, ChainError> {
    let body: String = content.chars().take(MAX_CONTENT_CHARS).collect();
    let prompt = format!(
        "Summarize the following {context} article.\n\
         Rules:\n\
         1. ONE sentence, under 40 words, capturing only the core fact.\n\
         2. Plain prose, no bullet markers, no preamble.\n\
         3. Keep company, product and model names exact.\n\n\
         Title: {title}\n\
         Content:\n{body}"
    );
    chain.complete(&prompt).await
}

// ------------------------------------------------------------
// Test helper: a provider that replays a scripted sequence.
// ------------------------------------------------------------

/// Scripted provider for tests and offline runs: pops one pre-baked outcome
/// per call, repeating the last one when the script runs out. Clones share
/// the script and call counter, so tests can keep a handle for assertions.
#[derive(Clone)]
pub struct ScriptedProvider {
    name: &'static str,
    script: std::sync::Arc<
        std::sync::Mutex<std::collections::VecDeque<Result<String, ProviderFailure>>>,
    >,
    calls: std::sync::Arc<std::sync::atomic::AtomicU32>,
}

impl ScriptedProvider {
    pub fn new(name: &'static str, script: Vec<Result<String, ProviderFailure>>) -> Self {
        Self {
            name,
            script: std::sync::Arc::new(std::sync::Mutex::new(script.into())),
            calls: std::sync::Arc::new(std::sync::atomic::AtomicU32::new(0)),
        }
    }

    pub fn always_failing(name: &'static str, failure: ProviderFailure) -> Self {
        Self::new(name, vec![Err(failure)])
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

impl TextProvider for ScriptedProvider {
    fn complete<'a>(
        &'a self,
        _prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, ProviderFailure>> + Send + 'a>> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let mut script = self.script.lock().expect("script mutex poisoned");
        let out = if script.len() > 1 {
            script.pop_front().expect("non-empty script")
        } else {
            script.front().cloned().unwrap_or(Err(
                ProviderFailure::Transient("script exhausted".to_string()),
            ))
        };
        Box::pin(async move { out })
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn has_credentials(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_delay_is_parsed_and_case_insensitive() {
        assert_eq!(
            extract_retry_delay("Quota exceeded. Retry in 7.5s"),
            Some(Duration::from_secs_f64(7.5))
        );
        assert_eq!(extract_retry_delay("no hint here"), None);
    }

    #[tokio::test]
    async fn no_credentials_short_circuits() {
        struct NoKey;
        impl TextProvider for NoKey {
            fn complete<'a>(
                &'a self,
                _prompt: &'a str,
            ) -> Pin<Box<dyn Future<Output = Result<String, ProviderFailure>> + Send + 'a>>
            {
                unreachable!("must not be called without credentials");
            }
            fn name(&self) -> &'static str {
                "nokey"
            }
            fn has_credentials(&self) -> bool {
                false
            }
        }

        let chain = ModelChain::new(vec![Box::new(NoKey)]);
        assert_eq!(
            chain.complete("x").await,
            Err(ChainError::NoProviderConfigured)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_retries_same_provider_then_fails_over() {
        let primary = ScriptedProvider::new(
            "primary",
            vec![
                Err(ProviderFailure::RateLimited {
                    message: "quota, retry in 0.01s".into(),
                }),
                Err(ProviderFailure::RateLimited {
                    message: "quota, retry in 0.01s".into(),
                }),
                Err(ProviderFailure::RateLimited {
                    message: "quota".into(),
                }),
            ],
        );
        let secondary = ScriptedProvider::new("secondary", vec![Ok("done".into())]);

        let chain = ModelChain::new(vec![Box::new(primary), Box::new(secondary)]);
        let out = chain.complete("x").await.unwrap();
        assert_eq!(out, "done");
    }

    #[tokio::test]
    async fn malformed_response_falls_straight_to_next_provider() {
        let primary =
            ScriptedProvider::always_failing("p", ProviderFailure::Malformed("junk".into()));
        let secondary = ScriptedProvider::new("s", vec![Ok("ok".into())]);
        let chain = ModelChain::new(vec![Box::new(primary), Box::new(secondary)]);
        assert_eq!(chain.complete("x").await.unwrap(), "ok");
    }

    #[tokio::test(start_paused = true)]
    async fn full_chain_failure_is_terminal() {
        let a = ScriptedProvider::always_failing("a", ProviderFailure::Transient("boom".into()));
        let b = ScriptedProvider::always_failing(
            "b",
            ProviderFailure::RateLimited {
                message: "retry in 0.01s".into(),
            },
        );
        let chain = ModelChain::new(vec![Box::new(a), Box::new(b)]);
        assert_eq!(chain.complete("x").await, Err(ChainError::Exhausted));
    }
}
