//! Text-generation clients.
//!
//! - [`OpenAiCompatibleGenerator`] — one `POST {base_url}/chat/completions`
//!   call per `complete`, with HTTP failures classified into
//!   [`GenerationError`] variants. Groq is the default endpoint.
//! - [`ResilientGenerator`] — wraps any generator with bounded exponential
//!   backoff on retryable failures and a single attempt on a fallback model.
//! - [`DemoGenerator`] — extractive answers built from the context block,
//!   no network. For local demos and tests.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use campaign_rag_core::generate::{
    ChatMessage, GenerationError, GenerationOptions, Generator, RetryPolicy, Role,
};

use crate::config::LlmConfig;

/// Build the configured generator. A missing API key is a startup error.
pub fn create_generator(config: &LlmConfig) -> Result<Arc<dyn Generator>> {
    match config.provider.as_str() {
        "demo" => Ok(Arc::new(DemoGenerator)),
        "openai" => {
            let api_key = std::env::var(&config.api_key_env).map_err(|_| {
                anyhow!("{} environment variable not set", config.api_key_env)
            })?;
            if api_key.trim().is_empty() {
                bail!("{} is empty", config.api_key_env);
            }
            let inner = OpenAiCompatibleGenerator::new(
                &config.base_url,
                api_key,
                Duration::from_secs(config.timeout_secs),
            )?;
            let policy = RetryPolicy {
                attempts: config.retry_attempts,
                min_delay: Duration::from_secs(config.backoff_min_secs),
                max_delay: Duration::from_secs(config.backoff_max_secs),
            };
            Ok(Arc::new(ResilientGenerator::new(
                Arc::new(inner),
                policy,
                config.fallback_model.clone(),
            )))
        }
        other => bail!("Unknown llm provider: {}", other),
    }
}

// ============ OpenAI-compatible ============

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAiCompatibleGenerator {
    endpoint: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatibleGenerator {
    pub fn new(base_url: &str, api_key: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key,
            client,
        })
    }
}

#[async_trait]
impl Generator for OpenAiCompatibleGenerator {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<String, GenerationError> {
        let body = ChatRequest {
            model: &options.model,
            messages,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key.trim()))
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::Transient(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(GenerationError::from_status(status.as_u16(), &text));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Transient(format!("malformed response: {}", e)))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        Ok(content.trim().to_string())
    }
}

// ============ Retry + fallback ============

/// Retries the primary model per [`RetryPolicy`], then tries
/// `fallback_model` once when it is set and differs from the primary.
///
/// Exhausted retryable failures surface as [`GenerationError::Unavailable`].
/// A fatal primary failure with no distinct fallback surfaces unchanged.
pub struct ResilientGenerator {
    inner: Arc<dyn Generator>,
    policy: RetryPolicy,
    fallback_model: Option<String>,
}

impl ResilientGenerator {
    pub fn new(inner: Arc<dyn Generator>, policy: RetryPolicy, fallback_model: Option<String>) -> Self {
        Self {
            inner,
            policy,
            fallback_model: fallback_model.filter(|m| !m.trim().is_empty()),
        }
    }

    async fn with_retry(
        &self,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<String, GenerationError> {
        let mut attempt = 1;
        loop {
            match self.inner.complete(messages, options).await {
                Ok(text) => return Ok(text),
                Err(e) if self.policy.should_retry(attempt, &e) => {
                    let delay = self.policy.delay(attempt);
                    warn!(
                        model = %options.model,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "generation failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl Generator for ResilientGenerator {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<String, GenerationError> {
        let primary_err = match self.with_retry(messages, options).await {
            Ok(text) => return Ok(text),
            Err(e) => e,
        };

        let fallback = self
            .fallback_model
            .as_deref()
            .filter(|m| *m != options.model);
        let Some(fallback) = fallback else {
            return Err(match primary_err {
                GenerationError::Fatal(_) => primary_err,
                other => GenerationError::Unavailable(other.to_string()),
            });
        };

        warn!(primary = %options.model, fallback, error = %primary_err, "switching to fallback model");
        match self
            .inner
            .complete(messages, &options.with_model(fallback))
            .await
        {
            Ok(text) => Ok(text),
            Err(e) => {
                error!(fallback, error = %e, "fallback model failed");
                Err(GenerationError::Unavailable(format!(
                    "primary: {}; fallback: {}",
                    primary_err, e
                )))
            }
        }
    }
}

// ============ Demo ============

/// Extractive generator: restates the context lines of the user turn.
pub struct DemoGenerator;

const TOPIC_MARKER: &str = "User keyword or question:";

#[async_trait]
impl Generator for DemoGenerator {
    fn name(&self) -> &str {
        "demo"
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        _options: &GenerationOptions,
    ) -> Result<String, GenerationError> {
        let user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default();

        let topic = user
            .lines()
            .find_map(|l| l.strip_prefix(TOPIC_MARKER))
            .map(str::trim)
            .unwrap_or("this topic");

        let items: Vec<(String, String)> = user
            .lines()
            .filter_map(|l| l.trim().strip_prefix("- ["))
            .filter_map(|rest| {
                let (kind, rest) = rest.split_once("] ")?;
                let (title, _url) = rest.split_once(" → ")?;
                Some((kind.to_string(), title.trim().to_string()))
            })
            .collect();
        debug!(items = items.len(), "demo generator answering from context");

        if items.is_empty() {
            return Ok(campaign_rag_core::models::REFUSAL.to_string());
        }
        let listed: Vec<String> = items
            .iter()
            .take(3)
            .map(|(kind, title)| format!("{} ({})", title, kind))
            .collect();
        Ok(format!(
            "{} is covered by {} campaign piece{}. Highlights include {}.",
            topic,
            items.len(),
            if items.len() == 1 { "" } else { "s" },
            listed.join(", ")
        ))
    }
}
