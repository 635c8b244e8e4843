//! Text-generation collaborator contract.
//!
//! A [`Generator`] accepts role-tagged messages and returns text. Failures
//! are typed so callers can tell retryable conditions (rate limiting,
//! network or 5xx) from fatal ones (other 4xx). Retry scheduling itself is
//! the caller's concern; [`RetryPolicy`] only computes delays.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Per-call model parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOptions {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl GenerationOptions {
    pub fn with_model(&self, model: &str) -> Self {
        Self {
            model: model.to_string(),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationError {
    #[error("rate limited by generation service: {0}")]
    RateLimited(String),

    #[error("transient generation failure: {0}")]
    Transient(String),

    #[error("generation request rejected: {0}")]
    Fatal(String),

    #[error("generation temporarily unavailable: {0}")]
    Unavailable(String),
}

impl GenerationError {
    /// Rate limiting and transient failures may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited(_) | Self::Transient(_))
    }

    /// Classify an HTTP status. 429 is rate limiting, 5xx (and 408) are
    /// transient, any other non-success status is fatal.
    pub fn from_status(status: u16, body: &str) -> Self {
        let msg = format!("HTTP {}: {}", status, body.trim());
        match status {
            429 => Self::RateLimited(msg),
            408 | 500..=599 => Self::Transient(msg),
            _ => Self::Fatal(msg),
        }
    }
}

#[async_trait]
pub trait Generator: Send + Sync {
    /// Short label for logs (e.g. `"openai"`, `"demo"`).
    fn name(&self) -> &str;

    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<String, GenerationError>;
}

/// Bounded exponential backoff.
///
/// Attempt `n` (1-based) that fails retryably waits
/// `min(max, min * 2^(n-1))` before attempt `n + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            min_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.min_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Whether another attempt follows a failure on `attempt`.
    pub fn should_retry(&self, attempt: u32, err: &GenerationError) -> bool {
        err.is_retryable() && attempt < self.attempts.max(1)
    }
}
