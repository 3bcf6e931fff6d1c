//! Language-model collaborators: structured extraction and embeddings.

pub mod openai;
pub mod prompt;

pub use openai::OpenAiClient;
pub use prompt::scene_analysis_prompt;

use std::num::NonZeroU32;
use std::sync::Arc;

use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};
use thiserror::Error;

pub type GenericRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Build a per-second rate limiter shared by the LLM clients.
pub fn per_second_limiter(requests_per_second: u32) -> Option<Arc<GenericRateLimiter>> {
    let quota = NonZeroU32::new(requests_per_second)?;
    Some(Arc::new(RateLimiter::direct(Quota::per_second(quota))))
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("missing OPENAI_API_KEY environment variable")]
    MissingApiKey,
    #[error("llm request failed with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    #[error("unexpected llm response shape: {0}")]
    InvalidResponse(String),
}

impl LlmError {
    /// Transient failures worth another attempt: upstream rate limiting,
    /// server errors, and connection-level faults.
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::Status { status, .. } => *status == 429 || (500..600).contains(status),
            LlmError::Transport(err) => {
                err.is_timeout() || err.is_connect() || err.is_request()
            }
            LlmError::MissingApiKey | LlmError::InvalidResponse(_) => false,
        }
    }
}

/// Structured-extraction model: one prompt in, raw completion text out.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;
}

/// Embedding model: one text in, one vector out.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_and_server_errors_are_retryable() {
        let rate_limited = LlmError::Status {
            status: 429,
            body: "slow down".to_string(),
        };
        let server = LlmError::Status {
            status: 503,
            body: "unavailable".to_string(),
        };
        let client_err = LlmError::Status {
            status: 400,
            body: "bad request".to_string(),
        };
        assert!(rate_limited.is_retryable());
        assert!(server.is_retryable());
        assert!(!client_err.is_retryable());
        assert!(!LlmError::InvalidResponse("empty".to_string()).is_retryable());
    }

    #[test]
    fn zero_rate_disables_the_limiter() {
        assert!(per_second_limiter(0).is_none());
        assert!(per_second_limiter(8).is_some());
    }
}
