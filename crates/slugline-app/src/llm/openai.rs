//! OpenAI-compatible HTTP client for completions and embeddings.
//!
//! The client performs no retries of its own: transient failures surface as
//! typed errors and the calling stage decides the retry budget.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use super::{CompletionClient, EmbeddingClient, GenericRateLimiter, LlmError};
use crate::config::LlmConfig;

const COMPLETION_TEMPERATURE: f64 = 0.5;
const COMPLETION_MAX_TOKENS: u32 = 500;

#[derive(Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    embedding_model: String,
    limiter: Option<Arc<GenericRateLimiter>>,
}

impl OpenAiClient {
    /// Build a client from configuration, reading the API key from the
    /// `OPENAI_API_KEY` environment variable.
    pub fn from_env(
        config: &LlmConfig,
        limiter: Option<Arc<GenericRateLimiter>>,
    ) -> Result<Self, LlmError> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| LlmError::MissingApiKey)?;
        Self::new(config, api_key.trim(), limiter)
    }

    pub fn new(
        config: &LlmConfig,
        api_key: &str,
        limiter: Option<Arc<GenericRateLimiter>>,
    ) -> Result<Self, LlmError> {
        if api_key.is_empty() {
            return Err(LlmError::MissingApiKey);
        }
        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {api_key}");
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|_| LlmError::InvalidResponse("api key is not a valid header".into()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .default_headers(headers)
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            embedding_model: config.embedding_model.clone(),
            limiter,
        })
    }

    async fn throttle(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }

    async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R, LlmError>
    where
        B: Serialize + Sync,
        R: for<'de> Deserialize<'de>,
    {
        self.throttle().await;
        let url = format!("{}{path}", self.base_url);
        let response = self.http.post(&url).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        debug_assert!(!prompt.is_empty());
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: COMPLETION_TEMPERATURE,
            max_tokens: COMPLETION_MAX_TOKENS,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };
        let response: ChatResponse = self.post_json("/chat/completions", &request).await?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.is_empty())
            .ok_or_else(|| LlmError::InvalidResponse("completion content is empty".to_string()))
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: String,
    encoding_format: &'static str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingClient for OpenAiClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        debug_assert!(!text.is_empty());
        let request = EmbeddingRequest {
            model: &self.embedding_model,
            // Embedding endpoints behave better with newlines collapsed.
            input: text.replace('\n', " "),
            encoding_format: "float",
        };
        let response: EmbeddingResponse = self.post_json("/embeddings", &request).await?;
        response
            .data
            .into_iter()
            .next()
            .map(|entry| entry.embedding)
            .filter(|vector| !vector.is_empty())
            .ok_or_else(|| LlmError::InvalidResponse("embedding response is empty".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> LlmConfig {
        LlmConfig {
            base_url: server.uri(),
            model: "gpt-3.5-turbo".to_string(),
            embedding_model: "text-embedding-ada-002".to_string(),
            request_timeout_secs: 5,
            requests_per_second: 0,
        }
    }

    #[tokio::test]
    async fn completion_returns_message_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(json!({
                "model": "gpt-3.5-turbo",
                "response_format": {"type": "json_object"},
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "{\"title\":\"x\"}"}}]
            })))
            .mount(&server)
            .await;

        let client =
            OpenAiClient::new(&config_for(&server), "test-key", None).expect("client builds");
        let content = client.complete("analyze this scene").await.expect("ok");
        assert_eq!(content, "{\"title\":\"x\"}");
    }

    #[tokio::test]
    async fn rate_limited_completion_is_a_retryable_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let client =
            OpenAiClient::new(&config_for(&server), "test-key", None).expect("client builds");
        let err = client.complete("prompt").await.expect_err("429 surfaces");
        assert!(matches!(err, LlmError::Status { status: 429, .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn embedding_collapses_newlines_and_returns_vector() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(body_partial_json(json!({
                "model": "text-embedding-ada-002",
                "input": "line one line two",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"embedding": [0.1, 0.2, 0.3]}]
            })))
            .mount(&server)
            .await;

        let client =
            OpenAiClient::new(&config_for(&server), "test-key", None).expect("client builds");
        let vector = client.embed("line one\nline two").await.expect("ok");
        assert_eq!(vector, vec![0.1, 0.2, 0.3]);
    }

    #[tokio::test]
    async fn empty_completion_content_is_invalid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": null}}]
            })))
            .mount(&server)
            .await;

        let client =
            OpenAiClient::new(&config_for(&server), "test-key", None).expect("client builds");
        let err = client.complete("prompt").await.expect_err("must fail");
        assert!(matches!(err, LlmError::InvalidResponse(_)));
        assert!(!err.is_retryable());
    }
}
