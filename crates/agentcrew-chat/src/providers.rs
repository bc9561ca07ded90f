//! Chat-completion provider streaming implementations.
//!
//! OpenAI and Azure OpenAI share the SSE wire format and differ only in URL
//! and authentication header. Transient failures on the initial request are
//! retried a fixed number of times before surfacing as `StreamChunk::Error`.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use agentcrew_core::{ChatBackend, Error, Result};
use futures::Stream;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::json;
use tokio_stream::StreamExt;
use tracing::{debug, error, warn};

use crate::sse::{self, SseDecoder, SseEvent};
use crate::types::ChatMessage;

/// Boxed stream type for returning different stream implementations.
pub type BoxedStream = Pin<Box<dyn Stream<Item = StreamChunk> + Send>>;

/// A single streamed token or error.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    Token(String),
    Done { tokens_used: usize },
    Error(String),
}

/// Per-call sampling settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatSettings {
    pub temperature: f64,
    pub max_tokens: Option<usize>,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            max_tokens: None,
        }
    }
}

/// A chat-completion backend that streams tokens.
pub trait ChatModel: Send + Sync {
    /// Stream the completion for `messages`.
    fn stream_chat(&self, messages: Vec<ChatMessage>, settings: &ChatSettings) -> BoxedStream;

    /// Model identifier, for logging.
    fn model_name(&self) -> &str;
}

/// Drain a token stream into the full completion text.
pub async fn collect_completion(stream: BoxedStream) -> Result<String> {
    tokio::pin!(stream);
    let mut text = String::new();
    while let Some(chunk) = stream.next().await {
        match chunk {
            StreamChunk::Token(t) => text.push_str(&t),
            StreamChunk::Done { .. } => break,
            StreamChunk::Error(e) => return Err(Error::Provider(e)),
        }
    }
    Ok(text)
}

/// Where and how to authenticate an OpenAI-compatible request.
#[derive(Debug, Clone)]
enum Endpoint {
    OpenAI { url: String, api_key: String },
    Azure { url: String, api_key: String },
}

impl Endpoint {
    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            Endpoint::OpenAI { api_key, .. } => {
                request.header("Authorization", format!("Bearer {}", api_key))
            }
            Endpoint::Azure { api_key, .. } => request.header("api-key", api_key),
        }
    }

    fn url(&self) -> &str {
        match self {
            Endpoint::OpenAI { url, .. } | Endpoint::Azure { url, .. } => url,
        }
    }
}

/// Streaming client for OpenAI-compatible chat completions.
pub struct OpenAiCompatModel {
    client: Client,
    endpoint: Endpoint,
    model: String,
    /// Azure selects the model by deployment, so the body omits it.
    send_model: bool,
    max_retries: u32,
}

impl OpenAiCompatModel {
    /// OpenAI (or any compatible server) at `base_url`.
    pub fn openai(client: Client, base_url: &str, model: &str, api_key: &str, max_retries: u32) -> Self {
        Self {
            client,
            endpoint: Endpoint::OpenAI {
                url: format!("{}/chat/completions", base_url.trim_end_matches('/')),
                api_key: api_key.to_string(),
            },
            model: model.to_string(),
            send_model: true,
            max_retries,
        }
    }

    /// An Azure OpenAI deployment.
    pub fn azure(
        client: Client,
        endpoint: &str,
        deployment: &str,
        api_version: &str,
        model: &str,
        api_key: &str,
        max_retries: u32,
    ) -> Self {
        Self {
            client,
            endpoint: Endpoint::Azure {
                url: azure_chat_url(endpoint, deployment, api_version),
                api_key: api_key.to_string(),
            },
            model: model.to_string(),
            send_model: false,
            max_retries,
        }
    }

    pub fn url(&self) -> &str {
        self.endpoint.url()
    }

    fn request_body(&self, messages: &[ChatMessage], settings: &ChatSettings) -> serde_json::Value {
        let msgs: Vec<serde_json::Value> = messages
            .iter()
            .map(|m| json!({"role": m.role, "content": m.content}))
            .collect();

        let mut body = json!({
            "messages": msgs,
            "temperature": settings.temperature,
            "stream": true,
        });
        if self.send_model {
            body["model"] = json!(self.model);
        }
        if let Some(max_tokens) = settings.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        body
    }
}

impl ChatModel for OpenAiCompatModel {
    fn stream_chat(&self, messages: Vec<ChatMessage>, settings: &ChatSettings) -> BoxedStream {
        let body = self.request_body(&messages, settings);
        let request = self
            .endpoint
            .authorize(self.client.post(self.endpoint.url()))
            .header("Content-Type", "application/json")
            .json(&body);
        let url = self.endpoint.url().to_string();
        let model = self.model.clone();
        let max_retries = self.max_retries;

        Box::pin(async_stream::stream! {
            debug!("Streaming from {} with model {}", url, model);

            let response = match send_with_retry(request, max_retries).await {
                Ok(r) => r,
                Err(e) => {
                    error!("Chat completion failed: {}", e);
                    yield StreamChunk::Error(e);
                    return;
                }
            };

            let mut stream = response.bytes_stream();
            let mut decoder = SseDecoder::new();
            let mut token_count = 0usize;

            while let Some(chunk) = stream.next().await {
                let bytes = match chunk {
                    Ok(b) => b,
                    Err(e) => {
                        yield StreamChunk::Error(format!("Stream read error: {}", e));
                        return;
                    }
                };

                for event in decoder.push(&bytes) {
                    match event {
                        SseEvent::Done => {
                            yield StreamChunk::Done { tokens_used: token_count };
                            return;
                        }
                        SseEvent::Data(data) => {
                            if let Some(content) = sse::delta_content(&data) {
                                token_count += 1;
                                yield StreamChunk::Token(content);
                            } else if let Some(msg) = sse::stream_error(&data) {
                                yield StreamChunk::Error(msg);
                                return;
                            }
                        }
                    }
                }
            }

            yield StreamChunk::Done { tokens_used: token_count };
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Build the Azure OpenAI chat completions URL for a deployment.
pub fn azure_chat_url(endpoint: &str, deployment: &str, api_version: &str) -> String {
    format!(
        "{}/openai/deployments/{}/chat/completions?api-version={}",
        endpoint.trim_end_matches('/'),
        deployment,
        api_version
    )
}

/// Create the chat model for a resolved backend.
pub fn create_chat_model(backend: &ChatBackend, max_retries: u32) -> Arc<dyn ChatModel> {
    let client = Client::new();
    match backend {
        ChatBackend::AzureOpenAI {
            endpoint,
            deployment_name,
            model_name,
            api_version,
            api_key,
        } => Arc::new(OpenAiCompatModel::azure(
            client,
            endpoint,
            deployment_name,
            api_version,
            model_name,
            api_key,
            max_retries,
        )),
        ChatBackend::OpenAI {
            base_url,
            model_name,
            api_key,
        } => Arc::new(OpenAiCompatModel::openai(
            client,
            base_url,
            model_name,
            api_key,
            max_retries,
        )),
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

/// Delay before retry `attempt` (1-based): 250ms, 500ms, 1s, ... capped at 8s.
pub fn retry_delay(attempt: u32) -> Duration {
    let factor = 1u64 << attempt.saturating_sub(1).min(5);
    Duration::from_millis((250 * factor).min(8_000))
}

/// Send a request, retrying connection failures, 429, 408 and 5xx.
async fn send_with_retry(
    request: RequestBuilder,
    max_retries: u32,
) -> std::result::Result<Response, String> {
    let mut attempt = 0u32;
    loop {
        let req = request
            .try_clone()
            .ok_or_else(|| "Request body cannot be retried".to_string())?;

        match req.send().await {
            Ok(resp) if resp.status().is_success() => return Ok(resp),
            Ok(resp) if attempt < max_retries && is_retryable(resp.status()) => {
                warn!(
                    "API returned {}, retrying ({}/{})",
                    resp.status(),
                    attempt + 1,
                    max_retries
                );
            }
            Ok(resp) => {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                return Err(format!("API error {}: {}", status, body));
            }
            Err(e) if attempt < max_retries && (e.is_connect() || e.is_timeout()) => {
                warn!("Request failed: {}, retrying ({}/{})", e, attempt + 1, max_retries);
            }
            Err(e) => return Err(format!("Request failed: {}", e)),
        }

        attempt += 1;
        tokio::time::sleep(retry_delay(attempt)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AuthorRole;

    #[test]
    fn test_azure_url() {
        assert_eq!(
            azure_chat_url("https://contoso.openai.azure.com/", "gpt4o", "2024-06-01"),
            "https://contoso.openai.azure.com/openai/deployments/gpt4o/chat/completions?api-version=2024-06-01"
        );
    }

    #[test]
    fn test_openai_body_includes_model() {
        let model = OpenAiCompatModel::openai(Client::new(), "https://api.openai.com/v1/", "gpt-4o", "k", 3);
        assert_eq!(model.url(), "https://api.openai.com/v1/chat/completions");

        let body = model.request_body(
            &[ChatMessage::system("be brief"), ChatMessage::user("hi")],
            &ChatSettings { temperature: 0.2, max_tokens: Some(64) },
        );
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["stream"], true);
        assert_eq!(body["max_tokens"], 64);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
    }

    #[test]
    fn test_azure_body_omits_model() {
        let model = OpenAiCompatModel::azure(
            Client::new(),
            "https://contoso.openai.azure.com",
            "gpt4o",
            "2024-06-01",
            "gpt-4o",
            "k",
            3,
        );
        let body = model.request_body(&[ChatMessage::new(AuthorRole::User, "hi")], &ChatSettings::default());
        assert!(body.get("model").is_none());
        assert!(body.get("max_tokens").is_none());
        assert_eq!(model.model_name(), "gpt-4o");
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!is_retryable(StatusCode::BAD_REQUEST));
        assert!(!is_retryable(StatusCode::UNAUTHORIZED));
    }

    #[test]
    fn test_retry_delay_grows_and_caps() {
        assert_eq!(retry_delay(1), Duration::from_millis(250));
        assert_eq!(retry_delay(2), Duration::from_millis(500));
        assert_eq!(retry_delay(3), Duration::from_millis(1000));
        assert_eq!(retry_delay(30), Duration::from_millis(8000));
    }

    #[tokio::test]
    async fn test_collect_completion() {
        let stream: BoxedStream = Box::pin(tokio_stream::iter(vec![
            StreamChunk::Token("Hello".into()),
            StreamChunk::Token(" there".into()),
            StreamChunk::Done { tokens_used: 2 },
        ]));
        assert_eq!(collect_completion(stream).await.unwrap(), "Hello there");

        let failing: BoxedStream = Box::pin(tokio_stream::iter(vec![
            StreamChunk::Token("partial".into()),
            StreamChunk::Error("boom".into()),
        ]));
        assert!(matches!(collect_completion(failing).await, Err(Error::Provider(_))));
    }
}
