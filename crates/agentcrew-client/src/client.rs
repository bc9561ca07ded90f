//! HTTP client for `/agent/completions`.
//!
//! Keeps the conversation transcript between calls: after each reply the
//! prompt and the aggregated answer are appended to it.

use std::pin::Pin;

use agentcrew_chat::{AgentCompletionRequest, ChatHistory, ChatMessage, StreamingChatMessage};
use agentcrew_core::{Error, Result};
use futures::Stream;
use reqwest::Client;
use tokio_stream::StreamExt;
use tracing::{debug, warn};

use crate::aggregator::FragmentAggregator;

/// Display text as it arrives, one piece per non-empty fragment.
pub type ReplyStream<'a> = Pin<Box<dyn Stream<Item = Result<String>> + Send + 'a>>;

pub struct AgentCompletionsClient {
    http: Client,
    base_url: String,
    history: ChatHistory,
}

impl AgentCompletionsClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            history: ChatHistory::new(),
        }
    }

    pub fn history(&self) -> &ChatHistory {
        &self.history
    }

    pub fn clear_history(&mut self) {
        self.history = ChatHistory::new();
    }

    fn endpoint(&self) -> String {
        format!("{}/agent/completions", self.base_url)
    }

    async fn post(&self, prompt: &str, is_streaming: bool) -> Result<reqwest::Response> {
        let request = AgentCompletionRequest {
            prompt: prompt.to_string(),
            chat_history: self.history.clone(),
            is_streaming,
        };
        debug!(
            "POST {} (streaming={}, history={})",
            self.endpoint(),
            is_streaming,
            self.history.len()
        );

        let response = self
            .http
            .post(self.endpoint())
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let detail = problem_detail(&body).unwrap_or(body);
        warn!("Completion request failed with {}: {}", status, detail);
        if status.is_client_error() {
            Err(Error::InvalidRequest(detail))
        } else {
            Err(Error::Http(format!("{}: {}", status, detail)))
        }
    }

    fn record(&mut self, prompt: &str, reply: String) {
        self.history.add_user_message(prompt);
        self.history.add_assistant_message(reply);
    }

    /// Ask for the whole group chat at once.
    pub async fn complete(&mut self, prompt: &str) -> Result<Vec<ChatMessage>> {
        let messages: Vec<ChatMessage> = self
            .post(prompt, false)
            .await?
            .json()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let mut aggregator = FragmentAggregator::new();
        for message in &messages {
            aggregator.push(&StreamingChatMessage {
                role: message.role,
                content: message.content.clone(),
                author_name: message.author_name.clone(),
            });
        }
        self.record(prompt, aggregator.finish());
        Ok(messages)
    }

    /// Stream the group chat, yielding display text as fragments arrive.
    ///
    /// The transcript is only updated once the stream has been read to the end.
    pub fn complete_streaming<'a>(&'a mut self, prompt: &'a str) -> ReplyStream<'a> {
        Box::pin(async_stream::try_stream! {
            let response = self.post(prompt, true).await?;
            let mut bytes = response.bytes_stream();
            let mut decoder = NdjsonDecoder::default();
            let mut aggregator = FragmentAggregator::new();

            while let Some(chunk) = bytes.next().await {
                let chunk = chunk.map_err(|e| Error::Http(format!("Stream read error: {}", e)))?;
                for fragment in decoder.push(&chunk)? {
                    if let Some(piece) = aggregator.push(&fragment) {
                        yield piece;
                    }
                }
            }
            if let Some(fragment) = decoder.finish()? {
                if let Some(piece) = aggregator.push(&fragment) {
                    yield piece;
                }
            }

            self.record(prompt, aggregator.finish());
        })
    }
}

fn problem_detail(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value.get("detail")?.as_str().map(String::from)
}

/// Splits a byte stream into NDJSON fragments.
///
/// Chunks may end mid-line or mid-character; only complete lines are parsed.
#[derive(Debug, Default)]
pub struct NdjsonDecoder {
    buffer: Vec<u8>,
}

impl NdjsonDecoder {
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<StreamingChatMessage>> {
        self.buffer.extend_from_slice(bytes);
        let mut fragments = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(fragment) = parse_line(&line)? {
                fragments.push(fragment);
            }
        }
        Ok(fragments)
    }

    /// Parse whatever is left once the stream has ended.
    pub fn finish(self) -> Result<Option<StreamingChatMessage>> {
        parse_line(&self.buffer)
    }
}

fn parse_line(line: &[u8]) -> Result<Option<StreamingChatMessage>> {
    let line = std::str::from_utf8(line)
        .map_err(|e| Error::Http(format!("Invalid UTF-8 in stream: {}", e)))?
        .trim();
    if line.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(line)?))
}
