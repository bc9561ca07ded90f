//! In-memory chat model that answers through a caller-supplied script.
//!
//! Used by orchestration and HTTP tests in place of a network provider.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::providers::{BoxedStream, ChatModel, ChatSettings, StreamChunk};
use crate::types::ChatMessage;

type Script = dyn Fn(&[ChatMessage]) -> Result<String, String> + Send + Sync;

/// Replies with whatever the script returns, split into word tokens.
pub struct ScriptedChatModel {
    script: Box<Script>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedChatModel {
    pub fn new<F>(script: F) -> Self
    where
        F: Fn(&[ChatMessage]) -> Result<String, String> + Send + Sync + 'static,
    {
        Self {
            script: Box::new(script),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Always answer with the same text.
    pub fn fixed(reply: impl Into<String>) -> Self {
        let reply = reply.into();
        Self::new(move |_| Ok(reply.clone()))
    }

    /// Number of completions requested so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Shared call counter, readable after the model is moved into an `Arc<dyn ChatModel>`.
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl ChatModel for ScriptedChatModel {
    fn stream_chat(&self, messages: Vec<ChatMessage>, _settings: &ChatSettings) -> BoxedStream {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let chunks: Vec<StreamChunk> = match (self.script)(&messages) {
            Ok(reply) => {
                let mut chunks: Vec<StreamChunk> = reply
                    .split_inclusive(' ')
                    .map(|t| StreamChunk::Token(t.to_string()))
                    .collect();
                let tokens_used = chunks.len();
                chunks.push(StreamChunk::Done { tokens_used });
                chunks
            }
            Err(e) => vec![StreamChunk::Error(e)],
        };
        Box::pin(tokio_stream::iter(chunks))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}
