//! Chat transcript types and streaming chat-completion providers.
//!
//! Providers stream tokens via SSE from OpenAI-compatible APIs
//! (OpenAI and Azure OpenAI share the wire format).

pub mod providers;
#[cfg(any(test, feature = "test-util"))]
pub mod scripted;
pub mod sse;
pub mod types;

pub use providers::{create_chat_model, BoxedStream, ChatModel, ChatSettings, StreamChunk};
#[cfg(any(test, feature = "test-util"))]
pub use scripted::ScriptedChatModel;
pub use types::*;
