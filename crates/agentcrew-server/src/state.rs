//! Shared application state.

use std::sync::Arc;

use agentcrew_chat::{create_chat_model, ChatModel};
use agentcrew_core::{HostConfig, Result};
use agentcrew_runtime::GroupChatConfig;
use serde::Serialize;
use tracing::info;

/// Which backends the service was started with.
#[derive(Debug, Clone, Serialize)]
pub struct BackendSummary {
    #[serde(rename = "chatService")]
    pub chat_service: String,
    #[serde(rename = "chatModel")]
    pub chat_model: String,
    #[serde(rename = "embeddingService")]
    pub embedding_service: String,
    #[serde(rename = "embeddingModel")]
    pub embedding_model: String,
}

/// Shared application state accessible from all route handlers.
///
/// Everything here is immutable after startup; each request builds its own
/// `GroupChat` from `group_chat`.
pub struct AppState {
    pub model: Arc<dyn ChatModel>,
    pub group_chat: Arc<GroupChatConfig>,
    pub backends: BackendSummary,
}

impl AppState {
    pub fn new(
        model: Arc<dyn ChatModel>,
        group_chat: GroupChatConfig,
        backends: BackendSummary,
    ) -> Self {
        Self {
            model,
            group_chat: Arc::new(group_chat),
            backends,
        }
    }

    /// Resolve backends and build the group chat. Any configuration problem
    /// fails here, before the server starts listening.
    pub fn from_config(config: &HostConfig) -> Result<Self> {
        let chat_backend = config.chat_backend()?;
        let embedding_backend = config.embedding_backend()?;
        info!(
            "Chat backend: {} ({}), embedding backend: {} ({})",
            chat_backend.section_name(),
            chat_backend.model_name(),
            embedding_backend.section_name(),
            embedding_backend.model_name()
        );

        let model = create_chat_model(&chat_backend, config.max_retries);
        let group_chat = GroupChatConfig::from_settings(&config.group_chat, model.clone())?;
        info!(
            "Group chat roster: {:?}, max {} turns",
            group_chat.agent_names(),
            group_chat.maximum_iterations
        );

        let backends = BackendSummary {
            chat_service: chat_backend.section_name().to_string(),
            chat_model: chat_backend.model_name().to_string(),
            embedding_service: embedding_backend.section_name().to_string(),
            embedding_model: embedding_backend.model_name().to_string(),
        };

        Ok(Self::new(model, group_chat, backends))
    }
}
