//! A single chat-completion agent.

use std::sync::Arc;

use agentcrew_chat::{AuthorRole, BoxedStream, ChatMessage, ChatModel, ChatSettings};

use crate::types::AgentDefinition;

/// An agent bound to the model it speaks through.
pub struct ChatAgent<'a> {
    definition: &'a AgentDefinition,
    model: Arc<dyn ChatModel>,
}

impl<'a> ChatAgent<'a> {
    pub fn new(definition: &'a AgentDefinition, model: Arc<dyn ChatModel>) -> Self {
        Self { definition, model }
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    /// Build the model input: instructions first, then the transcript.
    ///
    /// Other agents' replies are labelled with their author so the model can
    /// tell the speakers apart; the agent's own replies are passed as-is.
    pub fn build_messages(&self, history: &[ChatMessage]) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(ChatMessage::system(self.definition.instructions.clone()));

        for message in history {
            match (&message.role, &message.author_name) {
                (AuthorRole::System, _) => {}
                (AuthorRole::Assistant, Some(author)) if *author != self.definition.name => {
                    messages.push(ChatMessage::assistant(format!(
                        "{}: {}",
                        author, message.content
                    )));
                }
                (role, _) => messages.push(ChatMessage::new(*role, message.content.clone())),
            }
        }

        messages
    }

    /// Stream this agent's reply to `history`.
    pub fn invoke_stream(&self, history: &[ChatMessage]) -> BoxedStream {
        let settings = ChatSettings {
            temperature: self.definition.temperature,
            max_tokens: None,
        };
        self.model.stream_chat(self.build_messages(history), &settings)
    }
}
