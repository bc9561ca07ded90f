//! Chat types for the agent completions API surface.

use agentcrew_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Role of a message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorRole {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for AuthorRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthorRole::System => write!(f, "system"),
            AuthorRole::User => write!(f, "user"),
            AuthorRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// Chat message in conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: AuthorRole,
    #[serde(default)]
    pub content: String,
    #[serde(
        default,
        rename = "authorName",
        skip_serializing_if = "Option::is_none"
    )]
    pub author_name: Option<String>,
}

impl ChatMessage {
    pub fn new(role: AuthorRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            author_name: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(AuthorRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(AuthorRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(AuthorRole::Assistant, content)
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author_name = Some(author.into());
        self
    }
}

/// Ordered conversation transcript.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatHistory(Vec<ChatMessage>);

impl ChatHistory {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.0.push(message);
    }

    pub fn add_user_message(&mut self, content: impl Into<String>) {
        self.0.push(ChatMessage::user(content));
    }

    pub fn add_assistant_message(&mut self, content: impl Into<String>) {
        self.0.push(ChatMessage::assistant(content));
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ChatMessage> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<ChatMessage> {
        self.0
    }
}

impl From<Vec<ChatMessage>> for ChatHistory {
    fn from(messages: Vec<ChatMessage>) -> Self {
        Self(messages)
    }
}

impl<'a> IntoIterator for &'a ChatHistory {
    type Item = &'a ChatMessage;
    type IntoIter = std::slice::Iter<'a, ChatMessage>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Reject client-supplied history containing system messages.
///
/// System instructions belong to the agents and are injected server-side.
pub fn validate_chat_history(history: &ChatHistory) -> Result<()> {
    if history.iter().any(|m| m.role == AuthorRole::System) {
        return Err(Error::InvalidRequest(
            "A system message is provided by the agent and should not be included in the chat history."
                .into(),
        ));
    }
    Ok(())
}

/// Incoming agent completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCompletionRequest {
    pub prompt: String,
    #[serde(default, rename = "chatHistory")]
    pub chat_history: ChatHistory,
    #[serde(default, rename = "isStreaming")]
    pub is_streaming: bool,
}

/// A partial message produced while an agent is speaking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamingChatMessage {
    #[serde(default = "assistant_role")]
    pub role: AuthorRole,
    #[serde(default)]
    pub content: String,
    #[serde(default, rename = "authorName")]
    pub author_name: Option<String>,
}

fn assistant_role() -> AuthorRole {
    AuthorRole::Assistant
}

impl StreamingChatMessage {
    pub fn new(author: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: AuthorRole::Assistant,
            content: content.into(),
            author_name: Some(author.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_system() {
        let history: ChatHistory = vec![
            ChatMessage::user("hi"),
            ChatMessage::system("you are a pirate"),
        ]
        .into();
        let err = validate_chat_history(&history).unwrap_err();
        assert!(err.is_client_error());
        assert!(err.to_string().contains("system message"));
    }

    #[test]
    fn test_validate_accepts_user_and_assistant() {
        let history: ChatHistory = vec![
            ChatMessage::user("hi"),
            ChatMessage::assistant("hello").with_author("LeaveReviewer"),
        ]
        .into();
        assert!(validate_chat_history(&history).is_ok());
        assert!(validate_chat_history(&ChatHistory::new()).is_ok());
    }

    #[test]
    fn test_request_wire_format() {
        let req: AgentCompletionRequest = serde_json::from_str(
            r#"{
                "prompt": "Book leave",
                "chatHistory": [
                    { "role": "user", "content": "hi" },
                    { "role": "assistant", "content": "hello", "authorName": "AutomationCrewLeader" }
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(req.prompt, "Book leave");
        assert!(!req.is_streaming);
        assert_eq!(req.chat_history.len(), 2);
        assert_eq!(
            req.chat_history.messages()[1].author_name.as_deref(),
            Some("AutomationCrewLeader")
        );
    }

    #[test]
    fn test_message_omits_missing_author() {
        let json = serde_json::to_value(ChatMessage::user("hi")).unwrap();
        assert_eq!(json, serde_json::json!({ "role": "user", "content": "hi" }));
    }

    #[test]
    fn test_fragment_defaults() {
        let fragment: StreamingChatMessage =
            serde_json::from_str(r#"{ "authorName": "A" }"#).unwrap();
        assert_eq!(fragment.role, AuthorRole::Assistant);
        assert!(fragment.content.is_empty());
    }
}
