//! Group chat orchestrator: runs agents in turns until done.

use std::pin::Pin;
use std::sync::Arc;

use agentcrew_chat::{ChatMessage, ChatModel, StreamChunk, StreamingChatMessage};
use agentcrew_core::{Error, Result};
use futures::Stream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::agent::ChatAgent;
use crate::types::GroupChatConfig;

/// Complete agent messages, one per turn.
pub type MessageStream = Pin<Box<dyn Stream<Item = Result<ChatMessage>> + Send>>;

/// Token-level fragments, stamped with the speaking agent.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<StreamingChatMessage>> + Send>>;

enum GroupChatEvent {
    Fragment(StreamingChatMessage),
    Message(ChatMessage),
}

type EventStream = Pin<Box<dyn Stream<Item = Result<GroupChatEvent>> + Send>>;

enum Step {
    Cancelled,
    Chunk(Option<StreamChunk>),
}

/// One conversation's run through the group chat.
///
/// Built per request from the shared config; owns its transcript.
pub struct GroupChat {
    config: Arc<GroupChatConfig>,
    model: Arc<dyn ChatModel>,
    history: Vec<ChatMessage>,
}

impl GroupChat {
    pub fn new(config: Arc<GroupChatConfig>, model: Arc<dyn ChatModel>) -> Self {
        Self {
            config,
            model,
            history: Vec::new(),
        }
    }

    pub fn add_message(&mut self, message: ChatMessage) {
        self.history.push(message);
    }

    pub fn add_messages(&mut self, messages: impl IntoIterator<Item = ChatMessage>) {
        self.history.extend(messages);
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Run the chat, yielding each agent's complete message.
    pub fn invoke(self, cancel: CancellationToken) -> MessageStream {
        Box::pin(self.run(cancel).filter_map(|event| match event {
            Ok(GroupChatEvent::Message(m)) => Some(Ok(m)),
            Ok(GroupChatEvent::Fragment(_)) => None,
            Err(e) => Some(Err(e)),
        }))
    }

    /// Run the chat, yielding fragments as the agents produce them.
    pub fn invoke_streaming(self, cancel: CancellationToken) -> FragmentStream {
        Box::pin(self.run(cancel).filter_map(|event| match event {
            Ok(GroupChatEvent::Fragment(f)) => Some(Ok(f)),
            Ok(GroupChatEvent::Message(_)) => None,
            Err(e) => Some(Err(e)),
        }))
    }

    fn run(self, cancel: CancellationToken) -> EventStream {
        let GroupChat {
            config,
            model,
            mut history,
        } = self;

        Box::pin(async_stream::try_stream! {
            for iteration in 0..config.maximum_iterations {
                if cancel.is_cancelled() {
                    break;
                }

                let name = config.selection.select_next(&config.agents, &history).await?;
                let definition = config.agent(&name).ok_or_else(|| {
                    Error::Orchestration(format!("Selected agent '{}' is not in the roster", name))
                })?;
                info!("Turn {}: {}", iteration + 1, definition.name);

                let mut stream = ChatAgent::new(definition, model.clone()).invoke_stream(&history);
                let mut content = String::new();
                let mut cancelled = false;

                loop {
                    let step = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => Step::Cancelled,
                        chunk = stream.next() => Step::Chunk(chunk),
                    };

                    match step {
                        Step::Cancelled => {
                            cancelled = true;
                            break;
                        }
                        Step::Chunk(None) | Step::Chunk(Some(StreamChunk::Done { .. })) => break,
                        Step::Chunk(Some(StreamChunk::Token(token))) => {
                            content.push_str(&token);
                            yield GroupChatEvent::Fragment(StreamingChatMessage::new(
                                definition.name.clone(),
                                token,
                            ));
                        }
                        Step::Chunk(Some(StreamChunk::Error(e))) => {
                            Err::<(), Error>(Error::Provider(e))?;
                        }
                    }
                }

                if cancelled {
                    warn!("Group chat cancelled during {}'s turn", definition.name);
                    break;
                }

                let message = ChatMessage::assistant(content).with_author(definition.name.clone());
                history.push(message.clone());
                yield GroupChatEvent::Message(message);

                if config.termination.applies_to(definition)
                    && config.termination.should_terminate(definition, &history).await?
                {
                    debug!("Group chat terminated after {}", definition.name);
                    break;
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::{ApprovalTermination, SequentialSelection};
    use crate::types::AgentDefinition;
    use agentcrew_chat::ScriptedChatModel;

    fn config(maximum_iterations: usize) -> Arc<GroupChatConfig> {
        Arc::new(
            GroupChatConfig::new(
                vec![
                    AgentDefinition::new("Writer", "You are Writer."),
                    AgentDefinition::new("Reviewer", "You are Reviewer."),
                ],
                Arc::new(SequentialSelection::new("Writer")),
                Arc::new(ApprovalTermination),
                maximum_iterations,
            )
            .unwrap(),
        )
    }

    /// Writer drafts; Reviewer approves once a draft exists.
    fn model() -> Arc<dyn ChatModel> {
        Arc::new(ScriptedChatModel::new(|msgs| {
            if msgs[0].content.contains("Writer") {
                Ok("Here is a draft".into())
            } else {
                Ok("I approve it".into())
            }
        }))
    }

    #[tokio::test]
    async fn test_invoke_until_approval() {
        let mut chat = GroupChat::new(config(5), model());
        chat.add_message(ChatMessage::user("Write a slogan"));

        let messages: Vec<ChatMessage> = chat
            .invoke(CancellationToken::new())
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].author_name.as_deref(), Some("Writer"));
        assert_eq!(messages[0].content, "Here is a draft");
        assert_eq!(messages[1].author_name.as_deref(), Some("Reviewer"));
    }

    #[tokio::test]
    async fn test_stops_at_maximum_iterations() {
        let model: Arc<dyn ChatModel> = Arc::new(ScriptedChatModel::fixed("still thinking"));
        let mut chat = GroupChat::new(config(3), model);
        chat.add_message(ChatMessage::user("Go"));

        let messages: Vec<_> = chat.invoke(CancellationToken::new()).collect().await;
        assert_eq!(messages.len(), 3);
        let authors: Vec<_> = messages
            .into_iter()
            .map(|m| m.unwrap().author_name.unwrap())
            .collect();
        assert_eq!(authors, vec!["Writer", "Reviewer", "Writer"]);
    }

    #[tokio::test]
    async fn test_streaming_fragments_carry_author() {
        let mut chat = GroupChat::new(config(5), model());
        chat.add_message(ChatMessage::user("Write a slogan"));

        let fragments: Vec<StreamingChatMessage> = chat
            .invoke_streaming(CancellationToken::new())
            .map(|f| f.unwrap())
            .collect()
            .await;

        let writer: String = fragments
            .iter()
            .filter(|f| f.author_name.as_deref() == Some("Writer"))
            .map(|f| f.content.as_str())
            .collect();
        assert_eq!(writer, "Here is a draft");
        assert!(fragments.len() > 2);
        assert_eq!(
            fragments.last().unwrap().author_name.as_deref(),
            Some("Reviewer")
        );
    }

    #[tokio::test]
    async fn test_cancellation_stops_fragments() {
        let cancel = CancellationToken::new();
        let mut chat = GroupChat::new(config(5), model());
        chat.add_message(ChatMessage::user("Write a slogan"));

        let mut stream = chat.invoke_streaming(cancel.clone());
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.content, "Here ");

        cancel.cancel();
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let chat = GroupChat::new(config(5), model());
        let messages: Vec<_> = chat.invoke(cancel).collect().await;
        assert!(messages.is_empty());
    }

    #[tokio::test]
    async fn test_model_error_ends_stream() {
        let model: Arc<dyn ChatModel> =
            Arc::new(ScriptedChatModel::new(|_| Err("API error 500".into())));
        let mut chat = GroupChat::new(config(5), model);
        chat.add_message(ChatMessage::user("Go"));

        let items: Vec<_> = chat.invoke(CancellationToken::new()).collect().await;
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(Error::Provider(_))));
    }

    #[tokio::test]
    async fn test_unknown_agent_selected() {
        struct Rogue;
        impl crate::strategy::SelectionStrategy for Rogue {
            fn select_next<'a>(
                &'a self,
                _agents: &'a [AgentDefinition],
                _history: &'a [ChatMessage],
            ) -> futures::future::BoxFuture<'a, Result<String>> {
                Box::pin(std::future::ready(Ok("Ghost".to_string())))
            }
        }

        let config = Arc::new(
            GroupChatConfig::new(
                vec![AgentDefinition::new("Writer", "w")],
                Arc::new(Rogue),
                Arc::new(ApprovalTermination),
                2,
            )
            .unwrap(),
        );
        let items: Vec<_> = GroupChat::new(config, model())
            .invoke(CancellationToken::new())
            .collect()
            .await;
        assert!(matches!(items[0], Err(Error::Orchestration(_))));
    }
}
