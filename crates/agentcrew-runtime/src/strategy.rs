//! Turn selection and termination strategies.
//!
//! Two traits with rule-based and model-driven variants:
//! - `SequentialSelection` / `PromptSelection` pick the next speaker.
//! - `ApprovalTermination` / `PromptTermination` decide when to stop.

use std::sync::Arc;

use agentcrew_chat::providers::collect_completion;
use agentcrew_chat::{AuthorRole, ChatMessage, ChatModel, ChatSettings};
use agentcrew_core::Result;
use futures::future::BoxFuture;
use tracing::debug;

use crate::prompts::{self, SELECTION_TEMPLATE, TERMINATION_TEMPLATE};
use crate::reducer::ChatHistoryTruncationReducer;
use crate::types::AgentDefinition;

/// Picks which agent speaks next.
pub trait SelectionStrategy: Send + Sync {
    fn select_next<'a>(
        &'a self,
        agents: &'a [AgentDefinition],
        history: &'a [ChatMessage],
    ) -> BoxFuture<'a, Result<String>>;
}

/// Decides whether the chat is finished after `agent` has spoken.
pub trait TerminationStrategy: Send + Sync {
    fn should_terminate<'a>(
        &'a self,
        agent: &'a AgentDefinition,
        history: &'a [ChatMessage],
    ) -> BoxFuture<'a, Result<bool>>;

    /// Whether this strategy is consulted after `agent`'s turns.
    fn applies_to(&self, _agent: &AgentDefinition) -> bool {
        true
    }
}

/// The agent that spoke most recently after the last user message.
pub fn last_speaker(history: &[ChatMessage]) -> Option<&str> {
    for message in history.iter().rev() {
        match message.role {
            AuthorRole::User => return None,
            AuthorRole::Assistant => {
                if let Some(author) = &message.author_name {
                    return Some(author);
                }
            }
            AuthorRole::System => {}
        }
    }
    None
}

/// Find the roster name mentioned earliest in a model reply.
///
/// Matching is case-insensitive; when two names start at the same position
/// the longer one wins.
pub fn parse_agent_name(reply: &str, agents: &[AgentDefinition]) -> Option<String> {
    let reply = reply.to_lowercase();
    agents
        .iter()
        .filter_map(|a| reply.find(&a.name.to_lowercase()).map(|pos| (pos, a)))
        .min_by(|(pa, a), (pb, b)| pa.cmp(pb).then(b.name.len().cmp(&a.name.len())))
        .map(|(_, a)| a.name.clone())
}

// ---------------------------------------------------------------
// Selection
// ---------------------------------------------------------------

/// Round-robin over the roster, starting from the initial agent.
pub struct SequentialSelection {
    initial_agent: String,
}

impl SequentialSelection {
    pub fn new(initial_agent: impl Into<String>) -> Self {
        Self {
            initial_agent: initial_agent.into(),
        }
    }

    fn next_after(&self, agents: &[AgentDefinition], history: &[ChatMessage]) -> String {
        let Some(previous) = last_speaker(history) else {
            return self.initial_agent.clone();
        };
        match agents.iter().position(|a| a.name == previous) {
            Some(i) => agents[(i + 1) % agents.len()].name.clone(),
            None => self.initial_agent.clone(),
        }
    }
}

impl SelectionStrategy for SequentialSelection {
    fn select_next<'a>(
        &'a self,
        agents: &'a [AgentDefinition],
        history: &'a [ChatMessage],
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(std::future::ready(Ok(self.next_after(agents, history))))
    }
}

/// Asks the model to name the next participant.
///
/// The first turn after a user message always goes to the initial agent, and
/// a reply naming no known agent falls back to it as well.
pub struct PromptSelection {
    model: Arc<dyn ChatModel>,
    initial_agent: String,
    reducer: ChatHistoryTruncationReducer,
    template: String,
}

impl PromptSelection {
    pub fn new(
        model: Arc<dyn ChatModel>,
        initial_agent: impl Into<String>,
        reducer: ChatHistoryTruncationReducer,
    ) -> Self {
        Self {
            model,
            initial_agent: initial_agent.into(),
            reducer,
            template: SELECTION_TEMPLATE.to_string(),
        }
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }
}

impl SelectionStrategy for PromptSelection {
    fn select_next<'a>(
        &'a self,
        agents: &'a [AgentDefinition],
        history: &'a [ChatMessage],
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            if last_speaker(history).is_none() {
                return Ok(self.initial_agent.clone());
            }

            let prompt = prompts::render(&self.template, agents, &self.reducer.reduce(history));
            let stream = self
                .model
                .stream_chat(vec![ChatMessage::user(prompt)], &ChatSettings::default());
            let reply = collect_completion(stream).await?;
            let selected =
                parse_agent_name(&reply, agents).unwrap_or_else(|| self.initial_agent.clone());
            debug!("Selection reply {:?} -> {}", reply.trim(), selected);
            Ok(selected)
        })
    }
}

// ---------------------------------------------------------------
// Termination
// ---------------------------------------------------------------

/// Stops once the last message contains "approve" (any case).
pub struct ApprovalTermination;

impl TerminationStrategy for ApprovalTermination {
    fn should_terminate<'a>(
        &'a self,
        _agent: &'a AgentDefinition,
        history: &'a [ChatMessage],
    ) -> BoxFuture<'a, Result<bool>> {
        let approved = history
            .last()
            .map(|m| m.content.to_lowercase().contains("approve"))
            .unwrap_or(false);
        Box::pin(std::future::ready(Ok(approved)))
    }
}

/// Asks the model whether the request is complete; "true" in the reply stops.
pub struct PromptTermination {
    model: Arc<dyn ChatModel>,
    reducer: ChatHistoryTruncationReducer,
    template: String,
    /// Agents whose turns are checked. Empty means all.
    agents: Vec<String>,
}

impl PromptTermination {
    pub fn new(model: Arc<dyn ChatModel>, reducer: ChatHistoryTruncationReducer) -> Self {
        Self {
            model,
            reducer,
            template: TERMINATION_TEMPLATE.to_string(),
            agents: Vec::new(),
        }
    }

    pub fn with_agents(mut self, agents: Vec<String>) -> Self {
        self.agents = agents;
        self
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }
}

impl TerminationStrategy for PromptTermination {
    fn should_terminate<'a>(
        &'a self,
        agent: &'a AgentDefinition,
        history: &'a [ChatMessage],
    ) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            let prompt = prompts::render(
                &self.template,
                std::slice::from_ref(agent),
                &self.reducer.reduce(history),
            );
            let stream = self
                .model
                .stream_chat(vec![ChatMessage::user(prompt)], &ChatSettings::default());
            let reply = collect_completion(stream).await?;
            let done = reply.to_lowercase().contains("true");
            debug!("Termination reply {:?} after {} -> {}", reply.trim(), agent.name, done);
            Ok(done)
        })
    }

    fn applies_to(&self, agent: &AgentDefinition) -> bool {
        self.agents.is_empty() || self.agents.iter().any(|a| *a == agent.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentcrew_chat::ScriptedChatModel;

    fn roster() -> Vec<AgentDefinition> {
        vec![
            AgentDefinition::new("AutomationCrewLeader", "lead"),
            AgentDefinition::new("SignatureReviewer", "sign"),
            AgentDefinition::new("LeaveReviewer", "leave"),
        ]
    }

    fn said(agent: &str, text: &str) -> ChatMessage {
        ChatMessage::assistant(text).with_author(agent)
    }

    #[test]
    fn test_last_speaker_resets_on_user() {
        let history = vec![said("LeaveReviewer", "x"), ChatMessage::user("new task")];
        assert_eq!(last_speaker(&history), None);

        let history = vec![ChatMessage::user("task"), said("LeaveReviewer", "x")];
        assert_eq!(last_speaker(&history), Some("LeaveReviewer"));
    }

    #[test]
    fn test_parse_agent_name() {
        let agents = roster();
        assert_eq!(
            parse_agent_name("leavereviewer", &agents).as_deref(),
            Some("LeaveReviewer")
        );
        assert_eq!(
            parse_agent_name("Next: SignatureReviewer, then LeaveReviewer", &agents).as_deref(),
            Some("SignatureReviewer")
        );
        assert_eq!(parse_agent_name("nobody", &agents), None);
    }

    #[test]
    fn test_parse_prefers_longer_name_at_same_position() {
        let agents = vec![
            AgentDefinition::new("Leave", "a"),
            AgentDefinition::new("LeaveReviewer", "b"),
        ];
        assert_eq!(
            parse_agent_name("LeaveReviewer", &agents).as_deref(),
            Some("LeaveReviewer")
        );
    }

    #[tokio::test]
    async fn test_sequential_round_robin() {
        let agents = roster();
        let strategy = SequentialSelection::new("AutomationCrewLeader");

        let mut history = vec![ChatMessage::user("task")];
        assert_eq!(
            strategy.select_next(&agents, &history).await.unwrap(),
            "AutomationCrewLeader"
        );

        history.push(said("AutomationCrewLeader", "a"));
        assert_eq!(
            strategy.select_next(&agents, &history).await.unwrap(),
            "SignatureReviewer"
        );

        history.push(said("LeaveReviewer", "c"));
        assert_eq!(
            strategy.select_next(&agents, &history).await.unwrap(),
            "AutomationCrewLeader"
        );
    }

    #[tokio::test]
    async fn test_prompt_selection_first_turn_skips_model() {
        let model = Arc::new(ScriptedChatModel::fixed("LeaveReviewer"));
        let strategy =
            PromptSelection::new(model.clone(), "AutomationCrewLeader", ChatHistoryTruncationReducer::new(3));
        let selected = strategy
            .select_next(&roster(), &[ChatMessage::user("I need leave")])
            .await
            .unwrap();
        assert_eq!(selected, "AutomationCrewLeader");
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn test_prompt_selection_parses_reply() {
        let model = Arc::new(ScriptedChatModel::fixed("LeaveReviewer"));
        let strategy =
            PromptSelection::new(model.clone(), "AutomationCrewLeader", ChatHistoryTruncationReducer::new(3));
        let history = vec![
            ChatMessage::user("I need leave"),
            said("AutomationCrewLeader", "Ask LeaveReviewer"),
        ];
        assert_eq!(
            strategy.select_next(&roster(), &history).await.unwrap(),
            "LeaveReviewer"
        );
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn test_prompt_selection_falls_back_to_initial() {
        let model = Arc::new(ScriptedChatModel::fixed("I am not sure"));
        let strategy =
            PromptSelection::new(model, "AutomationCrewLeader", ChatHistoryTruncationReducer::new(3));
        let history = vec![ChatMessage::user("hi"), said("LeaveReviewer", "hello")];
        assert_eq!(
            strategy.select_next(&roster(), &history).await.unwrap(),
            "AutomationCrewLeader"
        );
    }

    #[tokio::test]
    async fn test_prompt_selection_sees_truncated_history() {
        let model = Arc::new(ScriptedChatModel::new(|msgs| {
            let prompt = &msgs[0].content;
            if prompt.contains("oldest") {
                Ok("SignatureReviewer".into())
            } else {
                Ok("LeaveReviewer".into())
            }
        }));
        let strategy = PromptSelection::new(model, "AutomationCrewLeader", ChatHistoryTruncationReducer::new(1))
            .with_template("{{$history}}");
        let history = vec![
            ChatMessage::user("oldest"),
            said("AutomationCrewLeader", "a"),
        ];
        assert_eq!(
            strategy.select_next(&roster(), &history).await.unwrap(),
            "LeaveReviewer"
        );
    }

    #[tokio::test]
    async fn test_approval_termination_case_insensitive() {
        let agent = AgentDefinition::new("LeaveReviewer", "x");
        let strategy = ApprovalTermination;
        assert!(strategy
            .should_terminate(&agent, &[said("LeaveReviewer", "I APPROVE this request")])
            .await
            .unwrap());
        assert!(!strategy
            .should_terminate(&agent, &[said("LeaveReviewer", "Needs more detail")])
            .await
            .unwrap());
        assert!(!strategy.should_terminate(&agent, &[]).await.unwrap());
    }

    #[tokio::test]
    async fn test_prompt_termination() {
        let agent = AgentDefinition::new("LeaveReviewer", "x");
        let yes = PromptTermination::new(
            Arc::new(ScriptedChatModel::fixed("True")),
            ChatHistoryTruncationReducer::new(4),
        );
        assert!(yes.should_terminate(&agent, &[said("LeaveReviewer", "done")]).await.unwrap());

        let no = PromptTermination::new(
            Arc::new(ScriptedChatModel::fixed("false")),
            ChatHistoryTruncationReducer::new(4),
        );
        assert!(!no.should_terminate(&agent, &[said("LeaveReviewer", "hm")]).await.unwrap());
    }

    #[tokio::test]
    async fn test_prompt_termination_model_error() {
        let agent = AgentDefinition::new("LeaveReviewer", "x");
        let strategy = PromptTermination::new(
            Arc::new(ScriptedChatModel::new(|_| Err("quota".into()))),
            ChatHistoryTruncationReducer::new(4),
        );
        assert!(strategy.should_terminate(&agent, &[]).await.is_err());
    }

    #[test]
    fn test_prompt_termination_applies_to() {
        let model: Arc<dyn ChatModel> = Arc::new(ScriptedChatModel::fixed("true"));
        let all = PromptTermination::new(model.clone(), ChatHistoryTruncationReducer::new(4));
        assert!(all.applies_to(&AgentDefinition::new("Any", "x")));

        let only = PromptTermination::new(model, ChatHistoryTruncationReducer::new(4))
            .with_agents(vec!["LeaveReviewer".into()]);
        assert!(only.applies_to(&AgentDefinition::new("LeaveReviewer", "x")));
        assert!(!only.applies_to(&AgentDefinition::new("SignatureReviewer", "x")));
    }
}
