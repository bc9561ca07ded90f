//! Runtime types: agent definitions and the immutable group chat config.

use std::collections::HashSet;
use std::sync::Arc;

use agentcrew_chat::ChatModel;
use agentcrew_core::{
    AgentSettings, Error, GroupChatSettings, Result, SelectionKind, TerminationKind,
};
use serde::Serialize;

use crate::reducer::ChatHistoryTruncationReducer;
use crate::strategy::{
    ApprovalTermination, PromptSelection, PromptTermination, SelectionStrategy,
    SequentialSelection, TerminationStrategy,
};

/// A named agent and the instructions it runs with.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentDefinition {
    pub name: String,
    pub description: String,
    pub instructions: String,
    pub temperature: f64,
}

impl AgentDefinition {
    pub fn new(name: impl Into<String>, instructions: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            instructions: instructions.into(),
            temperature: 0.0,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

impl From<&AgentSettings> for AgentDefinition {
    fn from(s: &AgentSettings) -> Self {
        Self {
            name: s.name.clone(),
            description: s.description.clone(),
            instructions: s.instructions.clone(),
            temperature: s.temperature,
        }
    }
}

/// Built-in roster used when the configuration lists no agents.
pub fn default_roster() -> Vec<AgentDefinition> {
    vec![
        AgentDefinition::new(
            "AutomationCrewLeader",
            "You are a friendly and helpful agent that will connect to the right agent to automatically resolve the task that the employee is looking to do.\n\
             You will also provide a list of other agents that can be used to automate the process.\n\
             You will say the name of the agent to use for the next step in the task.\n\
             If it cannot determine an agent to use, you will aim to answer the question from your own knowledge.\n\
             You should not ask a question of the user.",
        )
        .with_description("Routes the employee's task to the right agent."),
        AgentDefinition::new(
            "SignatureReviewer",
            "A productive agent that checks the supplied image to confirm whether a signature has been applied.\n\
             If no image is supplied, it will ask for one.\n\
             If a document is supplied, it will check for a signature and return the result.\n\
             If a image is supplied but it is not a valid image, it will ask for a valid image.",
        )
        .with_description("Confirms whether a document has been signed."),
        AgentDefinition::new(
            "LeaveReviewer",
            "A strict agent that reviews requests for leave and looks at whether it fits one of the types of leave below.\n\
             - Annual leave - used for most leave requests and used for holidays and standard time off.\n\
             - Sick leave - used when an employee is unable to work due to illness or injury.\n\
             - Family leave - used when an employee needs to take time off to care for a family member.\n\
             - Bereavement leave - used when an employee needs to take time off due to the death of a loved one.\n\
             - Personal leave - used when an employee needs to take time off for personal reasons that do not fall under other categories.\n\
             - Unpaid leave - used when an employee needs to take time off without pay.\n\
             - Maternity leave - used when an employee is taking time off for the birth or adoption of a child.\n\
             - Paternity leave - used when an employee is taking time off for the birth or adoption of a child.\n\
             - Parental leave - used when an employee is taking time off to care for a child.\n\
             - Military leave - used when an employee is called to active duty or training in the military.\n\
             - Jury duty leave - used when an employee is called to serve on a jury or as a witness in a legal proceeding.\n\
             - Voting leave - used when an employee needs time off to vote in an election.\n\
             - Leave of absence - used when an employee needs to take time off for an extended period of time.\n\
             - Compensatory leave - used when an employee is given time off in lieu of overtime worked.\n\
             - Study leave - used when an employee is taking time off to study or attend classes.\n\
             - Sabbatical leave - used when an employee is taking an extended period of time off for personal or professional development.",
        )
        .with_description("Classifies leave requests by leave type."),
    ]
}

/// Immutable group chat configuration: roster, strategies, turn limit.
pub struct GroupChatConfig {
    pub agents: Vec<AgentDefinition>,
    pub selection: Arc<dyn SelectionStrategy>,
    pub termination: Arc<dyn TerminationStrategy>,
    pub maximum_iterations: usize,
}

impl GroupChatConfig {
    /// Validate and assemble a config.
    pub fn new(
        agents: Vec<AgentDefinition>,
        selection: Arc<dyn SelectionStrategy>,
        termination: Arc<dyn TerminationStrategy>,
        maximum_iterations: usize,
    ) -> Result<Self> {
        if agents.is_empty() {
            return Err(Error::Config("group chat needs at least one agent".into()));
        }
        let mut seen = HashSet::new();
        for agent in &agents {
            if agent.name.trim().is_empty() {
                return Err(Error::Config("agent name must not be empty".into()));
            }
            if !seen.insert(agent.name.as_str()) {
                return Err(Error::Config(format!(
                    "duplicate agent name '{}'",
                    agent.name
                )));
            }
        }
        if maximum_iterations == 0 {
            return Err(Error::Config("maximumIterations must be at least 1".into()));
        }

        Ok(Self {
            agents,
            selection,
            termination,
            maximum_iterations,
        })
    }

    /// Build from host settings. Prompt-driven strategies share `model`.
    pub fn from_settings(settings: &GroupChatSettings, model: Arc<dyn ChatModel>) -> Result<Self> {
        let agents: Vec<AgentDefinition> = if settings.agents.is_empty() {
            default_roster()
        } else {
            settings.agents.iter().map(AgentDefinition::from).collect()
        };
        let initial_agent = agents
            .first()
            .map(|a| a.name.clone())
            .ok_or_else(|| Error::Config("group chat needs at least one agent".into()))?;

        let selection: Arc<dyn SelectionStrategy> = match settings.selection {
            SelectionKind::Prompt => Arc::new(PromptSelection::new(
                model.clone(),
                initial_agent.clone(),
                ChatHistoryTruncationReducer::new(settings.selection_history_limit),
            )),
            SelectionKind::Sequential => Arc::new(SequentialSelection::new(initial_agent.clone())),
        };

        let termination: Arc<dyn TerminationStrategy> = match settings.termination {
            TerminationKind::Prompt => Arc::new(PromptTermination::new(
                model,
                ChatHistoryTruncationReducer::new(settings.termination_history_limit),
            )),
            TerminationKind::Approval => Arc::new(ApprovalTermination),
        };

        Self::new(agents, selection, termination, settings.maximum_iterations)
    }

    pub fn agent(&self, name: &str) -> Option<&AgentDefinition> {
        self.agents.iter().find(|a| a.name == name)
    }

    pub fn agent_names(&self) -> Vec<String> {
        self.agents.iter().map(|a| a.name.clone()).collect()
    }
}
