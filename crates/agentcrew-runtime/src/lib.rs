//! Group chat runtime: runs a roster of agents in turns.
//!
//! Each turn a `SelectionStrategy` picks the speaker, the agent streams its
//! reply, and a `TerminationStrategy` decides whether the chat is done.
//! The roster and strategies live in an immutable `GroupChatConfig` shared
//! across requests; every request gets its own `GroupChat`.

pub mod agent;
pub mod orchestrator;
pub mod prompts;
pub mod reducer;
pub mod strategy;
pub mod types;

pub use agent::ChatAgent;
pub use orchestrator::{FragmentStream, GroupChat, MessageStream};
pub use reducer::ChatHistoryTruncationReducer;
pub use strategy::{
    ApprovalTermination, PromptSelection, PromptTermination, SelectionStrategy,
    SequentialSelection, TerminationStrategy,
};
pub use tokio_util::sync::CancellationToken;
pub use types::*;
