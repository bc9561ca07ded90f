//! AgentCrew Core: host configuration, backend selection and error types.

pub mod config;
pub mod error;

pub use config::{
    AgentSettings, ChatBackend, EmbeddingBackend, GroupChatSettings, HostConfig, SelectionKind,
    TerminationKind,
};
pub use error::{Error, Result};
