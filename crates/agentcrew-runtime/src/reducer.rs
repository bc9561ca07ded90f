//! History reduction for strategy prompts.

use agentcrew_chat::{AuthorRole, ChatMessage};

/// Keeps only the most recent `target_count` messages.
///
/// A leading system message is preserved and does not count toward the
/// target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatHistoryTruncationReducer {
    target_count: usize,
}

impl ChatHistoryTruncationReducer {
    pub fn new(target_count: usize) -> Self {
        Self { target_count }
    }

    pub fn target_count(&self) -> usize {
        self.target_count
    }

    pub fn reduce(&self, history: &[ChatMessage]) -> Vec<ChatMessage> {
        let (system, rest) = match history.first() {
            Some(first) if first.role == AuthorRole::System => (Some(first), &history[1..]),
            _ => (None, history),
        };

        if rest.len() <= self.target_count {
            return history.to_vec();
        }

        let mut reduced = Vec::with_capacity(self.target_count + 1);
        if let Some(system) = system {
            reduced.push(system.clone());
        }
        reduced.extend_from_slice(&rest[rest.len() - self.target_count..]);
        reduced
    }
}
