//! Folds streamed fragments into one displayable reply.

use agentcrew_chat::StreamingChatMessage;

/// Marker written between two speakers' text.
pub const AUTHOR_BREAK: &str = "<br/>\n";

/// Accumulates fragments, labelling each change of speaker.
#[derive(Debug, Default)]
pub struct FragmentAggregator {
    buffer: String,
    last_author: Option<String>,
}

impl FragmentAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment and return the text it added, if any.
    ///
    /// Empty fragments are skipped and never count as a speaker change.
    pub fn push(&mut self, fragment: &StreamingChatMessage) -> Option<String> {
        if fragment.content.is_empty() {
            return None;
        }

        let author = fragment.author_name.as_deref().unwrap_or_default();
        let piece = match &self.last_author {
            Some(previous) if previous != author => {
                format!("{}{}: {}", AUTHOR_BREAK, author, fragment.content)
            }
            _ => fragment.content.clone(),
        };

        self.last_author = Some(author.to_string());
        self.buffer.push_str(&piece);
        Some(piece)
    }

    pub fn text(&self) -> &str {
        &self.buffer
    }

    pub fn finish(self) -> String {
        self.buffer
    }
}
