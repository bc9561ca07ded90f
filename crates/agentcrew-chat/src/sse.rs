//! Incremental SSE line decoding for chat-completion streams.

/// A decoded SSE payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// A `data:` payload other than the terminator.
    Data(String),
    /// The `data: [DONE]` terminator.
    Done,
}

/// Buffers raw body chunks and yields complete `data:` payloads.
///
/// Network chunks can split a line anywhere, including inside a multi-byte
/// character, so bytes stay in the buffer until their newline arrives.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every event completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(line_end) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=line_end).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim();

            if line.is_empty() || line.starts_with(':') {
                continue;
            }

            if let Some(data) = line.strip_prefix("data:") {
                let data = data.trim();
                if data == "[DONE]" {
                    events.push(SseEvent::Done);
                } else {
                    events.push(SseEvent::Data(data.to_string()));
                }
            }
        }

        events
    }
}

/// Extract the delta text from an OpenAI-style streaming chunk.
pub fn delta_content(data: &str) -> Option<String> {
    let parsed: serde_json::Value = serde_json::from_str(data).ok()?;
    parsed["choices"][0]["delta"]["content"]
        .as_str()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Extract an API error message embedded in a stream chunk.
pub fn stream_error(data: &str) -> Option<String> {
    let parsed: serde_json::Value = serde_json::from_str(data).ok()?;
    parsed["error"]["message"].as_str().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_lines() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"a\"").is_empty());
        let events = decoder.push(b":1}\n\ndata: [DO");
        assert_eq!(events, vec![SseEvent::Data("{\"a\":1}".into())]);
        assert_eq!(decoder.push(b"NE]\n"), vec![SseEvent::Done]);
    }

    #[test]
    fn test_split_utf8() {
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"caf\u{e9}\"}}]}\n".as_bytes();
        let split = line.iter().position(|b| *b == 0xc3).unwrap() + 1;

        let mut decoder = SseDecoder::new();
        assert!(decoder.push(&line[..split]).is_empty());
        let events = decoder.push(&line[split..]);
        let SseEvent::Data(data) = &events[0] else {
            panic!("expected data event, got {:?}", events);
        };
        assert_eq!(delta_content(data).as_deref(), Some("caf\u{e9}"));
    }

    #[test]
    fn test_skips_comments_and_other_fields() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b": keep-alive\nevent: message\r\ndata: x\r\n");
        assert_eq!(events, vec![SseEvent::Data("x".into())]);
    }

    #[test]
    fn test_delta_content() {
        let chunk = r#"{"choices":[{"delta":{"content":"Hel"}}]}"#;
        assert_eq!(delta_content(chunk).as_deref(), Some("Hel"));

        let role_only = r#"{"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert_eq!(delta_content(role_only), None);

        // Azure sends an empty choices array first, for content filter results.
        assert_eq!(delta_content(r#"{"choices":[]}"#), None);
        assert_eq!(delta_content("not json"), None);
    }

    #[test]
    fn test_stream_error() {
        let chunk = r#"{"error":{"message":"rate limited"}}"#;
        assert_eq!(stream_error(chunk).as_deref(), Some("rate limited"));
        assert_eq!(stream_error(r#"{"choices":[]}"#), None);
    }
}
