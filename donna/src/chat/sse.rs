//! Incremental decoder for `text/event-stream` completion responses.

use serde::Deserialize;

use crate::errors::{DonnaError, DonnaResult};

const DONE_MARKER: &str = "[DONE]";

/// Decoded server-sent event payloads
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    Data(String),
    Done,
}

/// Buffers raw bytes until whole lines are available
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    done: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed one network chunk, returning every event it completes
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        if self.done {
            return Vec::new();
        }
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(event) = self.decode_line(&line) {
                let finished = event == SseEvent::Done;
                events.push(event);
                if finished {
                    self.done = true;
                    self.buffer.clear();
                    break;
                }
            }
        }
        events
    }

    /// Flush a trailing line that arrived without a newline
    pub fn finish(&mut self) -> Option<SseEvent> {
        if self.done || self.buffer.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.buffer);
        self.decode_line(&line)
    }

    fn decode_line(&self, line: &[u8]) -> Option<SseEvent> {
        let line = String::from_utf8_lossy(line);
        let line = line.trim_end_matches(['\r', '\n']);

        // Blank lines separate events, ':' starts a comment / keep-alive
        if line.is_empty() || line.starts_with(':') {
            return None;
        }

        let data = line.strip_prefix("data:")?;
        let data = data.strip_prefix(' ').unwrap_or(data);
        if data.trim() == DONE_MARKER {
            Some(SseEvent::Done)
        } else {
            Some(SseEvent::Data(data.to_string()))
        }
    }
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    error: Option<ChunkError>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    delta: Option<ChunkDelta>,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkError {
    message: String,
}

/// Text carried by one `data:` payload, `None` for role-only or empty deltas
pub fn delta_content(data: &str) -> DonnaResult<Option<String>> {
    let chunk: CompletionChunk = serde_json::from_str(data).map_err(|e| DonnaError::Parsing {
        format: "completion chunk".to_string(),
        message: format!("{} in {:?}", e, data),
    })?;

    if let Some(error) = chunk.error {
        return Err(DonnaError::Api {
            service: "OpenAI".to_string(),
            status: 200,
            message: error.message,
        });
    }

    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta)
        .and_then(|delta| delta.content)
        .filter(|content| !content.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_split_across_chunks() {
        let mut decoder = SseDecoder::new();

        assert!(decoder.push(b"data: {\"choices\":[{\"delta\":{\"content\":\"He").is_empty());
        let events = decoder.push(b"llo\"}}]}\n\ndata: [DO");
        assert_eq!(events, vec![SseEvent::Data(r#"{"choices":[{"delta":{"content":"Hello"}}]}"#.to_string())]);

        assert_eq!(decoder.push(b"NE]\n\n"), vec![SseEvent::Done]);
        assert!(decoder.is_done());
        assert!(decoder.push(b"data: ignored\n").is_empty());
    }

    #[test]
    fn test_multibyte_character_split() {
        let payload = "data: {\"choices\":[{\"delta\":{\"content\":\"café ☕\"}}]}\n".as_bytes();
        // Split inside the three-byte coffee cup
        let split = payload.len() - 8;

        let mut decoder = SseDecoder::new();
        assert!(decoder.push(&payload[..split]).is_empty());
        let events = decoder.push(&payload[split..]);

        let SseEvent::Data(data) = &events[0] else {
            panic!("expected data event, got {:?}", events);
        };
        assert_eq!(delta_content(data).unwrap().as_deref(), Some("café ☕"));
    }

    #[test]
    fn test_comments_and_crlf() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b": keep-alive\r\n\r\ndata:{\"choices\":[]}\r\nevent: ping\r\n");
        assert_eq!(events, vec![SseEvent::Data(r#"{"choices":[]}"#.to_string())]);
    }

    #[test]
    fn test_finish_flushes_trailing_line() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: [DONE]").is_empty());
        assert_eq!(decoder.finish(), Some(SseEvent::Done));
    }

    #[test]
    fn test_delta_content() {
        assert_eq!(
            delta_content(r#"{"choices":[{"index":0,"delta":{"content":"Hi"},"finish_reason":null}]}"#).unwrap(),
            Some("Hi".to_string())
        );
        assert_eq!(delta_content(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#).unwrap(), None);
        assert_eq!(delta_content(r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#).unwrap(), None);
        assert!(matches!(
            delta_content(r#"{"error":{"message":"overloaded"}}"#),
            Err(DonnaError::Api { .. })
        ));
        assert!(matches!(delta_content("not json"), Err(DonnaError::Parsing { .. })));
    }
}
