use futures_util::StreamExt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{CompletionClient, Message, Transcript};
use crate::errors::DonnaResult;

/// One conversation: owns its transcript and talks to a completion client.
///
/// Created when a chat starts and consumed by [`ChatSession::close`] when it
/// ends; nothing outlives the session.
pub struct ChatSession {
    id: Uuid,
    model: String,
    transcript: Transcript,
    client: Arc<dyn CompletionClient>,
}

impl ChatSession {
    pub fn new(client: Arc<dyn CompletionClient>, model: impl Into<String>) -> Self {
        let id = Uuid::new_v4();
        let model = model.into();
        info!(session = %id, model = %model, "Chat session started");

        Self {
            id,
            model,
            transcript: Transcript::new(),
            client,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Send a user turn and stream the reply.
    ///
    /// `on_chunk` sees every streamed piece as it arrives. The assembled reply
    /// is recorded as the assistant turn and returned. On failure the user
    /// turn is taken back out, leaving the transcript as it was.
    pub async fn send<F>(&mut self, prompt: impl Into<String>, mut on_chunk: F) -> DonnaResult<String>
    where
        F: FnMut(&str),
    {
        self.transcript.push(Message::user(prompt));

        match self.stream_reply(&mut on_chunk).await {
            Ok(reply) => {
                debug!(session = %self.id, chars = reply.len(), "Assistant turn recorded");
                self.transcript.push(Message::assistant(reply.clone()));
                Ok(reply)
            }
            Err(e) => {
                warn!(session = %self.id, "Completion failed: {}", e);
                self.transcript.pop();
                Err(e)
            }
        }
    }

    async fn stream_reply<F>(&self, on_chunk: &mut F) -> DonnaResult<String>
    where
        F: FnMut(&str),
    {
        let mut chunks = self
            .client
            .stream_completion(&self.model, self.transcript.messages())
            .await?;

        let mut reply = String::new();
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            on_chunk(&chunk);
            reply.push_str(&chunk);
        }
        Ok(reply)
    }

    /// End the session and hand back its history
    pub fn close(self) -> Transcript {
        info!(session = %self.id, turns = self.transcript.turns(), "Chat session closed");
        self.transcript
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{ChunkStream, Role};
    use crate::errors::DonnaError;
    use async_trait::async_trait;
    use futures_util::stream;
    use std::sync::Mutex;

    /// Replies with a fixed chunk sequence, optionally failing midway
    struct ScriptedClient {
        chunks: Vec<&'static str>,
        fail_after: Option<usize>,
        requests: Mutex<Vec<Vec<Message>>>,
    }

    impl ScriptedClient {
        fn new(chunks: Vec<&'static str>) -> Self {
            Self {
                chunks,
                fail_after: None,
                requests: Mutex::default(),
            }
        }
    }

    #[async_trait]
    impl CompletionClient for ScriptedClient {
        async fn stream_completion(&self, _model: &str, messages: &[Message]) -> DonnaResult<ChunkStream> {
            self.requests.lock().unwrap().push(messages.to_vec());

            let mut items: Vec<DonnaResult<String>> = self.chunks.iter().map(|c| Ok(c.to_string())).collect();
            if let Some(n) = self.fail_after {
                items.truncate(n);
                items.push(Err(DonnaError::TransientNetwork {
                    message: "connection reset".to_string(),
                }));
            }
            Ok(stream::iter(items).boxed())
        }
    }

    #[tokio::test]
    async fn test_reply_is_concatenation_of_chunks() {
        let client = Arc::new(ScriptedClient::new(vec!["Hel", "lo", ", ", "world", "!"]));
        let mut session = ChatSession::new(client, "gpt-3.5-turbo");

        let mut seen = Vec::new();
        let reply = session.send("Say hello", |c| seen.push(c.to_string())).await.unwrap();

        assert_eq!(reply, "Hello, world!");
        assert_eq!(seen, vec!["Hel", "lo", ", ", "world", "!"]);
        assert_eq!(session.transcript().last(), Some(&Message::assistant("Hello, world!")));
    }

    #[tokio::test]
    async fn test_transcript_alternates_and_full_history_is_sent() {
        let client = Arc::new(ScriptedClient::new(vec!["ok"]));
        let mut session = ChatSession::new(client.clone(), "gpt-3.5-turbo");

        for prompt in ["first", "second", "third"] {
            session.send(prompt, |_| {}).await.unwrap();
        }

        let transcript = session.close();
        assert_eq!(transcript.len(), 6);
        for (i, message) in transcript.messages().iter().enumerate() {
            let expected = if i % 2 == 0 { Role::User } else { Role::Assistant };
            assert_eq!(message.role, expected, "message {}", i);
        }

        let requests = client.requests.lock().unwrap().clone();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0], vec![Message::user("first")]);
        assert_eq!(requests[2].len(), 5);
        assert_eq!(requests[2].last(), Some(&Message::user("third")));
    }

    #[tokio::test]
    async fn test_failed_stream_leaves_transcript_unchanged() {
        let mut client = ScriptedClient::new(vec!["partial", " answer"]);
        client.fail_after = Some(1);
        let mut session = ChatSession::new(Arc::new(client), "gpt-3.5-turbo");

        let err = session.send("hello?", |_| {}).await.unwrap_err();

        assert!(matches!(err, DonnaError::TransientNetwork { .. }));
        assert!(session.transcript().is_empty());
    }
}
