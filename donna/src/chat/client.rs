use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use serde::Serialize;
use std::collections::VecDeque;
use tracing::{debug, warn};

use super::sse::{delta_content, SseDecoder, SseEvent};
use super::Message;
use crate::errors::{DonnaError, DonnaResult};
use crate::http_utils::check_response;

const SERVICE: &str = "OpenAI";

/// Incremental completion text, in arrival order
pub type ChunkStream = BoxStream<'static, DonnaResult<String>>;

/// A hosted model that streams completions for a message list
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn stream_completion(&self, model: &str, messages: &[Message]) -> DonnaResult<ChunkStream>;
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
}

/// Client for OpenAI-compatible `/chat/completions` endpoints
pub struct OpenAiClient {
    http_client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn stream_completion(&self, model: &str, messages: &[Message]) -> DonnaResult<ChunkStream> {
        let request = ChatCompletionRequest {
            model,
            messages,
            stream: true,
        };
        debug!("Requesting streamed completion from {} with {} messages", model, messages.len());

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let response = check_response(response, SERVICE).await?;
        Ok(decode_chunks(response.bytes_stream()))
    }
}

struct DecodeState<B> {
    body: BoxStream<'static, Result<B, reqwest::Error>>,
    decoder: SseDecoder,
    pending: VecDeque<DonnaResult<String>>,
    finished: bool,
}

/// Turn a raw SSE byte stream into completion text chunks
pub fn decode_chunks<S, B>(body: S) -> ChunkStream
where
    S: futures_util::Stream<Item = Result<B, reqwest::Error>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let state = DecodeState {
        body: body.boxed(),
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }

            let events = match state.body.next().await {
                Some(Ok(bytes)) => state.decoder.push(bytes.as_ref()),
                Some(Err(e)) => {
                    warn!("Completion stream interrupted: {}", e);
                    state.finished = true;
                    return Some((Err(DonnaError::from(e)), state));
                }
                None => {
                    state.finished = true;
                    state.decoder.finish().into_iter().collect()
                }
            };

            for event in events {
                match event {
                    SseEvent::Data(data) => match delta_content(&data) {
                        Ok(Some(text)) => state.pending.push_back(Ok(text)),
                        Ok(None) => {}
                        // Queued behind the deltas that preceded it
                        Err(e) => {
                            state.finished = true;
                            state.pending.push_back(Err(e));
                            break;
                        }
                    },
                    SseEvent::Done => state.finished = true,
                }
            }
        }
    })
    .boxed()
}
