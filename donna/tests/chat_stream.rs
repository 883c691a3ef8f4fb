use donna::chat::{ChatSession, CompletionClient, Message, OpenAiClient};
use donna::DonnaError;
use futures_util::StreamExt;
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sse_body(chunks: &[&str]) -> String {
    let mut body = String::from("data: {\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\"}}]}\n\n");
    for chunk in chunks {
        let payload = json!({"choices": [{"index": 0, "delta": {"content": chunk}, "finish_reason": null}]});
        body.push_str(&format!("data: {}\n\n", payload));
    }
    body.push_str("data: {\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n");
    body.push_str("data: [DONE]\n\n");
    body
}

fn sse_response(chunks: &[&str]) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/event-stream")
        .set_body_string(sse_body(chunks))
}

#[tokio::test]
async fn test_streamed_completion_request_and_chunks() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_json(json!({
            "model": "gpt-3.5-turbo",
            "messages": [{"role": "user", "content": "What is up?"}],
            "stream": true
        })))
        .respond_with(sse_response(&["Not ", "much", "!"]))
        .expect(1)
        .mount(&server)
        .await;

    let client = OpenAiClient::new("sk-test", server.uri());
    let chunks: Vec<String> = client
        .stream_completion("gpt-3.5-turbo", &[Message::user("What is up?")])
        .await
        .unwrap()
        .map(|chunk| chunk.unwrap())
        .collect()
        .await;

    assert_eq!(chunks, vec!["Not ", "much", "!"]);
}

#[tokio::test]
async fn test_session_sends_growing_history() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_json(json!({
            "model": "gpt-3.5-turbo",
            "messages": [{"role": "user", "content": "hi"}],
            "stream": true
        })))
        .respond_with(sse_response(&["Hello", " there"]))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_json(json!({
            "model": "gpt-3.5-turbo",
            "messages": [
                {"role": "user", "content": "hi"},
                {"role": "assistant", "content": "Hello there"},
                {"role": "user", "content": "bye"}
            ],
            "stream": true
        })))
        .respond_with(sse_response(&["Goodbye"]))
        .expect(1)
        .mount(&server)
        .await;

    let client = Arc::new(OpenAiClient::new("sk-test", server.uri()));
    let mut session = ChatSession::new(client, "gpt-3.5-turbo");

    let mut streamed = String::new();
    let first = session.send("hi", |chunk| streamed.push_str(chunk)).await.unwrap();
    assert_eq!(first, "Hello there");
    assert_eq!(streamed, first);

    let second = session.send("bye", |_| {}).await.unwrap();
    assert_eq!(second, "Goodbye");

    let transcript = session.close();
    assert_eq!(transcript.len(), 4);
    assert_eq!(transcript.last(), Some(&Message::assistant("Goodbye")));
}

#[tokio::test]
async fn test_rejected_key_surfaces_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = Arc::new(OpenAiClient::new("sk-wrong", server.uri()));
    let mut session = ChatSession::new(client, "gpt-3.5-turbo");

    let err = session.send("hello", |_| {}).await.unwrap_err();

    assert!(matches!(err, DonnaError::Auth { .. }));
    assert!(session.transcript().is_empty());
}
