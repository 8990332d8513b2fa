#![allow(dead_code)]

use palms_api::{ChatClient, StreamSink};
use palms_chat::{Conversation, LocalStore, SessionState};
use palms_types::StreamOutcome;
use serde_json::json;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub fn sse_chunk(text: &str) -> String {
    format!("data: {}\n\n", json!({ "chunk": text }))
}

pub const SSE_DONE: &str = "data: [DONE]\n\n";

/// `POST /chat` answering with `body`, expected `times` times
pub async fn mock_chat(server: &MockServer, status: u16, body: &str, times: u64) {
    Mock::given(method("POST"))
        .and(path("/chat"))
        .respond_with(
            ResponseTemplate::new(status)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(body.to_string()),
        )
        .expect(times)
        .mount(server)
        .await;
}

/// Server that streams `first` as one chunk and then keeps the response
/// open until the client disconnects. Returns its base URL.
pub async fn hold_open_server(first: String) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let first = first.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 8192];
                let mut seen = Vec::new();
                // Request head; the JSON body is small enough to arrive with it
                while !seen.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => seen.extend_from_slice(&buf[..n]),
                    }
                }
                let head = "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ntransfer-encoding: chunked\r\n\r\n";
                let chunk = format!("{:x}\r\n{}\r\n", first.len(), first);
                if socket.write_all(head.as_bytes()).await.is_err()
                    || socket.write_all(chunk.as_bytes()).await.is_err()
                {
                    return;
                }
                let _ = socket.flush().await;
                loop {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(_) => continue,
                    }
                }
            });
        }
    });

    format!("http://{}", addr)
}

pub fn conversation(dir: &TempDir, base_url: &str) -> Conversation {
    let store = LocalStore::open(dir.path()).unwrap();
    let session = SessionState::open(store).unwrap();
    Conversation::new(ChatClient::new(base_url), session)
}

/// Sink that records everything and cancels through `cancel` once
/// `cancel_after` deltas have arrived
#[derive(Default)]
pub struct RecordingSink {
    pub deltas: Vec<String>,
    pub outcomes: Vec<StreamOutcome>,
    pub cancel: Option<ChatClient>,
    pub cancel_after: usize,
}

impl StreamSink for RecordingSink {
    fn on_delta(&mut self, delta: &str) {
        self.deltas.push(delta.to_string());
        if self.deltas.len() >= self.cancel_after {
            if let Some(client) = &self.cancel {
                client.cancel();
            }
        }
    }

    fn on_finish(&mut self, outcome: &StreamOutcome) {
        self.outcomes.push(outcome.clone());
    }
}
