#![allow(dead_code)]

use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use wiremock::matchers::*;
use wiremock::{Mock, MockServer, ResponseTemplate};

/// wiremock-backed stand-in for the assistant backend
pub struct BackendMockServer {
    server: MockServer,
}

impl BackendMockServer {
    pub async fn new() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    pub fn server(&self) -> &MockServer {
        &self.server
    }

    /// Mock `POST /chat` answering with `body` as an event stream; the
    /// request must match `expected` and arrive exactly `times` times.
    pub async fn mock_chat_stream(&self, expected: Value, body: &str, times: u64) {
        Mock::given(method("POST"))
            .and(path("/chat"))
            .and(header("accept", "text/event-stream"))
            .and(body_json(expected))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body.to_string()),
            )
            .expect(times)
            .mount(&self.server)
            .await;
    }

    /// Mock `POST /chat` that must never be called
    pub async fn forbid_chat(&self) {
        Mock::given(method("POST"))
            .and(path("/chat"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&self.server)
            .await;
    }

    /// Mock `POST /chat` failing with `status` and an optional JSON body
    pub async fn mock_chat_failure(&self, status: u16, body: Option<Value>) {
        let mut template = ResponseTemplate::new(status);
        if let Some(body) = body {
            template = template.set_body_json(body);
        }
        Mock::given(method("POST"))
            .and(path("/chat"))
            .respond_with(template)
            .expect(1)
            .mount(&self.server)
            .await;
    }

    pub async fn mock_models(&self, models: &[&str]) {
        Mock::given(method("GET"))
            .and(path("/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "models": models })))
            .mount(&self.server)
            .await;
    }

    pub async fn mock_server_error(&self) {
        Mock::given(any())
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "detail": "Internal server error"
            })))
            .mount(&self.server)
            .await;
    }

    pub async fn verify(&self) {
        self.server.verify().await;
    }
}

/// Build one SSE block
pub fn sse_chunk(text: &str) -> String {
    format!("data: {}\n\n", json!({ "chunk": text }))
}

pub fn sse_partial(text: &str) -> String {
    format!("data: {}\n\n", json!({ "partial": text }))
}

pub fn sse_error(message: &str) -> String {
    format!("data: {}\n\n", json!({ "error": message }))
}

pub const SSE_DONE: &str = "data: [DONE]\n\n";

/// How the scripted server ends the response after its chunks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ending {
    /// Terminating zero-length chunk
    Complete,
    /// Keep the connection open until the client goes away
    Hold,
}

/// Raw HTTP/1.1 server writing a chunked body piece by piece, for tests that
/// need control over read boundaries and timing.
pub struct ScriptedServer {
    addr: SocketAddr,
    requests: Arc<AtomicUsize>,
    closed: Option<oneshot::Receiver<()>>,
}

impl ScriptedServer {
    /// The first connection gets `chunks` (each written and flushed
    /// separately, `delay` apart) followed by `ending`. Later connections get
    /// the same script but never report closure.
    pub async fn start(chunks: Vec<Vec<u8>>, delay: Duration, ending: Ending) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(AtomicUsize::new(0));
        let (closed_tx, closed_rx) = oneshot::channel();

        let counter = requests.clone();
        tokio::spawn(async move {
            let mut closed_tx = Some(closed_tx);
            loop {
                let Ok((socket, _)) = listener.accept().await else {
                    return;
                };
                counter.fetch_add(1, Ordering::SeqCst);
                let chunks = chunks.clone();
                let notify = closed_tx.take();
                tokio::spawn(async move {
                    serve_connection(socket, chunks, delay, ending).await;
                    if let Some(tx) = notify {
                        let _ = tx.send(());
                    }
                });
            }
        });

        Self {
            addr,
            requests,
            closed: Some(closed_rx),
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Resolves once the client has closed the first connection
    pub async fn wait_closed(&mut self, limit: Duration) -> bool {
        match self.closed.take() {
            Some(rx) => matches!(tokio::time::timeout(limit, rx).await, Ok(Ok(()))),
            None => false,
        }
    }
}

async fn serve_connection(mut socket: TcpStream, chunks: Vec<Vec<u8>>, delay: Duration, ending: Ending) {
    if read_request(&mut socket).await.is_err() {
        return;
    }

    let head = b"HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ncache-control: no-cache\r\ntransfer-encoding: chunked\r\n\r\n";
    if socket.write_all(head).await.is_err() {
        return;
    }

    for chunk in chunks {
        let mut frame = format!("{:x}\r\n", chunk.len()).into_bytes();
        frame.extend_from_slice(&chunk);
        frame.extend_from_slice(b"\r\n");
        if socket.write_all(&frame).await.is_err() || socket.flush().await.is_err() {
            return;
        }
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    match ending {
        Ending::Complete => {
            let _ = socket.write_all(b"0\r\n\r\n").await;
            let _ = socket.flush().await;
            // Wait for the client to hang up so closure is still observable
            wait_for_eof(&mut socket).await;
        }
        Ending::Hold => wait_for_eof(&mut socket).await,
    }
}

async fn wait_for_eof(socket: &mut TcpStream) {
    let mut buf = [0u8; 1024];
    loop {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(_) => continue,
        }
    }
}

/// Consume request head and body (Content-Length framed)
async fn read_request(socket: &mut TcpStream) -> std::io::Result<()> {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];

    let head_end = loop {
        let n = socket.read(&mut buf).await?;
        if n == 0 {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        data.extend_from_slice(&buf[..n]);
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&data[..head_end]).to_lowercase();
    let content_length = head
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while data.len() - head_end < content_length {
        let n = socket.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
    }

    Ok(())
}
