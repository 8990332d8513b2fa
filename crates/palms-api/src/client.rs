use async_stream::stream;
use futures::Stream;
use futures_util::StreamExt;
use reqwest::header::ACCEPT;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

use palms_logging::{log_request, log_request_to_file, log_response, log_stream_chunk};
use palms_types::{ChatRequest, StreamEvent, StreamOutcome};

use crate::error::{status_detail, ApiError};
use crate::sse::{SseDecoder, SseFrame};

/// Events of one send: zero or more deltas, then exactly one `Finished`
pub type ChatStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// Where the client is in its send lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Idle,
    /// Request issued, response status not yet accepted
    Sending,
    /// Response accepted, body being consumed
    Streaming,
}

/// Receiver for a send driven by [`ChatClient::send_to_sink`]
pub trait StreamSink {
    /// Called for every piece of text as it arrives
    fn on_delta(&mut self, delta: &str);

    /// Called exactly once when the send ends
    fn on_finish(&mut self, outcome: &StreamOutcome);
}

struct ActiveSend {
    id: u64,
    token: CancellationToken,
    state: ClientState,
}

type ActiveSlot = Arc<Mutex<Option<ActiveSend>>>;

fn lock_slot(slot: &Mutex<Option<ActiveSend>>) -> MutexGuard<'_, Option<ActiveSend>> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Owns the active slot for one send and frees it on every exit path,
/// including the consumer dropping the stream early.
struct ActiveGuard {
    slot: ActiveSlot,
    id: u64,
}

impl ActiveGuard {
    fn set_state(&self, state: ClientState) {
        if let Some(active) = lock_slot(&self.slot).as_mut().filter(|a| a.id == self.id) {
            active.state = state;
        }
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        let mut slot = lock_slot(&self.slot);
        if slot.as_ref().is_some_and(|a| a.id == self.id) {
            *slot = None;
        }
    }
}

/// Streaming client for `POST /chat`.
///
/// Clones share the same active slot, so a clone handed to a signal handler
/// can [`cancel`](Self::cancel) a send started elsewhere.
#[derive(Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    base_url: String,
    active: ActiveSlot,
    next_id: Arc<AtomicU64>,
    verbose: bool,
    log_requests: bool,
}

impl ChatClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_http_client(base_url, reqwest::Client::new())
    }

    pub fn with_http_client(base_url: impl Into<String>, http: reqwest::Client) -> Self {
        // Ensure base_url doesn't end with a slash
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http,
            base_url,
            active: Arc::new(Mutex::new(None)),
            next_id: Arc::new(AtomicU64::new(1)),
            verbose: false,
            log_requests: false,
        }
    }

    /// Dump requests, responses and raw chunks to the console
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Write every request to the logs directory
    pub fn log_requests(mut self, enabled: bool) -> Self {
        self.log_requests = enabled;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn chat_url(&self) -> String {
        format!("{}/chat", self.base_url)
    }

    pub fn state(&self) -> ClientState {
        lock_slot(&self.active)
            .as_ref()
            .map_or(ClientState::Idle, |active| active.state)
    }

    pub fn is_active(&self) -> bool {
        self.state() != ClientState::Idle
    }

    /// Cancel the in-flight send. Returns false when nothing was active.
    pub fn cancel(&self) -> bool {
        match lock_slot(&self.active).as_ref() {
            Some(active) => {
                log::debug!("cancelling chat send #{}", active.id);
                active.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Start sending `message`.
    ///
    /// Returns `Ok(None)` without touching the network when the message is
    /// blank, and [`ApiError::Busy`] while another send is active. The request
    /// is issued when the returned stream is first polled.
    pub fn send(&self, session_id: &str, message: &str, model: &str) -> Result<Option<ChatStream>, ApiError> {
        let message = message.trim();
        if message.is_empty() {
            log::debug!("ignoring blank chat message");
            return Ok(None);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        {
            let mut slot = lock_slot(&self.active);
            if slot.is_some() {
                return Err(ApiError::Busy);
            }
            *slot = Some(ActiveSend {
                id,
                token: token.clone(),
                state: ClientState::Sending,
            });
        }
        let guard = ActiveGuard {
            slot: self.active.clone(),
            id,
        };

        let request = ChatRequest {
            session_id: session_id.to_string(),
            message: message.to_string(),
            model: model.to_string(),
        };
        let url = self.chat_url();

        log_request(&url, &request, self.verbose);
        if self.log_requests {
            if let Err(e) = log_request_to_file(&url, &request) {
                log::warn!("could not write request log: {:#}", e);
            }
        }

        let stream: ChatStream = Box::pin(run_send(self.http.clone(), url, request, token, guard, self.verbose));
        Ok(Some(stream))
    }

    /// Send `message` and drive the stream into `sink`.
    ///
    /// Returns the outcome that was also passed to `sink.on_finish`, or
    /// `Ok(None)` for a blank message.
    pub async fn send_to_sink<S>(
        &self,
        session_id: &str,
        message: &str,
        model: &str,
        sink: &mut S,
    ) -> Result<Option<StreamOutcome>, ApiError>
    where
        S: StreamSink + ?Sized,
    {
        let Some(mut stream) = self.send(session_id, message, model)? else {
            return Ok(None);
        };

        while let Some(event) = stream.next().await {
            match event {
                StreamEvent::Delta(delta) => sink.on_delta(&delta),
                StreamEvent::Finished(outcome) => {
                    sink.on_finish(&outcome);
                    return Ok(Some(outcome));
                }
            }
        }

        Err(ApiError::Decode("chat stream ended without an outcome".to_string()))
    }
}

fn run_send(
    http: reqwest::Client,
    url: String,
    request: ChatRequest,
    token: CancellationToken,
    guard: ActiveGuard,
    verbose: bool,
) -> impl Stream<Item = StreamEvent> + Send {
    stream! {
        let mut text = String::new();

        let outcome = 'send: {
            let pending = http
                .post(&url)
                .header(ACCEPT, "text/event-stream")
                .json(&request)
                .send();

            let sent = tokio::select! {
                biased;
                _ = token.cancelled() => None,
                result = pending => Some(result),
            };
            let response = match sent {
                None => break 'send StreamOutcome::Cancelled { text },
                Some(Err(e)) => break 'send StreamOutcome::Errored { message: e.to_string(), text },
                Some(Ok(response)) => response,
            };

            let status = response.status();
            if !status.is_success() {
                let headers = response.headers().clone();
                let body = tokio::select! {
                    biased;
                    _ = token.cancelled() => None,
                    body = response.text() => Some(body.unwrap_or_default()),
                };
                let Some(body) = body else {
                    break 'send StreamOutcome::Cancelled { text };
                };
                log_response(&status, &headers, &body, verbose);
                break 'send StreamOutcome::Errored { message: status_detail(status, &body), text };
            }

            guard.set_state(ClientState::Streaming);
            if verbose {
                log_response(&status, response.headers(), "<streaming body>", verbose);
            }

            let mut body = Box::pin(response.bytes_stream());
            let mut decoder = SseDecoder::new();
            let mut chunk_counter = 0;

            loop {
                let next = tokio::select! {
                    biased;
                    _ = token.cancelled() => None,
                    chunk = body.next() => Some(chunk),
                };

                let (frames, closed) = match next {
                    None => break 'send StreamOutcome::Cancelled { text },
                    Some(None) => (decoder.finish(), true),
                    Some(Some(Err(e))) => {
                        break 'send StreamOutcome::Errored {
                            message: format!("Error reading stream: {}", e),
                            text,
                        };
                    }
                    Some(Some(Ok(bytes))) => {
                        chunk_counter += 1;
                        log_stream_chunk(chunk_counter, &String::from_utf8_lossy(&bytes), verbose);
                        (decoder.push(&bytes), false)
                    }
                };

                for frame in frames {
                    if token.is_cancelled() {
                        break 'send StreamOutcome::Cancelled { text };
                    }
                    match frame {
                        SseFrame::Delta(delta) => {
                            text.push_str(&delta);
                            yield StreamEvent::Delta(delta);
                        }
                        SseFrame::Done => break 'send StreamOutcome::Completed { text },
                        SseFrame::Error(message) => break 'send StreamOutcome::Errored { message, text },
                    }
                }

                if closed {
                    // Connection ended without the sentinel: keep what arrived
                    break 'send StreamOutcome::Completed { text };
                }
            }
        };

        log::debug!("chat send finished: {:?}", outcome);

        // Free the slot before reporting so the caller may send again at once
        drop(guard);
        yield StreamEvent::Finished(outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_removed() {
        let client = ChatClient::new("http://localhost:8000/");
        assert_eq!(client.base_url(), "http://localhost:8000");
        assert_eq!(client.chat_url(), "http://localhost:8000/chat");
    }

    #[test]
    fn test_blank_message_is_a_no_op() {
        let client = ChatClient::new("http://localhost:8000");
        assert!(client.send("s", "   \n\t", "m").unwrap().is_none());
        assert_eq!(client.state(), ClientState::Idle);
    }

    #[test]
    fn test_cancel_when_idle_returns_false() {
        let client = ChatClient::new("http://localhost:8000");
        assert!(!client.cancel());
    }

    #[tokio::test]
    async fn test_second_send_rejected_while_active() {
        let client = ChatClient::new("http://127.0.0.1:9");
        let first = client.send("s", "hello", "m").unwrap();
        assert!(first.is_some());
        assert_eq!(client.state(), ClientState::Sending);
        assert!(matches!(client.send("s", "again", "m"), Err(ApiError::Busy)));

        drop(first);
        assert_eq!(client.state(), ClientState::Idle);
        assert!(client.send("s", "again", "m").unwrap().is_some());
    }

    #[test]
    fn test_clones_share_active_slot() {
        let client = ChatClient::new("http://127.0.0.1:9");
        let handle = client.clone();
        let _stream = client.send("s", "hello", "m").unwrap();
        assert!(handle.is_active());
        assert!(handle.cancel());
    }
}
