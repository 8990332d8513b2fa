//! # palms-api
//!
//! HTTP clients for the PALMS assistant backend:
//!
//! - [`ChatClient`]: sends one message to `POST /chat` and delivers the reply
//!   incrementally as a stream of [`StreamEvent`]s, with cancellation.
//! - [`BackendClient`]: the plain JSON endpoints (models, files, server history).
//! - [`sse`]: the framing decoder the chat client uses for the streamed body.
//!
//! ## Example
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use palms_api::{ChatClient, StreamEvent};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = ChatClient::new("http://localhost:8000");
//!
//!     if let Some(mut stream) = client.send("session-1", "Where is bin A-12?", "phi3:mini")? {
//!         while let Some(event) = stream.next().await {
//!             match event {
//!                 StreamEvent::Delta(text) => print!("{}", text),
//!                 StreamEvent::Finished(outcome) => println!("\n[{:?}]", outcome),
//!             }
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod client;
pub mod error;
pub mod sse;

pub use backend::{
    allowed_file,
    safe_filename,
    validate_upload,
    BackendClient,
    DeleteSelection,
    HealthStatus,
    ModelList,
};
pub use client::{ChatClient, ChatStream, ClientState, StreamSink};
pub use error::ApiError;
pub use sse::{SseDecoder, SseFrame};

pub use palms_types::{StreamEvent, StreamOutcome};
