//! Core types and structures for palms
//!
//! This crate provides the foundational types shared by the transport,
//! session and front-end crates.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Constants
// ============================================================================

/// Backend used when nothing else is configured
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Model requested when the user has not picked one
pub const DEFAULT_MODEL: &str = "phi3:mini";

/// Models offered when the backend cannot list its own
pub const FALLBACK_MODELS: &[&str] = &["phi3:mini", "gemma2:2b", "llama3.2:1b", "llama3.1", "mistral"];

/// File extensions the backend accepts for upload
pub const ALLOWED_EXTENSIONS: &[&str] = &["pdf", "csv", "xlsx", "xls", "txt"];

/// Largest file the backend accepts (20 MiB)
pub const MAX_FILE_SIZE: u64 = 20 * 1024 * 1024;

/// Marker that terminates a chat stream
pub const DONE_SENTINEL: &str = "[DONE]";

// ============================================================================
// Session
// ============================================================================

/// Opaque identifier scoping one user's chat and file state
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh identifier
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Message Types
// ============================================================================

/// Author of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    #[serde(alias = "assistant")]
    Bot,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Bot => "bot",
        }
    }
}

/// A single entry of the chat history. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    /// ISO-8601 time the message was created
    pub timestamp: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: now_iso8601(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn bot(content: impl Into<String>) -> Self {
        Self::new(Role::Bot, content)
    }
}

/// Current UTC time in the `2024-01-31T12:00:00.000Z` shape
pub fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Ordered chat history; append order is chronological order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatHistory(Vec<ChatMessage>);

impl ChatHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.0.push(message);
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ChatMessage> {
        self.0.iter()
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.0.last()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

impl<'a> IntoIterator for &'a ChatHistory {
    type Item = &'a ChatMessage;
    type IntoIter = std::slice::Iter<'a, ChatMessage>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

// ============================================================================
// Wire Types
// ============================================================================

/// Body of `POST /chat`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub session_id: String,
    pub message: String,
    pub model: String,
}

/// A file the backend has stored for a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_at: Option<String>,
}

/// A message kept in the backend's own history table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: String,
    pub content: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

// ============================================================================
// Stream Types
// ============================================================================

/// How a single send ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    /// `[DONE]` was received or the connection closed cleanly
    Completed { text: String },
    /// The send was cancelled; `text` holds what arrived before that
    Cancelled { text: String },
    /// Transport failure, non-success status or server-signalled error
    Errored { message: String, text: String },
}

impl StreamOutcome {
    /// Text accumulated before the stream ended
    pub fn text(&self) -> &str {
        match self {
            StreamOutcome::Completed { text }
            | StreamOutcome::Cancelled { text }
            | StreamOutcome::Errored { text, .. } => text,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, StreamOutcome::Completed { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, StreamOutcome::Cancelled { .. })
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            StreamOutcome::Errored { message, .. } => Some(message),
            _ => None,
        }
    }

    /// Whether the reply belongs in the chat history.
    ///
    /// Completed and cancelled replies are kept when they carry text;
    /// errored replies never are.
    pub fn should_persist(&self) -> bool {
        match self {
            StreamOutcome::Completed { text } | StreamOutcome::Cancelled { text } => !text.is_empty(),
            StreamOutcome::Errored { .. } => false,
        }
    }
}

/// Item produced by a chat stream: deltas, then exactly one `Finished`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Delta(String),
    Finished(StreamOutcome),
}
