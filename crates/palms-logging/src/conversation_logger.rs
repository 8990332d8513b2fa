use anyhow::{Context, Result};
use chrono::Local;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use palms_types::StreamOutcome;

#[derive(Serialize)]
struct LogEntry<'a> {
    timestamp: String, // ISO-8601 local time
    session_id: &'a str,
    role: &'a str,
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    outcome: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

/// Appends every exchanged message to a JSONL file under `<dir>/logs/`
pub struct ConversationLogger {
    file_path: PathBuf,
    file: Option<tokio::fs::File>,
}

impl ConversationLogger {
    /// Create a new logger; the file name is derived from the current local time.
    pub async fn new(base_dir: &Path) -> Result<Self> {
        let logs_dir = base_dir.join("logs");
        fs::create_dir_all(&logs_dir)
            .await
            .with_context(|| format!("Failed to create {}", logs_dir.display()))?;

        let filename = format!("palms-{}.jsonl", Local::now().format("%Y-%m-%d-%H%M%S"));
        let file_path = logs_dir.join(filename);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&file_path)
            .await
            .with_context(|| format!("Failed to open {}", file_path.display()))?;

        Ok(Self { file_path, file: Some(file) })
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    /// Log the message the user sent
    pub async fn log_user(&mut self, session_id: &str, content: &str, model: &str) {
        self.write_entry(&LogEntry {
            timestamp: Local::now().to_rfc3339(),
            session_id,
            role: "user",
            content,
            model: Some(model),
            outcome: None,
            error: None,
        })
        .await;
    }

    /// Log how the bot reply ended, together with whatever text it carried
    pub async fn log_outcome(&mut self, session_id: &str, outcome: &StreamOutcome, model: &str) {
        let label = match outcome {
            StreamOutcome::Completed { .. } => "completed",
            StreamOutcome::Cancelled { .. } => "cancelled",
            StreamOutcome::Errored { .. } => "errored",
        };
        self.write_entry(&LogEntry {
            timestamp: Local::now().to_rfc3339(),
            session_id,
            role: "bot",
            content: outcome.text(),
            model: Some(model),
            outcome: Some(label),
            error: outcome.error_message(),
        })
        .await;
    }

    async fn write_entry(&mut self, entry: &LogEntry<'_>) {
        let Some(file) = &mut self.file else {
            return;
        };
        match serde_json::to_string(entry) {
            Ok(mut json) => {
                json.push('\n');
                if let Err(e) = file.write_all(json.as_bytes()).await {
                    log::warn!("conversation log write failed: {}", e);
                } else {
                    let _ = file.flush().await;
                }
            }
            Err(e) => log::warn!("conversation log entry not serializable: {}", e),
        }
    }

    /// Close the logger. Called on graceful shutdown.
    pub async fn shutdown(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = file.sync_all().await;
        }
    }
}
