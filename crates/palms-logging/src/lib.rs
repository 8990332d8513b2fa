//! Console and file logging for the palms client: verbose HTTP dumps,
//! per-request log files and the JSONL conversation log, plus the data
//! directory helpers they share.

pub mod conversation_logger;
pub mod request_logger;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

pub use conversation_logger::ConversationLogger;
pub use request_logger::{log_request, log_request_to_file, log_response, log_stream_chunk, write_request_log};

/// Environment variable that relocates the palms data directory
pub const DATA_DIR_ENV: &str = "PALMS_DATA_DIR";

/// Cut `s` to at most `max_chars` characters, ending in `...` when shortened
pub fn safe_truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", kept)
}

fn ensure_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create directory {}", dir.display()))
}

/// The palms data directory (`$PALMS_DATA_DIR`, else `~/.palms`), created
/// on first use. Holds the session store, logs and `config.toml`.
pub fn get_palms_dir() -> Result<PathBuf> {
    let dir = match std::env::var(DATA_DIR_ENV) {
        Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
        _ => {
            let home = std::env::var("HOME")
                .or_else(|_| std::env::var("USERPROFILE"))
                .context("Neither HOME nor USERPROFILE is set")?;
            PathBuf::from(home).join(".palms")
        }
    };
    ensure_dir(&dir)?;
    Ok(dir)
}

/// `<palms dir>/logs`, created on first use
pub fn get_logs_dir() -> Result<PathBuf> {
    let dir = get_palms_dir()?.join("logs");
    ensure_dir(&dir)?;
    Ok(dir)
}
