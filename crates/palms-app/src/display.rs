use colored::Colorize;
use std::io::{self, Write};

use palms_api::StreamSink;
use palms_types::{ChatHistory, FileInfo, HistoryEntry, Role, StreamOutcome};

/// Prints a reply to stdout as it streams in
#[derive(Debug, Default)]
pub struct TerminalSink {
    started: bool,
}

impl TerminalSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StreamSink for TerminalSink {
    fn on_delta(&mut self, delta: &str) {
        if !self.started {
            print!("{} ", "Bot:".bright_blue().bold());
            self.started = true;
        }
        print!("{}", delta);
        let _ = io::stdout().flush();
    }

    fn on_finish(&mut self, outcome: &StreamOutcome) {
        if self.started {
            println!();
        }
        match outcome {
            StreamOutcome::Completed { text } if text.is_empty() => {
                println!("{}", "(empty reply)".bright_black());
            }
            StreamOutcome::Completed { .. } => {}
            StreamOutcome::Cancelled { .. } => {
                println!("{}", "[cancelled]".bright_yellow());
            }
            StreamOutcome::Errored { message, .. } => {
                eprintln!("{} {}", "Error:".red().bold(), message);
            }
        }
    }
}

pub fn print_history(history: &ChatHistory) {
    if history.is_empty() {
        println!("{}", "No messages yet.".bright_black());
        return;
    }
    for message in history {
        let who = match message.role {
            Role::User => "You:".bright_green().bold(),
            Role::Bot => "Bot:".bright_blue().bold(),
        };
        println!("{} {} {}", message.timestamp.bright_black(), who, message.content);
    }
}

pub fn print_remote_history(entries: &[HistoryEntry]) {
    if entries.is_empty() {
        println!("{}", "The backend has no history for this session.".bright_black());
        return;
    }
    for entry in entries {
        let when = entry.created_at.as_deref().unwrap_or("");
        println!("{} {}: {}", when.bright_black(), entry.role.bold(), entry.content);
    }
}

pub fn print_files(files: &[FileInfo]) {
    if files.is_empty() {
        println!("{}", "No files uploaded.".bright_black());
        return;
    }
    for file in files {
        let when = file.uploaded_at.as_deref().unwrap_or("");
        println!("  {:<40} {:>10}  {}", file.name, human_size(file.size), when.bright_black());
    }
}

fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
