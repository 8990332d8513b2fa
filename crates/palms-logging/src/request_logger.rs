use anyhow::{Context, Result};
use colored::{Color, Colorize};
use serde::Serialize;
use std::path::{Path, PathBuf};

use palms_types::ChatRequest;
use crate::{get_logs_dir, safe_truncate};

const RULE_WIDTH: usize = 80;
const MAX_BODY_CHARS: usize = 5000;
const MAX_CHUNK_CHARS: usize = 200;

fn banner(title: &str, color: Color) {
    println!("\n{}", "═".repeat(RULE_WIDTH).color(color));
    println!("{}", title.color(color).bold());
    println!("{}", "═".repeat(RULE_WIDTH).color(color));
}

fn rule(color: Color) {
    println!("{}", "═".repeat(RULE_WIDTH).color(color));
}

/// Pretty-print JSON bodies, show anything else as is, cut very long ones
fn print_body(label: &str, body: &str) {
    println!("\n{}", label.bright_yellow());
    let rendered = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| serde_json::to_string_pretty(&value).ok())
        .unwrap_or_else(|| body.to_string());

    if rendered.chars().count() > MAX_BODY_CHARS {
        println!("{}", safe_truncate(&rendered, MAX_BODY_CHARS));
        println!("{}", format!("... (truncated, total {} bytes)", rendered.len()).bright_black());
    } else {
        println!("{}", rendered);
    }
}

/// Dump an outgoing chat request to the console when `verbose`
pub fn log_request(url: &str, request: &ChatRequest, verbose: bool) {
    log::debug!("POST {} (session {}, model {})", url, request.session_id, request.model);
    if !verbose {
        return;
    }

    banner("🔍 CHAT REQUEST", Color::BrightCyan);
    match reqwest::Url::parse(url) {
        Ok(parsed) => println!(
            "{} {} {}",
            "POST".bright_yellow(),
            url,
            format!("(host {}, port {})", parsed.host_str().unwrap_or("?"), parsed.port_or_known_default().unwrap_or(0))
                .bright_black()
        ),
        Err(_) => println!("{} {}", "POST".bright_yellow(), url),
    }
    println!("{} application/json, accept text/event-stream", "Content:".bright_yellow());

    let body = serde_json::to_string(request).unwrap_or_default();
    print_body("Body:", &body);
    rule(Color::BrightCyan);
}

/// Dump a response head (and its body when already read) when `verbose`
pub fn log_response(status: &reqwest::StatusCode, headers: &reqwest::header::HeaderMap, body: &str, verbose: bool) {
    log::debug!("HTTP {} ({} body bytes)", status, body.len());
    if !verbose {
        return;
    }

    banner("📥 RESPONSE", Color::BrightGreen);
    let status_line = status.to_string();
    if status.is_success() {
        println!("{} {}", "Status:".bright_yellow(), status_line.bright_green());
    } else {
        println!("{} {}", "Status:".bright_yellow(), status_line.red());
    }
    for (name, value) in headers {
        let value = value.to_str().unwrap_or("<binary>");
        println!("  {}: {}", name.as_str().bright_white(), value);
    }
    print_body("Body:", body);
    rule(Color::BrightGreen);
}

/// Print one raw read of the streamed body when `verbose`
pub fn log_stream_chunk(chunk_num: usize, data: &str, verbose: bool) {
    log::trace!("stream read #{}: {} bytes", chunk_num, data.len());
    if !verbose {
        return;
    }

    let shown = if data.chars().count() > MAX_CHUNK_CHARS {
        format!("{}... ({} bytes)", safe_truncate(data, MAX_CHUNK_CHARS), data.len())
    } else {
        data.to_string()
    };
    println!("{}", format!("📦 read #{}: {:?}", chunk_num, shown).bright_black());
}

#[derive(Serialize)]
struct RequestRecord<'a> {
    timestamp: String,
    url: &'a str,
    request: &'a ChatRequest,
}

/// Write `request` as a JSON document under `dir`; returns the file written
pub fn write_request_log(dir: &Path, url: &str, request: &ChatRequest) -> Result<PathBuf> {
    let now = chrono::Utc::now();
    let model = request.model.replace(['/', ':', '\\'], "-");
    let file_path = dir.join(format!("request-{}-{}.json", now.format("%Y%m%d-%H%M%S%3f"), model));

    let record = RequestRecord {
        timestamp: now.to_rfc3339(),
        url,
        request,
    };
    let json = serde_json::to_string_pretty(&record).context("Failed to serialize request log")?;
    std::fs::write(&file_path, json)
        .with_context(|| format!("Failed to write request log to {}", file_path.display()))?;

    log::debug!("request logged to {}", file_path.display());
    Ok(file_path)
}

/// Write `request` to the logs directory of the data dir
pub fn log_request_to_file(url: &str, request: &ChatRequest) -> Result<PathBuf> {
    write_request_log(&get_logs_dir()?, url, request)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_log_is_json_document() {
        let dir = tempfile::tempdir().unwrap();
        let request = ChatRequest {
            session_id: "s-1".into(),
            message: "stock of SKU 9?".into(),
            model: "phi3:mini".into(),
        };

        let path = write_request_log(dir.path(), "http://localhost:8000/chat", &request).unwrap();
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("request-"));
        assert!(name.ends_with("-phi3-mini.json"));

        let written: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["url"], "http://localhost:8000/chat");
        assert_eq!(written["request"]["message"], "stock of SKU 9?");
    }
}
