use reqwest::StatusCode;
use thiserror::Error;

/// Failures of the backend clients
#[derive(Debug, Error)]
pub enum ApiError {
    /// A chat stream is already in flight on this client
    #[error("a chat stream is already active")]
    Busy,

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-success status; `detail` is the server's message when it sent one
    #[error("{detail}")]
    Status { status: StatusCode, detail: String },

    #[error("invalid file {name}: {reason}")]
    InvalidFile { name: String, reason: String },

    #[error("no files selected for deletion")]
    EmptySelection,

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Best message for a failed response: the body's `detail` (or `error`)
/// field, else one derived from the status line.
pub(crate) fn status_detail(status: StatusCode, body: &str) -> String {
    let from_body = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|json| {
            ["detail", "error"].iter().find_map(|key| match json.get(*key) {
                Some(serde_json::Value::String(s)) if !s.is_empty() => Some(s.clone()),
                Some(serde_json::Value::Null) | None => None,
                Some(other) => Some(other.to_string()),
            })
        });

    from_body.unwrap_or_else(|| format!("Request failed with status {}", status))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_detail_prefers_detail_field() {
        let detail = status_detail(StatusCode::BAD_REQUEST, r#"{"detail":"session_id required"}"#);
        assert_eq!(detail, "session_id required");
    }

    #[test]
    fn test_status_detail_accepts_error_field() {
        let detail = status_detail(StatusCode::BAD_REQUEST, r#"{"error":"invalid json"}"#);
        assert_eq!(detail, "invalid json");
    }

    #[test]
    fn test_status_detail_falls_back_to_status_line() {
        let detail = status_detail(StatusCode::SERVICE_UNAVAILABLE, "<html>oops</html>");
        assert_eq!(detail, "Request failed with status 503 Service Unavailable");
    }

    #[test]
    fn test_status_detail_renders_structured_detail() {
        let detail = status_detail(StatusCode::UNPROCESSABLE_ENTITY, r#"{"detail":[{"loc":["body"]}]}"#);
        assert_eq!(detail, r#"[{"loc":["body"]}]"#);
    }
}
