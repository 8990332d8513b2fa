use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use palms_logging::log_response;
use palms_types::{FileInfo, HistoryEntry, ALLOWED_EXTENSIONS, FALLBACK_MODELS, MAX_FILE_SIZE};

use crate::error::{status_detail, ApiError};

/// Reply of `GET /`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub message: String,
}

/// Models offered to the user
#[derive(Debug, Clone, PartialEq)]
pub struct ModelList {
    pub models: Vec<String>,
    /// Set when the list is the built-in fallback rather than the backend's
    pub fallback: bool,
    /// Problem reported by or while reaching the backend
    pub error: Option<String>,
}

impl ModelList {
    fn fallback(error: Option<String>) -> Self {
        Self {
            models: FALLBACK_MODELS.iter().map(|m| m.to_string()).collect(),
            fallback: true,
            error,
        }
    }
}

/// Which stored files to delete
#[derive(Debug, Clone, PartialEq)]
pub enum DeleteSelection {
    All,
    Files(Vec<String>),
}

#[derive(Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    models: Vec<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct UploadResponse {
    #[serde(default)]
    files: Vec<FileInfo>,
}

#[derive(Deserialize)]
struct FilesResponse {
    #[serde(default)]
    files: Vec<FileInfo>,
}

#[derive(Deserialize)]
struct HistoryResponse {
    #[serde(default)]
    history: Vec<HistoryEntry>,
}

#[derive(Serialize)]
struct DeleteFilesRequest<'a> {
    session_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    filenames: Option<&'a [String]>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    delete_all: bool,
}

#[derive(Serialize)]
struct SessionRequest<'a> {
    session_id: &'a str,
}

/// Client for the backend's non-streaming JSON endpoints
#[derive(Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
    verbose: bool,
}

impl BackendClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_http_client(base_url, reqwest::Client::new())
    }

    pub fn with_http_client(base_url: impl Into<String>, http: reqwest::Client) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url, verbose: false }
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Turn a non-success response into [`ApiError::Status`]
    async fn check(&self, response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let headers = response.headers().clone();
        let body = response.text().await.unwrap_or_default();
        log_response(&status, &headers, &body, self.verbose);

        Err(ApiError::Status {
            status,
            detail: status_detail(status, &body),
        })
    }

    async fn json<T: serde::de::DeserializeOwned>(&self, response: reqwest::Response) -> Result<T, ApiError> {
        let response = self.check(response).await?;
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// `GET /`
    pub async fn health(&self) -> Result<HealthStatus, ApiError> {
        let response = self.http.get(self.url("/")).send().await?;
        self.json(response).await
    }

    /// `GET /models`, falling back to the built-in list when the backend is
    /// unreachable or offers nothing.
    pub async fn list_models(&self) -> ModelList {
        match self.fetch_models().await {
            Ok(reply) if !reply.models.is_empty() => ModelList {
                models: reply.models,
                fallback: false,
                error: reply.error,
            },
            Ok(reply) => ModelList::fallback(reply.error),
            Err(e) => {
                log::warn!("model list unavailable, using defaults: {}", e);
                ModelList::fallback(Some(e.to_string()))
            }
        }
    }

    async fn fetch_models(&self) -> Result<ModelsResponse, ApiError> {
        let response = self.http.get(self.url("/models")).send().await?;
        self.json(response).await
    }

    /// `POST /upload`. Every file is validated locally first; one bad file
    /// rejects the whole batch before any request is made.
    pub async fn upload_files(&self, session_id: &str, paths: &[PathBuf]) -> Result<Vec<FileInfo>, ApiError> {
        let mut validated = Vec::with_capacity(paths.len());
        for path in paths {
            validated.push((path, validate_upload(path)?));
        }

        let mut form = Form::new().text("session_id", session_id.to_string());
        for (path, name) in validated {
            let bytes = tokio::fs::read(path).await?;
            form = form.part("files", Part::bytes(bytes).file_name(name));
        }

        let response = self.http.post(self.url("/upload")).multipart(form).send().await?;
        let reply: UploadResponse = self.json(response).await?;
        log::debug!("uploaded {} file(s) for session {}", reply.files.len(), session_id);
        Ok(reply.files)
    }

    /// `GET /files`
    pub async fn list_files(&self, session_id: &str) -> Result<Vec<FileInfo>, ApiError> {
        let response = self
            .http
            .get(self.url("/files"))
            .query(&[("session_id", session_id)])
            .send()
            .await?;
        let reply: FilesResponse = self.json(response).await?;
        Ok(reply.files)
    }

    /// `GET /files/download`, written to `dest`. Returns the byte count.
    pub async fn download_file(&self, session_id: &str, filename: &str, dest: &Path) -> Result<u64, ApiError> {
        let response = self
            .http
            .get(self.url("/files/download"))
            .query(&[("session_id", session_id), ("filename", filename)])
            .send()
            .await?;
        let response = self.check(response).await?;
        let bytes = response.bytes().await?;
        tokio::fs::write(dest, &bytes).await?;
        Ok(bytes.len() as u64)
    }

    /// `DELETE /delete-file`
    pub async fn delete_files(&self, session_id: &str, selection: &DeleteSelection) -> Result<(), ApiError> {
        let request = match selection {
            DeleteSelection::All => DeleteFilesRequest {
                session_id,
                filenames: None,
                delete_all: true,
            },
            DeleteSelection::Files(names) if names.is_empty() => return Err(ApiError::EmptySelection),
            DeleteSelection::Files(names) => DeleteFilesRequest {
                session_id,
                filenames: Some(names.as_slice()),
                delete_all: false,
            },
        };

        let response = self.http.delete(self.url("/delete-file")).json(&request).send().await?;
        self.check(response).await?;
        Ok(())
    }

    /// `GET /history`: the backend's own record of the session
    pub async fn history(&self, session_id: &str) -> Result<Vec<HistoryEntry>, ApiError> {
        let response = self
            .http
            .get(self.url("/history"))
            .query(&[("session_id", session_id)])
            .send()
            .await?;
        let reply: HistoryResponse = self.json(response).await?;
        Ok(reply.history)
    }

    /// `DELETE /history`
    pub async fn clear_history(&self, session_id: &str) -> Result<(), ApiError> {
        let response = self
            .http
            .delete(self.url("/history"))
            .json(&SessionRequest { session_id })
            .send()
            .await?;
        self.check(response).await?;
        Ok(())
    }
}

/// Name the backend will store an upload under: the base name with every
/// character outside letters, digits and `._- ` removed, at most 255 chars.
pub fn safe_filename(filename: &str) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    base.chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '.' | '_' | '-' | ' '))
        .take(255)
        .collect()
}

/// Whether the extension is one the backend accepts
pub fn allowed_file(filename: &str) -> bool {
    match filename.rsplit_once('.') {
        Some((_, ext)) => {
            let ext = ext.to_lowercase();
            ALLOWED_EXTENSIONS.contains(&ext.as_str())
        }
        None => false,
    }
}

/// Check a local file before upload. Returns the name to send.
pub fn validate_upload(path: &Path) -> Result<String, ApiError> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    if !allowed_file(&name) {
        return Err(ApiError::InvalidFile {
            name,
            reason: format!("file type not allowed (accepted: {})", ALLOWED_EXTENSIONS.join(", ")),
        });
    }

    let metadata = std::fs::metadata(path)?;
    if !metadata.is_file() {
        return Err(ApiError::InvalidFile { name, reason: "not a regular file".to_string() });
    }
    if metadata.len() > MAX_FILE_SIZE {
        return Err(ApiError::InvalidFile {
            name,
            reason: format!("file too large ({} bytes, limit {})", metadata.len(), MAX_FILE_SIZE),
        });
    }

    Ok(name)
}
