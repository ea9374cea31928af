//! Upload, export and status endpoints of the asynchronous task API.
//!
//! This module provides functionality to:
//! - Stream a CSV file to an importer endpoint as multipart form data
//! - Request a server-side export of a filtered listing
//! - Query task status by `task_id`
//! - Stream a produced export file to disk atomically
//!
//! # Security
//!
//! - File contents are never logged
//! - Task ids are truncated in log lines
//! - The bearer token is only sent to the API origin

use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use futures_util::StreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::{Method, Response, StatusCode};
use serde_json::{Map, Value};
use tokio_util::io::ReaderStream;
use tracing::info;
use url::Url;

use crate::api::client::{error_from_response, ApiClient, ErrorBody};
use crate::api::envelope::{row_errors_from_value, StatusResponse, SubmitResponse};
use crate::api::pagination::ListQuery;
use crate::config::{ExportProfile, ImportProfile};
use crate::error::AppError;
use crate::streaming::AtomicFileWriter;
use crate::tasks::{RowError, TaskStatusSource, TaskSubmitter};

// ─────────────────────────────────────────────────────────────────────────────
// Public Types
// ─────────────────────────────────────────────────────────────────────────────

/// A file plus form fields to send to an importer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportUpload {
    pub file_path: PathBuf,
    /// Multipart field carrying the file (`file`, `csvFile`, ...).
    pub file_field: String,
    /// File name sent to the server; defaults to the path's file name.
    pub file_name: Option<String>,
    pub extra_fields: BTreeMap<String, String>,
}

impl ImportUpload {
    pub fn new(file_path: impl Into<PathBuf>, file_field: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            file_field: file_field.into(),
            file_name: None,
            extra_fields: BTreeMap::new(),
        }
    }

    /// Upload using the profile's file field and fixed extra fields.
    pub fn for_profile(profile: &ImportProfile, file_path: &Path) -> Self {
        Self {
            extra_fields: profile.extra_fields.clone(),
            ..Self::new(file_path, profile.file_field.clone())
        }
    }

    /// Adds or replaces a form field, e.g. `mapping_id`.
    pub fn field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_fields.insert(key.into(), value.into());
        self
    }

    pub fn display_name(&self) -> String {
        self.file_name
            .clone()
            .or_else(|| {
                self.file_path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
            })
            .unwrap_or_else(|| "upload.csv".to_string())
    }
}

/// Submit and status paths of one importer or exporter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskEndpoint {
    pub submit_path: String,
    pub status_path: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// TaskClient
// ─────────────────────────────────────────────────────────────────────────────

/// Client for one task endpoint pair.
#[derive(Debug, Clone)]
pub struct TaskClient {
    api: ApiClient,
    endpoint: TaskEndpoint,
}

impl TaskClient {
    pub fn new(api: ApiClient, endpoint: TaskEndpoint) -> Self {
        Self { api, endpoint }
    }

    pub fn for_import(api: ApiClient, profile: &ImportProfile) -> Self {
        Self::new(
            api,
            TaskEndpoint {
                submit_path: profile.upload_path.clone(),
                status_path: profile.status_path.clone(),
            },
        )
    }

    pub fn for_export(api: ApiClient, profile: &ExportProfile) -> Self {
        Self::new(
            api,
            TaskEndpoint {
                submit_path: profile.export_path.clone(),
                status_path: profile.status_path.clone(),
            },
        )
    }

    pub fn endpoint(&self) -> &TaskEndpoint {
        &self.endpoint
    }

    /// Streams the file to the upload endpoint as multipart form data.
    ///
    /// # Errors
    ///
    /// - `AppError::SubmissionRejected` - a 4xx response carrying a message
    /// - `AppError::NotAuthenticated` / `RateLimited` / `Api` - other HTTP errors
    /// - `AppError::ConnectionFailed` - network error
    /// - `AppError::Internal` - the file cannot be read
    pub async fn upload(&self, upload: &ImportUpload) -> Result<SubmitResponse, AppError> {
        let url = self.api.build_url(&self.endpoint.submit_path)?;

        let file = tokio::fs::File::open(&upload.file_path)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to open import file: {}", e)))?;
        let file_size = file
            .metadata()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to get file metadata: {}", e)))?
            .len();

        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
        let part = Part::stream_with_length(body, file_size)
            .file_name(upload.display_name())
            .mime_str("text/csv")
            .map_err(|e| AppError::Internal(format!("Invalid upload content type: {}", e)))?;

        let mut form = Form::new();
        for (key, value) in &upload.extra_fields {
            form = form.text(key.clone(), value.clone());
        }
        form = form.part(upload.file_field.clone(), part);

        info!(
            "[IMPORT] POST {} ({} bytes, field '{}')",
            url.path(),
            file_size,
            upload.file_field
        );

        let request = self.api.request(Method::POST, url.clone()).await.multipart(form);
        let response = self.api.send(&Method::POST, &url, request).await?;
        read_submit_response(response).await
    }

    /// Asks the server to build an export of the filtered listing.
    pub async fn request_export(&self, query: &ListQuery) -> Result<SubmitResponse, AppError> {
        let url = self.api.build_url(&self.endpoint.submit_path)?;
        let body = export_body(query);

        info!("[EXPORT] POST {} ({} filters)", url.path(), body.len());

        let request = self
            .api
            .request(Method::POST, url.clone())
            .await
            .json(&Value::Object(body));
        let response = self.api.send(&Method::POST, &url, request).await?;
        read_submit_response(response).await
    }

    /// `GET <status_path>?task_id=<id>`.
    pub async fn get_status(&self, task_id: &str) -> Result<StatusResponse, AppError> {
        self.api
            .get_json(
                &self.endpoint.status_path,
                &[("task_id".to_string(), task_id.to_string())],
            )
            .await
    }

    /// Streams a produced file to `output_path`, replacing it atomically.
    ///
    /// `file_url` may be absolute or relative to the API host. Returns the
    /// number of bytes written.
    pub async fn download_file(&self, file_url: &str, output_path: &Path) -> Result<u64, AppError> {
        let url = resolve_file_url(self.api.base_url(), file_url)?;

        let request = self.api.request(Method::GET, url.clone()).await;
        let response = self.api.send(&Method::GET, &url, request).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(error_from_response(response, status).await);
        }

        let mut writer = AtomicFileWriter::create(output_path).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                AppError::ConnectionFailed(format!("Error reading export stream: {}", e))
            })?;
            writer.write_chunk(&chunk).await?;
        }
        let bytes = writer.finish().await?;

        info!("[EXPORT] Download complete: {} bytes", bytes);
        Ok(bytes)
    }
}

impl TaskStatusSource for TaskClient {
    fn get_status<'a>(
        &'a self,
        task_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<StatusResponse, AppError>> + Send + 'a>> {
        Box::pin(TaskClient::get_status(self, task_id))
    }
}

impl TaskSubmitter for TaskClient {
    fn submit<'a>(
        &'a self,
        upload: &'a ImportUpload,
    ) -> Pin<Box<dyn Future<Output = Result<SubmitResponse, AppError>> + Send + 'a>> {
        Box::pin(TaskClient::upload(self, upload))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helper Functions
// ─────────────────────────────────────────────────────────────────────────────

/// Shortens a task id for logging (first 8 characters).
pub fn redact_id(id: &str) -> String {
    if id.chars().count() > 8 {
        format!("{}...", id.chars().take(8).collect::<String>())
    } else {
        id.to_string()
    }
}

/// Export requests carry the listing's search, ordering and filters, but
/// not its pagination.
fn export_body(query: &ListQuery) -> Map<String, Value> {
    let mut body = Map::new();
    if let Some(search) = &query.search {
        body.insert("search".to_string(), Value::String(search.clone()));
    }
    if let Some(ordering) = &query.ordering {
        body.insert("ordering".to_string(), Value::String(ordering.clone()));
    }
    for (key, value) in &query.filters {
        body.insert(key.clone(), Value::String(value.clone()));
    }
    body
}

fn resolve_file_url(base: &Url, file_url: &str) -> Result<Url, AppError> {
    let file_url = file_url.trim();
    if file_url.is_empty() {
        return Err(AppError::Api("Export finished without a file URL".to_string()));
    }
    Url::parse(file_url)
        .or_else(|_| base.join(file_url))
        .map_err(|_| AppError::Api("Export returned an invalid file URL".to_string()))
}

/// Decodes a submit response; a 4xx carrying an explanation becomes a
/// rejection with the server's own words.
async fn read_submit_response(response: Response) -> Result<SubmitResponse, AppError> {
    let status = response.status();

    if status.is_success() {
        return response
            .json::<SubmitResponse>()
            .await
            .map_err(|e| AppError::Api(format!("Failed to parse submit response: {}", e)));
    }

    let passthrough = matches!(
        status,
        StatusCode::UNAUTHORIZED
            | StatusCode::FORBIDDEN
            | StatusCode::NOT_FOUND
            | StatusCode::TOO_MANY_REQUESTS
    );
    if passthrough || !status.is_client_error() {
        return Err(error_from_response(response, status).await);
    }

    let body = response.text().await.unwrap_or_default();
    Err(match rejection_message(&body) {
        Some(message) => AppError::SubmissionRejected(message),
        None => AppError::Api(format!(
            "HTTP {} - {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("Unknown error")
        )),
    })
}

fn rejection_message(body: &str) -> Option<String> {
    if let Some(message) = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.best_message())
    {
        return Some(message);
    }

    let errors = match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(mut map)) => map.remove("errors")?,
        _ => return None,
    };
    row_errors_from_value(errors)
        .first()
        .map(RowError::to_string)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
