//! Back-office HTTP client with secure token handling and safe logging.

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};
use url::Url;

use crate::api::pagination::{ListQuery, Page};
use crate::error::AppError;

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// User agent string for all API requests.
const CLIENT_USER_AGENT: &str = "gateway-backoffice/0.1";

/// Query parameter keys (case-insensitive) that should have their values redacted.
const SENSITIVE_QUERY_PARAMS: &[&str] = &[
    "access_token",
    "token",
    "api_key",
    "key",
    "password",
    "session",
    "authorization",
];

// ─────────────────────────────────────────────────────────────────────────────
// LoggingMode
// ─────────────────────────────────────────────────────────────────────────────

/// Controls how URLs are sanitized for logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoggingMode {
    /// Log only the path component. Strips scheme, host, query, and fragment.
    /// Example: `/api/imports/status/`
    #[default]
    PathOnly,

    /// Log path and query parameters, but redact sensitive values.
    /// Example: `/api/imports/status/?task_id=abc123&token=***`
    PathAndQueryRedacted,
}

// ─────────────────────────────────────────────────────────────────────────────
// URL Sanitization
// ─────────────────────────────────────────────────────────────────────────────

fn is_sensitive_param(key: &str) -> bool {
    let key_lower = key.to_ascii_lowercase();
    SENSITIVE_QUERY_PARAMS
        .iter()
        .any(|&sensitive| key_lower == sensitive)
}

/// Sanitizes a URL for safe logging based on the specified mode.
///
/// The result never contains the scheme, host, or fragment.
pub fn sanitize_url_for_logs(url: &Url, mode: LoggingMode) -> String {
    let path = url.path();

    match mode {
        LoggingMode::PathOnly => path.to_string(),
        LoggingMode::PathAndQueryRedacted => {
            let query_pairs: Vec<_> = url.query_pairs().collect();
            if query_pairs.is_empty() {
                return path.to_string();
            }

            let redacted_pairs: Vec<String> = query_pairs
                .into_iter()
                .map(|(key, value)| {
                    if is_sensitive_param(&key) {
                        format!("{}=***", key)
                    } else {
                        format!("{}={}", key, value)
                    }
                })
                .collect();

            format!("{}?{}", path, redacted_pairs.join("&"))
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Error Bodies
// ─────────────────────────────────────────────────────────────────────────────

/// Error body shapes the back office returns. Every field is optional
/// because endpoints disagree on which one they fill.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
}

impl ErrorBody {
    pub(crate) fn best_message(&self) -> Option<String> {
        self.error
            .as_ref()
            .or(self.message.as_ref())
            .or(self.detail.as_ref())
            .filter(|m| !m.trim().is_empty())
            .cloned()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ApiClient
// ─────────────────────────────────────────────────────────────────────────────

/// Thread-safe HTTP client for the back-office REST API.
///
/// The token sits behind an `RwLock` so a login can swap it while requests
/// are in flight.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    token: Arc<RwLock<Option<SecretString>>>,
    logging_mode: LoggingMode,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url.as_str())
            .field("token", &"[REDACTED]")
            .field("logging_mode", &self.logging_mode)
            .finish()
    }
}

impl ApiClient {
    /// Creates a client for the given base URL.
    ///
    /// A base URL without a trailing slash gets one, so relative endpoint
    /// paths join underneath it instead of replacing its last segment.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` for an unparseable URL and
    /// `AppError::Internal` if the HTTP client fails to initialize.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AppError> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| AppError::Config(format!("Invalid API base URL: {}", e)))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            http: build_http_client(timeout)?,
            base_url,
            token: Arc::new(RwLock::new(None)),
            logging_mode: LoggingMode::default(),
        })
    }

    /// Updates the logging mode for URL sanitization.
    pub fn with_logging_mode(mut self, mode: LoggingMode) -> Self {
        self.logging_mode = mode;
        self
    }

    /// Replaces the bearer token (e.g., after login).
    pub async fn set_token(&self, token: Option<SecretString>) {
        *self.token.write().await = token;
    }

    pub async fn has_token(&self) -> bool {
        self.token.read().await.is_some()
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Joins a relative path (or accepts an absolute URL) against the base URL.
    pub fn build_url(&self, path: &str) -> Result<Url, AppError> {
        let relative = path.trim_start_matches('/');
        self.base_url
            .join(relative)
            .map_err(|_| AppError::Internal(format!("Invalid path: {}", path)))
    }

    /// Starts a request with the bearer token attached, if one is set.
    ///
    /// The token only goes to the API's own origin; file URLs pointing at
    /// a storage host are fetched without it.
    pub(crate) async fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let same_origin = url.origin() == self.base_url.origin();
        let request = self.http.request(method, url);
        match self.token.read().await.as_ref() {
            Some(token) if same_origin => request.bearer_auth(token.expose_secret()),
            _ => request,
        }
    }

    /// Sends a prepared request with timing and sanitized logging.
    ///
    /// Transport failures become `AppError::ConnectionFailed` without the
    /// raw reqwest error, which may contain the full URL.
    pub(crate) async fn send(
        &self,
        method: &Method,
        url: &Url,
        request: RequestBuilder,
    ) -> Result<Response, AppError> {
        let start = Instant::now();
        let sanitized_url = sanitize_url_for_logs(url, self.logging_mode);

        let result = request.send().await;
        let duration_ms = start.elapsed().as_millis();

        match result {
            Ok(response) => {
                let x_request_id = response
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");

                info!(
                    "[API] {} {} {} {}ms {}",
                    method,
                    sanitized_url,
                    response.status().as_u16(),
                    duration_ms,
                    x_request_id
                );

                Ok(response)
            }
            Err(e) => {
                let reason = if e.is_timeout() { "timeout" } else { "FAILED" };
                warn!("[API] {} {} {} {}ms", method, sanitized_url, reason, duration_ms);
                Err(AppError::ConnectionFailed(format!(
                    "Request to {} failed ({})",
                    sanitized_url, reason
                )))
            }
        }
    }

    /// GETs a path and decodes the JSON body.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<T, AppError> {
        let mut url = self.build_url(path)?;
        if !query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        }

        let request = self.request(Method::GET, url.clone()).await;
        let response = self.send(&Method::GET, &url, request).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(error_from_response(response, status).await);
        }

        response
            .json::<T>()
            .await
            .map_err(|e| AppError::Api(format!("Failed to parse response: {}", e)))
    }

    /// Fetches one page of a paginated listing endpoint.
    pub async fn list<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &ListQuery,
    ) -> Result<Page<T>, AppError> {
        self.get_json(path, &query.to_query_pairs()).await
    }
}

/// Maps a non-success response to the matching `AppError`.
pub(crate) async fn error_from_response(response: Response, status: StatusCode) -> AppError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok());
        return AppError::RateLimited {
            retry_after_secs: retry_after,
        };
    }

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return AppError::NotAuthenticated;
    }

    if status == StatusCode::NOT_FOUND {
        return AppError::NotFound(format!("{} returned 404", response.url().path()));
    }

    let body = response.text().await.unwrap_or_default();
    if let Some(message) = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(|b| b.best_message())
    {
        return AppError::Api(format!("HTTP {} - {}", status.as_u16(), message));
    }

    AppError::Api(format!(
        "HTTP {} - {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("Unknown error")
    ))
}

/// Builds the configured HTTP client.
fn build_http_client(timeout: Duration) -> Result<reqwest::Client, AppError> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));

    reqwest::Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .build()
        .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
