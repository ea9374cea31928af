use serde::Serialize;
use thiserror::Error;

use crate::tasks::with_row;

/// Lowercase fragments that must never reach a notice or dialog.
pub(crate) const SENSITIVE_PATTERNS: &[&str] = &[
    "bearer ",
    "authorization:",
    "api_key",
    "access_token",
    "password",
];

/// Case-insensitive check against `SENSITIVE_PATTERNS`.
fn contains_sensitive(msg: &str) -> bool {
    let lower = msg.to_ascii_lowercase();
    SENSITIVE_PATTERNS.iter().any(|p| lower.contains(p))
}

fn row_label(row: &u64, message: &str) -> String {
    with_row(*row, message)
}

/// Returns `fallback` when `msg` looks like it carries a credential.
fn sanitize_message(msg: &str, fallback: &str) -> String {
    if contains_sensitive(msg) {
        fallback.into()
    } else {
        msg.to_string()
    }
}

/// What the console shows for an error: a title, one sentence and an
/// optional hint.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorPresentation {
    pub title: String,
    pub message: String,
    pub action: Option<String>,
}

/// Error type shared by every command.
#[derive(Debug, Error)]
pub enum AppError {
    // ── Auth ──────────────────────────────────────────────────────────────────
    #[error("Not authenticated")]
    NotAuthenticated,

    // ── API ───────────────────────────────────────────────────────────────────
    #[error("API error: {0}")]
    Api(String),

    #[error("Rate limited")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Not found: {0}")]
    NotFound(String),

    // ── Import / Export Tasks ─────────────────────────────────────────────────
    #[error("Submission rejected: {0}")]
    SubmissionRejected(String),

    #[error("Task {task_id} failed: {message}")]
    ImportFailed { task_id: String, message: String },

    #[error("{}", row_label(.row, .message))]
    RowErrors { row: u64, message: String, total: usize },

    #[error("Task {task_id} timed out after {attempts} attempts")]
    TimedOut { task_id: String, attempts: u32 },

    #[error("An import is already being submitted")]
    AlreadySubmitting,

    #[error("Operation cancelled")]
    Cancelled,

    // ── File / CSV ────────────────────────────────────────────────────────────
    #[error("Invalid CSV: {0}")]
    CsvInvalid(String),

    // ── Network ───────────────────────────────────────────────────────────────
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    // ── Configuration ─────────────────────────────────────────────────────────
    #[error("Configuration error: {0}")]
    Config(String),

    // ── Generic fallback ──────────────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns true for errors the poller tolerates as a pending tick.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::ConnectionFailed(_)
                | AppError::RateLimited { .. }
                | AppError::Api(_)
                | AppError::NotFound(_)
        )
    }

    /// Builds the notice text for this error. Server messages pass through
    /// `sanitize_message` first, so tokens and keys are never shown.
    pub fn to_presentation(&self) -> ErrorPresentation {
        match self {
            // ── Auth ──────────────────────────────────────────────────────────
            AppError::NotAuthenticated => ErrorPresentation {
                title: "Not Logged In".into(),
                message: "No API token is stored for this back office.".into(),
                action: Some("Log in again".into()),
            },

            // ── API ───────────────────────────────────────────────────────────
            AppError::Api(msg) => ErrorPresentation {
                title: "Server Error".into(),
                message: sanitize_message(msg, "The server returned an error."),
                action: None,
            },

            AppError::RateLimited { retry_after_secs } => {
                let wait_msg = match retry_after_secs {
                    Some(secs) => format!("Please wait {} seconds before trying again.", secs),
                    None => "Please wait a moment before trying again.".into(),
                };
                ErrorPresentation {
                    title: "Too Many Requests".into(),
                    message: format!("The server is limiting requests. {}", wait_msg),
                    action: Some("Wait and retry".into()),
                }
            }

            AppError::NotFound(msg) => ErrorPresentation {
                title: "Not Found".into(),
                message: sanitize_message(msg, "The requested resource does not exist."),
                action: None,
            },

            // ── Import / Export Tasks ─────────────────────────────────────────
            AppError::SubmissionRejected(msg) => ErrorPresentation {
                title: "Upload Rejected".into(),
                message: sanitize_message(msg, "The server rejected the file."),
                action: Some("Fix the file and submit again".into()),
            },

            AppError::ImportFailed { task_id: _, message } => ErrorPresentation {
                title: "Import Failed".into(),
                message: sanitize_message(message, "The import failed."),
                action: Some("Review the error and submit again".into()),
            },

            AppError::RowErrors {
                row,
                message,
                total,
            } => {
                let first = sanitize_message(message, "invalid value");
                let message = if *total > 1 {
                    format!("{} ({} more rows have errors)", with_row(*row, &first), total - 1)
                } else {
                    with_row(*row, &first)
                };
                ErrorPresentation {
                    title: "Rows Rejected".into(),
                    message,
                    action: Some("Fix the listed rows and submit again".into()),
                }
            }

            AppError::TimedOut { .. } => ErrorPresentation {
                title: "Still Processing".into(),
                message: "The import is taking longer than expected. It may still finish on the server.".into(),
                action: Some("Refresh the list later".into()),
            },

            AppError::AlreadySubmitting => ErrorPresentation {
                title: "Upload In Progress".into(),
                message: "Wait for the current upload to finish.".into(),
                action: None,
            },

            AppError::Cancelled => ErrorPresentation {
                title: "Cancelled".into(),
                message: "The operation was cancelled.".into(),
                action: None,
            },

            // ── File / CSV ────────────────────────────────────────────────────
            AppError::CsvInvalid(msg) => ErrorPresentation {
                title: "Invalid CSV".into(),
                message: format!("The CSV file has a problem: {}", msg),
                action: Some("Fix the CSV file and try again".into()),
            },

            // ── Network ───────────────────────────────────────────────────────
            AppError::ConnectionFailed(_) => ErrorPresentation {
                title: "Connection Failed".into(),
                message: "Could not reach the back-office API. Please check your network.".into(),
                action: Some("Check network and retry".into()),
            },

            // ── Configuration ─────────────────────────────────────────────────
            AppError::Config(msg) => ErrorPresentation {
                title: "Configuration Error".into(),
                message: sanitize_message(msg, "The configuration file is invalid."),
                action: Some("Fix config.toml".into()),
            },

            // ── Generic ───────────────────────────────────────────────────────
            AppError::Internal(_) => ErrorPresentation {
                title: "Unexpected Error".into(),
                message: "Something went wrong. Please try again.".into(),
                action: Some("Try again".into()),
            },
        }
    }
}

// Errors cross the JSON boundary as their presentation.
impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_presentation().serialize(serializer)
    }
}
