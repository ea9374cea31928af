//! Wire types for task submission and status endpoints.
//!
//! Every field is optional: the importers were written against several
//! endpoints that disagree on naming (`state` vs `status`, `error` vs
//! `message`) and on types (ids and progress as numbers or strings).
//! Values are normalized here so the rest of the crate sees one shape.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::tasks::RowError;

// ─────────────────────────────────────────────────────────────────────────────
// Lenient Scalars
// ─────────────────────────────────────────────────────────────────────────────

/// Accepts a string or a number and yields a trimmed string.
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Accepts a percentage as integer, float or numeric string; clamps to 0..=100.
fn lenient_percent<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().trim_end_matches('%').parse::<f64>().ok(),
        _ => None,
    };
    Ok(raw
        .filter(|v| v.is_finite())
        .map(|v| v.round().clamp(0.0, 100.0) as u8))
}

/// Parses a row number sent as `7`, `"7"` or `7.0`.
fn parse_row(raw: &str) -> Option<u64> {
    raw.parse::<u64>().ok().or_else(|| {
        raw.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && *v >= 0.0 && v.fract() == 0.0)
            .map(|v| v as u64)
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Row Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Row error object as sent by the server: `{row, error}` or `{row, message}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRowError {
    #[serde(default, deserialize_with = "string_or_number")]
    pub row: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub error: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub message: Option<String>,
}

impl RawRowError {
    /// `None` when the entry carries no text at all.
    ///
    /// A row that is not a number is kept in front of the message, and the
    /// row number falls back to 0 (unknown).
    pub fn into_row_error(self) -> Option<RowError> {
        let text = self.error.or(self.message)?;
        Some(match self.row {
            Some(raw) => match parse_row(&raw) {
                Some(row) => RowError::new(row, text),
                None => RowError::new(0, format!("{}: {}", raw, text)),
            },
            None => RowError::new(0, text),
        })
    }
}

/// Converts one entry of an `errors` array. Strings become row-less errors,
/// objects go through `RawRowError`, anything else is skipped.
fn row_error_from_value(value: Value) -> Option<RowError> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| RowError::new(0, s))
        }
        Value::Object(_) => serde_json::from_value::<RawRowError>(value)
            .ok()
            .and_then(RawRowError::into_row_error),
        _ => None,
    }
}

/// Row errors out of an arbitrary `errors` value. Only arrays yield entries.
pub(crate) fn row_errors_from_value(value: Value) -> Vec<RowError> {
    match value {
        Value::Array(items) => items.into_iter().filter_map(row_error_from_value).collect(),
        _ => Vec::new(),
    }
}

/// Deserializes `errors` entry by entry instead of rejecting the payload.
fn lenient_row_errors<'de, D>(deserializer: D) -> Result<Option<Vec<RowError>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Value>::deserialize(deserializer)?.and_then(|value| match value {
        Value::Array(_) => Some(row_errors_from_value(value)),
        _ => None,
    }))
}

/// Nested `result` object of a finished task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    #[serde(default, deserialize_with = "lenient_row_errors")]
    pub errors: Option<Vec<RowError>>,
    /// Location of a produced file (exports).
    #[serde(default, alias = "url", alias = "file", deserialize_with = "string_or_number")]
    pub file_url: Option<String>,
    /// Free text: a `detail` field, or the whole `result` when it is a string
    /// (task runners report exceptions that way).
    #[serde(default, alias = "detail", deserialize_with = "string_or_number")]
    pub message: Option<String>,
}

/// Accepts `result` as an object or as plain text; other shapes are dropped.
fn lenient_result<'de, D>(deserializer: D) -> Result<Option<TaskResult>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(value @ Value::Object(_)) => serde_json::from_value(value).ok(),
        Some(Value::String(s)) if !s.trim().is_empty() => Some(TaskResult {
            message: Some(s.trim().to_string()),
            ..TaskResult::default()
        }),
        _ => None,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Status Response
// ─────────────────────────────────────────────────────────────────────────────

/// Body of `GET <status_path>?task_id=...`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    #[serde(default, deserialize_with = "string_or_number")]
    pub state: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient_percent")]
    pub progress: Option<u8>,
    #[serde(default, deserialize_with = "lenient_result")]
    pub result: Option<TaskResult>,
    #[serde(default, deserialize_with = "lenient_row_errors")]
    pub errors: Option<Vec<RowError>>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub error: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub message: Option<String>,
    /// Some endpoints report the export location at the top level.
    #[serde(default, alias = "url", deserialize_with = "string_or_number")]
    pub file_url: Option<String>,
}

impl StatusResponse {
    /// The raw status word, `state` taking precedence over `status`.
    pub fn raw_status(&self) -> Option<&str> {
        self.state
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .or(self.status.as_deref())
    }

    /// Row errors from `result.errors`, falling back to top-level `errors`.
    pub fn row_errors(&self) -> Vec<RowError> {
        self.result
            .as_ref()
            .and_then(|r| r.errors.clone())
            .filter(|errors| !errors.is_empty())
            .or_else(|| self.errors.clone())
            .unwrap_or_default()
    }

    /// Server-supplied explanation: `error`, then `message`, then the text
    /// of `result`.
    pub fn explanation(&self) -> Option<String> {
        self.error
            .as_ref()
            .or(self.message.as_ref())
            .or(self.result.as_ref().and_then(|r| r.message.as_ref()))
            .filter(|m| !m.trim().is_empty())
            .cloned()
    }

    pub fn file_url(&self) -> Option<&str> {
        self.result
            .as_ref()
            .and_then(|r| r.file_url.as_deref())
            .or(self.file_url.as_deref())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Submit Response
// ─────────────────────────────────────────────────────────────────────────────

/// Body returned by an upload or export request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubmitResponse {
    #[serde(default, alias = "taskId", deserialize_with = "string_or_number")]
    pub task_id: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub error: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "lenient_row_errors")]
    pub errors: Option<Vec<RowError>>,
    #[serde(default, deserialize_with = "lenient_result")]
    pub result: Option<TaskResult>,
}

/// What a submission turned into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// Accepted for asynchronous processing.
    Queued { task_id: String },
    /// Rejected synchronously; nothing will be polled.
    Rejected { message: String },
    /// Processed synchronously.
    Completed { row_errors: Vec<RowError> },
}

/// Message used when a rejection carries no text.
pub const GENERIC_REJECTION: &str = "The server rejected the upload";

impl SubmitResponse {
    pub fn classify(self) -> Submission {
        if let Some(task_id) = self.task_id {
            return Submission::Queued { task_id };
        }

        let is_error_status = self
            .status
            .as_deref()
            .map(|s| {
                let s = s.trim();
                s.eq_ignore_ascii_case("error") || s.eq_ignore_ascii_case("failed")
            })
            .unwrap_or(false);

        if is_error_status || self.error.is_some() {
            let message = self
                .error
                .or(self.message)
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| GENERIC_REJECTION.to_string());
            return Submission::Rejected { message };
        }

        let row_errors = self
            .result
            .and_then(|r| r.errors)
            .filter(|errors| !errors.is_empty())
            .or(self.errors)
            .unwrap_or_default();

        Submission::Completed { row_errors }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn status(value: Value) -> StatusResponse {
        serde_json::from_value(value).unwrap()
    }

    fn submit(value: Value) -> SubmitResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn state_preferred_over_status() {
        let resp = status(json!({"state": "SUCCESS", "status": "pending"}));
        assert_eq!(resp.raw_status(), Some("SUCCESS"));

        let resp = status(json!({"status": "completed"}));
        assert_eq!(resp.raw_status(), Some("completed"));
    }

    #[test]
    fn progress_accepts_numbers_and_strings() {
        assert_eq!(status(json!({"progress": 45})).progress, Some(45));
        assert_eq!(status(json!({"progress": 99.6})).progress, Some(100));
        assert_eq!(status(json!({"progress": "30%"})).progress, Some(30));
        assert_eq!(status(json!({"progress": -5})).progress, Some(0));
        assert_eq!(status(json!({"progress": null})).progress, None);
        assert_eq!(status(json!({"progress": "soon"})).progress, None);
    }

    #[test]
    fn row_errors_prefer_nested_result() {
        let resp = status(json!({
            "state": "SUCCESS",
            "result": {"errors": [{"row": 4, "error": "Invalid phone"}]},
            "errors": [{"row": 9, "error": "ignored"}]
        }));
        assert_eq!(resp.row_errors(), vec![RowError::new(4, "Invalid phone")]);
    }

    #[test]
    fn row_errors_accept_message_alias_and_string_rows() {
        let resp = status(json!({"errors": [{"row": "7", "message": "Unknown MNC"}]}));
        assert_eq!(resp.row_errors(), vec![RowError::new(7, "Unknown MNC")]);
    }

    #[test]
    fn text_result_becomes_explanation() {
        let resp = status(json!({"state": "FAILURE", "result": "ValueError: bad header"}));
        assert_eq!(resp.raw_status(), Some("FAILURE"));
        assert_eq!(resp.explanation().as_deref(), Some("ValueError: bad header"));
        assert!(resp.row_errors().is_empty());

        let resp = status(json!({"state": "FAILURE", "result": 42, "error": "bad header"}));
        assert_eq!(resp.result, None);
        assert_eq!(resp.explanation().as_deref(), Some("bad header"));
    }

    #[test]
    fn string_row_errors_are_kept_without_row() {
        let resp = status(json!({"state": "SUCCESS", "errors": ["Row 3: bad", "", 7]}));
        assert_eq!(resp.row_errors(), vec![RowError::new(0, "Row 3: bad")]);
    }

    #[test]
    fn null_error_falls_back_to_message() {
        let resp = status(json!({
            "result": {"errors": [{"row": 4, "error": null, "message": "Invalid phone"}]}
        }));
        assert_eq!(resp.row_errors(), vec![RowError::new(4, "Invalid phone")]);
    }

    #[test]
    fn unusable_row_errors_are_skipped() {
        let resp = status(json!({
            "errors": [{"row": 5}, null, {"row": 6, "error": "Unknown MCC"}]
        }));
        assert_eq!(resp.row_errors(), vec![RowError::new(6, "Unknown MCC")]);

        let resp = status(json!({"errors": "something went wrong"}));
        assert!(resp.row_errors().is_empty());
    }

    #[test]
    fn non_numeric_row_is_kept_in_message() {
        let resp = status(json!({"errors": [{"row": "header", "error": "missing mnc"}]}));
        let errors = resp.row_errors();
        assert_eq!(errors, vec![RowError::new(0, "header: missing mnc")]);
        assert_eq!(errors[0].to_string(), "header: missing mnc");

        let resp = status(json!({"errors": [{"row": 3.0, "error": "dup"}]}));
        assert_eq!(resp.row_errors(), vec![RowError::new(3, "dup")]);
    }

    #[test]
    fn file_url_from_result_or_top_level() {
        let nested = status(json!({"result": {"url": "/media/export.csv"}}));
        assert_eq!(nested.file_url(), Some("/media/export.csv"));

        let top = status(json!({"file_url": "/media/top.csv"}));
        assert_eq!(top.file_url(), Some("/media/top.csv"));
    }

    #[test]
    fn submit_with_task_id_is_queued() {
        assert_eq!(
            submit(json!({"task_id": "abc123"})).classify(),
            Submission::Queued { task_id: "abc123".into() }
        );
        assert_eq!(
            submit(json!({"task_id": 42})).classify(),
            Submission::Queued { task_id: "42".into() }
        );
    }

    #[test]
    fn submit_error_status_is_rejected_with_server_text() {
        let resp = submit(json!({"status": "error", "error": "Row 2 missing MCC"}));
        assert_eq!(
            resp.classify(),
            Submission::Rejected { message: "Row 2 missing MCC".into() }
        );

        let resp = submit(json!({"status": "ERROR", "message": "bad header"}));
        assert_eq!(resp.classify(), Submission::Rejected { message: "bad header".into() });

        let resp = submit(json!({"status": "error"}));
        assert_eq!(
            resp.classify(),
            Submission::Rejected { message: GENERIC_REJECTION.into() }
        );
    }

    #[test]
    fn submit_created_resource_is_completed() {
        let resp = submit(json!({"id": 12, "name": "Acme"}));
        assert_eq!(resp.classify(), Submission::Completed { row_errors: vec![] });

        let resp = submit(json!({"errors": [{"row": 3, "error": "dup"}]}));
        assert_eq!(
            resp.classify(),
            Submission::Completed { row_errors: vec![RowError::new(3, "dup")] }
        );
    }

    #[test]
    fn blank_task_id_is_not_queued() {
        let resp = submit(json!({"task_id": "  ", "status": "ok"}));
        assert!(matches!(resp.classify(), Submission::Completed { .. }));
    }
}
