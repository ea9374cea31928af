//! Normalization of task status payloads.
//!
//! Importers were built against endpoints that report state under different
//! names and vocabularies. `classify_status` folds all of them into one
//! tagged `TaskStatus` and is a pure function of the payload.

use crate::api::StatusResponse;
use crate::tasks::RowError;

/// Message used when a failed task carries no explanation.
pub const DEFAULT_FAILURE_MESSAGE: &str = "Import failed";

const SUCCESS_WORDS: &[&str] = &["SUCCESS", "COMPLETED", "COMPLETED_WITH_ERRORS", "FINISHED"];
const FAILURE_WORDS: &[&str] = &["FAILURE", "FAILED", "ERROR"];

/// Normalized status of a server-side task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    Pending { progress: Option<u8> },
    Success { row_errors: Vec<RowError> },
    Failure { message: String, row_errors: Vec<RowError> },
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Pending { .. })
    }
}

/// Classifies one status payload.
///
/// `state` is read before `status`, case-insensitively. A reported progress
/// of 100 counts as success even when the status word is still pending, but
/// an explicit failure word wins over it.
pub fn classify_status(response: &StatusResponse) -> TaskStatus {
    let word = response
        .raw_status()
        .map(|s| s.trim().to_ascii_uppercase())
        .unwrap_or_default();

    if FAILURE_WORDS.contains(&word.as_str()) {
        let row_errors = response.row_errors();
        let message = row_errors
            .first()
            .map(RowError::to_string)
            .or_else(|| response.explanation())
            .unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.to_string());
        return TaskStatus::Failure { message, row_errors };
    }

    if SUCCESS_WORDS.contains(&word.as_str()) || response.progress == Some(100) {
        return TaskStatus::Success {
            row_errors: response.row_errors(),
        };
    }

    TaskStatus::Pending {
        progress: response.progress,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn classify(value: serde_json::Value) -> TaskStatus {
        classify_status(&serde_json::from_value(value).unwrap())
    }

    #[test]
    fn success_vocabulary() {
        for word in ["SUCCESS", "completed", "Completed_With_Errors", "finished"] {
            assert_eq!(
                classify(json!({"state": word})),
                TaskStatus::Success { row_errors: vec![] },
                "{word}"
            );
        }
        assert_eq!(
            classify(json!({"status": "completed"})),
            TaskStatus::Success { row_errors: vec![] }
        );
    }

    #[test]
    fn full_progress_is_success() {
        assert_eq!(
            classify(json!({"state": "PROGRESS", "progress": 100})),
            TaskStatus::Success { row_errors: vec![] }
        );
    }

    #[test]
    fn failure_word_wins_over_full_progress() {
        assert!(matches!(
            classify(json!({"state": "FAILURE", "progress": 100, "error": "worker died"})),
            TaskStatus::Failure { .. }
        ));
    }

    #[test]
    fn failure_with_text_result_keeps_the_text() {
        assert_eq!(
            classify(json!({"state": "FAILURE", "result": "ValueError: bad header"})),
            TaskStatus::Failure {
                message: "ValueError: bad header".into(),
                row_errors: vec![]
            }
        );
    }

    #[test]
    fn success_with_string_errors_is_dirty_success() {
        assert_eq!(
            classify(json!({"state": "SUCCESS", "errors": ["Row 3: bad"]})),
            TaskStatus::Success { row_errors: vec![RowError::new(0, "Row 3: bad")] }
        );
    }

    #[test]
    fn failure_vocabulary_with_message_precedence() {
        assert_eq!(
            classify(json!({"state": "FAILURE", "error": "bad file", "message": "ignored"})),
            TaskStatus::Failure { message: "bad file".into(), row_errors: vec![] }
        );
        assert_eq!(
            classify(json!({"status": "failed", "message": "worker died"})),
            TaskStatus::Failure { message: "worker died".into(), row_errors: vec![] }
        );
        assert_eq!(
            classify(json!({"status": "ERROR"})),
            TaskStatus::Failure { message: DEFAULT_FAILURE_MESSAGE.into(), row_errors: vec![] }
        );
    }

    #[test]
    fn failure_prefers_first_row_error() {
        let status = classify(json!({
            "state": "FAILURE",
            "error": "generic",
            "errors": [{"row": 2, "error": "missing MCC"}]
        }));
        match status {
            TaskStatus::Failure { message, row_errors } => {
                assert_eq!(message, "Row 2: missing MCC");
                assert_eq!(row_errors.len(), 1);
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn success_with_row_errors_is_dirty_success() {
        let status = classify(json!({
            "state": "SUCCESS",
            "result": {"errors": [{"row": 4, "error": "Invalid phone"}]}
        }));
        assert_eq!(
            status,
            TaskStatus::Success { row_errors: vec![RowError::new(4, "Invalid phone")] }
        );
    }

    #[test]
    fn state_wins_over_status() {
        assert!(matches!(
            classify(json!({"state": "PENDING", "status": "completed"})),
            TaskStatus::Pending { .. }
        ));
    }

    #[test]
    fn unknown_or_missing_is_pending() {
        assert_eq!(
            classify(json!({"state": "STARTED", "progress": 40})),
            TaskStatus::Pending { progress: Some(40) }
        );
        assert_eq!(classify(json!({})), TaskStatus::Pending { progress: None });
    }

    #[test]
    fn classification_is_deterministic() {
        let payload: StatusResponse =
            serde_json::from_value(json!({"status": "processing", "progress": "55"})).unwrap();
        assert_eq!(classify_status(&payload), classify_status(&payload));
    }
}
