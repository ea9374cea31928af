//! Turns a finished task into what the operator sees.
//!
//! `resolve` is the single place deciding notice text and severity, whether
//! the success callback runs, and whether the import dialog closes. All
//! importers and the exporter go through it.

use serde::Serialize;

use crate::api::Submission;
use crate::tasks::poller::TIMEOUT_MESSAGE;
use crate::tasks::status::DEFAULT_FAILURE_MESSAGE;
use crate::tasks::{ImportJob, JobState, RowError};

/// Notice text for a clean success.
pub const SUCCESS_MESSAGE: &str = "Import completed successfully";

// ─────────────────────────────────────────────────────────────────────────────
// Outcome
// ─────────────────────────────────────────────────────────────────────────────

/// Terminal result of one import, sync or async.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImportOutcome {
    Success,
    /// Server finished but rejected some rows.
    DirtySuccess { row_errors: Vec<RowError> },
    Failed {
        message: String,
        row_errors: Vec<RowError>,
    },
    TimedOut { message: String },
}

impl ImportOutcome {
    fn from_rows(row_errors: Vec<RowError>) -> Self {
        if row_errors.is_empty() {
            ImportOutcome::Success
        } else {
            ImportOutcome::DirtySuccess { row_errors }
        }
    }

    /// Outcome of a submission that never produced a task. `None` when the
    /// server queued the work and polling must decide.
    pub fn from_submission(submission: &Submission) -> Option<Self> {
        match submission {
            Submission::Queued { .. } => None,
            Submission::Rejected { message } => Some(ImportOutcome::Failed {
                message: message.clone(),
                row_errors: Vec::new(),
            }),
            Submission::Completed { row_errors } => {
                Some(ImportOutcome::from_rows(row_errors.clone()))
            }
        }
    }

    pub fn is_clean_success(&self) -> bool {
        matches!(self, ImportOutcome::Success)
    }
}

impl From<&ImportJob> for ImportOutcome {
    fn from(job: &ImportJob) -> Self {
        match job.state() {
            JobState::Success => ImportOutcome::from_rows(job.row_errors().to_vec()),
            JobState::Failed => ImportOutcome::Failed {
                message: job
                    .terminal_message()
                    .unwrap_or(DEFAULT_FAILURE_MESSAGE)
                    .to_string(),
                row_errors: job.row_errors().to_vec(),
            },
            JobState::TimedOut => ImportOutcome::TimedOut {
                message: job.terminal_message().unwrap_or(TIMEOUT_MESSAGE).to_string(),
            },
            // Only terminal jobs are resolved; a pending one is still running.
            JobState::Pending => ImportOutcome::TimedOut {
                message: TIMEOUT_MESSAGE.to_string(),
            },
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Resolution
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Warning,
    Error,
}

/// A user-visible notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub severity: Severity,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Success,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
        }
    }
}

/// What the caller does once a task is over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub notice: Notice,
    /// Run the caller's success callback (usually "refresh the list").
    pub invoke_success: bool,
    /// Close the import dialog.
    pub close: bool,
    /// Clear the submitting flag so the form can be used again.
    pub reset_submitting: bool,
}

/// Maps an outcome to its resolution.
///
/// A timeout keeps the dialog open with the form re-enabled, so the operator
/// can check again or resubmit. Every outcome re-enables the form.
pub fn resolve(outcome: &ImportOutcome) -> Resolution {
    match outcome {
        ImportOutcome::Success => Resolution {
            notice: Notice::success(SUCCESS_MESSAGE),
            invoke_success: true,
            close: true,
            reset_submitting: true,
        },
        ImportOutcome::DirtySuccess { row_errors } => {
            let message = row_errors
                .first()
                .map(RowError::to_string)
                .unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.to_string());
            Resolution {
                notice: Notice::error(message),
                invoke_success: false,
                close: false,
                reset_submitting: true,
            }
        }
        ImportOutcome::Failed {
            message,
            row_errors,
        } => {
            let message = row_errors
                .first()
                .map(RowError::to_string)
                .or_else(|| Some(message.clone()).filter(|m| !m.trim().is_empty()))
                .unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.to_string());
            Resolution {
                notice: Notice::error(message),
                invoke_success: false,
                close: false,
                reset_submitting: true,
            }
        }
        ImportOutcome::TimedOut { message } => Resolution {
            notice: Notice::warning(message.clone()),
            invoke_success: false,
            close: false,
            reset_submitting: true,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_success_closes_and_invokes_callback() {
        let resolution = resolve(&ImportOutcome::Success);
        assert_eq!(resolution.notice, Notice::success(SUCCESS_MESSAGE));
        assert!(resolution.invoke_success);
        assert!(resolution.close);
        assert!(resolution.reset_submitting);
    }

    #[test]
    fn dirty_success_reports_first_row_and_stays_open() {
        let outcome = ImportOutcome::DirtySuccess {
            row_errors: vec![
                RowError::new(4, "Invalid phone"),
                RowError::new(9, "Duplicate"),
            ],
        };
        let resolution = resolve(&outcome);
        assert_eq!(resolution.notice, Notice::error("Row 4: Invalid phone"));
        assert!(!resolution.invoke_success);
        assert!(!resolution.close);
        assert!(resolution.reset_submitting);
    }

    #[test]
    fn failure_prefers_row_error_then_message() {
        let with_rows = ImportOutcome::Failed {
            message: "generic".into(),
            row_errors: vec![RowError::new(2, "missing MCC")],
        };
        assert_eq!(resolve(&with_rows).notice.message, "Row 2: missing MCC");

        let plain = ImportOutcome::Failed {
            message: "bad header".into(),
            row_errors: vec![],
        };
        assert_eq!(resolve(&plain).notice.message, "bad header");

        let blank = ImportOutcome::Failed {
            message: " ".into(),
            row_errors: vec![],
        };
        assert_eq!(resolve(&blank).notice.message, DEFAULT_FAILURE_MESSAGE);
    }

    #[test]
    fn timeout_warns_and_reenables_form() {
        let resolution = resolve(&ImportOutcome::TimedOut {
            message: TIMEOUT_MESSAGE.into(),
        });
        assert_eq!(resolution.notice.severity, Severity::Warning);
        assert!(resolution.notice.message.contains("taking longer than expected"));
        assert!(!resolution.close);
        assert!(!resolution.invoke_success);
        assert!(resolution.reset_submitting);
    }

    #[test]
    fn outcome_from_terminal_job() {
        let mut job = ImportJob::new("t");
        job.succeed(vec![RowError::new(4, "Invalid phone")], None);
        assert_eq!(
            ImportOutcome::from(&job),
            ImportOutcome::DirtySuccess { row_errors: vec![RowError::new(4, "Invalid phone")] }
        );

        let mut job = ImportJob::new("t");
        job.time_out("slow".into());
        assert_eq!(
            ImportOutcome::from(&job),
            ImportOutcome::TimedOut { message: "slow".into() }
        );
    }

    #[test]
    fn sync_submissions_resolve_without_polling() {
        assert_eq!(
            ImportOutcome::from_submission(&Submission::Rejected {
                message: "Row 2 missing MCC".into()
            }),
            Some(ImportOutcome::Failed {
                message: "Row 2 missing MCC".into(),
                row_errors: vec![]
            })
        );
        assert_eq!(
            ImportOutcome::from_submission(&Submission::Completed { row_errors: vec![] }),
            Some(ImportOutcome::Success)
        );
        assert_eq!(
            ImportOutcome::from_submission(&Submission::Queued { task_id: "x".into() }),
            None
        );
    }
}
