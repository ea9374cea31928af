//! Import job state.
//!
//! An `ImportJob` is created when the upload returns a `task_id` and is only
//! mutated by the poller. Its state leaves `Pending` exactly once.

use serde::{Deserialize, Serialize};

use crate::tasks::progress::next_progress;

// ─────────────────────────────────────────────────────────────────────────────
// JobState
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle state of an import job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Pending,
    Success,
    Failed,
    TimedOut,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "Pending",
            JobState::Success => "Success",
            JobState::Failed => "Failed",
            JobState::TimedOut => "TimedOut",
        }
    }

    /// Returns true if no further transition can happen.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobState::Pending)
    }
}

/// A validation failure attributed to one input row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowError {
    /// 1-based data row; 0 when the server did not name one.
    pub row: u64,
    pub message: String,
}

impl RowError {
    pub fn new(row: u64, message: impl Into<String>) -> Self {
        Self {
            row,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for RowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&with_row(self.row, &self.message))
    }
}

/// `Row N: message`, or the bare message when the row is unknown (0).
pub(crate) fn with_row(row: u64, message: &str) -> String {
    if row == 0 {
        message.to_string()
    } else {
        format!("Row {}: {}", row, message)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ImportJob
// ─────────────────────────────────────────────────────────────────────────────

/// One in-flight or finished asynchronous import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportJob {
    task_id: String,
    state: JobState,
    attempt: u32,
    progress: Option<u8>,
    row_errors: Vec<RowError>,
    terminal_message: Option<String>,
    /// Download link reported by a finished export.
    result_url: Option<String>,
}

impl ImportJob {
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            state: JobState::Pending,
            attempt: 0,
            progress: None,
            row_errors: Vec::new(),
            terminal_message: None,
            result_url: None,
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn progress(&self) -> Option<u8> {
        self.progress
    }

    pub fn row_errors(&self) -> &[RowError] {
        &self.row_errors
    }

    pub fn terminal_message(&self) -> Option<&str> {
        self.terminal_message.as_deref()
    }

    pub fn result_url(&self) -> Option<&str> {
        self.result_url.as_deref()
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Counts one issued poll. Terminal jobs are never polled again, so a
    /// call after the transition is ignored.
    pub(crate) fn record_attempt(&mut self) -> u32 {
        if !self.is_terminal() {
            self.attempt += 1;
        }
        self.attempt
    }

    /// Advances the displayed progress for a pending tick. The bar never
    /// moves backwards while pending, even if the server reports less.
    pub(crate) fn advance_progress(&mut self, server: Option<u8>, step: u8) -> u8 {
        let candidate = next_progress(self.progress, server, step);
        let value = self.progress.map_or(candidate, |prev| prev.max(candidate));
        if !self.is_terminal() {
            self.progress = Some(value);
        }
        self.progress.unwrap_or(value)
    }

    pub(crate) fn succeed(&mut self, row_errors: Vec<RowError>, result_url: Option<String>) {
        if self.transition(JobState::Success) {
            self.progress = Some(100);
            self.row_errors = row_errors;
            self.result_url = result_url;
        }
    }

    pub(crate) fn fail(&mut self, message: String, row_errors: Vec<RowError>) {
        if self.transition(JobState::Failed) {
            self.terminal_message = Some(message);
            self.row_errors = row_errors;
        }
    }

    pub(crate) fn time_out(&mut self, message: String) {
        if self.transition(JobState::TimedOut) {
            self.terminal_message = Some(message);
        }
    }

    fn transition(&mut self, to: JobState) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.state = to;
        true
    }
}
