//! One import from file pick to final notice.
//!
//! An `ImportSession` owns the submitting flag and the cancellation token
//! of a single import dialog. `run` validates the file, uploads it, polls
//! the resulting task and resolves the outcome, reporting to an
//! `ImportObserver` along the way. Dropping the session cancels any poll
//! still in flight.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::api::{redact_id, ImportUpload, Submission, SubmitResponse};
use crate::config::ImportProfile;
use crate::error::AppError;
use crate::tasks::outcome::{resolve, ImportOutcome, Notice, Resolution};
use crate::tasks::poller::{Poller, PollerConfig, TaskStatusSource};
use crate::validation;

// ─────────────────────────────────────────────────────────────────────────────
// Ports
// ─────────────────────────────────────────────────────────────────────────────

/// Uploads an import file, allowing test fakes.
pub trait TaskSubmitter: Send + Sync {
    fn submit<'a>(
        &'a self,
        upload: &'a ImportUpload,
    ) -> Pin<Box<dyn Future<Output = Result<SubmitResponse, AppError>> + Send + 'a>>;
}

/// Receives progress and the final resolution of an import.
///
/// Nothing is called after the session is cancelled.
pub trait ImportObserver: Send {
    fn on_progress(&mut self, _progress: u8) {}
    fn on_notice(&mut self, _notice: &Notice) {}
    fn on_success(&mut self) {}
    fn on_close(&mut self) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default)]
pub struct NoopObserver;

impl ImportObserver for NoopObserver {}

// ─────────────────────────────────────────────────────────────────────────────
// Report
// ─────────────────────────────────────────────────────────────────────────────

/// Summary of a finished import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    /// Set when the server processed the file asynchronously.
    pub task_id: Option<String>,
    /// Status requests issued (0 for synchronous results).
    pub attempts: u32,
    pub outcome: ImportOutcome,
    pub resolution: Resolution,
}

impl ImportReport {
    /// Turns anything but a clean success into the matching `AppError`, for
    /// callers that treat the import as one fallible step.
    pub fn into_result(self) -> Result<ImportReport, AppError> {
        let task_id = self.task_id.clone().unwrap_or_else(|| "upload".to_string());
        match &self.outcome {
            ImportOutcome::Success => Ok(self),
            ImportOutcome::DirtySuccess { row_errors } => match row_errors.first() {
                Some(first) => Err(AppError::RowErrors {
                    row: first.row,
                    message: first.message.clone(),
                    total: row_errors.len(),
                }),
                None => Ok(self),
            },
            ImportOutcome::Failed { .. } => Err(AppError::ImportFailed {
                task_id,
                message: self.resolution.notice.message.clone(),
            }),
            ImportOutcome::TimedOut { .. } => Err(AppError::TimedOut {
                task_id,
                attempts: self.attempts,
            }),
        }
    }
}

/// Clears the submitting flag however `run` exits.
struct SubmittingGuard<'a>(&'a AtomicBool);

impl Drop for SubmittingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ImportSession
// ─────────────────────────────────────────────────────────────────────────────

pub struct ImportSession<C> {
    name: String,
    profile: ImportProfile,
    client: Arc<C>,
    submitting: AtomicBool,
    cancel: CancellationToken,
}

impl<C> ImportSession<C>
where
    C: TaskSubmitter + TaskStatusSource,
{
    pub fn new(name: impl Into<String>, profile: ImportProfile, client: Arc<C>) -> Self {
        Self {
            name: name.into(),
            profile,
            client,
            submitting: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn profile(&self) -> &ImportProfile {
        &self.profile
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting.load(Ordering::SeqCst)
    }

    /// Token that stops this session's upload or polling when cancelled.
    pub fn cancel_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Upload description for `file_path` using this session's profile.
    pub fn upload_for(&self, file_path: &Path) -> ImportUpload {
        ImportUpload::for_profile(&self.profile, file_path)
    }

    /// Runs the whole import.
    ///
    /// Submission errors (invalid CSV, HTTP errors, rejected uploads) are
    /// reported through an error notice. Task failures and timeouts are not
    /// errors: they come back as an `ImportReport` whose resolution says what
    /// to show.
    ///
    /// # Errors
    ///
    /// `AppError::AlreadySubmitting` while another `run` is in progress,
    /// `AppError::Cancelled` after cancellation (with no observer calls),
    /// and any validation or upload error.
    pub async fn run<O>(&self, upload: &ImportUpload, observer: &mut O) -> Result<ImportReport, AppError>
    where
        O: ImportObserver,
    {
        if self.submitting.swap(true, Ordering::SeqCst) {
            return Err(AppError::AlreadySubmitting);
        }
        let _guard = SubmittingGuard(&self.submitting);

        match self.execute(upload, observer).await {
            Ok(report) => Ok(report),
            Err(AppError::Cancelled) => {
                info!("[IMPORT] {} import cancelled", self.name);
                Err(AppError::Cancelled)
            }
            Err(e) => {
                warn!("[IMPORT] {} import failed before completion: {}", self.name, e);
                if !self.cancel.is_cancelled() {
                    observer.on_notice(&Notice::error(e.to_presentation().message));
                }
                Err(e)
            }
        }
    }

    async fn execute<O>(&self, upload: &ImportUpload, observer: &mut O) -> Result<ImportReport, AppError>
    where
        O: ImportObserver,
    {
        if self.profile.validate_before_upload {
            let result = validation::validate(&upload.file_path, &self.profile.required_columns).await?;
            if let Some(e) = result.to_error() {
                return Err(e);
            }
        }

        if self.cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }

        info!("[IMPORT] {} uploading {}", self.name, upload.display_name());

        let response = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(AppError::Cancelled),
            response = self.client.submit(upload) => response?,
        };

        let submission = response.classify();
        let (task_id, attempts, outcome) = match submission {
            Submission::Queued { task_id } => {
                info!("[IMPORT] {} queued as task {}", self.name, redact_id(&task_id));
                let poller = Poller::new(PollerConfig::from(&self.profile), self.cancel.clone());
                let job = poller
                    .run(self.client.as_ref(), &task_id, |tick| {
                        if let Some(progress) = tick.progress {
                            observer.on_progress(progress);
                        }
                    })
                    .await?;
                (Some(task_id), job.attempt(), ImportOutcome::from(&job))
            }
            other => {
                let outcome = ImportOutcome::from_submission(&other)
                    .ok_or_else(|| AppError::Internal("Queued submission without task".into()))?;
                info!("[IMPORT] {} finished synchronously", self.name);
                (None, 0, outcome)
            }
        };

        let resolution = resolve(&outcome);
        observer.on_notice(&resolution.notice);
        if resolution.invoke_success {
            observer.on_success();
        }
        if resolution.close {
            observer.on_close();
        }

        Ok(ImportReport {
            task_id,
            attempts,
            outcome,
            resolution,
        })
    }
}

impl<C> Drop for ImportSession<C> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
