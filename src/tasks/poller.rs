//! Bounded status polling for server-side tasks.
//!
//! One `Poller` serves every importer and exporter; interval, attempt budget
//! and progress step come from the caller's profile. The first status
//! request goes out immediately, later ones after each interval. Requests
//! for one task never overlap.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::{redact_id, StatusResponse};
use crate::config::{ExportProfile, ImportProfile};
use crate::error::AppError;
use crate::tasks::status::{classify_status, TaskStatus};
use crate::tasks::{ImportJob, JobState};

/// Terminal message when the attempt budget runs out while the server still
/// reports the task as pending.
pub const TIMEOUT_MESSAGE: &str =
    "The import is taking longer than expected. It may still finish on the server.";

/// Terminal message when the attempt budget runs out on a network error.
pub const NETWORK_TIMEOUT_MESSAGE: &str =
    "Network error while checking the import status. It may still finish on the server.";

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Polling parameters for one call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    pub interval: Duration,
    pub max_attempts: u32,
    pub progress_step: u8,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(2000),
            max_attempts: 20,
            progress_step: 10,
        }
    }
}

impl From<&ImportProfile> for PollerConfig {
    fn from(profile: &ImportProfile) -> Self {
        Self {
            interval: profile.interval(),
            max_attempts: profile.max_attempts,
            progress_step: profile.progress_step,
        }
    }
}

impl From<&ExportProfile> for PollerConfig {
    fn from(profile: &ExportProfile) -> Self {
        Self {
            interval: profile.interval(),
            max_attempts: profile.max_attempts,
            progress_step: profile.progress_step,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Status Source
// ─────────────────────────────────────────────────────────────────────────────

/// Anything that can report the status of a task, allowing test fakes.
pub trait TaskStatusSource: Send + Sync {
    fn get_status<'a>(
        &'a self,
        task_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<StatusResponse, AppError>> + Send + 'a>>;
}

/// Snapshot handed to the tick callback after every processed response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollTick {
    pub attempt: u32,
    pub max_attempts: u32,
    pub state: JobState,
    pub progress: Option<u8>,
}

impl PollTick {
    fn of(job: &ImportJob, max_attempts: u32) -> Self {
        Self {
            attempt: job.attempt(),
            max_attempts,
            state: job.state(),
            progress: job.progress(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Poller
// ─────────────────────────────────────────────────────────────────────────────

pub struct Poller {
    config: PollerConfig,
    cancel: CancellationToken,
}

impl Poller {
    pub fn new(config: PollerConfig, cancel: CancellationToken) -> Self {
        Self { config, cancel }
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// Polls `task_id` until it reaches a terminal state.
    ///
    /// Returns the terminal job (`Success`, `Failed` or `TimedOut`). Network
    /// and server errors count as pending ticks. Authentication and internal
    /// errors abort the loop and are returned as-is.
    ///
    /// # Errors
    ///
    /// `AppError::Cancelled` once the token fires. A response that arrives
    /// after cancellation is dropped without touching the job or calling
    /// `on_tick`.
    pub async fn run<S, F>(
        &self,
        source: &S,
        task_id: &str,
        mut on_tick: F,
    ) -> Result<ImportJob, AppError>
    where
        S: TaskStatusSource + ?Sized,
        F: FnMut(&PollTick),
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut job = ImportJob::new(task_id);

        info!(
            "[POLL] Polling task {} (every {}ms, max {} attempts)",
            redact_id(task_id),
            self.config.interval.as_millis(),
            max_attempts
        );

        loop {
            if self.cancel.is_cancelled() {
                return Err(self.cancelled(task_id));
            }

            let response = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(self.cancelled(task_id)),
                response = source.get_status(task_id) => response,
            };

            // Late response after unmount
            if self.cancel.is_cancelled() {
                return Err(self.cancelled(task_id));
            }

            let attempt = job.record_attempt();

            match response {
                Ok(payload) => match classify_status(&payload) {
                    TaskStatus::Success { row_errors } => {
                        job.succeed(row_errors, payload.file_url().map(str::to_string))
                    }
                    TaskStatus::Failure {
                        message,
                        row_errors,
                    } => job.fail(message, row_errors),
                    TaskStatus::Pending { progress } => {
                        job.advance_progress(progress, self.config.progress_step);
                        if attempt >= max_attempts {
                            job.time_out(TIMEOUT_MESSAGE.to_string());
                        }
                    }
                },
                Err(e) if e.is_transient() => {
                    debug!(
                        "[POLL] Task {} attempt {}/{} failed: {}",
                        redact_id(task_id),
                        attempt,
                        max_attempts,
                        e
                    );
                    if attempt >= max_attempts {
                        job.time_out(NETWORK_TIMEOUT_MESSAGE.to_string());
                    }
                }
                Err(e) => {
                    warn!("[POLL] Task {} stopped: {}", redact_id(task_id), e);
                    return Err(e);
                }
            }

            on_tick(&PollTick::of(&job, max_attempts));

            if job.is_terminal() {
                info!(
                    "[POLL] Task {} finished as {} after {} attempts",
                    redact_id(task_id),
                    job.state().as_str(),
                    job.attempt()
                );
                return Ok(job);
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(self.cancelled(task_id)),
                _ = tokio::time::sleep(self.config.interval) => {}
            }
        }
    }

    fn cancelled(&self, task_id: &str) -> AppError {
        info!("[POLL] Task {} polling cancelled", redact_id(task_id));
        AppError::Cancelled
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
