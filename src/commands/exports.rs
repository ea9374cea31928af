//! CSV export of a filtered listing.
//!
//! The server builds the file asynchronously: the request returns a task id,
//! polling reports a download link once it is ready, and the file is then
//! streamed to disk.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::api::{redact_id, ListQuery, Submission, TaskClient};
use crate::config::ExportProfile;
use crate::error::AppError;
use crate::state::AppState;
use crate::tasks::{
    resolve, ImportObserver, ImportOutcome, JobState, Notice, Poller, PollerConfig, Resolution,
};

const MISSING_FILE_MESSAGE: &str = "Export finished but the server did not provide a file";

#[derive(Debug, Clone)]
pub struct ExportRequest {
    /// Export profile name (`rates`, ...).
    pub profile: String,
    /// Search, ordering and filters of the listing being exported.
    pub query: ListQuery,
    pub output_path: PathBuf,
}

/// Summary of a finished export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportReport {
    pub task_id: Option<String>,
    pub attempts: u32,
    pub outcome: ImportOutcome,
    pub resolution: Resolution,
    /// Set when the file was written.
    pub output_path: Option<PathBuf>,
    pub bytes_written: u64,
}

/// Runs one export, registered under `session_id` so `cancel_import` can
/// stop it.
pub async fn start_export<O>(
    state: &AppState,
    session_id: &str,
    req: ExportRequest,
    observer: &mut O,
) -> Result<ExportReport, AppError>
where
    O: ImportObserver,
{
    let profile = state.config.export_profile(&req.profile)?;
    let client = TaskClient::for_export(state.api.clone(), profile);
    let cancel = CancellationToken::new();

    state.imports.insert(session_id, cancel.clone()).await?;
    info!(
        "[EXPORT] Session {} exporting {}",
        redact_id(session_id),
        req.profile
    );

    let result = run_export(&client, profile, &req, &cancel, observer).await;

    state.imports.remove(session_id).await;

    match result {
        Err(AppError::Cancelled) => Err(AppError::Cancelled),
        Err(e) => {
            warn!("[EXPORT] {} export failed: {}", req.profile, e);
            if !cancel.is_cancelled() {
                observer.on_notice(&Notice::error(e.to_presentation().message));
            }
            Err(e)
        }
        Ok(report) => Ok(report),
    }
}

async fn run_export<O>(
    client: &TaskClient,
    profile: &ExportProfile,
    req: &ExportRequest,
    cancel: &CancellationToken,
    observer: &mut O,
) -> Result<ExportReport, AppError>
where
    O: ImportObserver,
{
    let response = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(AppError::Cancelled),
        response = client.request_export(&req.query) => response?,
    };

    let sync_file = response.result.as_ref().and_then(|r| r.file_url.clone());

    let (task_id, attempts, mut outcome, file_url) = match response.classify() {
        Submission::Queued { task_id } => {
            let poller = Poller::new(PollerConfig::from(profile), cancel.clone());
            let job = poller
                .run(client, &task_id, |tick| {
                    if let Some(progress) = tick.progress {
                        observer.on_progress(progress);
                    }
                })
                .await?;
            let file_url = match job.state() {
                JobState::Success => job.result_url().map(str::to_string),
                _ => None,
            };
            (Some(task_id), job.attempt(), ImportOutcome::from(&job), file_url)
        }
        other => {
            let outcome = ImportOutcome::from_submission(&other)
                .ok_or_else(|| AppError::Internal("Queued submission without task".into()))?;
            (None, 0, outcome, sync_file)
        }
    };

    let mut bytes_written = 0;
    let mut output_path = None;
    if matches!(outcome, ImportOutcome::Success | ImportOutcome::DirtySuccess { .. }) {
        match file_url {
            Some(url) => {
                if cancel.is_cancelled() {
                    return Err(AppError::Cancelled);
                }
                bytes_written = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(AppError::Cancelled),
                    written = client.download_file(&url, &req.output_path) => written?,
                };
                output_path = Some(req.output_path.clone());
            }
            None => {
                let row_errors = match outcome {
                    ImportOutcome::DirtySuccess { row_errors } => row_errors,
                    _ => Vec::new(),
                };
                outcome = ImportOutcome::Failed {
                    message: MISSING_FILE_MESSAGE.to_string(),
                    row_errors,
                };
            }
        }
    }

    let mut resolution = resolve(&outcome);
    if outcome.is_clean_success() {
        resolution.notice = Notice::success(saved_message(&req.output_path));
    }

    observer.on_notice(&resolution.notice);
    if resolution.invoke_success {
        observer.on_success();
    }
    if resolution.close {
        observer.on_close();
    }

    info!(
        "[EXPORT] Finished after {} polls, {} bytes written",
        attempts, bytes_written
    );

    Ok(ExportReport {
        task_id,
        attempts,
        outcome,
        resolution,
        output_path,
        bytes_written,
    })
}

fn saved_message(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    format!("Export saved to {}", name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::tasks::{RowError, Severity};
    use serde_json::json;
    use tempfile::TempDir;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Default)]
    struct Recorder {
        progress: Vec<u8>,
        notices: Vec<Notice>,
        closes: u32,
    }

    impl ImportObserver for Recorder {
        fn on_progress(&mut self, progress: u8) {
            self.progress.push(progress);
        }
        fn on_notice(&mut self, notice: &Notice) {
            self.notices.push(notice.clone());
        }
        fn on_close(&mut self) {
            self.closes += 1;
        }
    }

    async fn test_state(server: &MockServer, dir: &TempDir, max_attempts: u32) -> AppState {
        let mut config = AppConfig::default();
        config.api.base_url = format!("{}/api/", server.uri());
        config.storage.database_path = Some(dir.path().join("test.db"));
        for profile in config.exports.values_mut() {
            profile.interval_ms = 10;
            profile.max_attempts = max_attempts;
        }
        AppState::init(config).await.unwrap()
    }

    fn request(dir: &TempDir) -> ExportRequest {
        ExportRequest {
            profile: "rates".into(),
            query: ListQuery::new(3, 50).search("acme").filter("country", "KE"),
            output_path: dir.path().join("out/rates.csv"),
        }
    }

    #[tokio::test]
    async fn export_polls_then_downloads_file() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let state = test_state(&server, &dir, 20).await;

        Mock::given(method("POST"))
            .and(path("/api/rates/export-csv/"))
            .and(body_json(json!({"search": "acme", "country": "KE"})))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({"task_id": "exp-1"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/rates/status/"))
            .and(query_param("task_id", "exp-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "state": "SUCCESS",
                "result": {"file_url": "/media/exports/rates.csv"}
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/media/exports/rates.csv"))
            .respond_with(ResponseTemplate::new(200).set_body_string("mcc,mnc,rate\n310,260,0.01\n"))
            .expect(1)
            .mount(&server)
            .await;

        let req = request(&dir);
        let output = req.output_path.clone();
        let mut observer = Recorder::default();

        let report = start_export(&state, "exp-session", req, &mut observer).await.unwrap();

        assert_eq!(report.outcome, ImportOutcome::Success);
        assert_eq!(report.output_path.as_deref(), Some(output.as_path()));
        assert_eq!(
            std::fs::read_to_string(&output).unwrap(),
            "mcc,mnc,rate\n310,260,0.01\n"
        );
        assert_eq!(report.bytes_written, 26);
        assert_eq!(observer.notices[0].message, "Export saved to rates.csv");
        assert_eq!(observer.closes, 1);
        assert!(!state.imports.is_running("exp-session").await);
    }

    #[tokio::test]
    async fn success_without_file_is_a_failure() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let state = test_state(&server, &dir, 20).await;

        Mock::given(method("POST"))
            .and(path("/api/rates/export-csv/"))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({"task_id": "exp-2"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/rates/status/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "FINISHED"})))
            .mount(&server)
            .await;

        let mut observer = Recorder::default();
        let report = start_export(&state, "s", request(&dir), &mut observer).await.unwrap();

        assert!(matches!(report.outcome, ImportOutcome::Failed { .. }));
        assert_eq!(observer.notices[0].severity, Severity::Error);
        assert_eq!(observer.notices[0].message, MISSING_FILE_MESSAGE);
        assert_eq!(observer.closes, 0);
        assert!(report.output_path.is_none());
    }

    #[tokio::test]
    async fn missing_file_keeps_server_row_errors() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let state = test_state(&server, &dir, 20).await;

        Mock::given(method("POST"))
            .and(path("/api/rates/export-csv/"))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({"task_id": "exp-4"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/rates/status/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "state": "SUCCESS",
                "result": {"errors": [{"row": 8, "error": "Unknown MNC"}]}
            })))
            .mount(&server)
            .await;

        let mut observer = Recorder::default();
        let report = start_export(&state, "s", request(&dir), &mut observer).await.unwrap();

        match report.outcome {
            ImportOutcome::Failed { message, row_errors } => {
                assert_eq!(message, MISSING_FILE_MESSAGE);
                assert_eq!(row_errors, vec![RowError::new(8, "Unknown MNC")]);
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(report.output_path.is_none());
    }

    #[tokio::test]
    async fn slow_export_times_out_with_warning() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let state = test_state(&server, &dir, 3).await;

        Mock::given(method("POST"))
            .and(path("/api/rates/export-csv/"))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({"task_id": "exp-3"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/rates/status/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"state": "PENDING"})))
            .expect(3)
            .mount(&server)
            .await;

        let req = request(&dir);
        let output = req.output_path.clone();
        let mut observer = Recorder::default();

        let report = start_export(&state, "s", req, &mut observer).await.unwrap();

        assert!(matches!(report.outcome, ImportOutcome::TimedOut { .. }));
        assert_eq!(report.attempts, 3);
        assert_eq!(observer.notices[0].severity, Severity::Warning);
        assert_eq!(observer.progress, vec![10, 20, 30]);
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn rejected_export_request_never_polls() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let state = test_state(&server, &dir, 20).await;

        Mock::given(method("POST"))
            .and(path("/api/rates/export-csv/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"status": "error", "error": "Nothing to export"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/rates/status/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"state": "SUCCESS"})))
            .expect(0)
            .mount(&server)
            .await;

        let mut observer = Recorder::default();
        let report = start_export(&state, "s", request(&dir), &mut observer).await.unwrap();

        assert_eq!(report.attempts, 0);
        assert_eq!(observer.notices[0].message, "Nothing to export");
    }
}
