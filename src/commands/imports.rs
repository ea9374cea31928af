//! Import and cancellation commands.
//!
//! A caller picks a session id (`new_session_id`), starts the import with it
//! and can cancel it from elsewhere while the upload or polling is running.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use crate::api::{redact_id, TaskClient};
use crate::error::AppError;
use crate::state::AppState;
use crate::tasks::{ImportObserver, ImportReport, ImportSession};
use crate::validation::{self, CsvValidationResult};

// ─────────────────────────────────────────────────────────────────────────────
// Registry
// ─────────────────────────────────────────────────────────────────────────────

/// Cancellation tokens of running imports and exports, keyed by session id.
pub struct ImportRegistry {
    tokens: Mutex<HashMap<String, CancellationToken>>,
}

impl ImportRegistry {
    pub fn new() -> Self {
        Self {
            tokens: Mutex::new(HashMap::new()),
        }
    }

    /// Registers `token` under `session_id`.
    ///
    /// # Errors
    /// `AppError::AlreadySubmitting` if the id is still running.
    pub async fn insert(&self, session_id: &str, token: CancellationToken) -> Result<(), AppError> {
        let mut guard = self.tokens.lock().await;
        if guard.contains_key(session_id) {
            return Err(AppError::AlreadySubmitting);
        }
        guard.insert(session_id.to_string(), token);
        Ok(())
    }

    pub async fn get(&self, session_id: &str) -> Option<CancellationToken> {
        self.tokens.lock().await.get(session_id).cloned()
    }

    pub async fn remove(&self, session_id: &str) {
        self.tokens.lock().await.remove(session_id);
    }

    pub async fn is_running(&self, session_id: &str) -> bool {
        self.tokens.lock().await.contains_key(session_id)
    }

    pub async fn len(&self) -> usize {
        self.tokens.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tokens.lock().await.is_empty()
    }
}

impl Default for ImportRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Fresh id for `start_import` / `start_export`.
pub fn new_session_id() -> String {
    Uuid::new_v4().to_string()
}

// ─────────────────────────────────────────────────────────────────────────────
// Request Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportRequest {
    /// Import profile name (`csv`, `vendor_rates`, `campaign`, ...).
    pub profile: String,
    pub file_path: PathBuf,
    /// Added to the profile's own extra fields; these win on conflict.
    #[serde(default)]
    pub extra_fields: BTreeMap<String, String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

/// Runs one import to completion.
///
/// The session is registered under `session_id` for the duration of the
/// call, so `cancel_import` can stop it.
pub async fn start_import<O>(
    state: &AppState,
    session_id: &str,
    req: ImportRequest,
    observer: &mut O,
) -> Result<ImportReport, AppError>
where
    O: ImportObserver,
{
    let profile = state.config.import_profile(&req.profile)?.clone();
    let client = Arc::new(TaskClient::for_import(state.api.clone(), &profile));
    let session = ImportSession::new(req.profile.clone(), profile, client);

    let mut upload = session.upload_for(&req.file_path);
    for (key, value) in req.extra_fields {
        upload = upload.field(key, value);
    }

    state.imports.insert(session_id, session.cancel_handle()).await?;
    info!(
        "[IMPORT] Session {} started with profile {}",
        redact_id(session_id),
        req.profile
    );

    let result = session.run(&upload, observer).await;

    state.imports.remove(session_id).await;
    result
}

/// Signals cancellation and returns immediately.
pub async fn cancel_import(state: &AppState, session_id: &str) -> Result<(), AppError> {
    match state.imports.get(session_id).await {
        Some(token) => {
            token.cancel();
            info!("[IMPORT] Cancellation requested for session {}", redact_id(session_id));
            Ok(())
        }
        None => Err(AppError::NotFound(format!(
            "No running import for session {}",
            session_id
        ))),
    }
}

/// Checks a file against a profile's required columns without uploading.
pub async fn validate_import_file(
    state: &AppState,
    profile: &str,
    file_path: PathBuf,
) -> Result<CsvValidationResult, AppError> {
    let profile = state.config.import_profile(profile)?;
    validation::validate(&file_path, &profile.required_columns).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::tasks::{ImportOutcome, Notice, Severity};
    use serde_json::json;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};
    use wiremock::matchers::{body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Default)]
    struct Recorder {
        notices: Vec<Notice>,
        successes: u32,
    }

    impl ImportObserver for Recorder {
        fn on_notice(&mut self, notice: &Notice) {
            self.notices.push(notice.clone());
        }
        fn on_success(&mut self) {
            self.successes += 1;
        }
    }

    async fn test_state(server: &MockServer, dir: &TempDir) -> AppState {
        let mut config = AppConfig::default();
        config.api.base_url = format!("{}/api/", server.uri());
        config.storage.database_path = Some(dir.path().join("test.db"));
        for profile in config.imports.values_mut() {
            profile.interval_ms = 10;
        }
        AppState::init(config).await.unwrap()
    }

    fn csv_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[tokio::test]
    async fn registry_rejects_duplicate_session_ids() {
        let registry = ImportRegistry::new();
        registry.insert("s1", CancellationToken::new()).await.unwrap();

        assert!(matches!(
            registry.insert("s1", CancellationToken::new()).await,
            Err(AppError::AlreadySubmitting)
        ));

        assert_eq!(registry.len().await, 1);
        registry.remove("s1").await;
        assert!(registry.is_empty().await);
    }

    #[test]
    fn session_ids_are_unique() {
        assert_ne!(new_session_id(), new_session_id());
    }

    #[tokio::test]
    async fn campaign_import_uploads_polls_and_unregisters() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let state = test_state(&server, &dir).await;
        let file = csv_file("phone\n254700000001\n");

        Mock::given(method("POST"))
            .and(path("/api/campaigns/upload-csv/"))
            .and(body_string_contains("name=\"csvFile\""))
            .and(body_string_contains("name=\"campaign_id\""))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({"task_id": 991})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/csv-status/campaign/"))
            .and(query_param("task_id", "991"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "COMPLETED"})))
            .expect(1)
            .mount(&server)
            .await;

        let req = ImportRequest {
            profile: "campaign".into(),
            file_path: file.path().to_path_buf(),
            extra_fields: BTreeMap::from([("campaign_id".to_string(), "12".to_string())]),
        };
        let mut observer = Recorder::default();

        let report = start_import(&state, "session-1", req, &mut observer).await.unwrap();

        assert_eq!(report.task_id.as_deref(), Some("991"));
        assert_eq!(report.outcome, ImportOutcome::Success);
        assert_eq!(observer.successes, 1);
        assert!(!state.imports.is_running("session-1").await);
    }

    #[tokio::test]
    async fn vendor_rates_missing_columns_never_upload() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let state = test_state(&server, &dir).await;
        let file = csv_file("mcc,rate\n310,0.01\n");

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({"task_id": "x"})))
            .expect(0)
            .mount(&server)
            .await;

        let req = ImportRequest {
            profile: "vendor_rates".into(),
            file_path: file.path().to_path_buf(),
            extra_fields: BTreeMap::new(),
        };
        let mut observer = Recorder::default();

        let err = start_import(&state, "session-2", req, &mut observer)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::CsvInvalid(_)));
        assert_eq!(observer.notices.len(), 1);
        assert_eq!(observer.notices[0].severity, Severity::Error);
        assert!(observer.notices[0].message.contains("mnc"));
    }

    #[tokio::test]
    async fn unknown_profile_is_config_error() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let state = test_state(&server, &dir).await;

        let req = ImportRequest {
            profile: "nope".into(),
            file_path: PathBuf::from("/tmp/x.csv"),
            extra_fields: BTreeMap::new(),
        };

        assert!(matches!(
            start_import(&state, "s", req, &mut Recorder::default()).await,
            Err(AppError::Config(_))
        ));
    }

    #[tokio::test]
    async fn cancel_unknown_session_is_not_found() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let state = test_state(&server, &dir).await;

        assert!(matches!(
            cancel_import(&state, "missing").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn cancel_stops_a_running_import() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let state = test_state(&server, &dir).await;
        let file = csv_file("name\nAcme\n");

        Mock::given(method("POST"))
            .and(path("/api/imports/upload-csv/"))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({"task_id": "slow"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/imports/status/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"state": "STARTED"})))
            .mount(&server)
            .await;

        let req = ImportRequest {
            profile: "csv".into(),
            file_path: file.path().to_path_buf(),
            extra_fields: BTreeMap::new(),
        };
        let mut observer = Recorder::default();

        let (result, cancelled) = tokio::join!(
            start_import(&state, "session-3", req, &mut observer),
            async {
                while !state.imports.is_running("session-3").await {
                    tokio::task::yield_now().await;
                }
                cancel_import(&state, "session-3").await
            }
        );

        cancelled.unwrap();
        assert!(matches!(result, Err(AppError::Cancelled)));
        assert!(observer.notices.is_empty());
        assert!(!state.imports.is_running("session-3").await);
    }
}
