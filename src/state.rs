//! Shared state handed to every command.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::api::ApiClient;
use crate::commands::imports::ImportRegistry;
use crate::config::AppConfig;
use crate::error::AppError;
use crate::storage::Database;

// ─────────────────────────────────────────────────────────────────────────────
// Application State
// ─────────────────────────────────────────────────────────────────────────────

/// Everything a command needs: configuration, the API client (which owns
/// the bearer token), the settings database and the running imports.
pub struct AppState {
    pub config: AppConfig,
    pub api: ApiClient,
    pub db: Arc<Database>,
    pub imports: ImportRegistry,
}

impl AppState {
    /// Validates `config`, opens the database and builds the API client.
    /// No token is set; see `commands::auth::restore_token`.
    pub async fn init(config: AppConfig) -> Result<Self, AppError> {
        config.validate()?;

        let api = ApiClient::new(
            &config.api.base_url,
            Duration::from_secs(config.api.timeout_secs),
        )?
        .with_logging_mode(config.api.logging_mode);

        let db_path = config.database_path()?;
        let db = Database::init(db_path).await?;

        info!("[STATE] Initialized with API {}", api.base_url().origin().ascii_serialization());

        Ok(Self {
            config,
            api,
            db: Arc::new(db),
            imports: ImportRegistry::new(),
        })
    }
}
