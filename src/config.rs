//! Application configuration loaded from TOML.
//!
//! Built-in defaults cover every importer the console ships with; a user
//! `config.toml` only needs to list what it overrides. Profiles are merged
//! by name, so `[imports.vendor_rates] max_attempts = 10` keeps the default
//! paths for that importer.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::api::LoggingMode;
use crate::error::AppError;

/// Application name used for config and data directories.
pub const APP_NAME: &str = "gateway-backoffice";

/// Config file name inside the config directory.
const CONFIG_FILE: &str = "config.toml";

// ─────────────────────────────────────────────────────────────────────────────
// AppConfig
// ─────────────────────────────────────────────────────────────────────────────

/// Complete application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub storage: StorageConfig,
    pub imports: BTreeMap<String, ImportProfile>,
    pub exports: BTreeMap<String, ExportProfile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the back-office REST API, e.g. `https://admin.example.com/api/`.
    pub base_url: String,
    /// Request timeout applied to every call.
    pub timeout_secs: u64,
    pub logging_mode: LoggingMode,
    /// Keychain entry holding the bearer token.
    pub credential_profile: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite file for local preferences. Defaults to the platform data dir.
    pub database_path: Option<PathBuf>,
}

/// Per-importer settings. One profile per call site replaces the constants
/// each importer used to carry on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportProfile {
    /// Multipart upload endpoint, relative to the API base URL.
    pub upload_path: String,
    /// Status endpoint; `task_id` is appended as a query parameter.
    pub status_path: String,
    /// Multipart field carrying the file (`file`, `csvFile`, ...).
    pub file_field: String,
    /// Extra multipart fields sent with every upload.
    pub extra_fields: BTreeMap<String, String>,
    pub interval_ms: u64,
    pub max_attempts: u32,
    /// Synthetic progress increment used when the server reports none.
    pub progress_step: u8,
    /// Headers that must be present before the file is uploaded.
    pub required_columns: Vec<String>,
    pub validate_before_upload: bool,
}

impl Default for ImportProfile {
    fn default() -> Self {
        Self {
            upload_path: String::new(),
            status_path: String::new(),
            file_field: "file".to_string(),
            extra_fields: BTreeMap::new(),
            interval_ms: 2000,
            max_attempts: 20,
            progress_step: 10,
            required_columns: Vec::new(),
            validate_before_upload: true,
        }
    }
}

impl ImportProfile {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    fn validate(&self, name: &str) -> Result<(), AppError> {
        if self.upload_path.trim().is_empty() {
            return Err(AppError::Config(format!("imports.{name}: upload_path is empty")));
        }
        if self.status_path.trim().is_empty() {
            return Err(AppError::Config(format!("imports.{name}: status_path is empty")));
        }
        if self.file_field.trim().is_empty() {
            return Err(AppError::Config(format!("imports.{name}: file_field is empty")));
        }
        validate_polling(&format!("imports.{name}"), self.interval_ms, self.max_attempts, self.progress_step)
    }
}

/// Per-export settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportProfile {
    /// Endpoint that queues the export task.
    pub export_path: String,
    pub status_path: String,
    pub interval_ms: u64,
    pub max_attempts: u32,
    pub progress_step: u8,
}

impl Default for ExportProfile {
    fn default() -> Self {
        Self {
            export_path: String::new(),
            status_path: String::new(),
            interval_ms: 2000,
            max_attempts: 30,
            progress_step: 10,
        }
    }
}

impl ExportProfile {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    fn validate(&self, name: &str) -> Result<(), AppError> {
        if self.export_path.trim().is_empty() || self.status_path.trim().is_empty() {
            return Err(AppError::Config(format!(
                "exports.{name}: export_path and status_path are required"
            )));
        }
        validate_polling(&format!("exports.{name}"), self.interval_ms, self.max_attempts, self.progress_step)
    }
}

fn validate_polling(section: &str, interval_ms: u64, max_attempts: u32, step: u8) -> Result<(), AppError> {
    if interval_ms == 0 {
        return Err(AppError::Config(format!("{section}: interval_ms must be > 0")));
    }
    if max_attempts == 0 {
        return Err(AppError::Config(format!("{section}: max_attempts must be > 0")));
    }
    if step == 0 || step > 90 {
        return Err(AppError::Config(format!(
            "{section}: progress_step must be between 1 and 90"
        )));
    }
    Ok(())
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api/".to_string(),
            timeout_secs: 300,
            logging_mode: LoggingMode::default(),
            credential_profile: "default".to_string(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        let mut imports = BTreeMap::new();
        imports.insert(
            "csv".to_string(),
            ImportProfile {
                upload_path: "imports/upload-csv/".to_string(),
                status_path: "imports/status/".to_string(),
                ..ImportProfile::default()
            },
        );
        imports.insert(
            "vendor_rates".to_string(),
            ImportProfile {
                upload_path: "vendor-rates/upload-csv/".to_string(),
                status_path: "vendor-rates/status/".to_string(),
                max_attempts: 5,
                progress_step: 15,
                required_columns: vec!["mcc".to_string(), "mnc".to_string(), "rate".to_string()],
                ..ImportProfile::default()
            },
        );
        imports.insert(
            "campaign".to_string(),
            ImportProfile {
                upload_path: "campaigns/upload-csv/".to_string(),
                status_path: "csv-status/campaign/".to_string(),
                file_field: "csvFile".to_string(),
                required_columns: vec!["phone".to_string()],
                ..ImportProfile::default()
            },
        );

        let mut exports = BTreeMap::new();
        exports.insert(
            "rates".to_string(),
            ExportProfile {
                export_path: "rates/export-csv/".to_string(),
                status_path: "rates/status/".to_string(),
                ..ExportProfile::default()
            },
        );

        Self {
            api: ApiConfig::default(),
            storage: StorageConfig::default(),
            imports,
            exports,
        }
    }
}

impl AppConfig {
    /// Loads configuration: built-in defaults merged with the user's
    /// `config.toml` when one exists.
    pub fn load() -> Result<Self, AppError> {
        let mut config = AppConfig::default();
        if let Some(path) = default_config_path() {
            if path.exists() {
                config.merge(Self::from_file(&path)?);
            }
        }
        config.validate()?;
        Ok(config)
    }

    /// Parses a single TOML file without merging defaults.
    pub fn from_file(path: &Path) -> Result<Self, AppError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, AppError> {
        toml::from_str(text).map_err(|e| AppError::Config(format!("Invalid TOML: {}", e)))
    }

    /// Overlays `other` onto `self`. Sections and profiles present in
    /// `other` replace ours; profiles it does not mention are kept.
    pub fn merge(&mut self, other: AppConfig) {
        let defaults = ApiConfig::default();
        if other.api.base_url != defaults.base_url {
            self.api.base_url = other.api.base_url;
        }
        if other.api.timeout_secs != defaults.timeout_secs {
            self.api.timeout_secs = other.api.timeout_secs;
        }
        if other.api.logging_mode != defaults.logging_mode {
            self.api.logging_mode = other.api.logging_mode;
        }
        if other.api.credential_profile != defaults.credential_profile {
            self.api.credential_profile = other.api.credential_profile;
        }
        if other.storage.database_path.is_some() {
            self.storage.database_path = other.storage.database_path;
        }
        for (name, profile) in other.imports {
            // A partially specified built-in keeps its default endpoints.
            let merged = match self.imports.get(&name) {
                Some(base) => ImportProfile {
                    upload_path: non_empty_or(profile.upload_path, &base.upload_path),
                    status_path: non_empty_or(profile.status_path, &base.status_path),
                    ..profile
                },
                None => profile,
            };
            self.imports.insert(name, merged);
        }
        for (name, profile) in other.exports {
            let merged = match self.exports.get(&name) {
                Some(base) => ExportProfile {
                    export_path: non_empty_or(profile.export_path, &base.export_path),
                    status_path: non_empty_or(profile.status_path, &base.status_path),
                    ..profile
                },
                None => profile,
            };
            self.exports.insert(name, merged);
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        let url = Url::parse(&self.api.base_url)
            .map_err(|e| AppError::Config(format!("api.base_url is not a URL: {}", e)))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(AppError::Config("api.base_url must be http or https".to_string()));
        }
        if self.api.timeout_secs == 0 {
            return Err(AppError::Config("api.timeout_secs must be > 0".to_string()));
        }
        for (name, profile) in &self.imports {
            profile.validate(name)?;
        }
        for (name, profile) in &self.exports {
            profile.validate(name)?;
        }
        Ok(())
    }

    pub fn import_profile(&self, name: &str) -> Result<&ImportProfile, AppError> {
        self.imports
            .get(name)
            .ok_or_else(|| AppError::Config(format!("No import profile named '{}'", name)))
    }

    pub fn export_profile(&self, name: &str) -> Result<&ExportProfile, AppError> {
        self.exports
            .get(name)
            .ok_or_else(|| AppError::Config(format!("No export profile named '{}'", name)))
    }

    /// Resolves the SQLite path, falling back to the platform data directory.
    pub fn database_path(&self) -> Result<PathBuf, AppError> {
        if let Some(path) = &self.storage.database_path {
            return Ok(path.clone());
        }
        dirs::data_dir()
            .map(|dir| dir.join(APP_NAME).join("backoffice.db"))
            .ok_or_else(|| AppError::Config("Could not determine data directory".to_string()))
    }
}

/// Path of the user config file, if the platform has a config directory.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_NAME).join(CONFIG_FILE))
}

fn non_empty_or(value: String, fallback: &str) -> String {
    if value.trim().is_empty() {
        fallback.to_string()
    } else {
        value
    }
}
