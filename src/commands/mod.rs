//! Operations exposed to the console front end.
//!
//! Each command takes the shared `AppState` and returns `AppError`, whose
//! `Serialize` impl produces the user-facing presentation.

pub mod auth;
pub mod columns;
pub mod exports;
pub mod imports;

pub use auth::{clear_api_token, restore_token, set_api_token, AuthStatus};
pub use columns::{catalog_for, load_columns, reset_columns, save_columns, toggle_column};
pub use exports::{start_export, ExportReport, ExportRequest};
pub use imports::{
    cancel_import, new_session_id, start_import, validate_import_file, ImportRegistry,
    ImportRequest,
};
