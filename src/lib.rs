//! Back-office client for an SMS gateway admin console.
//!
//! CSV imports are uploaded, tracked through the server's asynchronous task
//! API and resolved into a single notice; exports follow the same path and
//! end with a downloaded file. Listing tables keep their column choice in a
//! local settings database.

pub mod api;
pub mod commands;
pub mod config;
pub mod error;
pub mod state;
pub mod storage;
pub mod streaming;
pub mod tasks;
pub mod validation;

pub use config::AppConfig;
pub use error::{AppError, ErrorPresentation};
pub use state::AppState;
