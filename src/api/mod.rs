//! REST API access for the back office.
//!
//! `client` holds the shared HTTP client and token, `tasks` the importer and
//! exporter endpoints, `envelope` their wire shapes, `pagination` the
//! listing envelope used by every table and `rates` the vendor rate listing.

pub mod client;
pub mod envelope;
pub mod pagination;
pub mod rates;
pub mod tasks;

pub use client::{sanitize_url_for_logs, ApiClient, LoggingMode};
pub use envelope::{RawRowError, StatusResponse, Submission, SubmitResponse, TaskResult};
pub use pagination::{ListQuery, Page, Pager, DEFAULT_PAGE_SIZE, PAGE_SIZE_OPTIONS};
pub use rates::{list_vendor_rates, VendorRate, VENDOR_RATES_PATH};
pub use tasks::{redact_id, ImportUpload, TaskClient, TaskEndpoint};
