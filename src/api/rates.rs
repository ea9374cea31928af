//! Vendor rate listing.
//!
//! Rates are the rows produced by the vendor rates importer. The API has
//! served `mcc`, `mnc` and `rate` both as JSON numbers and as strings over
//! time, so they are normalized to strings here. A rate keeps its decimal
//! text (`0.0125`) and is never converted to a float.

use serde::{Deserialize, Serialize};

use crate::api::client::ApiClient;
use crate::api::envelope::string_or_number;
use crate::api::pagination::{ListQuery, Page};
use crate::error::AppError;

/// Listing endpoint for vendor rates.
pub const VENDOR_RATES_PATH: &str = "rates/";

/// One row of the vendor rates table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorRate {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: Option<String>,
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub mcc: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub mnc: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub rate: Option<String>,
}

/// Fetches one page of vendor rates.
pub async fn list_vendor_rates(
    api: &ApiClient,
    query: &ListQuery,
) -> Result<Page<VendorRate>, AppError> {
    api.list(VENDOR_RATES_PATH, query).await
}
