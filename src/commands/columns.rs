//! Column picker commands for the listing tables.

use tracing::debug;

use crate::error::AppError;
use crate::state::AppState;
use crate::storage::{
    load_selection, reset_selection, save_selection, ColumnCatalog, FilterSelection,
};

/// Tables that offer a column picker.
pub const TABLES: &[&str] = &["company", "vendor_rates", "campaign"];

/// The fixed column catalog of a table.
pub fn catalog_for(table: &str) -> Result<ColumnCatalog, AppError> {
    let catalog = match table {
        "company" => ColumnCatalog::new("company")
            .column("name", "Name")
            .column("email", "Email")
            .optional("phone", "Phone")
            .column("country", "Country")
            .optional("balance", "Balance")
            .column("status", "Status")
            .optional("created_at", "Created"),
        "vendor_rates" => ColumnCatalog::new("vendor_rates")
            .column("vendor", "Vendor")
            .column("country", "Country")
            .column("mcc", "MCC")
            .column("mnc", "MNC")
            .column("rate", "Rate")
            .optional("currency", "Currency")
            .optional("updated_at", "Updated"),
        "campaign" => ColumnCatalog::new("campaign")
            .column("name", "Name")
            .optional("sender_id", "Sender ID")
            .column("status", "Status")
            .column("recipients", "Recipients")
            .optional("scheduled_at", "Scheduled")
            .optional("created_at", "Created"),
        other => {
            return Err(AppError::NotFound(format!("Unknown table: {}", other)));
        }
    };
    Ok(catalog)
}

/// The saved columns of `table`, or its defaults.
pub async fn load_columns(state: &AppState, table: &str) -> Result<FilterSelection, AppError> {
    let catalog = catalog_for(table)?;
    Ok(load_selection(&*state.db, &catalog).await)
}

/// Saves the picked columns and returns them as stored (catalog order,
/// unknown keys dropped).
pub async fn save_columns(
    state: &AppState,
    table: &str,
    keys: Vec<String>,
) -> Result<FilterSelection, AppError> {
    let catalog = catalog_for(table)?;
    let selection = FilterSelection::from_keys(&catalog, &keys);
    if selection.keys().len() != keys.len() {
        debug!("[PREFS] Dropped unknown or repeated columns for {}", table);
    }
    save_selection(&*state.db, &catalog, &selection).await?;
    Ok(selection)
}

/// Shows or hides one column and saves the result.
pub async fn toggle_column(
    state: &AppState,
    table: &str,
    key: &str,
) -> Result<FilterSelection, AppError> {
    let catalog = catalog_for(table)?;
    let mut selection = load_selection(&*state.db, &catalog).await;
    selection.toggle(&catalog, key);
    save_selection(&*state.db, &catalog, &selection).await?;
    Ok(selection)
}

/// Drops the saved choice and returns the defaults.
pub async fn reset_columns(state: &AppState, table: &str) -> Result<FilterSelection, AppError> {
    let catalog = catalog_for(table)?;
    reset_selection(&*state.db, &catalog).await?;
    Ok(catalog.default_selection())
}
