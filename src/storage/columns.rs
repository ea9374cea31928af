//! Column selection for listing tables.
//!
//! Every table has a fixed `ColumnCatalog`. The operator's choice is a
//! `FilterSelection`, persisted as a JSON array of keys under
//! `"<table>_table_columns"` through a `PreferenceStore`. Reading a missing,
//! corrupt or empty value yields the catalog's default columns.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::AppError;
use crate::storage::Database;

// ─────────────────────────────────────────────────────────────────────────────
// Catalog
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnDef {
    pub key: String,
    pub label: String,
    /// Shown when the operator has no saved choice.
    pub default_visible: bool,
}

/// The columns a table can show, in display order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnCatalog {
    table: String,
    columns: Vec<ColumnDef>,
}

impl ColumnCatalog {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
        }
    }

    /// Adds a column shown by default. Duplicate keys are ignored.
    pub fn column(self, key: impl Into<String>, label: impl Into<String>) -> Self {
        self.push(key.into(), label.into(), true)
    }

    /// Adds a column hidden by default.
    pub fn optional(self, key: impl Into<String>, label: impl Into<String>) -> Self {
        self.push(key.into(), label.into(), false)
    }

    fn push(mut self, key: String, label: String, default_visible: bool) -> Self {
        if !self.contains(&key) {
            self.columns.push(ColumnDef {
                key,
                label,
                default_visible,
            });
        }
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn contains(&self, key: &str) -> bool {
        self.columns.iter().any(|c| c.key == key)
    }

    /// Preference key, e.g. `company_table_columns`.
    pub fn storage_key(&self) -> String {
        format!("{}_table_columns", self.table)
    }

    pub fn default_selection(&self) -> FilterSelection {
        FilterSelection {
            keys: self
                .columns
                .iter()
                .filter(|c| c.default_visible)
                .map(|c| c.key.clone())
                .collect(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Selection
// ─────────────────────────────────────────────────────────────────────────────

/// Selected column keys; always a subset of the catalog in catalog order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterSelection {
    keys: Vec<String>,
}

impl FilterSelection {
    /// Builds a selection from arbitrary keys. Unknown keys are dropped and
    /// the result follows catalog order regardless of input order.
    pub fn from_keys<I, K>(catalog: &ColumnCatalog, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        let wanted: Vec<K> = keys.into_iter().collect();
        Self {
            keys: catalog
                .columns
                .iter()
                .filter(|c| wanted.iter().any(|k| k.as_ref() == c.key))
                .map(|c| c.key.clone())
                .collect(),
        }
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.iter().any(|k| k == key)
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Shows or hides one column. Keys outside the catalog are ignored.
    pub fn toggle(&mut self, catalog: &ColumnCatalog, key: &str) {
        if !catalog.contains(key) {
            return;
        }
        let mut keys = self.keys.clone();
        if self.contains(key) {
            keys.retain(|k| k != key);
        } else {
            keys.push(key.to_string());
        }
        *self = Self::from_keys(catalog, keys);
    }

    fn to_json(&self) -> Result<String, AppError> {
        serde_json::to_string(&self.keys)
            .map_err(|e| AppError::Internal(format!("Failed to serialize columns: {}", e)))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Preference Store
// ─────────────────────────────────────────────────────────────────────────────

/// String key/value persistence, allowing test fakes.
pub trait PreferenceStore: Send + Sync {
    fn get<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<String>, AppError>> + Send + 'a>>;

    fn set<'a>(
        &'a self,
        key: &'a str,
        value: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'a>>;

    fn remove<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'a>>;
}

impl PreferenceStore for Database {
    fn get<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<String>, AppError>> + Send + 'a>> {
        Box::pin(self.get_item(key))
    }

    fn set<'a>(
        &'a self,
        key: &'a str,
        value: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'a>> {
        Box::pin(self.set_item(key, value))
    }

    fn remove<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'a>> {
        Box::pin(self.remove_item(key))
    }
}

/// In-process store for tests and sessions without a database.
#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn get<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<String>, AppError>> + Send + 'a>> {
        Box::pin(async move { Ok(self.items.lock().await.get(key).cloned()) })
    }

    fn set<'a>(
        &'a self,
        key: &'a str,
        value: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'a>> {
        Box::pin(async move {
            self.items
                .lock()
                .await
                .insert(key.to_string(), value.to_string());
            Ok(())
        })
    }

    fn remove<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'a>> {
        Box::pin(async move {
            self.items.lock().await.remove(key);
            Ok(())
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Load / Save
// ─────────────────────────────────────────────────────────────────────────────

/// Restores the saved selection for `catalog`, or its defaults.
///
/// Never fails: a store error is logged and treated like a missing value.
pub async fn load_selection<S>(store: &S, catalog: &ColumnCatalog) -> FilterSelection
where
    S: PreferenceStore + ?Sized,
{
    let key = catalog.storage_key();
    let raw = match store.get(&key).await {
        Ok(Some(raw)) => raw,
        Ok(None) => return catalog.default_selection(),
        Err(e) => {
            warn!("[PREFS] Failed to read {}: {}", key, e);
            return catalog.default_selection();
        }
    };

    match serde_json::from_str::<Vec<String>>(&raw) {
        Ok(keys) => {
            let selection = FilterSelection::from_keys(catalog, &keys);
            if selection.is_empty() {
                catalog.default_selection()
            } else {
                selection
            }
        }
        Err(_) => {
            warn!("[PREFS] Ignoring corrupt value for {}", key);
            catalog.default_selection()
        }
    }
}

/// Persists `selection` for `catalog`.
pub async fn save_selection<S>(
    store: &S,
    catalog: &ColumnCatalog,
    selection: &FilterSelection,
) -> Result<(), AppError>
where
    S: PreferenceStore + ?Sized,
{
    let key = catalog.storage_key();
    let json = selection.to_json()?;
    store.set(&key, &json).await?;
    info!("[PREFS] Saved {} columns for {}", selection.keys().len(), catalog.table());
    Ok(())
}

/// Forgets the saved selection so defaults apply again.
pub async fn reset_selection<S>(store: &S, catalog: &ColumnCatalog) -> Result<(), AppError>
where
    S: PreferenceStore + ?Sized,
{
    store.remove(&catalog.storage_key()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn company_catalog() -> ColumnCatalog {
        ColumnCatalog::new("company")
            .column("name", "Name")
            .column("email", "Email")
            .optional("phone", "Phone")
            .optional("country", "Country")
    }

    #[test]
    fn storage_key_format() {
        assert_eq!(company_catalog().storage_key(), "company_table_columns");
    }

    #[test]
    fn selection_follows_catalog_order_and_drops_unknown() {
        let catalog = company_catalog();
        let selection = FilterSelection::from_keys(&catalog, ["phone", "bogus", "name", "phone"]);
        assert_eq!(selection.keys(), &["name".to_string(), "phone".to_string()]);
    }

    #[test]
    fn toggle_adds_in_catalog_order_and_removes() {
        let catalog = company_catalog();
        let mut selection = FilterSelection::from_keys(&catalog, ["phone"]);

        selection.toggle(&catalog, "name");
        assert_eq!(selection.keys(), &["name".to_string(), "phone".to_string()]);

        selection.toggle(&catalog, "phone");
        assert_eq!(selection.keys(), &["name".to_string()]);

        selection.toggle(&catalog, "nope");
        assert_eq!(selection.keys(), &["name".to_string()]);
    }

    #[tokio::test]
    async fn saved_columns_are_restored_exactly() {
        let store = MemoryPreferenceStore::new();
        let catalog = company_catalog();
        let chosen = FilterSelection::from_keys(&catalog, ["name", "phone"]);

        save_selection(&store, &catalog, &chosen).await.unwrap();
        let restored = load_selection(&store, &catalog).await;

        assert_eq!(restored.keys(), &["name".to_string(), "phone".to_string()]);
        assert_eq!(
            store.get("company_table_columns").await.unwrap().as_deref(),
            Some(r#"["name","phone"]"#)
        );
    }

    #[tokio::test]
    async fn missing_value_falls_back_to_defaults() {
        let store = MemoryPreferenceStore::new();
        let selection = load_selection(&store, &company_catalog()).await;
        assert_eq!(selection.keys(), &["name".to_string(), "email".to_string()]);
    }

    #[tokio::test]
    async fn corrupt_or_empty_value_falls_back_to_defaults() {
        let store = MemoryPreferenceStore::new();
        let catalog = company_catalog();

        store.set("company_table_columns", "{not json").await.unwrap();
        assert_eq!(load_selection(&store, &catalog).await, catalog.default_selection());

        store.set("company_table_columns", r#"["gone"]"#).await.unwrap();
        assert_eq!(load_selection(&store, &catalog).await, catalog.default_selection());
    }

    #[tokio::test]
    async fn reset_restores_defaults() {
        let store = MemoryPreferenceStore::new();
        let catalog = company_catalog();
        save_selection(&store, &catalog, &FilterSelection::from_keys(&catalog, ["country"]))
            .await
            .unwrap();

        reset_selection(&store, &catalog).await.unwrap();

        assert_eq!(load_selection(&store, &catalog).await, catalog.default_selection());
    }

    #[tokio::test]
    async fn database_store_persists_across_handles() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("prefs.db");
        let catalog = company_catalog();

        let db = Database::init(path.clone()).await.unwrap();
        save_selection(&db, &catalog, &FilterSelection::from_keys(&catalog, ["name", "phone"]))
            .await
            .unwrap();
        drop(db);

        let db = Database::init(path).await.unwrap();
        let restored = load_selection(&db, &catalog).await;
        assert_eq!(restored.keys(), &["name".to_string(), "phone".to_string()]);
    }
}
