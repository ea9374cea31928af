//! SQLite database module with schema migrations.
//!
//! The console keeps small per-operator settings (column choices and the
//! like) in a key/value table, the desktop counterpart of browser local
//! storage.

use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rusqlite::{Connection, OptionalExtension};

use crate::error::AppError;

/// Current schema version. Increment when adding new migrations.
const SCHEMA_VERSION: i32 = 1;

/// V1 schema: key/value settings.
const V1_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS local_storage (
    key TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL,
    updated_at INTEGER NOT NULL
);
"#;

/// SQLite database handle.
///
/// Holds only the path; every call opens its own connection on a blocking
/// thread.
#[derive(Debug, Clone)]
pub struct Database {
    db_path: PathBuf,
}

impl Database {
    /// Initializes the database at the given path.
    /// Creates parent directories if needed, opens the SQLite file, and runs migrations.
    pub async fn init(db_path: PathBuf) -> Result<Self, AppError> {
        let path = db_path.clone();

        tokio::task::spawn_blocking(move || {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    AppError::Internal(format!("Failed to create database directory: {e}"))
                })?;
            }

            let mut conn = open(&path)?;
            run_migrations(&mut conn)?;

            Ok::<_, AppError>(())
        })
        .await
        .map_err(|e| AppError::Internal(format!("Database init task failed: {e}")))??;

        Ok(Self { db_path })
    }

    pub fn db_path(&self) -> &PathBuf {
        &self.db_path
    }

    /// Simple health check: executes SELECT 1.
    pub async fn health_check(&self) -> Result<(), AppError> {
        let db_path = self.db_path.clone();

        tokio::task::spawn_blocking(move || {
            let conn = open(&db_path)?;
            conn.query_row("SELECT 1", [], |_| Ok(()))
                .map_err(|e| AppError::Internal(format!("Health check failed: {e}")))?;
            Ok::<_, AppError>(())
        })
        .await
        .map_err(|e| AppError::Internal(format!("Health check task failed: {e}")))?
    }

    // ── Local Storage ─────────────────────────────────────────────────────────

    /// Reads a stored value.
    pub async fn get_item(&self, key: &str) -> Result<Option<String>, AppError> {
        let db_path = self.db_path.clone();
        let key = key.to_string();

        tokio::task::spawn_blocking(move || {
            let conn = open(&db_path)?;
            conn.query_row(
                "SELECT value FROM local_storage WHERE key = ?1",
                [&key],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(|e| AppError::Internal(format!("Failed to read setting: {e}")))
        })
        .await
        .map_err(|e| AppError::Internal(format!("Get item task failed: {e}")))?
    }

    /// Inserts or replaces a value.
    pub async fn set_item(&self, key: &str, value: &str) -> Result<(), AppError> {
        let db_path = self.db_path.clone();
        let key = key.to_string();
        let value = value.to_string();

        tokio::task::spawn_blocking(move || {
            let conn = open(&db_path)?;
            conn.execute(
                r#"
                INSERT INTO local_storage (key, value, updated_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    updated_at = excluded.updated_at
                "#,
                rusqlite::params![key, value, now_millis()],
            )
            .map_err(|e| AppError::Internal(format!("Failed to write setting: {e}")))?;
            Ok::<_, AppError>(())
        })
        .await
        .map_err(|e| AppError::Internal(format!("Set item task failed: {e}")))?
    }

    /// Deletes a value; deleting a missing key is not an error.
    pub async fn remove_item(&self, key: &str) -> Result<(), AppError> {
        let db_path = self.db_path.clone();
        let key = key.to_string();

        tokio::task::spawn_blocking(move || {
            let conn = open(&db_path)?;
            conn.execute("DELETE FROM local_storage WHERE key = ?1", [&key])
                .map_err(|e| AppError::Internal(format!("Failed to delete setting: {e}")))?;
            Ok::<_, AppError>(())
        })
        .await
        .map_err(|e| AppError::Internal(format!("Remove item task failed: {e}")))?
    }

    /// Keys starting with `prefix`, sorted.
    pub async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, AppError> {
        let db_path = self.db_path.clone();
        let pattern = format!("{}%", escape_like(prefix));

        tokio::task::spawn_blocking(move || {
            let conn = open(&db_path)?;
            let mut stmt = conn
                .prepare("SELECT key FROM local_storage WHERE key LIKE ?1 ESCAPE '\\' ORDER BY key")
                .map_err(|e| AppError::Internal(format!("Failed to prepare query: {e}")))?;
            let keys = stmt
                .query_map([&pattern], |row| row.get::<_, String>(0))
                .map_err(|e| AppError::Internal(format!("Failed to query keys: {e}")))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| AppError::Internal(format!("Failed to collect keys: {e}")))?;
            Ok::<_, AppError>(keys)
        })
        .await
        .map_err(|e| AppError::Internal(format!("List keys task failed: {e}")))?
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Connection Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn open(path: &PathBuf) -> Result<Connection, AppError> {
    let conn = Connection::open(path)
        .map_err(|e| AppError::Internal(format!("Failed to open database: {e}")))?;
    configure_connection(&conn)?;
    Ok(conn)
}

fn configure_connection(conn: &Connection) -> Result<(), AppError> {
    conn.busy_timeout(Duration::from_secs(10))
        .map_err(|e| AppError::Internal(format!("Failed to set busy timeout: {e}")))?;

    conn.pragma_update(None, "journal_mode", "WAL")
        .map_err(|e| AppError::Internal(format!("Failed to set WAL mode: {e}")))?;

    Ok(())
}

/// Runs database migrations using PRAGMA user_version.
fn run_migrations(conn: &mut Connection) -> Result<(), AppError> {
    let current_version: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .map_err(|e| AppError::Internal(format!("Failed to get schema version: {e}")))?;

    if current_version >= SCHEMA_VERSION {
        return Ok(());
    }

    let tx = conn
        .transaction()
        .map_err(|e| AppError::Internal(format!("Failed to start migration transaction: {e}")))?;

    if current_version < 1 {
        tx.execute_batch(V1_SCHEMA)
            .map_err(|e| AppError::Internal(format!("V1 migration failed: {e}")))?;
    }

    tx.pragma_update(None, "user_version", SCHEMA_VERSION)
        .map_err(|e| AppError::Internal(format!("Failed to update schema version: {e}")))?;

    tx.commit()
        .map_err(|e| AppError::Internal(format!("Failed to commit migration: {e}")))?;

    Ok(())
}

fn escape_like(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_db_path() -> (TempDir, PathBuf) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("nested/dir/test.db");
        (temp_dir, db_path)
    }

    #[tokio::test]
    async fn init_creates_db_file_and_table() {
        let (_temp_dir, db_path) = test_db_path();

        let db = Database::init(db_path.clone()).await.unwrap();

        assert!(db_path.exists());
        db.health_check().await.unwrap();

        let conn = Connection::open(&db_path).unwrap();
        let version: i32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn init_is_idempotent() {
        let (_temp_dir, db_path) = test_db_path();

        let db = Database::init(db_path.clone()).await.unwrap();
        db.set_item("company_table_columns", "[\"name\"]").await.unwrap();
        let db = Database::init(db_path).await.unwrap();

        assert_eq!(
            db.get_item("company_table_columns").await.unwrap().as_deref(),
            Some("[\"name\"]")
        );
    }

    #[tokio::test]
    async fn set_get_replace_remove() {
        let (_temp_dir, db_path) = test_db_path();
        let db = Database::init(db_path).await.unwrap();

        assert_eq!(db.get_item("k").await.unwrap(), None);

        db.set_item("k", "one").await.unwrap();
        db.set_item("k", "two").await.unwrap();
        assert_eq!(db.get_item("k").await.unwrap().as_deref(), Some("two"));

        db.remove_item("k").await.unwrap();
        db.remove_item("k").await.unwrap();
        assert_eq!(db.get_item("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn prefix_listing_treats_underscore_literally() {
        let (_temp_dir, db_path) = test_db_path();
        let db = Database::init(db_path).await.unwrap();

        db.set_item("vendor_table_columns", "[]").await.unwrap();
        db.set_item("company_table_columns", "[]").await.unwrap();
        db.set_item("vendorXtable", "[]").await.unwrap();

        assert_eq!(
            db.keys_with_prefix("vendor_").await.unwrap(),
            vec!["vendor_table_columns".to_string()]
        );
    }
}
