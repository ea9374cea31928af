//! Local persistence: SQLite settings, keychain credentials and the column
//! preferences built on top of them.

mod database;
pub mod columns;
pub mod credentials;

pub use columns::{
    load_selection, reset_selection, save_selection, ColumnCatalog, ColumnDef, FilterSelection,
    MemoryPreferenceStore, PreferenceStore,
};
pub use database::Database;
