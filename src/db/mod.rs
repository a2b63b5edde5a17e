// Database layer: persistence for tenant policy documents and the
// enforcement audit trail.
//
// Policies are stored as JSON text, one row per tenant. We use rusqlite with
// the "bundled" feature so there's no system SQLite dependency. The database
// file lives wherever SENTINEL_DB_PATH points (defaults to ./sentinel.db).
// An in-memory backend covers tests and dry runs.

pub mod memory;
pub mod models;
pub mod traits;

#[cfg(feature = "sqlite")]
pub mod queries;
#[cfg(feature = "sqlite")]
pub mod schema;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::MemoryDatabase;
pub use traits::Database;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;

#[cfg(feature = "sqlite")]
use anyhow::{Context, Result};
#[cfg(feature = "sqlite")]
use rusqlite::Connection;
#[cfg(feature = "sqlite")]
use std::path::Path;

/// Open (or create) the database and run migrations.
///
/// Called by `sentinel init` and by any command that needs policy storage.
#[cfg(feature = "sqlite")]
pub fn initialize(db_path: &str) -> Result<Connection> {
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory for database: {}", db_path))?;
        }
    }

    let conn = Connection::open(db_path)
        .with_context(|| format!("Failed to open database at {}", db_path))?;

    // Enable WAL mode for better concurrent read performance
    conn.pragma_update(None, "journal_mode", "WAL")?;

    schema::create_tables(&conn)?;

    Ok(conn)
}

/// Open an existing database (fails if it doesn't exist yet).
#[cfg(feature = "sqlite")]
pub fn open(db_path: &str) -> Result<Connection> {
    if !Path::new(db_path).exists() {
        anyhow::bail!(
            "Database not found at {}. Run `sentinel init` first.",
            db_path
        );
    }

    let conn = Connection::open(db_path)
        .with_context(|| format!("Failed to open database at {}", db_path))?;

    conn.pragma_update(None, "journal_mode", "WAL")?;

    // Pick up migrations added since the file was created
    schema::create_tables(&conn)?;

    Ok(conn)
}
