//! Database connection manager backed by the shared SQLite pool.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rusqlite::params;
use tidemark_common::storage::{SqliteConnection, SqlitePool, SqlitePoolConfig, StorageError};
use tidemark_domain::Result;
use tracing::{info, warn};

use crate::errors::{map_storage_error, InfraError};

pub const SCHEMA_VERSION: i32 = 1;
const SCHEMA_SQL: &str = include_str!("schema.sql");

/// Database manager that wraps an [`SqlitePool`].
pub struct DbManager {
    pool: Arc<SqlitePool>,
    path: PathBuf,
}

impl DbManager {
    /// Open the database at `db_path` with up to `pool_size` connections.
    pub fn new<P: AsRef<Path>>(db_path: P, pool_size: u32) -> Result<Self> {
        let path = db_path.as_ref().to_path_buf();
        let config = SqlitePoolConfig::default().with_max_size(pool_size.max(1));

        let pool = SqlitePool::new(&path, config).map_err(map_storage_error)?;

        info!(db_path = %path.display(), max_connections = pool_size.max(1), "sqlite pool initialised");

        Ok(Self { pool: Arc::new(pool), path })
    }

    /// Borrow the underlying pool.
    pub fn pool(&self) -> &Arc<SqlitePool> {
        &self.pool
    }

    /// Acquire a connection from the pool.
    pub fn get_connection(&self) -> Result<SqliteConnection> {
        self.pool.get_connection().map_err(map_storage_error)
    }

    /// Ensure the full schema exists on the current database.
    ///
    /// Fails when the database was written by a newer schema.
    pub fn run_migrations(&self) -> Result<()> {
        let conn = self.get_connection()?;
        create_schema(&conn).map_err(Into::into)
    }

    /// Return the configured database path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Verify the database is reachable and answering queries.
    pub fn health_check(&self) -> Result<()> {
        let conn = self.get_connection()?;
        conn.query_row("SELECT 1", params![], |row| row.get::<_, i32>(0))
            .map_err(map_storage_error)?;
        Ok(())
    }
}

fn create_schema(conn: &SqliteConnection) -> std::result::Result<(), InfraError> {
    conn.execute_batch(SCHEMA_SQL)?;

    let found: Option<i32> =
        conn.query_row("SELECT MAX(version) FROM schema_version", params![], |row| row.get(0))?;
    if let Some(found) = found.filter(|found| *found > SCHEMA_VERSION) {
        warn!(expected = SCHEMA_VERSION, found, "Database schema is newer than this build");
        return Err(StorageError::SchemaVersionMismatch { expected: SCHEMA_VERSION, found }.into());
    }

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (?1, CAST(strftime('%s','now') AS INTEGER))",
        params![SCHEMA_VERSION],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;
    use tidemark_domain::TidemarkError;

    use super::*;

    #[test]
    fn migrations_create_schema_version() {
        let temp_dir = TempDir::new().expect("temp dir created");
        let db_path = temp_dir.path().join("test.db");

        let manager = DbManager::new(&db_path, 4).expect("manager created");
        manager.run_migrations().expect("migrations run");

        let conn = manager.get_connection().expect("connection acquired");
        let version: i32 =
            conn.query_row("SELECT version FROM schema_version", &[], |row| row.get(0)).unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn migrations_are_idempotent() {
        let temp_dir = TempDir::new().expect("temp dir created");
        let manager = DbManager::new(temp_dir.path().join("test.db"), 2).expect("manager created");

        manager.run_migrations().expect("first run");
        manager.run_migrations().expect("second run");

        let conn = manager.get_connection().unwrap();
        let rows: i64 =
            conn.query_row("SELECT COUNT(*) FROM schema_version", &[], |row| row.get(0)).unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn newer_schema_is_rejected() {
        let temp_dir = TempDir::new().expect("temp dir created");
        let manager = DbManager::new(temp_dir.path().join("test.db"), 2).expect("manager created");
        manager.run_migrations().unwrap();

        let conn = manager.get_connection().unwrap();
        conn.execute("INSERT INTO schema_version (version, applied_at) VALUES (99, 0)", &[])
            .unwrap();
        drop(conn);

        let err = manager.run_migrations().unwrap_err();
        assert!(matches!(err, TidemarkError::Database(message) if message.contains("mismatch")));
    }

    #[test]
    fn active_key_index_rejects_second_active_entry() {
        let temp_dir = TempDir::new().expect("temp dir created");
        let manager = DbManager::new(temp_dir.path().join("test.db"), 2).expect("manager created");
        manager.run_migrations().unwrap();
        let conn = manager.get_connection().unwrap();

        let insert = "INSERT INTO sync_log_entries (id, entity, trigger_type, status, created_at)
                      VALUES (?1, 'Orders', 'timer', ?2, '2026-01-01T00:00:00.000Z')";
        conn.execute(insert, params!["a", "completed"]).unwrap();
        conn.execute(insert, params!["b", "pending"]).unwrap();

        let err = conn.execute(insert, params!["c", "in_progress"]).unwrap_err();
        assert!(err.is_constraint_violation());
    }

    #[test]
    fn health_check_succeeds_for_valid_database() {
        let temp_dir = TempDir::new().expect("temp dir created");
        let manager = DbManager::new(temp_dir.path().join("test.db"), 4).expect("manager created");
        manager.run_migrations().expect("migrations run");

        manager.health_check().expect("health check passed");
    }
}
