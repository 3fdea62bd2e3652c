//! SQLite connection pool
//!
//! r2d2-based pooling with pragmas applied to every new connection.

use std::path::Path;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use tracing::{debug, info, instrument, warn};

use super::config::SqlitePoolConfig;
use super::connection::SqliteConnection;
use super::pragmas::apply_connection_pragmas;
use crate::storage::error::{StorageError, StorageResult};

/// Snapshot of pool state returned by [`SqlitePool::health_check`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthStatus {
    pub healthy: bool,
    pub connections: u32,
    pub idle_connections: u32,
    pub max_connections: u32,
    pub message: Option<String>,
}

/// Pool of SQLite connections
#[derive(Debug, Clone)]
pub struct SqlitePool {
    pool: Pool<SqliteConnectionManager>,
    config: SqlitePoolConfig,
}

impl SqlitePool {
    /// Open (creating if needed) the database at `path`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or the pool cannot hand
    /// out a first connection.
    #[instrument(fields(db_path = ?path, pool_size = config.max_size))]
    pub fn new(path: &Path, config: SqlitePoolConfig) -> StorageResult<Self> {
        info!("Creating SQLite connection pool");

        let pragma_config = config.clone();
        let manager = SqliteConnectionManager::file(path).with_init(move |conn| {
            apply_connection_pragmas(conn, &pragma_config)
                .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
        });

        let pool = Pool::builder()
            .max_size(config.max_size)
            .connection_timeout(config.connection_timeout)
            .build(manager)
            .map_err(|e| {
                warn!(error = %e, "Failed to create connection pool");
                StorageError::Connection(format!("Failed to create pool: {e}"))
            })?;

        info!(max_size = config.max_size, "SQLite pool created");

        Ok(Self { pool, config })
    }

    #[instrument(skip(self), fields(pool_size = self.config.max_size))]
    pub fn get_connection(&self) -> StorageResult<SqliteConnection> {
        match self.pool.get() {
            Ok(conn) => {
                debug!("Connection acquired");
                Ok(SqliteConnection::new(conn))
            }
            Err(e) => {
                let message = e.to_string();
                if message.to_lowercase().contains("timed out") {
                    warn!(timeout = ?self.config.connection_timeout, "Connection timeout");
                    Err(StorageError::Timeout(self.config.connection_timeout.as_secs()))
                } else {
                    warn!(error = %message, "Connection error");
                    Err(StorageError::Connection(format!("Failed to get connection: {message}")))
                }
            }
        }
    }

    pub fn health_check(&self) -> HealthStatus {
        let state = self.pool.state();
        let max_connections = self.config.max_size;

        match self.pool.get() {
            Ok(_conn) => HealthStatus {
                healthy: true,
                connections: state.connections,
                idle_connections: state.idle_connections,
                max_connections,
                message: None,
            },
            Err(e) => HealthStatus {
                healthy: false,
                connections: state.connections,
                idle_connections: state.idle_connections,
                max_connections,
                message: Some(format!("Pool unhealthy: {e}")),
            },
        }
    }

    pub const fn config(&self) -> &SqlitePoolConfig {
        &self.config
    }
}
