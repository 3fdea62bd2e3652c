//! Storage primitives shared by the relational log store
//!
//! Connection pooling, pragma setup and the storage error type. Schema and
//! queries live with the repositories that own them.

pub mod error;
pub mod sqlite;

// Re-export commonly used types
pub use error::{StorageError, StorageResult};
pub use sqlite::{
    apply_connection_pragmas, HealthStatus, SqliteConnection, SqlitePool, SqlitePoolConfig,
    SqliteStatement,
};
