//! Conversions from external infrastructure errors into domain errors.

use rusqlite::Error as SqlError;
use tidemark_common::storage::StorageError;
use tidemark_domain::TidemarkError;
use tokio::task::JoinError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub TidemarkError);

/// Result alias for infrastructure helpers that mix storage and domain errors.
pub type InfraResult<T> = Result<T, InfraError>;

impl From<InfraError> for TidemarkError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<TidemarkError> for InfraError {
    fn from(value: TidemarkError) -> Self {
        InfraError(value)
    }
}

/// Extension trait to make the conversion logic explicit in tests and within
/// this module.
trait IntoTidemarkError {
    fn into_tidemark(self) -> TidemarkError;
}

/* -------------------------------------------------------------------------- */
/* rusqlite::Error → TidemarkError */
/* -------------------------------------------------------------------------- */

impl IntoTidemarkError for SqlError {
    fn into_tidemark(self) -> TidemarkError {
        use rusqlite::ffi::ErrorCode;
        use rusqlite::Error as RE;

        match self {
            RE::SqliteFailure(err, maybe_message) => {
                let message = maybe_message.unwrap_or_default();
                match (err.code, err.extended_code) {
                    (ErrorCode::DatabaseBusy, _) => {
                        TidemarkError::Database("database is busy".into())
                    }
                    (ErrorCode::DatabaseLocked, _) => {
                        TidemarkError::Database("database is locked".into())
                    }
                    (ErrorCode::ConstraintViolation, 2067) => {
                        TidemarkError::Database("unique constraint violation".into())
                    }
                    _ => TidemarkError::Database(format!(
                        "sqlite failure {:?} (code {}): {}",
                        err.code, err.extended_code, message
                    )),
                }
            }
            RE::QueryReturnedNoRows => TidemarkError::NotFound("no rows returned by query".into()),
            RE::FromSqlConversionFailure(_, _, cause) => {
                TidemarkError::Database(format!("failed to convert sqlite value: {cause}"))
            }
            RE::InvalidColumnType(_, _, ty) => {
                TidemarkError::Database(format!("invalid column type: {ty}"))
            }
            RE::InvalidPath(path) => TidemarkError::Database(format!(
                "invalid database path: {}",
                path.to_string_lossy()
            )),
            other => TidemarkError::Database(other.to_string()),
        }
    }
}

impl From<SqlError> for InfraError {
    fn from(value: SqlError) -> Self {
        InfraError(value.into_tidemark())
    }
}

/* -------------------------------------------------------------------------- */
/* StorageError → TidemarkError */
/* -------------------------------------------------------------------------- */

impl IntoTidemarkError for StorageError {
    fn into_tidemark(self) -> TidemarkError {
        match self {
            StorageError::Rusqlite(sql_err) => sql_err.into_tidemark(),
            StorageError::Timeout(seconds) => {
                TidemarkError::Database(format!("database timeout after {seconds}s"))
            }
            StorageError::InvalidConfig(message) => TidemarkError::Config(message),
            StorageError::SchemaVersionMismatch { expected, found } => TidemarkError::Database(
                format!("schema version mismatch (expected {expected}, found {found})"),
            ),
            StorageError::Connection(message)
            | StorageError::Query(message)
            | StorageError::Migration(message) => TidemarkError::Database(message),
            StorageError::Io(io_err) => TidemarkError::Database(io_err.to_string()),
            StorageError::R2d2(r2d2_err) => TidemarkError::Database(r2d2_err.to_string()),
            StorageError::SerdeJson(json_err) => TidemarkError::Database(json_err.to_string()),
        }
    }
}

impl From<StorageError> for InfraError {
    fn from(value: StorageError) -> Self {
        InfraError(value.into_tidemark())
    }
}

/* -------------------------------------------------------------------------- */
/* tokio::task::JoinError → TidemarkError */
/* -------------------------------------------------------------------------- */

impl IntoTidemarkError for JoinError {
    fn into_tidemark(self) -> TidemarkError {
        if self.is_cancelled() {
            TidemarkError::Internal("blocking task cancelled".into())
        } else {
            TidemarkError::Internal(format!("blocking task failed: {self}"))
        }
    }
}

impl From<JoinError> for InfraError {
    fn from(value: JoinError) -> Self {
        InfraError(value.into_tidemark())
    }
}

/// Map a storage error straight to the domain error.
pub fn map_storage_error(err: StorageError) -> TidemarkError {
    err.into_tidemark()
}

/// Map a failed `spawn_blocking` join to the domain error.
pub fn map_join_error(err: JoinError) -> TidemarkError {
    err.into_tidemark()
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */
