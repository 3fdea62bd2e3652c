//! SQLite sync log repository
//!
//! Lease acquisition runs inside `BEGIN IMMEDIATE`, so concurrent acquirers
//! on the same database (from any process) are serialized. The partial
//! unique index on the active key backs that up at the schema level.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tidemark_common::storage::{SqliteConnection, StorageError, StorageResult};
use tidemark_core::{AcquiredLease, SyncEntityOptions, SyncLogStore};
use tidemark_domain::{
    AcquireLeaseBehavior, EntityKey, LogEntry, PriorSyncInfo, Result as DomainResult, StoreConfig,
    SyncStatus, SyncTriggerType, TidemarkError,
};
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use super::manager::DbManager;
use crate::errors::{map_join_error, map_storage_error, InfraResult};
use crate::store::{check_update, ensure_not_cancelled, LeaseRequest};

/// SQLite-based sync log repository
pub struct SqliteSyncLogStore {
    db: Arc<DbManager>,
    config: StoreConfig,
}

impl SqliteSyncLogStore {
    pub fn new(db: Arc<DbManager>, config: StoreConfig) -> Self {
        Self { db, config }
    }

    pub const fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Every entry for `key`, oldest first.
    pub async fn entries_for(&self, key: &EntityKey) -> DomainResult<Vec<LogEntry>> {
        let db = Arc::clone(&self.db);
        let key = key.clone();

        task::spawn_blocking(move || -> DomainResult<Vec<LogEntry>> {
            let conn = db.get_connection()?;
            query_entries_for_key(&conn, &key).map_err(map_storage_error)
        })
        .await
        .map_err(map_join_error)?
    }
}

#[async_trait]
impl SyncLogStore for SqliteSyncLogStore {
    // ========================================================================
    // Lease Management
    // ========================================================================

    async fn acquire_lease(
        &self,
        trigger_type: SyncTriggerType,
        entity: &SyncEntityOptions,
        behavior: AcquireLeaseBehavior,
        cancel: &CancellationToken,
    ) -> DomainResult<Option<AcquiredLease>> {
        ensure_not_cancelled(cancel)?;

        let db = Arc::clone(&self.db);
        let request = LeaseRequest::new(&self.config, trigger_type, entity, behavior);
        let machine_id = self.config.machine_id.clone();

        task::spawn_blocking(move || -> DomainResult<Option<AcquiredLease>> {
            let mut conn = db.get_connection()?;
            acquire_by_key(&mut conn, &request, &machine_id).map_err(TidemarkError::from)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn acquire_existing(
        &self,
        entry_id: &str,
        entity: &SyncEntityOptions,
        behavior: AcquireLeaseBehavior,
        cancel: &CancellationToken,
    ) -> DomainResult<Option<AcquiredLease>> {
        ensure_not_cancelled(cancel)?;

        let db = Arc::clone(&self.db);
        let entry_id = entry_id.to_string();
        let key = entity.key();
        let lease_duration = LeaseRequest::lease_duration(&self.config, entity);
        let machine_id = self.config.machine_id.clone();

        task::spawn_blocking(move || -> DomainResult<Option<AcquiredLease>> {
            let mut conn = db.get_connection()?;
            let resume = ResumeRequest { entry_id: &entry_id, key, behavior, lease_duration };
            acquire_by_id(&mut conn, resume, &machine_id).map_err(TidemarkError::from)
        })
        .await
        .map_err(map_join_error)?
    }

    // ========================================================================
    // Core CRUD
    // ========================================================================

    async fn update_log_entry(
        &self,
        entry: &LogEntry,
        cancel: &CancellationToken,
    ) -> DomainResult<()> {
        ensure_not_cancelled(cancel)?;

        let db = Arc::clone(&self.db);
        let entry = entry.clone();

        task::spawn_blocking(move || -> DomainResult<()> {
            let mut conn = db.get_connection()?;
            update_if_current(&mut conn, &entry).map_err(TidemarkError::from)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn record_queue_message_id(
        &self,
        entry_id: &str,
        message_id: &str,
        cancel: &CancellationToken,
    ) -> DomainResult<()> {
        ensure_not_cancelled(cancel)?;

        let db = Arc::clone(&self.db);
        let (entry_id, message_id) = (entry_id.to_string(), message_id.to_string());

        task::spawn_blocking(move || -> DomainResult<()> {
            let conn = db.get_connection()?;
            let updated = conn
                .execute(
                    "UPDATE sync_log_entries SET queue_message_id = ?1 WHERE id = ?2",
                    params![message_id, entry_id],
                )
                .map_err(map_storage_error)?;
            if updated == 0 {
                return Err(TidemarkError::NotFound(format!("sync log entry '{entry_id}'")));
            }
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    async fn find_by_id(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> DomainResult<Option<LogEntry>> {
        ensure_not_cancelled(cancel)?;

        let db = Arc::clone(&self.db);
        let id = id.to_string();

        task::spawn_blocking(move || -> DomainResult<Option<LogEntry>> {
            let conn = db.get_connection()?;
            query_entry_by_id(&conn, &id).map_err(map_storage_error)
        })
        .await
        .map_err(map_join_error)?
    }
}

// ============================================================================
// Acquisition and guarded updates (synchronous, inside BEGIN IMMEDIATE)
// ============================================================================

fn update_if_current(conn: &mut SqliteConnection, entry: &LogEntry) -> InfraResult<()> {
    let tx = conn.transaction_immediate()?;

    let stored = query_entry_by_id(&tx, &entry.id)?
        .ok_or_else(|| TidemarkError::NotFound(format!("sync log entry '{}'", entry.id)))?;
    if let Err(err) = check_update(&stored, entry) {
        warn!(entry_id = %entry.id, status = %stored.status, "Rejected stale sync log write");
        return Err(err.into());
    }

    update_entry(&tx, entry)?;
    tx.commit()?;
    Ok(())
}

struct ResumeRequest<'a> {
    entry_id: &'a str,
    key: EntityKey,
    behavior: AcquireLeaseBehavior,
    lease_duration: chrono::Duration,
}

fn acquire_by_key(
    conn: &mut SqliteConnection,
    request: &LeaseRequest,
    machine_id: &str,
) -> InfraResult<Option<AcquiredLease>> {
    let tx = conn.transaction_immediate()?;
    let acquired = acquire_in_tx(&tx, request, machine_id, now_millis())?;
    tx.commit()?;
    Ok(acquired)
}

fn acquire_by_id(
    conn: &mut SqliteConnection,
    resume: ResumeRequest<'_>,
    machine_id: &str,
) -> InfraResult<Option<AcquiredLease>> {
    let tx = conn.transaction_immediate()?;

    let entry = query_entry_by_id(&tx, resume.entry_id)?.ok_or_else(|| {
        TidemarkError::NotFound(format!("sync log entry '{}'", resume.entry_id))
    })?;
    if !entry.matches_key(&resume.key) {
        return Err(TidemarkError::KeyMismatch(format!(
            "sync log entry '{}' does not belong to entity '{}'",
            resume.entry_id, resume.key.entity
        ))
        .into());
    }
    if !entry.is_active() {
        debug!(entry_id = %entry.id, status = %entry.status, "Sync log entry already finished");
        return Ok(None);
    }

    let request = LeaseRequest {
        key: resume.key,
        trigger_type: entry.trigger_type,
        behavior: resume.behavior,
        lease_duration: resume.lease_duration,
    };
    let now = now_millis();

    let acquired = if entry.lease_expired_at(now) {
        // Expires the entry and hands out a fresh one for the same key.
        acquire_in_tx(&tx, &request, machine_id, now)?
    } else if request.blocked_by(&entry) {
        debug!(entry_id = %entry.id, "Sync log entry already leased");
        None
    } else {
        let prior = PriorSyncInfo::from_history(&query_terminal_history(&tx, &request.key)?);
        let mut entry = entry;
        request.stamp(&mut entry, machine_id, now);
        update_entry(&tx, &entry)?;
        Some(AcquiredLease { entry, prior })
    };

    tx.commit()?;
    Ok(acquired)
}

fn acquire_in_tx(
    conn: &Connection,
    request: &LeaseRequest,
    machine_id: &str,
    now: DateTime<Utc>,
) -> InfraResult<Option<AcquiredLease>> {
    let active = match query_active_entry(conn, &request.key)? {
        Some(entry) if entry.lease_expired_at(now) => {
            warn!(
                entity = %entry.entity,
                entry_id = %entry.id,
                "Lease expired, marking sync log entry as lease expired"
            );
            update_status(conn, &entry.id, SyncStatus::LeaseExpired)?;
            None
        }
        Some(entry) if request.blocked_by(&entry) => {
            debug!(entity = %entry.entity, entry_id = %entry.id, "Sync log entry already leased");
            return Ok(None);
        }
        other => other,
    };

    let prior = PriorSyncInfo::from_history(&query_terminal_history(conn, &request.key)?);

    let entry = match active {
        Some(mut entry) => {
            request.stamp(&mut entry, machine_id, now);
            update_entry(conn, &entry)?;
            entry
        }
        None => {
            let mut entry = LogEntry::pending(
                Uuid::now_v7().to_string(),
                &request.key,
                request.trigger_type,
                now,
            );
            request.stamp(&mut entry, machine_id, now);
            match insert_entry(conn, &entry) {
                Ok(()) => entry,
                Err(err) if err.is_constraint_violation() => {
                    debug!(entity = %entry.entity, "Active sync log entry created concurrently");
                    return Ok(None);
                }
                Err(err) => return Err(err.into()),
            }
        }
    };

    Ok(Some(AcquiredLease { entry, prior }))
}

// ============================================================================
// SQL Operations (synchronous)
// ============================================================================

macro_rules! select_entries {
    ($tail:literal) => {
        concat!(
            "SELECT id, entity, parameters_json, schema_version, trigger_type, status,
                    created_at, leased_at, leased_by, lease_expires_at, queued_at,
                    queue_message_id, finished_at, result_message, high_water_mark,
                    record_count, progress_value, progress_max
             FROM sync_log_entries ",
            $tail
        )
    };
}

fn query_entry_by_id(conn: &Connection, id: &str) -> StorageResult<Option<LogEntry>> {
    conn.query_row(select_entries!("WHERE id = ?1"), params![id], map_entry_row)
        .optional()
        .map_err(StorageError::from)
}

fn query_active_entry(conn: &Connection, key: &EntityKey) -> StorageResult<Option<LogEntry>> {
    let sql = select_entries!(
        "WHERE entity = ?1 AND parameters_json IS ?2 AND schema_version IS ?3
           AND status IN ('pending', 'in_progress')
         ORDER BY created_at DESC, rowid DESC
         LIMIT 1"
    );

    conn.query_row(
        sql,
        params![key.entity, key.parameters_json, key.schema_version],
        map_entry_row,
    )
    .optional()
    .map_err(StorageError::from)
}

/// Finished entries for `key`, oldest first.
fn query_terminal_history(conn: &Connection, key: &EntityKey) -> StorageResult<Vec<LogEntry>> {
    let sql = select_entries!(
        "WHERE entity = ?1 AND parameters_json IS ?2 AND schema_version IS ?3
           AND status NOT IN ('pending', 'in_progress')
         ORDER BY created_at ASC, rowid ASC"
    );

    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(
        params![key.entity, key.parameters_json, key.schema_version],
        map_entry_row,
    )?;
    rows.collect::<Result<Vec<_>, _>>().map_err(StorageError::from)
}

fn query_entries_for_key(conn: &Connection, key: &EntityKey) -> StorageResult<Vec<LogEntry>> {
    let sql = select_entries!(
        "WHERE entity = ?1 AND parameters_json IS ?2 AND schema_version IS ?3
         ORDER BY created_at ASC, rowid ASC"
    );

    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(
        params![key.entity, key.parameters_json, key.schema_version],
        map_entry_row,
    )?;
    rows.collect::<Result<Vec<_>, _>>().map_err(StorageError::from)
}

fn insert_entry(conn: &Connection, entry: &LogEntry) -> StorageResult<()> {
    conn.execute(
        "INSERT INTO sync_log_entries (id, entity, parameters_json, schema_version, trigger_type,
                                       status, created_at, leased_at, leased_by, lease_expires_at,
                                       queued_at, queue_message_id, finished_at, result_message,
                                       high_water_mark, record_count, progress_value, progress_max)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
        params![
            &entry.id,
            &entry.entity,
            &entry.parameters_json,
            entry.schema_version,
            entry.trigger_type.as_str(),
            entry.status.as_str(),
            to_sql_timestamp(entry.created_at),
            entry.leased_at.map(to_sql_timestamp),
            &entry.leased_by,
            entry.lease_expires_at.map(to_sql_timestamp),
            entry.queued_at.map(to_sql_timestamp),
            &entry.queue_message_id,
            entry.finished_at.map(to_sql_timestamp),
            &entry.result_message,
            &entry.high_water_mark,
            entry.record_count,
            entry.progress_value,
            entry.progress_max,
        ],
    )?;
    Ok(())
}

/// Write every mutable column; the key and creation fields never change.
fn update_entry(conn: &Connection, entry: &LogEntry) -> StorageResult<usize> {
    let updated = conn.execute(
        "UPDATE sync_log_entries
         SET status = ?1, leased_at = ?2, leased_by = ?3, lease_expires_at = ?4,
             queued_at = ?5, queue_message_id = ?6, finished_at = ?7, result_message = ?8,
             high_water_mark = ?9, record_count = ?10, progress_value = ?11, progress_max = ?12
         WHERE id = ?13",
        params![
            entry.status.as_str(),
            entry.leased_at.map(to_sql_timestamp),
            &entry.leased_by,
            entry.lease_expires_at.map(to_sql_timestamp),
            entry.queued_at.map(to_sql_timestamp),
            &entry.queue_message_id,
            entry.finished_at.map(to_sql_timestamp),
            &entry.result_message,
            &entry.high_water_mark,
            entry.record_count,
            entry.progress_value,
            entry.progress_max,
            &entry.id,
        ],
    )?;
    Ok(updated)
}

fn update_status(conn: &Connection, id: &str, status: SyncStatus) -> StorageResult<()> {
    conn.execute(
        "UPDATE sync_log_entries SET status = ?1 WHERE id = ?2",
        params![status.as_str(), id],
    )?;
    Ok(())
}

// ============================================================================
// Row Mapping
// ============================================================================

fn map_entry_row(row: &Row<'_>) -> rusqlite::Result<LogEntry> {
    Ok(LogEntry {
        id: row.get(0)?,
        entity: row.get(1)?,
        parameters_json: row.get(2)?,
        schema_version: row.get(3)?,
        trigger_type: parse_column(row, 4)?,
        status: parse_column(row, 5)?,
        created_at: timestamp_column(row, 6)?,
        leased_at: optional_timestamp_column(row, 7)?,
        leased_by: row.get(8)?,
        lease_expires_at: optional_timestamp_column(row, 9)?,
        queued_at: optional_timestamp_column(row, 10)?,
        queue_message_id: row.get(11)?,
        finished_at: optional_timestamp_column(row, 12)?,
        result_message: row.get(13)?,
        high_water_mark: row.get(14)?,
        record_count: row.get(15)?,
        progress_value: row.get(16)?,
        progress_max: row.get(17)?,
    })
}

fn parse_column<T>(row: &Row<'_>, index: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = String>,
{
    let raw: String = row.get(index)?;
    raw.parse::<T>().map_err(|e| conversion_failure(index, e))
}

fn timestamp_column(row: &Row<'_>, index: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(index)?;
    parse_timestamp(index, &raw)
}

fn optional_timestamp_column(row: &Row<'_>, index: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(index)?;
    raw.map(|raw| parse_timestamp(index, &raw)).transpose()
}

fn parse_timestamp(index: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| conversion_failure(index, e.to_string()))
}

fn conversion_failure(index: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        index,
        Type::Text,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, message)),
    )
}

fn to_sql_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Current time at the precision the table stores.
fn now_millis() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use tempfile::TempDir;

    use super::*;

    fn setup_repository() -> (SqliteSyncLogStore, TempDir) {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let db_path = temp_dir.path().join("sync_log.db");
        let db = DbManager::new(&db_path, 4).expect("failed to create db manager");
        db.run_migrations().expect("failed to run migrations");

        (SqliteSyncLogStore::new(Arc::new(db), StoreConfig::new("worker-1")), temp_dir)
    }

    #[test]
    fn test_timestamps_sort_lexically() {
        let earlier = Utc::now().trunc_subsecs(3);
        let later = earlier + Duration::milliseconds(1);

        let (a, b) = (to_sql_timestamp(earlier), to_sql_timestamp(later));
        assert!(a < b);
        assert!(a.ends_with('Z'));
        assert_eq!(parse_timestamp(0, &a).unwrap(), earlier);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_acquired_entry_round_trips_through_find() {
        // Arrange
        let (repo, _temp_dir) = setup_repository();
        let cancel = CancellationToken::new();
        let entity = SyncEntityOptions::new("Orders", "orders")
            .with_parameter("region", "eu")
            .with_schema_version(3);

        // Act
        let lease = repo
            .acquire_lease(
                SyncTriggerType::Manual,
                &entity,
                AcquireLeaseBehavior::AcquireIfNotLeased,
                &cancel,
            )
            .await
            .unwrap()
            .unwrap();
        let stored = repo.find_by_id(&lease.entry.id, &cancel).await.unwrap().unwrap();

        // Assert
        assert_eq!(stored, lease.entry);
        assert_eq!(stored.parameters_json.as_deref(), Some(r#"{"region":"eu"}"#));
        assert_eq!(stored.schema_version, Some(3));
        assert_eq!(stored.trigger_type, SyncTriggerType::Manual);
        assert!(Uuid::parse_str(&stored.id).is_ok());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_update_persists_terminal_fields() {
        // Arrange
        let (repo, _temp_dir) = setup_repository();
        let cancel = CancellationToken::new();
        let entity = SyncEntityOptions::new("Orders", "orders");
        let lease = repo
            .acquire_lease(
                SyncTriggerType::Timer,
                &entity,
                AcquireLeaseBehavior::AcquireIfNotLeased,
                &cancel,
            )
            .await
            .unwrap()
            .unwrap();

        // Act
        let mut entry = lease.entry;
        entry.status = SyncStatus::Completed;
        entry.finished_at = Some(now_millis());
        entry.result_message = Some("done".into());
        entry.high_water_mark = Some("2026-10-01".into());
        entry.record_count = Some(42);
        entry.progress_value = Some(4);
        entry.progress_max = Some(4);
        repo.update_log_entry(&entry, &cancel).await.unwrap();

        // Assert
        let stored = repo.find_by_id(&entry.id, &cancel).await.unwrap().unwrap();
        assert_eq!(stored, entry);
        assert_eq!(repo.entries_for(&entity.key()).await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_update_unknown_entry_is_not_found() {
        let (repo, _temp_dir) = setup_repository();
        let entity = SyncEntityOptions::new("Orders", "orders");
        let entry =
            LogEntry::pending("missing", &entity.key(), SyncTriggerType::Timer, now_millis());

        let result = repo.update_log_entry(&entry, &CancellationToken::new()).await;
        assert!(matches!(result, Err(TidemarkError::NotFound(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_keys_differing_only_by_schema_version_are_independent() {
        let (repo, _temp_dir) = setup_repository();
        let cancel = CancellationToken::new();
        let v1 = SyncEntityOptions::new("Orders", "orders").with_schema_version(1);
        let v2 = SyncEntityOptions::new("Orders", "orders").with_schema_version(2);

        for entity in [&v1, &v2] {
            let lease = repo
                .acquire_lease(
                    SyncTriggerType::Timer,
                    entity,
                    AcquireLeaseBehavior::AcquireIfNotLeased,
                    &cancel,
                )
                .await
                .unwrap();
            assert!(lease.is_some());
        }
    }
}
