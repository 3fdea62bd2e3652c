//! Shared fixtures for infra integration tests
#![allow(dead_code)]

pub mod jobs;

use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;
use tidemark_core::{SyncEntityOptions, SyncLogStore};
use tidemark_domain::{LogEntry, StoreConfig};
use tidemark_infra::{DbManager, InMemorySyncLogStore, SqliteSyncLogStore};

pub const MACHINE_ID: &str = "test-host";

pub fn store_config(machine_id: &str) -> StoreConfig {
    StoreConfig::new(machine_id)
}

/// Temporary database wrapper that keeps the underlying file alive for the
/// duration of a test run.
pub struct TestDatabase {
    pub manager: Arc<DbManager>,
    path: PathBuf,
    _temp_dir: TempDir,
}

impl TestDatabase {
    /// Create a new temporary database with the schema applied.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("temp dir should be created");
        let path = temp_dir.path().join("sync_log.db");

        let manager = DbManager::new(&path, 4).expect("db manager should be created");
        manager.run_migrations().expect("migrations should run");

        Self { manager: Arc::new(manager), path, _temp_dir: temp_dir }
    }

    /// A second, independent pool on the same file, as another host would
    /// have.
    pub fn open_another(&self) -> Arc<DbManager> {
        Arc::new(DbManager::new(&self.path, 4).expect("second db manager should be created"))
    }
}

impl Default for TestDatabase {
    fn default() -> Self {
        Self::new()
    }
}

enum Backing {
    Memory(Arc<InMemorySyncLogStore>),
    Sqlite(Arc<SqliteSyncLogStore>, TestDatabase),
}

/// A log store under test plus a way to read back its full history.
pub struct TestStore {
    pub name: &'static str,
    pub store: Arc<dyn SyncLogStore>,
    backing: Backing,
}

impl TestStore {
    pub fn memory() -> Self {
        let store = Arc::new(InMemorySyncLogStore::new(store_config(MACHINE_ID)));
        Self { name: "memory", store: store.clone(), backing: Backing::Memory(store) }
    }

    pub fn sqlite() -> Self {
        let db = TestDatabase::new();
        let store =
            Arc::new(SqliteSyncLogStore::new(Arc::clone(&db.manager), store_config(MACHINE_ID)));
        Self { name: "sqlite", store: store.clone(), backing: Backing::Sqlite(store, db) }
    }

    /// One instance of every backend.
    pub fn all() -> Vec<Self> {
        vec![Self::memory(), Self::sqlite()]
    }

    /// Every entry for the entity's key, oldest first.
    pub async fn entries_for(&self, entity: &SyncEntityOptions) -> Vec<LogEntry> {
        match &self.backing {
            Backing::Memory(store) => store.entries_for(&entity.key()),
            Backing::Sqlite(store, _) => {
                store.entries_for(&entity.key()).await.expect("history should load")
            }
        }
    }
}
