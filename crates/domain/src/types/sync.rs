//! Sync log and trigger types
//!
//! A [`LogEntry`] records one execution attempt for an entity key. Entries are
//! owned by the log store; everything handed out is an owned copy that the
//! caller mutates and writes back through `update_log_entry`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entity::EntityKey;

// ============================================================================
// Enumerations
// ============================================================================

/// Lifecycle status of a log entry.
///
/// `Pending` and `InProgress` are active; everything else is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    LeaseExpired,
    Skipped,
}

crate::impl_domain_status_conversions!(SyncStatus {
    Pending => "pending",
    InProgress => "in_progress",
    Completed => "completed",
    Failed => "failed",
    LeaseExpired => "lease_expired",
    Skipped => "skipped",
});

impl SyncStatus {
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::InProgress)
    }

    pub const fn is_terminal(self) -> bool {
        !self.is_active()
    }
}

/// What started a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTriggerType {
    Custom,
    Timer,
    Manual,
}

crate::impl_domain_status_conversions!(SyncTriggerType {
    Custom => "custom",
    Timer => "timer",
    Manual => "manual",
});

/// How lease acquisition treats an active entry that already holds a lease.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquireLeaseBehavior {
    /// Create or return the active entry without stamping lease fields.
    DoNotAcquire,
    #[default]
    AcquireIfNotLeased,
    /// Take the lease even if another holder's lease has not expired.
    ForceAcquire,
}

crate::impl_domain_status_conversions!(AcquireLeaseBehavior {
    DoNotAcquire => "do_not_acquire",
    AcquireIfNotLeased => "acquire_if_not_leased",
    ForceAcquire => "force_acquire",
});

/// Which entities the queue fan-out creates entries for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueBehavior {
    #[default]
    QueueAll,
    QueueEligibleOnly,
}

crate::impl_domain_status_conversions!(QueueBehavior {
    QueueAll => "queue_all",
    QueueEligibleOnly => "queue_eligible_only",
});

// ============================================================================
// Log Entry
// ============================================================================

/// One execution attempt for an entity key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: String,
    pub entity: String,
    pub parameters_json: Option<String>,
    pub schema_version: Option<i32>,
    pub trigger_type: SyncTriggerType,
    pub status: SyncStatus,
    pub created_at: DateTime<Utc>,
    pub leased_at: Option<DateTime<Utc>>,
    pub leased_by: Option<String>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub queued_at: Option<DateTime<Utc>>,
    pub queue_message_id: Option<String>,
    pub finished_at: Option<DateTime<Utc>>,
    pub result_message: Option<String>,
    pub high_water_mark: Option<String>,
    pub record_count: Option<i64>,
    pub progress_value: Option<i64>,
    pub progress_max: Option<i64>,
}

impl LogEntry {
    /// Fresh pending entry with no lease, queue or completion data.
    pub fn pending(
        id: impl Into<String>,
        key: &EntityKey,
        trigger_type: SyncTriggerType,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            entity: key.entity.clone(),
            parameters_json: key.parameters_json.clone(),
            schema_version: key.schema_version,
            trigger_type,
            status: SyncStatus::Pending,
            created_at,
            leased_at: None,
            leased_by: None,
            lease_expires_at: None,
            queued_at: None,
            queue_message_id: None,
            finished_at: None,
            result_message: None,
            high_water_mark: None,
            record_count: None,
            progress_value: None,
            progress_max: None,
        }
    }

    pub fn key(&self) -> EntityKey {
        EntityKey::new(self.entity.clone(), self.parameters_json.clone(), self.schema_version)
    }

    pub fn matches_key(&self, key: &EntityKey) -> bool {
        self.entity == key.entity
            && self.parameters_json == key.parameters_json
            && self.schema_version == key.schema_version
    }

    pub const fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub const fn is_leased(&self) -> bool {
        self.leased_at.is_some()
    }

    /// True when the entry carries a lease whose expiry is before `now`.
    pub fn lease_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.lease_expires_at.is_some_and(|expires| expires < now)
    }

    /// `progress_value / progress_max`, when both are set and max is positive.
    #[allow(clippy::cast_precision_loss)]
    pub fn progress_percentage(&self) -> Option<f64> {
        match (self.progress_value, self.progress_max) {
            (Some(value), Some(max)) if max > 0 => Some(value as f64 / max as f64),
            _ => None,
        }
    }
}

// ============================================================================
// Triggers and Results
// ============================================================================

/// Snapshot of an entity key's terminal history, computed at acquisition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorSyncInfo {
    pub high_water_mark: Option<String>,
    pub last_sync_queued_at: Option<DateTime<Utc>>,
    pub last_sync_leased_at: Option<DateTime<Utc>>,
    pub last_sync_completed_at: Option<DateTime<Utc>>,
}

impl PriorSyncInfo {
    /// Derive the snapshot from history entries.
    ///
    /// Active entries are ignored. Ordering is by `created_at` descending;
    /// among equal timestamps later positions in `history` win.
    pub fn from_history<'a>(history: impl IntoIterator<Item = &'a LogEntry>) -> Self {
        let mut terminal: Vec<(usize, &LogEntry)> =
            history.into_iter().filter(|e| e.status.is_terminal()).enumerate().collect();
        terminal.sort_by(|(ia, a), (ib, b)| b.created_at.cmp(&a.created_at).then(ib.cmp(ia)));

        let newest = || terminal.iter().map(|(_, e)| *e);
        Self {
            high_water_mark: newest().find_map(|e| e.high_water_mark.clone()),
            last_sync_queued_at: newest().next().map(|e| e.created_at),
            last_sync_leased_at: newest().find_map(|e| e.leased_at),
            last_sync_completed_at: newest().find_map(|e| e.finished_at),
        }
    }
}

/// Trigger handed to eligibility strategies and jobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncTrigger {
    pub trigger_type: SyncTriggerType,
    pub prior_sync_info: PriorSyncInfo,
}

impl SyncTrigger {
    pub const fn new(trigger_type: SyncTriggerType, prior_sync_info: PriorSyncInfo) -> Self {
        Self { trigger_type, prior_sync_info }
    }
}

/// Outcome of one job invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    pub entity: String,
    pub success: bool,
    pub message: Option<String>,
    pub high_water_mark: Option<String>,
    pub record_count: Option<i64>,
}

impl SyncResult {
    pub fn success(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            success: true,
            message: None,
            high_water_mark: None,
            record_count: None,
        }
    }

    pub fn failure(entity: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            success: false,
            message: Some(message.into()),
            high_water_mark: None,
            record_count: None,
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    #[must_use]
    pub fn with_high_water_mark(mut self, high_water_mark: impl Into<String>) -> Self {
        self.high_water_mark = Some(high_water_mark.into());
        self
    }

    #[must_use]
    pub const fn with_record_count(mut self, record_count: i64) -> Self {
        self.record_count = Some(record_count);
        self
    }
}
