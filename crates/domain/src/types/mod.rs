//! Domain types and models

pub mod entity;
pub mod progress;
pub mod sync;

pub use entity::{canonicalize_parameters, EntityKey, Parameters};
pub use progress::Progress;
pub use sync::{
    AcquireLeaseBehavior, LogEntry, PriorSyncInfo, QueueBehavior, SyncResult, SyncStatus,
    SyncTrigger, SyncTriggerType,
};
