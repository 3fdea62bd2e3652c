//! Error types used throughout Tidemark
//!
//! Variants line up with the failure categories the orchestrator reports:
//! contention and ineligibility are not errors at all (they surface as
//! `Ok(None)`), job failures are captured in a [`crate::SyncResult`], and
//! everything below is either an infrastructure or a configuration problem.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for Tidemark
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum TidemarkError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A log entry was resumed with options describing a different entity key.
    #[error("Entity key mismatch: {0}")]
    KeyMismatch(String),

    /// No job implementation is registered under the entity's sync id.
    #[error("No sync job registered for '{0}'")]
    JobNotRegistered(String),

    /// The stored entry moved on (finished or re-leased) since the writer
    /// obtained its copy.
    #[error("Lease lost: {0}")]
    LeaseLost(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TidemarkError {
    /// True for errors caused by how entities and jobs are wired together.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Config(_) | Self::KeyMismatch(_) | Self::JobNotRegistered(_))
    }

    /// True for errors raised by the persistence layer or the runtime.
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            Self::Database(_) | Self::LeaseLost(_) | Self::Internal(_) | Self::Cancelled
        )
    }
}

/// Result type alias for Tidemark operations
pub type Result<T> = std::result::Result<T, TidemarkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(TidemarkError::JobNotRegistered("orders".into()).is_configuration());
        assert!(TidemarkError::KeyMismatch("orders".into()).is_configuration());
        assert!(!TidemarkError::Database("locked".into()).is_configuration());

        assert!(TidemarkError::Database("locked".into()).is_infrastructure());
        assert!(TidemarkError::Cancelled.is_infrastructure());
        assert!(TidemarkError::LeaseLost("entry 3".into()).is_infrastructure());
        assert!(!TidemarkError::NotFound("42".into()).is_infrastructure());
    }

    #[test]
    fn test_error_serializes_tagged() {
        let json = serde_json::to_value(TidemarkError::NotFound("entry 7".into())).unwrap();
        assert_eq!(json["type"], "NotFound");
        assert_eq!(json["message"], "entry 7");
    }

    #[test]
    fn test_display_messages() {
        assert_eq!(
            TidemarkError::JobNotRegistered("orders".into()).to_string(),
            "No sync job registered for 'orders'"
        );
        assert_eq!(TidemarkError::Cancelled.to_string(), "Operation cancelled");
    }
}
