//! Error types for Synheart Sync

use thiserror::Error;

use crate::schema::{RecordKind, ValidationError};
use crate::types::Resource;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors that can occur during a sync attempt
#[derive(Debug, Error)]
pub enum SyncError {
    /// Read permission for a record kind was never granted.
    ///
    /// The reader and aggregator degrade this to an empty result; it never
    /// fails a sync attempt on its own.
    #[error("Read permission not granted for {kind}")]
    PermissionDenied { kind: RecordKind },

    #[error("Invalid resource state: {0}")]
    InvalidResourceState(String),

    #[error("No change token has been persisted yet")]
    MissingChangeToken,

    #[error("Failed to read {kind} records: {message}")]
    Read { kind: RecordKind, message: String },

    #[error("Aggregation query failed: {0}")]
    Aggregate(String),

    #[error("Failed to upload {resource}: {message}")]
    Upload { resource: Resource, message: String },

    #[error("Change feed error: {0}")]
    ChangeFeed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid record: {0}")]
    Validation(#[from] ValidationError),
}

impl SyncError {
    /// Whether retrying the whole attempt from the last persisted cursor can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::Read { .. }
                | SyncError::Aggregate(_)
                | SyncError::Upload { .. }
                | SyncError::ChangeFeed(_)
                | SyncError::Io(_)
        )
    }

    /// Programming or state errors that must abort without retry.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidResourceState(_) | SyncError::MissingChangeToken
        )
    }
}

impl From<figment::Error> for SyncError {
    fn from(e: figment::Error) -> Self {
        SyncError::Config(Box::new(e))
    }
}
