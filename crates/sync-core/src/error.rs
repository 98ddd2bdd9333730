//! Error taxonomy for the sync core.
//!
//! Kinds, not types: every variant below maps onto one of the taxonomy
//! entries in the error handling design (transient transport,
//! authorization/tenant, validation, conflict advisory, storage
//! exhaustion, conflict unresolved). `classify()` is what the push phase
//! and the classifier consult to decide retry vs. quarantine vs. surface.

use crate::ids::{MutationId, RecordId, TenantId};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SyncCoreError>;

#[derive(Debug, Error)]
pub enum SyncCoreError {
    #[error("storage exhausted")]
    StorageExhausted,

    #[error("tenant mismatch: caller tenant {caller} does not own record tenant {owner}")]
    TenantMismatch { caller: TenantId, owner: TenantId },

    #[error("record {0:?} not found")]
    NotFound(RecordId),

    #[error("storage backend error: {0}")]
    Storage(String),

    #[error("nested transactions are not supported")]
    NestedTransaction,

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("transport error (retryable): {0}")]
    TransportRetryable(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("mutation {0:?} exceeded retry policy")]
    RetriesExhausted(MutationId),

    #[error("conflict on record {0:?} could not be resolved automatically")]
    ConflictUnresolved(RecordId),

    #[error("checksum mismatch for snapshot {0}")]
    ChecksumMismatch(String),

    #[error("cursor is lost and must be recovered from a snapshot")]
    CursorLost,

    #[error("rate limit exceeded")]
    RateLimited,
}

/// How a failure should be handled by the push phase / caller.
/// Mirrors §7's error taxonomy classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Exponential backoff, requeue, try again later.
    Retryable,
    /// Never retry automatically; surface and quarantine.
    Permanent,
    /// Authorization/tenant: surfaced immediately, quarantined.
    Authorization,
    /// Push-side conflict advisory: triggers an immediate pull.
    ConflictAdvisory,
    /// Local writes must stop until space is freed.
    StorageExhausted,
}

impl SyncCoreError {
    pub fn classify(&self) -> ErrorClass {
        match self {
            SyncCoreError::StorageExhausted => ErrorClass::StorageExhausted,
            SyncCoreError::TenantMismatch { .. } | SyncCoreError::Unauthorized(_) => {
                ErrorClass::Authorization
            }
            SyncCoreError::Validation(_) => ErrorClass::Permanent,
            SyncCoreError::TransportRetryable(_) => ErrorClass::Retryable,
            SyncCoreError::Transport(_) => ErrorClass::Retryable,
            SyncCoreError::ConflictUnresolved(_) => ErrorClass::Permanent,
            _ => ErrorClass::Permanent,
        }
    }
}
