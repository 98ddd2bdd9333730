//! Core data model: `Record`, `PendingMutation`, `SyncCursor`, `Snapshot`,
//! and `InteractionClass`, exactly as specified — every record is scoped
//! by `tenant_id`, `version` is monotonic per `(tenant, id)`, and
//! `updated_at` never decreases for a given `(tenant, id)`.

use crate::ids::{MutationId, RecordId, TenantId};
use crate::vector_clock::VectorClock;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// System-managed metadata block stamped exclusively by the Repository (C2).
/// Callers cannot forge `version`, `updated_at`, or `deleted`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
    pub deleted: bool,
    pub last_synced_at: Option<DateTime<Utc>>,
    /// `mutationId` of the local mutation that produced this version, if
    /// any is still pending — lets the pull phase's conflict rule drop the
    /// mutation it subsumes without scanning the whole log by value.
    pub pending_mutation_id: Option<MutationId>,
}

impl RecordMetadata {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            created_at: now,
            updated_at: now,
            version: 1,
            deleted: false,
            last_synced_at: None,
            pending_mutation_id: None,
        }
    }
}

/// A generic domain object. `payload` is opaque to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub tenant_id: TenantId,
    pub collection: String,
    pub payload: serde_json::Value,
    pub metadata: RecordMetadata,
}

impl Record {
    pub fn is_tombstone(&self) -> bool {
        self.metadata.deleted
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    Create,
    Update,
    Delete,
}

/// A locally captured intent to change a record, durably queued until the
/// server acknowledges it. Strictly ordered by local append order within
/// `(tenant_id, collection, record_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingMutation {
    pub mutation_id: MutationId,
    pub tenant_id: TenantId,
    pub kind: MutationKind,
    pub collection: String,
    pub record_id: RecordId,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub retry_count: u32,
    pub last_error: Option<String>,
    pub vector_clock: VectorClock,
    /// Monotonic local append order, used to enforce the causal push order
    /// (Testable Property 4) independent of wall-clock timestamps.
    pub sequence: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncStatus {
    Idle,
    Success,
    Error,
    InProgress,
}

/// One per `(tenant, collection)`. `last_pulled_at` never regresses and is
/// never advanced past an unresolved conflict's origin timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncCursor {
    pub tenant_id: TenantId,
    pub collection: String,
    pub last_pulled_at: Option<DateTime<Utc>>,
    pub last_pushed_mutation_id: Option<MutationId>,
    pub last_status: SyncStatus,
    pub last_error: Option<String>,
}

impl SyncCursor {
    pub fn new(tenant_id: TenantId, collection: impl Into<String>) -> Self {
        Self {
            tenant_id,
            collection: collection.into(),
            last_pulled_at: None,
            last_pushed_mutation_id: None,
            last_status: SyncStatus::Idle,
            last_error: None,
        }
    }
}

/// Authoritative full state for an entity type, used when delta
/// replication is infeasible (cursor lost, large divergence, migration).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub snapshot_id: String,
    pub tenant_id: TenantId,
    pub entity_type: String,
    pub version: u64,
    pub payload: Vec<Record>,
    pub created_at: DateTime<Utc>,
    pub checksum: String,
}

/// The delivery/durability contract attached to every operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InteractionClass {
    /// Presence-grade: best-effort, no durability, dropped on unavailability.
    A,
    /// Event-streaming: at-least-once; falls back to durable queue + polling.
    B,
    /// Low-latency interactive: realtime preferred, falls back to C5.
    C,
    /// Critical transactional: never uses the realtime path.
    D,
}

impl InteractionClass {
    /// Class D must never be transmitted via the realtime channel
    /// (Testable Property 7).
    pub fn allows_realtime(self) -> bool {
        !matches!(self, InteractionClass::D)
    }
}
