//! `StorageBackend` — the durable, per-origin, structured store the rest
//! of the engine is built on (C1). A backend offers named collections,
//! each keyed by `id`, with reads that never observe partial writes.

use crate::error::Result;
use crate::ids::TenantId;
use crate::types::{PendingMutation, Record, Snapshot, SyncCursor};

/// Row-level filter used by `scan`. `None` fields are unconstrained.
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    pub tenant_id: Option<TenantId>,
    pub include_deleted: bool,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// One named collection the backend persists. Mirrors the four
/// collections in the persisted-state layout: `records`,
/// `pending_mutations`, `sync_cursors`, `snapshots`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Records,
    PendingMutations,
    TerminalFailedMutations,
    SyncCursors,
    Snapshots,
}

impl Collection {
    pub fn table_name(self) -> &'static str {
        match self {
            Collection::Records => "records",
            Collection::PendingMutations => "pending_mutations",
            Collection::TerminalFailedMutations => "terminal_failed_mutations",
            Collection::SyncCursors => "sync_cursors",
            Collection::Snapshots => "snapshots",
        }
    }
}

/// All-or-nothing batch of writes. The closure variant (`transaction`) is
/// the primitive every multi-step write in this crate (Repository puts,
/// mutation-log append+ack) is built from.
pub trait StorageBackend: Send + Sync {
    fn get_record(&self, collection: &str, tenant_id: &TenantId, id: &str) -> Result<Option<Record>>;
    fn put_record(&self, record: &Record) -> Result<()>;
    fn delete_record(&self, collection: &str, tenant_id: &TenantId, id: &str) -> Result<()>;
    fn scan_records(&self, collection: &str, options: &ScanOptions) -> Result<Vec<Record>>;
    fn clear_collection(&self, collection: &str, tenant_id: &TenantId) -> Result<()>;

    fn append_mutation(&self, mutation: &PendingMutation) -> Result<()>;
    fn pending_mutations(&self, tenant_id: &TenantId, limit: Option<usize>) -> Result<Vec<PendingMutation>>;
    fn remove_mutations_up_to(&self, tenant_id: &TenantId, mutation_id: &crate::ids::MutationId) -> Result<()>;
    fn update_mutation(&self, mutation: &PendingMutation) -> Result<()>;
    fn quarantine_mutation(&self, mutation: &PendingMutation, reason: &str) -> Result<()>;
    fn remove_mutation(&self, tenant_id: &TenantId, mutation_id: &crate::ids::MutationId) -> Result<()>;

    fn get_cursor(&self, tenant_id: &TenantId, collection: &str) -> Result<Option<SyncCursor>>;
    fn put_cursor(&self, cursor: &SyncCursor) -> Result<()>;

    fn put_snapshot(&self, snapshot: &Snapshot) -> Result<()>;
    fn get_snapshot(&self, tenant_id: &TenantId, entity_type: &str) -> Result<Option<Snapshot>>;

    /// Run `f` inside a single atomic transaction against the backend.
    /// Nested calls must fail with `SyncCoreError::NestedTransaction`.
    fn transaction(&self, f: &mut dyn FnMut() -> Result<()>) -> Result<()>;
}
