//! Repository (C2) — the typed read/write surface over the Local Store.
//! Stamps metadata centrally so callers cannot forge `version`,
//! `updated_at`, or `deleted`, and appends exactly one pending mutation
//! per successful write in the same logical transaction.

use std::sync::Arc;

use chrono::Utc;

use crate::error::{Result, SyncCoreError};
use crate::ids::{ClientId, RecordId, TenantId};
use crate::mutation_log::MutationLog;
use crate::storage::{ScanOptions, StorageBackend};
use crate::types::{MutationKind, Record, RecordMetadata};
use crate::vector_clock::VectorClock;

/// A predicate applied to `getAll` results. Ordering beyond `id` ascending
/// is unspecified per spec.md §4.2, matching the Local Store's secondary
/// index behavior.
pub type QueryPredicate = Box<dyn Fn(&Record) -> bool + Send + Sync>;

pub struct Repository<B: StorageBackend> {
    backend: Arc<B>,
    mutation_log: Arc<MutationLog<B>>,
    collection: String,
    tenant_id: TenantId,
    client_id: ClientId,
}

impl<B: StorageBackend> Repository<B> {
    pub fn new(
        backend: Arc<B>,
        mutation_log: Arc<MutationLog<B>>,
        collection: impl Into<String>,
        tenant_id: TenantId,
        client_id: ClientId,
    ) -> Self {
        Self { backend, mutation_log, collection: collection.into(), tenant_id, client_id }
    }

    /// Current local view, including tombstoned records — callers filter
    /// on `metadata.deleted` themselves.
    pub fn get(&self, id: &str) -> Result<Option<Record>> {
        self.backend.get_record(&self.collection, &self.tenant_id, id)
    }

    /// Finite, non-lazy scan of the caller's tenant.
    pub fn get_all(&self, predicate: Option<&QueryPredicate>) -> Result<Vec<Record>> {
        let options = ScanOptions {
            tenant_id: Some(self.tenant_id.clone()),
            include_deleted: true,
            limit: None,
            offset: None,
        };
        let records = self.backend.scan_records(&self.collection, &options)?;
        Ok(match predicate {
            Some(p) => records.into_iter().filter(|r| p(r)).collect(),
            None => records,
        })
    }

    /// Write `payload` under `id`, stamping metadata and appending a
    /// `create`/`update` mutation. Fails with `TenantMismatch` if the
    /// caller's tenant does not own the target record.
    pub fn put(&self, id: impl Into<RecordId>, payload: serde_json::Value) -> Result<Record> {
        let id = id.into();
        let now = Utc::now();
        let existing = self.get(id.as_str())?;

        if let Some(existing) = &existing {
            if existing.tenant_id != self.tenant_id {
                return Err(SyncCoreError::TenantMismatch {
                    caller: self.tenant_id.clone(),
                    owner: existing.tenant_id.clone(),
                });
            }
        }

        let (created_at, prev_version, kind, vector_clock) = match &existing {
            Some(r) => (
                r.metadata.created_at,
                r.metadata.version,
                MutationKind::Update,
                VectorClock::new(),
            ),
            None => (now, 0, MutationKind::Create, VectorClock::new()),
        };
        let last_synced_at = existing.and_then(|r| r.metadata.last_synced_at);

        // Mutation append and record write land in the same backend
        // transaction — a crash between the two must never leave a
        // pending mutation with no corresponding record, or vice versa.
        let mut record = None;
        self.backend.transaction(&mut || {
            let mutation = self.mutation_log.append(
                self.tenant_id.clone(),
                kind,
                self.collection.clone(),
                id.clone(),
                payload.clone(),
                vector_clock.incremented(&self.client_id),
            )?;

            let built = Record {
                id: id.clone(),
                tenant_id: self.tenant_id.clone(),
                collection: self.collection.clone(),
                payload: payload.clone(),
                metadata: RecordMetadata {
                    created_at,
                    updated_at: now,
                    version: prev_version + 1,
                    deleted: false,
                    last_synced_at,
                    pending_mutation_id: Some(mutation.mutation_id),
                },
            };
            self.backend.put_record(&built)?;
            record = Some(built);
            Ok(())
        })?;

        Ok(record.expect("transaction closure ran and either populated record or returned Err"))
    }

    /// Soft delete: rewrite with `deleted=true` and append a `delete`
    /// mutation. Tombstones remain present until a successful sync
    /// confirms propagation.
    pub fn delete(&self, id: &str) -> Result<Option<Record>> {
        let Some(existing) = self.get(id)? else {
            return Ok(None);
        };
        if existing.tenant_id != self.tenant_id {
            return Err(SyncCoreError::TenantMismatch {
                caller: self.tenant_id.clone(),
                owner: existing.tenant_id.clone(),
            });
        }

        let now = Utc::now();
        let mut record = None;
        self.backend.transaction(&mut || {
            let mutation = self.mutation_log.append(
                self.tenant_id.clone(),
                MutationKind::Delete,
                self.collection.clone(),
                existing.id.clone(),
                existing.payload.clone(),
                VectorClock::new().incremented(&self.client_id),
            )?;

            let built = Record {
                metadata: RecordMetadata {
                    updated_at: now,
                    version: existing.metadata.version + 1,
                    deleted: true,
                    pending_mutation_id: Some(mutation.mutation_id),
                    ..existing.metadata.clone()
                },
                ..existing.clone()
            };
            self.backend.put_record(&built)?;
            record = Some(built);
            Ok(())
        })?;
        Ok(record)
    }

    /// Administrative: destroys all records and mutations for this
    /// collection in the caller's tenant. Never cross-tenant.
    pub fn clear(&self) -> Result<()> {
        self.backend.clear_collection(&self.collection, &self.tenant_id)
    }

    /// Write-through path used exclusively by the Sync Engine (C5) when
    /// applying a server-originated change: stamps metadata but does
    /// **not** append a pending mutation, since the change already
    /// originated from the server.
    pub(crate) fn apply_server_change(&self, id: RecordId, payload: serde_json::Value, version: u64, updated_at: chrono::DateTime<Utc>, deleted: bool) -> Result<Record> {
        let existing = self.get(id.as_str())?;
        let created_at = existing.as_ref().map(|r| r.metadata.created_at).unwrap_or(updated_at);
        let record = Record {
            id,
            tenant_id: self.tenant_id.clone(),
            collection: self.collection.clone(),
            payload,
            metadata: RecordMetadata {
                created_at,
                updated_at,
                version,
                deleted,
                last_synced_at: Some(Utc::now()),
                pending_mutation_id: None,
            },
        };
        self.backend.put_record(&record)?;
        Ok(record)
    }

    /// Clear the pending-mutation marker and stamp the server-assigned
    /// version once a push has been acknowledged. A no-op if the record has
    /// since moved on to a different pending mutation (a newer local write
    /// raced the ack) — that newer mutation still owns the pending slot.
    pub(crate) fn mark_pushed(&self, id: &RecordId, mutation_id: &crate::ids::MutationId, server_version: u64) -> Result<()> {
        let Some(existing) = self.get(id.as_str())? else {
            return Ok(());
        };
        if existing.metadata.pending_mutation_id.as_ref() != Some(mutation_id) {
            return Ok(());
        }
        let record = Record {
            metadata: RecordMetadata {
                version: server_version.max(existing.metadata.version),
                last_synced_at: Some(Utc::now()),
                pending_mutation_id: None,
                ..existing.metadata
            },
            ..existing
        };
        self.backend.put_record(&record)?;
        Ok(())
    }

    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }
}
