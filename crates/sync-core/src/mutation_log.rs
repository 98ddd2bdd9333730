//! Mutation Log (C3) — a strictly append-ordered queue of pending
//! mutations per tenant, with retry bookkeeping and a quarantine
//! sub-queue for non-retryable failures.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;

use crate::error::Result;
use crate::ids::{MutationId, TenantId};
use crate::storage::StorageBackend;
use crate::types::{MutationKind, PendingMutation};
use crate::vector_clock::VectorClock;

pub struct MutationLog<B: StorageBackend> {
    backend: Arc<B>,
    next_sequence: AtomicU64,
}

impl<B: StorageBackend> MutationLog<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend, next_sequence: AtomicU64::new(0) }
    }

    /// Resume the sequence counter from the highest sequence across all of
    /// `tenants`' pending queues. Call this once at startup with the full
    /// tenant set the process will serve, before appending anything new —
    /// otherwise a restart could reassign a sequence already in use.
    pub fn resume_sequence_from(&self, tenants: &[TenantId]) -> Result<()> {
        let mut max_seq = 0u64;
        for tenant in tenants {
            for mutation in self.backend.pending_mutations(tenant, None)? {
                max_seq = max_seq.max(mutation.sequence + 1);
            }
        }
        self.next_sequence.fetch_max(max_seq, Ordering::SeqCst);
        Ok(())
    }

    /// Append a new mutation to the tail of the tenant's queue. The
    /// returned mutation carries the sequence number the push phase must
    /// respect (local-append order).
    pub fn append(
        &self,
        tenant_id: TenantId,
        kind: MutationKind,
        collection: impl Into<String>,
        record_id: crate::ids::RecordId,
        payload: serde_json::Value,
        vector_clock: VectorClock,
    ) -> Result<PendingMutation> {
        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        let mutation = PendingMutation {
            mutation_id: MutationId::generate(),
            tenant_id,
            kind,
            collection: collection.into(),
            record_id,
            payload,
            timestamp: Utc::now(),
            retry_count: 0,
            last_error: None,
            vector_clock,
            sequence,
        };
        self.backend.append_mutation(&mutation)?;
        Ok(mutation)
    }

    /// Return up to `n` mutations, oldest first (local-append order).
    pub fn peek_batch(&self, tenant_id: &TenantId, n: usize) -> Result<Vec<PendingMutation>> {
        self.backend.pending_mutations(tenant_id, Some(n))
    }

    pub fn all(&self, tenant_id: &TenantId) -> Result<Vec<PendingMutation>> {
        self.backend.pending_mutations(tenant_id, None)
    }

    /// Remove the contiguous prefix of the queue up to and including
    /// `mutation_id` — the server has acknowledged durable acceptance.
    pub fn ack_up_to(&self, tenant_id: &TenantId, mutation_id: &MutationId) -> Result<()> {
        self.backend.remove_mutations_up_to(tenant_id, mutation_id)
    }

    /// Remove a single mutation (used when resolution subsumes it without
    /// acknowledging everything ahead of it).
    pub fn remove(&self, tenant_id: &TenantId, mutation_id: &MutationId) -> Result<()> {
        self.backend.remove_mutation(tenant_id, mutation_id)
    }

    /// Increment `retry_count`, record `last_error`, and keep position —
    /// the mutation is retried on the next push pass.
    pub fn requeue(&self, mutation: &PendingMutation, error: impl Into<String>) -> Result<PendingMutation> {
        let mut updated = mutation.clone();
        updated.retry_count += 1;
        updated.last_error = Some(error.into());
        self.backend.update_mutation(&updated)?;
        Ok(updated)
    }

    /// Move a mutation to the terminal-failed sub-queue. Never silently
    /// dropped — it stays discoverable for operator retry.
    pub fn quarantine(&self, mutation: &PendingMutation, reason: impl Into<String>) -> Result<()> {
        let reason = reason.into();
        tracing::warn!(
            tenant_id = ?mutation.tenant_id,
            mutation_id = ?mutation.mutation_id,
            record_id = ?mutation.record_id,
            %reason,
            "mutation moved to terminal-failed queue"
        );
        self.backend.quarantine_mutation(mutation, &reason)
    }

    /// Re-append a mutation against reconciled local state after a
    /// conflict-advisory push failure. Per spec.md §7, this uses a fresh
    /// `mutationId`, not the original one.
    pub fn rebuild_after_conflict(
        &self,
        original: &PendingMutation,
        payload: serde_json::Value,
        vector_clock: VectorClock,
    ) -> Result<PendingMutation> {
        self.append(
            original.tenant_id.clone(),
            original.kind,
            original.collection.clone(),
            original.record_id.clone(),
            payload,
            vector_clock,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteBackend;

    fn log() -> MutationLog<SqliteBackend> {
        MutationLog::new(Arc::new(SqliteBackend::open_in_memory().unwrap()))
    }

    #[test]
    fn append_and_peek_preserves_order() {
        let log = log();
        let tenant: TenantId = "t1".into();
        for i in 0..3 {
            log.append(
                tenant.clone(),
                MutationKind::Create,
                "docs",
                format!("d{i}").as_str().into(),
                serde_json::json!({}),
                VectorClock::new(),
            )
            .unwrap();
        }
        let batch = log.peek_batch(&tenant, 10).unwrap();
        assert_eq!(batch.len(), 3);
        assert!(batch[0].sequence < batch[1].sequence);
        assert!(batch[1].sequence < batch[2].sequence);
    }

    #[test]
    fn ack_up_to_removes_contiguous_prefix() {
        let log = log();
        let tenant: TenantId = "t1".into();
        let mut ids = vec![];
        for i in 0..3 {
            let m = log
                .append(
                    tenant.clone(),
                    MutationKind::Create,
                    "docs",
                    format!("d{i}").as_str().into(),
                    serde_json::json!({}),
                    VectorClock::new(),
                )
                .unwrap();
            ids.push(m.mutation_id);
        }
        log.ack_up_to(&tenant, &ids[1]).unwrap();
        let remaining = log.all(&tenant).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].mutation_id, ids[2]);
    }

    #[test]
    fn requeue_increments_retry_count() {
        let log = log();
        let tenant: TenantId = "t1".into();
        let m = log
            .append(tenant, MutationKind::Update, "docs", "d1".into(), serde_json::json!({}), VectorClock::new())
            .unwrap();
        let requeued = log.requeue(&m, "timeout").unwrap();
        assert_eq!(requeued.retry_count, 1);
        assert_eq!(requeued.last_error.as_deref(), Some("timeout"));
    }

    #[test]
    fn quarantine_removes_from_live_queue() {
        let log = log();
        let tenant: TenantId = "t1".into();
        let m = log
            .append(tenant.clone(), MutationKind::Update, "docs", "d1".into(), serde_json::json!({}), VectorClock::new())
            .unwrap();
        log.quarantine(&m, "permanent validation failure").unwrap();
        assert!(log.all(&tenant).unwrap().is_empty());
    }
}
