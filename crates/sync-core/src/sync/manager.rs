//! Sync Engine (C5) — drives the push/pull replication loop against a
//! `SyncTransport`, applies the conflict rule, and advances cursors.
//! Named and shaped after this lineage's `SyncManager`/`SyncScheduler`
//! split: the manager owns one sync pass; the scheduler (in `scheduler.rs`)
//! owns when a pass is triggered.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex as SyncMutex;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::error::{Result, SyncCoreError};
use crate::ids::{ClientId, RecordId, TenantId};
use crate::mutation_log::MutationLog;
use crate::repository::Repository;
use crate::resolver::{resolve, ConflictInput, ConflictSide, ResolveOutcome};
use crate::deferred::DeferredConflict;
use crate::deferred::DeferredConflictRegistry;
use crate::storage::StorageBackend;
use crate::types::{Record, Snapshot, SyncCursor, SyncStatus};

use super::transport::{PushFailureKind, PushRequest, SyncTransport};
use super::types::{
    EngineConfig, RemoteDeleteCallback, RemoteDeleteEvent, SyncErrorCallback, SyncErrorEvent,
    SyncErrorKind, SyncProgress, SyncProgressCallback,
};

#[derive(Default)]
struct PushOutcome {
    pushed: usize,
}

#[derive(Default)]
struct PullOutcome {
    pulled: usize,
    conflicts_resolved: usize,
    conflicts_deferred: usize,
}

/// Per-tenant single-flight state: a second caller arriving while a pass is
/// in flight sets `coalesced_pending` and waits on the lock rather than
/// starting a redundant pass of its own; the in-flight owner checks the
/// flag after each pass and runs once more if it was set.
struct TenantGuard {
    lock: AsyncMutex<()>,
    coalesced_pending: AtomicBool,
}

impl TenantGuard {
    fn new() -> Self {
        Self { lock: AsyncMutex::new(()), coalesced_pending: AtomicBool::new(false) }
    }
}

pub struct SyncManager<B: StorageBackend, T: SyncTransport> {
    backend: Arc<B>,
    mutation_log: Arc<MutationLog<B>>,
    transport: Arc<T>,
    client_id: ClientId,
    config: EngineConfig,
    deferred: Arc<DeferredConflictRegistry>,
    guards: SyncMutex<HashMap<TenantId, Arc<TenantGuard>>>,
    on_error: Option<Arc<dyn SyncErrorCallback>>,
    on_progress: Option<Arc<dyn SyncProgressCallback>>,
    on_remote_delete: Option<Arc<dyn RemoteDeleteCallback>>,
}

impl<B: StorageBackend, T: SyncTransport> SyncManager<B, T> {
    pub fn new(
        backend: Arc<B>,
        mutation_log: Arc<MutationLog<B>>,
        transport: Arc<T>,
        client_id: ClientId,
        config: EngineConfig,
    ) -> Self {
        Self {
            backend,
            mutation_log,
            transport,
            client_id,
            config,
            deferred: Arc::new(DeferredConflictRegistry::new()),
            guards: SyncMutex::new(HashMap::new()),
            on_error: None,
            on_progress: None,
            on_remote_delete: None,
        }
    }

    pub fn on_error(mut self, cb: impl SyncErrorCallback + 'static) -> Self {
        self.on_error = Some(Arc::new(cb));
        self
    }

    pub fn on_progress(mut self, cb: impl SyncProgressCallback + 'static) -> Self {
        self.on_progress = Some(Arc::new(cb));
        self
    }

    pub fn on_remote_delete(mut self, cb: impl RemoteDeleteCallback + 'static) -> Self {
        self.on_remote_delete = Some(Arc::new(cb));
        self
    }

    fn repository(&self, tenant_id: TenantId, collection: &str) -> Repository<B> {
        Repository::new(
            self.backend.clone(),
            self.mutation_log.clone(),
            collection.to_string(),
            tenant_id,
            self.client_id.clone(),
        )
    }

    fn guard_for(&self, tenant_id: &TenantId) -> Arc<TenantGuard> {
        self.guards
            .lock()
            .entry(tenant_id.clone())
            .or_insert_with(|| Arc::new(TenantGuard::new()))
            .clone()
    }

    fn emit_error(&self, event: SyncErrorEvent) {
        if let Some(cb) = &self.on_error {
            cb(&event);
        }
    }

    fn emit_remote_delete(&self, tenant_id: &TenantId, collection: &str, record_id: &RecordId) {
        if let Some(cb) = &self.on_remote_delete {
            cb(&RemoteDeleteEvent {
                tenant_id: tenant_id.clone(),
                collection: collection.to_string(),
                record_id: record_id.clone(),
            });
        }
    }

    pub fn pending_conflicts(&self, tenant_id: &TenantId) -> Vec<Arc<DeferredConflict>> {
        self.deferred.pending(tenant_id)
    }

    /// Apply a manually-supplied resolution for a conflict the resolver
    /// previously deferred. Writes `payload` as the new record content and
    /// clears the deferred entry; does not touch the oneshot resume handle
    /// the original caller of `defer` may still be holding.
    pub fn resolve_manual_conflict(
        &self,
        tenant_id: &TenantId,
        collection: &str,
        record_id: &RecordId,
        payload: serde_json::Value,
    ) -> Result<()> {
        let repo = self.repository(tenant_id.clone(), collection);
        let existing = repo.get(record_id.as_str())?;
        let next_version = existing.map(|r| r.metadata.version).unwrap_or(0) + 1;
        repo.apply_server_change(record_id.clone(), payload, next_version, Utc::now(), false)?;
        self.deferred.remove(tenant_id, collection, record_id);
        Ok(())
    }

    /// Run one coalesced sync pass (push then pull) for `(tenant_id,
    /// collection)`. A caller that arrives while a pass is already running
    /// does not start a second one; it waits for the in-flight pass and
    /// receives a `coalesced` progress report instead.
    pub async fn sync(&self, tenant_id: TenantId, collection: String) -> Result<SyncProgress> {
        let guard = self.guard_for(&tenant_id);
        let _permit = match guard.lock.try_lock() {
            Ok(permit) => permit,
            Err(_) => {
                guard.coalesced_pending.store(true, Ordering::SeqCst);
                let _wait_for_owner = guard.lock.lock().await;
                return Ok(SyncProgress::coalesced(tenant_id, collection));
            }
        };

        let mut total = SyncProgress {
            tenant_id: tenant_id.clone(),
            collection: collection.clone(),
            pushed: 0,
            pulled: 0,
            conflicts_resolved: 0,
            conflicts_deferred: 0,
            coalesced: false,
        };

        loop {
            guard.coalesced_pending.store(false, Ordering::SeqCst);

            let push_outcome = self.push_phase(&tenant_id, &collection).await?;
            total.pushed += push_outcome.pushed;

            let pull_outcome = self.pull_phase(&tenant_id, &collection).await?;
            total.pulled += pull_outcome.pulled;
            total.conflicts_resolved += pull_outcome.conflicts_resolved;
            total.conflicts_deferred += pull_outcome.conflicts_deferred;

            if let Some(cb) = &self.on_progress {
                cb(&total);
            }

            if !guard.coalesced_pending.load(Ordering::SeqCst) {
                break;
            }
        }

        info!(
            ?tenant_id,
            %collection,
            pushed = total.pushed,
            pulled = total.pulled,
            conflicts_resolved = total.conflicts_resolved,
            conflicts_deferred = total.conflicts_deferred,
            "sync pass complete"
        );

        Ok(total)
    }

    /// Drain up to `push_batch_size` pending mutations. A retryable
    /// failure stops further pushes for *that record* only — mutations
    /// against unrelated records in the same batch still proceed, since
    /// they carry no causal dependency on it. A conflict-advisory failure
    /// stops the whole batch to preserve push ordering while the engine
    /// pulls and reconciles.
    async fn push_phase(&self, tenant_id: &TenantId, collection: &str) -> Result<PushOutcome> {
        let batch: Vec<_> = self
            .mutation_log
            .peek_batch(tenant_id, self.config.push_batch_size)?
            .into_iter()
            .filter(|m| m.collection == collection)
            .collect();

        let mut outcome = PushOutcome::default();
        let mut blocked_records: HashSet<RecordId> = HashSet::new();

        for mutation in &batch {
            if blocked_records.contains(&mutation.record_id) {
                continue;
            }

            let request = PushRequest {
                mutation_id: mutation.mutation_id.clone(),
                tenant_id: tenant_id.clone(),
                kind: mutation.kind,
                collection: mutation.collection.clone(),
                record_id: mutation.record_id.clone(),
                payload: mutation.payload.clone(),
            };

            match self.transport.push(tenant_id, &request).await {
                Ok(ack) => {
                    self.mutation_log.ack_up_to(tenant_id, &ack.mutation_id)?;
                    let repo = self.repository(tenant_id.clone(), collection);
                    repo.mark_pushed(&mutation.record_id, &mutation.mutation_id, ack.server_version)?;
                    outcome.pushed += 1;
                }
                Err(failure) => match failure.kind {
                    PushFailureKind::Retryable => {
                        if mutation.retry_count + 1 > self.config.max_retries {
                            warn!(
                                ?tenant_id,
                                mutation_id = ?mutation.mutation_id,
                                record_id = ?mutation.record_id,
                                retry_count = mutation.retry_count,
                                "quarantining mutation after exhausting retries"
                            );
                            self.mutation_log.quarantine(mutation, failure.message.clone())?;
                            self.emit_error(SyncErrorEvent {
                                tenant_id: tenant_id.clone(),
                                mutation_id: Some(mutation.mutation_id.clone()),
                                record_id: Some(mutation.record_id.clone()),
                                kind: SyncErrorKind::Transient,
                                message: format!("retries exhausted: {}", failure.message),
                                occurred_at: Utc::now(),
                            });
                        } else {
                            self.mutation_log.requeue(mutation, failure.message)?;
                            blocked_records.insert(mutation.record_id.clone());
                        }
                    }
                    PushFailureKind::Permanent => {
                        warn!(
                            ?tenant_id,
                            mutation_id = ?mutation.mutation_id,
                            record_id = ?mutation.record_id,
                            "quarantining mutation: permanent push failure"
                        );
                        self.mutation_log.quarantine(mutation, failure.message.clone())?;
                        self.emit_error(SyncErrorEvent {
                            tenant_id: tenant_id.clone(),
                            mutation_id: Some(mutation.mutation_id.clone()),
                            record_id: Some(mutation.record_id.clone()),
                            kind: SyncErrorKind::Validation,
                            message: failure.message,
                            occurred_at: Utc::now(),
                        });
                    }
                    PushFailureKind::Authorization => {
                        warn!(
                            ?tenant_id,
                            mutation_id = ?mutation.mutation_id,
                            record_id = ?mutation.record_id,
                            "quarantining mutation: authorization refusal"
                        );
                        self.mutation_log.quarantine(mutation, failure.message.clone())?;
                        self.emit_error(SyncErrorEvent {
                            tenant_id: tenant_id.clone(),
                            mutation_id: Some(mutation.mutation_id.clone()),
                            record_id: Some(mutation.record_id.clone()),
                            kind: SyncErrorKind::Authorization,
                            message: failure.message,
                            occurred_at: Utc::now(),
                        });
                    }
                    PushFailureKind::Conflict => {
                        debug!(?tenant_id, mutation_id = ?mutation.mutation_id, "push conflict advisory, pulling before retry");
                        self.emit_error(SyncErrorEvent {
                            tenant_id: tenant_id.clone(),
                            mutation_id: Some(mutation.mutation_id.clone()),
                            record_id: Some(mutation.record_id.clone()),
                            kind: SyncErrorKind::ConflictAdvisory,
                            message: failure.message,
                            occurred_at: Utc::now(),
                        });
                        // Pull first to reconcile server state, then rebuild
                        // the mutation against whatever the pull left behind
                        // under a fresh mutation id, and stop the batch —
                        // pushes after this one assumed this one had landed.
                        self.pull_phase(tenant_id, collection).await?;
                        let repo = self.repository(tenant_id.clone(), collection);
                        if let Some(current) = repo.get(mutation.record_id.as_str())? {
                            self.mutation_log.rebuild_after_conflict(
                                mutation,
                                current.payload.clone(),
                                mutation.vector_clock.clone(),
                            )?;
                        }
                        self.mutation_log.remove(tenant_id, &mutation.mutation_id)?;
                        return Ok(outcome);
                    }
                },
            }
        }

        debug!(?tenant_id, %collection, pushed = outcome.pushed, "push phase complete");
        Ok(outcome)
    }

    /// Pull remote changes since the tenant/collection cursor and apply the
    /// conflict rule (§4.5): no local record → write through; a clean
    /// version delta → fast-forward; otherwise consult the resolver.
    async fn pull_phase(&self, tenant_id: &TenantId, collection: &str) -> Result<PullOutcome> {
        let repo = self.repository(tenant_id.clone(), collection);
        let cursor = self
            .backend
            .get_cursor(tenant_id, collection)?
            .unwrap_or_else(|| SyncCursor::new(tenant_id.clone(), collection.to_string()));

        let pull_result = match self.transport.pull(tenant_id, collection, cursor.last_pulled_at).await {
            Ok(r) => r,
            Err(failure) => {
                self.emit_error(SyncErrorEvent {
                    tenant_id: tenant_id.clone(),
                    mutation_id: None,
                    record_id: None,
                    kind: kind_for_transport_failure(failure.kind),
                    message: failure.message,
                    occurred_at: Utc::now(),
                });
                return Ok(PullOutcome::default());
            }
        };

        if pull_result.cursor_lost {
            warn!(?tenant_id, %collection, "cursor lost, falling back to snapshot recovery");
            return self.snapshot_fallback(tenant_id, collection).await;
        }

        let mut outcome = PullOutcome::default();
        let mut min_deferred_at: Option<DateTime<Utc>> = None;

        for remote in &pull_result.changes {
            let local = repo.get(remote.id.as_str())?;

            match local {
                None => {
                    repo.apply_server_change(remote.id.clone(), remote.payload.clone(), remote.version, remote.updated_at, remote.deleted)?;
                    outcome.pulled += 1;
                    if remote.deleted {
                        self.emit_remote_delete(tenant_id, collection, &remote.id);
                    }
                }
                Some(local_record) => {
                    if local_record.metadata.version >= remote.version {
                        // Already applied, or locally ahead — at-most-once.
                        continue;
                    }

                    let clean_fast_forward = local_record.metadata.pending_mutation_id.is_none()
                        && local_record.metadata.version + 1 == remote.version;

                    if clean_fast_forward {
                        repo.apply_server_change(remote.id.clone(), remote.payload.clone(), remote.version, remote.updated_at, remote.deleted)?;
                        outcome.pulled += 1;
                        if remote.deleted {
                            self.emit_remote_delete(tenant_id, collection, &remote.id);
                        }
                        continue;
                    }

                    let input = ConflictInput {
                        record_id: remote.id.clone(),
                        local: ConflictSide {
                            payload: local_record.payload.clone(),
                            updated_at: local_record.metadata.updated_at,
                            client_id: self.client_id.clone(),
                            field_timestamps: None,
                        },
                        incoming: ConflictSide {
                            payload: remote.payload.clone(),
                            updated_at: remote.updated_at,
                            client_id: "server".into(),
                            field_timestamps: None,
                        },
                    };

                    match resolve(&self.config.default_resolver_strategy, &input) {
                        ResolveOutcome::Resolved(resolved) => {
                            let next_version = local_record.metadata.version.max(remote.version) + 1;
                            repo.apply_server_change(remote.id.clone(), resolved.payload, next_version, Utc::now(), remote.deleted)?;
                            if !resolved.kept_local_mutation {
                                if let Some(pending_id) = &local_record.metadata.pending_mutation_id {
                                    self.mutation_log.remove(tenant_id, pending_id)?;
                                }
                            }
                            outcome.conflicts_resolved += 1;
                        }
                        ResolveOutcome::Deferred => {
                            self.deferred.defer(tenant_id.clone(), collection.to_string(), remote.id.clone(), input);
                            outcome.conflicts_deferred += 1;
                            min_deferred_at = Some(match min_deferred_at {
                                Some(t) => t.min(remote.updated_at),
                                None => remote.updated_at,
                            });
                            warn!(
                                ?tenant_id,
                                %collection,
                                record_id = ?remote.id,
                                "conflict deferred for manual resolution"
                            );
                            self.emit_error(SyncErrorEvent {
                                tenant_id: tenant_id.clone(),
                                mutation_id: None,
                                record_id: Some(remote.id.clone()),
                                kind: SyncErrorKind::ConflictUnresolved,
                                message: "conflict deferred for manual resolution".to_string(),
                                occurred_at: Utc::now(),
                            });
                        }
                    }
                }
            }
        }

        // Never advance the cursor past an unresolved conflict's origin
        // timestamp — a later pull must see that record again.
        let mut next_cursor = cursor;
        next_cursor.last_pulled_at = Some(min_deferred_at.unwrap_or(pull_result.server_timestamp));
        next_cursor.last_status = if outcome.conflicts_deferred > 0 { SyncStatus::InProgress } else { SyncStatus::Success };
        next_cursor.last_error = None;
        self.backend.put_cursor(&next_cursor)?;

        debug!(
            ?tenant_id,
            %collection,
            pulled = outcome.pulled,
            conflicts_resolved = outcome.conflicts_resolved,
            conflicts_deferred = outcome.conflicts_deferred,
            "pull phase complete"
        );
        Ok(outcome)
    }

    /// Cursor-lost recovery: fetch the full authoritative snapshot, verify
    /// its checksum, and replace local state for the collection wholesale.
    async fn snapshot_fallback(&self, tenant_id: &TenantId, collection: &str) -> Result<PullOutcome> {
        let response = self
            .transport
            .snapshot(tenant_id, collection)
            .await
            .map_err(|failure| SyncCoreError::Transport(failure.message))?;

        let computed = checksum_of(&response.data);
        if computed != response.checksum {
            return Err(SyncCoreError::ChecksumMismatch(response.snapshot_id));
        }

        let repo = self.repository(tenant_id.clone(), collection);
        repo.clear()?;

        let mut records = Vec::with_capacity(response.data.len());
        for remote in &response.data {
            let record = repo.apply_server_change(remote.id.clone(), remote.payload.clone(), remote.version, remote.updated_at, remote.deleted)?;
            records.push(record);
        }

        let mut cursor = SyncCursor::new(tenant_id.clone(), collection.to_string());
        cursor.last_pulled_at = Some(Utc::now());
        cursor.last_status = SyncStatus::Success;
        self.backend.put_cursor(&cursor)?;

        let snapshot_id = response.snapshot_id.clone();
        let record_count = records.len();
        self.backend.put_snapshot(&Snapshot {
            snapshot_id: response.snapshot_id,
            tenant_id: tenant_id.clone(),
            entity_type: collection.to_string(),
            version: response.version,
            payload: records,
            created_at: Utc::now(),
            checksum: response.checksum,
        })?;

        info!(
            ?tenant_id,
            %collection,
            %snapshot_id,
            records = record_count,
            "replaced local state from verified snapshot"
        );
        Ok(PullOutcome { pulled: record_count, conflicts_resolved: 0, conflicts_deferred: 0 })
    }
}

fn kind_for_transport_failure(kind: PushFailureKind) -> SyncErrorKind {
    match kind {
        PushFailureKind::Retryable => SyncErrorKind::Transient,
        PushFailureKind::Permanent => SyncErrorKind::Validation,
        PushFailureKind::Authorization => SyncErrorKind::Authorization,
        PushFailureKind::Conflict => SyncErrorKind::ConflictAdvisory,
    }
}

/// Deterministic checksum over a snapshot payload, independent of key
/// ordering within each record's JSON (records are hashed by their
/// canonical id + version + serialized payload, then combined).
fn checksum_of(records: &[super::transport::RemoteRecord]) -> String {
    let mut hasher = Sha256::new();
    let mut sorted: Vec<&super::transport::RemoteRecord> = records.iter().collect();
    sorted.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
    for record in sorted {
        hasher.update(record.id.as_str().as_bytes());
        hasher.update(record.version.to_le_bytes());
        hasher.update(record.payload.to_string().as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteBackend;
    use async_trait::async_trait;
    use parking_lot::Mutex as PMutex;
    use std::collections::VecDeque;

    use super::super::transport::{PullResult, PushAck, PushFailure, RemoteRecord, SnapshotResponse};

    struct FakeTransport {
        push_responses: PMutex<VecDeque<std::result::Result<PushAck, PushFailure>>>,
        pull_responses: PMutex<VecDeque<std::result::Result<PullResult, PushFailure>>>,
        pushed_requests: PMutex<Vec<PushRequest>>,
    }

    impl FakeTransport {
        fn new() -> Self {
            Self {
                push_responses: PMutex::new(VecDeque::new()),
                pull_responses: PMutex::new(VecDeque::new()),
                pushed_requests: PMutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SyncTransport for FakeTransport {
        async fn push(&self, _tenant_id: &TenantId, request: &PushRequest) -> std::result::Result<PushAck, PushFailure> {
            self.pushed_requests.lock().push(request.clone());
            self.push_responses.lock().pop_front().unwrap_or(Ok(PushAck {
                mutation_id: request.mutation_id.clone(),
                accepted: true,
                server_version: 1,
                server_timestamp: Utc::now(),
            }))
        }

        async fn pull(
            &self,
            tenant_id: &TenantId,
            collection: &str,
            _since: Option<DateTime<Utc>>,
        ) -> std::result::Result<PullResult, PushFailure> {
            let _ = (tenant_id, collection);
            self.pull_responses.lock().pop_front().unwrap_or(Ok(PullResult {
                changes: vec![],
                server_timestamp: Utc::now(),
                cursor_lost: false,
            }))
        }

        async fn snapshot(&self, _tenant_id: &TenantId, _entity_type: &str) -> std::result::Result<SnapshotResponse, PushFailure> {
            Err(PushFailure { mutation_id: crate::ids::MutationId::generate(), kind: PushFailureKind::Permanent, message: "not configured".into() })
        }

        async fn ping(&self) -> bool {
            true
        }
    }

    fn manager(transport: Arc<FakeTransport>) -> SyncManager<SqliteBackend, FakeTransport> {
        let backend = Arc::new(SqliteBackend::open_in_memory().unwrap());
        let log = Arc::new(MutationLog::new(backend.clone()));
        SyncManager::new(backend, log, transport, "client-a".into(), EngineConfig::default())
    }

    #[tokio::test]
    async fn push_acks_drain_the_queue() {
        let transport = Arc::new(FakeTransport::new());
        let mgr = manager(transport.clone());
        let repo = mgr.repository("t1".into(), "docs");
        repo.put("d1", serde_json::json!({"title": "A"})).unwrap();

        let progress = mgr.sync("t1".into(), "docs".to_string()).await.unwrap();
        assert_eq!(progress.pushed, 1);
        assert!(mgr.mutation_log.all(&"t1".into()).unwrap().is_empty());
        assert_eq!(transport.pushed_requests.lock().len(), 1);
    }

    #[tokio::test]
    async fn pull_with_no_local_record_writes_through() {
        let transport = Arc::new(FakeTransport::new());
        transport.pull_responses.lock().push_back(Ok(PullResult {
            changes: vec![RemoteRecord {
                id: "d9".into(),
                collection: "docs".into(),
                version: 1,
                payload: serde_json::json!({"title": "remote"}),
                updated_at: Utc::now(),
                deleted: false,
            }],
            server_timestamp: Utc::now(),
            cursor_lost: false,
        }));
        let mgr = manager(transport);
        let progress = mgr.sync("t1".into(), "docs".to_string()).await.unwrap();
        assert_eq!(progress.pulled, 1);
        let repo = mgr.repository("t1".into(), "docs");
        assert_eq!(repo.get("d9").unwrap().unwrap().payload["title"], "remote");
    }

    #[tokio::test]
    async fn manual_conflict_resolution_applies_and_clears_deferred() {
        let transport = Arc::new(FakeTransport::new());
        let mgr = manager(transport);
        let repo = mgr.repository("t1".into(), "docs");
        repo.put("d1", serde_json::json!({"title": "local"})).unwrap();

        mgr.deferred.defer(
            "t1".into(),
            "docs".to_string(),
            "d1".into(),
            ConflictInput {
                record_id: "d1".into(),
                local: ConflictSide { payload: serde_json::json!({"title": "local"}), updated_at: Utc::now(), client_id: "client-a".into(), field_timestamps: None },
                incoming: ConflictSide { payload: serde_json::json!({"title": "remote"}), updated_at: Utc::now(), client_id: "server".into(), field_timestamps: None },
            },
        );
        assert!(mgr.deferred.is_deferred(&"t1".into(), "docs", &"d1".into()));

        mgr.resolve_manual_conflict(&"t1".into(), "docs", &"d1".into(), serde_json::json!({"title": "merged"})).unwrap();
        assert!(!mgr.deferred.is_deferred(&"t1".into(), "docs", &"d1".into()));
        assert_eq!(repo.get("d1").unwrap().unwrap().payload["title"], "merged");
    }
}
