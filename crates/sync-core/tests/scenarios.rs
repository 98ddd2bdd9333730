//! End-to-end scenarios S1 (offline write then reconnect) and S8
//! (cursor-lost snapshot recovery), driven entirely through `SyncManager`'s
//! public surface against an in-memory transport double.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use sync_core::{
    EngineConfig, MutationLog, PullResult, PushAck, PushFailure, PushFailureKind, PushRequest,
    RemoteRecord, Repository, SnapshotResponse, SqliteBackend, StorageBackend, SyncManager,
    SyncStatus, SyncTransport, TenantId,
};

struct FakeTransport {
    push_responses: Mutex<VecDeque<Result<PushAck, PushFailure>>>,
    pull_responses: Mutex<VecDeque<Result<PullResult, PushFailure>>>,
    snapshot_response: Mutex<Option<Result<SnapshotResponse, PushFailure>>>,
    pushed_requests: Mutex<Vec<PushRequest>>,
}

impl FakeTransport {
    fn new() -> Self {
        Self {
            push_responses: Mutex::new(VecDeque::new()),
            pull_responses: Mutex::new(VecDeque::new()),
            snapshot_response: Mutex::new(None),
            pushed_requests: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl SyncTransport for FakeTransport {
    async fn push(&self, _tenant_id: &TenantId, request: &PushRequest) -> Result<PushAck, PushFailure> {
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
        _tenant_id: &TenantId,
        _collection: &str,
        _since: Option<DateTime<Utc>>,
    ) -> Result<PullResult, PushFailure> {
        self.pull_responses.lock().pop_front().unwrap_or(Ok(PullResult {
            changes: vec![],
            server_timestamp: Utc::now(),
            cursor_lost: false,
        }))
    }

    async fn snapshot(&self, _tenant_id: &TenantId, _entity_type: &str) -> Result<SnapshotResponse, PushFailure> {
        self.snapshot_response
            .lock()
            .take()
            .unwrap_or(Err(PushFailure {
                mutation_id: sync_core::MutationId::generate(),
                kind: PushFailureKind::Permanent,
                message: "no snapshot configured".into(),
            }))
    }

    async fn ping(&self) -> bool {
        true
    }
}

/// Mirrors `SyncManager::checksum_of` exactly: hash each record's id,
/// little-endian version, and serialized payload, sorted by id.
fn checksum_of(records: &[RemoteRecord]) -> String {
    let mut hasher = Sha256::new();
    let mut sorted: Vec<&RemoteRecord> = records.iter().collect();
    sorted.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
    for record in sorted {
        hasher.update(record.id.as_str().as_bytes());
        hasher.update(record.version.to_le_bytes());
        hasher.update(record.payload.to_string().as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

struct Harness {
    backend: Arc<SqliteBackend>,
    log: Arc<MutationLog<SqliteBackend>>,
    transport: Arc<FakeTransport>,
    manager: SyncManager<SqliteBackend, FakeTransport>,
}

fn harness() -> Harness {
    let backend = Arc::new(SqliteBackend::open_in_memory().unwrap());
    let log = Arc::new(MutationLog::new(backend.clone()));
    let transport = Arc::new(FakeTransport::new());
    let manager = SyncManager::new(
        backend.clone(),
        log.clone(),
        transport.clone(),
        "client-a".into(),
        EngineConfig::default(),
    );
    Harness { backend, log, transport, manager }
}

impl Harness {
    fn repo(&self, tenant_id: &str, collection: &str) -> Repository<SqliteBackend> {
        Repository::new(self.backend.clone(), self.log.clone(), collection, tenant_id.into(), "client-a".into())
    }
}

#[tokio::test]
async fn s1_offline_write_syncs_exactly_once_on_reconnect() {
    let h = harness();
    let repo = h.repo("t1", "documents");

    let record = repo.put("doc-1", serde_json::json!({"title": "Offline draft"})).unwrap();
    assert!(record.metadata.pending_mutation_id.is_some());
    assert_eq!(h.log.all(&"t1".into()).unwrap().len(), 1);

    let progress = h.manager.sync("t1".into(), "documents".to_string()).await.unwrap();

    assert_eq!(progress.pushed, 1);
    assert!(h.log.all(&"t1".into()).unwrap().is_empty());
    assert_eq!(h.transport.pushed_requests.lock().len(), 1);

    let cursor = h.backend.get_cursor(&"t1".into(), "documents").unwrap().unwrap();
    assert_eq!(cursor.last_status, SyncStatus::Success);
}

#[tokio::test]
async fn s8_cursor_lost_triggers_verified_snapshot_replacement() {
    let h = harness();
    let repo = h.repo("t1", "documents");
    repo.put("stale", serde_json::json!({"title": "will be replaced"})).unwrap();
    // Clear the mutation this put queued so the push phase has nothing to
    // do this pass; only the pull path is under test here.
    for m in h.log.all(&"t1".into()).unwrap() {
        h.log.remove(&"t1".into(), &m.mutation_id).unwrap();
    }

    h.transport.pull_responses.lock().push_back(Ok(PullResult {
        changes: vec![],
        server_timestamp: Utc::now(),
        cursor_lost: true,
    }));

    let snapshot_records = vec![
        RemoteRecord {
            id: "doc-1".into(),
            collection: "documents".into(),
            version: 3,
            payload: serde_json::json!({"title": "Authoritative"}),
            updated_at: Utc::now(),
            deleted: false,
        },
        RemoteRecord {
            id: "doc-2".into(),
            collection: "documents".into(),
            version: 1,
            payload: serde_json::json!({"title": "Second"}),
            updated_at: Utc::now(),
            deleted: false,
        },
    ];
    let checksum = checksum_of(&snapshot_records);
    *h.transport.snapshot_response.lock() = Some(Ok(SnapshotResponse {
        snapshot_id: "snap-1".to_string(),
        tenant_id: "t1".into(),
        entity_type: "documents".to_string(),
        version: 3,
        data: snapshot_records,
        checksum,
    }));

    let progress = h.manager.sync("t1".into(), "documents".to_string()).await.unwrap();
    assert_eq!(progress.pulled, 2);

    // Stale local state is gone; snapshot content is authoritative.
    assert!(repo.get("stale").unwrap().is_none());
    assert_eq!(repo.get("doc-1").unwrap().unwrap().payload["title"], "Authoritative");
    assert_eq!(repo.get("doc-2").unwrap().unwrap().metadata.version, 1);

    let cursor = h.backend.get_cursor(&"t1".into(), "documents").unwrap().unwrap();
    assert_eq!(cursor.last_status, SyncStatus::Success);
    assert!(cursor.last_pulled_at.is_some());
}

#[tokio::test]
async fn s8_checksum_mismatch_is_rejected() {
    let h = harness();
    h.transport.pull_responses.lock().push_back(Ok(PullResult {
        changes: vec![],
        server_timestamp: Utc::now(),
        cursor_lost: true,
    }));
    *h.transport.snapshot_response.lock() = Some(Ok(SnapshotResponse {
        snapshot_id: "snap-2".to_string(),
        tenant_id: "t1".into(),
        entity_type: "documents".to_string(),
        version: 1,
        data: vec![RemoteRecord {
            id: "doc-1".into(),
            collection: "documents".into(),
            version: 1,
            payload: serde_json::json!({"title": "tampered"}),
            updated_at: Utc::now(),
            deleted: false,
        }],
        checksum: "0000000000000000000000000000000000000000000000000000000000000000".to_string(),
    }));

    let result = h.manager.sync("t1".into(), "documents".to_string()).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn cursor_never_advances_past_an_unresolved_conflict() {
    let backend = Arc::new(SqliteBackend::open_in_memory().unwrap());
    let log = Arc::new(MutationLog::new(backend.clone()));
    let transport = Arc::new(FakeTransport::new());
    let mut config = EngineConfig::default();
    config.default_resolver_strategy = sync_core::ResolverStrategy::Manual;
    let manager = SyncManager::new(backend.clone(), log.clone(), transport.clone(), "client-a".into(), config);
    let repo = Repository::new(backend.clone(), log.clone(), "documents", "t1".into(), "client-a".into());

    repo.put("doc-1", serde_json::json!({"title": "local edit"})).unwrap();
    manager.sync("t1".into(), "documents".to_string()).await.unwrap();

    // A second local edit leaves a pending mutation on the record, so the
    // next remote version for the same id cannot cleanly fast-forward.
    repo.put("doc-1", serde_json::json!({"title": "second local edit"})).unwrap();

    let conflict_time = Utc::now() - chrono::Duration::minutes(5);
    transport.pull_responses.lock().push_back(Ok(PullResult {
        changes: vec![RemoteRecord {
            id: "doc-1".into(),
            collection: "documents".into(),
            version: 9,
            payload: serde_json::json!({"title": "remote edit"}),
            updated_at: conflict_time,
            deleted: false,
        }],
        server_timestamp: Utc::now(),
        cursor_lost: false,
    }));

    let progress = manager.sync("t1".into(), "documents".to_string()).await.unwrap();
    assert_eq!(progress.conflicts_deferred, 1);

    let cursor = backend.get_cursor(&"t1".into(), "documents").unwrap().unwrap();
    assert_eq!(cursor.last_pulled_at.unwrap(), conflict_time);
    assert_eq!(cursor.last_status, SyncStatus::InProgress);
    assert!(!manager.pending_conflicts(&"t1".into()).is_empty());
}
