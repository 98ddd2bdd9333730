//! The client↔server replication HTTP surface (§6), expressed as a trait
//! rather than a concrete HTTP client — a host adapter implements this
//! against whatever HTTP stack the embedding application uses.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{MutationId, RecordId, TenantId};
use crate::types::MutationKind;

/// Structured classification of a push failure, carried back from the
/// server so the push phase can branch per §4.5/§7 without string
/// matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PushFailureKind {
    Retryable,
    Permanent,
    Conflict,
    Authorization,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushRequest {
    pub mutation_id: MutationId,
    pub tenant_id: TenantId,
    pub kind: MutationKind,
    pub collection: String,
    pub record_id: RecordId,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushAck {
    pub mutation_id: MutationId,
    pub accepted: bool,
    pub server_version: u64,
    pub server_timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushFailure {
    pub mutation_id: MutationId,
    pub kind: PushFailureKind,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteRecord {
    pub id: RecordId,
    pub collection: String,
    pub version: u64,
    pub payload: serde_json::Value,
    pub updated_at: DateTime<Utc>,
    pub deleted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullResult {
    pub changes: Vec<RemoteRecord>,
    pub server_timestamp: DateTime<Utc>,
    pub cursor_lost: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotResponse {
    pub snapshot_id: String,
    pub tenant_id: TenantId,
    pub entity_type: String,
    pub version: u64,
    pub data: Vec<RemoteRecord>,
    pub checksum: String,
}

#[async_trait]
pub trait SyncTransport: Send + Sync {
    /// `POST /sync/push` — single pending mutation per call, per §4.5's
    /// one-at-a-time push loop.
    async fn push(
        &self,
        tenant_id: &TenantId,
        request: &PushRequest,
    ) -> Result<PushAck, PushFailure>;

    /// `GET /sync/pull?since=<lastPulledAt>`
    async fn pull(
        &self,
        tenant_id: &TenantId,
        collection: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<PullResult, PushFailure>;

    /// `GET /sync/snapshot/<entityType>/<id>`
    async fn snapshot(
        &self,
        tenant_id: &TenantId,
        entity_type: &str,
    ) -> Result<SnapshotResponse, PushFailure>;

    /// `HEAD /ping` — used by the Connectivity Monitor's active probe.
    async fn ping(&self) -> bool;
}
