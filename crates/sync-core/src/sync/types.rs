//! Shared types for the Sync Engine: configuration, progress reporting,
//! and error events. Names mirror the `SyncManagerOptions`/`SyncPhase`/
//! `SyncProgress` shapes this crate's lineage already used for the same
//! purpose, generalized to plain Rust rather than a WASM/JS boundary.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{MutationId, RecordId, TenantId};
use crate::resolver::ResolverStrategy;

/// Configuration surface recognized by the engine (§6).
#[derive(Clone)]
pub struct EngineConfig {
    pub probe_interval: Duration,
    pub sync_interval: Duration,
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
    pub push_batch_size: usize,
    pub pull_max_changes: usize,
    pub mutation_ttl: Duration,
    pub queue_size_limit: usize,
    pub default_resolver_strategy: ResolverStrategy,
    pub snapshot_divergence_threshold: u64,
    pub connectivity_dwell: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            probe_interval: Duration::from_secs(30),
            sync_interval: Duration::from_secs(60),
            max_retries: 5,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            push_batch_size: 25,
            pull_max_changes: 200,
            mutation_ttl: Duration::from_secs(24 * 60 * 60),
            queue_size_limit: 1000,
            default_resolver_strategy: ResolverStrategy::LastWriteWins,
            snapshot_divergence_threshold: 500,
            connectivity_dwell: Duration::from_millis(750),
        }
    }
}

impl EngineConfig {
    /// Backoff delay for the given zero-indexed retry attempt, clamped to
    /// `max_backoff`.
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let scaled = self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_secs_f64(scaled).min(self.max_backoff)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Push,
    Pull,
    Snapshot,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncProgress {
    pub tenant_id: TenantId,
    pub collection: String,
    pub pushed: usize,
    pub pulled: usize,
    pub conflicts_resolved: usize,
    pub conflicts_deferred: usize,
    pub coalesced: bool,
}

impl SyncProgress {
    pub fn coalesced(tenant_id: TenantId, collection: impl Into<String>) -> Self {
        Self {
            tenant_id,
            collection: collection.into(),
            pushed: 0,
            pulled: 0,
            conflicts_resolved: 0,
            conflicts_deferred: 0,
            coalesced: true,
        }
    }
}

/// Error taxonomy kinds surfaced on the sync error channel (§7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncErrorKind {
    Transient,
    Authorization,
    Validation,
    ConflictAdvisory,
    StorageExhausted,
    RateLimit,
    ConflictUnresolved,
}

#[derive(Debug, Clone)]
pub struct SyncErrorEvent {
    pub tenant_id: TenantId,
    pub mutation_id: Option<MutationId>,
    pub record_id: Option<RecordId>,
    pub kind: SyncErrorKind,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

/// Emitted when the Sync Engine applies a server-originated tombstone —
/// consumers (e.g. a reactive query layer) use this to evict UI state
/// without re-deriving it from a full record diff.
#[derive(Debug, Clone)]
pub struct RemoteDeleteEvent {
    pub tenant_id: TenantId,
    pub collection: String,
    pub record_id: RecordId,
}

pub trait SyncErrorCallback: Fn(&SyncErrorEvent) + Send + Sync {}
impl<F: Fn(&SyncErrorEvent) + Send + Sync> SyncErrorCallback for F {}

pub trait SyncProgressCallback: Fn(&SyncProgress) + Send + Sync {}
impl<F: Fn(&SyncProgress) + Send + Sync> SyncProgressCallback for F {}

pub trait RemoteDeleteCallback: Fn(&RemoteDeleteEvent) + Send + Sync {}
impl<F: Fn(&RemoteDeleteEvent) + Send + Sync> RemoteDeleteCallback for F {}
