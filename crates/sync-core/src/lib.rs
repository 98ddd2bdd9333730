//! Offline-first local storage, mutation log, and client/server sync
//! engine: a durable local store (C1), a typed repository surface over it
//! (C2), an ordered mutation log with retry/quarantine (C3), a debounced
//! connectivity signal (C4), a push/pull sync engine with single-flight
//! coalescing (C5), a closed set of conflict resolution strategies (C6),
//! and an interaction classifier (C8) that routes operations between the
//! realtime channel and this durable path.
//!
//! The realtime channel itself (C7) lives in the sibling `realtime-channel`
//! crate, which depends on this one rather than the reverse.

pub mod classifier;
pub mod connectivity;
pub mod deferred;
pub mod error;
pub mod ids;
pub mod mutation_log;
pub mod repository;
pub mod resolver;
pub mod storage;
pub mod sync;
pub mod types;
pub mod vector_clock;

pub use classifier::{DurablePath, InteractionClassifier, RealtimeSink, RoutedVia};
pub use connectivity::{ConnectivityEvent, ConnectivityMonitor};
pub use deferred::{DeferredConflict, DeferredConflictRegistry, ResumeHandle};
pub use error::{ErrorClass, Result, SyncCoreError};
pub use ids::{ClientId, MutationId, RecordId, TenantId, UserId};
pub use mutation_log::MutationLog;
pub use repository::{QueryPredicate, Repository};
pub use resolver::{resolve, ConflictInput, ConflictSide, MergeFn, ResolveOutcome, ResolvedPayload, ResolverStrategy};
pub use storage::{Collection, MemoryMapped, ScanOptions, StorageBackend};
#[cfg(feature = "sqlite")]
pub use storage::SqliteBackend;
pub use sync::{
    EngineConfig, PullResult, PushAck, PushFailure, PushFailureKind, PushRequest, RemoteDeleteCallback,
    RemoteDeleteEvent, RemoteRecord, SnapshotResponse, SyncErrorCallback, SyncErrorEvent, SyncErrorKind,
    SyncManager, SyncPhase, SyncProgress, SyncProgressCallback, SyncScheduler, SyncTarget, SyncTransport,
};
pub use types::{
    InteractionClass, MutationKind, PendingMutation, Record, RecordMetadata, Snapshot, SyncCursor, SyncStatus,
};
pub use vector_clock::{ClockOrder, VectorClock};
