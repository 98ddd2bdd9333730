pub mod manager;
pub mod scheduler;
pub mod transport;
pub mod types;

pub use manager::SyncManager;
pub use scheduler::{SyncScheduler, SyncTarget};
pub use transport::{
    PullResult, PushAck, PushFailure, PushFailureKind, PushRequest, RemoteRecord,
    SnapshotResponse, SyncTransport,
};
pub use types::{
    EngineConfig, RemoteDeleteCallback, RemoteDeleteEvent, SyncErrorCallback, SyncErrorEvent,
    SyncErrorKind, SyncPhase, SyncProgress, SyncProgressCallback,
};
