//! Realtime Channel (C7): a tenant-scoped bidirectional message transport
//! with rooms, presence, rate limiting, and the degradation matrix that
//! routes Class A/B/C traffic between the live socket and the durable
//! sync path owned by `sync-core`. The socket itself is supplied by the
//! host through `RealtimeTransport`; this crate owns every other piece of
//! protocol state.

pub mod channel;
pub mod connection;
pub mod envelope;
pub mod error;
pub mod rate_limit;
pub mod transport;

pub use channel::{
    AuditCallback, AuditEvent, AuditKind, DeliveryOutcome, RealtimeChannel, RealtimeConfig,
    RealtimeSinkHandle, RoomAuthorizationHook,
};
pub use connection::{Connection, ConnectionContext, ConnectionId, ConnectionState};
pub use envelope::{MessageEnvelope, MessageType, PresenceEntry, PresenceStatus};
pub use error::{RealtimeError, Result};
pub use rate_limit::SlidingWindowLimiter;
pub use transport::RealtimeTransport;
