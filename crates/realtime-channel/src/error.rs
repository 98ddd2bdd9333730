//! Error taxonomy for the realtime channel, named after the `k`-prefixed
//! refusal codes spec.md's scenarios reference directly (`kRateLimit`,
//! `kClassDNotAllowed`, `kTenantMismatch`).

use sync_core::TenantId;
use thiserror::Error;

use crate::connection::ConnectionId;

pub type Result<T> = std::result::Result<T, RealtimeError>;

#[derive(Debug, Error)]
pub enum RealtimeError {
    #[error("message tenant {message_tenant} does not match authenticated tenant {connection_tenant}")]
    TenantMismatch { message_tenant: TenantId, connection_tenant: TenantId },

    #[error("rate limit exceeded on connection {0:?}")]
    RateLimit(ConnectionId),

    #[error("class D messages must never use the realtime channel")]
    ClassDNotAllowed,

    #[error("room join refused by authorization hook")]
    RoomJoinRefused,

    #[error("connection {0:?} not found")]
    ConnectionNotFound(ConnectionId),

    #[error("transport error: {0}")]
    Transport(String),
}
