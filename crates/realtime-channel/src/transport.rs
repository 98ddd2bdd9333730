//! The actual socket lives at the host boundary. This crate owns
//! connection-state tracking, room/presence membership, rate limiting,
//! and degradation routing; the host supplies bytes-in/bytes-out by
//! implementing `RealtimeTransport`, mirroring `sync-core`'s
//! `SyncTransport` core/host-boundary split.

use async_trait::async_trait;

use crate::connection::ConnectionId;
use crate::envelope::MessageEnvelope;

#[async_trait]
pub trait RealtimeTransport: Send + Sync {
    /// Deliver `envelope` to the socket backing `connection_id`. An error
    /// here is treated as the connection having gone away.
    async fn send_to_connection(
        &self,
        connection_id: &ConnectionId,
        envelope: &MessageEnvelope,
    ) -> Result<(), String>;

    /// Close the socket backing `connection_id`, if still open.
    async fn close_connection(&self, connection_id: &ConnectionId);
}
