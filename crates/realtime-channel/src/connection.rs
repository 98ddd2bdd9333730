//! Connection lifecycle: `connecting -> connected -> (disconnecting ->
//! disconnected) <-> reconnecting`, and the authenticated context every
//! inbound/outbound message is checked against.

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use sync_core::{ClientId, TenantId, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnecting,
    Disconnected,
    Reconnecting,
}

/// Established at handshake; `tenant_id` is the single source of truth
/// every message's declared tenant is checked against (§4.7).
#[derive(Debug, Clone)]
pub struct ConnectionContext {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub roles: Vec<String>,
    pub client_id: ClientId,
}

pub struct Connection {
    pub id: ConnectionId,
    pub context: ConnectionContext,
    pub state: ConnectionState,
    pub last_heartbeat: Instant,
    pub consecutive_rate_limit_breaches: u32,
}

impl Connection {
    pub fn new(id: ConnectionId, context: ConnectionContext) -> Self {
        Self {
            id,
            context,
            state: ConnectionState::Connecting,
            last_heartbeat: Instant::now(),
            consecutive_rate_limit_breaches: 0,
        }
    }
}
