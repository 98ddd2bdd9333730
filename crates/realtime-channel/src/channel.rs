//! `RealtimeChannel` (C7) — connection-state tracking, rooms, presence,
//! rate limiting, and the degradation matrix from §4.7. The socket itself
//! is supplied by the host via `RealtimeTransport`.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use sync_core::classifier::RealtimeSink;
use sync_core::{InteractionClass, TenantId, UserId};

use crate::connection::{Connection, ConnectionContext, ConnectionId, ConnectionState};
use crate::envelope::{MessageEnvelope, MessageType, PresenceEntry, PresenceStatus};
use crate::error::{RealtimeError, Result};
use crate::rate_limit::SlidingWindowLimiter;
use crate::transport::RealtimeTransport;

pub trait RoomAuthorizationHook: Fn(&ConnectionContext, &str) -> bool + Send + Sync {}
impl<F: Fn(&ConnectionContext, &str) -> bool + Send + Sync> RoomAuthorizationHook for F {}

pub trait AuditCallback: Fn(&AuditEvent) + Send + Sync {}
impl<F: Fn(&AuditEvent) + Send + Sync> AuditCallback for F {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditKind {
    TenantMismatch,
    ClassDRefusal,
    RateLimitBreach,
    RoomJoinRefused,
}

#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub tenant_id: TenantId,
    pub kind: AuditKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered(usize),
    Queued,
    Dropped,
    DelayedReconciliation,
    Duplicate,
}

#[derive(Clone)]
pub struct RealtimeConfig {
    pub rate_limit_window: Duration,
    pub rate_limit_ceiling: u32,
    pub rate_limit_breach_disconnect_threshold: u32,
    pub offline_queue_ttl: Duration,
    pub offline_queue_capacity: usize,
    pub heartbeat_timeout: Duration,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            rate_limit_window: Duration::from_secs(10),
            rate_limit_ceiling: 50,
            rate_limit_breach_disconnect_threshold: 5,
            offline_queue_ttl: Duration::from_secs(24 * 60 * 60),
            offline_queue_capacity: 200,
            heartbeat_timeout: Duration::from_secs(45),
        }
    }
}

struct QueuedMessage {
    envelope: MessageEnvelope,
    expires_at: DateTime<Utc>,
}

pub struct RealtimeChannel<T: RealtimeTransport> {
    transport: Arc<T>,
    config: RealtimeConfig,
    connections: Mutex<HashMap<ConnectionId, Connection>>,
    connections_by_user: Mutex<HashMap<(TenantId, UserId), HashSet<ConnectionId>>>,
    rooms: Mutex<HashMap<(TenantId, String), HashSet<ConnectionId>>>,
    presence: Mutex<HashMap<(TenantId, UserId), PresenceEntry>>,
    offline_queue: Mutex<HashMap<(TenantId, UserId), VecDeque<QueuedMessage>>>,
    rate_limiters: Mutex<HashMap<ConnectionId, SlidingWindowLimiter>>,
    seen_message_ids: Mutex<HashSet<String>>,
    authorize_room: Option<Arc<dyn RoomAuthorizationHook>>,
    on_audit: Option<Arc<dyn AuditCallback>>,
}

impl<T: RealtimeTransport> RealtimeChannel<T> {
    pub fn new(transport: Arc<T>, config: RealtimeConfig) -> Self {
        Self {
            transport,
            config,
            connections: Mutex::new(HashMap::new()),
            connections_by_user: Mutex::new(HashMap::new()),
            rooms: Mutex::new(HashMap::new()),
            presence: Mutex::new(HashMap::new()),
            offline_queue: Mutex::new(HashMap::new()),
            rate_limiters: Mutex::new(HashMap::new()),
            seen_message_ids: Mutex::new(HashSet::new()),
            authorize_room: None,
            on_audit: None,
        }
    }

    pub fn with_room_authorization(mut self, hook: impl RoomAuthorizationHook + 'static) -> Self {
        self.authorize_room = Some(Arc::new(hook));
        self
    }

    pub fn with_audit_callback(mut self, cb: impl AuditCallback + 'static) -> Self {
        self.on_audit = Some(Arc::new(cb));
        self
    }

    fn audit(&self, tenant_id: &TenantId, kind: AuditKind) {
        tracing::warn!(?tenant_id, ?kind, "realtime channel audit event");
        if let Some(cb) = &self.on_audit {
            cb(&AuditEvent { tenant_id: tenant_id.clone(), kind });
        }
    }

    pub fn connect(&self, context: ConnectionContext) -> ConnectionId {
        let id = ConnectionId::generate();
        let mut conn = Connection::new(id.clone(), context.clone());
        conn.state = ConnectionState::Connected;
        self.connections.lock().insert(id.clone(), conn);
        self.connections_by_user
            .lock()
            .entry((context.tenant_id, context.user_id))
            .or_default()
            .insert(id.clone());
        id
    }

    pub async fn disconnect(&self, connection_id: &ConnectionId) {
        self.transport.close_connection(connection_id).await;
        let context = {
            let mut conns = self.connections.lock();
            conns.remove(connection_id).map(|c| c.context)
        };
        if let Some(context) = context {
            if let Some(set) = self
                .connections_by_user
                .lock()
                .get_mut(&(context.tenant_id, context.user_id))
            {
                set.remove(connection_id);
            }
            for members in self.rooms.lock().values_mut() {
                members.remove(connection_id);
            }
        }
        self.rate_limiters.lock().remove(connection_id);
    }

    pub fn record_heartbeat(&self, connection_id: &ConnectionId) {
        if let Some(conn) = self.connections.lock().get_mut(connection_id) {
            conn.last_heartbeat = Instant::now();
        }
    }

    /// Transition any connection whose last heartbeat exceeds the
    /// configured timeout to disconnected, emitting a local offline
    /// signal for that channel per §4.7's heartbeat contract.
    pub async fn sweep_heartbeat_timeouts(&self) -> Vec<ConnectionId> {
        let stale: Vec<ConnectionId> = {
            let conns = self.connections.lock();
            let now = Instant::now();
            conns
                .values()
                .filter(|c| now.duration_since(c.last_heartbeat) > self.config.heartbeat_timeout)
                .map(|c| c.id.clone())
                .collect()
        };
        for id in &stale {
            self.disconnect(id).await;
        }
        stale
    }

    pub fn join_room(&self, connection_id: &ConnectionId, room_id: impl Into<String>) -> Result<()> {
        let room_id = room_id.into();
        let context = {
            let conns = self.connections.lock();
            conns
                .get(connection_id)
                .ok_or_else(|| RealtimeError::ConnectionNotFound(connection_id.clone()))?
                .context
                .clone()
        };
        if let Some(hook) = &self.authorize_room {
            if !hook(&context, &room_id) {
                self.audit(&context.tenant_id, AuditKind::RoomJoinRefused);
                return Err(RealtimeError::RoomJoinRefused);
            }
        }
        self.rooms
            .lock()
            .entry((context.tenant_id, room_id))
            .or_default()
            .insert(connection_id.clone());
        Ok(())
    }

    pub fn leave_room(&self, connection_id: &ConnectionId, room_id: &str) -> Result<()> {
        let context = {
            let conns = self.connections.lock();
            conns
                .get(connection_id)
                .ok_or_else(|| RealtimeError::ConnectionNotFound(connection_id.clone()))?
                .context
                .clone()
        };
        if let Some(members) = self.rooms.lock().get_mut(&(context.tenant_id, room_id.to_string())) {
            members.remove(connection_id);
        }
        Ok(())
    }

    pub fn room_has_connections(&self, tenant_id: &TenantId, room_id: &str) -> bool {
        self.rooms
            .lock()
            .get(&(tenant_id.clone(), room_id.to_string()))
            .map(|s| !s.is_empty())
            .unwrap_or(false)
    }

    pub fn has_any_connection(&self, tenant_id: &TenantId) -> bool {
        self.connections.lock().values().any(|c| c.context.tenant_id == *tenant_id)
    }

    /// Presence updates are Class A: best-effort fan-out to the tenant's
    /// active connections, never queued for later delivery.
    pub async fn presence_update(&self, tenant_id: TenantId, user_id: UserId, status: PresenceStatus) {
        let entry = PresenceEntry { user_id: user_id.clone(), status, last_active: Utc::now() };
        self.presence.lock().insert((tenant_id.clone(), user_id.clone()), entry.clone());

        let envelope = MessageEnvelope {
            message_id: uuid::Uuid::new_v4().to_string(),
            message_type: MessageType::PresenceUpdate,
            interaction_class: InteractionClass::A,
            tenant_id: tenant_id.clone(),
            sender_id: user_id,
            recipient_id: None,
            room_id: None,
            payload: serde_json::to_value(&entry).unwrap_or(serde_json::Value::Null),
            timestamp: Utc::now(),
        };

        let targets: Vec<ConnectionId> = {
            let conns = self.connections.lock();
            conns.values().filter(|c| c.context.tenant_id == tenant_id).map(|c| c.id.clone()).collect()
        };
        for conn_id in &targets {
            let _ = self.transport.send_to_connection(conn_id, &envelope).await;
        }
    }

    /// Validates tenant ownership, the Class-D exclusion, and message-id
    /// idempotency, then dispatches to a direct send or a room broadcast
    /// depending on which the envelope declares.
    pub async fn send_message(&self, connection_id: &ConnectionId, envelope: MessageEnvelope) -> Result<DeliveryOutcome> {
        let context = {
            let conns = self.connections.lock();
            conns
                .get(connection_id)
                .ok_or_else(|| RealtimeError::ConnectionNotFound(connection_id.clone()))?
                .context
                .clone()
        };

        if envelope.tenant_id != context.tenant_id {
            self.audit(&context.tenant_id, AuditKind::TenantMismatch);
            return Err(RealtimeError::TenantMismatch {
                message_tenant: envelope.tenant_id,
                connection_tenant: context.tenant_id,
            });
        }

        if envelope.interaction_class == InteractionClass::D {
            self.audit(&context.tenant_id, AuditKind::ClassDRefusal);
            return Err(RealtimeError::ClassDNotAllowed);
        }

        if !self.seen_message_ids.lock().insert(envelope.message_id.clone()) {
            return Ok(DeliveryOutcome::Duplicate);
        }

        if !self.check_rate_limit(connection_id) {
            self.on_rate_limit_breach(connection_id, &context.tenant_id).await;
            return Err(RealtimeError::RateLimit(connection_id.clone()));
        }

        if envelope.room_id.is_some() {
            Ok(self.room_broadcast(envelope).await)
        } else if envelope.recipient_id.is_some() {
            Ok(self.direct_send(envelope).await)
        } else {
            Ok(DeliveryOutcome::Dropped)
        }
    }

    fn check_rate_limit(&self, connection_id: &ConnectionId) -> bool {
        let mut limiters = self.rate_limiters.lock();
        let limiter = limiters
            .entry(connection_id.clone())
            .or_insert_with(|| SlidingWindowLimiter::new(self.config.rate_limit_window, self.config.rate_limit_ceiling));
        limiter.check()
    }

    async fn on_rate_limit_breach(&self, connection_id: &ConnectionId, tenant_id: &TenantId) {
        self.audit(tenant_id, AuditKind::RateLimitBreach);
        let should_disconnect = {
            let mut conns = self.connections.lock();
            match conns.get_mut(connection_id) {
                Some(conn) => {
                    conn.consecutive_rate_limit_breaches += 1;
                    conn.consecutive_rate_limit_breaches >= self.config.rate_limit_breach_disconnect_threshold
                }
                None => false,
            }
        };
        if should_disconnect {
            tracing::warn!(?connection_id, ?tenant_id, "disconnecting connection after repeated rate-limit breaches");
            self.disconnect(connection_id).await;
        }
    }

    async fn room_broadcast(&self, envelope: MessageEnvelope) -> DeliveryOutcome {
        let room_id = envelope.room_id.clone().expect("room broadcast requires room_id");
        let members: Vec<ConnectionId> = self
            .rooms
            .lock()
            .get(&(envelope.tenant_id.clone(), room_id))
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default();
        for conn_id in &members {
            let _ = self.transport.send_to_connection(conn_id, &envelope).await;
        }
        DeliveryOutcome::Delivered(members.len())
    }

    /// Direct send degrades per the matrix in §4.7: Class A drops when the
    /// recipient has no active connection, Class B spills to a bounded
    /// durable queue, Class C expects the caller to fall back to delayed
    /// reconciliation via the sync engine.
    async fn direct_send(&self, envelope: MessageEnvelope) -> DeliveryOutcome {
        let recipient = envelope.recipient_id.clone().expect("direct send requires recipient_id");
        let targets: Vec<ConnectionId> = self
            .connections_by_user
            .lock()
            .get(&(envelope.tenant_id.clone(), recipient))
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default();

        if !targets.is_empty() {
            for conn_id in &targets {
                let _ = self.transport.send_to_connection(conn_id, &envelope).await;
            }
            return DeliveryOutcome::Delivered(targets.len());
        }

        match envelope.interaction_class {
            InteractionClass::A => DeliveryOutcome::Dropped,
            InteractionClass::B => {
                self.enqueue_offline(envelope);
                DeliveryOutcome::Queued
            }
            InteractionClass::C => DeliveryOutcome::DelayedReconciliation,
            InteractionClass::D => unreachable!("class D is refused before reaching direct_send"),
        }
    }

    fn enqueue_offline(&self, envelope: MessageEnvelope) {
        let recipient = envelope.recipient_id.clone().expect("direct send requires recipient_id");
        let key = (envelope.tenant_id.clone(), recipient);
        let expires_at = envelope.timestamp
            + chrono::Duration::from_std(self.config.offline_queue_ttl).unwrap_or(chrono::Duration::zero());
        let mut queues = self.offline_queue.lock();
        let queue = queues.entry(key).or_default();
        if queue.len() >= self.config.offline_queue_capacity {
            queue.pop_front();
        }
        queue.push_back(QueuedMessage { envelope, expires_at });
    }

    /// Deliver and remove every non-expired queued message for
    /// `(tenant_id, user_id)` — each message leaves the queue exactly
    /// once it is handed back here.
    pub fn drain_offline_queue(&self, tenant_id: &TenantId, user_id: &UserId) -> Vec<MessageEnvelope> {
        let now = Utc::now();
        let mut queues = self.offline_queue.lock();
        let Some(queue) = queues.get_mut(&(tenant_id.clone(), user_id.clone())) else {
            return Vec::new();
        };
        let drained: VecDeque<QueuedMessage> = std::mem::take(queue);
        drained.into_iter().filter(|m| m.expires_at > now).map(|m| m.envelope).collect()
    }

    /// Periodic sweep to drop expired queue entries without attempting
    /// delivery — entries are never left indefinitely, satisfying the
    /// queue-TTL property even if no one ever polls for them.
    pub fn expire_stale_queue_entries(&self) -> usize {
        let now = Utc::now();
        let mut expired = 0;
        for queue in self.offline_queue.lock().values_mut() {
            let before = queue.len();
            queue.retain(|m| m.expires_at > now);
            expired += before - queue.len();
        }
        expired
    }

    /// A lightweight, synchronous adapter so the Interaction Classifier
    /// (C8, in `sync-core`) can route generic Class A/B/C payloads into a
    /// single room without depending on this crate. Bridges sync call ->
    /// async send by spawning onto the ambient tokio runtime.
    pub fn sink_handle(self: &Arc<Self>, tenant_id: TenantId, room_id: impl Into<String>) -> RealtimeSinkHandle<T>
    where
        T: 'static,
    {
        RealtimeSinkHandle { channel: self.clone(), tenant_id, room_id: room_id.into() }
    }
}

pub struct RealtimeSinkHandle<T: RealtimeTransport + 'static> {
    channel: Arc<RealtimeChannel<T>>,
    tenant_id: TenantId,
    room_id: String,
}

impl<T: RealtimeTransport + 'static> RealtimeSink for RealtimeSinkHandle<T> {
    fn is_connected(&self) -> bool {
        self.channel.room_has_connections(&self.tenant_id, &self.room_id)
    }

    fn send_realtime(&self, class: InteractionClass, payload: &serde_json::Value) -> sync_core::Result<()> {
        let channel = self.channel.clone();
        let tenant_id = self.tenant_id.clone();
        let room_id = self.room_id.clone();
        let envelope = MessageEnvelope {
            message_id: uuid::Uuid::new_v4().to_string(),
            message_type: MessageType::Message,
            interaction_class: class,
            tenant_id: tenant_id.clone(),
            sender_id: "system".into(),
            recipient_id: None,
            room_id: Some(room_id),
            payload: payload.clone(),
            timestamp: Utc::now(),
        };
        tokio::spawn(async move {
            let members: Vec<ConnectionId> = channel
                .rooms
                .lock()
                .get(&(tenant_id, envelope.room_id.clone().unwrap()))
                .map(|s| s.iter().cloned().collect())
                .unwrap_or_default();
            for conn_id in &members {
                let _ = channel.transport.send_to_connection(conn_id, &envelope).await;
            }
        });
        Ok(())
    }
}
