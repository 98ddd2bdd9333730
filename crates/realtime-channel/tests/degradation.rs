//! End-to-end scenarios S5 (Class B degradation/queueing), S6 (Class-D
//! refusal), and S7 (cross-tenant refusal), plus Testable Property 7
//! (Class-D exclusion) and Testable Property 8 (idempotent delivery).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use sync_core::InteractionClass;

use realtime_channel::{
    ConnectionContext, DeliveryOutcome, MessageEnvelope, MessageType, RealtimeChannel,
    RealtimeConfig, RealtimeError, RealtimeTransport,
};

struct RecordingTransport {
    sent: Mutex<Vec<(String, String)>>, // (connection_id, message_id)
}

impl RecordingTransport {
    fn new() -> Self {
        Self { sent: Mutex::new(Vec::new()) }
    }
}

#[async_trait]
impl RealtimeTransport for RecordingTransport {
    async fn send_to_connection(
        &self,
        connection_id: &realtime_channel::ConnectionId,
        envelope: &MessageEnvelope,
    ) -> Result<(), String> {
        self.sent.lock().push((connection_id.0.clone(), envelope.message_id.clone()));
        Ok(())
    }

    async fn close_connection(&self, _connection_id: &realtime_channel::ConnectionId) {}
}

fn context(tenant: &str, user: &str) -> ConnectionContext {
    ConnectionContext {
        tenant_id: tenant.into(),
        user_id: user.into(),
        roles: vec![],
        client_id: "client-a".into(),
    }
}

fn message(tenant: &str, sender: &str, recipient: &str, class: InteractionClass) -> MessageEnvelope {
    MessageEnvelope {
        message_id: uuid::Uuid::new_v4().to_string(),
        message_type: MessageType::Message,
        interaction_class: class,
        tenant_id: tenant.into(),
        sender_id: sender.into(),
        recipient_id: Some(recipient.into()),
        room_id: None,
        payload: serde_json::json!({"text": "hi"}),
        timestamp: chrono::Utc::now(),
    }
}

#[tokio::test]
async fn s5_class_b_degrades_to_durable_queue_then_delivers_once_on_recovery() {
    let transport = Arc::new(RecordingTransport::new());
    let channel = RealtimeChannel::new(transport, RealtimeConfig::default());

    let sender = channel.connect(context("t1", "u1"));

    // u2 has no active connection: message should degrade to the queue.
    let envelope = message("t1", "u1", "u2", InteractionClass::B);
    let outcome = channel.send_message(&sender, envelope).await.unwrap();
    assert_eq!(outcome, DeliveryOutcome::Queued);

    // On "recovery" u2 connects and drains the queue exactly once.
    let _u2 = channel.connect(context("t1", "u2"));
    let delivered = channel.drain_offline_queue(&"t1".into(), &"u2".into());
    assert_eq!(delivered.len(), 1);

    let delivered_again = channel.drain_offline_queue(&"t1".into(), &"u2".into());
    assert!(delivered_again.is_empty());
}

#[tokio::test]
async fn class_a_drops_instead_of_queueing_when_recipient_offline() {
    let transport = Arc::new(RecordingTransport::new());
    let channel = RealtimeChannel::new(transport, RealtimeConfig::default());
    let sender = channel.connect(context("t1", "u1"));

    let envelope = message("t1", "u1", "u2", InteractionClass::A);
    let outcome = channel.send_message(&sender, envelope).await.unwrap();
    assert_eq!(outcome, DeliveryOutcome::Dropped);
    assert!(channel.drain_offline_queue(&"t1".into(), &"u2".into()).is_empty());
}

#[tokio::test]
async fn class_c_falls_back_to_delayed_reconciliation_when_offline() {
    let transport = Arc::new(RecordingTransport::new());
    let channel = RealtimeChannel::new(transport, RealtimeConfig::default());
    let sender = channel.connect(context("t1", "u1"));

    let envelope = message("t1", "u1", "u2", InteractionClass::C);
    let outcome = channel.send_message(&sender, envelope).await.unwrap();
    assert_eq!(outcome, DeliveryOutcome::DelayedReconciliation);
}

#[tokio::test]
async fn s6_class_d_is_refused_with_no_side_effects() {
    let transport = Arc::new(RecordingTransport::new());
    let channel = RealtimeChannel::new(transport, RealtimeConfig::default());
    let sender = channel.connect(context("t1", "u1"));

    let envelope = message("t1", "u1", "u2", InteractionClass::D);
    let result = channel.send_message(&sender, envelope).await;
    assert!(matches!(result, Err(RealtimeError::ClassDNotAllowed)));

    // No queue entry, no room membership side effect.
    assert!(channel.drain_offline_queue(&"t1".into(), &"u2".into()).is_empty());
}

#[tokio::test]
async fn s7_cross_tenant_message_is_refused_and_audited() {
    let transport = Arc::new(RecordingTransport::new());
    let audit_log = Arc::new(Mutex::new(Vec::new()));
    let audit_log_clone = audit_log.clone();
    let channel = RealtimeChannel::new(transport, RealtimeConfig::default())
        .with_audit_callback(move |event| audit_log_clone.lock().push(event.clone()));

    let sender = channel.connect(context("t1", "u1"));
    let envelope = message("t2", "u1", "u2", InteractionClass::C);

    let result = channel.send_message(&sender, envelope).await;
    assert!(matches!(
        result,
        Err(RealtimeError::TenantMismatch { .. })
    ));
    assert_eq!(audit_log.lock().len(), 1);
}

#[tokio::test]
async fn property_8_replaying_a_message_id_is_a_no_op() {
    let transport = Arc::new(RecordingTransport::new());
    let channel = RealtimeChannel::new(transport.clone(), RealtimeConfig::default());
    let sender = channel.connect(context("t1", "u1"));
    let recipient = channel.connect(context("t1", "u2"));
    let _ = recipient;

    let envelope = message("t1", "u1", "u2", InteractionClass::C);
    let first = channel.send_message(&sender, envelope.clone()).await.unwrap();
    assert_eq!(first, DeliveryOutcome::Delivered(1));

    let replay = channel.send_message(&sender, envelope).await.unwrap();
    assert_eq!(replay, DeliveryOutcome::Duplicate);
    assert_eq!(transport.sent.lock().len(), 1);
}

#[tokio::test]
async fn rate_limit_breach_refuses_and_escalates_to_disconnect() {
    let transport = Arc::new(RecordingTransport::new());
    let mut config = RealtimeConfig::default();
    config.rate_limit_ceiling = 1;
    config.rate_limit_breach_disconnect_threshold = 2;
    let channel = RealtimeChannel::new(transport, config);
    let sender = channel.connect(context("t1", "u1"));
    let _recipient = channel.connect(context("t1", "u2"));

    let first = channel.send_message(&sender, message("t1", "u1", "u2", InteractionClass::C)).await;
    assert!(first.is_ok());

    let second = channel.send_message(&sender, message("t1", "u1", "u2", InteractionClass::C)).await;
    assert!(matches!(second, Err(RealtimeError::RateLimit(_))));

    let third = channel.send_message(&sender, message("t1", "u1", "u2", InteractionClass::C)).await;
    assert!(matches!(third, Err(RealtimeError::RateLimit(_)) | Err(RealtimeError::ConnectionNotFound(_))));
}

#[tokio::test]
async fn join_room_respects_authorization_hook() {
    let transport = Arc::new(RecordingTransport::new());
    let channel = RealtimeChannel::new(transport, RealtimeConfig::default())
        .with_room_authorization(|_ctx, room_id| room_id != "forbidden");
    let connection = channel.connect(context("t1", "u1"));

    assert!(channel.join_room(&connection, "general").is_ok());
    assert!(matches!(
        channel.join_room(&connection, "forbidden"),
        Err(RealtimeError::RoomJoinRefused)
    ));
}

#[tokio::test]
async fn room_broadcast_is_tenant_scoped() {
    let transport = Arc::new(RecordingTransport::new());
    let channel = RealtimeChannel::new(transport.clone(), RealtimeConfig::default());

    let t1_member = channel.connect(context("t1", "u1"));
    let t2_member = channel.connect(context("t2", "u2"));
    channel.join_room(&t1_member, "general").unwrap();
    channel.join_room(&t2_member, "general").unwrap();

    let envelope = MessageEnvelope {
        message_id: uuid::Uuid::new_v4().to_string(),
        message_type: MessageType::Message,
        interaction_class: InteractionClass::C,
        tenant_id: "t1".into(),
        sender_id: "u1".into(),
        recipient_id: None,
        room_id: Some("general".to_string()),
        payload: serde_json::json!({}),
        timestamp: chrono::Utc::now(),
    };

    let outcome = channel.send_message(&t1_member, envelope).await.unwrap();
    assert_eq!(outcome, DeliveryOutcome::Delivered(1));
    assert_eq!(transport.sent.lock().len(), 1);
}

#[tokio::test]
async fn heartbeat_timeout_disconnects_stale_connections() {
    let transport = Arc::new(RecordingTransport::new());
    let mut config = RealtimeConfig::default();
    config.heartbeat_timeout = Duration::from_millis(1);
    let channel = RealtimeChannel::new(transport, config);
    let connection = channel.connect(context("t1", "u1"));

    tokio::time::sleep(Duration::from_millis(20)).await;
    let disconnected = channel.sweep_heartbeat_timeouts().await;
    assert_eq!(disconnected, vec![connection]);
}
