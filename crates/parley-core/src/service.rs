//! The messaging core.
//!
//! `ChatService` orchestrates validation, rate limiting, persistence, and
//! broadcast for each client-initiated operation. Every operation either
//! succeeds with an observable side effect or replies an error to the caller
//! only; no operation crashes a connection or the process.

use crate::error::ChatError;
use crate::ratelimit::RateLimiter;
use crate::registry::RoomRegistry;
use crate::store::MessageStore;
use crate::validate;
use parley_protocol::{ChatMessage, ClientEvent, ServerEvent};
use parley_transport::{ChatTransport, ConnectionId};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

/// Coerce a JSON value with JavaScript truthiness.
fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
        Some(Value::Null) | None => false,
    }
}

/// Room messaging orchestrator.
///
/// One handler invocation per inbound event; invocations for different
/// connections run concurrently. Shared state (registry, limiter) is
/// internally synchronized, and no lock is held across a store await.
pub struct ChatService {
    registry: RoomRegistry,
    limiter: RateLimiter,
    store: Arc<dyn MessageStore>,
    transport: Arc<dyn ChatTransport>,
}

impl ChatService {
    /// Create a service from its injected collaborators.
    pub fn new(
        registry: RoomRegistry,
        limiter: RateLimiter,
        store: Arc<dyn MessageStore>,
        transport: Arc<dyn ChatTransport>,
    ) -> Self {
        Self {
            registry,
            limiter,
            store,
            transport,
        }
    }

    /// The room registry, for membership queries and diagnostics.
    #[must_use]
    pub fn registry(&self) -> &RoomRegistry {
        &self.registry
    }

    /// Route a decoded client event to its handler.
    pub async fn dispatch(&self, conn: &ConnectionId, event: ClientEvent) {
        trace!(connection = %conn, event = event.name(), "Dispatching");
        match event {
            ClientEvent::Join { room_id, user_id } => {
                self.join(conn, room_id.as_deref(), user_id.as_deref()).await;
            }
            ClientEvent::Send {
                room_id,
                user_id,
                message,
            } => {
                self.send(conn, room_id.as_deref(), user_id.as_deref(), message.as_deref())
                    .await;
            }
            ClientEvent::GetHistory {
                room_id,
                limit,
                offset,
            } => {
                self.get_history(conn, room_id.as_deref(), limit.as_ref(), offset.as_ref())
                    .await;
            }
            ClientEvent::Leave { room_id, user_id } => {
                self.leave(conn, room_id.as_deref(), user_id.as_deref()).await;
            }
            ClientEvent::Typing {
                room_id,
                user_id,
                is_typing,
            } => {
                self.typing(conn, room_id.as_deref(), user_id.as_deref(), is_typing.as_ref())
                    .await;
            }
        }
    }

    /// Join a room: track membership, notify the room, ack the caller.
    pub async fn join(&self, conn: &ConnectionId, room_id: Option<&str>, user_id: Option<&str>) {
        let room = match validate::validate_room_id(room_id) {
            Ok(room) => room,
            Err(reason) => return self.reply_error(conn, reason).await,
        };
        let user = user_id.map(str::trim).unwrap_or_default().to_string();

        self.registry.join(conn, &room);
        self.transport.join_group(conn, &room);

        self.transport
            .broadcast_to_room(
                &room,
                ServerEvent::UserJoined {
                    room_id: room.clone(),
                    user_id: user.clone(),
                    connection_id: conn.to_string(),
                },
                Some(conn),
            )
            .await;
        self.emit(conn, ServerEvent::joined(room.clone())).await;

        debug!(connection = %conn, room = %room, user = %user, "Join");
    }

    /// Send a message to a room.
    ///
    /// Failures reply to the sender only; nothing is broadcast and nothing
    /// is persisted on a validation or rate-limit failure.
    pub async fn send(
        &self,
        conn: &ConnectionId,
        room_id: Option<&str>,
        user_id: Option<&str>,
        message: Option<&str>,
    ) {
        if let Err(e) = self.submit_message(Some(conn), room_id, user_id, message).await {
            let reply = match &e {
                ChatError::Storage(_) => "Failed to send message".to_string(),
                other => other.to_string(),
            };
            self.reply_error(conn, reply).await;
        }
    }

    /// Validate, rate-limit, persist, and broadcast one message.
    ///
    /// Shared by the real-time `send` path and the HTTP submission endpoint;
    /// `origin` is the sending connection when there is one. The append
    /// completes before any member sees the message, and the broadcast goes
    /// to the membership as of append time, the sender included.
    pub async fn submit_message(
        &self,
        origin: Option<&ConnectionId>,
        room_id: Option<&str>,
        sender_id: Option<&str>,
        content: Option<&str>,
    ) -> Result<ChatMessage, ChatError> {
        let data = validate::validate_chat_data(room_id, sender_id, content)
            .map_err(ChatError::Validation)?;

        // Real-time senders are keyed by connection; HTTP submissions have
        // no connection and key on the sender label instead.
        let limit_key = origin.map_or(data.user_id.as_str(), ConnectionId::as_str);
        if !self.limiter.check(limit_key) {
            return Err(ChatError::RateLimited);
        }

        let message = self
            .store
            .append(&data.room_id, &data.user_id, &data.message)
            .await
            .map_err(|e| {
                error!(room = %data.room_id, error = %e, "Message append failed");
                ChatError::Storage(e)
            })?;

        let recipients = self
            .transport
            .broadcast_to_room(
                &data.room_id,
                ServerEvent::receive(message.clone(), origin.map(ToString::to_string)),
                None,
            )
            .await;

        trace!(room = %data.room_id, id = message.id, recipients, "Message delivered");
        Ok(message)
    }

    /// Reply paginated history to the caller only.
    pub async fn get_history(
        &self,
        conn: &ConnectionId,
        room_id: Option<&str>,
        limit: Option<&Value>,
        offset: Option<&Value>,
    ) {
        match self.history(room_id, limit, offset).await {
            Ok((room, messages)) => {
                self.emit(conn, ServerEvent::history(room, messages)).await;
            }
            Err(e) => {
                let reply = match &e {
                    ChatError::Storage(_) => "Failed to retrieve messages".to_string(),
                    other => other.to_string(),
                };
                self.reply_error(conn, reply).await;
            }
        }
    }

    /// Fetch paginated history for a room.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a bad room or pagination input, or a
    /// storage error if the read fails.
    pub async fn history(
        &self,
        room_id: Option<&str>,
        limit: Option<&Value>,
        offset: Option<&Value>,
    ) -> Result<(String, Vec<ChatMessage>), ChatError> {
        let room = validate::validate_room_id(room_id).map_err(ChatError::Validation)?;
        let page =
            validate::validate_pagination(limit, offset).map_err(ChatError::Validation)?;

        let messages = self
            .store
            .range(&room, page.limit, page.offset)
            .await
            .map_err(|e| {
                error!(room = %room, error = %e, "History read failed");
                ChatError::Storage(e)
            })?;

        Ok((room, messages))
    }

    /// Leave a room: untrack membership, notify the room, ack the caller.
    pub async fn leave(&self, conn: &ConnectionId, room_id: Option<&str>, user_id: Option<&str>) {
        let room = match validate::validate_room_id(room_id) {
            Ok(room) => room,
            Err(reason) => return self.reply_error(conn, reason).await,
        };
        let user = user_id.map(str::trim).unwrap_or_default().to_string();

        self.registry.leave(conn, &room);
        self.transport.leave_group(conn, &room);

        self.transport
            .broadcast_to_room(
                &room,
                ServerEvent::UserLeft {
                    room_id: room.clone(),
                    user_id: user,
                },
                Some(conn),
            )
            .await;
        self.emit(conn, ServerEvent::left(room.clone())).await;

        debug!(connection = %conn, room = %room, "Leave");
    }

    /// Relay typing state to the rest of the room.
    ///
    /// Best-effort: no ack, no persistence, and missing fields drop the
    /// event silently rather than replying an error.
    pub async fn typing(
        &self,
        conn: &ConnectionId,
        room_id: Option<&str>,
        user_id: Option<&str>,
        is_typing: Option<&Value>,
    ) {
        let room = room_id.map(str::trim).filter(|r| !r.is_empty());
        let user = user_id.map(str::trim).filter(|u| !u.is_empty());
        let (Some(room), Some(user)) = (room, user) else {
            return;
        };

        self.transport
            .broadcast_to_room(
                room,
                ServerEvent::UserTyping {
                    room_id: room.to_string(),
                    user_id: user.to_string(),
                    is_typing: is_truthy(is_typing),
                },
                Some(conn),
            )
            .await;
    }

    /// Tear down a connection: clear its memberships and notify each room.
    ///
    /// Cannot fail observably; the caller runs it exactly once per
    /// connection.
    pub async fn disconnect(&self, conn: &ConnectionId, reason: &str) {
        let affected = self.registry.remove_connection(conn);

        for room in &affected {
            self.transport
                .broadcast_to_room(
                    room,
                    ServerEvent::UserDisconnected {
                        room_id: room.clone(),
                        connection_id: conn.to_string(),
                        reason: reason.to_string(),
                    },
                    Some(conn),
                )
                .await;
        }

        self.transport.remove_connection(conn);
        debug!(connection = %conn, rooms = affected.len(), reason = %reason, "Disconnect");
    }

    async fn emit(&self, conn: &ConnectionId, event: ServerEvent) {
        if let Err(e) = self.transport.emit(conn, event).await {
            warn!(connection = %conn, error = %e, "Delivery failed");
        }
    }

    async fn reply_error(&self, conn: &ConnectionId, message: impl Into<String>) {
        self.emit(conn, ServerEvent::error(message.into())).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::RateLimiterConfig;
    use crate::store::{MemoryStore, StorageError};
    use async_trait::async_trait;
    use parley_transport::TransportHub;
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn service_with(
        store: Arc<dyn MessageStore>,
        limiter: RateLimiter,
    ) -> (Arc<TransportHub>, ChatService) {
        let hub = Arc::new(TransportHub::new());
        let service = ChatService::new(
            RoomRegistry::new(),
            limiter,
            store,
            Arc::clone(&hub) as Arc<dyn ChatTransport>,
        );
        (hub, service)
    }

    fn setup() -> (Arc<TransportHub>, ChatService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let (hub, service) =
            service_with(Arc::clone(&store) as Arc<dyn MessageStore>, RateLimiter::new());
        (hub, service, store)
    }

    fn drain(rx: &mut UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// A store that always fails, for exercising the storage error path.
    struct FailingStore;

    #[async_trait]
    impl MessageStore for FailingStore {
        async fn append(
            &self,
            _room_id: &str,
            _sender_id: &str,
            _content: &str,
        ) -> Result<ChatMessage, StorageError> {
            Err(StorageError::Unavailable("connection reset".into()))
        }

        async fn range(
            &self,
            _room_id: &str,
            _limit: usize,
            _offset: usize,
        ) -> Result<Vec<ChatMessage>, StorageError> {
            Err(StorageError::Unavailable("connection reset".into()))
        }
    }

    #[tokio::test]
    async fn test_join_acks_caller_and_notifies_room() {
        let (hub, service, _) = setup();
        let a = ConnectionId::new("a");
        let b = ConnectionId::new("b");
        let mut rx_a = hub.register(&a);
        let mut rx_b = hub.register(&b);

        service.join(&a, Some("r1"), Some("alice")).await;
        service.join(&b, Some("r1"), Some("bob")).await;

        let a_events = drain(&mut rx_a);
        // A got its own ack, then saw B join.
        assert_eq!(a_events[0], ServerEvent::joined("r1"));
        assert!(matches!(
            &a_events[1],
            ServerEvent::UserJoined { user_id, .. } if user_id == "bob"
        ));

        // B only got its own ack; its own join is not echoed back.
        let b_events = drain(&mut rx_b);
        assert_eq!(b_events, vec![ServerEvent::joined("r1")]);

        assert_eq!(service.registry().member_count("r1"), 2);
    }

    #[tokio::test]
    async fn test_join_without_room_replies_error() {
        let (hub, service, _) = setup();
        let a = ConnectionId::new("a");
        let mut rx_a = hub.register(&a);

        service.join(&a, None, Some("alice")).await;

        assert_eq!(
            drain(&mut rx_a),
            vec![ServerEvent::error("Room ID is required")]
        );
        assert_eq!(service.registry().room_count(), 0);
    }

    #[tokio::test]
    async fn test_send_broadcasts_to_all_members_including_sender() {
        let (hub, service, _) = setup();
        let a = ConnectionId::new("a");
        let b = ConnectionId::new("b");
        let mut rx_a = hub.register(&a);
        let mut rx_b = hub.register(&b);

        service.join(&a, Some("r1"), Some("alice")).await;
        service.join(&b, Some("r1"), Some("bob")).await;
        drain(&mut rx_a);
        drain(&mut rx_b);

        service.send(&a, Some("r1"), Some("alice"), Some("hello")).await;

        for rx in [&mut rx_a, &mut rx_b] {
            let events = drain(rx);
            assert_eq!(events.len(), 1);
            match &events[0] {
                ServerEvent::Receive {
                    message,
                    connection_id,
                } => {
                    assert_eq!(message.room_id, "r1");
                    assert_eq!(message.sender_id, "alice");
                    assert_eq!(message.content, "hello");
                    assert!(message.id >= 1);
                    assert_eq!(connection_id.as_deref(), Some("a"));
                }
                other => panic!("Expected Receive, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_send_sanitizes_markup() {
        let (hub, service, _) = setup();
        let a = ConnectionId::new("a");
        let mut rx_a = hub.register(&a);

        service.join(&a, Some("r1"), Some("alice")).await;
        drain(&mut rx_a);

        service.send(&a, Some("r1"), Some("alice"), Some("<script>")).await;

        match &drain(&mut rx_a)[0] {
            ServerEvent::Receive { message, .. } => {
                assert_eq!(message.content, "&lt;script&gt;");
            }
            other => panic!("Expected Receive, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_send_ids_increase_within_room() {
        let (hub, service, _) = setup();
        let a = ConnectionId::new("a");
        let mut rx_a = hub.register(&a);

        service.join(&a, Some("r1"), Some("alice")).await;
        drain(&mut rx_a);

        service.send(&a, Some("r1"), Some("alice"), Some("one")).await;
        service.send(&a, Some("r1"), Some("alice"), Some("two")).await;

        let events = drain(&mut rx_a);
        let ids: Vec<u64> = events
            .iter()
            .map(|e| match e {
                ServerEvent::Receive { message, .. } => message.id,
                other => panic!("Expected Receive, got {:?}", other),
            })
            .collect();
        assert!(ids[1] > ids[0]);

        let timestamps: Vec<u64> = events
            .iter()
            .map(|e| match e {
                ServerEvent::Receive { message, .. } => message.timestamp,
                _ => unreachable!(),
            })
            .collect();
        assert!(timestamps[1] >= timestamps[0]);
    }

    #[tokio::test]
    async fn test_blank_message_fails_without_side_effects() {
        let (hub, service, store) = setup();
        let a = ConnectionId::new("a");
        let b = ConnectionId::new("b");
        let mut rx_a = hub.register(&a);
        let mut rx_b = hub.register(&b);

        service.join(&a, Some("r1"), Some("alice")).await;
        service.join(&b, Some("r1"), Some("bob")).await;
        drain(&mut rx_a);
        drain(&mut rx_b);

        service.send(&a, Some("r1"), Some("alice"), Some("   ")).await;

        assert_eq!(
            drain(&mut rx_a),
            vec![ServerEvent::error("Message is required")]
        );
        assert!(drain(&mut rx_b).is_empty());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_rate_limited_send_is_dropped() {
        let store = Arc::new(MemoryStore::new());
        let limiter = RateLimiter::with_config(RateLimiterConfig {
            max_requests: 1,
            window: Duration::from_secs(60),
        });
        let (hub, service) =
            service_with(Arc::clone(&store) as Arc<dyn MessageStore>, limiter);
        let a = ConnectionId::new("a");
        let mut rx_a = hub.register(&a);

        service.join(&a, Some("r1"), Some("alice")).await;
        drain(&mut rx_a);

        service.send(&a, Some("r1"), Some("alice"), Some("one")).await;
        service.send(&a, Some("r1"), Some("alice"), Some("two")).await;

        let events = drain(&mut rx_a);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], ServerEvent::Receive { .. }));
        assert!(matches!(
            &events[1],
            ServerEvent::Error { message } if message.contains("Rate limit")
        ));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_storage_failure_replies_generic_error() {
        let (hub, service) = service_with(Arc::new(FailingStore), RateLimiter::new());
        let a = ConnectionId::new("a");
        let mut rx_a = hub.register(&a);

        service.join(&a, Some("r1"), Some("alice")).await;
        drain(&mut rx_a);

        service.send(&a, Some("r1"), Some("alice"), Some("hello")).await;

        // The internal cause is not leaked.
        assert_eq!(
            drain(&mut rx_a),
            vec![ServerEvent::error("Failed to send message")]
        );
    }

    #[tokio::test]
    async fn test_history_returns_oldest_first() {
        let (hub, service, _) = setup();
        let a = ConnectionId::new("a");
        let mut rx_a = hub.register(&a);

        service.join(&a, Some("r1"), Some("alice")).await;
        drain(&mut rx_a);
        for i in 0..5 {
            service
                .send(&a, Some("r1"), Some("alice"), Some(&format!("m{i}")))
                .await;
        }
        drain(&mut rx_a);

        service
            .get_history(&a, Some("r1"), Some(&json!(2)), Some(&json!(0)))
            .await;

        match &drain(&mut rx_a)[0] {
            ServerEvent::History {
                room_id,
                messages,
                count,
            } => {
                assert_eq!(room_id, "r1");
                assert_eq!(*count, 2);
                assert_eq!(messages[0].content, "m0");
                assert_eq!(messages[1].content, "m1");
                assert!(messages[0].timestamp <= messages[1].timestamp);
            }
            other => panic!("Expected History, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_history_rejects_bad_pagination() {
        let (hub, service, _) = setup();
        let a = ConnectionId::new("a");
        let mut rx_a = hub.register(&a);

        service
            .get_history(&a, Some("r1"), Some(&json!(101)), None)
            .await;

        assert_eq!(
            drain(&mut rx_a),
            vec![ServerEvent::error("Limit must be an integer between 1 and 100")]
        );
    }

    #[tokio::test]
    async fn test_leave_notifies_remaining_members() {
        let (hub, service, _) = setup();
        let a = ConnectionId::new("a");
        let b = ConnectionId::new("b");
        let mut rx_a = hub.register(&a);
        let mut rx_b = hub.register(&b);

        service.join(&a, Some("r1"), Some("alice")).await;
        service.join(&b, Some("r1"), Some("bob")).await;
        drain(&mut rx_a);
        drain(&mut rx_b);

        service.leave(&a, Some("r1"), Some("alice")).await;

        assert_eq!(drain(&mut rx_a), vec![ServerEvent::left("r1")]);
        assert!(matches!(
            &drain(&mut rx_b)[0],
            ServerEvent::UserLeft { user_id, .. } if user_id == "alice"
        ));
        assert_eq!(service.registry().member_count("r1"), 1);
    }

    #[tokio::test]
    async fn test_typing_relays_to_others_only() {
        let (hub, service, _) = setup();
        let a = ConnectionId::new("a");
        let b = ConnectionId::new("b");
        let mut rx_a = hub.register(&a);
        let mut rx_b = hub.register(&b);

        service.join(&a, Some("r1"), Some("alice")).await;
        service.join(&b, Some("r1"), Some("bob")).await;
        drain(&mut rx_a);
        drain(&mut rx_b);

        service.typing(&a, Some("r1"), Some("alice"), Some(&json!(1))).await;

        assert!(drain(&mut rx_a).is_empty());
        assert_eq!(
            drain(&mut rx_b),
            vec![ServerEvent::UserTyping {
                room_id: "r1".into(),
                user_id: "alice".into(),
                is_typing: true,
            }]
        );
    }

    #[tokio::test]
    async fn test_typing_with_missing_fields_is_silent() {
        let (hub, service, _) = setup();
        let a = ConnectionId::new("a");
        let b = ConnectionId::new("b");
        let mut rx_a = hub.register(&a);
        let mut rx_b = hub.register(&b);

        service.join(&a, Some("r1"), Some("alice")).await;
        service.join(&b, Some("r1"), Some("bob")).await;
        drain(&mut rx_a);
        drain(&mut rx_b);

        // No user: dropped without any reply, not even an error.
        service.typing(&a, Some("r1"), None, Some(&json!(true))).await;

        assert!(drain(&mut rx_a).is_empty());
        assert!(drain(&mut rx_b).is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_notifies_rooms_and_clears_membership() {
        let (hub, service, _) = setup();
        let a = ConnectionId::new("a");
        let b = ConnectionId::new("b");
        let mut rx_a = hub.register(&a);
        let mut rx_b = hub.register(&b);

        service.join(&a, Some("r1"), Some("alice")).await;
        service.join(&b, Some("r1"), Some("bob")).await;
        drain(&mut rx_a);
        drain(&mut rx_b);

        service.disconnect(&a, "client disconnect").await;

        match &drain(&mut rx_b)[0] {
            ServerEvent::UserDisconnected {
                connection_id,
                reason,
                ..
            } => {
                assert_eq!(connection_id, "a");
                assert_eq!(reason, "client disconnect");
            }
            other => panic!("Expected UserDisconnected, got {:?}", other),
        }

        let members = service.registry().members_of("r1");
        assert_eq!(members, vec![b.clone()]);
    }

    #[tokio::test]
    async fn test_http_submission_reaches_realtime_members() {
        let (hub, service, _) = setup();
        let a = ConnectionId::new("a");
        let mut rx_a = hub.register(&a);

        service.join(&a, Some("r1"), Some("alice")).await;
        drain(&mut rx_a);

        let message = service
            .submit_message(None, Some("r1"), Some("rest-user"), Some("via http"))
            .await
            .unwrap();
        assert_eq!(message.sender_id, "rest-user");

        match &drain(&mut rx_a)[0] {
            ServerEvent::Receive {
                message,
                connection_id,
            } => {
                assert_eq!(message.content, "via http");
                assert!(connection_id.is_none());
            }
            other => panic!("Expected Receive, got {:?}", other),
        }
    }

    #[test]
    fn test_truthiness_coercion() {
        assert!(is_truthy(Some(&json!(true))));
        assert!(is_truthy(Some(&json!(1))));
        assert!(is_truthy(Some(&json!("yes"))));
        assert!(!is_truthy(Some(&json!(false))));
        assert!(!is_truthy(Some(&json!(0))));
        assert!(!is_truthy(Some(&json!(""))));
        assert!(!is_truthy(Some(&json!(null))));
        assert!(!is_truthy(None));
    }
}
