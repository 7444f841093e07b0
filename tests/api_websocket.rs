//! Integration tests for the live channel: presence registration, room
//! fan-out and the event handlers, driven through the same channels the
//! connection tasks use.
//!
//! `#[sqlx::test]` provisions an isolated database per test, applies the
//! migrations from `migrations/` and the listed fixtures.

mod common;

#[cfg(test)]
mod ws_tests {
    use super::common::{TEST_JWT_SECRET, create_test_state};
    use medichat::core::AppState;
    use medichat::dtos::{ClientEvent, NewMessagePayload, ServerEvent};
    use medichat::entities::User;
    use medichat::ws::dispatch::{self, PushNotifier};
    use medichat::ws::event_handlers::process_event;
    use medichat::ws::presence::{LocalPresence, SessionSignal};
    use serde_json::json;
    use sqlx::SqlitePool;
    use std::sync::Arc;
    use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};

    fn alice() -> User {
        User {
            user_id: 1,
            display_name: "Dr. Alice Adams".to_string(),
            role: "doctor".to_string(),
            specialty: Some("cardiology".to_string()),
        }
    }

    fn bob() -> User {
        User {
            user_id: 2,
            display_name: "Dr. Bob Brown".to_string(),
            role: "doctor".to_string(),
            specialty: Some("neurology".to_string()),
        }
    }

    /// Pops one signal and unwraps the delivered event.
    fn next_delivered(rx: &mut UnboundedReceiver<SessionSignal>) -> ServerEvent {
        match rx.try_recv().expect("a signal should be queued") {
            SessionSignal::Deliver(event) => (*event).clone(),
            other => panic!("expected Deliver, got {}", signal_name(&other)),
        }
    }

    fn signal_name(signal: &SessionSignal) -> &'static str {
        match signal {
            SessionSignal::Deliver(_) => "Deliver",
            SessionSignal::JoinRoom(_) => "JoinRoom",
            SessionSignal::LeaveRoom(_) => "LeaveRoom",
            SessionSignal::Shutdown => "Shutdown",
        }
    }

    // ============================================================
    // join_chat / leave_chat
    // ============================================================

    #[sqlx::test(fixtures(path = "../fixtures", scripts("users", "chats")))]
    async fn test_join_chat_subscribes_and_marks_read(pool: SqlitePool) -> sqlx::Result<()> {
        let state = create_test_state(pool);
        let user = alice();
        let (tx, mut rx) = unbounded_channel();

        process_event(&state, &user, &tx, ClientEvent::JoinChat { chat_id: 1 }).await;

        match rx.try_recv().expect("join signal") {
            SessionSignal::JoinRoom(1) => {}
            other => panic!("expected JoinRoom(1), got {}", signal_name(&other)),
        }
        match next_delivered(&mut rx) {
            ServerEvent::JoinedChat { chat_id: 1, success: true } => {}
            other => panic!("expected joined_chat ack, got {other:?}"),
        }

        // Opening the room consumed Alice's backlog.
        let counts = state.chat.unread_counts(1).await?;
        assert!(counts.is_empty(), "Alice should have no unread left");
        Ok(())
    }

    #[sqlx::test(fixtures(path = "../fixtures", scripts("users", "chats")))]
    async fn test_join_unknown_chat_yields_scoped_error(pool: SqlitePool) -> sqlx::Result<()> {
        let state = create_test_state(pool);
        let user = alice();
        let (tx, mut rx) = unbounded_channel();

        process_event(&state, &user, &tx, ClientEvent::JoinChat { chat_id: 999 }).await;

        match next_delivered(&mut rx) {
            ServerEvent::Error { message } => assert_eq!(message, "Chat not found"),
            other => panic!("expected error event, got {other:?}"),
        }
        assert!(rx.try_recv().is_err(), "no further signals expected");
        Ok(())
    }

    #[sqlx::test(fixtures(path = "../fixtures", scripts("users", "chats")))]
    async fn test_join_chat_as_non_participant(pool: SqlitePool) -> sqlx::Result<()> {
        let state = create_test_state(pool);
        // Dana is not part of chat 1.
        let user = User {
            user_id: 4,
            display_name: "Dr. Dana Diaz".to_string(),
            role: "doctor".to_string(),
            specialty: Some("pediatrics".to_string()),
        };
        let (tx, mut rx) = unbounded_channel();

        process_event(&state, &user, &tx, ClientEvent::JoinChat { chat_id: 1 }).await;

        match next_delivered(&mut rx) {
            ServerEvent::Error { message } => {
                assert_eq!(message, "Not a participant of this chat")
            }
            other => panic!("expected error event, got {other:?}"),
        }
        Ok(())
    }

    #[sqlx::test(fixtures(path = "../fixtures", scripts("users", "chats")))]
    async fn test_leave_chat_notifies_remaining_members(pool: SqlitePool) -> sqlx::Result<()> {
        let state = create_test_state(pool);
        let user = alice();
        let (tx, mut rx) = unbounded_channel();

        // Bob stays subscribed to the room.
        let mut bob_room = state.rooms.subscribe(1);

        process_event(&state, &user, &tx, ClientEvent::LeaveChat { chat_id: 1 }).await;

        match rx.try_recv().expect("leave signal") {
            SessionSignal::LeaveRoom(1) => {}
            other => panic!("expected LeaveRoom(1), got {}", signal_name(&other)),
        }
        match next_delivered(&mut rx) {
            ServerEvent::LeftChat { chat_id: 1, success: true } => {}
            other => panic!("expected left_chat ack, got {other:?}"),
        }

        let room_event = bob_room.try_recv().expect("departure broadcast");
        assert_eq!(room_event.exclude, Some(1), "departed user is excluded");
        match &*room_event.event {
            ServerEvent::UserLeftChat { chat_id, user_id, user_name } => {
                assert_eq!(*chat_id, 1);
                assert_eq!(*user_id, 1);
                assert_eq!(user_name, "Dr. Alice Adams");
            }
            other => panic!("expected user_left_chat, got {other:?}"),
        }
        Ok(())
    }

    // ============================================================
    // send_message
    // ============================================================

    #[sqlx::test(fixtures(path = "../fixtures", scripts("users", "chats")))]
    async fn test_send_message_fans_out_and_acks(pool: SqlitePool) -> sqlx::Result<()> {
        let state = create_test_state(pool);
        let user = alice();
        let (tx, mut rx) = unbounded_channel();

        // Both members hold a room subscription, as their write tasks would.
        let mut alice_room = state.rooms.subscribe(1);
        let mut bob_room = state.rooms.subscribe(1);

        let payload: NewMessagePayload =
            serde_json::from_value(json!({ "content": "CT scan is scheduled" }))
                .expect("valid payload");
        process_event(
            &state,
            &user,
            &tx,
            ClientEvent::SendMessage { chat_id: 1, payload },
        )
        .await;

        // Sender ack carries the persisted id.
        let ack = next_delivered(&mut rx);
        let message_id = match ack {
            ServerEvent::MessageSent { success: true, message_id, .. } => message_id,
            other => panic!("expected message_sent ack, got {other:?}"),
        };
        assert_eq!(message_id, 3, "fixtures seed two messages");

        // Everyone in the room, sender included, sees the same stored message.
        for room in [&mut alice_room, &mut bob_room] {
            let room_event = room.try_recv().expect("new_message broadcast");
            assert_eq!(room_event.exclude, None);
            match &*room_event.event {
                ServerEvent::NewMessage { chat_id, message, chat } => {
                    assert_eq!(*chat_id, 1);
                    assert_eq!(message.message_id, message_id);
                    assert_eq!(message.content, "CT scan is scheduled");
                    assert_eq!(message.sender_id, 1);
                    assert_eq!(chat.chat_id, 1);
                    assert_eq!(chat.updated_at, message.created_at);
                    let last = chat.last_message.as_ref().expect("patched summary");
                    assert_eq!(last.content, "CT scan is scheduled");
                    assert_eq!(last.sender_id, 1);
                }
                other => panic!("expected new_message, got {other:?}"),
            }
        }

        // Bob's unread counter moved from 1 to 2.
        let counts = state.chat.unread_counts(2).await?;
        assert_eq!(counts, vec![(1, 2)]);
        Ok(())
    }

    #[sqlx::test(fixtures(path = "../fixtures", scripts("users", "chats")))]
    async fn test_send_blank_message_yields_scoped_error(pool: SqlitePool) -> sqlx::Result<()> {
        let state = create_test_state(pool);
        let user = alice();
        let (tx, mut rx) = unbounded_channel();

        let payload: NewMessagePayload =
            serde_json::from_value(json!({ "content": "   " })).expect("valid payload");
        process_event(
            &state,
            &user,
            &tx,
            ClientEvent::SendMessage { chat_id: 1, payload },
        )
        .await;

        match next_delivered(&mut rx) {
            ServerEvent::Error { .. } => {}
            other => panic!("expected error event, got {other:?}"),
        }

        // Nothing was stored.
        let (messages, _) = state.msg.find_page(1, 1, 50).await?;
        assert_eq!(messages.len(), 2, "only the fixture messages remain");
        Ok(())
    }

    // ============================================================
    // mark_messages_read
    // ============================================================

    #[sqlx::test(fixtures(path = "../fixtures", scripts("users", "chats")))]
    async fn test_mark_messages_read_broadcasts_receipt(pool: SqlitePool) -> sqlx::Result<()> {
        let state = create_test_state(pool);
        let user = bob();
        let (tx, mut rx) = unbounded_channel();

        let mut alice_room = state.rooms.subscribe(1);

        process_event(&state, &user, &tx, ClientEvent::MarkMessagesRead { chat_id: 1 }).await;

        assert!(rx.try_recv().is_err(), "no direct signal for mark read");

        let room_event = alice_room.try_recv().expect("messages_read broadcast");
        match &*room_event.event {
            ServerEvent::MessagesRead { chat_id, user_id, user_name, .. } => {
                assert_eq!(*chat_id, 1);
                assert_eq!(*user_id, 2);
                assert_eq!(user_name, "Dr. Bob Brown");
            }
            other => panic!("expected messages_read, got {other:?}"),
        }

        let counts = state.chat.unread_counts(2).await?;
        assert!(counts.is_empty(), "Bob's counter dropped to zero");
        Ok(())
    }

    // ============================================================
    // typing indicators
    // ============================================================

    #[sqlx::test(fixtures(path = "../fixtures", scripts("users", "chats")))]
    async fn test_typing_events_exclude_the_typist(pool: SqlitePool) -> sqlx::Result<()> {
        let state = create_test_state(pool);
        let user = alice();
        let (tx, mut rx) = unbounded_channel();

        let mut bob_room = state.rooms.subscribe(1);

        process_event(&state, &user, &tx, ClientEvent::TypingStart { chat_id: 1 }).await;
        process_event(&state, &user, &tx, ClientEvent::TypingStop { chat_id: 1 }).await;

        assert!(rx.try_recv().is_err(), "typist gets no echo");

        let started = bob_room.try_recv().expect("user_typing broadcast");
        assert_eq!(started.exclude, Some(1));
        assert!(matches!(
            &*started.event,
            ServerEvent::UserTyping { user_id: 1, chat_id: 1, .. }
        ));

        let stopped = bob_room.try_recv().expect("user_stopped_typing broadcast");
        assert_eq!(stopped.exclude, Some(1));
        assert!(matches!(
            &*stopped.event,
            ServerEvent::UserStoppedTyping { user_id: 1, chat_id: 1, .. }
        ));
        Ok(())
    }

    #[sqlx::test(fixtures(path = "../fixtures", scripts("users", "chats")))]
    async fn test_typing_in_foreign_chat_is_rejected(pool: SqlitePool) -> sqlx::Result<()> {
        let state = create_test_state(pool);
        let user = bob();
        let (tx, mut rx) = unbounded_channel();

        // Chat 2 is Alice-Carol; Bob is not in it.
        process_event(&state, &user, &tx, ClientEvent::TypingStart { chat_id: 2 }).await;

        match next_delivered(&mut rx) {
            ServerEvent::Error { message } => {
                assert_eq!(message, "Not a participant of this chat")
            }
            other => panic!("expected error event, got {other:?}"),
        }
        Ok(())
    }

    // ============================================================
    // dispatch: direct delivery and presence fan-out
    // ============================================================

    #[sqlx::test(fixtures(path = "../fixtures", scripts("users", "chats")))]
    async fn test_send_to_user_requires_a_live_session(pool: SqlitePool) -> sqlx::Result<()> {
        let state = create_test_state(pool);

        assert!(
            !dispatch::send_to_user(&state, 2, ServerEvent::Connected { user_id: 2 }),
            "offline user has no session"
        );

        let (tx, mut rx) = unbounded_channel();
        state.presence.register(2, 1, tx);

        assert!(dispatch::send_to_user(&state, 2, ServerEvent::Connected { user_id: 2 }));
        match next_delivered(&mut rx) {
            ServerEvent::Connected { user_id: 2 } => {}
            other => panic!("expected connected, got {other:?}"),
        }
        Ok(())
    }

    #[sqlx::test(fixtures(path = "../fixtures", scripts("users", "chats")))]
    async fn test_status_updates_reach_online_contacts_only(pool: SqlitePool) -> sqlx::Result<()> {
        let state = create_test_state(pool);

        // Alice shares chats with Bob and Carol; only Bob is online.
        let (bob_tx, mut bob_rx) = unbounded_channel();
        state.presence.register(2, 1, bob_tx);

        dispatch::broadcast_status(&state, &alice(), "online").await;

        match next_delivered(&mut bob_rx) {
            ServerEvent::ContactStatusUpdate { user_id, status, user_name, .. } => {
                assert_eq!(user_id, 1);
                assert_eq!(status, "online");
                assert_eq!(user_name, "Dr. Alice Adams");
            }
            other => panic!("expected contact_status_update, got {other:?}"),
        }
        Ok(())
    }

    // ============================================================
    // dispatch: offline push hints
    // ============================================================

    /// Notifier that records every hint instead of pushing anywhere.
    #[derive(Default)]
    struct RecordingNotifier {
        hints: std::sync::Mutex<Vec<(Vec<i64>, String)>>,
    }

    #[async_trait::async_trait]
    impl PushNotifier for RecordingNotifier {
        async fn notify(
            &self,
            recipients: &[i64],
            summary: &str,
        ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            self.hints
                .lock()
                .unwrap()
                .push((recipients.to_vec(), summary.to_string()));
            Ok(())
        }
    }

    #[sqlx::test(fixtures(path = "../fixtures", scripts("users", "chats")))]
    async fn test_offline_participants_get_push_hint(pool: SqlitePool) -> sqlx::Result<()> {
        let notifier = Arc::new(RecordingNotifier::default());
        let state = Arc::new(AppState::with_collaborators(
            pool,
            TEST_JWT_SECRET.to_string(),
            Arc::new(LocalPresence::new()),
            notifier.clone(),
            std::time::Duration::ZERO,
        ));
        let user = alice();
        let (tx, mut rx) = unbounded_channel();

        // Bob is offline: sending into chat 1 must hint him.
        let payload: NewMessagePayload =
            serde_json::from_value(json!({ "content": "Consult when free?" }))
                .expect("valid payload");
        process_event(
            &state,
            &user,
            &tx,
            ClientEvent::SendMessage { chat_id: 1, payload },
        )
        .await;
        assert!(matches!(
            next_delivered(&mut rx),
            ServerEvent::MessageSent { success: true, .. }
        ));

        {
            let hints = notifier.hints.lock().unwrap();
            assert_eq!(hints.len(), 1);
            assert_eq!(hints[0].0, vec![2]);
            assert!(hints[0].1.contains("Dr. Alice Adams"));
        }

        // Once Bob holds a live session, no further hint is recorded.
        let (bob_tx, _bob_rx) = unbounded_channel();
        state.presence.register(2, 1, bob_tx);

        let payload: NewMessagePayload =
            serde_json::from_value(json!({ "content": "Never mind, solved" }))
                .expect("valid payload");
        process_event(
            &state,
            &user,
            &tx,
            ClientEvent::SendMessage { chat_id: 1, payload },
        )
        .await;

        assert_eq!(notifier.hints.lock().unwrap().len(), 1);
        Ok(())
    }
}
