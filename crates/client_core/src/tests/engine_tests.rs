use super::*;
use futures::StreamExt;
use shared::protocol::{ConversationRecord, LastMessageRecord, MessageRecord};

use crate::{
    test_support::{FakeApi, FakeChannel},
    types::DeliveryState,
};

fn settings() -> ClientSettings {
    ClientSettings {
        join_stagger_ms: 0,
        summary_refresh_interval_ms: 0,
        ..ClientSettings::default()
    }
}

fn conversation(id: &str, peer: &str, last: Option<(&str, bool)>) -> ConversationRecord {
    ConversationRecord {
        id: Some(id.into()),
        title: Some(format!("Chat {id}")),
        other_user_id: Some(peer.into()),
        last_message: last.map(|(content, is_read)| LastMessageRecord {
            content: Some(content.into()),
            sent_at: Some("2024-05-01T10:00:00Z".into()),
            is_read: Some(is_read),
            sender_id: Some(peer.into()),
            ..LastMessageRecord::default()
        }),
        ..ConversationRecord::default()
    }
}

fn message(id: &str, conversation: &str, sender: &str, minute: u32) -> MessageRecord {
    MessageRecord {
        id: Some(id.into()),
        conversation_id: Some(conversation.into()),
        sender_id: Some(sender.into()),
        content: Some(format!("text of {id}")),
        sent_at: Some(format!("2024-05-01T10:{minute:02}:00Z")),
        ..MessageRecord::default()
    }
}

fn detail(id: &str, peer: &str, messages: Vec<MessageRecord>) -> ConversationRecord {
    ConversationRecord {
        messages: Some(messages),
        ..conversation(id, peer, None)
    }
}

/// `c1` with Ana (u1, unread "hi") and `c2` with Bojan (u2, empty).
fn two_conversations(api: &FakeApi) {
    api.with_state(|state| {
        state.conversations = vec![
            conversation("c1", "u1", Some(("hi", false))),
            conversation("c2", "u2", None),
        ];
        state
            .details
            .insert("u1".into(), detail("c1", "u1", vec![message("m1", "c1", "u1", 0)]));
        state
            .details
            .insert("u2".into(), detail("c2", "u2", vec![message("m2", "c2", "u2", 1)]));
    });
}

async fn signed_in(api: &Arc<FakeApi>, channel: &Arc<FakeChannel>) -> Arc<SyncEngine> {
    let engine = SyncEngine::new(settings(), api.clone(), channel.clone());
    engine
        .sign_in("me@example.com", "secret")
        .await
        .expect("sign in");
    engine
}

async fn wait_for_snapshot(
    engine: &SyncEngine,
    what: &str,
    check: impl Fn(&EngineSnapshot) -> bool,
) -> EngineSnapshot {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let snapshot = engine.snapshot().await;
        if check(&snapshot) {
            return snapshot;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

async fn wait_for(what: &str, check: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !check() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

fn is_unread(snapshot: &EngineSnapshot, id: &str) -> bool {
    snapshot
        .conversations
        .iter()
        .any(|view| view.conversation.id.as_str() == id && view.unread)
}

fn message_ids(snapshot: &EngineSnapshot) -> Vec<String> {
    snapshot
        .messages
        .iter()
        .filter_map(|m| m.id().map(ToString::to_string))
        .collect()
}

fn assert_open_is_not_unread(snapshot: &EngineSnapshot) {
    if let Some(open) = &snapshot.open_conversation {
        assert!(!is_unread(snapshot, open.as_str()), "{open} is open and unread");
    }
}

#[tokio::test]
async fn sign_in_loads_the_list_seeds_unread_and_joins_rooms() {
    let api = FakeApi::new();
    two_conversations(&api);
    let channel = FakeChannel::new();
    channel.connect();

    let engine = signed_in(&api, &channel).await;
    let snapshot = engine.snapshot().await;

    assert_eq!(snapshot.current_user.map(|u| u.id), Some(UserId::from("me")));
    assert_eq!(snapshot.conversations.len(), 2);
    assert!(is_unread(&engine.snapshot().await, "c1"));
    assert!(!is_unread(&engine.snapshot().await, "c2"));
    assert_eq!(channel.starts(), 1);
    wait_for("rooms joined", || {
        channel.call_ids(hub_methods::JOIN_CONVERSATION) == ["c1", "c2"]
    })
    .await;
}

#[tokio::test]
async fn sign_in_with_bad_credentials_fails_without_starting() {
    let api = FakeApi::new();
    let channel = FakeChannel::new();
    let engine = SyncEngine::new(settings(), api.clone(), channel.clone());

    let err = engine.sign_in("", "secret").await.expect_err("rejected");
    assert!(matches!(err, EngineError::SignIn(_)));
    assert_eq!(channel.starts(), 0);
}

#[tokio::test]
async fn opening_and_pushes_follow_the_unread_rules() {
    let api = FakeApi::new();
    two_conversations(&api);
    let channel = FakeChannel::new();
    channel.connect();
    let engine = signed_in(&api, &channel).await;

    let c1 = engine
        .open_conversation(ConversationRef::Existing(ConversationId::from("c1")))
        .await
        .expect("open c1");
    let snapshot = engine.snapshot().await;
    assert_eq!(snapshot.open_conversation, Some(c1.clone()));
    assert!(!is_unread(&snapshot, "c1"));
    assert_eq!(message_ids(&snapshot), ["m1"]);
    assert_open_is_not_unread(&snapshot);
    wait_for("read receipt", || {
        channel.call_ids(hub_methods::MARK_AS_READ) == ["c1"]
    })
    .await;

    // The server now has c1 read and a new peer message in c2.
    api.with_state(|state| {
        state.conversations = vec![
            conversation("c1", "u1", Some(("hi", true))),
            conversation("c2", "u2", Some(("news", false))),
        ];
    });
    channel.push(ServerEvent::ReceiveMessage(message("m3", "c2", "u2", 5)));
    let snapshot = wait_for_snapshot(&engine, "c2 unread", |s| is_unread(s, "c2")).await;
    assert_eq!(message_ids(&snapshot), ["m1"]);
    assert_open_is_not_unread(&snapshot);

    engine
        .open_conversation(ConversationRef::Existing(ConversationId::from("c2")))
        .await
        .expect("open c2");
    let snapshot = engine.snapshot().await;
    assert!(!is_unread(&snapshot, "c2"));
    assert_eq!(message_ids(&snapshot), ["m2"]);
    assert_open_is_not_unread(&snapshot);
    assert_eq!(api.state.lock().unwrap().detail_calls, ["u1", "u2"]);
}

#[tokio::test]
async fn pushed_message_for_the_open_conversation_is_merged_once() {
    let api = FakeApi::new();
    two_conversations(&api);
    let channel = FakeChannel::new();
    channel.connect();
    let engine = signed_in(&api, &channel).await;
    engine
        .open_conversation(ConversationRef::Existing(ConversationId::from("c1")))
        .await
        .expect("open c1");

    // Out of order, and one of them delivered twice.
    channel.push(ServerEvent::ReceiveMessage(message("m5", "c1", "u1", 5)));
    channel.push(ServerEvent::ReceiveMessage(message("m3", "c1", "u1", 3)));
    channel.push(ServerEvent::ReceiveMessage(message("m5", "c1", "u1", 5)));

    let snapshot = wait_for_snapshot(&engine, "pushes merged", |s| s.messages.len() == 3).await;
    assert_eq!(message_ids(&snapshot), ["m1", "m3", "m5"]);
    assert!(!is_unread(&snapshot, "c1"));
}

#[tokio::test]
async fn unknown_conversation_is_rejected() {
    let api = FakeApi::new();
    let channel = FakeChannel::new();
    let engine = signed_in(&api, &channel).await;

    let err = engine
        .open_conversation(ConversationRef::Existing(ConversationId::from("nope")))
        .await
        .expect_err("unknown");
    assert!(matches!(err, EngineError::UnknownConversation(_)));
}

#[tokio::test]
async fn detail_for_a_conversation_no_longer_open_is_discarded() {
    let api = FakeApi::new();
    two_conversations(&api);
    let channel = FakeChannel::new();
    channel.connect();
    let engine = signed_in(&api, &channel).await;

    let release = api.hold_detail("u1");
    let first = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            engine
                .open_conversation(ConversationRef::Existing(ConversationId::from("c1")))
                .await
        })
    };
    wait_for("c1 detail requested", || {
        api.state.lock().unwrap().detail_calls.contains(&"u1".to_string())
    })
    .await;

    engine
        .open_conversation(ConversationRef::Existing(ConversationId::from("c2")))
        .await
        .expect("open c2");
    let _ = release.send(());
    first.await.expect("join").expect("open c1");

    let snapshot = engine.snapshot().await;
    assert_eq!(snapshot.open_conversation, Some(ConversationId::from("c2")));
    assert_eq!(message_ids(&snapshot), ["m2"]);
}

#[tokio::test]
async fn first_message_to_a_new_user_promotes_the_conversation() {
    let api = FakeApi::new();
    two_conversations(&api);
    let channel = FakeChannel::new();
    channel.connect();
    let engine = signed_in(&api, &channel).await;
    let mut events = engine.subscribe();

    let provisional = engine
        .open_conversation(ConversationRef::User {
            user_id: UserId::from("u7"),
            display_name: "Vesna".into(),
        })
        .await
        .expect("open provisional");
    assert!(provisional.is_provisional());
    assert!(api.state.lock().unwrap().detail_calls.is_empty());

    api.with_state(|state| {
        let mut reply = message("m1", "c9", "me", 7);
        reply.content = Some("hello".into());
        state.send_replies.push_back(Ok(reply));
    });
    engine.send_message("hello").await.expect("send");

    let request = api.state.lock().unwrap().sends[0].clone();
    assert_eq!(request.conversation_id, ConversationId::unassigned());
    assert_eq!(request.recipient_id, UserId::from("u7"));

    let c9 = ConversationId::from("c9");
    let snapshot = engine.snapshot().await;
    let with_u7: Vec<_> = snapshot
        .conversations
        .iter()
        .filter(|view| view.conversation.peer_id == Some(UserId::from("u7")))
        .collect();
    assert_eq!(with_u7.len(), 1);
    assert_eq!(with_u7[0].conversation.id, c9);
    assert!(!with_u7[0].conversation.is_provisional);
    assert!(snapshot
        .conversations
        .iter()
        .all(|view| !view.conversation.is_provisional));
    assert_eq!(snapshot.open_conversation, Some(c9.clone()));
    assert_eq!(message_ids(&snapshot), ["m1"]);
    assert_eq!(snapshot.messages[0].delivery, DeliveryState::Delivered);

    wait_for("c9 joined", || {
        channel
            .call_ids(hub_methods::JOIN_CONVERSATION)
            .contains(&"c9".to_string())
    })
    .await;

    let promoted = tokio::time::timeout(Duration::from_secs(1), async {
        while let Some(event) = events.next().await {
            if let ClientEvent::ConversationPromoted {
                provisional: from,
                persisted,
            } = event
            {
                return Some((from, persisted));
            }
        }
        None
    })
    .await
    .expect("promotion event");
    assert_eq!(promoted, Some((provisional, c9)));
}

#[tokio::test]
async fn failed_send_leaves_a_failed_draft() {
    let api = FakeApi::new();
    two_conversations(&api);
    let channel = FakeChannel::new();
    let engine = signed_in(&api, &channel).await;
    engine
        .open_conversation(ConversationRef::Existing(ConversationId::from("c2")))
        .await
        .expect("open c2");

    // No reply scripted: the fake answers 500.
    let draft_id = engine.send_message("are you there?").await.expect("send");

    let snapshot = engine.snapshot().await;
    let draft = snapshot
        .messages
        .iter()
        .find(|m| m.draft_id() == Some(draft_id))
        .expect("draft kept");
    assert_eq!(draft.delivery, DeliveryState::Failed);
    assert_eq!(draft.body, "are you there?");
}

#[tokio::test]
async fn send_validates_body_and_open_conversation() {
    let api = FakeApi::new();
    two_conversations(&api);
    let channel = FakeChannel::new();
    let engine = signed_in(&api, &channel).await;

    assert!(matches!(
        engine.send_message("hi").await,
        Err(EngineError::NoOpenConversation)
    ));
    engine
        .open_conversation(ConversationRef::Existing(ConversationId::from("c1")))
        .await
        .expect("open c1");
    assert!(matches!(
        engine.send_message("   ").await,
        Err(EngineError::EmptyMessage)
    ));
    assert!(api.state.lock().unwrap().sends.is_empty());
}

#[tokio::test]
async fn reconnect_rejoins_rooms_and_catches_up() {
    let api = FakeApi::new();
    two_conversations(&api);
    let channel = FakeChannel::new();
    channel.connect();
    let engine = signed_in(&api, &channel).await;
    engine
        .open_conversation(ConversationRef::Existing(ConversationId::from("c1")))
        .await
        .expect("open c1");
    wait_for("initial joins", || {
        channel.call_ids(hub_methods::JOIN_CONVERSATION).len() == 2
    })
    .await;

    let list_calls = api.state.lock().unwrap().list_calls;
    channel.clear_calls();
    channel.drop_connection();
    tokio::time::sleep(Duration::from_millis(20)).await;
    // Some hub versions reject a re-join of the same group.
    channel.script(
        hub_methods::JOIN_CONVERSATION,
        Err(ClientError::Hub("already joined".into())),
    );
    channel.connect();

    wait_for("rooms rejoined", || {
        let mut joined = channel.call_ids(hub_methods::JOIN_CONVERSATION);
        joined.sort();
        joined == ["c1", "c2"]
    })
    .await;
    wait_for("list and open detail refetched", || {
        let state = api.state.lock().unwrap();
        state.list_calls > list_calls && state.detail_calls.len() >= 2
    })
    .await;
    assert_eq!(engine.connection_state(), ConnectionState::Connected);
}

#[tokio::test]
async fn read_receipt_refreshes_the_open_conversation() {
    let api = FakeApi::new();
    two_conversations(&api);
    let channel = FakeChannel::new();
    channel.connect();
    let engine = signed_in(&api, &channel).await;
    engine
        .open_conversation(ConversationRef::Existing(ConversationId::from("c1")))
        .await
        .expect("open c1");
    assert!(!engine.snapshot().await.messages[0].is_read);

    api.with_state(|state| {
        let mut read = message("m1", "c1", "u1", 0);
        read.is_read = Some(true);
        state.details.insert("u1".into(), detail("c1", "u1", vec![read]));
    });
    channel.push(ServerEvent::MessagesRead {
        conversation_id: ConversationId::from("c1"),
    });

    let snapshot =
        wait_for_snapshot(&engine, "read flag", |s| s.messages.iter().all(|m| m.is_read)).await;
    assert_eq!(message_ids(&snapshot), ["m1"]);
}

#[tokio::test]
async fn presence_push_during_a_query_wins() {
    let api = FakeApi::new();
    two_conversations(&api);
    let channel = FakeChannel::new();
    channel.connect();
    let engine = signed_in(&api, &channel).await;
    let u1 = UserId::from("u1");

    let answer = channel.hold(hub_methods::IS_THIS_USER_ONLINE);
    let query = {
        let engine = Arc::clone(&engine);
        let u1 = u1.clone();
        tokio::spawn(async move { engine.query_status(&u1).await })
    };
    wait_for("presence query sent", || {
        channel.calls(hub_methods::IS_THIS_USER_ONLINE).len() == 1
    })
    .await;

    channel.push(ServerEvent::UserStatusChanged {
        user_id: u1.clone(),
        is_online: false,
    });
    wait_for_snapshot(&engine, "pushed presence", |s| {
        s.conversations
            .iter()
            .any(|view| view.peer_presence == Presence::Offline)
    })
    .await;

    let _ = answer.send(Ok(json!(true)));
    assert_eq!(query.await.expect("join"), Presence::Offline);
}

#[tokio::test]
async fn presence_is_unknown_while_disconnected() {
    let api = FakeApi::new();
    let channel = FakeChannel::new();
    let engine = signed_in(&api, &channel).await;

    assert_eq!(
        engine.query_status(&UserId::from("u1")).await,
        Presence::Unknown
    );
    assert!(channel.calls(hub_methods::IS_THIS_USER_ONLINE).is_empty());
}

#[tokio::test]
async fn short_search_terms_skip_the_request() {
    let api = FakeApi::new();
    let channel = FakeChannel::new();
    let engine = signed_in(&api, &channel).await;

    assert!(engine.search_users(" a ").await.expect("search").is_empty());
    let results = engine.search_users(" an ").await.expect("search");
    assert_eq!(results.len(), 1);
    assert_eq!(api.state.lock().unwrap().search_calls, ["an"]);
}

#[tokio::test]
async fn expired_session_is_surfaced() {
    let api = FakeApi::new();
    two_conversations(&api);
    let channel = FakeChannel::new();
    let engine = signed_in(&api, &channel).await;
    let mut events = engine.subscribe();

    api.with_state(|state| state.expired = true);
    let err = engine.load_conversation_list().await.expect_err("expired");
    assert!(matches!(err, EngineError::SessionExpired));

    let seen = tokio::time::timeout(Duration::from_secs(1), async {
        while let Some(event) = events.next().await {
            if event == ClientEvent::SessionExpired {
                return true;
            }
        }
        false
    })
    .await
    .expect("event");
    assert!(seen);
}

#[tokio::test]
async fn sign_out_clears_state_and_disconnects() {
    let api = FakeApi::new();
    two_conversations(&api);
    let channel = FakeChannel::new();
    channel.connect();
    let engine = signed_in(&api, &channel).await;

    engine.sign_out().await;
    let snapshot = engine.snapshot().await;
    assert!(snapshot.current_user.is_none());
    assert!(snapshot.conversations.is_empty());
    assert_eq!(snapshot.connection, ConnectionState::Disconnected);
}

#[tokio::test]
async fn refresh_in_flight_at_sign_out_does_not_repopulate() {
    let api = FakeApi::new();
    two_conversations(&api);
    let channel = FakeChannel::new();
    channel.connect();
    let engine = signed_in(&api, &channel).await;
    let calls_before = api.state.lock().unwrap().list_calls;

    let release = api.hold_list();
    channel.push(ServerEvent::ReceiveMessage(message("m9", "c2", "u2", 9)));
    wait_for("refresh started", || {
        api.state.lock().unwrap().list_calls > calls_before
    })
    .await;

    engine.sign_out().await;
    let _ = release.send(());
    tokio::time::sleep(Duration::from_millis(50)).await;

    let snapshot = engine.snapshot().await;
    assert!(snapshot.current_user.is_none());
    assert!(snapshot.conversations.is_empty(), "signed-out engine repopulated");
    assert!(engine.membership.intent().await.is_empty());
}

#[tokio::test]
async fn detail_arriving_after_sign_out_is_dropped() {
    let api = FakeApi::new();
    two_conversations(&api);
    let channel = FakeChannel::new();
    channel.connect();
    let engine = signed_in(&api, &channel).await;

    let release = api.hold_detail("u1");
    let opening = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            engine
                .open_conversation(ConversationRef::Existing(ConversationId::from("c1")))
                .await
        })
    };
    wait_for("c1 detail requested", || {
        api.state.lock().unwrap().detail_calls.contains(&"u1".to_string())
    })
    .await;

    engine.sign_out().await;
    engine
        .sign_in("me@example.com", "secret")
        .await
        .expect("sign in again");
    let _ = release.send(());
    opening.await.expect("join").expect("open c1");

    let snapshot = engine.snapshot().await;
    assert_eq!(snapshot.open_conversation, None);
    assert!(snapshot.messages.is_empty());
    assert_eq!(snapshot.conversations.len(), 2);
}
