use futures::{Stream, StreamExt};
use shared::{
    domain::{ConversationId, UserId},
    protocol::CurrentUser,
};
use tokio::sync::broadcast;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tracing::warn;

use crate::{
    transport::ConnectionState,
    types::{Conversation, Message, Presence},
};

/// Change notifications for the presentation layer. Events say what changed;
/// current values are read through [`crate::SyncEngine::snapshot`].
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    ConnectionStateChanged(ConnectionState),
    SignedIn(CurrentUser),
    SignedOut,
    ConversationsUpdated,
    ConversationOpened(ConversationId),
    MessagesUpdated(ConversationId),
    UnreadChanged {
        conversation_id: ConversationId,
        unread: bool,
    },
    PresenceChanged {
        user_id: UserId,
        presence: Presence,
    },
    ConversationPromoted {
        provisional: ConversationId,
        persisted: ConversationId,
    },
    SessionExpired,
    Error(String),
}

/// Point-in-time copy of everything a view renders.
#[derive(Debug, Clone, Default)]
pub struct EngineSnapshot {
    pub current_user: Option<CurrentUser>,
    pub connection: ConnectionState,
    pub conversations: Vec<ConversationView>,
    pub open_conversation: Option<ConversationId>,
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone)]
pub struct ConversationView {
    pub conversation: Conversation,
    pub unread: bool,
    pub peer_presence: Presence,
}

/// Stream of engine events. A receiver that falls behind skips the missed
/// events and carries on; it should re-read the snapshot when that happens.
pub fn event_stream(
    receiver: broadcast::Receiver<ClientEvent>,
) -> impl Stream<Item = ClientEvent> + Send + Unpin + 'static {
    BroadcastStream::new(receiver).filter_map(|item| async move {
        match item {
            Ok(event) => Some(event),
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                warn!(skipped, "events: subscriber lagged; resync from snapshot");
                Some(ClientEvent::ConversationsUpdated)
            }
        }
    })
    .boxed()
}
