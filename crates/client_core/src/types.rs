//! Strict internal shapes. Nothing in here mirrors the wire; see `normalize`.

use chrono::{DateTime, Utc};
use shared::domain::{ConversationId, DraftId, MessageId, UserId};

use crate::store::MessageList;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    /// Optimistic draft, not yet acknowledged by the server.
    Sending,
    Delivered,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageKey {
    Confirmed(MessageId),
    Draft(DraftId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub key: MessageKey,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub body: String,
    pub sent_at: DateTime<Utc>,
    pub is_read: bool,
    pub delivery: DeliveryState,
}

impl Message {
    pub fn draft(
        draft_id: DraftId,
        conversation_id: ConversationId,
        sender_id: UserId,
        body: impl Into<String>,
        sent_at: DateTime<Utc>,
    ) -> Self {
        Self {
            key: MessageKey::Draft(draft_id),
            conversation_id,
            sender_id,
            body: body.into(),
            sent_at,
            is_read: false,
            delivery: DeliveryState::Sending,
        }
    }

    pub fn id(&self) -> Option<&MessageId> {
        match &self.key {
            MessageKey::Confirmed(id) => Some(id),
            MessageKey::Draft(_) => None,
        }
    }

    pub fn draft_id(&self) -> Option<DraftId> {
        match &self.key {
            MessageKey::Draft(id) => Some(*id),
            MessageKey::Confirmed(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastMessage {
    pub body: String,
    pub sent_at: Option<DateTime<Utc>>,
    pub is_read: bool,
    /// Not every service version reports the author of the last message.
    pub sender_id: Option<UserId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationSummary {
    pub id: ConversationId,
    pub title: String,
    /// The other participant; the detail endpoint is keyed by this id.
    pub peer_id: Option<UserId>,
    pub last_message: Option<LastMessage>,
}

#[derive(Debug, Clone)]
pub struct ConversationDetail {
    pub summary: ConversationSummary,
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone)]
pub struct Conversation {
    pub id: ConversationId,
    pub title: String,
    pub peer_id: Option<UserId>,
    pub last_message: Option<LastMessage>,
    pub is_provisional: bool,
    /// Populated only while the conversation is open.
    pub messages: Option<MessageList>,
}

impl Conversation {
    pub fn from_summary(summary: ConversationSummary) -> Self {
        Self {
            id: summary.id,
            title: summary.title,
            peer_id: summary.peer_id,
            last_message: summary.last_message,
            is_provisional: false,
            messages: None,
        }
    }

    pub fn provisional(peer_id: UserId, title: impl Into<String>) -> Self {
        Self {
            id: ConversationId::provisional(),
            title: title.into(),
            peer_id: Some(peer_id),
            last_message: None,
            is_provisional: true,
            messages: Some(MessageList::default()),
        }
    }

    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.last_message.as_ref().and_then(|last| last.sent_at)
    }

    /// An unread last message counts only if someone else wrote it.
    pub fn has_unread_last_message(&self, self_id: Option<&UserId>) -> bool {
        self.last_message.as_ref().is_some_and(|last| {
            !last.is_read && (last.sender_id.is_none() || last.sender_id.as_ref() != self_id)
        })
    }
}

/// What the user asked to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationRef {
    Existing(ConversationId),
    /// A user picked from search, possibly with no conversation yet.
    User {
        user_id: UserId,
        display_name: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Online,
    Offline,
    /// No query answered and no push seen; rendered as offline.
    Unknown,
}

impl Presence {
    pub fn from_flag(is_online: bool) -> Self {
        if is_online {
            Self::Online
        } else {
            Self::Offline
        }
    }
}
