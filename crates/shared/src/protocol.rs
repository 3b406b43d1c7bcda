use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    domain::{ConversationId, UserId},
    error::EventDecodeError,
};

/// Hub method names, both directions.
pub mod hub_methods {
    pub const JOIN_CONVERSATION: &str = "JoinConversation";
    pub const MARK_AS_READ: &str = "MarkAsRead";
    pub const IS_THIS_USER_ONLINE: &str = "IsThisUserOnline";

    pub const RECEIVE_MESSAGE: &str = "ReceiveMessage";
    pub const MESSAGES_READ: &str = "MessagesRead";
    pub const USER_STATUS_CHANGED: &str = "UserStatusChanged";
}

// Wire records are deliberately loose: the service is inconsistent about
// casing and naming, and every field a variant might omit is optional here.
// `client_core::normalize` maps them into strict internal types.

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastMessageRecord {
    #[serde(default, alias = "Content")]
    pub content: Option<String>,
    #[serde(default, alias = "SentAt")]
    pub sent_at: Option<String>,
    /// Older payloads carry only this.
    #[serde(default, alias = "CreatedAt")]
    pub created_at: Option<String>,
    #[serde(default, alias = "IsRead")]
    pub is_read: Option<bool>,
    #[serde(default, alias = "ReadAt")]
    pub read_at: Option<String>,
    #[serde(default, alias = "SenderId")]
    pub sender_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantRecord {
    #[serde(default, alias = "UserId", alias = "id", alias = "Id")]
    pub user_id: Option<String>,
    #[serde(default, alias = "Name", alias = "username", alias = "UserName")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    #[serde(default, alias = "Id")]
    pub id: Option<String>,
    #[serde(default, alias = "ConversationId")]
    pub conversation_id: Option<String>,
    #[serde(default, alias = "SenderId")]
    pub sender_id: Option<String>,
    #[serde(default, alias = "Content")]
    pub content: Option<String>,
    #[serde(default, alias = "Body")]
    pub body: Option<String>,
    #[serde(default, alias = "SentAt")]
    pub sent_at: Option<String>,
    #[serde(default, alias = "Timestamp")]
    pub timestamp: Option<String>,
    #[serde(default, alias = "IsRead")]
    pub is_read: Option<bool>,
}

/// One conversation as returned by the list and detail endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRecord {
    #[serde(default, alias = "Id")]
    pub id: Option<String>,
    #[serde(default, alias = "Title")]
    pub title: Option<String>,
    #[serde(default, alias = "Name")]
    pub name: Option<String>,
    #[serde(default, alias = "Username", alias = "UserName")]
    pub username: Option<String>,
    #[serde(default, alias = "OtherUserId")]
    pub other_user_id: Option<String>,
    #[serde(default, alias = "UserId")]
    pub user_id: Option<String>,
    #[serde(default, alias = "ParticipantId")]
    pub participant_id: Option<String>,
    #[serde(default, alias = "Participants")]
    pub participants: Option<Vec<ParticipantRecord>>,
    #[serde(default, alias = "LastMessage")]
    pub last_message: Option<LastMessageRecord>,
    #[serde(default, alias = "Messages")]
    pub messages: Option<Vec<MessageRecord>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationsEnvelope {
    #[serde(default, alias = "User")]
    pub user: Option<Value>,
    #[serde(default, alias = "Conversations")]
    pub conversations: Vec<ConversationRecord>,
}

/// `GET /conversation/user/conversations` has been observed both wrapped and
/// as a bare array.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConversationsPayload {
    Bare(Vec<ConversationRecord>),
    Envelope(ConversationsEnvelope),
}

impl ConversationsPayload {
    pub fn into_records(self) -> Vec<ConversationRecord> {
        match self {
            Self::Envelope(envelope) => envelope.conversations,
            Self::Bare(records) => records,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum MessageType {
    #[default]
    Text,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub content: String,
    pub recipient_id: UserId,
    /// [`ConversationId::unassigned`] when the conversation does not exist yet.
    pub conversation_id: ConversationId,
    pub message_type: MessageType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSearchResult {
    #[serde(alias = "Id")]
    pub id: UserId,
    #[serde(alias = "Name")]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub mail: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    #[serde(alias = "Id")]
    pub id: UserId,
    #[serde(default, alias = "Name")]
    pub name: String,
    #[serde(default, alias = "Mail", alias = "email")]
    pub mail: String,
    #[serde(default, alias = "AccessToken")]
    pub access_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    #[serde(alias = "Id")]
    pub id: UserId,
    #[serde(default, alias = "Name")]
    pub name: String,
    #[serde(default, alias = "Mail", alias = "email")]
    pub mail: String,
}

impl From<LoginResponse> for CurrentUser {
    fn from(value: LoginResponse) -> Self {
        Self {
            id: value.id,
            name: value.name,
            mail: value.mail,
        }
    }
}

/// Events pushed by the hub.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    ReceiveMessage(MessageRecord),
    MessagesRead {
        conversation_id: ConversationId,
    },
    UserStatusChanged {
        user_id: UserId,
        is_online: bool,
    },
}

impl ServerEvent {
    /// Decodes a hub invocation. Unknown targets yield `Ok(None)`.
    pub fn from_invocation(
        target: &str,
        arguments: &[Value],
    ) -> Result<Option<Self>, EventDecodeError> {
        let event = match target {
            hub_methods::RECEIVE_MESSAGE => Self::ReceiveMessage(argument(target, arguments, 0)?),
            hub_methods::MESSAGES_READ => Self::MessagesRead {
                conversation_id: argument(target, arguments, 0)?,
            },
            hub_methods::USER_STATUS_CHANGED => Self::UserStatusChanged {
                user_id: argument(target, arguments, 0)?,
                is_online: argument(target, arguments, 1)?,
            },
            _ => return Ok(None),
        };
        Ok(Some(event))
    }
}

fn argument<T: serde::de::DeserializeOwned>(
    target: &str,
    arguments: &[Value],
    index: usize,
) -> Result<T, EventDecodeError> {
    let value = arguments
        .get(index)
        .ok_or_else(|| EventDecodeError::MissingArgument {
            target: target.to_string(),
            index,
        })?;
    serde_json::from_value(value.clone()).map_err(|source| EventDecodeError::InvalidArgument {
        target: target.to_string(),
        index,
        source,
    })
}
