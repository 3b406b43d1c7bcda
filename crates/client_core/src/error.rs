use shared::{domain::ConversationId, error::ApiError};
use thiserror::Error;

/// Failures of the REST and realtime collaborators.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("session expired")]
    SessionExpired,
    #[error("not found")]
    NotFound,
    #[error("http {status}: {message}")]
    Http { status: u16, message: String },
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid payload: {0}")]
    Decode(String),
    #[error("invalid server url '{url}': {reason}")]
    InvalidServerUrl { url: String, reason: String },
    #[error("no access token available")]
    MissingCredential,
    #[error("realtime channel is not connected")]
    NotConnected,
    #[error("hub error: {0}")]
    Hub(String),
    #[error("realtime session closed")]
    Closed,
}

impl ClientError {
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            401 => Self::Unauthorized,
            404 => Self::NotFound,
            _ => Self::Http {
                status,
                message: ApiError::from_body(status, body).message,
            },
        }
    }

    /// The hub rejects a second join of the same group on some server
    /// versions; callers treat that as success.
    pub fn is_duplicate_join(&self) -> bool {
        match self {
            Self::Hub(message) => {
                let lower = message.to_ascii_lowercase();
                lower.contains("already joined")
                    || lower.contains("already a member")
                    || lower.contains("already in group")
            }
            _ => false,
        }
    }

    pub fn is_session_expired(&self) -> bool {
        matches!(self, Self::SessionExpired)
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(value: serde_json::Error) -> Self {
        Self::Decode(value.to_string())
    }
}

/// What the UI layer can observe from an engine operation. Transient
/// network failures never surface here.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("session expired; please sign in again")]
    SessionExpired,
    #[error("no conversation is open")]
    NoOpenConversation,
    #[error("unknown conversation {0}")]
    UnknownConversation(ConversationId),
    #[error("conversation {0} has no known recipient")]
    UnknownRecipient(ConversationId),
    #[error("message body must not be empty")]
    EmptyMessage,
    #[error("sign-in failed: {0}")]
    SignIn(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("{record} record is missing '{field}'")]
    MissingField {
        record: &'static str,
        field: &'static str,
    },
    #[error("{record} record has unparseable timestamp '{value}'")]
    InvalidTimestamp { record: &'static str, value: String },
}
