//! Boundary mapping from loose wire records to strict internal types.
//!
//! Everything the engine stores passes through here first, so the rest of the
//! crate never has to guess between `title`/`name`/`username` or `id`/`Id`.

use chrono::{DateTime, NaiveDateTime, Utc};
use shared::{
    domain::{ConversationId, MessageId, UserId},
    protocol::{ConversationRecord, LastMessageRecord, MessageRecord, ParticipantRecord},
};
use tracing::warn;

use crate::{
    error::NormalizeError,
    types::{ConversationDetail, ConversationSummary, DeliveryState, LastMessage, Message, MessageKey},
};

pub const UNKNOWN_TITLE: &str = "Unknown user";

/// Parses RFC 3339 timestamps, and offset-less ones which the service emits
/// for UTC values.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty())
}

pub fn message(
    record: &MessageRecord,
    fallback_conversation: Option<&ConversationId>,
) -> Result<Message, NormalizeError> {
    let id = non_empty(record.id.as_ref()).ok_or(NormalizeError::MissingField {
        record: "message",
        field: "id",
    })?;
    let conversation_id = non_empty(record.conversation_id.as_ref())
        .map(ConversationId::from)
        .or_else(|| fallback_conversation.cloned())
        .ok_or(NormalizeError::MissingField {
            record: "message",
            field: "conversationId",
        })?;
    let sender_id = non_empty(record.sender_id.as_ref()).ok_or(NormalizeError::MissingField {
        record: "message",
        field: "senderId",
    })?;
    let raw_sent_at = record
        .sent_at
        .as_ref()
        .or(record.timestamp.as_ref())
        .ok_or(NormalizeError::MissingField {
            record: "message",
            field: "sentAt",
        })?;
    let sent_at = parse_timestamp(raw_sent_at).ok_or_else(|| NormalizeError::InvalidTimestamp {
        record: "message",
        value: raw_sent_at.clone(),
    })?;
    let body = record
        .content
        .clone()
        .or_else(|| record.body.clone())
        .unwrap_or_default();

    Ok(Message {
        key: MessageKey::Confirmed(MessageId::from(id)),
        conversation_id,
        sender_id: UserId::from(sender_id),
        body,
        sent_at,
        is_read: record.is_read.unwrap_or(false),
        delivery: DeliveryState::Delivered,
    })
}

fn last_message(record: &LastMessageRecord) -> LastMessage {
    LastMessage {
        body: record.content.clone().unwrap_or_default(),
        sent_at: record
            .sent_at
            .as_deref()
            .and_then(parse_timestamp)
            .or_else(|| record.created_at.as_deref().and_then(parse_timestamp)),
        is_read: record.is_read.unwrap_or(false),
        sender_id: non_empty(record.sender_id.as_ref()).map(UserId::from),
    }
}

fn other_participant<'a>(
    participants: Option<&'a Vec<ParticipantRecord>>,
    self_id: Option<&UserId>,
) -> Option<&'a ParticipantRecord> {
    participants?.iter().find(|participant| {
        non_empty(participant.user_id.as_ref())
            .is_some_and(|id| self_id.map_or(true, |me| me.as_str() != id))
    })
}

pub fn conversation_summary(
    record: &ConversationRecord,
    self_id: Option<&UserId>,
) -> Result<ConversationSummary, NormalizeError> {
    let id = non_empty(record.id.as_ref()).ok_or(NormalizeError::MissingField {
        record: "conversation",
        field: "id",
    })?;
    let other = other_participant(record.participants.as_ref(), self_id);

    let title = non_empty(record.title.as_ref())
        .or_else(|| non_empty(record.name.as_ref()))
        .or_else(|| non_empty(record.username.as_ref()))
        .or_else(|| other.and_then(|p| non_empty(p.name.as_ref())))
        .unwrap_or(UNKNOWN_TITLE)
        .to_string();

    let is_not_self = |candidate: &&str| self_id.map_or(true, |me| me.as_str() != *candidate);
    let peer_id = non_empty(record.other_user_id.as_ref())
        .filter(is_not_self)
        .or_else(|| non_empty(record.user_id.as_ref()).filter(is_not_self))
        .or_else(|| non_empty(record.participant_id.as_ref()).filter(is_not_self))
        .or_else(|| other.and_then(|p| non_empty(p.user_id.as_ref())))
        .map(UserId::from);

    Ok(ConversationSummary {
        id: ConversationId::from(id),
        title,
        peer_id,
        last_message: record.last_message.as_ref().map(last_message),
    })
}

/// Normalizes a batch of summaries, dropping (and logging) records that
/// cannot be mapped instead of failing the whole list.
pub fn conversation_summaries(
    records: &[ConversationRecord],
    self_id: Option<&UserId>,
) -> Vec<ConversationSummary> {
    records
        .iter()
        .filter_map(|record| match conversation_summary(record, self_id) {
            Ok(summary) => Some(summary),
            Err(err) => {
                warn!(error = %err, "dropping malformed conversation summary");
                None
            }
        })
        .collect()
}

pub fn conversation_detail(
    record: &ConversationRecord,
    self_id: Option<&UserId>,
) -> Result<ConversationDetail, NormalizeError> {
    let summary = conversation_summary(record, self_id)?;
    let messages = record
        .messages
        .as_deref()
        .unwrap_or_default()
        .iter()
        .filter_map(|wire| match message(wire, Some(&summary.id)) {
            Ok(message) => Some(message),
            Err(err) => {
                warn!(
                    conversation_id = %summary.id,
                    error = %err,
                    "dropping malformed message in conversation detail"
                );
                None
            }
        })
        .collect();
    Ok(ConversationDetail { summary, messages })
}
