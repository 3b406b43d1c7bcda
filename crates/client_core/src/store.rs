use std::collections::HashMap;

use shared::domain::{ConversationId, DraftId, UserId};
use tracing::debug;

use crate::types::{Conversation, ConversationSummary, DeliveryState, Message};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// Same key already present; nothing changed.
    Duplicate,
    /// Same id already present and the incoming copy carried a newer read flag.
    ReadFlagUpdated,
}

impl InsertOutcome {
    pub fn changed(self) -> bool {
        self != Self::Duplicate
    }
}

/// Message list of one conversation. Keys are unique and entries are kept
/// ordered by `sent_at` ascending, ties in arrival order.
#[derive(Debug, Clone, Default)]
pub struct MessageList {
    messages: Vec<Message>,
}

impl MessageList {
    pub fn as_slice(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn get_draft(&self, draft_id: DraftId) -> Option<&Message> {
        self.messages.iter().find(|m| m.draft_id() == Some(draft_id))
    }

    pub fn insert(&mut self, message: Message) -> InsertOutcome {
        if let Some(existing) = self.messages.iter_mut().find(|m| m.key == message.key) {
            // Read is the only flag a confirmed message may change, and only
            // towards true.
            if message.is_read && !existing.is_read {
                existing.is_read = true;
                return InsertOutcome::ReadFlagUpdated;
            }
            return InsertOutcome::Duplicate;
        }
        self.messages.push(message);
        self.messages.sort_by_key(|m| m.sent_at);
        InsertOutcome::Inserted
    }

    pub fn remove_draft(&mut self, draft_id: DraftId) -> Option<Message> {
        let index = self
            .messages
            .iter()
            .position(|m| m.draft_id() == Some(draft_id))?;
        Some(self.messages.remove(index))
    }

    pub fn mark_draft_failed(&mut self, draft_id: DraftId) -> bool {
        match self
            .messages
            .iter_mut()
            .find(|m| m.draft_id() == Some(draft_id))
        {
            Some(draft) if draft.delivery != DeliveryState::Failed => {
                draft.delivery = DeliveryState::Failed;
                true
            }
            _ => false,
        }
    }

    /// Oldest in-flight draft by `sender` with exactly this body.
    pub fn matching_pending_draft(&self, sender: &UserId, body: &str) -> Option<DraftId> {
        self.messages
            .iter()
            .filter(|m| m.delivery == DeliveryState::Sending)
            .find(|m| &m.sender_id == sender && m.body == body)
            .and_then(Message::draft_id)
    }

    fn rekey_conversation(&mut self, conversation_id: &ConversationId) {
        for message in &mut self.messages {
            message.conversation_id = conversation_id.clone();
        }
    }

    fn absorb(&mut self, other: MessageList) {
        for message in other.messages {
            self.insert(message);
        }
    }
}

/// Canonical client-side view: conversation summaries in recency order plus
/// the message list of the open conversation.
#[derive(Debug, Default)]
pub struct ConversationStore {
    conversations: Vec<Conversation>,
    open: Option<ConversationId>,
    /// Provisional ids already promoted, mapped to their persisted ids.
    promoted: HashMap<ConversationId, ConversationId>,
}

impl ConversationStore {
    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn conversation(&self, id: &ConversationId) -> Option<&Conversation> {
        self.conversations.iter().find(|c| &c.id == id)
    }

    fn conversation_mut(&mut self, id: &ConversationId) -> Option<&mut Conversation> {
        self.conversations.iter_mut().find(|c| &c.id == id)
    }

    /// The current id for `id`, following a promotion if one happened.
    pub fn resolve<'a>(&'a self, id: &'a ConversationId) -> &'a ConversationId {
        self.promoted.get(id).unwrap_or(id)
    }

    pub fn open_id(&self) -> Option<&ConversationId> {
        self.open.as_ref()
    }

    pub fn is_open(&self, id: &ConversationId) -> bool {
        self.open.as_ref() == Some(id)
    }

    pub fn open_conversation(&self) -> Option<&Conversation> {
        self.open.as_ref().and_then(|id| self.conversation(id))
    }

    pub fn open_messages(&self) -> Option<&MessageList> {
        self.open_conversation().and_then(|c| c.messages.as_ref())
    }

    /// Message list of `id`, only if it is the open conversation.
    pub fn open_messages_mut(&mut self, id: &ConversationId) -> Option<&mut MessageList> {
        if !self.is_open(id) {
            return None;
        }
        self.conversation_mut(id).and_then(|c| c.messages.as_mut())
    }

    /// Message list of `id` whether or not it is open. Only the open
    /// conversation and provisional entries with drafts in flight hold one.
    pub fn messages_mut(&mut self, id: &ConversationId) -> Option<&mut MessageList> {
        self.conversation_mut(id).and_then(|c| c.messages.as_mut())
    }

    pub fn find_by_peer(&self, peer_id: &UserId) -> Option<&Conversation> {
        let mut matching = self
            .conversations
            .iter()
            .filter(|c| c.peer_id.as_ref() == Some(peer_id));
        let first = matching.next()?;
        if !first.is_provisional {
            return Some(first);
        }
        matching.find(|c| !c.is_provisional).or(Some(first))
    }

    pub fn persisted_ids(&self) -> Vec<ConversationId> {
        self.conversations
            .iter()
            .filter(|c| !c.is_provisional)
            .map(|c| c.id.clone())
            .collect()
    }

    /// Replaces the summary collection outright. The open conversation keeps
    /// its message list, and survives even if the fetch does not list it
    /// (provisional, or created after the list snapshot was taken).
    pub fn replace_summaries(&mut self, summaries: Vec<ConversationSummary>) {
        let mut open_entry = self
            .open
            .as_ref()
            .and_then(|id| self.conversations.iter().position(|c| &c.id == id))
            .map(|index| self.conversations.swap_remove(index));

        let mut next: Vec<Conversation> = Vec::with_capacity(summaries.len() + 1);
        for summary in summaries {
            if next.iter().any(|c| c.id == summary.id) {
                debug!(conversation_id = %summary.id, "skipping duplicate summary");
                continue;
            }
            let mut conversation = Conversation::from_summary(summary);
            if let Some(open) = open_entry.as_mut().filter(|open| open.id == conversation.id) {
                conversation.messages = open.messages.take();
                open_entry = None;
            }
            next.push(conversation);
        }
        if let Some(open) = open_entry {
            next.push(open);
        }

        self.conversations = next;
        self.sort_by_recency();
    }

    fn sort_by_recency(&mut self) {
        // Provisional first (the user is looking at it), then newest activity;
        // conversations without messages keep their relative order at the end.
        self.conversations.sort_by(|a, b| {
            b.is_provisional
                .cmp(&a.is_provisional)
                .then_with(|| match (a.last_activity(), b.last_activity()) {
                    (Some(a), Some(b)) => b.cmp(&a),
                    (Some(_), None) => std::cmp::Ordering::Less,
                    (None, Some(_)) => std::cmp::Ordering::Greater,
                    (None, None) => std::cmp::Ordering::Equal,
                })
        });
    }

    /// Opens `id`, discarding the message list of any previously open
    /// conversation. Returns `false` if `id` is unknown.
    pub fn open(&mut self, id: &ConversationId) -> bool {
        if self.conversation(id).is_none() {
            return false;
        }
        let previous = self.open.replace(id.clone());
        if let Some(previous) = previous.filter(|previous| previous != id) {
            self.close(&previous);
        }
        if let Some(conversation) = self.conversation_mut(id) {
            conversation.messages.get_or_insert_with(MessageList::default);
        }
        true
    }

    fn close(&mut self, id: &ConversationId) {
        let Some(index) = self.conversations.iter().position(|c| &c.id == id) else {
            return;
        };
        let conversation = &mut self.conversations[index];
        if !conversation.is_provisional {
            conversation.messages = None;
            return;
        }
        // An unused provisional entry is only a placeholder. One with drafts
        // in flight stays until its send resolves and promotes it.
        if conversation.messages.as_ref().map_or(true, MessageList::is_empty) {
            self.conversations.remove(index);
        }
    }

    /// Returns the provisional conversation for `peer_id`, creating it if needed.
    pub fn ensure_provisional(&mut self, peer_id: UserId, title: &str) -> ConversationId {
        if let Some(existing) = self
            .conversations
            .iter()
            .find(|c| c.is_provisional && c.peer_id.as_ref() == Some(&peer_id))
        {
            return existing.id.clone();
        }
        let conversation = Conversation::provisional(peer_id, title);
        let id = conversation.id.clone();
        self.conversations.insert(0, conversation);
        id
    }

    /// Updates title and peer from a freshly fetched summary. Summaries are
    /// otherwise only replaced wholesale by `replace_summaries`.
    pub fn refresh_identity(&mut self, summary: &ConversationSummary) {
        if let Some(conversation) = self.conversation_mut(&summary.id) {
            conversation.title = summary.title.clone();
            if summary.peer_id.is_some() {
                conversation.peer_id = summary.peer_id.clone();
            }
        }
    }

    /// Swaps a provisional conversation for its server-issued id. If the
    /// persisted conversation is already listed, the provisional entry is
    /// folded into it; either way exactly one entry remains.
    pub fn promote(&mut self, provisional: &ConversationId, persisted: &ConversationId) -> bool {
        let Some(index) = self
            .conversations
            .iter()
            .position(|c| &c.id == provisional && c.is_provisional)
        else {
            return false;
        };
        let mut placeholder = self.conversations.remove(index);
        let was_open = self.is_open(provisional);

        if let Some(messages) = placeholder.messages.as_mut() {
            messages.rekey_conversation(persisted);
        }

        match self.conversation_mut(persisted) {
            Some(existing) => {
                if existing.peer_id.is_none() {
                    existing.peer_id = placeholder.peer_id.take();
                }
                if let Some(messages) = placeholder.messages {
                    match existing.messages.as_mut() {
                        Some(list) => list.absorb(messages),
                        None if was_open => existing.messages = Some(messages),
                        None => {}
                    }
                }
            }
            None => {
                placeholder.id = persisted.clone();
                placeholder.is_provisional = false;
                self.conversations.insert(0, placeholder);
            }
        }

        if was_open {
            self.open = Some(persisted.clone());
        }
        self.promoted.insert(provisional.clone(), persisted.clone());
        true
    }

    pub fn clear(&mut self) {
        self.conversations.clear();
        self.open = None;
        self.promoted.clear();
    }
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
