//! The one place message-affecting facts are merged into the store, whatever
//! their source: hub push, detail fetch, or the user's own send.

use shared::domain::{ConversationId, DraftId, UserId};
use tracing::{debug, warn};

use crate::{
    events::ClientEvent,
    store::{ConversationStore, InsertOutcome},
    types::{ConversationDetail, Message},
    unread::UnreadTracker,
};

/// Work the engine performs after a reconciliation step; the reconciler
/// itself never touches the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Followup {
    RefreshSummaries,
    RefetchDetail(ConversationId),
    MarkAsRead(ConversationId),
    Join(ConversationId),
}

#[derive(Debug, Default)]
pub struct Effects {
    pub events: Vec<ClientEvent>,
    pub followups: Vec<Followup>,
}

impl Effects {
    fn event(&mut self, event: ClientEvent) {
        if !self.events.contains(&event) {
            self.events.push(event);
        }
    }

    fn followup(&mut self, followup: Followup) {
        if !self.followups.contains(&followup) {
            self.followups.push(followup);
        }
    }
}

pub struct Reconciler<'a> {
    store: &'a mut ConversationStore,
    unread: &'a mut UnreadTracker,
    self_id: Option<&'a UserId>,
    effects: Effects,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        store: &'a mut ConversationStore,
        unread: &'a mut UnreadTracker,
        self_id: Option<&'a UserId>,
    ) -> Self {
        Self {
            store,
            unread,
            self_id,
            effects: Effects::default(),
        }
    }

    pub fn finish(self) -> Effects {
        self.effects
    }

    fn is_own(&self, message: &Message) -> bool {
        self.self_id == Some(&message.sender_id)
    }

    fn mark_unread(&mut self, conversation_id: &ConversationId) {
        if self
            .unread
            .mark_unread(conversation_id, self.store.open_id())
        {
            self.effects.event(ClientEvent::UnreadChanged {
                conversation_id: conversation_id.clone(),
                unread: true,
            });
        }
    }

    /// A message pushed by the hub.
    pub fn apply_pushed_message(&mut self, message: Message) {
        let conversation_id = message.conversation_id.clone();
        let own = self.is_own(&message);
        self.effects.followup(Followup::RefreshSummaries);

        if !self.store.is_open(&conversation_id) {
            if !own {
                self.mark_unread(&conversation_id);
            }
            debug!(conversation_id = %conversation_id, own, "sync: push for a conversation not in view");
            return;
        }

        let Some(list) = self.store.open_messages_mut(&conversation_id) else {
            return;
        };
        if own {
            // Our own send echoed back before its HTTP response: it takes the
            // place of the matching draft.
            if let Some(draft_id) = list.matching_pending_draft(&message.sender_id, &message.body)
            {
                list.remove_draft(draft_id);
            }
        }
        let outcome = list.insert(message);
        if outcome.changed() {
            self.effects
                .event(ClientEvent::MessagesUpdated(conversation_id.clone()));
        }
        if outcome == InsertOutcome::Inserted && !own {
            self.effects.followup(Followup::MarkAsRead(conversation_id));
        }
    }

    /// Result of a detail fetch issued for `requested`. `None` means the
    /// server has no record yet, which leaves the (empty) list as it is.
    pub fn apply_detail(&mut self, requested: &ConversationId, detail: Option<ConversationDetail>) {
        if !self.store.is_open(requested) {
            debug!(conversation_id = %requested, "sync: discarding detail for a conversation no longer open");
            return;
        }
        let Some(detail) = detail else {
            debug!(conversation_id = %requested, "sync: conversation has no server record yet");
            return;
        };
        if &detail.summary.id != requested {
            warn!(
                conversation_id = %requested,
                returned = %detail.summary.id,
                "sync: detail returned for a different conversation; discarding"
            );
            return;
        }

        self.store.refresh_identity(&detail.summary);
        let Some(list) = self.store.open_messages_mut(requested) else {
            return;
        };
        let mut changed = false;
        for message in detail.messages {
            changed |= list.insert(message).changed();
        }
        if changed {
            self.effects
                .event(ClientEvent::MessagesUpdated(requested.clone()));
        }
    }

    /// Read receipts only matter for the conversation in view; a cheap
    /// refetch picks up the new flags.
    pub fn apply_messages_read(&mut self, conversation_id: &ConversationId) {
        if self.store.is_open(conversation_id) && !conversation_id.is_provisional() {
            self.effects
                .followup(Followup::RefetchDetail(conversation_id.clone()));
        }
    }

    pub fn apply_outgoing_send(&mut self, draft: Message) {
        let conversation_id = draft.conversation_id.clone();
        let Some(list) = self.store.messages_mut(&conversation_id) else {
            warn!(conversation_id = %conversation_id, "sync: draft for a conversation without a message list");
            return;
        };
        if list.insert(draft).changed() {
            self.effects
                .event(ClientEvent::MessagesUpdated(conversation_id));
        }
    }

    /// The server accepted a send. `message` carries the authoritative id and
    /// conversation id, which differs from `local` for a first message.
    pub fn apply_send_confirmed(
        &mut self,
        draft_id: DraftId,
        local: &ConversationId,
        message: Message,
    ) {
        let persisted = message.conversation_id.clone();
        let local = self.store.resolve(local).clone();
        let local = &local;
        if local != &persisted {
            if local.is_provisional() && self.store.promote(local, &persisted) {
                self.unread.rename(local, &persisted);
                if self.store.is_open(&persisted) && self.unread.mark_read(&persisted) {
                    self.effects.event(ClientEvent::UnreadChanged {
                        conversation_id: persisted.clone(),
                        unread: false,
                    });
                }
                self.effects.event(ClientEvent::ConversationPromoted {
                    provisional: local.clone(),
                    persisted: persisted.clone(),
                });
                self.effects.event(ClientEvent::ConversationsUpdated);
                self.effects.followup(Followup::Join(persisted.clone()));
            } else {
                warn!(
                    conversation_id = %local,
                    returned = %persisted,
                    "sync: send confirmed for an unexpected conversation"
                );
            }
        }

        if let Some(list) = self.store.messages_mut(&persisted) {
            let removed = list.remove_draft(draft_id).is_some();
            let outcome = list.insert(message);
            if removed || outcome.changed() {
                self.effects
                    .event(ClientEvent::MessagesUpdated(persisted.clone()));
            }
        }
        self.effects.followup(Followup::RefreshSummaries);
    }

    /// `conversation_id` is where the draft was created; it may have been
    /// promoted by an earlier send since.
    pub fn apply_send_failed(&mut self, draft_id: DraftId, conversation_id: &ConversationId) {
        let conversation_id = self.store.resolve(conversation_id).clone();
        let Some(list) = self.store.messages_mut(&conversation_id) else {
            warn!(conversation_id = %conversation_id, "sync: failed send for a conversation without a message list");
            return;
        };
        if list.mark_draft_failed(draft_id) {
            self.effects
                .event(ClientEvent::MessagesUpdated(conversation_id));
        }
    }
}

#[cfg(test)]
#[path = "tests/reconciler_tests.rs"]
mod tests;
