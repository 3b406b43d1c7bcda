use std::collections::BTreeSet;

use shared::domain::ConversationId;

/// Conversations holding at least one peer message the user has not seen.
/// The open conversation is never a member; callers enforce that by routing
/// every change through `mark_unread` with the current open id.
#[derive(Debug, Default, Clone)]
pub struct UnreadTracker {
    unread: BTreeSet<ConversationId>,
}

impl UnreadTracker {
    pub fn contains(&self, id: &ConversationId) -> bool {
        self.unread.contains(id)
    }

    pub fn len(&self) -> usize {
        self.unread.len()
    }

    pub fn is_empty(&self) -> bool {
        self.unread.is_empty()
    }

    /// Returns `true` if the flag changed.
    pub fn mark_unread(&mut self, id: &ConversationId, open: Option<&ConversationId>) -> bool {
        if open == Some(id) {
            return false;
        }
        self.unread.insert(id.clone())
    }

    /// Returns `true` if the flag changed.
    pub fn mark_read(&mut self, id: &ConversationId) -> bool {
        self.unread.remove(id)
    }

    /// Seeds the set from a freshly loaded list: every listed conversation
    /// whose last message is unread, except the open one. Entries for
    /// conversations the list does not mention are left alone.
    pub fn seed<'a>(
        &mut self,
        listed: impl IntoIterator<Item = (&'a ConversationId, bool)>,
        open: Option<&ConversationId>,
    ) -> Vec<(ConversationId, bool)> {
        let mut changed = Vec::new();
        for (id, has_unread) in listed {
            let flipped = if has_unread {
                self.mark_unread(id, open)
            } else {
                self.mark_read(id)
            };
            if flipped {
                changed.push((id.clone(), self.contains(id)));
            }
        }
        changed
    }

    pub fn rename(&mut self, from: &ConversationId, to: &ConversationId) {
        if self.unread.remove(from) {
            self.unread.insert(to.clone());
        }
    }

    pub fn clear(&mut self) {
        self.unread.clear();
    }
}
