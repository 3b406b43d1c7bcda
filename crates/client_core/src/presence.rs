use std::collections::HashMap;

use shared::domain::UserId;

use crate::types::Presence;

/// Token for an in-flight `IsThisUserOnline` query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceQuery {
    user_id: UserId,
    version: u64,
}

#[derive(Debug, Default)]
struct Entry {
    presence: Option<Presence>,
    // Bumped by every push; a query answer is stale if this moved.
    version: u64,
}

/// Last known online status per user, from pushes and answered queries.
#[derive(Debug, Default)]
pub struct PresenceTracker {
    entries: HashMap<UserId, Entry>,
}

impl PresenceTracker {
    pub fn status(&self, user_id: &UserId) -> Presence {
        self.entries
            .get(user_id)
            .and_then(|entry| entry.presence)
            .unwrap_or(Presence::Unknown)
    }

    /// Applies a pushed status change. Returns the new value if it differs.
    pub fn on_status_changed(&mut self, user_id: &UserId, is_online: bool) -> Option<Presence> {
        let entry = self.entries.entry(user_id.clone()).or_default();
        entry.version += 1;
        let next = Presence::from_flag(is_online);
        if entry.presence == Some(next) {
            return None;
        }
        entry.presence = Some(next);
        Some(next)
    }

    pub fn begin_query(&mut self, user_id: &UserId) -> PresenceQuery {
        let entry = self.entries.entry(user_id.clone()).or_default();
        PresenceQuery {
            user_id: user_id.clone(),
            version: entry.version,
        }
    }

    /// Applies a query answer unless a push for the same user arrived while
    /// the query was in flight; the push is newer.
    pub fn complete_query(&mut self, query: &PresenceQuery, is_online: bool) -> Option<Presence> {
        let entry = self.entries.get_mut(&query.user_id)?;
        if entry.version != query.version {
            return None;
        }
        let next = Presence::from_flag(is_online);
        if entry.presence == Some(next) {
            return None;
        }
        entry.presence = Some(next);
        Some(next)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
