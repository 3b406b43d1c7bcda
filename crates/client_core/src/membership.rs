use std::{collections::HashSet, sync::Arc, time::Duration};

use serde_json::json;
use shared::{domain::ConversationId, protocol::hub_methods};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::transport::{ConnectionState, RealtimeChannel};

#[derive(Debug, Default)]
struct MembershipState {
    /// Rooms this client wants, in the order they were first requested.
    intent: Vec<ConversationId>,
    /// Rooms joined during the session identified by `epoch`.
    joined: HashSet<ConversationId>,
    epoch: u64,
}

impl MembershipState {
    fn sync_epoch(&mut self, epoch: u64) {
        if self.epoch != epoch {
            self.epoch = epoch;
            // A new session starts with no server-side subscriptions.
            self.joined.clear();
        }
    }

    fn remember(&mut self, id: &ConversationId) {
        if id.is_provisional() || id.is_unassigned() {
            return;
        }
        if !self.intent.contains(id) {
            self.intent.push(id.clone());
        }
    }
}

/// Which conversation rooms the hub should route events to this client for.
/// Intent survives reconnects; actual joins are replayed per session.
pub struct RoomMembership {
    channel: Arc<dyn RealtimeChannel>,
    stagger: Duration,
    state: Mutex<MembershipState>,
}

impl RoomMembership {
    pub fn new(channel: Arc<dyn RealtimeChannel>, stagger: Duration) -> Self {
        Self {
            channel,
            stagger,
            state: Mutex::new(MembershipState::default()),
        }
    }

    pub async fn intent(&self) -> Vec<ConversationId> {
        self.state.lock().await.intent.clone()
    }

    pub async fn is_joined(&self, id: &ConversationId) -> bool {
        let status = self.channel.status();
        let mut state = self.state.lock().await;
        state.sync_epoch(status.epoch);
        status.state == ConnectionState::Connected && state.joined.contains(id)
    }

    /// Records intent for every id and joins those not yet joined in this
    /// session, `stagger` apart.
    pub async fn join_all(&self, ids: &[ConversationId]) {
        {
            let mut state = self.state.lock().await;
            for id in ids {
                state.remember(id);
            }
        }
        let mut first = true;
        for id in ids {
            if !first && !self.stagger.is_zero() {
                tokio::time::sleep(self.stagger).await;
            }
            if self.join(id).await {
                first = false;
            }
        }
    }

    /// Idempotent single join; an already-joined room issues no request.
    pub async fn join_one(&self, id: &ConversationId) {
        self.state.lock().await.remember(id);
        self.join(id).await;
    }

    /// Replays every remembered room after the channel reached a new session.
    pub async fn rejoin(&self, epoch: u64) {
        let intent = {
            let mut state = self.state.lock().await;
            state.sync_epoch(epoch);
            state.intent.clone()
        };
        if intent.is_empty() {
            return;
        }
        info!(epoch, rooms = intent.len(), "membership: rejoining rooms");
        self.join_all(&intent).await;
    }

    pub async fn clear(&self) {
        *self.state.lock().await = MembershipState::default();
    }

    /// Returns `true` if a request was sent.
    async fn join(&self, id: &ConversationId) -> bool {
        if id.is_provisional() || id.is_unassigned() {
            return false;
        }
        let status = self.channel.status();
        if status.state != ConnectionState::Connected {
            debug!(conversation_id = %id, "membership: not connected; join deferred");
            return false;
        }
        {
            let mut state = self.state.lock().await;
            state.sync_epoch(status.epoch);
            if state.joined.contains(id) {
                return false;
            }
            // Claimed before the request so concurrent callers do not double up.
            state.joined.insert(id.clone());
        }

        match self
            .channel
            .invoke(hub_methods::JOIN_CONVERSATION, vec![json!(id)])
            .await
        {
            Ok(_) => debug!(conversation_id = %id, "membership: joined"),
            Err(err) if err.is_duplicate_join() => {
                debug!(conversation_id = %id, "membership: already joined")
            }
            Err(err) => {
                warn!(conversation_id = %id, error = %err, "membership: join failed");
                let mut state = self.state.lock().await;
                if state.epoch == status.epoch {
                    state.joined.remove(id);
                }
            }
        }
        true
    }
}

#[cfg(test)]
#[path = "tests/membership_tests.rs"]
mod tests;
