use std::{
    future::Future,
    sync::{Arc, Mutex as SyncMutex, PoisonError},
    time::Duration,
};

use chrono::Utc;
use futures::Stream;
use serde_json::{json, Value};
use shared::{
    domain::{ConversationId, DraftId, UserId},
    protocol::{hub_methods, CurrentUser, MessageType, SendMessageRequest, ServerEvent, UserSearchResult},
};
use tokio::{
    sync::{broadcast, watch, Mutex},
    task::{JoinHandle, JoinSet},
    time::MissedTickBehavior,
};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    api::{ChatApi, HttpChatApi},
    config::ClientSettings,
    credentials::CookieCredentials,
    error::{ClientError, EngineError},
    events::{event_stream, ClientEvent, ConversationView, EngineSnapshot},
    membership::RoomMembership,
    normalize,
    presence::PresenceTracker,
    reconciler::{Effects, Followup, Reconciler},
    store::ConversationStore,
    transport::{
        connection::HubConnectionConfig, ChannelEvent, ConnectionState, ConnectionStatus,
        HubConnection, RealtimeChannel,
    },
    types::{ConversationRef, Message, Presence},
    unread::UnreadTracker,
};

#[derive(Debug, Default)]
struct RefreshState {
    in_flight: bool,
    /// Another refresh was requested while one was running.
    dirty: bool,
}

#[derive(Debug, Default)]
struct EngineState {
    current_user: Option<CurrentUser>,
    /// Bumped whenever the user signs in or out. Responses to requests made
    /// under an older value are dropped.
    session: u64,
    store: ConversationStore,
    unread: UnreadTracker,
    presence: PresenceTracker,
    refresh: RefreshState,
}

impl EngineState {
    fn reset(&mut self, user: Option<CurrentUser>) {
        self.current_user = user;
        self.session = self.session.wrapping_add(1);
        self.store.clear();
        self.unread.clear();
        self.presence.clear();
        self.refresh = RefreshState::default();
    }

    fn self_id(&self) -> Option<&UserId> {
        self.current_user.as_ref().map(|user| &user.id)
    }

    fn reconcile(&mut self, step: impl FnOnce(&mut Reconciler<'_>)) -> Effects {
        let self_id = self.current_user.as_ref().map(|user| &user.id);
        let mut reconciler = Reconciler::new(&mut self.store, &mut self.unread, self_id);
        step(&mut reconciler);
        reconciler.finish()
    }
}

/// Owns all conversation state and is its only writer. Views observe it
/// through [`SyncEngine::subscribe`] and [`SyncEngine::snapshot`].
pub struct SyncEngine {
    api: Arc<dyn ChatApi>,
    channel: Arc<dyn RealtimeChannel>,
    membership: RoomMembership,
    settings: ClientSettings,
    inner: Mutex<EngineState>,
    events: broadcast::Sender<ClientEvent>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    /// Follow-up work (refreshes, joins, receipts, presence queries). Aborted
    /// on stop.
    background: SyncMutex<JoinSet<()>>,
}

impl SyncEngine {
    pub fn new(
        settings: ClientSettings,
        api: Arc<dyn ChatApi>,
        channel: Arc<dyn RealtimeChannel>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(settings.event_buffer.max(1));
        Arc::new(Self {
            membership: RoomMembership::new(Arc::clone(&channel), settings.join_stagger()),
            api,
            channel,
            settings,
            inner: Mutex::new(EngineState::default()),
            events,
            tasks: Mutex::new(Vec::new()),
            background: SyncMutex::new(JoinSet::new()),
        })
    }

    /// Wires the HTTP client and the hub connection to one cookie session.
    pub fn from_settings(settings: ClientSettings) -> Result<Arc<Self>, ClientError> {
        let origin =
            Url::parse(&settings.api_base_url).map_err(|err| ClientError::InvalidServerUrl {
                url: settings.api_base_url.clone(),
                reason: err.to_string(),
            })?;
        let credentials = Arc::new(CookieCredentials::new(
            Arc::default(),
            origin,
            settings.access_token_cookie.clone(),
        ));
        let api = HttpChatApi::new(&settings.api_base_url, Arc::clone(&credentials))?;
        let channel = HubConnection::new(HubConnectionConfig::from(&settings), credentials);
        Ok(Self::new(settings, Arc::new(api), Arc::new(channel)))
    }

    pub fn subscribe(&self) -> impl Stream<Item = ClientEvent> + Send + Unpin + 'static {
        event_stream(self.events.subscribe())
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.channel.state()
    }

    fn publish(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }

    fn spawn_background(&self, task: impl Future<Output = ()> + Send + 'static) {
        let mut background = self.background.lock().unwrap_or_else(PoisonError::into_inner);
        while background.try_join_next().is_some() {}
        background.spawn(task);
    }

    fn take_background(&self) -> JoinSet<()> {
        std::mem::take(&mut *self.background.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Aborts follow-up work, including anything it spawned before dying.
    async fn cancel_background(&self) {
        loop {
            let mut pending = self.take_background();
            if pending.is_empty() {
                return;
            }
            pending.abort_all();
            while pending.join_next().await.is_some() {}
        }
    }

    async fn is_current(&self, session: u64) -> bool {
        let current = self.inner.lock().await.session == session;
        if !current {
            debug!(session, "sync: discarding a response from an ended session");
        }
        current
    }

    /// Transient failures are logged and reported as diagnostics; only an
    /// expired session reaches the caller.
    fn absorb_failure(&self, operation: &str, err: ClientError) -> Result<(), EngineError> {
        if err.is_session_expired() {
            warn!(operation, "sync: session expired");
            self.publish(ClientEvent::SessionExpired);
            return Err(EngineError::SessionExpired);
        }
        warn!(operation, error = %err, "sync: request failed");
        self.publish(ClientEvent::Error(format!("{operation} failed: {err}")));
        Ok(())
    }

    /// Starts the realtime channel and the background tasks. Idempotent.
    pub async fn start(self: &Arc<Self>) {
        let mut tasks = self.tasks.lock().await;
        if !tasks.is_empty() {
            return;
        }
        // Subscribed before the channel starts so nothing is missed.
        let events = self.channel.subscribe_events();
        let status = self.channel.subscribe_status();
        tasks.push(tokio::spawn(Arc::clone(self).pump_channel_events(events)));
        tasks.push(tokio::spawn(Arc::clone(self).watch_status(status)));
        if let Some(every) = self.settings.summary_refresh_interval() {
            tasks.push(tokio::spawn(Arc::clone(self).refresh_periodically(every)));
        }
        drop(tasks);
        info!("sync: engine started");
        self.channel.start();
    }

    /// Stops background work and the channel. State is kept.
    pub async fn stop(&self) {
        let tasks: Vec<_> = self.tasks.lock().await.drain(..).collect();
        for task in &tasks {
            task.abort();
        }
        for task in tasks {
            let _ = task.await;
        }
        self.cancel_background().await;
        self.channel.stop().await;
        self.inner.lock().await.refresh = RefreshState::default();
        self.publish(ClientEvent::ConnectionStateChanged(self.channel.state()));
        info!("sync: engine stopped");
    }

    pub async fn sign_in(
        self: &Arc<Self>,
        email: &str,
        password: &str,
    ) -> Result<CurrentUser, EngineError> {
        let user = match self.api.login(email, password).await {
            Ok(user) => user,
            Err(err) => {
                warn!(error = %err, "auth: sign-in failed");
                return Err(EngineError::SignIn(err.to_string()));
            }
        };
        self.begin_session(user.clone()).await?;
        Ok(user)
    }

    /// Resumes a session still held by the cookie jar. `None` if there is none.
    pub async fn restore_session(self: &Arc<Self>) -> Result<Option<CurrentUser>, EngineError> {
        match self.api.current_user().await {
            Ok(user) => {
                self.begin_session(user.clone()).await?;
                Ok(Some(user))
            }
            Err(ClientError::SessionExpired | ClientError::Unauthorized) => {
                debug!("auth: no session to restore");
                Ok(None)
            }
            Err(err) => {
                self.absorb_failure("restore session", err)?;
                Ok(None)
            }
        }
    }

    async fn begin_session(self: &Arc<Self>, user: CurrentUser) -> Result<(), EngineError> {
        self.inner.lock().await.reset(Some(user.clone()));
        self.membership.clear().await;
        info!(user_id = %user.id, "auth: signed in");
        self.publish(ClientEvent::SignedIn(user));
        self.start().await;
        self.load_conversation_list().await
    }

    pub async fn sign_out(&self) {
        if let Err(err) = self.api.logout().await {
            warn!(error = %err, "auth: logout request failed");
        }
        self.stop().await;
        self.inner.lock().await.reset(None);
        self.membership.clear().await;
        info!("auth: signed out");
        self.publish(ClientEvent::SignedOut);
    }

    /// Fetches the summary list and replaces the stored one. Concurrent
    /// requests collapse into at most one follow-up fetch, which still runs
    /// after a transient failure; an expired session ends the loop.
    pub async fn load_conversation_list(self: &Arc<Self>) -> Result<(), EngineError> {
        let session = {
            let mut state = self.inner.lock().await;
            if state.refresh.in_flight {
                state.refresh.dirty = true;
                debug!("sync: list refresh already running; coalesced");
                return Ok(());
            }
            state.refresh.in_flight = true;
            state.session
        };
        loop {
            let result = self.fetch_conversation_list(session).await;
            let mut state = self.inner.lock().await;
            if state.session != session {
                // The refresh flags belong to the new session now.
                return Ok(());
            }
            if result.is_err() || !state.refresh.dirty {
                state.refresh.in_flight = false;
                return result;
            }
            state.refresh.dirty = false;
        }
    }

    async fn fetch_conversation_list(self: &Arc<Self>, session: u64) -> Result<(), EngineError> {
        let records = match self.api.user_conversations().await {
            Ok(records) => records,
            Err(err) => return self.absorb_failure("conversation list", err),
        };

        let (flipped, persisted) = {
            let mut guard = self.inner.lock().await;
            if guard.session != session {
                debug!(session, "sync: discarding a conversation list from an ended session");
                return Ok(());
            }
            let state = &mut *guard;
            let summaries = normalize::conversation_summaries(&records, state.self_id());
            state.store.replace_summaries(summaries);

            let self_id = state.current_user.as_ref().map(|user| &user.id);
            let flags: Vec<(ConversationId, bool)> = state
                .store
                .conversations()
                .iter()
                .filter(|c| !c.is_provisional)
                .map(|c| (c.id.clone(), c.has_unread_last_message(self_id)))
                .collect();
            let flipped = state.unread.seed(
                flags.iter().map(|(id, unread)| (id, *unread)),
                state.store.open_id(),
            );
            (flipped, state.store.persisted_ids())
        };

        debug!(conversations = persisted.len(), "sync: conversation list loaded");
        self.publish(ClientEvent::ConversationsUpdated);
        for (conversation_id, unread) in flipped {
            self.publish(ClientEvent::UnreadChanged {
                conversation_id,
                unread,
            });
        }

        let engine = Arc::clone(self);
        self.spawn_background(async move { engine.membership.join_all(&persisted).await });
        Ok(())
    }

    /// Opens a conversation, creating a provisional one for a user with no
    /// conversation yet. Returns the id now open.
    pub async fn open_conversation(
        self: &Arc<Self>,
        target: ConversationRef,
    ) -> Result<ConversationId, EngineError> {
        let (id, peer, is_provisional, list_changed, now_read) = {
            let mut state = self.inner.lock().await;
            let before = state.store.conversations().len();
            let id = match target {
                ConversationRef::Existing(id) => id,
                ConversationRef::User {
                    user_id,
                    display_name,
                } => {
                    let existing = state.store.find_by_peer(&user_id).map(|c| c.id.clone());
                    match existing {
                        Some(id) => id,
                        None => state.store.ensure_provisional(user_id, &display_name),
                    }
                }
            };
            if !state.store.open(&id) {
                return Err(EngineError::UnknownConversation(id));
            }
            let now_read = state.unread.mark_read(&id);
            let conversation = state.store.open_conversation();
            let peer = conversation.and_then(|c| c.peer_id.clone());
            let is_provisional = conversation.is_some_and(|c| c.is_provisional);
            let list_changed = state.store.conversations().len() != before;
            (id, peer, is_provisional, list_changed, now_read)
        };

        info!(conversation_id = %id, provisional = is_provisional, "sync: conversation opened");
        if list_changed {
            self.publish(ClientEvent::ConversationsUpdated);
        }
        if now_read {
            self.publish(ClientEvent::UnreadChanged {
                conversation_id: id.clone(),
                unread: false,
            });
        }
        self.publish(ClientEvent::ConversationOpened(id.clone()));

        if let Some(peer) = peer.clone() {
            let engine = Arc::clone(self);
            self.spawn_background(async move {
                engine.query_status(&peer).await;
            });
        }
        if is_provisional {
            // Nothing exists server-side until the first send.
            return Ok(id);
        }

        let engine = Arc::clone(self);
        let read_id = id.clone();
        self.spawn_background(async move { engine.mark_as_read(&read_id).await });

        let detail = async {
            match &peer {
                Some(peer) => self.refresh_detail(&id, peer).await,
                None => {
                    warn!(conversation_id = %id, "sync: conversation has no peer; detail not fetched");
                    Ok(())
                }
            }
        };
        let (_, detail) = tokio::join!(self.membership.join_one(&id), detail);
        detail?;
        Ok(id)
    }

    /// Fetches detail for `requested` (keyed by its peer) and merges it if
    /// `requested` is still open when the response lands.
    async fn refresh_detail(
        self: &Arc<Self>,
        requested: &ConversationId,
        peer: &UserId,
    ) -> Result<(), EngineError> {
        let session = self.inner.lock().await.session;
        let record = match self.api.private_conversation(peer).await {
            Ok(record) => record,
            Err(err) => return self.absorb_failure("conversation detail", err),
        };
        let effects = {
            let mut state = self.inner.lock().await;
            if state.session != session {
                debug!(session, conversation_id = %requested, "sync: discarding detail from an ended session");
                return Ok(());
            }
            let detail = match record {
                Some(record) => match normalize::conversation_detail(&record, state.self_id()) {
                    Ok(detail) => Some(detail),
                    Err(err) => {
                        warn!(conversation_id = %requested, error = %err, "sync: dropping malformed conversation detail");
                        None
                    }
                },
                None => None,
            };
            state.reconcile(|r| r.apply_detail(requested, detail))
        };
        self.dispatch(effects);
        Ok(())
    }

    /// Sends `body` to the open conversation. The draft is shown immediately
    /// and later confirmed or marked failed.
    pub async fn send_message(self: &Arc<Self>, body: &str) -> Result<DraftId, EngineError> {
        let body = body.trim();
        if body.is_empty() {
            return Err(EngineError::EmptyMessage);
        }

        let (session, draft_id, local_id, request, effects) = {
            let mut state = self.inner.lock().await;
            let sender = state
                .self_id()
                .cloned()
                .ok_or(EngineError::SessionExpired)?;
            let conversation = state
                .store
                .open_conversation()
                .ok_or(EngineError::NoOpenConversation)?;
            let local_id = conversation.id.clone();
            let recipient_id = conversation
                .peer_id
                .clone()
                .ok_or_else(|| EngineError::UnknownRecipient(local_id.clone()))?;
            let wire_id = if conversation.is_provisional {
                ConversationId::unassigned()
            } else {
                local_id.clone()
            };

            let draft_id = DraftId::new();
            let draft = Message::draft(draft_id, local_id.clone(), sender, body, Utc::now());
            let effects = state.reconcile(|r| r.apply_outgoing_send(draft));
            let request = SendMessageRequest {
                content: body.to_string(),
                recipient_id,
                conversation_id: wire_id,
                message_type: MessageType::Text,
            };
            (state.session, draft_id, local_id, request, effects)
        };
        self.dispatch(effects);

        let confirmed = self
            .api
            .send_message(&request)
            .await
            .and_then(|record| {
                normalize::message(&record, Some(&local_id))
                    .map_err(|err| ClientError::Decode(err.to_string()))
            });
        if !self.is_current(session).await {
            return Ok(draft_id);
        }
        match confirmed {
            Ok(message) => {
                debug!(
                    conversation_id = %local_id,
                    persisted = %message.conversation_id,
                    "sync: send confirmed"
                );
                let effects = self
                    .inner
                    .lock()
                    .await
                    .reconcile(|r| r.apply_send_confirmed(draft_id, &local_id, message));
                self.dispatch(effects);
            }
            Err(err) => {
                let effects = self
                    .inner
                    .lock()
                    .await
                    .reconcile(|r| r.apply_send_failed(draft_id, &local_id));
                self.dispatch(effects);
                self.absorb_failure("send message", err)?;
            }
        }
        Ok(draft_id)
    }

    /// Terms shorter than the configured minimum return nothing without a request.
    pub async fn search_users(&self, term: &str) -> Result<Vec<UserSearchResult>, EngineError> {
        let term = term.trim();
        if term.chars().count() < self.settings.min_search_len {
            return Ok(Vec::new());
        }
        match self.api.search_users(term).await {
            Ok(results) => Ok(results),
            Err(err) => {
                self.absorb_failure("user search", err)?;
                Ok(Vec::new())
            }
        }
    }

    /// Asks the hub whether `user_id` is online. Without a connection the
    /// known status (possibly `Unknown`) is returned unchanged.
    pub async fn query_status(&self, user_id: &UserId) -> Presence {
        if self.channel.state() != ConnectionState::Connected {
            debug!(user_id = %user_id, "sync: not connected; presence query skipped");
            return self.inner.lock().await.presence.status(user_id);
        }
        let (session, query) = {
            let mut state = self.inner.lock().await;
            (state.session, state.presence.begin_query(user_id))
        };
        let answer = self
            .channel
            .invoke(hub_methods::IS_THIS_USER_ONLINE, vec![json!(user_id)])
            .await;

        let mut state = self.inner.lock().await;
        if state.session != session {
            return Presence::Unknown;
        }
        match answer {
            Ok(Value::Bool(is_online)) => {
                if let Some(presence) = state.presence.complete_query(&query, is_online) {
                    self.publish(ClientEvent::PresenceChanged {
                        user_id: user_id.clone(),
                        presence,
                    });
                }
            }
            Ok(other) => {
                warn!(user_id = %user_id, answer = %other, "sync: unexpected presence answer")
            }
            Err(err) => warn!(user_id = %user_id, error = %err, "sync: presence query failed"),
        }
        state.presence.status(user_id)
    }

    /// Fire-and-forget read receipt for a persisted conversation.
    pub async fn mark_as_read(&self, conversation_id: &ConversationId) {
        if conversation_id.is_provisional() || conversation_id.is_unassigned() {
            return;
        }
        if self.channel.state() != ConnectionState::Connected {
            debug!(conversation_id = %conversation_id, "sync: not connected; read receipt skipped");
            return;
        }
        if let Err(err) = self
            .channel
            .invoke(hub_methods::MARK_AS_READ, vec![json!(conversation_id)])
            .await
        {
            warn!(conversation_id = %conversation_id, error = %err, "sync: mark as read failed");
        }
    }

    pub async fn snapshot(&self) -> EngineSnapshot {
        let state = self.inner.lock().await;
        let conversations = state
            .store
            .conversations()
            .iter()
            .map(|conversation| ConversationView {
                unread: state.unread.contains(&conversation.id),
                peer_presence: conversation
                    .peer_id
                    .as_ref()
                    .map_or(Presence::Unknown, |peer| state.presence.status(peer)),
                conversation: conversation.clone(),
            })
            .collect();
        EngineSnapshot {
            current_user: state.current_user.clone(),
            connection: self.channel.state(),
            conversations,
            open_conversation: state.store.open_id().cloned(),
            messages: state
                .store
                .open_messages()
                .map(|list| list.as_slice().to_vec())
                .unwrap_or_default(),
        }
    }

    async fn handle_server_event(self: &Arc<Self>, event: ServerEvent) {
        match event {
            ServerEvent::ReceiveMessage(record) => {
                let message = match normalize::message(&record, None) {
                    Ok(message) => message,
                    Err(err) => {
                        warn!(error = %err, "sync: dropping malformed pushed message");
                        return;
                    }
                };
                let effects = self
                    .inner
                    .lock()
                    .await
                    .reconcile(|r| r.apply_pushed_message(message));
                self.dispatch(effects);
            }
            ServerEvent::MessagesRead { conversation_id } => {
                let effects = self
                    .inner
                    .lock()
                    .await
                    .reconcile(|r| r.apply_messages_read(&conversation_id));
                self.dispatch(effects);
            }
            ServerEvent::UserStatusChanged { user_id, is_online } => {
                let changed = self
                    .inner
                    .lock()
                    .await
                    .presence
                    .on_status_changed(&user_id, is_online);
                if let Some(presence) = changed {
                    self.publish(ClientEvent::PresenceChanged { user_id, presence });
                }
            }
        }
    }

    /// Publishes reconciliation events and starts follow-up work in the
    /// background.
    fn dispatch(self: &Arc<Self>, effects: Effects) {
        for event in effects.events {
            self.publish(event);
        }
        for followup in effects.followups {
            let engine = Arc::clone(self);
            match followup {
                Followup::RefreshSummaries => {
                    self.spawn_background(async move {
                        let _ = engine.load_conversation_list().await;
                    });
                }
                Followup::MarkAsRead(id) => {
                    self.spawn_background(async move { engine.mark_as_read(&id).await });
                }
                Followup::Join(id) => {
                    self.spawn_background(async move { engine.membership.join_one(&id).await });
                }
                Followup::RefetchDetail(id) => {
                    self.spawn_background(async move {
                        let peer = engine
                            .inner
                            .lock()
                            .await
                            .store
                            .conversation(&id)
                            .and_then(|c| c.peer_id.clone());
                        if let Some(peer) = peer {
                            let _ = engine.refresh_detail(&id, &peer).await;
                        }
                    });
                }
            }
        }
    }

    async fn pump_channel_events(self: Arc<Self>, mut events: broadcast::Receiver<ChannelEvent>) {
        loop {
            match events.recv().await {
                Ok(ChannelEvent::Server(event)) => self.handle_server_event(event).await,
                Ok(ChannelEvent::Problem(problem)) => {
                    warn!(problem = %problem, "sync: realtime problem reported");
                    self.publish(ClientEvent::Error(problem.to_string()));
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "sync: fell behind the hub; resyncing");
                    let _ = self.load_conversation_list().await;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    async fn watch_status(self: Arc<Self>, mut status: watch::Receiver<ConnectionStatus>) {
        let mut last = *status.borrow_and_update();
        let mut handled_epoch = last.epoch;
        while status.changed().await.is_ok() {
            let current = *status.borrow_and_update();
            if current.state != last.state {
                info!(state = ?current.state, epoch = current.epoch, "sync: connection state changed");
                self.publish(ClientEvent::ConnectionStateChanged(current.state));
            }
            if current.state == ConnectionState::Connected && current.epoch != handled_epoch {
                handled_epoch = current.epoch;
                let engine = Arc::clone(&self);
                self.spawn_background(async move { engine.on_session_started(current.epoch).await });
            }
            last = current;
        }
    }

    /// A fresh hub session has no group membership and may have missed
    /// pushes: rejoin, then catch up through REST.
    async fn on_session_started(self: Arc<Self>, epoch: u64) {
        let open = {
            let state = self.inner.lock().await;
            if state.current_user.is_none() {
                return;
            }
            state
                .store
                .open_conversation()
                .filter(|c| !c.is_provisional)
                .map(|c| (c.id.clone(), c.peer_id.clone()))
        };
        self.membership.rejoin(epoch).await;
        let _ = self.load_conversation_list().await;
        if let Some((id, Some(peer))) = open {
            let _ = self.refresh_detail(&id, &peer).await;
            self.query_status(&peer).await;
        }
    }

    async fn refresh_periodically(self: Arc<Self>, every: Duration) {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let signed_in = self.inner.lock().await.current_user.is_some();
            if signed_in && self.channel.state() == ConnectionState::Connected {
                debug!("sync: periodic list refresh");
                let _ = self.load_conversation_list().await;
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/engine_tests.rs"]
mod tests;
