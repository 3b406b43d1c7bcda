//! Trait fakes shared by the engine and membership suites.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use serde_json::Value;
use shared::{
    domain::UserId,
    protocol::{
        ConversationRecord, CurrentUser, MessageRecord, SendMessageRequest, ServerEvent,
        UserSearchResult,
    },
};
use tokio::sync::{broadcast, oneshot, watch};

use crate::{
    api::ChatApi,
    error::ClientError,
    transport::{ChannelEvent, ConnectionState, ConnectionStatus, RealtimeChannel},
};

type Reply = Result<Value, ClientError>;

pub(crate) struct FakeChannel {
    status: watch::Sender<ConnectionStatus>,
    events: broadcast::Sender<ChannelEvent>,
    calls: Mutex<Vec<(String, Vec<Value>)>>,
    scripted: Mutex<HashMap<String, VecDeque<Reply>>>,
    held: Mutex<HashMap<String, oneshot::Receiver<Reply>>>,
    starts: Mutex<u32>,
}

impl FakeChannel {
    pub(crate) fn new() -> Arc<Self> {
        let (status, _) = watch::channel(ConnectionStatus::default());
        let (events, _) = broadcast::channel(256);
        Arc::new(Self {
            status,
            events,
            calls: Mutex::new(Vec::new()),
            scripted: Mutex::new(HashMap::new()),
            held: Mutex::new(HashMap::new()),
            starts: Mutex::new(0),
        })
    }

    /// Simulates a successful (re)connect: a new session epoch.
    pub(crate) fn connect(&self) {
        self.status.send_modify(|status| {
            status.state = ConnectionState::Connected;
            status.epoch += 1;
        });
    }

    pub(crate) fn drop_connection(&self) {
        self.status.send_modify(|status| status.state = ConnectionState::Reconnecting);
    }

    pub(crate) fn push(&self, event: ServerEvent) {
        let _ = self.events.send(ChannelEvent::Server(event));
    }

    pub(crate) fn script(&self, method: &str, reply: Reply) {
        self.scripted
            .lock()
            .unwrap()
            .entry(method.to_string())
            .or_default()
            .push_back(reply);
    }

    /// The next call to `method` waits until the returned sender fires.
    pub(crate) fn hold(&self, method: &str) -> oneshot::Sender<Reply> {
        let (tx, rx) = oneshot::channel();
        self.held.lock().unwrap().insert(method.to_string(), rx);
        tx
    }

    pub(crate) fn calls(&self, method: &str) -> Vec<Vec<Value>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == method)
            .map(|(_, arguments)| arguments.clone())
            .collect()
    }

    /// First string argument of every call to `method`.
    pub(crate) fn call_ids(&self, method: &str) -> Vec<String> {
        self.calls(method)
            .iter()
            .filter_map(|arguments| arguments.first()?.as_str().map(str::to_string))
            .collect()
    }

    pub(crate) fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub(crate) fn starts(&self) -> u32 {
        *self.starts.lock().unwrap()
    }
}

#[async_trait]
impl RealtimeChannel for FakeChannel {
    async fn invoke(&self, method: &str, arguments: Vec<Value>) -> Result<Value, ClientError> {
        if self.status().state != ConnectionState::Connected {
            return Err(ClientError::NotConnected);
        }
        self.calls
            .lock()
            .unwrap()
            .push((method.to_string(), arguments));
        let held = self.held.lock().unwrap().remove(method);
        if let Some(rx) = held {
            return rx.await.unwrap_or(Err(ClientError::Closed));
        }
        let scripted = self
            .scripted
            .lock()
            .unwrap()
            .get_mut(method)
            .and_then(VecDeque::pop_front);
        scripted.unwrap_or(Ok(Value::Null))
    }

    fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    fn subscribe_events(&self) -> broadcast::Receiver<ChannelEvent> {
        self.events.subscribe()
    }

    fn start(&self) {
        *self.starts.lock().unwrap() += 1;
    }

    async fn stop(&self) {
        self.status
            .send_modify(|status| status.state = ConnectionState::Disconnected);
    }
}

#[derive(Default)]
pub(crate) struct FakeApiState {
    pub(crate) conversations: Vec<ConversationRecord>,
    pub(crate) details: HashMap<String, ConversationRecord>,
    pub(crate) sends: Vec<SendMessageRequest>,
    pub(crate) send_replies: VecDeque<Result<MessageRecord, ClientError>>,
    pub(crate) list_calls: u32,
    pub(crate) detail_calls: Vec<String>,
    pub(crate) search_calls: Vec<String>,
    pub(crate) expired: bool,
}

#[derive(Default)]
pub(crate) struct FakeApi {
    pub(crate) state: Mutex<FakeApiState>,
    held_details: Mutex<HashMap<String, oneshot::Receiver<()>>>,
    held_list: Mutex<Option<oneshot::Receiver<()>>>,
}

impl FakeApi {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn with_state(&self, apply: impl FnOnce(&mut FakeApiState)) {
        apply(&mut self.state.lock().unwrap());
    }

    /// The next detail fetch for `peer` waits until the returned sender fires.
    pub(crate) fn hold_detail(&self, peer: &str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.held_details
            .lock()
            .unwrap()
            .insert(peer.to_string(), rx);
        tx
    }

    /// The next list fetch waits until the returned sender fires.
    pub(crate) fn hold_list(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.held_list.lock().unwrap() = Some(rx);
        tx
    }

    fn check_session(&self) -> Result<(), ClientError> {
        if self.state.lock().unwrap().expired {
            return Err(ClientError::SessionExpired);
        }
        Ok(())
    }
}

#[async_trait]
impl ChatApi for FakeApi {
    async fn login(&self, email: &str, _password: &str) -> Result<CurrentUser, ClientError> {
        if email.is_empty() {
            return Err(ClientError::Unauthorized);
        }
        Ok(CurrentUser {
            id: UserId::from("me"),
            name: "Me".into(),
            mail: email.to_string(),
        })
    }

    async fn logout(&self) -> Result<(), ClientError> {
        Ok(())
    }

    async fn current_user(&self) -> Result<CurrentUser, ClientError> {
        self.check_session()?;
        Ok(CurrentUser {
            id: UserId::from("me"),
            name: "Me".into(),
            mail: "me@example.com".into(),
        })
    }

    async fn user_conversations(&self) -> Result<Vec<ConversationRecord>, ClientError> {
        self.check_session()?;
        self.state.lock().unwrap().list_calls += 1;
        let held = self.held_list.lock().unwrap().take();
        if let Some(rx) = held {
            let _ = rx.await;
        }
        Ok(self.state.lock().unwrap().conversations.clone())
    }

    async fn private_conversation(
        &self,
        other_user_id: &UserId,
    ) -> Result<Option<ConversationRecord>, ClientError> {
        self.check_session()?;
        self.state
            .lock()
            .unwrap()
            .detail_calls
            .push(other_user_id.to_string());
        let held = self
            .held_details
            .lock()
            .unwrap()
            .remove(other_user_id.as_str());
        if let Some(rx) = held {
            let _ = rx.await;
        }
        Ok(self
            .state
            .lock()
            .unwrap()
            .details
            .get(other_user_id.as_str())
            .cloned())
    }

    async fn send_message(
        &self,
        request: &SendMessageRequest,
    ) -> Result<MessageRecord, ClientError> {
        self.check_session()?;
        let mut state = self.state.lock().unwrap();
        state.sends.push(request.clone());
        state
            .send_replies
            .pop_front()
            .unwrap_or(Err(ClientError::Http {
                status: 500,
                message: "no reply scripted".into(),
            }))
    }

    async fn search_users(&self, term: &str) -> Result<Vec<UserSearchResult>, ClientError> {
        self.state
            .lock()
            .unwrap()
            .search_calls
            .push(term.to_string());
        Ok(vec![UserSearchResult {
            id: UserId::from("u5"),
            name: format!("{term} match"),
        }])
    }
}
