use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex as StdMutex, PoisonError,
    },
    time::Duration,
};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use shared::protocol::ServerEvent;
use tokio::{
    net::TcpStream,
    sync::{broadcast, mpsc, oneshot, watch, Mutex},
    task::JoinHandle,
    time::{sleep, sleep_until, timeout, Instant},
};
use tokio_tungstenite::{
    connect_async, tungstenite::Message as WsMessage, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};
use url::Url;

use super::{
    backoff::Backoff,
    hub_protocol::{self, HubMessage},
    ChannelEvent, ConnectionState, ConnectionStatus, RealtimeChannel, TransportProblem,
};
use crate::{config::ClientSettings, credentials::CredentialSource, error::ClientError};

type HubSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type PendingInvocations = HashMap<String, oneshot::Sender<Result<Value, ClientError>>>;

#[derive(Debug, Clone)]
pub struct HubConnectionConfig {
    pub hub_url: String,
    pub reconnect_delays_ms: Vec<u64>,
    pub keepalive_interval: Duration,
    pub server_timeout: Duration,
    pub event_buffer: usize,
}

impl From<&ClientSettings> for HubConnectionConfig {
    fn from(settings: &ClientSettings) -> Self {
        Self {
            hub_url: settings.hub_url.clone(),
            reconnect_delays_ms: settings.reconnect_delays_ms.clone(),
            keepalive_interval: settings.keepalive_interval(),
            server_timeout: settings.server_timeout(),
            event_buffer: settings.event_buffer.max(1),
        }
    }
}

/// Realtime session to the hub with automatic reconnect.
pub struct HubConnection {
    shared: Arc<HubShared>,
    task: StdMutex<Option<JoinHandle<()>>>,
}

struct HubShared {
    config: HubConnectionConfig,
    credentials: Arc<dyn CredentialSource>,
    status: watch::Sender<ConnectionStatus>,
    events: broadcast::Sender<ChannelEvent>,
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    pending: Mutex<PendingInvocations>,
    next_invocation: AtomicU64,
}

enum SessionEnd {
    Dropped(String),
    ClosedByServer(Option<String>),
}

impl HubConnection {
    pub fn new(config: HubConnectionConfig, credentials: Arc<dyn CredentialSource>) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::default());
        let (events, _) = broadcast::channel(config.event_buffer);
        Self {
            shared: Arc::new(HubShared {
                config,
                credentials,
                status,
                events,
                outbound: Mutex::new(None),
                pending: Mutex::new(HashMap::new()),
                next_invocation: AtomicU64::new(1),
            }),
            task: StdMutex::new(None),
        }
    }
}

/// Builds the WebSocket URL for the hub, carrying the token as the
/// `access_token` query parameter.
pub fn build_hub_url(raw: &str, token: &str) -> Result<Url, ClientError> {
    let invalid = |reason: String| ClientError::InvalidServerUrl {
        url: raw.to_string(),
        reason,
    };
    let mut url = Url::parse(raw).map_err(|err| invalid(err.to_string()))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(invalid(format!("unsupported scheme '{other}'"))),
    };
    url.set_scheme(scheme)
        .map_err(|()| invalid(format!("cannot switch to {scheme}")))?;
    let retained: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != "access_token")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(retained)
        .append_pair("access_token", token);
    Ok(url)
}

impl HubShared {
    fn set_state(&self, state: ConnectionState) {
        self.status.send_if_modified(|status| {
            if status.state == state {
                return false;
            }
            status.state = state;
            true
        });
    }

    fn publish(&self, event: ChannelEvent) {
        let _ = self.events.send(event);
    }

    async fn fail_pending(&self) {
        let pending = std::mem::take(&mut *self.pending.lock().await);
        for (_, waiter) in pending {
            let _ = waiter.send(Err(ClientError::Closed));
        }
    }

    async fn open_socket(&self) -> Result<(HubSocket, Vec<String>), ClientError> {
        let token = self
            .credentials
            .access_token()
            .await
            .ok_or(ClientError::MissingCredential)?;
        let url = build_hub_url(&self.config.hub_url, &token)?;
        let limit = self.config.server_timeout;

        let (mut socket, _) = timeout(limit, connect_async(url.as_str()))
            .await
            .map_err(|_| ClientError::Hub("connect timed out".into()))?
            .map_err(|err| ClientError::Hub(format!("connect failed: {err}")))?;

        socket
            .send(WsMessage::Text(hub_protocol::handshake_request()?))
            .await
            .map_err(|err| ClientError::Hub(format!("handshake send failed: {err}")))?;

        let deadline = Instant::now() + limit;
        loop {
            let frame = timeout(deadline.saturating_duration_since(Instant::now()), socket.next())
                .await
                .map_err(|_| ClientError::Hub("handshake timed out".into()))?;
            match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    let mut records = hub_protocol::split_records(&text);
                    let Some(first) = records.next() else {
                        continue;
                    };
                    hub_protocol::parse_handshake_response(first)?;
                    let leftover = records.map(str::to_string).collect();
                    return Ok((socket, leftover));
                }
                Some(Ok(WsMessage::Close(_))) | None => {
                    return Err(ClientError::Hub("closed during handshake".into()))
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    return Err(ClientError::Hub(format!("handshake failed: {err}")))
                }
            }
        }
    }

    /// Handles one inbound record. Returns `Some` when the server ended the
    /// session.
    async fn handle_record(&self, record: &str) -> Option<SessionEnd> {
        let message = match hub_protocol::decode_record(record) {
            Ok(message) => message,
            Err(err) => {
                warn!(error = %err, "hub: dropping undecodable record");
                self.publish(ChannelEvent::Problem(TransportProblem::MalformedEvent(
                    err.to_string(),
                )));
                return None;
            }
        };
        match message {
            HubMessage::Invocation {
                target, arguments, ..
            } => match ServerEvent::from_invocation(&target, &arguments) {
                Ok(Some(event)) => self.publish(ChannelEvent::Server(event)),
                Ok(None) => debug!(method = %target, "hub: ignoring unknown invocation"),
                Err(err) => {
                    warn!(method = %target, error = %err, "hub: dropping malformed event");
                    self.publish(ChannelEvent::Problem(TransportProblem::MalformedEvent(
                        err.to_string(),
                    )));
                }
            },
            HubMessage::Completion {
                invocation_id,
                result,
                error,
            } => {
                let waiter = self.pending.lock().await.remove(&invocation_id);
                match waiter {
                    Some(waiter) => {
                        let outcome = match error {
                            Some(error) => Err(ClientError::Hub(error)),
                            None => Ok(result.unwrap_or(Value::Null)),
                        };
                        let _ = waiter.send(outcome);
                    }
                    None => debug!(invocation_id = %invocation_id, "hub: completion for unknown invocation"),
                }
            }
            HubMessage::Ping => {}
            HubMessage::Close { error, .. } => return Some(SessionEnd::ClosedByServer(error)),
            HubMessage::Other(kind) => debug!(kind, "hub: ignoring record type"),
        }
        None
    }

    async fn run_session(&self, socket: HubSocket, leftover: Vec<String>) -> SessionEnd {
        let (mut write, mut read) = socket.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        *self.outbound.lock().await = Some(outbound_tx);

        self.status.send_modify(|status| {
            status.state = ConnectionState::Connected;
            status.epoch += 1;
        });
        info!(epoch = self.status.borrow().epoch, "hub: connected");

        for record in &leftover {
            if let Some(end) = self.handle_record(record).await {
                return end;
            }
        }

        let server_timeout = self.config.server_timeout;
        let mut keepalive = tokio::time::interval(self.config.keepalive_interval);
        keepalive.tick().await;
        let mut deadline = Instant::now() + server_timeout;

        loop {
            tokio::select! {
                Some(text) = outbound_rx.recv() => {
                    if let Err(err) = write.send(WsMessage::Text(text)).await {
                        return SessionEnd::Dropped(format!("send failed: {err}"));
                    }
                }
                _ = keepalive.tick() => {
                    let ping = match hub_protocol::encode(&HubMessage::Ping) {
                        Ok(ping) => ping,
                        Err(err) => return SessionEnd::Dropped(err.to_string()),
                    };
                    if let Err(err) = write.send(WsMessage::Text(ping)).await {
                        return SessionEnd::Dropped(format!("keepalive failed: {err}"));
                    }
                }
                _ = sleep_until(deadline) => {
                    return SessionEnd::Dropped("server timeout elapsed".into());
                }
                frame = read.next() => {
                    match frame {
                        Some(Ok(WsMessage::Text(text))) => {
                            deadline = Instant::now() + server_timeout;
                            for record in hub_protocol::split_records(&text) {
                                if let Some(end) = self.handle_record(record).await {
                                    return end;
                                }
                            }
                        }
                        Some(Ok(WsMessage::Close(_))) | None => {
                            return SessionEnd::Dropped("socket closed".into());
                        }
                        Some(Ok(_)) => {
                            deadline = Instant::now() + server_timeout;
                        }
                        Some(Err(err)) => {
                            return SessionEnd::Dropped(format!("receive failed: {err}"));
                        }
                    }
                }
            }
        }
    }

    async fn end_session(&self) {
        *self.outbound.lock().await = None;
        self.fail_pending().await;
    }
}

async fn connection_loop(shared: Arc<HubShared>) {
    let mut backoff = Backoff::new(&shared.config.reconnect_delays_ms);
    let mut established = false;
    let mut reported: Option<TransportProblem> = None;

    loop {
        shared.set_state(if established {
            ConnectionState::Reconnecting
        } else {
            ConnectionState::Connecting
        });

        match shared.open_socket().await {
            Ok((socket, leftover)) => {
                backoff.reset();
                reported = None;
                let end = shared.run_session(socket, leftover).await;
                shared.end_session().await;
                established = true;
                shared.set_state(ConnectionState::Reconnecting);
                match end {
                    SessionEnd::Dropped(reason) => {
                        warn!(reason = %reason, "hub: connection dropped")
                    }
                    SessionEnd::ClosedByServer(error) => {
                        warn!(error = error.as_deref().unwrap_or(""), "hub: server closed the session")
                    }
                }
            }
            Err(err) => {
                let problem = match &err {
                    ClientError::InvalidServerUrl { url, .. } => {
                        Some(TransportProblem::InvalidServerUrl(url.clone()))
                    }
                    ClientError::MissingCredential => Some(TransportProblem::MissingCredential),
                    _ => None,
                };
                match problem {
                    Some(problem) if reported.as_ref() != Some(&problem) => {
                        warn!(error = %err, "hub: cannot connect; will keep retrying");
                        shared.publish(ChannelEvent::Problem(problem.clone()));
                        reported = Some(problem);
                    }
                    _ => debug!(error = %err, attempt = backoff.attempt(), "hub: connect attempt failed"),
                }
                if !established {
                    shared.set_state(ConnectionState::Disconnected);
                }
            }
        }

        let delay = backoff.next_delay();
        debug!(delay_ms = delay.as_millis() as u64, "hub: retry scheduled");
        sleep(delay).await;
    }
}

#[async_trait]
impl RealtimeChannel for HubConnection {
    async fn invoke(&self, method: &str, arguments: Vec<Value>) -> Result<Value, ClientError> {
        let sender = self
            .shared
            .outbound
            .lock()
            .await
            .clone()
            .ok_or(ClientError::NotConnected)?;
        let invocation_id = self
            .shared
            .next_invocation
            .fetch_add(1, Ordering::Relaxed)
            .to_string();
        let frame = hub_protocol::encode(&HubMessage::Invocation {
            invocation_id: Some(invocation_id.clone()),
            target: method.to_string(),
            arguments,
        })?;

        let (tx, rx) = oneshot::channel();
        self.shared
            .pending
            .lock()
            .await
            .insert(invocation_id.clone(), tx);
        if sender.send(frame).is_err() {
            self.shared.pending.lock().await.remove(&invocation_id);
            return Err(ClientError::NotConnected);
        }

        match timeout(self.shared.config.server_timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(ClientError::Closed),
            Err(_) => {
                self.shared.pending.lock().await.remove(&invocation_id);
                Err(ClientError::Hub(format!("{method} timed out")))
            }
        }
    }

    fn status(&self) -> ConnectionStatus {
        *self.shared.status.borrow()
    }

    fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.status.subscribe()
    }

    fn subscribe_events(&self) -> broadcast::Receiver<ChannelEvent> {
        self.shared.events.subscribe()
    }

    fn start(&self) {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        info!(hub_url = %self.shared.config.hub_url, "hub: starting connection");
        *task = Some(tokio::spawn(connection_loop(Arc::clone(&self.shared))));
    }

    async fn stop(&self) {
        let handle = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
            info!("hub: stopped");
        }
        self.shared.end_session().await;
        self.shared.set_state(ConnectionState::Disconnected);
    }
}

impl Drop for HubConnection {
    fn drop(&mut self) {
        if let Some(handle) = self
            .task
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}

#[cfg(test)]
#[path = "../tests/connection_tests.rs"]
mod tests;
