//! Realtime channel to the chat hub.

use async_trait::async_trait;
use serde_json::Value;
use shared::protocol::ServerEvent;
use thiserror::Error;
use tokio::sync::{broadcast, watch};

use crate::error::ClientError;

pub mod backoff;
pub mod connection;
pub mod hub_protocol;

pub use backoff::Backoff;
pub use connection::HubConnection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// Lost an established session; retrying with backoff.
    Reconnecting,
}

/// Connection state plus the session counter. `epoch` increases every time a
/// session reaches `Connected`, so observers can tell a fresh session (whose
/// server-side group membership is empty) from the one they already handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub epoch: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportProblem {
    #[error("invalid hub url: {0}")]
    InvalidServerUrl(String),
    #[error("no access token for the realtime connection")]
    MissingCredential,
    /// A pushed frame could not be decoded; the session continues.
    #[error("malformed hub event: {0}")]
    MalformedEvent(String),
}

#[derive(Debug, Clone)]
pub enum ChannelEvent {
    Server(ServerEvent),
    Problem(TransportProblem),
}

#[async_trait]
pub trait RealtimeChannel: Send + Sync {
    /// Invokes a hub method and waits for its completion.
    async fn invoke(&self, method: &str, arguments: Vec<Value>) -> Result<Value, ClientError>;
    fn status(&self) -> ConnectionStatus;
    fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus>;
    fn subscribe_events(&self) -> broadcast::Receiver<ChannelEvent>;
    /// Starts connecting in the background. Idempotent.
    fn start(&self);
    /// Stops the connection and any pending retry. Idempotent.
    async fn stop(&self);

    fn state(&self) -> ConnectionState {
        self.status().state
    }
}
