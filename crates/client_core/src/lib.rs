pub mod api;
pub mod config;
pub mod credentials;
mod engine;
pub mod error;
pub mod events;
pub mod membership;
pub mod normalize;
pub mod presence;
pub mod reconciler;
pub mod store;
pub mod transport;
pub mod types;
pub mod unread;

pub use engine::SyncEngine;
pub use error::{ClientError, EngineError};
pub use events::{ClientEvent, ConversationView, EngineSnapshot};
pub use transport::{ConnectionState, ConnectionStatus};
pub use types::{ConversationRef, DeliveryState, Message, Presence};

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;
