//! JSON hub protocol framing: `0x1E`-terminated JSON records, a handshake
//! record first, then typed messages.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::ClientError;

pub const RECORD_SEPARATOR: char = '\u{1e}';

const INVOCATION: u8 = 1;
const COMPLETION: u8 = 3;
const PING: u8 = 6;
const CLOSE: u8 = 7;

#[derive(Debug, Clone, PartialEq)]
pub enum HubMessage {
    Invocation {
        invocation_id: Option<String>,
        target: String,
        arguments: Vec<Value>,
    },
    Completion {
        invocation_id: String,
        result: Option<Value>,
        error: Option<String>,
    },
    Ping,
    Close {
        error: Option<String>,
        allow_reconnect: bool,
    },
    /// Types this client never acts on (stream items, acks, sequence numbers).
    Other(u8),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMessage {
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default)]
    invocation_id: Option<String>,
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    arguments: Option<Vec<Value>>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    allow_reconnect: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct HandshakeResponse {
    #[serde(default)]
    error: Option<String>,
}

#[derive(Serialize)]
struct HandshakeRequest<'a> {
    protocol: &'a str,
    version: u32,
}

fn frame(value: &impl Serialize) -> Result<String, ClientError> {
    let mut text = serde_json::to_string(value)?;
    text.push(RECORD_SEPARATOR);
    Ok(text)
}

pub fn handshake_request() -> Result<String, ClientError> {
    frame(&HandshakeRequest {
        protocol: "json",
        version: 1,
    })
}

/// Validates the handshake record. An empty object is success.
pub fn parse_handshake_response(record: &str) -> Result<(), ClientError> {
    let response: HandshakeResponse = serde_json::from_str(record)?;
    match response.error {
        Some(error) => Err(ClientError::Hub(format!("handshake rejected: {error}"))),
        None => Ok(()),
    }
}

pub fn encode(message: &HubMessage) -> Result<String, ClientError> {
    let value = match message {
        HubMessage::Invocation {
            invocation_id,
            target,
            arguments,
        } => {
            let mut value = json!({
                "type": INVOCATION,
                "target": target,
                "arguments": arguments,
            });
            if let Some(id) = invocation_id {
                value["invocationId"] = json!(id);
            }
            value
        }
        HubMessage::Completion {
            invocation_id,
            result,
            error,
        } => {
            let mut value = json!({ "type": COMPLETION, "invocationId": invocation_id });
            if let Some(error) = error {
                value["error"] = json!(error);
            } else if let Some(result) = result {
                value["result"] = result.clone();
            }
            value
        }
        HubMessage::Ping => json!({ "type": PING }),
        HubMessage::Close {
            error,
            allow_reconnect,
        } => {
            let mut value = json!({ "type": CLOSE, "allowReconnect": allow_reconnect });
            if let Some(error) = error {
                value["error"] = json!(error);
            }
            value
        }
        HubMessage::Other(kind) => json!({ "type": kind }),
    };
    frame(&value)
}

/// Splits a text frame into its records. Trailing text without a separator
/// is treated as a final record, which some proxies produce by trimming.
pub fn split_records(frame: &str) -> impl Iterator<Item = &str> {
    frame
        .split(RECORD_SEPARATOR)
        .map(str::trim)
        .filter(|record| !record.is_empty())
}

pub fn decode_record(record: &str) -> Result<HubMessage, ClientError> {
    let raw: RawMessage = serde_json::from_str(record)?;
    let message = match raw.kind {
        INVOCATION => HubMessage::Invocation {
            invocation_id: raw.invocation_id,
            target: raw
                .target
                .ok_or_else(|| ClientError::Decode("invocation without target".into()))?,
            arguments: raw.arguments.unwrap_or_default(),
        },
        COMPLETION => HubMessage::Completion {
            invocation_id: raw
                .invocation_id
                .ok_or_else(|| ClientError::Decode("completion without invocationId".into()))?,
            result: raw.result,
            error: raw.error,
        },
        PING => HubMessage::Ping,
        CLOSE => HubMessage::Close {
            error: raw.error,
            allow_reconnect: raw.allow_reconnect.unwrap_or(false),
        },
        other => HubMessage::Other(other),
    };
    Ok(message)
}
