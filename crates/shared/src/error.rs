use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Unauthorized,
    Forbidden,
    NotFound,
    Validation,
    RateLimited,
    Internal,
}

impl ErrorCode {
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            400 | 409 | 422 => Self::Validation,
            429 => Self::RateLimited,
            _ => Self::Internal,
        }
    }
}

/// Error body returned by the REST service. Both the plain `{ message }` shape
/// and problem-details (`title`/`detail`) are accepted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
    #[serde(default, alias = "Message")]
    pub message: String,
    #[serde(default, skip_serializing)]
    detail: Option<String>,
    #[serde(default, skip_serializing)]
    title: Option<String>,
}

impl ApiError {
    /// Best-effort decode of an error body; falls back to the raw text.
    pub fn from_body(status: u16, body: &str) -> Self {
        let mut error = serde_json::from_str::<ApiError>(body).unwrap_or_else(|_| ApiError {
            message: body.trim().to_string(),
            ..ApiError::default()
        });
        if error.message.is_empty() {
            error.message = error
                .detail
                .take()
                .or_else(|| error.title.take())
                .unwrap_or_default();
        }
        if error.code.is_none() {
            error.code = Some(ErrorCode::from_status(status));
        }
        error
    }
}

#[derive(Debug, Error)]
pub enum EventDecodeError {
    #[error("{target}: missing argument {index}")]
    MissingArgument { target: String, index: usize },
    #[error("{target}: invalid argument {index}: {source}")]
    InvalidArgument {
        target: String,
        index: usize,
        #[source]
        source: serde_json::Error,
    },
}
