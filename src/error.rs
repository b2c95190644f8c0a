/// Error taxonomy for the RPC client and the update channel

use serde::Serialize;
use std::fmt;

/// Transport-level failure (DNS, refused connection, timeout, reset).
///
/// This is the only RPC failure that is returned as an outer `Err`; everything the
/// worker answers with, including error statuses, comes back as an [`ApiResult`].
pub type NetworkError = reqwest::Error;

/// Outcome of a request that reached the worker
pub type ApiResult<T> = Result<T, ResponseError>;

/// Body the worker sent along with an error status
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ServerMessage {
    /// Structured diagnostic body (client errors)
    Json(serde_json::Value),
    /// Raw body text (server errors, or anything that is not JSON)
    Text(String),
}

impl ServerMessage {
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            ServerMessage::Json(value) => Some(value),
            ServerMessage::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ServerMessage::Text(text) => Some(text),
            ServerMessage::Json(_) => None,
        }
    }
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerMessage::Json(value) => write!(f, "{}", value),
            ServerMessage::Text(text) => f.write_str(text),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The worker rejected the request (4xx)
    Client,
    /// The worker failed, or answered with a body that does not match the schema
    Server,
}

/// Error built locally from a worker response; never sent by the worker as-is
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[error("{code} {message}")]
#[serde(rename_all = "camelCase")]
pub struct ResponseError {
    pub message: String,
    pub code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_message: Option<ServerMessage>,
}

/// Message used when the worker answers a success status with `{}`, which it does while
/// no worker is running
pub const NO_WORKER_MESSAGE: &str = "no worker running";

impl ResponseError {
    pub fn class(&self) -> ErrorClass {
        if (400..500).contains(&self.code) {
            ErrorClass::Client
        } else {
            ErrorClass::Server
        }
    }

    pub fn is_client_error(&self) -> bool {
        self.class() == ErrorClass::Client
    }

    pub fn is_server_error(&self) -> bool {
        self.class() == ErrorClass::Server
    }

    /// Success status with an empty object body: the server is up but has no worker
    pub fn is_no_worker(&self) -> bool {
        let empty_body = match &self.server_message {
            Some(ServerMessage::Json(serde_json::Value::Object(fields))) => fields.is_empty(),
            _ => false,
        };
        (200..300).contains(&self.code) && empty_body
    }
}

/// A worker config that must not be sent
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("worker name must not be empty")]
    MissingName,
    #[error("manager ip is required unless zeroconf is enabled")]
    MissingIp,
    #[error("manager port is required unless zeroconf is enabled")]
    MissingPort,
    #[error("invalid manager ip: {0}")]
    InvalidIp(String),
}

/// Failure of the update channel. Handled by reconnecting; never reaches observers.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("receive failed: {0}")]
    Receive(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for ChannelError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        ChannelError::Receive(err.to_string())
    }
}

/// Invalid client configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}
