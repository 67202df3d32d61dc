//! JSON-RPC 2.0 message types for the MCP client.
//!
//! This module defines the envelopes exchanged with an MCP server over stdio.
//! All messages follow the JSON-RPC 2.0 specification with MCP-specific extensions.
//!
//! # Message Types
//!
//! - **Request**: A message expecting a response (has `id`)
//! - **Response**: A reply to a request (`result` or `error`)
//! - **Notification**: A one-way message (no `id`, no response expected)
//!
//! Outgoing messages have dedicated serialisable types. Everything the server
//! sends is decoded into the single permissive [`Message`] shape, since the
//! client only needs the envelope fields to route it.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::DecodeError;

/// The MCP protocol version this client requests.
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// Client name sent during capability negotiation.
pub const CLIENT_NAME: &str = "mcp-docs-downloader";

/// A JSON-RPC 2.0 request ID.
///
/// Per the MCP specification, IDs must be strings or integers, never `null`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric request ID.
    Number(i64),
    /// String request ID.
    String(String),
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}

/// An outgoing JSON-RPC 2.0 request (client to server).
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    /// Always "2.0".
    pub jsonrpc: &'static str,

    /// Unique request identifier.
    pub id: RequestId,

    /// The method to invoke.
    pub method: String,

    /// Parameters for the method.
    pub params: Value,
}

impl JsonRpcRequest {
    /// Creates a new request.
    #[must_use]
    pub fn new(id: RequestId, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method: method.into(),
            params,
        }
    }
}

/// An outgoing JSON-RPC 2.0 notification (client to server).
#[derive(Debug, Clone, Serialize)]
pub struct OutgoingNotification {
    /// Always "2.0".
    pub jsonrpc: &'static str,

    /// The notification method.
    pub method: String,

    /// Optional parameters for the notification.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl OutgoingNotification {
    /// Creates a new outgoing notification.
    #[must_use]
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            method: method.into(),
            params,
        }
    }

    /// The notification sent once the `initialize` exchange has completed.
    #[must_use]
    pub fn initialized() -> Self {
        Self::new("notifications/initialized", None)
    }
}

/// A JSON-RPC 2.0 error object, passed through as received.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonRpcErrorData {
    /// The error code.
    #[serde(default)]
    pub code: i64,

    /// A short description of the error.
    #[serde(default)]
    pub message: String,

    /// Additional information about the error.
    #[serde(default)]
    pub data: Option<Value>,
}

/// Any message received from the server.
#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    /// Must be "2.0".
    pub jsonrpc: String,

    /// Correlation id; absent on notifications.
    #[serde(default)]
    pub id: Option<RequestId>,

    /// Method name on server-initiated requests and notifications.
    #[serde(default)]
    pub method: Option<String>,

    /// Parameters on server-initiated requests and notifications.
    #[serde(default)]
    pub params: Option<Value>,

    /// Successful result on responses.
    #[serde(default)]
    pub result: Option<Value>,

    /// Error object on failed responses.
    #[serde(default)]
    pub error: Option<JsonRpcErrorData>,
}

impl Message {
    /// Returns `true` if this message answers a request.
    #[must_use]
    pub const fn is_response(&self) -> bool {
        self.id.is_some() && self.method.is_none()
    }
}

/// Parameters for the `initialize` request.
#[must_use]
pub fn initialize_params() -> Value {
    json!({
        "protocolVersion": MCP_PROTOCOL_VERSION,
        "capabilities": {
            "tools": {}
        },
        "clientInfo": {
            "name": CLIENT_NAME,
            "version": env!("CARGO_PKG_VERSION"),
        },
    })
}

/// Parses one line of server output into a [`Message`].
///
/// # Errors
///
/// Returns a [`DecodeError`] if the bytes are not a JSON object carrying
/// `"jsonrpc": "2.0"`, or if an envelope field has the wrong type.
pub fn parse_message(line: &[u8]) -> Result<Message, DecodeError> {
    // First, parse as generic JSON to check structure
    let value: Value = serde_json::from_slice(line).map_err(DecodeError::InvalidJson)?;

    let obj = value.as_object().ok_or(DecodeError::NotAnObject)?;

    if obj.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
        return Err(DecodeError::UnsupportedVersion);
    }

    serde_json::from_value(value).map_err(DecodeError::Malformed)
}
